use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Comment, NodeId, NodeKind, Post, Subcomment, UserId};

/// Events pushed by the server over the real-time channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Inbound {
    #[serde(rename = "recent messages")]
    RecentMessages(Page),
    #[serde(rename = "new tweet", alias = "new message")]
    NewPost(Post),
    #[serde(rename = "new comment")]
    NewComment(Comment),
    #[serde(rename = "new subcomment")]
    NewSubcomment(Subcomment),
    #[serde(rename = "update message")]
    UpdatePost(Edit),
    #[serde(rename = "update comment")]
    UpdateComment(Edit),
    #[serde(rename = "update subcomment")]
    UpdateSubcomment(Edit),
    #[serde(rename = "delete message")]
    DeletePost(Removal),
    #[serde(rename = "delete comment")]
    DeleteComment(Removal),
    #[serde(rename = "delete subcomment")]
    DeleteSubcomment(Removal),
    #[serde(rename = "message likes")]
    Likes(LikeUpdate),
    #[serde(rename = "update ignored users")]
    IgnoredUsers(Vec<UserId>),
    #[serde(rename = "ban user")]
    BanUser(UserRef),
    #[serde(rename = "unban user")]
    UnbanUser(UserRef),
}

impl Inbound {
    pub fn name(&self) -> &'static str {
        match self {
            Inbound::RecentMessages(_) => "recent messages",
            Inbound::NewPost(_) => "new tweet",
            Inbound::NewComment(_) => "new comment",
            Inbound::NewSubcomment(_) => "new subcomment",
            Inbound::UpdatePost(_) => "update message",
            Inbound::UpdateComment(_) => "update comment",
            Inbound::UpdateSubcomment(_) => "update subcomment",
            Inbound::DeletePost(_) => "delete message",
            Inbound::DeleteComment(_) => "delete comment",
            Inbound::DeleteSubcomment(_) => "delete subcomment",
            Inbound::Likes(_) => "message likes",
            Inbound::IgnoredUsers(_) => "update ignored users",
            Inbound::BanUser(_) => "ban user",
            Inbound::UnbanUser(_) => "unban user",
        }
    }
}

/// One snapshot page of posts, newest first, with their nested replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub messages: Vec<Post>,
    #[serde(rename = "hasMoreMessages", alias = "has_more_messages")]
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edit {
    pub id: NodeId,
    #[serde(alias = "newContent")]
    pub new_content: String,
    #[serde(default, alias = "userId")]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Removal {
    pub id: NodeId,
    #[serde(default, alias = "userId")]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeUpdate {
    pub id: NodeId,
    /// Absent on legacy payloads; the id is then resolved post, comment, subcomment.
    #[serde(default)]
    pub kind: Option<NodeKind>,
    pub likes: LikeTotals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeTotals {
    pub total: u64,
    #[serde(rename = "userLiked", alias = "user_liked")]
    pub user_liked: bool,
}

/// Requests sent to the server. Responses, if any, come back as [`Inbound`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Outbound {
    #[serde(rename = "join")]
    Join(JoinRequest),
    #[serde(rename = "get recent messages")]
    GetRecentMessages(PageRequest),
    #[serde(rename = "create message")]
    CreatePost(Draft),
    #[serde(rename = "create comment")]
    CreateComment(CommentDraft),
    #[serde(rename = "create subcomment")]
    CreateSubcomment(SubcommentDraft),
    #[serde(rename = "update message")]
    UpdatePost(EditRequest),
    #[serde(rename = "update comment")]
    UpdateComment(EditRequest),
    #[serde(rename = "update subcomment")]
    UpdateSubcomment(EditRequest),
    #[serde(rename = "delete message")]
    DeletePost(DeleteRequest),
    #[serde(rename = "delete comment")]
    DeleteComment(DeleteRequest),
    #[serde(rename = "delete subcomment")]
    DeleteSubcomment(DeleteRequest),
    #[serde(rename = "like message")]
    Like(LikeRequest),
    #[serde(rename = "remove like message")]
    RemoveLike(LikeRequest),
    #[serde(rename = "ignore user")]
    IgnoreUser(IgnoreRequest),
    #[serde(rename = "unignore user")]
    UnignoreUser(IgnoreRequest),
    #[serde(rename = "get ignored users")]
    GetIgnoredUsers(UserRef),
    #[serde(rename = "report message")]
    ReportPost(ReportRequest),
    #[serde(rename = "report comment")]
    ReportComment(ReportRequest),
}

impl Outbound {
    pub fn name(&self) -> &'static str {
        match self {
            Outbound::Join(_) => "join",
            Outbound::GetRecentMessages(_) => "get recent messages",
            Outbound::CreatePost(_) => "create message",
            Outbound::CreateComment(_) => "create comment",
            Outbound::CreateSubcomment(_) => "create subcomment",
            Outbound::UpdatePost(_) => "update message",
            Outbound::UpdateComment(_) => "update comment",
            Outbound::UpdateSubcomment(_) => "update subcomment",
            Outbound::DeletePost(_) => "delete message",
            Outbound::DeleteComment(_) => "delete comment",
            Outbound::DeleteSubcomment(_) => "delete subcomment",
            Outbound::Like(_) => "like message",
            Outbound::RemoveLike(_) => "remove like message",
            Outbound::IgnoreUser(_) => "ignore user",
            Outbound::UnignoreUser(_) => "unignore user",
            Outbound::GetIgnoredUsers(_) => "get ignored users",
            Outbound::ReportPost(_) => "report message",
            Outbound::ReportComment(_) => "report comment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub room: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub content: String,
    pub author_id: UserId,
    pub author_name: String,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub post_id: NodeId,
    #[serde(flatten)]
    pub draft: Draft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcommentDraft {
    pub comment_id: NodeId,
    #[serde(flatten)]
    pub draft: Draft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    pub id: NodeId,
    pub new_content: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub id: NodeId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeRequest {
    pub user_id: UserId,
    pub id: NodeId,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRequest {
    pub user_id: UserId,
    pub ignored_user_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub user_id: UserId,
    pub id: NodeId,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_moderation_events() {
        let ev: Inbound =
            serde_json::from_str(r#"{"event": "ban user", "data": {"user_id": 5}}"#).unwrap();
        assert_eq!(ev, Inbound::BanUser(UserRef { user_id: 5 }));
        assert_eq!(ev.name(), "ban user");

        let ev: Inbound =
            serde_json::from_str(r#"{"event": "unban user", "data": {"user_id": 5}}"#).unwrap();
        assert_eq!(ev, Inbound::UnbanUser(UserRef { user_id: 5 }));
    }

    #[test]
    fn parses_snapshot_page() {
        let ev: Inbound = serde_json::from_str(
            r#"{"event": "recent messages", "data": {
                "messages": [{"id": 1, "author_id": 1, "author_name": "a", "content": "a", "comments": []}],
                "hasMoreMessages": true
            }}"#,
        )
        .unwrap();
        let Inbound::RecentMessages(page) = ev else {
            panic!("expected a page");
        };
        assert!(page.has_more);
        assert_eq!(page.messages[0].id, NodeId::from("1"));
    }

    #[test]
    fn parses_like_update_without_kind() {
        let ev: Inbound = serde_json::from_str(
            r#"{"event": "message likes", "data": {"id": 1, "likes": {"total": 3, "userLiked": true}}}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            Inbound::Likes(LikeUpdate {
                id: NodeId::from("1"),
                kind: None,
                likes: LikeTotals {
                    total: 3,
                    user_liked: true
                },
            })
        );
        assert_eq!(ev.name(), "message likes");
    }

    #[test]
    fn outbound_uses_wire_event_names() {
        let ev = Outbound::Like(LikeRequest {
            user_id: 5,
            id: NodeId::from("c9"),
            kind: NodeKind::Comment,
        });
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "like message");
        assert_eq!(json["data"]["kind"], "comment");
        assert_eq!(ev.name(), "like message");
    }
}
