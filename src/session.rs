use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::event::{
    CommentDraft, DeleteRequest, Draft, EditRequest, IgnoreRequest, JoinRequest, LikeRequest,
    Outbound, ReportRequest, SubcommentDraft, UserRef,
};
use crate::model::{Author, FeedNode, NodeId, NodeKey, NodeKind, Post, UserId};
use crate::pagination::Pager;
use crate::store::FeedStore;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub room: String,
    pub page_size: u64,
    /// Cap applied while the feed shows only the newest window.
    pub max_visible: usize,
    /// Longest content accepted from the compose box, in characters.
    pub max_content_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            room: "room".to_string(),
            page_size: 10,
            max_visible: 50,
            max_content_len: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub name: String,
    pub avatar_url: String,
}

/// Which end of the feed the reader is working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Only the newest posts are shown; head inserts evict from the tail.
    Recent,
    /// Older history is being appended; nothing is evicted.
    Backfill,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    Empty,
    TooLong { len: usize, max: usize },
    MissingTarget(NodeKey),
    /// Only posts and comments can be reported.
    NotReportable(NodeKey),
    /// The current user is banned and may not write.
    Banned,
}

impl fmt::Display for ComposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComposeError::Empty => f.write_str("content is empty"),
            ComposeError::TooLong { len, max } => {
                write!(f, "content is {len} characters, the limit is {max}")
            }
            ComposeError::MissingTarget(key) => write!(f, "{key} is not in the feed"),
            ComposeError::NotReportable(key) => write!(f, "{key} cannot be reported"),
            ComposeError::Banned => f.write_str("banned users cannot post"),
        }
    }
}

impl std::error::Error for ComposeError {}

/// A local post submission: the request to send plus the optimistic post
/// already placed in the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub request: Outbound,
    pub optimistic: NodeKey,
}

/// Everything one reader's feed needs between events. Owned by a single
/// top-level instance and handed to the reconciler by `&mut`.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    user: CurrentUser,
    pub(crate) store: FeedStore,
    pub(crate) pager: Pager,
    window: Window,
    user_sent_post: bool,
    at_newest_edge: bool,
    ignored: BTreeSet<UserId>,
    banned: BTreeSet<UserId>,
    /// Optimistic posts awaiting their server echo, oldest first.
    pending: Vec<(NodeId, String)>,
    next_local: u64,
    composing: Option<NodeId>,
}

impl Session {
    pub fn new(user: CurrentUser, config: SessionConfig) -> Self {
        Self {
            pager: Pager::new(config.page_size),
            config,
            user,
            store: FeedStore::new(),
            window: Window::Recent,
            user_sent_post: false,
            at_newest_edge: true,
            ignored: BTreeSet::new(),
            banned: BTreeSet::new(),
            pending: Vec::new(),
            next_local: 0,
            composing: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn ignored(&self) -> &BTreeSet<UserId> {
        &self.ignored
    }

    pub fn is_ignored(&self, user: UserId) -> bool {
        self.ignored.contains(&user)
    }

    pub fn banned(&self) -> &BTreeSet<UserId> {
        &self.banned
    }

    pub fn is_banned(&self, user: UserId) -> bool {
        self.banned.contains(&user)
    }

    pub fn at_newest_edge(&self) -> bool {
        self.at_newest_edge
    }

    /// Reported by the UI whenever the viewport reaches or leaves the newest post.
    pub fn set_at_newest_edge(&mut self, at_edge: bool) {
        self.at_newest_edge = at_edge;
    }

    /// Handshake: join the room and ask for the newest page.
    pub fn start(&mut self) -> Vec<Outbound> {
        let mut out = vec![Outbound::Join(JoinRequest {
            room: self.config.room.clone(),
        })];
        if let Some(request) = self.pager.request_older() {
            out.push(Outbound::GetRecentMessages(request));
        }
        out
    }

    /// Asks for the next older page. Switches the feed to backfill mode.
    pub fn load_older(&mut self) -> Option<Outbound> {
        let request = self.pager.request_older()?;
        self.window = Window::Backfill;
        tracing::debug!(offset = request.offset, "loading older posts");
        Some(Outbound::GetRecentMessages(request))
    }

    /// Returns to the newest window, evicting whatever backfill added beyond
    /// the cap. Returns the evicted post ids.
    pub fn show_recent(&mut self) -> Vec<NodeId> {
        self.window = Window::Recent;
        self.store.trim_to_max(self.config.max_visible)
    }

    pub fn submit_post(
        &mut self,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Submission, ComposeError> {
        let content = self.validate(content)?;

        self.next_local += 1;
        let local_id = NodeId::new(format!("local-{}", self.next_local));
        let post = Post {
            id: local_id.clone(),
            author: self.author(),
            content: content.clone(),
            created_at: Some(now),
            like_count: 0,
            liked_by_current_user: false,
            comments: Vec::new(),
            pending: true,
        };
        self.store.upsert_post(post);
        self.store.pin(&local_id);
        self.pending.push((local_id.clone(), content.clone()));
        self.user_sent_post = true;

        Ok(Submission {
            request: Outbound::CreatePost(self.draft(content, now)),
            optimistic: NodeKey::post(local_id),
        })
    }

    /// Marks `post_id` as being replied to, which keeps it from being evicted.
    pub fn begin_compose(&mut self, post_id: &NodeId) -> bool {
        self.end_compose();
        if !self.store.pin(post_id) {
            return false;
        }
        self.composing = Some(post_id.clone());
        true
    }

    pub fn end_compose(&mut self) {
        if let Some(id) = self.composing.take() {
            if !self.is_pending(&id) {
                self.store.unpin(&id);
            }
        }
    }

    pub fn submit_comment(
        &mut self,
        post_id: &NodeId,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Outbound, ComposeError> {
        let content = self.validate(content)?;
        let key = NodeKey::post(post_id.clone());
        if !self.store.contains(&key) {
            return Err(ComposeError::MissingTarget(key));
        }
        if self.composing.as_ref() == Some(post_id) {
            self.end_compose();
        }
        Ok(Outbound::CreateComment(CommentDraft {
            post_id: post_id.clone(),
            draft: self.draft(content, now),
        }))
    }

    pub fn submit_subcomment(
        &mut self,
        comment_id: &NodeId,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Outbound, ComposeError> {
        let content = self.validate(content)?;
        let key = NodeKey::comment(comment_id.clone());
        if !self.store.contains(&key) {
            return Err(ComposeError::MissingTarget(key));
        }
        Ok(Outbound::CreateSubcomment(SubcommentDraft {
            comment_id: comment_id.clone(),
            draft: self.draft(content, now),
        }))
    }

    pub fn edit(&self, key: &NodeKey, content: &str) -> Result<Outbound, ComposeError> {
        let new_content = self.validate(content)?;
        if !self.store.contains(key) {
            return Err(ComposeError::MissingTarget(key.clone()));
        }
        let request = EditRequest {
            id: key.id.clone(),
            new_content,
            user_id: self.user.id,
        };
        Ok(match key.kind {
            NodeKind::Post => Outbound::UpdatePost(request),
            NodeKind::Comment => Outbound::UpdateComment(request),
            NodeKind::Subcomment => Outbound::UpdateSubcomment(request),
        })
    }

    pub fn delete(&self, key: &NodeKey) -> Outbound {
        let request = DeleteRequest {
            id: key.id.clone(),
            user_id: self.user.id,
        };
        match key.kind {
            NodeKind::Post => Outbound::DeletePost(request),
            NodeKind::Comment => Outbound::DeleteComment(request),
            NodeKind::Subcomment => Outbound::DeleteSubcomment(request),
        }
    }

    /// Likes or unlikes depending on the node's current state. The count
    /// itself only changes once the server reports new totals.
    pub fn toggle_like(&self, key: &NodeKey) -> Option<Outbound> {
        let Some(node) = self.store.node(key) else {
            tracing::debug!(%key, "like toggle for missing node");
            return None;
        };
        let (_, liked) = node.likes();
        let request = LikeRequest {
            user_id: self.user.id,
            id: key.id.clone(),
            kind: key.kind,
        };
        Some(if liked {
            Outbound::RemoveLike(request)
        } else {
            Outbound::Like(request)
        })
    }

    pub fn ignore_user(&self, user: UserId) -> Outbound {
        Outbound::IgnoreUser(IgnoreRequest {
            user_id: self.user.id,
            ignored_user_id: user,
        })
    }

    pub fn unignore_user(&self, user: UserId) -> Outbound {
        Outbound::UnignoreUser(IgnoreRequest {
            user_id: self.user.id,
            ignored_user_id: user,
        })
    }

    /// Flags a post or comment for moderators.
    pub fn report(&self, key: &NodeKey, reason: &str) -> Result<Outbound, ComposeError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ComposeError::Empty);
        }
        if !self.store.contains(key) {
            return Err(ComposeError::MissingTarget(key.clone()));
        }
        let request = ReportRequest {
            user_id: self.user.id,
            id: key.id.clone(),
            reason: reason.to_string(),
        };
        match key.kind {
            NodeKind::Post => Ok(Outbound::ReportPost(request)),
            NodeKind::Comment => Ok(Outbound::ReportComment(request)),
            NodeKind::Subcomment => Err(ComposeError::NotReportable(key.clone())),
        }
    }

    pub fn request_ignored_users(&self) -> Outbound {
        Outbound::GetIgnoredUsers(UserRef {
            user_id: self.user.id,
        })
    }

    /// Replaces the ignored set. Returns whether it changed.
    pub(crate) fn set_ignored(&mut self, users: impl IntoIterator<Item = UserId>) -> bool {
        let users: BTreeSet<UserId> = users.into_iter().collect();
        if users == self.ignored {
            return false;
        }
        self.ignored = users;
        true
    }

    /// Adds or lifts a ban. Returns whether the banned set changed.
    pub(crate) fn set_banned(&mut self, user: UserId, banned: bool) -> bool {
        if banned {
            self.banned.insert(user)
        } else {
            self.banned.remove(&user)
        }
    }

    /// Consumes the "user just posted" flag.
    pub(crate) fn take_user_sent_post(&mut self) -> bool {
        std::mem::take(&mut self.user_sent_post)
    }

    /// Finds the oldest optimistic post with this content and forgets it.
    pub(crate) fn take_pending(&mut self, content: &str) -> Option<NodeId> {
        let idx = self
            .pending
            .iter()
            .position(|(_, c)| c.trim() == content.trim())?;
        let (id, _) = self.pending.remove(idx);
        self.store.unpin(&id);
        Some(id)
    }

    fn is_pending(&self, id: &NodeId) -> bool {
        self.pending.iter().any(|(p, _)| p == id)
    }

    fn validate(&self, content: &str) -> Result<String, ComposeError> {
        if self.is_banned(self.user.id) {
            return Err(ComposeError::Banned);
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(ComposeError::Empty);
        }
        let len = content.chars().count();
        if len > self.config.max_content_len {
            return Err(ComposeError::TooLong {
                len,
                max: self.config.max_content_len,
            });
        }
        Ok(content.to_string())
    }

    fn author(&self) -> Author {
        Author {
            author_id: self.user.id,
            author_name: self.user.name.clone(),
            avatar_url: self.user.avatar_url.clone(),
        }
    }

    fn draft(&self, content: String, now: DateTime<Utc>) -> Draft {
        Draft {
            content,
            author_id: self.user.id,
            author_name: self.user.name.clone(),
            avatar_url: self.user.avatar_url.clone(),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PageRequest;

    fn session() -> Session {
        Session::new(
            CurrentUser {
                id: 7,
                name: "alice".to_string(),
                avatar_url: "/a.png".to_string(),
            },
            SessionConfig::default(),
        )
    }

    fn now() -> DateTime<Utc> {
        "2026-01-30T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn start_joins_and_requests_first_page() {
        let mut s = session();
        let out = s.start();
        assert_eq!(
            out,
            vec![
                Outbound::Join(JoinRequest {
                    room: "room".to_string()
                }),
                Outbound::GetRecentMessages(PageRequest {
                    offset: 0,
                    limit: 10
                }),
            ]
        );
        assert_eq!(s.window(), Window::Recent);
        // First page still in flight.
        assert_eq!(s.load_older(), None);
    }

    #[test]
    fn empty_or_blank_content_is_rejected_before_sending() {
        let mut s = session();
        assert_eq!(s.submit_post("   ", now()), Err(ComposeError::Empty));
        assert!(s.store().is_empty());
        assert!(!s.take_user_sent_post());
    }

    #[test]
    fn overlong_content_is_rejected() {
        let mut s = session();
        let long = "ы".repeat(501);
        assert_eq!(
            s.submit_post(&long, now()),
            Err(ComposeError::TooLong { len: 501, max: 500 })
        );
        assert!(s.submit_post(&"ы".repeat(500), now()).is_ok());
    }

    #[test]
    fn submit_post_places_pinned_optimistic_post() {
        let mut s = session();
        let sub = s.submit_post("  hello ", now()).unwrap();
        assert_eq!(sub.optimistic, NodeKey::post("local-1"));
        let Outbound::CreatePost(draft) = &sub.request else {
            panic!("expected create message");
        };
        assert_eq!(draft.content, "hello");
        assert_eq!(draft.author_id, 7);

        let post = s.store().post(&NodeId::from("local-1")).unwrap();
        assert!(post.pending);
        assert!(s.store().is_pinned(&post.id));
        assert!(s.take_user_sent_post());
        assert_eq!(s.take_pending("hello"), Some(NodeId::from("local-1")));
        assert!(!s.store().is_pinned(&NodeId::from("local-1")));
    }

    #[test]
    fn comment_on_missing_post_is_rejected() {
        let mut s = session();
        assert_eq!(
            s.submit_comment(&NodeId::from("9"), "hi", now()),
            Err(ComposeError::MissingTarget(NodeKey::post("9")))
        );
    }

    #[test]
    fn composing_pins_until_submitted() {
        let mut s = session();
        s.submit_post("mine", now()).unwrap();
        s.take_pending("mine");
        let id = NodeId::from("local-1");

        assert!(s.begin_compose(&id));
        assert!(s.store().is_pinned(&id));
        let out = s.submit_comment(&id, "reply", now()).unwrap();
        assert!(matches!(out, Outbound::CreateComment(ref d) if d.post_id == id));
        assert!(!s.store().is_pinned(&id));
    }

    #[test]
    fn like_toggle_follows_current_state() {
        let mut s = session();
        s.submit_post("p", now()).unwrap();
        let key = NodeKey::post("local-1");
        assert!(matches!(s.toggle_like(&key), Some(Outbound::Like(_))));
        s.store.set_likes(&key, 1, true);
        assert!(matches!(s.toggle_like(&key), Some(Outbound::RemoveLike(_))));
        assert_eq!(s.toggle_like(&NodeKey::comment("x")), None);
    }

    #[test]
    fn edits_carry_kind_and_user() {
        let mut s = session();
        s.submit_post("p", now()).unwrap();
        let out = s.edit(&NodeKey::post("local-1"), "q").unwrap();
        assert_eq!(
            out,
            Outbound::UpdatePost(EditRequest {
                id: NodeId::from("local-1"),
                new_content: "q".to_string(),
                user_id: 7,
            })
        );
        assert!(matches!(
            s.delete(&NodeKey::subcomment("s")),
            Outbound::DeleteSubcomment(DeleteRequest { user_id: 7, .. })
        ));
    }

    #[test]
    fn ignored_set_reports_changes() {
        let mut s = session();
        assert!(s.set_ignored([3, 4]));
        assert!(!s.set_ignored([4, 3]));
        assert!(s.is_ignored(3));
        assert!(matches!(
            s.ignore_user(9),
            Outbound::IgnoreUser(IgnoreRequest {
                user_id: 7,
                ignored_user_id: 9
            })
        ));
    }
    #[test]
    fn reports_posts_and_comments_only() {
        let mut s = session();
        let local = s.submit_post("hello", now()).unwrap().optimistic;
        let post_id = local.id.clone();
        s.store.upsert_comment(
            &post_id,
            serde_json::from_str(
                r#"{"id": "c1", "author_id": 2, "author_name": "bob", "content": "x",
                    "subcomments": [{"id": "s1", "author_id": 2, "author_name": "bob", "content": "y"}]}"#,
            )
            .unwrap(),
        );

        assert_eq!(
            s.report(&NodeKey::comment("c1"), "  spam "),
            Ok(Outbound::ReportComment(ReportRequest {
                user_id: 7,
                id: NodeId::from("c1"),
                reason: "spam".to_string(),
            }))
        );
        assert!(matches!(s.report(&local, "rude"), Ok(Outbound::ReportPost(_))));
        assert_eq!(s.report(&local, " "), Err(ComposeError::Empty));
        assert_eq!(
            s.report(&NodeKey::subcomment("s1"), "spam"),
            Err(ComposeError::NotReportable(NodeKey::subcomment("s1")))
        );
        assert_eq!(
            s.report(&NodeKey::post("nope"), "spam"),
            Err(ComposeError::MissingTarget(NodeKey::post("nope")))
        );
    }

    #[test]
    fn banned_user_cannot_write_until_unbanned() {
        let mut s = session();
        assert!(s.set_banned(7, true));
        assert!(!s.set_banned(7, true));
        assert_eq!(s.submit_post("hello", now()), Err(ComposeError::Banned));
        assert!(s.store().is_empty());

        assert!(s.set_banned(7, false));
        assert!(s.submit_post("hello", now()).is_ok());
    }
}
