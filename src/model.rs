use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type UserId = i64;

/// Server-assigned identity of a feed node.
///
/// The server hands out ids as strings, but recorded logs and older clients
/// also send plain numbers; both normalize to the same string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for NodeId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => NodeId(s),
            Raw::Unsigned(n) => NodeId(n.to_string()),
            Raw::Signed(n) => NodeId(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[serde(alias = "message", alias = "tweet")]
    Post,
    Comment,
    Subcomment,
}

impl NodeKind {
    /// Order in which an unqualified id is resolved against the store.
    pub const RESOLUTION_ORDER: [NodeKind; 3] =
        [NodeKind::Post, NodeKind::Comment, NodeKind::Subcomment];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Post => "post",
            NodeKind::Comment => "comment",
            NodeKind::Subcomment => "subcomment",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-qualified node address. Two nodes of different kinds never share a key
/// even when the server reuses an id across collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub kind: NodeKind,
    pub id: NodeId,
}

impl NodeKey {
    pub fn post(id: impl Into<NodeId>) -> Self {
        Self {
            kind: NodeKind::Post,
            id: id.into(),
        }
    }

    pub fn comment(id: impl Into<NodeId>) -> Self {
        Self {
            kind: NodeKind::Comment,
            id: id.into(),
        }
    }

    pub fn subcomment(id: impl Into<NodeId>) -> Self {
        Self {
            kind: NodeKind::Subcomment,
            id: id.into(),
        }
    }

    /// Element id used by the rendered fragment of this node.
    pub fn dom_id(&self) -> String {
        format!("{}-{}", self.kind, self.id)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(alias = "user_id", alias = "authorId")]
    pub author_id: UserId,
    #[serde(alias = "username", alias = "authorName")]
    pub author_name: String,
    #[serde(default, alias = "avatarUrl")]
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: NodeId,
    #[serde(flatten)]
    pub author: Author,
    pub content: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "likes", alias = "likeCount")]
    pub like_count: u64,
    #[serde(default, alias = "userLiked", alias = "likedByCurrentUser")]
    pub liked_by_current_user: bool,
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Local submission the server has not echoed back yet.
    #[serde(skip)]
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: NodeId,
    #[serde(default, alias = "message_id", alias = "parentPostId")]
    pub post_id: NodeId,
    #[serde(flatten)]
    pub author: Author,
    pub content: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "likes", alias = "likeCount")]
    pub like_count: u64,
    #[serde(default, alias = "userLiked", alias = "likedByCurrentUser")]
    pub liked_by_current_user: bool,
    #[serde(default)]
    pub subcomments: Vec<Subcomment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subcomment {
    pub id: NodeId,
    #[serde(default, alias = "parent_comment", alias = "parentCommentId")]
    pub comment_id: NodeId,
    #[serde(flatten)]
    pub author: Author,
    pub content: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "likes", alias = "likeCount")]
    pub like_count: u64,
    #[serde(default, alias = "userLiked", alias = "likedByCurrentUser")]
    pub liked_by_current_user: bool,
}

/// Fields shared by every node kind that reconciliation is allowed to touch.
pub trait FeedNode {
    fn key(&self) -> NodeKey;
    fn author(&self) -> &Author;
    fn content(&self) -> &str;
    fn content_mut(&mut self) -> &mut String;
    fn likes(&self) -> (u64, bool);
    fn set_likes(&mut self, total: u64, user_liked: bool);

    /// Copies content and like state from `other`; identity, parentage and
    /// children are left alone. Returns whether anything changed.
    fn merge_scalars(&mut self, other: &Self) -> bool
    where
        Self: Sized,
    {
        let mut changed = false;
        if self.content() != other.content() {
            *self.content_mut() = other.content().to_string();
            changed = true;
        }
        if self.likes() != other.likes() {
            let (total, user_liked) = other.likes();
            self.set_likes(total, user_liked);
            changed = true;
        }
        changed
    }
}

impl FeedNode for Post {
    fn key(&self) -> NodeKey {
        NodeKey::post(self.id.clone())
    }

    fn author(&self) -> &Author {
        &self.author
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn content_mut(&mut self) -> &mut String {
        &mut self.content
    }

    fn likes(&self) -> (u64, bool) {
        (self.like_count, self.liked_by_current_user)
    }

    fn set_likes(&mut self, total: u64, user_liked: bool) {
        self.like_count = total;
        self.liked_by_current_user = user_liked;
    }
}

impl FeedNode for Comment {
    fn key(&self) -> NodeKey {
        NodeKey::comment(self.id.clone())
    }

    fn author(&self) -> &Author {
        &self.author
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn content_mut(&mut self) -> &mut String {
        &mut self.content
    }

    fn likes(&self) -> (u64, bool) {
        (self.like_count, self.liked_by_current_user)
    }

    fn set_likes(&mut self, total: u64, user_liked: bool) {
        self.like_count = total;
        self.liked_by_current_user = user_liked;
    }
}

impl FeedNode for Subcomment {
    fn key(&self) -> NodeKey {
        NodeKey::subcomment(self.id.clone())
    }

    fn author(&self) -> &Author {
        &self.author
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn content_mut(&mut self) -> &mut String {
        &mut self.content
    }

    fn likes(&self) -> (u64, bool) {
        (self.like_count, self.liked_by_current_user)
    }

    fn set_likes(&mut self, total: u64, user_liked: bool) {
        self.like_count = total;
        self.liked_by_current_user = user_liked;
    }
}
