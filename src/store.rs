use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::{Comment, FeedNode, NodeId, NodeKey, NodeKind, Post, Subcomment};

/// Where a newly seen post enters the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Newest edge; live posts arrive here.
    Head,
    /// Oldest edge; snapshot pages are appended here.
    Tail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Unchanged,
    /// The target (or its parent) is not in the store.
    Ignored,
}

impl Applied {
    pub fn is_change(self) -> bool {
        matches!(self, Applied::Inserted | Applied::Updated)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildCount {
    /// Comments of a post, or subcomments of a comment.
    pub direct: usize,
    /// Subcomments across all comments of a post. Always 0 for a comment.
    pub nested: usize,
}

/// Posts, comments and subcomments keyed by server id. Unknown ids and
/// parents are ignored rather than reported; the server may deliver
/// duplicate or out-of-order events.
#[derive(Debug, Default)]
pub struct FeedStore {
    /// Display order, index 0 is the newest edge.
    posts: VecDeque<Post>,
    comment_parent: HashMap<NodeId, NodeId>,
    subcomment_parent: HashMap<NodeId, NodeId>,
    pinned: HashSet<NodeId>,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Posts from the newest edge to the oldest.
    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.posts.iter()
    }

    pub fn post(&self, id: &NodeId) -> Option<&Post> {
        self.posts.iter().find(|p| &p.id == id)
    }

    pub fn comment(&self, id: &NodeId) -> Option<&Comment> {
        let parent = self.comment_parent.get(id)?;
        self.post(parent)?.comments.iter().find(|c| &c.id == id)
    }

    pub fn subcomment(&self, id: &NodeId) -> Option<&Subcomment> {
        let parent = self.subcomment_parent.get(id)?;
        self.comment(parent)?
            .subcomments
            .iter()
            .find(|s| &s.id == id)
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        match key.kind {
            NodeKind::Post => self.post(&key.id).is_some(),
            NodeKind::Comment => self.comment(&key.id).is_some(),
            NodeKind::Subcomment => self.subcomment(&key.id).is_some(),
        }
    }

    /// Looks a node up through the common node interface.
    pub fn node(&self, key: &NodeKey) -> Option<&dyn FeedNode> {
        match key.kind {
            NodeKind::Post => self.post(&key.id).map(|p| p as &dyn FeedNode),
            NodeKind::Comment => self.comment(&key.id).map(|c| c as &dyn FeedNode),
            NodeKind::Subcomment => self.subcomment(&key.id).map(|s| s as &dyn FeedNode),
        }
    }

    /// Qualifies a bare id. With an explicit kind only that kind is checked;
    /// otherwise the first match in post, comment, subcomment order wins.
    pub fn resolve(&self, kind: Option<NodeKind>, id: &NodeId) -> Option<NodeKey> {
        let candidates: &[NodeKind] = match &kind {
            Some(kind) => std::slice::from_ref(kind),
            None => &NodeKind::RESOLUTION_ORDER,
        };
        candidates
            .iter()
            .map(|&kind| NodeKey {
                kind,
                id: id.clone(),
            })
            .find(|key| self.contains(key))
    }

    /// The parent of a comment or subcomment.
    pub fn parent_of(&self, key: &NodeKey) -> Option<NodeKey> {
        match key.kind {
            NodeKind::Post => None,
            NodeKind::Comment => self.comment_parent.get(&key.id).cloned().map(NodeKey::post),
            NodeKind::Subcomment => self
                .subcomment_parent
                .get(&key.id)
                .cloned()
                .map(NodeKey::comment),
        }
    }

    /// The top-level post whose fragment contains `key`.
    pub fn owning_post(&self, key: &NodeKey) -> Option<NodeId> {
        match key.kind {
            NodeKind::Post => self.post(&key.id).map(|p| p.id.clone()),
            NodeKind::Comment => self.comment_parent.get(&key.id).cloned(),
            NodeKind::Subcomment => {
                let comment = self.subcomment_parent.get(&key.id)?;
                self.comment_parent.get(comment).cloned()
            }
        }
    }

    /// The post right after `id` in display order, if any.
    pub fn following(&self, id: &NodeId) -> Option<&NodeId> {
        let idx = self.post_index(id)?;
        self.posts.get(idx + 1).map(|p| &p.id)
    }

    pub fn child_count(&self, key: &NodeKey) -> Option<ChildCount> {
        match key.kind {
            NodeKind::Post => {
                let post = self.post(&key.id)?;
                Some(ChildCount {
                    direct: post.comments.len(),
                    nested: post.comments.iter().map(|c| c.subcomments.len()).sum(),
                })
            }
            NodeKind::Comment => Some(ChildCount {
                direct: self.comment(&key.id)?.subcomments.len(),
                nested: 0,
            }),
            NodeKind::Subcomment => self.subcomment(&key.id).map(|_| ChildCount::default()),
        }
    }

    pub fn upsert_post(&mut self, post: Post) -> Applied {
        self.upsert_post_at(post, Placement::Head)
    }

    /// Inserts a post with its full subtree, or merges content and like state
    /// into an existing post without touching its comments.
    pub fn upsert_post_at(&mut self, mut post: Post, at: Placement) -> Applied {
        if let Some(existing) = self.post_mut(&post.id) {
            return if existing.merge_scalars(&post) {
                Applied::Updated
            } else {
                Applied::Unchanged
            };
        }

        let comments = std::mem::take(&mut post.comments);
        let id = post.id.clone();
        match at {
            Placement::Head => self.posts.push_front(post),
            Placement::Tail => self.posts.push_back(post),
        }
        for comment in comments {
            self.upsert_comment(&id, comment);
        }
        Applied::Inserted
    }

    pub fn upsert_comment(&mut self, post_id: &NodeId, mut comment: Comment) -> Applied {
        let subcomments = std::mem::take(&mut comment.subcomments);
        let id = comment.id.clone();

        let applied = if let Some(existing) = self.comment_mut(&id) {
            if &existing.post_id != post_id {
                tracing::warn!(
                    %id,
                    parent = %existing.post_id,
                    claimed = %post_id,
                    "comment already attached elsewhere; keeping original parent"
                );
            }
            if existing.merge_scalars(&comment) {
                Applied::Updated
            } else {
                Applied::Unchanged
            }
        } else {
            let Some(post) = self.post_mut(post_id) else {
                tracing::debug!(%id, post = %post_id, "comment for unknown post ignored");
                return Applied::Ignored;
            };
            comment.post_id = post_id.clone();
            post.comments.push(comment);
            self.comment_parent.insert(id.clone(), post_id.clone());
            Applied::Inserted
        };

        let mut children_changed = false;
        for subcomment in subcomments {
            children_changed |= self.upsert_subcomment(&id, subcomment).is_change();
        }
        match applied {
            Applied::Unchanged if children_changed => Applied::Updated,
            other => other,
        }
    }

    pub fn upsert_subcomment(&mut self, comment_id: &NodeId, mut subcomment: Subcomment) -> Applied {
        let id = subcomment.id.clone();
        if let Some(existing) = self.subcomment_mut(&id) {
            return if existing.merge_scalars(&subcomment) {
                Applied::Updated
            } else {
                Applied::Unchanged
            };
        }

        let Some(comment) = self.comment_mut(comment_id) else {
            tracing::debug!(%id, comment = %comment_id, "subcomment for unknown comment ignored");
            return Applied::Ignored;
        };
        subcomment.comment_id = comment_id.clone();
        comment.subcomments.push(subcomment);
        self.subcomment_parent.insert(id, comment_id.clone());
        Applied::Inserted
    }

    pub fn remove(&mut self, key: &NodeKey) -> bool {
        match key.kind {
            NodeKind::Post => self.remove_post(&key.id),
            NodeKind::Comment => self.remove_comment(&key.id),
            NodeKind::Subcomment => self.remove_subcomment(&key.id),
        }
    }

    /// Removes a post and everything below it.
    pub fn remove_post(&mut self, id: &NodeId) -> bool {
        let Some(idx) = self.post_index(id) else {
            return false;
        };
        let Some(post) = self.posts.remove(idx) else {
            return false;
        };
        for comment in &post.comments {
            self.forget_comment(comment);
        }
        self.pinned.remove(id);
        true
    }

    /// Removes a comment and its subcomments; siblings and the post stay.
    pub fn remove_comment(&mut self, id: &NodeId) -> bool {
        let Some(post_id) = self.comment_parent.get(id).cloned() else {
            return false;
        };
        let Some(post) = self.post_mut(&post_id) else {
            return false;
        };
        let Some(idx) = post.comments.iter().position(|c| &c.id == id) else {
            return false;
        };
        let comment = post.comments.remove(idx);
        self.forget_comment(&comment);
        true
    }

    pub fn remove_subcomment(&mut self, id: &NodeId) -> bool {
        let Some(comment_id) = self.subcomment_parent.get(id).cloned() else {
            return false;
        };
        let Some(comment) = self.comment_mut(&comment_id) else {
            return false;
        };
        let before = comment.subcomments.len();
        comment.subcomments.retain(|s| &s.id != id);
        let removed = comment.subcomments.len() != before;
        if removed {
            self.subcomment_parent.remove(id);
        }
        removed
    }

    /// Replaces the content of a node. Ids, counts and children are untouched.
    pub fn edit_content(&mut self, key: &NodeKey, content: &str) -> Applied {
        let Some(target) = self.content_slot(key) else {
            return Applied::Ignored;
        };
        if target == content {
            return Applied::Unchanged;
        }
        *target = content.to_string();
        Applied::Updated
    }

    pub fn set_likes(&mut self, key: &NodeKey, total: u64, user_liked: bool) -> Applied {
        let node: &mut dyn FeedNode = match key.kind {
            NodeKind::Post => match self.post_mut(&key.id) {
                Some(p) => p,
                None => return Applied::Ignored,
            },
            NodeKind::Comment => match self.comment_mut(&key.id) {
                Some(c) => c,
                None => return Applied::Ignored,
            },
            NodeKind::Subcomment => match self.subcomment_mut(&key.id) {
                Some(s) => s,
                None => return Applied::Ignored,
            },
        };
        if node.likes() == (total, user_liked) {
            return Applied::Unchanged;
        }
        node.set_likes(total, user_liked);
        Applied::Updated
    }

    /// Evicts posts from the oldest edge until at most `max_visible` remain.
    /// Pinned posts are skipped; returns the evicted ids, oldest first.
    pub fn trim_to_max(&mut self, max_visible: usize) -> Vec<NodeId> {
        let mut evicted = Vec::new();
        while self.posts.len() > max_visible {
            let Some(victim) = self
                .posts
                .iter()
                .rev()
                .find(|p| !self.pinned.contains(&p.id))
                .map(|p| p.id.clone())
            else {
                break;
            };
            self.remove_post(&victim);
            evicted.push(victim);
        }
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), max_visible, "trimmed feed");
        }
        evicted
    }

    /// Protects a post from eviction. Returns false if the post is unknown.
    pub fn pin(&mut self, id: &NodeId) -> bool {
        if self.post(id).is_none() {
            return false;
        }
        self.pinned.insert(id.clone());
        true
    }

    pub fn unpin(&mut self, id: &NodeId) -> bool {
        self.pinned.remove(id)
    }

    pub fn is_pinned(&self, id: &NodeId) -> bool {
        self.pinned.contains(id)
    }

    fn post_index(&self, id: &NodeId) -> Option<usize> {
        self.posts.iter().position(|p| &p.id == id)
    }

    fn post_mut(&mut self, id: &NodeId) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| &p.id == id)
    }

    fn comment_mut(&mut self, id: &NodeId) -> Option<&mut Comment> {
        let parent = self.comment_parent.get(id)?.clone();
        self.post_mut(&parent)?
            .comments
            .iter_mut()
            .find(|c| &c.id == id)
    }

    fn subcomment_mut(&mut self, id: &NodeId) -> Option<&mut Subcomment> {
        let parent = self.subcomment_parent.get(id)?.clone();
        self.comment_mut(&parent)?
            .subcomments
            .iter_mut()
            .find(|s| &s.id == id)
    }

    fn content_slot(&mut self, key: &NodeKey) -> Option<&mut String> {
        match key.kind {
            NodeKind::Post => self.post_mut(&key.id).map(|p| &mut p.content),
            NodeKind::Comment => self.comment_mut(&key.id).map(|c| &mut c.content),
            NodeKind::Subcomment => self.subcomment_mut(&key.id).map(|s| &mut s.content),
        }
    }

    fn forget_comment(&mut self, comment: &Comment) {
        self.comment_parent.remove(&comment.id);
        for subcomment in &comment.subcomments {
            self.subcomment_parent.remove(&subcomment.id);
        }
    }
}
