use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::{FeedNode, NodeId, NodeKey, NodeKind, Post};
use crate::reconcile::{Change, Outcome};
use crate::render::{self, RenderContext};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Patch {
    /// Insert a new post before `before`, or at the end of the feed.
    Insert {
        dom_id: String,
        before: Option<String>,
        html: String,
    },
    Replace {
        dom_id: String,
        html: String,
    },
    Remove {
        dom_id: String,
    },
    LoadMore {
        enabled: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewUpdate {
    pub patches: Vec<Patch>,
    pub scroll_to_newest: bool,
    /// Call the page's re-layout hook once the patches are applied.
    pub relayout: bool,
}

impl ViewUpdate {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty() && !self.scroll_to_newest && !self.relayout
    }
}

/// Fingerprints of the fragments currently on screen. A node whose markup
/// hashes the same as last time produces no patch.
#[derive(Debug, Default)]
pub struct ViewCache {
    fingerprints: HashMap<NodeKey, blake3::Hash>,
    /// Comment and subcomment keys last drawn inside each post.
    subtrees: HashMap<NodeId, HashSet<NodeKey>>,
    load_more_enabled: Option<bool>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the state of a freshly rendered full page.
    pub fn prime(&mut self, session: &Session, ctx: &RenderContext<'_>) {
        self.fingerprints.clear();
        self.subtrees.clear();
        for post in session.store().posts() {
            self.remember_post(post, ctx);
        }
        self.load_more_enabled = Some(!session.pager().is_exhausted());
    }

    pub fn update(
        &mut self,
        session: &Session,
        outcome: &Outcome,
        ctx: &RenderContext<'_>,
    ) -> ViewUpdate {
        let store = session.store();
        let mut patches = Vec::new();

        let mut replaced_posts: HashSet<NodeId> = HashSet::new();
        let mut patched_children: Vec<&NodeKey> = Vec::new();
        if outcome.refresh_all {
            for post in store.posts() {
                if let Some(patch) = self.replace_post(post, ctx) {
                    patches.push(patch);
                }
                replaced_posts.insert(post.id.clone());
            }
        }

        for change in &outcome.changes {
            match change {
                Change::Inserted(key) => {
                    let Some(post) = store.post(&key.id) else {
                        continue;
                    };
                    let html = render::render_post(post, ctx).into_string();
                    self.remember_post(post, ctx);
                    replaced_posts.insert(post.id.clone());
                    patches.push(Patch::Insert {
                        dom_id: key.dom_id(),
                        before: store
                            .following(&key.id)
                            .map(|id| NodeKey::post(id.clone()).dom_id()),
                        html,
                    });
                }
                Change::Updated(key) if key.kind == NodeKind::Post => {
                    if replaced_posts.contains(&key.id) {
                        continue;
                    }
                    let Some(post) = store.post(&key.id) else {
                        continue;
                    };
                    if let Some(patch) = self.replace_post(post, ctx) {
                        patches.push(patch);
                    }
                    replaced_posts.insert(key.id.clone());
                }
                Change::Updated(key) => {
                    let covered = store
                        .owning_post(key)
                        .is_some_and(|post| replaced_posts.contains(&post));
                    if covered {
                        continue;
                    }
                    let Some(markup) = render::render_node(store, key, ctx) else {
                        tracing::debug!(%key, "no fragment for updated node");
                        continue;
                    };
                    let html = markup.into_string();
                    if self.remember(key.clone(), &html) {
                        patches.push(Patch::Replace {
                            dom_id: key.dom_id(),
                            html,
                        });
                        patched_children.push(key);
                    }
                }
                Change::Removed(key) => {
                    self.forget(key);
                    patches.push(Patch::Remove {
                        dom_id: key.dom_id(),
                    });
                }
            }
        }

        // The enclosing fragments now show the patched child; record that so a
        // later change back to the old markup is not mistaken for a no-op.
        for key in patched_children {
            if key.kind == NodeKind::Subcomment {
                if let Some(comment) = store.parent_of(key).and_then(|c| store.comment(&c.id)) {
                    let html = render::render_comment(comment, ctx).into_string();
                    self.remember(comment.key(), &html);
                }
            }
            if let Some(post) = store.owning_post(key).and_then(|id| store.post(&id)) {
                let html = render::render_post(post, ctx).into_string();
                self.remember(post.key(), &html);
            }
        }

        let enabled = !session.pager().is_exhausted();
        if self.load_more_enabled != Some(enabled) {
            self.load_more_enabled = Some(enabled);
            patches.push(Patch::LoadMore { enabled });
        }

        ViewUpdate {
            patches,
            scroll_to_newest: outcome.scroll_to_newest,
            relayout: outcome.relayout,
        }
    }

    fn replace_post(&mut self, post: &Post, ctx: &RenderContext<'_>) -> Option<Patch> {
        let key = NodeKey::post(post.id.clone());
        let html = render::render_post(post, ctx).into_string();
        let changed = self.remember(key.clone(), &html);
        self.remember_children(post, ctx);
        changed.then(|| Patch::Replace {
            dom_id: key.dom_id(),
            html,
        })
    }

    fn remember_post(&mut self, post: &Post, ctx: &RenderContext<'_>) {
        let html = render::render_post(post, ctx).into_string();
        self.remember(NodeKey::post(post.id.clone()), &html);
        self.remember_children(post, ctx);
    }

    /// Fingerprints every child of `post` and drops those of children that
    /// are gone since the post was last drawn.
    fn remember_children(&mut self, post: &Post, ctx: &RenderContext<'_>) {
        let mut drawn = HashSet::new();
        for comment in &post.comments {
            let html = render::render_comment(comment, ctx).into_string();
            let key = NodeKey::comment(comment.id.clone());
            self.remember(key.clone(), &html);
            drawn.insert(key);
            for subcomment in &comment.subcomments {
                let html = render::render_subcomment(subcomment, ctx).into_string();
                let key = NodeKey::subcomment(subcomment.id.clone());
                self.remember(key.clone(), &html);
                drawn.insert(key);
            }
        }

        if let Some(previous) = self.subtrees.insert(post.id.clone(), drawn) {
            let current = &self.subtrees[&post.id];
            let stale: Vec<NodeKey> = previous.difference(current).cloned().collect();
            for key in stale {
                self.fingerprints.remove(&key);
            }
        }
    }

    /// Drops a node's fingerprint along with everything drawn inside it.
    fn forget(&mut self, key: &NodeKey) {
        self.fingerprints.remove(key);
        if key.kind == NodeKind::Post {
            for child in self.subtrees.remove(&key.id).unwrap_or_default() {
                self.fingerprints.remove(&child);
            }
        }
    }

    /// Stores the fingerprint of `html`; returns whether it differs from the
    /// previous one.
    fn remember(&mut self, key: NodeKey, html: &str) -> bool {
        let hash = blake3::hash(html.as_bytes());
        self.fingerprints.insert(key, hash) != Some(hash)
    }
}
