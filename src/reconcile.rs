use crate::event::{Edit, Inbound, LikeUpdate, Page, Removal};
use crate::model::{Comment, NodeKey, NodeKind, Post, Subcomment};
use crate::session::{Session, Window};
use crate::store::{Applied, ChildCount, Placement};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A post entered the feed.
    Inserted(NodeKey),
    /// A node's fragment must be redrawn.
    Updated(NodeKey),
    /// A post left the feed.
    Removed(NodeKey),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub changes: Vec<Change>,
    /// Recomputed child counts of parents whose children changed.
    pub counts: Vec<(NodeKey, ChildCount)>,
    pub scroll_to_newest: bool,
    /// Set after any structural change; the view must re-run layout.
    pub relayout: bool,
    /// Every fragment may depend on what changed (e.g. the ignore list).
    pub refresh_all: bool,
    pub pager_changed: bool,
}

impl Outcome {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
            && !self.scroll_to_newest
            && !self.refresh_all
            && !self.pager_changed
    }

    fn push(&mut self, change: Change) {
        if !self.changes.contains(&change) {
            self.changes.push(change);
        }
    }
}

/// Applies one inbound event. Never fails: events aimed at nodes the store
/// does not hold are logged and dropped.
pub fn apply(session: &mut Session, event: Inbound) -> Outcome {
    tracing::trace!(event = event.name(), "reconcile");
    match event {
        Inbound::RecentMessages(page) => apply_page(session, page),
        Inbound::NewPost(post) => apply_new_post(session, post),
        Inbound::NewComment(comment) => apply_new_comment(session, comment),
        Inbound::NewSubcomment(subcomment) => apply_new_subcomment(session, subcomment),
        Inbound::UpdatePost(edit) => apply_edit(session, NodeKind::Post, edit),
        Inbound::UpdateComment(edit) => apply_edit(session, NodeKind::Comment, edit),
        Inbound::UpdateSubcomment(edit) => apply_edit(session, NodeKind::Subcomment, edit),
        Inbound::DeletePost(removal) => apply_removal(session, NodeKind::Post, removal),
        Inbound::DeleteComment(removal) => apply_removal(session, NodeKind::Comment, removal),
        Inbound::DeleteSubcomment(removal) => apply_removal(session, NodeKind::Subcomment, removal),
        Inbound::Likes(update) => apply_likes(session, update),
        Inbound::IgnoredUsers(users) => Outcome {
            refresh_all: session.set_ignored(users),
            ..Outcome::default()
        },
        Inbound::BanUser(user) => Outcome {
            refresh_all: session.set_banned(user.user_id, true),
            ..Outcome::default()
        },
        Inbound::UnbanUser(user) => Outcome {
            refresh_all: session.set_banned(user.user_id, false),
            ..Outcome::default()
        },
    }
}

fn apply_page(session: &mut Session, page: Page) -> Outcome {
    let mut outcome = Outcome::default();
    let was_exhausted = session.pager.is_exhausted();
    session.pager.on_page(page.has_more);
    outcome.pager_changed = was_exhausted != session.pager.is_exhausted();

    for post in page.messages {
        let key = NodeKey::post(post.id.clone());
        if session.store.contains(&key) {
            tracing::debug!(%key, "snapshot post already present");
            continue;
        }
        if session.store.upsert_post_at(post, Placement::Tail) == Applied::Inserted {
            outcome.push(Change::Inserted(key));
        }
    }
    trim_recent(session, &mut outcome);
    outcome.relayout = !outcome.changes.is_empty();
    outcome
}

fn apply_new_post(session: &mut Session, post: Post) -> Outcome {
    let mut outcome = Outcome::default();
    let own = post.author.author_id == session.user().id;
    let key = NodeKey::post(post.id.clone());

    if own {
        if let Some(local) = session.take_pending(&post.content) {
            if session.store.remove_post(&local) {
                outcome.push(Change::Removed(NodeKey::post(local)));
            }
        }
    }

    match session.store.upsert_post(post) {
        Applied::Inserted => outcome.push(Change::Inserted(key)),
        Applied::Updated => outcome.push(Change::Updated(key)),
        Applied::Unchanged | Applied::Ignored => {}
    }

    outcome.scroll_to_newest = if own && session.take_user_sent_post() {
        true
    } else {
        session.at_newest_edge()
    };

    trim_recent(session, &mut outcome);
    outcome.relayout = !outcome.changes.is_empty();
    outcome
}

/// Enforces the visible cap while only the newest window is shown. Posts
/// inserted by this same event and evicted right away are never drawn.
fn trim_recent(session: &mut Session, outcome: &mut Outcome) {
    if session.window() != Window::Recent {
        return;
    }
    let max = session.config().max_visible;
    for id in session.store.trim_to_max(max) {
        let key = NodeKey::post(id);
        let inserted = Change::Inserted(key.clone());
        if outcome.changes.contains(&inserted) {
            outcome.changes.retain(|c| c != &inserted);
        } else {
            outcome.push(Change::Removed(key));
        }
    }
}

fn apply_new_comment(session: &mut Session, comment: Comment) -> Outcome {
    let key = NodeKey::comment(comment.id.clone());
    let parent = NodeKey::post(comment.post_id.clone());
    let applied = session.store.upsert_comment(&parent.id, comment);
    structural(session, &key, parent, applied)
}

fn apply_new_subcomment(session: &mut Session, subcomment: Subcomment) -> Outcome {
    let key = NodeKey::subcomment(subcomment.id.clone());
    let parent = NodeKey::comment(subcomment.comment_id.clone());
    let applied = session.store.upsert_subcomment(&parent.id, subcomment);
    structural(session, &key, parent, applied)
}

/// Shared tail of child inserts: the owning post is redrawn with its new counts.
fn structural(session: &Session, key: &NodeKey, parent: NodeKey, applied: Applied) -> Outcome {
    let mut outcome = Outcome::default();
    match applied {
        Applied::Ignored => {
            tracing::warn!(%key, %parent, "reply for a node that is not in the feed");
            return outcome;
        }
        Applied::Unchanged => return outcome,
        Applied::Inserted | Applied::Updated => {}
    }

    let store = session.store();
    if let Some(post) = store.owning_post(key) {
        outcome.push(Change::Updated(NodeKey::post(post)));
    }
    record_counts(&mut outcome, session, parent);
    outcome.relayout = applied == Applied::Inserted;
    outcome
}

fn apply_edit(session: &mut Session, kind: NodeKind, edit: Edit) -> Outcome {
    let mut outcome = Outcome::default();
    let key = NodeKey { kind, id: edit.id };
    match session.store.edit_content(&key, &edit.new_content) {
        Applied::Updated => outcome.push(Change::Updated(key)),
        Applied::Ignored => tracing::debug!(%key, "edit for missing node"),
        Applied::Inserted | Applied::Unchanged => {}
    }
    outcome
}

fn apply_removal(session: &mut Session, kind: NodeKind, removal: Removal) -> Outcome {
    let mut outcome = Outcome::default();
    let key = NodeKey {
        kind,
        id: removal.id,
    };
    let parent = session.store.parent_of(&key);
    let owner = session.store.owning_post(&key);

    if !session.store.remove(&key) {
        tracing::debug!(%key, "delete for missing node");
        return outcome;
    }

    match (kind, owner) {
        (NodeKind::Post, _) => outcome.push(Change::Removed(key)),
        (_, Some(post)) => outcome.push(Change::Updated(NodeKey::post(post))),
        (_, None) => {}
    }
    if let Some(parent) = parent {
        record_counts(&mut outcome, session, parent);
    }
    outcome.relayout = true;
    outcome
}

fn apply_likes(session: &mut Session, update: LikeUpdate) -> Outcome {
    let mut outcome = Outcome::default();
    let Some(key) = session.store.resolve(update.kind, &update.id) else {
        tracing::debug!(id = %update.id, kind = ?update.kind, "likes for missing node");
        return outcome;
    };
    let LikeUpdate { likes, .. } = update;
    if session.store.set_likes(&key, likes.total, likes.user_liked) == Applied::Updated {
        outcome.push(Change::Updated(key));
    }
    outcome
}

fn record_counts(outcome: &mut Outcome, session: &Session, parent: NodeKey) {
    let store = session.store();
    let grandparent = store.parent_of(&parent);
    for key in std::iter::once(parent).chain(grandparent) {
        if let Some(count) = store.child_count(&key) {
            outcome.counts.push((key, count));
        }
    }
}
