use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use maud::{DOCTYPE, Markup, PreEscaped, html};

use crate::builtin;
use crate::model::{Author, Comment, FeedNode, NodeKey, NodeKind, Post, Subcomment, UserId};
use crate::session::Session;
use crate::store::FeedStore;

/// Inputs besides the node itself that a fragment depends on. Fixing `now`
/// keeps rendering deterministic.
pub struct RenderContext<'a> {
    pub viewer: UserId,
    pub ignored: &'a BTreeSet<UserId>,
    pub banned: &'a BTreeSet<UserId>,
    pub now: DateTime<Utc>,
}

impl<'a> RenderContext<'a> {
    pub fn for_session(session: &'a Session, now: DateTime<Utc>) -> Self {
        Self {
            viewer: session.user().id,
            ignored: session.ignored(),
            banned: session.banned(),
            now,
        }
    }

    fn hides(&self, author: &Author) -> bool {
        self.ignored.contains(&author.author_id) || self.banned.contains(&author.author_id)
    }
}

pub enum Stylesheet<'a> {
    Builtin,
    Linked(&'a str),
}

pub fn render_node(store: &FeedStore, key: &NodeKey, ctx: &RenderContext<'_>) -> Option<Markup> {
    match key.kind {
        NodeKind::Post => store.post(&key.id).map(|p| render_post(p, ctx)),
        NodeKind::Comment => store.comment(&key.id).map(|c| render_comment(c, ctx)),
        NodeKind::Subcomment => store.subcomment(&key.id).map(|s| render_subcomment(s, ctx)),
    }
}

pub fn render_post(p: &Post, ctx: &RenderContext<'_>) -> Markup {
    let key = p.key();
    if ctx.hides(&p.author) {
        return hidden_placeholder(&key, &p.author, ctx);
    }

    let comment_count = p.comments.len();
    let subcomment_count: usize = p.comments.iter().map(|c| c.subcomments.len()).sum();
    let class = if p.pending {
        "tweet-container pending"
    } else {
        "tweet-container"
    };

    html! {
        article id=(key.dom_id()) class=(class)
            data-comments=(comment_count) data-subcomments=(subcomment_count) {
            div class="tweet" {
                (node_header(&p.author, p.created_at, ctx))
                div class="tweet-content" { (p.content) }
                div class="tweet-actions" {
                    (like_button(p))
                    span class="comment-count" { (comment_count) }
                    @if !p.pending {
                        (owner_actions(p, ctx))
                    }
                }
            }
            div class="comments" {
                @for c in &p.comments {
                    (render_comment(c, ctx))
                }
            }
        }
    }
}

pub fn render_comment(c: &Comment, ctx: &RenderContext<'_>) -> Markup {
    let key = c.key();
    if ctx.hides(&c.author) {
        return hidden_placeholder(&key, &c.author, ctx);
    }

    let subcomment_count = c.subcomments.len();
    html! {
        div id=(key.dom_id()) class="comment-container" data-subcomments=(subcomment_count) {
            div class="comment" {
                (node_header(&c.author, c.created_at, ctx))
                div class="comment-content" { (c.content) }
                div class="comment-actions" {
                    (like_button(c))
                    span class="subcomment-count" { (subcomment_count) }
                    (owner_actions(c, ctx))
                }
            }
            div class="subcomments" {
                @for s in &c.subcomments {
                    (render_subcomment(s, ctx))
                }
            }
        }
    }
}

pub fn render_subcomment(s: &Subcomment, ctx: &RenderContext<'_>) -> Markup {
    let key = s.key();
    if ctx.hides(&s.author) {
        return hidden_placeholder(&key, &s.author, ctx);
    }

    html! {
        div id=(key.dom_id()) class="subcomment" {
            (node_header(&s.author, s.created_at, ctx))
            div class="subcomment-content" { (s.content) }
            div class="subcomment-actions" {
                (like_button(s))
                (owner_actions(s, ctx))
            }
        }
    }
}

/// Full standalone page for the current feed.
pub fn build_page(session: &Session, ctx: &RenderContext<'_>, stylesheet: Stylesheet<'_>) -> String {
    let store = session.store();
    let exhausted = session.pager().is_exhausted();
    let user = session.user();

    let markup: Markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "Feed" }
                @match stylesheet {
                    Stylesheet::Builtin => {
                        style { (PreEscaped(builtin::BUILTIN_CSS)) }
                    }
                    Stylesheet::Linked(href) => {
                        link rel="stylesheet" href=(href);
                    }
                }
            }
            body class="feed" {
                header class="feed-header" {
                    span class="feed-user" { (user.name) }
                    span class="feed-count" { "Posts: " (store.len()) }
                }
                main id="tweets-wrapper" class="tweets-wrapper" {
                    @for p in store.posts() {
                        (render_post(p, ctx))
                    }
                }
                (load_more(exhausted))
                script { (PreEscaped(builtin::RELAYOUT_JS)) }
            }
        }
    };
    markup.into_string()
}

pub fn load_more(exhausted: bool) -> Markup {
    html! {
        button id="load-more" type="button" class="load-more" disabled[exhausted] {
            @if exhausted { "No older posts" } @else { "Load older" }
        }
    }
}

fn node_header(author: &Author, created_at: Option<DateTime<Utc>>, ctx: &RenderContext<'_>) -> Markup {
    html! {
        div class="node-header" {
            @if !author.avatar_url.is_empty() {
                img class="avatar" width="40" height="40" src=(author.avatar_url) alt="avatar";
            }
            span class="username" data-user=(author.author_id) { (author.author_name) }
            @if let Some(created) = created_at {
                " · "
                time datetime=(created.to_rfc3339()) { (relative_time(created, ctx.now)) }
            }
        }
    }
}

fn like_button(node: &dyn FeedNode) -> Markup {
    let key = node.key();
    let (total, liked) = node.likes();
    let class = if liked { "like liked" } else { "like" };
    html! {
        button type="button" class=(class) data-action="like" data-kind=(key.kind.as_str()) data-id=(key.id.as_str()) {
            "♥ " span class="like-count" { (total) }
        }
    }
}

fn owner_actions(node: &dyn FeedNode, ctx: &RenderContext<'_>) -> Markup {
    let key = node.key();
    let own = node.author().author_id == ctx.viewer;
    html! {
        @if own {
            button type="button" class="edit" data-action="edit" data-kind=(key.kind.as_str()) data-id=(key.id.as_str()) { "Edit" }
            button type="button" class="delete" data-action="delete" data-kind=(key.kind.as_str()) data-id=(key.id.as_str()) { "Delete" }
        } @else {
            button type="button" class="ignore" data-action="ignore" data-user=(node.author().author_id) { "Ignore" }
        }
    }
}

fn hidden_placeholder(key: &NodeKey, author: &Author, ctx: &RenderContext<'_>) -> Markup {
    html! {
        @if ctx.banned.contains(&author.author_id) {
            div id=(key.dom_id()) class="banned" {
                "Hidden: " (author.author_name) " has been banned."
            }
        } @else {
            div id=(key.dom_id()) class="ignored" {
                "Hidden: " (author.author_name) " is on your ignore list. "
                button type="button" data-action="unignore" data-user=(author.author_id) { "Show" }
            }
        }
    }
}

/// Coarse age of a node, in the buckets the feed has always used.
pub fn relative_time(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(created);
    let days = age.num_days();
    let hours = age.num_hours();
    let minutes = age.num_minutes();

    if days > 1 {
        format!("{days} days ago")
    } else if days == 1 {
        "1 day ago".to_string()
    } else if hours > 1 {
        format!("{hours} hours ago")
    } else if hours == 1 {
        "1 hour ago".to_string()
    } else if minutes >= 1 {
        format!("{minutes} min ago")
    } else {
        "just now".to_string()
    }
}
