mod builtin;
mod cli;

pub mod event;
pub mod model;
pub mod pagination;
pub mod reconcile;
pub mod render;
pub mod session;
pub mod store;
pub mod transport;
pub mod view;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use cli::Args;
use event::Inbound;
use render::{RenderContext, Stylesheet};
use session::{CurrentUser, Session, SessionConfig};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use view::{ViewCache, ViewUpdate};

pub use cli::Args as CliArgs;

/// Replays a recorded event log through a fresh session and writes the
/// resulting feed as a standalone HTML page.
pub async fn run(args: Args) -> anyhow::Result<()> {
    let now = args.now.unwrap_or_else(Utc::now);
    let user = CurrentUser {
        id: args.user_id,
        name: args.user_name.clone(),
        avatar_url: args.avatar_url.clone(),
    };
    let config = SessionConfig {
        page_size: args.page_size,
        max_visible: args.max_visible,
        ..SessionConfig::default()
    };
    let mut session = Session::new(user, config);

    // Nothing is connected during a replay; the handshake only primes the pager.
    for request in session.start() {
        tracing::debug!(request = request.name(), "handshake not sent");
    }

    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("read {}", args.input.display()))?;
    let (tx, rx) = unbounded_channel();
    let queued = queue_events(&text, args.strict, &tx)?;
    drop(tx);

    let mut view = ViewCache::new();
    view.prime(&session, &RenderContext::for_session(&session, now));
    let mut patch_log = Vec::new();
    let mut write_err = None;
    let applied = drive(&mut session, &mut view, rx, now, |update| {
        if args.patches.is_none() || write_err.is_some() {
            return;
        }
        let line = serde_json::to_writer(&mut patch_log, update)
            .map_err(anyhow::Error::from)
            .and_then(|()| writeln!(patch_log).map_err(anyhow::Error::from));
        if let Err(e) = line {
            write_err = Some(e);
        }
    })
    .await;
    if let Some(e) = write_err {
        return Err(e.context("encode view update"));
    }

    if let Some(path) = &args.patches {
        create_parent(path)?;
        std::fs::write(path, &patch_log).with_context(|| format!("write {}", path.display()))?;
    }

    let ctx = RenderContext::for_session(&session, now);
    let stylesheet = match &args.css {
        Some(href) => Stylesheet::Linked(href),
        None => Stylesheet::Builtin,
    };
    let html = render::build_page(&session, &ctx, stylesheet);

    let out_path = args.out.clone().unwrap_or_else(|| PathBuf::from("feed.html"));
    create_parent(&out_path)?;
    std::fs::write(&out_path, html).with_context(|| format!("write {}", out_path.display()))?;

    tracing::info!(
        events = queued,
        applied,
        posts = session.store().len(),
        out = %out_path.display(),
        "feed written"
    );
    Ok(())
}

/// Applies inbound events until the channel closes, handing every non-empty
/// view update to `on_update`. Returns the number of events applied.
pub async fn drive<F>(
    session: &mut Session,
    view: &mut ViewCache,
    mut inbound: UnboundedReceiver<Inbound>,
    now: DateTime<Utc>,
    mut on_update: F,
) -> usize
where
    F: FnMut(&ViewUpdate),
{
    let mut applied = 0;
    while let Some(event) = inbound.recv().await {
        let name = event.name();
        let outcome = reconcile::apply(session, event);
        applied += 1;
        if outcome.is_empty() {
            tracing::trace!(event = name, "no effect");
            continue;
        }

        let ctx = RenderContext::for_session(session, now);
        let update = view.update(session, &outcome, &ctx);
        if !update.is_empty() {
            tracing::debug!(event = name, patches = update.patches.len(), "view updated");
            on_update(&update);
        }
    }
    applied
}

fn queue_events(text: &str, strict: bool, tx: &UnboundedSender<Inbound>) -> anyhow::Result<usize> {
    let mut queued = 0;
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(line) {
            Ok(event) => {
                tx.send(event).context("event channel closed")?;
                queued += 1;
            }
            Err(e) if strict => {
                return Err(e).with_context(|| format!("parse event on line {}", idx + 1));
            }
            Err(e) => {
                tracing::warn!(line = idx + 1, error = %e, "skipping malformed event");
            }
        }
    }
    Ok(queued)
}

fn create_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_lines_are_skipped_unless_strict() {
        let text = concat!(
            r#"{"event": "new tweet", "data": {"id": 1, "author_id": 2, "author_name": "bob", "content": "a"}}"#,
            "\n\nnot json\n",
            r#"{"event": "delete message", "data": {"id": 1}}"#,
            "\n",
        );

        let (tx, mut rx) = unbounded_channel();
        assert_eq!(queue_events(text, false, &tx).unwrap(), 2);
        assert!(matches!(rx.try_recv(), Ok(Inbound::NewPost(_))));
        assert!(matches!(rx.try_recv(), Ok(Inbound::DeletePost(_))));

        let (tx, _rx) = unbounded_channel();
        let err = queue_events(text, true, &tx).unwrap_err();
        assert!(format!("{err:#}").contains("line 3"));
    }
}
