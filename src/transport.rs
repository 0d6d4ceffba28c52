use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::event::{Inbound, Outbound, Page};
use crate::model::UserId;
use crate::session::CurrentUser;

/// Outbound half of the real-time channel. Sending is fire-and-forget from
/// the session's point of view; whatever the server answers arrives later
/// as [`Inbound`] events.
pub trait Transport {
    fn send(&self, event: Outbound) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Keeps every event it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Transport for RecordingTransport {
    async fn send(&self, event: Outbound) -> anyhow::Result<()> {
        tracing::debug!(event = event.name(), "recorded");
        self.sent
            .lock()
            .map_err(|_| anyhow!("recording transport poisoned"))?
            .push(event);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub attempts: usize,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(10),
            attempts: 5,
        }
    }
}

/// Sends the join handshake, retrying with backoff until the server takes it.
pub async fn join_with_retry<T: Transport>(
    transport: &T,
    room: &str,
    backoff: Backoff,
) -> anyhow::Result<()> {
    let mut wait = backoff.initial;
    let attempts = backoff.attempts.max(1);
    for attempt in 1..=attempts {
        let join = Outbound::Join(crate::event::JoinRequest {
            room: room.to_string(),
        });
        match transport.send(join).await {
            Ok(()) => {
                tracing::info!(room, attempt, "joined");
                return Ok(());
            }
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    error = %e,
                    attempt,
                    wait_ms = wait.as_millis(),
                    "join failed; retrying"
                );
                tokio::time::sleep(wait).await;
                wait = (wait * 2).min(backoff.max);
            }
            Err(e) => return Err(e.context(format!("join {room} after {attempts} attempts"))),
        }
    }
    Err(anyhow!("join {room} failed"))
}

#[derive(Debug, Clone, PartialEq)]
enum Route {
    Get(String),
    Post(&'static str, Value),
}

/// Talks to the forum's HTTP API. Replies to read requests are forwarded to
/// `inbound` as if the server had pushed them.
///
/// `get_recent_messages` must accept `offset`/`limit` and answer with a full
/// page (`{"messages": [...], "hasMoreMessages": bool}`); subcomment routes
/// and comment edits follow the naming of their message counterparts.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    user: CurrentUser,
    inbound: UnboundedSender<Inbound>,
    backoff: Backoff,
}

impl HttpTransport {
    pub fn new(
        base_url: Url,
        user_agent: &str,
        user: CurrentUser,
        inbound: UnboundedSender<Inbound>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build reqwest client")?;
        Ok(Self {
            client,
            base_url,
            user,
            inbound,
            backoff: Backoff::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    fn route(&self, event: &Outbound) -> Route {
        let user = &self.user;
        match event {
            Outbound::Join(_) => Route::Post(
                "check_user",
                json!({ "user_id": user.id, "username": user.name, "avatar_url": user.avatar_url }),
            ),
            Outbound::GetRecentMessages(page) => Route::Get(format!(
                "get_recent_messages?offset={}&limit={}",
                page.offset, page.limit
            )),
            Outbound::CreatePost(d) => Route::Post(
                "create_message",
                json!({
                    "user_id": d.author_id,
                    "username": d.author_name,
                    "avatar_url": d.avatar_url,
                    "content": d.content,
                    "created_at": d.created_at,
                }),
            ),
            Outbound::CreateComment(c) => Route::Post(
                "create_comment",
                json!({ "user_id": c.draft.author_id, "message_id": c.post_id, "content": c.draft.content }),
            ),
            Outbound::CreateSubcomment(c) => Route::Post(
                "create_subcomment",
                json!({ "user_id": c.draft.author_id, "comment_id": c.comment_id, "content": c.draft.content }),
            ),
            Outbound::UpdatePost(e) => Route::Post(
                "update_message",
                json!({ "message_id": e.id, "user_id": e.user_id, "new_content": e.new_content }),
            ),
            Outbound::UpdateComment(e) => Route::Post(
                "update_comment",
                json!({ "comment_id": e.id, "user_id": e.user_id, "new_content": e.new_content }),
            ),
            Outbound::UpdateSubcomment(e) => Route::Post(
                "update_subcomment",
                json!({ "subcomment_id": e.id, "user_id": e.user_id, "new_content": e.new_content }),
            ),
            Outbound::DeletePost(d) => Route::Post(
                "delete_message",
                json!({ "message_id": d.id, "user_id": d.user_id }),
            ),
            Outbound::DeleteComment(d) => Route::Post(
                "delete_comment",
                json!({ "comment_id": d.id, "user_id": d.user_id }),
            ),
            Outbound::DeleteSubcomment(d) => Route::Post(
                "delete_subcomment",
                json!({ "subcomment_id": d.id, "user_id": d.user_id }),
            ),
            Outbound::Like(l) => Route::Post(
                "like_message",
                json!({ "user_id": l.user_id, "message_id": l.id, "kind": l.kind }),
            ),
            Outbound::RemoveLike(l) => Route::Post(
                "remove_like_message",
                json!({ "user_id": l.user_id, "message_id": l.id, "kind": l.kind }),
            ),
            Outbound::IgnoreUser(i) => Route::Post(
                "ignore_user",
                json!({ "user_id": i.user_id, "ignored_user_id": i.ignored_user_id }),
            ),
            Outbound::UnignoreUser(i) => Route::Post(
                "unignore_user",
                json!({ "user_id": i.user_id, "ignored_user_id": i.ignored_user_id }),
            ),
            Outbound::GetIgnoredUsers(u) => Route::Get(format!("get_ignored_users/{}", u.user_id)),
            Outbound::ReportPost(r) => Route::Post(
                "report_message",
                json!({ "user_id": r.user_id, "message_id": r.id, "reason": r.reason }),
            ),
            Outbound::ReportComment(r) => Route::Post(
                "report_comment",
                json!({ "user_id": r.user_id, "comment_id": r.id, "reason": r.reason }),
            ),
        }
    }

    async fn execute(&self, route: &Route) -> anyhow::Result<String> {
        let path: &str = match route {
            Route::Get(path) => path,
            Route::Post(path, _) => path,
        };
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("resolve {path}"))?;

        let mut wait = self.backoff.initial;
        let attempts = self.backoff.attempts.max(1);

        for attempt in 1..=attempts {
            let request = match route {
                Route::Get(_) => self.client.get(url.clone()),
                Route::Post(_, body) => self.client.post(url.clone()).json(body),
            };
            let resp = request
                .send()
                .await
                .with_context(|| format!("request {}", url))?;

            let status = resp.status();
            let headers = resp.headers().clone();

            if status.is_success() {
                return resp.text().await.context("read response body");
            }

            if status.as_u16() == 429 || status.as_u16() == 503 {
                let delay = retry_after_duration(&headers).unwrap_or(wait);
                tracing::warn!(
                    %status,
                    attempt,
                    wait_ms = delay.as_millis(),
                    "throttled; backing off"
                );
                tokio::time::sleep(delay).await;
                wait = (wait * 2).min(self.backoff.max);
                continue;
            }

            return Err(anyhow!("{} failed with status {}", url, status));
        }

        Err(anyhow!("{} failed after retries", url))
    }

    fn forward(&self, event: Inbound) {
        if self.inbound.send(event).is_err() {
            tracing::debug!("inbound receiver dropped; reply discarded");
        }
    }
}

#[derive(Deserialize)]
struct IgnoredUsersReply {
    ignored_users: Vec<UserId>,
}

impl Transport for HttpTransport {
    async fn send(&self, event: Outbound) -> anyhow::Result<()> {
        let route = self.route(&event);
        let body = self
            .execute(&route)
            .await
            .with_context(|| format!("send {}", event.name()))?;

        match event {
            Outbound::GetRecentMessages(_) => {
                let reply: Value = serde_json::from_str(&body).context("parse recent messages")?;
                if let Some(ids) = reply.get("recent_messages").and_then(Value::as_array) {
                    return Err(anyhow!(
                        "server listed {} recent post ids without content; paged replies with `messages` are required",
                        ids.len()
                    ));
                }
                let page: Page = serde_json::from_value(reply).context("parse recent messages")?;
                self.forward(Inbound::RecentMessages(page));
            }
            Outbound::GetIgnoredUsers(_) => {
                let reply: IgnoredUsersReply =
                    serde_json::from_str(&body).context("parse ignored users")?;
                self.forward(Inbound::IgnoredUsers(reply.ignored_users));
            }
            _ => {}
        }
        Ok(())
    }
}

fn retry_after_duration(headers: &HeaderMap) -> Option<Duration> {
    let v = headers.get(RETRY_AFTER)?;
    let s = v.to_str().ok()?.trim();
    let seconds: u64 = s.parse().ok()?;
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DeleteRequest, PageRequest, ReportRequest};
    use crate::model::NodeId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    impl Transport for Flaky {
        async fn send(&self, _event: Outbound) -> anyhow::Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }
    }

    fn quick(attempts: usize) -> Backoff {
        Backoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
            attempts,
        }
    }

    #[tokio::test]
    async fn join_retries_until_connected() {
        let flaky = Flaky {
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        join_with_retry(&flaky, "room", quick(5)).await.unwrap();
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn join_gives_up_after_attempts() {
        let flaky = Flaky {
            failures: 10,
            calls: AtomicUsize::new(0),
        };
        let err = join_with_retry(&flaky, "room", quick(3)).await.unwrap_err();
        assert!(format!("{err:#}").contains("connection refused"));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recording_transport_keeps_order() {
        let t = RecordingTransport::new();
        t.send(Outbound::GetRecentMessages(PageRequest { offset: 0, limit: 10 }))
            .await
            .unwrap();
        t.send(Outbound::DeletePost(DeleteRequest {
            id: NodeId::from("1"),
            user_id: 1,
        }))
        .await
        .unwrap();
        let names: Vec<_> = t.sent().iter().map(Outbound::name).collect();
        assert_eq!(names, ["get recent messages", "delete message"]);
    }

    #[test]
    fn routes_follow_server_endpoints() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let t = HttpTransport::new(
            Url::parse("http://localhost:5000/").unwrap(),
            "test",
            CurrentUser {
                id: 7,
                name: "alice".to_string(),
                avatar_url: String::new(),
            },
            tx,
        )
        .unwrap();

        assert_eq!(
            t.route(&Outbound::DeletePost(DeleteRequest {
                id: NodeId::from("m1"),
                user_id: 7
            })),
            Route::Post("delete_message", json!({ "message_id": "m1", "user_id": 7 }))
        );
        assert_eq!(
            t.route(&Outbound::ReportComment(ReportRequest {
                user_id: 7,
                id: NodeId::from("c1"),
                reason: "spam".to_string(),
            })),
            Route::Post(
                "report_comment",
                json!({ "user_id": 7, "comment_id": "c1", "reason": "spam" })
            )
        );
        assert_eq!(
            t.route(&Outbound::GetRecentMessages(PageRequest { offset: 20, limit: 10 })),
            Route::Get("get_recent_messages?offset=20&limit=10".to_string())
        );
    }
}
