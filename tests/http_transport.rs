use std::time::Duration;

use feed_sync::event::{DeleteRequest, Inbound, Outbound, PageRequest, ReportRequest, UserRef};
use feed_sync::model::NodeId;
use feed_sync::session::CurrentUser;
use feed_sync::transport::{Backoff, HttpTransport, Transport};
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use url::Url;

fn transport(server: &MockServer) -> (HttpTransport, UnboundedReceiver<Inbound>) {
    let (tx, rx) = unbounded_channel();
    let t = HttpTransport::new(
        Url::parse(&server.url("/")).unwrap(),
        "test-agent",
        CurrentUser {
            id: 7,
            name: "alice".to_string(),
            avatar_url: "/a.png".to_string(),
        },
        tx,
    )
    .unwrap()
    .with_backoff(Backoff {
        initial: Duration::from_millis(1),
        max: Duration::from_millis(5),
        attempts: 3,
    });
    (t, rx)
}

#[tokio::test]
async fn delete_posts_json_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/delete_message")
            .json_body(json!({ "message_id": "m1", "user_id": 7 }));
        then.status(200).body("{}");
    });

    let (t, _rx) = transport(&server);
    t.send(Outbound::DeletePost(DeleteRequest {
        id: NodeId::from("m1"),
        user_id: 7,
    }))
    .await
    .unwrap();
    mock.assert();
}

#[tokio::test]
async fn recent_messages_reply_is_forwarded() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/get_recent_messages")
            .query_param("offset", "10")
            .query_param("limit", "10");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(json!({
                "messages": [
                    { "id": 11, "user_id": 2, "username": "bob", "content": "hello", "likes": 3 }
                ],
                "hasMoreMessages": true
            }));
    });

    let (t, mut rx) = transport(&server);
    t.send(Outbound::GetRecentMessages(PageRequest {
        offset: 10,
        limit: 10,
    }))
    .await
    .unwrap();

    match rx.try_recv().unwrap() {
        Inbound::RecentMessages(page) => {
            assert!(page.has_more);
            assert_eq!(page.messages.len(), 1);
            assert_eq!(page.messages[0].id, NodeId::from("11"));
            assert_eq!(page.messages[0].author.author_name, "bob");
            assert_eq!(page.messages[0].like_count, 3);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn ignored_users_reply_is_forwarded() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/get_ignored_users/7");
        then.status(200).json_body(json!({ "ignored_users": [3, 4] }));
    });

    let (t, mut rx) = transport(&server);
    t.send(Outbound::GetIgnoredUsers(UserRef { user_id: 7 }))
        .await
        .unwrap();

    assert!(matches!(
        rx.try_recv().unwrap(),
        Inbound::IgnoredUsers(users) if users == vec![3, 4]
    ));
}

#[tokio::test]
async fn throttled_requests_back_off_then_fail() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/check_user");
        then.status(429);
    });

    let (t, _rx) = transport(&server);
    let err = feed_sync::transport::join_with_retry(
        &t,
        "room",
        Backoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(1),
            attempts: 1,
        },
    )
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("failed after retries"));
    mock.assert_hits(3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/delete_comment");
        then.status(403);
    });

    let (t, _rx) = transport(&server);
    let err = t
        .send(Outbound::DeleteComment(DeleteRequest {
            id: NodeId::from("c1"),
            user_id: 7,
        }))
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("403"));
    mock.assert_hits(1);
}

#[tokio::test]
async fn id_only_recent_messages_reply_is_rejected() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/get_recent_messages");
        then.status(200)
            .json_body(json!({ "recent_messages": ["65b8f0c2e1", "65b8f0c2e2"] }));
    });

    let (t, mut rx) = transport(&server);
    let err = t
        .send(Outbound::GetRecentMessages(PageRequest {
            offset: 0,
            limit: 10,
        }))
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("2 recent post ids without content"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn report_posts_reason() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/report_message")
            .json_body(json!({ "user_id": 7, "message_id": "m1", "reason": "spam" }));
        then.status(200).body("{}");
    });

    let (t, _rx) = transport(&server);
    t.send(Outbound::ReportPost(ReportRequest {
        user_id: 7,
        id: NodeId::from("m1"),
        reason: "spam".to_string(),
    }))
    .await
    .unwrap();
    mock.assert();
}
