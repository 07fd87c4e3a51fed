// Integration tests for EventSub subscriber fan-out

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use lutra::crypto::SecretCodec;
use lutra::db::Database;
use lutra::eventsub::{EventSession, FanoutSummary, SubscriptionFanout};
use lutra::provider::ProviderRegistry;
use lutra::tokens::{TokenData, TokenKind, TokenRefresher, TokenStore};
use std::sync::Arc;

fn build_fanout(subscription_endpoint: String) -> (Arc<SubscriptionFanout>, Arc<Database>, Arc<TokenStore>) {
    let db = Arc::new(Database::open(":memory:").unwrap());
    let key = BASE64.encode(&[0u8; 32]);
    let tokens = Arc::new(TokenStore::new(
        Arc::clone(&db),
        SecretCodec::new(&key).unwrap(),
    ));
    // Stored access tokens short-circuit the refresher, so no providers
    // are needed here
    let registry = Arc::new(ProviderRegistry::new(vec![]));
    let refresher = Arc::new(TokenRefresher::new(registry, Arc::clone(&tokens)));

    let fanout = Arc::new(SubscriptionFanout::new(
        Arc::clone(&db),
        refresher,
        reqwest::Client::new(),
        subscription_endpoint,
        "cid".to_string(),
    ));
    (fanout, db, tokens)
}

fn seed_access_token(tokens: &TokenStore, user_id: &str, provider_user_id: &str) {
    tokens
        .set(
            user_id,
            "twitch",
            "chatbot",
            TokenKind::Access,
            &TokenData {
                token: format!("at-{}", user_id),
                provider_user_id: provider_user_id.to_string(),
            },
        )
        .unwrap();
}

#[tokio::test]
async fn test_fanout_isolates_failing_subscriber() {
    let mut server = mockito::Server::new_async().await;
    let subs_mock = server
        .mock("POST", "/subscriptions")
        .with_status(202)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":[{"id":"sub-1","status":"enabled"}]}"#)
        .expect(2)
        .create_async()
        .await;

    let (fanout, db, tokens) = build_fanout(format!("{}/subscriptions", server.url()));

    for user in ["u1", "u2", "u3"] {
        db.add_subscriber(user).unwrap();
    }
    seed_access_token(&tokens, "u1", "pid-1");
    seed_access_token(&tokens, "u3", "pid-3");
    // u2 has no tokens at all, so their entry fails locally

    let summary = fanout.resubscribe_all("sess-1").await.unwrap();
    assert_eq!(
        summary,
        FanoutSummary {
            attempted: 3,
            failed: 1
        }
    );

    subs_mock.assert_async().await;
}

#[tokio::test]
async fn test_fanout_counts_api_rejections() {
    let mut server = mockito::Server::new_async().await;
    let subs_mock = server
        .mock("POST", "/subscriptions")
        .with_status(500)
        .with_body("subscription service unavailable")
        .expect(2)
        .create_async()
        .await;

    let (fanout, db, tokens) = build_fanout(format!("{}/subscriptions", server.url()));

    db.add_subscriber("u1").unwrap();
    db.add_subscriber("u2").unwrap();
    seed_access_token(&tokens, "u1", "pid-1");
    seed_access_token(&tokens, "u2", "pid-2");

    // Every entry fails, but the pass itself still reports a summary
    let summary = fanout.resubscribe_all("sess-9").await.unwrap();
    assert_eq!(
        summary,
        FanoutSummary {
            attempted: 2,
            failed: 2
        }
    );

    subs_mock.assert_async().await;
}

#[tokio::test]
async fn test_subscription_request_shape() {
    let mut server = mockito::Server::new_async().await;
    let subs_mock = server
        .mock("POST", "/subscriptions")
        .match_header("authorization", "Bearer at-u1")
        .match_header("client-id", "cid")
        .match_body(mockito::Matcher::Json(serde_json::json!({
            "type": "channel.chat.message",
            "version": "1",
            "condition": {
                "broadcaster_user_id": "pid-1",
                "user_id": "pid-1",
            },
            "transport": {
                "method": "websocket",
                "session_id": "sess-1",
            },
        })))
        .with_status(202)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":[]}"#)
        .create_async()
        .await;

    let (fanout, db, tokens) = build_fanout(format!("{}/subscriptions", server.url()));
    db.add_subscriber("u1").unwrap();
    seed_access_token(&tokens, "u1", "pid-1");

    let summary = fanout.resubscribe_all("sess-1").await.unwrap();
    assert_eq!(
        summary,
        FanoutSummary {
            attempted: 1,
            failed: 0
        }
    );

    subs_mock.assert_async().await;
}

#[tokio::test]
async fn test_welcome_frame_triggers_fanout() {
    let mut server = mockito::Server::new_async().await;
    let subs_mock = server
        .mock("POST", "/subscriptions")
        .with_status(202)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":[]}"#)
        .create_async()
        .await;

    let (fanout, db, tokens) = build_fanout(format!("{}/subscriptions", server.url()));
    db.add_subscriber("u1").unwrap();
    seed_access_token(&tokens, "u1", "pid-1");

    let session = EventSession::new(fanout);
    let welcome = r#"{
        "metadata": {"message_id": "m1", "message_type": "session_welcome"},
        "payload": {
            "session": {
                "id": "sess-42",
                "status": "connected",
                "connected_at": "2024-01-01T00:00:00.000Z",
                "keepalive_timeout_seconds": 10
            }
        }
    }"#;

    session.handle_message(welcome).await.unwrap();

    assert_eq!(session.session().id, "sess-42");
    subs_mock.assert_async().await;
}
