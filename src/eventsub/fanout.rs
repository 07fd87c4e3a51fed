//! Subscription fan-out across the chatbot roster.
//!
//! Every enrolled user gets their own subscriptions recreated against the
//! current websocket session. Subscribers are isolated from each other:
//! one user's expired grant or API rejection never stops the rest.

use crate::db::Database;
use crate::error::{AuthError, AuthResult};
use crate::tokens::{TokenData, TokenRefresher};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Roster entries all authorize through this provider and purpose.
const SUBSCRIBER_PROVIDER: &str = "twitch";
const SUBSCRIBER_PURPOSE: &str = "chatbot";

/// Event types (with versions) created for each subscriber.
const SUBSCRIBED_EVENTS: &[(&str, &str)] = &[("channel.chat.message", "1")];

/// Aggregate result of one fan-out pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FanoutSummary {
    pub attempted: usize,
    pub failed: usize,
}

pub struct SubscriptionFanout {
    db: Arc<Database>,
    refresher: Arc<TokenRefresher>,
    http: reqwest::Client,
    subscription_endpoint: String,
    client_id: String,
}

impl SubscriptionFanout {
    pub fn new(
        db: Arc<Database>,
        refresher: Arc<TokenRefresher>,
        http: reqwest::Client,
        subscription_endpoint: String,
        client_id: String,
    ) -> Self {
        Self {
            db,
            refresher,
            http,
            subscription_endpoint,
            client_id,
        }
    }

    /// Recreate subscriptions for every roster entry against the given
    /// session, concurrently. Per-subscriber failures are logged and
    /// counted, never propagated.
    pub async fn resubscribe_all(&self, session_id: &str) -> AuthResult<FanoutSummary> {
        let subscribers = self.db.list_subscribers()?;
        let attempted = subscribers.len();

        let tasks = subscribers
            .iter()
            .map(|user_id| self.resubscribe_user(user_id, session_id));
        let results = join_all(tasks).await;

        let mut failed = 0;
        for (user_id, result) in subscribers.iter().zip(results) {
            if let Err(e) = result {
                failed += 1;
                warn!(user_id = %user_id, error = %e, "subscriber fan-out entry failed");
            }
        }

        Ok(FanoutSummary { attempted, failed })
    }

    async fn resubscribe_user(&self, user_id: &str, session_id: &str) -> AuthResult<()> {
        let token = self
            .refresher
            .ensure_fresh(user_id, SUBSCRIBER_PROVIDER, SUBSCRIBER_PURPOSE)
            .await?;

        for (event_type, version) in SUBSCRIBED_EVENTS {
            self.create_subscription(&token, event_type, version, session_id)
                .await?;
        }

        info!(user_id = %user_id, "subscriber re-subscribed");
        Ok(())
    }

    async fn create_subscription(
        &self,
        token: &TokenData,
        event_type: &str,
        version: &str,
        session_id: &str,
    ) -> AuthResult<()> {
        let body = json!({
            "type": event_type,
            "version": version,
            "condition": {
                "broadcaster_user_id": token.provider_user_id,
                "user_id": token.provider_user_id,
            },
            "transport": {
                "method": "websocket",
                "session_id": session_id,
            },
        });

        let response = self
            .http
            .post(&self.subscription_endpoint)
            .header("Authorization", format!("Bearer {}", token.token))
            .header("Client-Id", &self.client_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Subscription(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(AuthError::Subscription(format!(
                "status {}: {}",
                status, body
            )));
        }

        debug!(event_type = %event_type, "eventsub subscription created");
        Ok(())
    }
}
