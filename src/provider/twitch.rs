use super::{Provider, ProviderConfig};
use crate::error::AuthError;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Scopes requested for chatbot logins.
const DEFAULT_SCOPES: &[&str] = &[
    "user:read:chat",
    "moderator:read:followers",
    "channel:read:subscriptions",
    "bits:read",
    "channel:read:polls",
    "channel:read:charity",
    "channel:read:goals",
    "channel:read:hype_train",
    "channel:read:redemptions",
];

pub fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

pub struct TwitchProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl TwitchProvider {
    pub fn new(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

/// Subset of the validate endpoint response we care about.
#[derive(Debug, Deserialize)]
struct ValidateResponse {
    user_id: String,
}

#[async_trait]
impl Provider for TwitchProvider {
    fn name(&self) -> &'static str {
        "twitch"
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn verify_token(&self, access_token: &str) -> Result<String, AuthError> {
        debug!("validating twitch access token");

        let response = self
            .http
            .get(&self.config.validate_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::IdentityVerification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::IdentityVerification(format!(
                "validate endpoint returned status {}",
                response.status()
            )));
        }

        let validated: ValidateResponse = response
            .json()
            .await
            .map_err(|_| AuthError::IdentityVerification("response carried no user_id".to_string()))?;

        Ok(validated.user_id)
    }
}
