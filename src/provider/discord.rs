use super::{Provider, ProviderConfig};
use crate::error::AuthError;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Scopes requested at login. `identify` is what `users/@me` needs.
const DEFAULT_SCOPES: &[&str] = &["identify"];

pub fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

pub struct DiscordProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl DiscordProvider {
    pub fn new(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

/// Subset of the `users/@me` response we care about.
#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
}

#[async_trait]
impl Provider for DiscordProvider {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn verify_token(&self, access_token: &str) -> Result<String, AuthError> {
        debug!("validating discord access token");

        let response = self
            .http
            .get(&self.config.validate_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::IdentityVerification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::IdentityVerification(format!(
                "identity endpoint returned status {}",
                response.status()
            )));
        }

        let user: DiscordUser = response
            .json()
            .await
            .map_err(|_| AuthError::IdentityVerification("response carried no user id".to_string()))?;

        Ok(user.id)
    }
}
