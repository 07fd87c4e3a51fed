//! OAuth provider implementations and the registry that selects them.
//!
//! Each provider carries its endpoints, client credentials, and scope
//! list, and knows how to verify an access token against its own identity
//! endpoint. The code-exchange and refresh grants are standard OAuth 2.0
//! form posts shared by every provider.

mod discord;
mod twitch;

pub use discord::DiscordProvider;
pub use twitch::TwitchProvider;

use crate::config::ProvidersConfig;
use crate::error::AuthError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// OAuth configuration for a single provider
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// Authorization page URL (browser redirect target)
    pub code_endpoint: String,

    /// Token endpoint for code exchange and refresh grants
    pub token_endpoint: String,

    /// Identity endpoint used to verify issued access tokens
    pub validate_endpoint: String,

    /// Redirect URI registered with the provider
    pub redirect_uri: String,

    /// Client ID (from environment variable)
    pub client_id: String,

    /// Client secret (from environment variable)
    pub client_secret: String,

    /// Scopes requested at login
    pub scopes: Vec<String>,
}

/// Token endpoint response, for both the authorization_code and
/// refresh_token grants.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default, deserialize_with = "de_scope")]
    pub scope: Vec<String>,
}

/// Providers disagree on the wire shape of `scope`: Twitch returns a JSON
/// array, Discord a single space-joined string, and some responses omit it.
fn de_scope<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ScopeField {
        List(Vec<String>),
        Joined(String),
    }

    match Option::<ScopeField>::deserialize(deserializer)? {
        Some(ScopeField::List(scopes)) => Ok(scopes),
        Some(ScopeField::Joined(joined)) => {
            Ok(joined.split_whitespace().map(str::to_string).collect())
        }
        None => Ok(Vec::new()),
    }
}

/// A single OAuth provider.
///
/// The grant flows are shared default implementations; only token
/// verification differs per provider (endpoint shape and identity field).
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn config(&self) -> &ProviderConfig;

    fn http(&self) -> &reqwest::Client;

    /// Build the authorization page URL the browser is redirected to.
    fn authorize_url(&self, state: &str, force_verify: bool) -> String {
        let config = self.config();
        let scopes = config.scopes.join(" ");
        format!(
            "{}?client_id={}&force_verify={}&redirect_uri={}&response_type=code&scope={}&state={}",
            config.code_endpoint,
            urlencoding::encode(&config.client_id),
            force_verify,
            urlencoding::encode(&config.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        let config = self.config();
        let form = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", config.redirect_uri.as_str()),
        ];

        debug!(provider = %self.name(), "exchanging authorization code");

        let response = self
            .http()
            .post(&config.token_endpoint)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(AuthError::TokenExchange(format!(
                "status {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))
    }

    /// Mint a new access token from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let config = self.config();
        let form = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        debug!(provider = %self.name(), "refreshing access token");

        let response = self
            .http()
            .post(&config.token_endpoint)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(AuthError::RefreshFailed(format!(
                "status {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))
    }

    /// Verify an access token against the provider's identity endpoint and
    /// return the provider-side user id it belongs to.
    async fn verify_token(&self, access_token: &str) -> Result<String, AuthError>;
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider").field("name", &self.name()).finish()
    }
}

/// Lookup table from provider name to implementation.
///
/// Unknown names are an error, never a silent default.
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.name(), p)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, AuthError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::UnknownProvider(name.to_string()))
    }
}

/// Read a provider's client credentials from
/// `LUTRA_OAUTH_{NAME}_CLIENT_ID` / `LUTRA_OAUTH_{NAME}_CLIENT_SECRET`.
pub fn client_credentials_from_env(provider_name: &str) -> Result<(String, String)> {
    let env_prefix = provider_name.to_uppercase();
    let client_id = std::env::var(format!("LUTRA_OAUTH_{}_CLIENT_ID", env_prefix))
        .with_context(|| format!("LUTRA_OAUTH_{}_CLIENT_ID is required", env_prefix))?;
    let client_secret = std::env::var(format!("LUTRA_OAUTH_{}_CLIENT_SECRET", env_prefix))
        .with_context(|| format!("LUTRA_OAUTH_{}_CLIENT_SECRET is required", env_prefix))?;
    Ok((client_id, client_secret))
}

/// Build the registry from configured endpoints plus environment
/// credentials.
pub fn registry_from_settings(
    providers: &ProvidersConfig,
    http: reqwest::Client,
) -> Result<ProviderRegistry> {
    let (twitch_id, twitch_secret) = client_credentials_from_env("twitch")?;
    let twitch = TwitchProvider::new(
        ProviderConfig {
            code_endpoint: providers.twitch.code_endpoint.clone(),
            token_endpoint: providers.twitch.token_endpoint.clone(),
            validate_endpoint: providers.twitch.validate_endpoint.clone(),
            redirect_uri: providers.twitch.redirect_uri.clone(),
            client_id: twitch_id,
            client_secret: twitch_secret,
            scopes: twitch::default_scopes(),
        },
        http.clone(),
    );

    let (discord_id, discord_secret) = client_credentials_from_env("discord")?;
    let discord = DiscordProvider::new(
        ProviderConfig {
            code_endpoint: providers.discord.code_endpoint.clone(),
            token_endpoint: providers.discord.token_endpoint.clone(),
            validate_endpoint: providers.discord.validate_endpoint.clone(),
            redirect_uri: providers.discord.redirect_uri.clone(),
            client_id: discord_id,
            client_secret: discord_secret,
            scopes: discord::default_scopes(),
        },
        http.clone(),
    );

    Ok(ProviderRegistry::new(vec![
        Arc::new(twitch) as Arc<dyn Provider>,
        Arc::new(discord) as Arc<dyn Provider>,
    ]))
}
