//! TOML configuration.
//!
//! Endpoints and operational knobs live in the config file; client secrets
//! and the token master key come from the environment only
//! (`LUTRA_OAUTH_{PROVIDER}_CLIENT_ID`/`_CLIENT_SECRET`,
//! `LUTRA_MASTER_KEY`) so secrets never land on disk next to the config.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Complete lutra configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub eventsub: EventSubConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "lutra.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// EventSub session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EventSubConfig {
    /// Whether to run the event-stream session at all
    #[serde(default = "default_eventsub_enabled")]
    pub enabled: bool,
    /// WebSocket endpoint delivering session/keepalive/notification messages
    #[serde(default = "default_eventsub_websocket_url")]
    pub websocket_url: String,
    /// REST endpoint accepting subscription create requests
    #[serde(default = "default_subscription_endpoint")]
    pub subscription_endpoint: String,
}

fn default_eventsub_enabled() -> bool {
    true
}

fn default_eventsub_websocket_url() -> String {
    "wss://eventsub.wss.twitch.tv/ws".to_string()
}

fn default_subscription_endpoint() -> String {
    "https://api.twitch.tv/helix/eventsub/subscriptions".to_string()
}

impl Default for EventSubConfig {
    fn default() -> Self {
        Self {
            enabled: default_eventsub_enabled(),
            websocket_url: default_eventsub_websocket_url(),
            subscription_endpoint: default_subscription_endpoint(),
        }
    }
}

/// Per-provider OAuth endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_twitch_endpoints")]
    pub twitch: ProviderEndpoints,
    #[serde(default = "default_discord_endpoints")]
    pub discord: ProviderEndpoints,
}

/// OAuth endpoint set for a single provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpoints {
    /// Authorization page the browser is redirected to
    pub code_endpoint: String,
    /// Token endpoint for code exchange and refresh grants
    pub token_endpoint: String,
    /// Identity endpoint used to verify issued access tokens
    pub validate_endpoint: String,
    /// Redirect URI registered with the provider
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

fn default_redirect_uri() -> String {
    "http://localhost:8080/auth/v1/callback".to_string()
}

fn default_twitch_endpoints() -> ProviderEndpoints {
    ProviderEndpoints {
        code_endpoint: "https://id.twitch.tv/oauth2/authorize".to_string(),
        token_endpoint: "https://id.twitch.tv/oauth2/token".to_string(),
        validate_endpoint: "https://id.twitch.tv/oauth2/validate".to_string(),
        redirect_uri: default_redirect_uri(),
    }
}

fn default_discord_endpoints() -> ProviderEndpoints {
    ProviderEndpoints {
        code_endpoint: "https://discord.com/api/oauth2/authorize".to_string(),
        token_endpoint: "https://discord.com/api/oauth2/token".to_string(),
        validate_endpoint: "https://discord.com/api/users/@me".to_string(),
        redirect_uri: default_redirect_uri(),
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            twitch: default_twitch_endpoints(),
            discord: default_discord_endpoints(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            eventsub: EventSubConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_settings(path: &str) -> Result<Settings> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path))?;
    Ok(settings)
}
