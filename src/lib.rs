// Error types shared across the crate
pub mod error;

// Caller identity extraction
pub mod auth;

// Runtime configuration
pub mod config;

// Token sealing (AES-256-GCM)
pub mod crypto;

// SQLite persistence
pub mod db;

// OAuth provider implementations
pub mod provider;

// Authorization flow: CSRF state and the callback pipeline
pub mod oauth;

// Encrypted token storage and refresh
pub mod tokens;

// EventSub session and subscriber fan-out
pub mod eventsub;

// HTTP API
pub mod api;
