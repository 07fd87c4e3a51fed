//! The authorization-code callback pipeline.
//!
//! `complete` walks the callback through identity, state, exchange, scope,
//! and verification checks in a fixed order, so every failure maps to one
//! specific error class and nothing is persisted before the grant is fully
//! vetted.

use crate::db::Database;
use crate::error::{AuthError, AuthResult};
use crate::oauth::state::StateManager;
use crate::provider::ProviderRegistry;
use crate::tokens::{TokenData, TokenKind, TokenStore};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Query parameters a provider may send to the callback endpoint.
#[derive(Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// What a successful callback established.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthOutcome {
    pub user_id: String,
    pub provider: String,
    pub purpose: String,
}

pub struct AuthPipeline {
    registry: Arc<ProviderRegistry>,
    states: StateManager,
    tokens: Arc<TokenStore>,
    db: Arc<Database>,
}

impl AuthPipeline {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        states: StateManager,
        tokens: Arc<TokenStore>,
        db: Arc<Database>,
    ) -> Self {
        Self {
            registry,
            states,
            tokens,
            db,
        }
    }

    /// Start an authorization: issue a state token and build the provider's
    /// consent page URL.
    pub fn begin(
        &self,
        user_id: &str,
        provider_name: &str,
        purpose: &str,
        force_verify: bool,
    ) -> AuthResult<String> {
        let provider = self.registry.get(provider_name)?;
        let row = self.states.create_state(user_id, provider_name, purpose)?;

        info!(user_id = %user_id, provider = %provider_name, purpose = %purpose, "authorization started");
        Ok(provider.authorize_url(&row.state, force_verify))
    }

    /// Complete an authorization from the provider's callback.
    pub async fn complete(
        &self,
        identity: Option<String>,
        query: CallbackQuery,
    ) -> AuthResult<AuthOutcome> {
        let user_id = identity.ok_or(AuthError::Unauthenticated)?;

        if let Some(denied) = query.error {
            warn!(
                user_id = %user_id,
                error = %denied,
                description = %query.error_description.as_deref().unwrap_or(""),
                "provider denied authorization"
            );
            return Err(AuthError::AuthorizationDenied);
        }
        let code = query.code.ok_or(AuthError::AuthorizationDenied)?;

        let state = query.state.ok_or(AuthError::InvalidState)?;
        let entry = self.states.consume_state(&user_id, &state)?;

        let provider = self.registry.get(&entry.provider)?;

        let grant = provider.exchange_code(&code).await?;
        let refresh_token = grant.refresh_token.ok_or_else(|| {
            AuthError::TokenExchange("token response carried no refresh token".to_string())
        })?;

        let requested = query.scope.unwrap_or_default();
        if !scopes_match(&requested, &grant.scope) {
            warn!(user_id = %user_id, provider = %entry.provider, "granted scopes differ from requested scopes");
            return Err(AuthError::ScopeMismatch);
        }

        let provider_user_id = provider.verify_token(&grant.access_token).await?;

        // Two separate writes; if the second fails the refresh token alone
        // is still usable to mint a new access token later.
        self.store_token(&entry, TokenKind::Refresh, &refresh_token, &provider_user_id)?;
        self.store_token(&entry, TokenKind::Access, &grant.access_token, &provider_user_id)?;

        if entry.purpose == "chatbot" {
            if let Err(e) = self.db.add_subscriber(&user_id) {
                warn!(user_id = %user_id, error = %e, "failed to add event subscriber");
            }
        }

        info!(
            user_id = %user_id,
            provider = %entry.provider,
            purpose = %entry.purpose,
            provider_user_id = %provider_user_id,
            "authorization completed"
        );

        Ok(AuthOutcome {
            user_id,
            provider: entry.provider,
            purpose: entry.purpose,
        })
    }

    fn store_token(
        &self,
        entry: &crate::db::StateRow,
        kind: TokenKind,
        token: &str,
        provider_user_id: &str,
    ) -> AuthResult<()> {
        let data = TokenData {
            token: token.to_string(),
            provider_user_id: provider_user_id.to_string(),
        };
        self.tokens
            .set(&entry.user_id, &entry.provider, &entry.purpose, kind, &data)
            .map_err(|e| {
                error!(
                    user_id = %entry.user_id,
                    provider = %entry.provider,
                    kind = %kind.as_str(),
                    error = %e,
                    "failed to persist token"
                );
                AuthError::TokenPersist
            })
    }
}

/// Compare the scopes echoed back on the callback against the scopes the
/// grant actually carries. Order never matters.
pub fn scopes_match(requested: &str, granted: &[String]) -> bool {
    let mut requested: Vec<&str> = requested.split_whitespace().collect();
    let mut granted: Vec<&str> = granted.iter().map(String::as_str).collect();
    requested.sort_unstable();
    granted.sort_unstable();
    requested == granted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granted(scopes: &[&str]) -> Vec<String> {
        scopes.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scopes_match_ignores_order() {
        assert!(scopes_match("a b", &granted(&["b", "a"])));
        assert!(scopes_match("b a", &granted(&["a", "b"])));
    }

    #[test]
    fn test_scopes_match_exact() {
        assert!(scopes_match(
            "user:read:chat bits:read",
            &granted(&["user:read:chat", "bits:read"])
        ));
    }

    #[test]
    fn test_scopes_mismatch_on_subset() {
        assert!(!scopes_match("a b", &granted(&["a"])));
        assert!(!scopes_match("a", &granted(&["a", "b"])));
    }

    #[test]
    fn test_scopes_mismatch_on_different() {
        assert!(!scopes_match("a", &granted(&["b"])));
    }

    #[test]
    fn test_scopes_match_empty() {
        assert!(scopes_match("", &granted(&[])));
        assert!(!scopes_match("", &granted(&["a"])));
        assert!(!scopes_match("a", &granted(&[])));
    }

    #[test]
    fn test_callback_query_from_url() {
        let query: CallbackQuery =
            serde_urlencoded::from_str("code=abc&state=xyz&scope=a%20b").unwrap();
        assert_eq!(query.code.as_deref(), Some("abc"));
        assert_eq!(query.state.as_deref(), Some("xyz"));
        assert_eq!(query.scope.as_deref(), Some("a b"));
        assert!(query.error.is_none());
    }

    #[test]
    fn test_callback_query_error_variant() {
        let query: CallbackQuery =
            serde_urlencoded::from_str("error=access_denied&error_description=denied&state=xyz")
                .unwrap();
        assert_eq!(query.error.as_deref(), Some("access_denied"));
        assert_eq!(query.error_description.as_deref(), Some("denied"));
        assert!(query.code.is_none());
    }
}
