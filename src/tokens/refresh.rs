//! On-demand token refresh.
//!
//! Callers ask for a usable access token; if the stored one cannot be
//! produced for any reason we fall back to the refresh grant rather than
//! trying to distinguish expiry from other faults.

use crate::error::{AuthError, AuthResult};
use crate::provider::ProviderRegistry;
use crate::tokens::{TokenData, TokenKind, TokenStore};
use std::sync::Arc;
use tracing::{debug, info};

pub struct TokenRefresher {
    registry: Arc<ProviderRegistry>,
    tokens: Arc<TokenStore>,
}

impl TokenRefresher {
    pub fn new(registry: Arc<ProviderRegistry>, tokens: Arc<TokenStore>) -> Self {
        Self { registry, tokens }
    }

    /// Return an access token for the key, refreshing through the provider
    /// when the stored one is unusable.
    pub async fn ensure_fresh(
        &self,
        user_id: &str,
        provider_name: &str,
        purpose: &str,
    ) -> AuthResult<TokenData> {
        match self
            .tokens
            .get(user_id, provider_name, purpose, TokenKind::Access)
        {
            Ok(access) => return Ok(access),
            Err(e) => {
                debug!(user_id = %user_id, provider = %provider_name, error = %e, "stored access token unusable, refreshing");
            }
        }

        let stored_refresh = self
            .tokens
            .get(user_id, provider_name, purpose, TokenKind::Refresh)
            .map_err(|_| AuthError::NoRefreshToken)?;

        let provider = self.registry.get(provider_name)?;
        let grant = provider.refresh(&stored_refresh.token).await?;

        // Providers may rotate the refresh token on use; keep the old one
        // when the response omits it
        let rotated_refresh = grant
            .refresh_token
            .unwrap_or_else(|| stored_refresh.token.clone());

        let provider_user_id = stored_refresh.provider_user_id.clone();
        self.tokens.set(
            user_id,
            provider_name,
            purpose,
            TokenKind::Refresh,
            &TokenData {
                token: rotated_refresh,
                provider_user_id: provider_user_id.clone(),
            },
        )?;

        let access = TokenData {
            token: grant.access_token,
            provider_user_id,
        };
        self.tokens
            .set(user_id, provider_name, purpose, TokenKind::Access, &access)?;

        info!(user_id = %user_id, provider = %provider_name, purpose = %purpose, "access token refreshed");
        Ok(access)
    }
}
