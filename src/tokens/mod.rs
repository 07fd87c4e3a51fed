//! Encrypted token storage with a read-through cache.
//!
//! Tokens live encrypted in the database and decrypted in an in-process
//! cache. The cache is populated only after a durable write or a
//! successful decrypt, so it can never hold a value the database does not
//! back.

pub mod refresh;

pub use refresh::TokenRefresher;

use crate::crypto::SecretCodec;
use crate::db::{Database, TokenRow};
use crate::error::{AuthError, AuthResult};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Internal validity window stamped on stored tokens.
pub const TOKEN_TTL_SECONDS: i64 = 3600;

/// Which of a grant's two tokens a row holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }
}

/// A decrypted token and the provider-side account it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenData {
    pub token: String,
    pub provider_user_id: String,
}

type CacheKey = (String, String, String, TokenKind);

pub struct TokenStore {
    db: Arc<Database>,
    codec: SecretCodec,
    cache: DashMap<CacheKey, TokenData>,
}

impl TokenStore {
    pub fn new(db: Arc<Database>, codec: SecretCodec) -> Self {
        Self {
            db,
            codec,
            cache: DashMap::new(),
        }
    }

    /// Encrypt and persist a token, overwriting any existing row for the
    /// same key. The cache entry is replaced only after the write lands.
    pub fn set(
        &self,
        user_id: &str,
        provider: &str,
        purpose: &str,
        kind: TokenKind,
        data: &TokenData,
    ) -> AuthResult<()> {
        let ciphertext = self.codec.encrypt(&data.token)?;

        let now = Utc::now();
        let row = TokenRow {
            user_id: user_id.to_string(),
            provider: provider.to_string(),
            purpose: purpose.to_string(),
            token_type: kind.as_str().to_string(),
            ciphertext,
            provider_user_id: data.provider_user_id.clone(),
            expires_at: now + Duration::seconds(TOKEN_TTL_SECONDS),
        };
        self.db.upsert_token(&row)?;

        self.cache.insert(
            cache_key(user_id, provider, purpose, kind),
            data.clone(),
        );

        debug!(user_id = %user_id, provider = %provider, kind = %kind.as_str(), "token stored");
        Ok(())
    }

    /// Fetch a token, serving from cache when possible.
    ///
    /// A row that fails to decrypt is an error, never an absent token, and
    /// it never enters the cache.
    pub fn get(
        &self,
        user_id: &str,
        provider: &str,
        purpose: &str,
        kind: TokenKind,
    ) -> AuthResult<TokenData> {
        let key = cache_key(user_id, provider, purpose, kind);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let stored = self
            .db
            .get_token(user_id, provider, purpose, kind.as_str())?
            .ok_or(AuthError::NotFound)?;

        let token = self.codec.decrypt(&stored.ciphertext)?;
        let data = TokenData {
            token,
            provider_user_id: stored.provider_user_id,
        };

        self.cache.insert(key, data.clone());
        Ok(data)
    }

    /// Drop every cached entry. Subsequent reads go back to the database.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn cache_key(user_id: &str, provider: &str, purpose: &str, kind: TokenKind) -> CacheKey {
    (
        user_id.to_string(),
        provider.to_string(),
        purpose.to_string(),
        kind,
    )
}
