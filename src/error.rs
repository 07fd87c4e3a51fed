//! Error taxonomy for the token lifecycle engine.
//!
//! Every fallible engine operation returns one of these variants so callers
//! can branch on classification rather than string matching. Display output
//! carries classification and context only; raw tokens and client secrets
//! must never appear here.

use thiserror::Error;

/// Errors produced by the authorization pipeline, token store, refresher,
/// and subscription fan-out.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No caller identity was supplied with the request.
    #[error("caller identity missing or invalid")]
    Unauthenticated,

    /// The provider reported an error in the redirect, or no code was sent.
    #[error("authorization denied by provider")]
    AuthorizationDenied,

    /// State row missing, expired, already consumed, or owned by another
    /// user. Deliberately one classification for all of those cases.
    #[error("authorization state is invalid or expired")]
    InvalidState,

    /// Provider name with no registered implementation.
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    /// The code-for-token exchange failed (transport or provider error).
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// Granted scopes differ from the scopes the login requested.
    #[error("granted scopes do not match requested scopes")]
    ScopeMismatch,

    /// The provider's identity endpoint rejected the access token or
    /// returned no usable identity.
    #[error("identity verification failed: {0}")]
    IdentityVerification(String),

    /// A token row could not be written during the callback flow.
    #[error("failed to persist token")]
    TokenPersist,

    /// Ciphertext failed authentication or was malformed.
    #[error("token decryption failed")]
    Decryption,

    /// Plaintext could not be sealed.
    #[error("token encryption failed")]
    Encryption,

    /// Refresh was required but no refresh token is stored; the user must
    /// re-authenticate.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The refresh grant was rejected by the provider.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// No token row exists for the requested key.
    #[error("token not found")]
    NotFound,

    /// An event subscription request was rejected.
    #[error("subscription request failed: {0}")]
    Subscription(String),

    /// Persistent storage failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;
