//! Caller identity for the HTTP surface.
//!
//! Every authenticated route resolves the caller from the
//! `Authorization: Bearer <user-id>` header. The value is treated as an
//! opaque user identifier issued by the fronting identity layer; this
//! module only parses it out.

use axum::http::{header, HeaderMap};


/// Identity extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum IdentityError {
    /// Authorization header not present
    Missing,
    /// Not a `Bearer <value>` header
    InvalidFormat,
    /// Bearer value is empty
    Empty,
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::Missing => write!(f, "Caller identity not provided"),
            IdentityError::InvalidFormat => write!(f, "Invalid caller identity format"),
            IdentityError::Empty => write!(f, "Caller identity is empty"),
        }
    }
}

impl std::error::Error for IdentityError {}

/// Resolve the caller's user id from request headers.
///
/// Expected format: `Authorization: Bearer <user-id>`.
pub fn caller_identity(headers: &HeaderMap) -> Result<String, IdentityError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(IdentityError::Missing)?
        .to_str()
        .map_err(|_| IdentityError::InvalidFormat)?;

    let (scheme, rest) = value.split_once(' ').ok_or(IdentityError::InvalidFormat)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(IdentityError::InvalidFormat);
    }

    let user_id = rest.trim();
    if user_id.is_empty() {
        return Err(IdentityError::Empty);
    }

    Ok(user_id.to_string())
}
