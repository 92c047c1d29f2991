//! Caller authentication.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <token>
//!     → bearer_token (header parsing)
//!     → token.rs (structure, signature, claims)
//!     → Claims { user_id } or AuthError
//! ```
//!
//! Both the HTTP dispatcher and the WebSocket tunnel authenticate through
//! [`authenticate`], so the two surfaces reject exactly the same tokens.

pub mod token;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use crate::observability::metrics;

pub use token::{AuthError, Claims, TokenValidator};

/// Extract the raw token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::InvalidFormat)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::InvalidFormat)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidFormat);
    }
    Ok(token)
}

/// Authenticate a request from its headers.
pub fn authenticate(headers: &HeaderMap, validator: &TokenValidator) -> Result<Claims, AuthError> {
    let result = bearer_token(headers).and_then(|token| validator.validate(token));
    if let Err(e) = &result {
        tracing::warn!(reason = e.kind(), "Authentication failed");
        metrics::record_auth_failure(e.kind());
    }
    result
}
