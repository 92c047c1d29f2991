//! Bearer token verification.
//!
//! # Wire Format
//! ```text
//! base64url(header_json) "." base64url(payload_json) "." base64url(signature)
//! ```
//!
//! # Design Decisions
//! - Structure is checked before any cryptography (cheap rejection first)
//! - Only RS256 is verified; every other `alg` is a signature failure
//! - Unsigned (`alg: none`) tokens pass only when explicitly enabled
//! - `user_id` must be a JSON integer; it is the only claim propagated

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::loader::{read_public_key, ConfigError};
use crate::config::AuthConfig;

/// base64url that tolerates trailing `=` padding on input.
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Reason a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing header, wrong segment count, bad base64 or bad JSON.
    #[error("malformed bearer token")]
    InvalidFormat,

    /// Signature mismatch or an algorithm the gateway does not accept.
    #[error("token signature rejected")]
    BadSignature,

    /// `user_id` absent or not an integer.
    #[error("token has no integer user_id claim")]
    MissingClaim,

    /// `exp` lies in the past.
    #[error("token expired")]
    Expired,
}

impl AuthError {
    /// Stable machine-readable name used in error bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidFormat => "invalid_format",
            AuthError::BadSignature => "bad_signature",
            AuthError::MissingClaim => "missing_claim",
            AuthError::Expired => "expired",
        }
    }
}

/// Claims the gateway trusts after verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claims {
    pub user_id: i64,
}

/// Verifies bearer tokens against an immutable RS256 public key.
///
/// Holds no mutable state; share it behind an `Arc` across every
/// connection-handling task.
#[derive(Clone)]
pub struct TokenValidator {
    key: Option<DecodingKey>,
    allow_unsigned: bool,
    leeway_secs: u64,
}

impl TokenValidator {
    /// Build a validator from a PEM-encoded RSA public key (PKCS#1 or SPKI).
    pub fn new(public_key_pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self {
            key: Some(DecodingKey::from_rsa_pem(public_key_pem)?),
            allow_unsigned: false,
            leeway_secs: 0,
        })
    }

    /// Build a validator from the `[auth]` section, reading the key file if
    /// one is configured.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let validator = match read_public_key(config)? {
            Some(pem) => {
                Self::new(pem.as_bytes()).map_err(|e| ConfigError::Key(e.to_string()))?
            }
            None => Self::unsigned_only(),
        };
        Ok(validator
            .allow_unsigned(config.allow_unsigned)
            .with_leeway(config.leeway_secs))
    }

    /// A validator without key material. Rejects everything unless
    /// [`allow_unsigned`](Self::allow_unsigned) is switched on.
    pub fn unsigned_only() -> Self {
        Self {
            key: None,
            allow_unsigned: false,
            leeway_secs: 0,
        }
    }

    /// Accept `alg: none` tokens without checking a signature.
    ///
    /// Test and development setups only.
    pub fn allow_unsigned(mut self, allow: bool) -> Self {
        self.allow_unsigned = allow;
        self
    }

    /// Clock skew tolerated when checking `exp`.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    pub fn accepts_unsigned(&self) -> bool {
        self.allow_unsigned
    }

    /// Verify `token` and extract its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(AuthError::InvalidFormat);
        };

        let header = decode_json(header_b64)?;
        let payload = decode_json(payload_b64)?;
        let signature = decode_segment(signature_b64)?;

        let alg = header
            .get("alg")
            .and_then(Value::as_str)
            .ok_or(AuthError::InvalidFormat)?;

        match alg {
            "RS256" => {
                let message = &token[..header_b64.len() + 1 + payload_b64.len()];
                self.verify_rs256(message, &signature)?;
            }
            "none" if self.allow_unsigned => {}
            _ => return Err(AuthError::BadSignature),
        }

        self.check_expiry(&payload)?;

        let user_id = payload
            .get("user_id")
            .and_then(integer_claim)
            .ok_or(AuthError::MissingClaim)?;

        Ok(Claims { user_id })
    }

    fn verify_rs256(&self, message: &str, signature: &[u8]) -> Result<(), AuthError> {
        let key = self.key.as_ref().ok_or(AuthError::BadSignature)?;
        // Re-encode canonically so padded input verifies the same as unpadded.
        let signature = URL_SAFE_NO_PAD.encode(signature);
        match jsonwebtoken::crypto::verify(&signature, message.as_bytes(), key, Algorithm::RS256) {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(AuthError::BadSignature),
        }
    }

    fn check_expiry(&self, payload: &Map<String, Value>) -> Result<(), AuthError> {
        let Some(exp) = payload.get("exp") else {
            return Ok(());
        };
        let exp = exp.as_f64().ok_or(AuthError::InvalidFormat)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        if exp + self.leeway_secs as f64 <= now {
            return Err(AuthError::Expired);
        }
        Ok(())
    }
}

impl fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenValidator")
            .field("has_key", &self.key.is_some())
            .field("allow_unsigned", &self.allow_unsigned)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, AuthError> {
    SEGMENT_ENGINE
        .decode(segment)
        .map_err(|_| AuthError::InvalidFormat)
}

fn decode_json(segment: &str) -> Result<Map<String, Value>, AuthError> {
    let bytes = decode_segment(segment)?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(AuthError::InvalidFormat),
    }
}

fn integer_claim(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}
