//! Gateway error taxonomy.
//!
//! Every failure the gateway itself generates funnels into [`GatewayError`],
//! which maps to exactly one status code. Rendering to a response lives in
//! `http::response`.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

use crate::auth::AuthError;
use crate::routing::RouteError;

/// Failure talking to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Connection refused, reset, DNS failure or a broken exchange.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// No response head within the deadline.
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Route(_) => StatusCode::NOT_FOUND,
            GatewayError::Upstream(UpstreamError::Unreachable(_)) => StatusCode::BAD_GATEWAY,
            GatewayError::Upstream(UpstreamError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable kind, written to the `error` field of the body.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Auth(e) => e.kind(),
            GatewayError::Route(RouteError::NotFound(_)) => "not_found",
            GatewayError::Upstream(UpstreamError::Unreachable(_)) => "unreachable",
            GatewayError::Upstream(UpstreamError::Timeout(_)) => "timeout",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// Message safe to show callers. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Upstream(UpstreamError::Unreachable(_)) => {
                "backend unreachable".to_string()
            }
            GatewayError::Internal(_) => "internal gateway error".to_string(),
            other => other.to_string(),
        }
    }
}
