//! Outbound request construction.
//!
//! # Responsibilities
//! - Rewrite the inbound URI onto the route's backend
//! - Remove credentials and connection-scoped headers
//! - Attach the verified identity and forwarding headers
//!
//! # Design Decisions
//! - The body is never buffered; it streams through unchanged
//! - `x-request-id` is kept as-is so the backend sees the same id as the logs
//! - Host is replaced by the backend's authority; the original goes to
//!   X-Forwarded-Host

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, Method, Request, Uri};

use crate::auth::Claims;
use crate::error::GatewayError;
use crate::http::headers::{self as hop, X_FORWARDED_HOST};
use crate::routing::Route;

/// A request ready to be sent to a backend.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    pub target: Uri,
    pub headers: HeaderMap,
    pub body: Body,
}

impl ProxyRequest {
    /// Derive the backend request for `route` from an authenticated inbound
    /// request.
    pub fn from_inbound(
        request: Request<Body>,
        route: &Route,
        claims: &Claims,
        identity_header: &HeaderName,
    ) -> Result<Self, GatewayError> {
        let (parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target: Uri = route
            .target(path_and_query)
            .parse()
            .map_err(|e| GatewayError::Internal(format!("backend uri for {}: {}", route.name(), e)))?;

        let mut headers = parts.headers;
        hop::strip_hop_by_hop(&mut headers);
        headers.remove(header::AUTHORIZATION);

        if let Some(host) = headers.remove(header::HOST) {
            headers.insert(X_FORWARDED_HOST, host);
        }

        hop::set_identity(&mut headers, identity_header, claims);

        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            hop::append_forwarded_for(&mut headers, addr.ip());
        }

        Ok(Self {
            method: parts.method,
            target,
            headers,
            body,
        })
    }

    pub fn into_request(self) -> Result<Request<Body>, GatewayError> {
        let mut request = Request::builder()
            .method(self.method)
            .uri(self.target)
            .body(self.body)
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        *request.headers_mut() = self.headers;
        Ok(request)
    }
}
