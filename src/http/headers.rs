//! Header hygiene for proxied traffic.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Maintain X-Forwarded-For / X-Forwarded-Host
//! - Carry the verified identity to backends
//!
//! # Design Decisions
//! - Headers named by `Connection` are hop-by-hop too (RFC 9110 §7.6.1)
//! - An inbound identity header is never trusted; it is always replaced

use std::net::IpAddr;

use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::HeaderMap;

use crate::auth::Claims;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove connection-scoped headers.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// `existing` with `client` appended, comma separated.
pub fn forwarded_for(existing: Option<&HeaderValue>, client: IpAddr) -> Option<HeaderValue> {
    let value = match existing.and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.trim().is_empty() => format!("{}, {}", prior, client),
        _ => client.to_string(),
    };
    HeaderValue::from_str(&value).ok()
}

pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    if let Some(value) = forwarded_for(headers.get(X_FORWARDED_FOR), client) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Replace whatever the client sent under `name` with the verified user id.
pub fn set_identity(headers: &mut HeaderMap, name: &HeaderName, claims: &Claims) {
    headers.remove(name);
    headers.insert(name.clone(), HeaderValue::from(claims.user_id));
}
