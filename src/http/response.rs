//! Response handling and transformation.
//!
//! # Responsibilities
//! - Relay backend responses to the client
//! - Render gateway-generated errors
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Hop-by-hop headers stripped automatically
//! - Gateway errors are `{"error": <kind>, "message": <text>}`; backend
//!   bodies, error or not, pass through untouched

use axum::body::Body;
use axum::http::Response as HttpResponse;
use axum::response::{IntoResponse, Json, Response};
use hyper::body::Incoming;
use serde::Serialize;

use crate::error::GatewayError;
use crate::http::headers::strip_hop_by_hop;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind(),
            message: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Turn a backend response into the client response, streaming the body.
pub fn relay_response(response: HttpResponse<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}
