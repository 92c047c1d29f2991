//! Request spans.

use axum::http::Request;
use tracing::Span;

/// Span for one inbound request, tagged with its `x-request-id`.
///
/// Used as the `make_span_with` hook of the router's `TraceLayer`; the
/// request id layer runs first, so the header is always present.
pub fn request_span<B>(request: &Request<B>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    )
}
