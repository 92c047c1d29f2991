//! HTTP request forwarding.
//!
//! # Responsibilities
//! - Send the rewritten request to the route's backend
//! - Bound each call by the request deadline
//! - Cap the number of simultaneous backend calls
//!
//! # Design Decisions
//! - The deadline covers send → response head; the body then streams freely
//! - No retries: a failed call is reported, never replayed
//! - Dropping the handler future (client went away) drops the backend call

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::HeaderName;
use axum::http::Request;
use axum::response::Response;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::Semaphore;

use crate::auth::Claims;
use crate::config::{LimitsConfig, TimeoutConfig};
use crate::error::{GatewayError, UpstreamError};
use crate::http::request::ProxyRequest;
use crate::http::response::relay_response;
use crate::routing::Route;

/// Proxies authenticated HTTP requests to their backend.
#[derive(Debug)]
pub struct RequestDispatcher {
    client: Client<HttpConnector, Body>,
    identity_header: HeaderName,
    request_timeout: Duration,
    slots: Arc<Semaphore>,
}

impl RequestDispatcher {
    pub fn new(identity_header: HeaderName, timeouts: &TimeoutConfig, limits: &LimitsConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            identity_header,
            request_timeout: Duration::from_secs(timeouts.request_secs),
            slots: Arc::new(Semaphore::new(limits.max_in_flight)),
        }
    }

    /// Forward `request` to `route` on behalf of `claims`.
    pub async fn handle(
        &self,
        route: &Route,
        claims: &Claims,
        request: Request<Body>,
    ) -> Result<Response, GatewayError> {
        let upstream = ProxyRequest::from_inbound(request, route, claims, &self.identity_header)?
            .into_request()?;
        let target = upstream.uri().clone();

        // Held until the response head arrives.
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| GatewayError::Internal("dispatcher closed".to_string()))?;

        let started = Instant::now();
        let response =
            match tokio::time::timeout(self.request_timeout, self.client.request(upstream)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    tracing::warn!(route = route.name(), target = %target, error = ?e, "Backend unreachable");
                    return Err(UpstreamError::Unreachable(e.to_string()).into());
                }
                Err(_) => {
                    tracing::warn!(
                        route = route.name(),
                        target = %target,
                        timeout_secs = self.request_timeout.as_secs(),
                        "Backend timed out"
                    );
                    return Err(UpstreamError::Timeout(self.request_timeout).into());
                }
            };

        tracing::debug!(
            route = route.name(),
            user_id = claims.user_id,
            status = response.status().as_u16(),
            upstream_ms = started.elapsed().as_millis() as u64,
            "Backend responded"
        );

        Ok(relay_response(response))
    }

    /// Backend calls that could start right now without waiting.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}
