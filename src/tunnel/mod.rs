//! WebSocket tunneling subsystem.
//!
//! # Data Flow
//! ```text
//! Authenticated upgrade request (route protocol = ws)
//!     → WebSocketUpgrade extraction (rejects non-upgrade requests)
//!     → backend.rs (companion handshake, identity header attached)
//!     → 101 to the client
//!     → relay.rs (TunnelSession: frames both ways until either side ends)
//! ```
//!
//! # Design Decisions
//! - Nothing is acknowledged to the client until the backend accepted;
//!   failures before that point are plain HTTP error responses
//! - Only the verified identity crosses to the backend; client headers are
//!   not copied onto the backend handshake
//! - Sessions register with a [`SessionTracker`] so shutdown can drain them

pub mod backend;
pub mod relay;
pub mod session;

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::Request;
use axum::response::{IntoResponse, Response};

use crate::auth::Claims;
use crate::config::TimeoutConfig;
use crate::error::GatewayError;
use crate::http::headers::{self as hop, X_FORWARDED_FOR, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::routing::Route;

pub use backend::HandshakeError;
pub use relay::TunnelSession;
pub use session::{SessionGuard, SessionId, SessionTracker};

/// Bridges authenticated client WebSockets to backend WebSockets.
#[derive(Debug)]
pub struct StreamTunnel {
    identity_header: HeaderName,
    handshake_timeout: Duration,
    close_grace: Duration,
    sessions: SessionTracker,
    shutdown: Shutdown,
}

impl StreamTunnel {
    pub fn new(
        identity_header: HeaderName,
        timeouts: &TimeoutConfig,
        sessions: SessionTracker,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            identity_header,
            handshake_timeout: Duration::from_secs(timeouts.request_secs),
            close_grace: Duration::from_millis(timeouts.close_grace_ms),
            sessions,
            shutdown,
        }
    }

    /// Upgrade `request` and tunnel it to `route`'s backend.
    ///
    /// The caller has already authenticated the request as `claims`.
    pub async fn upgrade(
        &self,
        route: &Route,
        claims: Claims,
        request: Request<Body>,
    ) -> Result<Response, GatewayError> {
        let (mut parts, _body) = request.into_parts();

        let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(ws) => ws,
            Err(rejection) => {
                tracing::debug!(route = route.name(), reason = %rejection, "Not a websocket upgrade");
                return Ok(rejection.into_response());
            }
        };

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = route.target(path_and_query);
        let client_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let handshake_headers = self.handshake_headers(&parts.headers, &claims, client_addr);

        let (backend, protocol) =
            match backend::connect(&target, handshake_headers, self.handshake_timeout).await {
                Ok(connected) => connected,
                Err(HandshakeError::Rejected(response)) => {
                    tracing::info!(
                        route = route.name(),
                        status = response.status().as_u16(),
                        "Backend refused websocket handshake"
                    );
                    return Ok(response);
                }
                Err(HandshakeError::Upstream(e)) => {
                    tracing::warn!(route = route.name(), target = %target, error = %e, "Backend websocket unavailable");
                    return Err(e.into());
                }
            };

        let ws = match protocol {
            Some(protocol) => ws.protocols([protocol]),
            None => ws,
        };

        let sessions = self.sessions.clone();
        let shutdown = self.shutdown.clone();
        let close_grace = self.close_grace;
        let route_name = route.name().to_string();

        Ok(ws
            .on_failed_upgrade(|e: axum::Error| tracing::warn!(error = %e, "Client websocket upgrade failed"))
            .on_upgrade(move |client| async move {
                let session = TunnelSession::new(sessions.track(), claims.user_id, route_name, client, backend);
                session.run(shutdown, close_grace).await;
            }))
    }

    fn handshake_headers(
        &self,
        inbound: &HeaderMap,
        claims: &Claims,
        client_addr: Option<SocketAddr>,
    ) -> HeaderMap {
        let mut headers = HeaderMap::new();
        hop::set_identity(&mut headers, &self.identity_header, claims);

        if let Some(protocols) = inbound.get(header::SEC_WEBSOCKET_PROTOCOL) {
            headers.insert(header::SEC_WEBSOCKET_PROTOCOL, protocols.clone());
        }
        if let Some(request_id) = inbound.get(X_REQUEST_ID) {
            headers.insert(X_REQUEST_ID, request_id.clone());
        }
        if let Some(addr) = client_addr {
            if let Some(value) = hop::forwarded_for(inbound.get(X_FORWARDED_FOR), addr.ip()) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }
        headers
    }
}
