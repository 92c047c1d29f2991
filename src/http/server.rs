//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, body limit)
//! - Authenticate, route, then hand off to the dispatcher or the tunnel
//! - Serve until shutdown, then drain tunnel sessions
//! - Observability (metrics, correlation IDs)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::header::HeaderName;
use axum::http::Request;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{self, Claims, TokenValidator};
use crate::config::{ConfigError, GatewayConfig};
use crate::error::GatewayError;
use crate::http::dispatch::RequestDispatcher;
use crate::lifecycle::Shutdown;
use crate::observability::{metrics, spans};
use crate::routing::{Protocol, Route, RouteTable};
use crate::tunnel::{SessionTracker, StreamTunnel};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<TokenValidator>,
    pub routes: Arc<RouteTable>,
    pub dispatcher: Arc<RequestDispatcher>,
    pub tunnel: Arc<StreamTunnel>,
}

/// The gateway's public listener.
pub struct GatewayServer {
    router: Router,
    shutdown: Shutdown,
    sessions: SessionTracker,
    drain_timeout: Duration,
}

impl GatewayServer {
    /// Compile the validated configuration into a ready-to-serve gateway.
    pub fn new(config: &GatewayConfig, shutdown: Shutdown) -> Result<Self, ConfigError> {
        let validator = TokenValidator::from_config(&config.auth)?;
        if validator.accepts_unsigned() {
            tracing::warn!("Unsigned (alg: none) tokens are accepted; never enable this in production");
        }

        let routes = RouteTable::from_config(&config.routes)?;
        for route in routes.routes() {
            tracing::info!(
                route = route.name(),
                prefix = route.path_prefix(),
                backend = route.backend(),
                protocol = ?route.protocol(),
                "Route registered"
            );
        }

        let identity_header = HeaderName::try_from(config.auth.identity_header.as_str())
            .map_err(|e| ConfigError::IdentityHeader(e.to_string()))?;

        let sessions = SessionTracker::new();
        let dispatcher =
            RequestDispatcher::new(identity_header.clone(), &config.timeouts, &config.limits);
        let tunnel = StreamTunnel::new(
            identity_header,
            &config.timeouts,
            sessions.clone(),
            shutdown.clone(),
        );

        let state = AppState {
            validator: Arc::new(validator),
            routes: Arc::new(routes),
            dispatcher: Arc::new(dispatcher),
            tunnel: Arc::new(tunnel),
        };

        Ok(Self {
            router: Self::build_router(config, state),
            shutdown,
            sessions,
            drain_timeout: Duration::from_secs(config.timeouts.drain_secs),
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/ping", get(ping))
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                spans::request_span(request)
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Router without a listener, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway server starting");

        let app = self
            .router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.triggered().await })
            .await?;

        self.drain().await;
        tracing::info!("Gateway server stopped");
        Ok(())
    }

    async fn drain(&self) {
        let active = self.sessions.active_count();
        if active == 0 {
            return;
        }
        tracing::info!(sessions = active, "Draining tunnel sessions");
        if tokio::time::timeout(self.drain_timeout, self.sessions.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.sessions.active_count(),
                "Drain deadline passed, abandoning tunnel sessions"
            );
        }
    }
}

async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

/// Authenticate, resolve the route, forward.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();

    let (route, result) = forward(&state, request).await;
    let response = result.unwrap_or_else(|e| {
        tracing::debug!(kind = e.kind(), error = %e, "Request rejected");
        e.into_response()
    });

    metrics::record_request(&method, response.status().as_u16(), &route, started);
    response
}

/// Returns the route label for metrics along with the outcome.
async fn forward(state: &AppState, request: Request<Body>) -> (String, Result<Response, GatewayError>) {
    let claims: Claims = match auth::authenticate(request.headers(), &state.validator) {
        Ok(claims) => claims,
        Err(e) => return ("none".to_string(), Err(e.into())),
    };

    let route: &Route = match state.routes.resolve(request.uri().path()) {
        Ok(route) => route,
        Err(e) => {
            tracing::info!(path = request.uri().path(), user_id = claims.user_id, "No route matched");
            return ("none".to_string(), Err(e.into()));
        }
    };

    let result = match route.protocol() {
        Protocol::Http => state.dispatcher.handle(route, &claims, request).await,
        Protocol::Ws => state.tunnel.upgrade(route, claims, request).await,
    };
    (route.name().to_string(), result)
}
