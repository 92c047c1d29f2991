//! Shared utilities for integration tests: token signing, a gateway bound to
//! an ephemeral port, and mock backend services.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_gateway::config::{GatewayConfig, RouteConfig};
use api_gateway::lifecycle::Shutdown;
use api_gateway::routing::Protocol;
use api_gateway::GatewayServer;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const PRIVATE_KEY: &str = include_str!("../fixtures/jwt_private.pem");
pub const PUBLIC_KEY: &str = include_str!("../fixtures/jwt_public.pem");
pub const OTHER_PRIVATE_KEY: &str = include_str!("../fixtures/other_private.pem");

/// Chat input that makes the mock chat service drop the connection.
pub const TRIGGER_ERROR: &str = "trigger-error";

pub fn sign_claims_with(key_pem: &str, claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(key_pem.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

/// RS256 token for `user_id`, signed with the gateway's trusted key.
pub fn token_for(user_id: i64) -> String {
    sign_claims_with(PRIVATE_KEY, &json!({ "user_id": user_id, "email": "user@example.com" }))
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// HTTP client matching the gateway tests' needs: no pooling, no proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub fn route(name: &str, prefix: &str, backend: SocketAddr, protocol: Protocol) -> RouteConfig {
    RouteConfig {
        name: name.into(),
        path_prefix: prefix.into(),
        backend: format!("http://{}", backend),
        protocol,
    }
}

/// Gateway config trusting the fixture key.
pub fn gateway_config(routes: Vec<RouteConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.auth.public_key_pem = Some(PUBLIC_KEY.to_string());
    config.routes = routes;
    config.timeouts.request_secs = 2;
    config.timeouts.close_grace_ms = 200;
    config.timeouts.drain_secs = 2;
    config
}

/// A running gateway.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestGateway {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let shutdown = Shutdown::new();
    let server = GatewayServer::new(&config, shutdown.clone()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(server.run(listener));
    TestGateway {
        addr,
        shutdown,
        handle,
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Request counters for a mock user service.
#[derive(Clone, Default)]
pub struct ServiceStats {
    hits: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ServiceStats {
    /// Requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Most requests ever being handled at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(self.in_flight.clone())
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock user service: reports what it received.
pub async fn start_user_service() -> SocketAddr {
    start_counted_user_service().await.0
}

/// Mock user service that also counts what reaches it.
///
/// - `/api/v1/users/slow` answers after 3 seconds
/// - `/api/v1/users/held` answers after 200 ms
pub async fn start_counted_user_service() -> (SocketAddr, ServiceStats) {
    async fn echo(State(stats): State<ServiceStats>, request: Request) -> Json<Value> {
        let _in_flight = stats.enter();
        match request.uri().path() {
            "/api/v1/users/slow" => tokio::time::sleep(Duration::from_secs(3)).await,
            "/api/v1/users/held" => tokio::time::sleep(Duration::from_millis(200)).await,
            _ => {}
        }
        let headers = request.headers();
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
        let user_ids: Vec<String> = headers
            .get_all("x-user-id")
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_owned))
            .collect();

        let method = request.method().to_string();
        let uri = request.uri().to_string();
        let body_info = json!({
            "method": method,
            "uri": uri,
            "user_ids": user_ids,
            "authorization": header("authorization"),
            "forwarded_for": header("x-forwarded-for"),
            "forwarded_host": header("x-forwarded-host"),
            "request_id": header("x-request-id"),
        });
        let body = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap();
        let mut info = body_info;
        info["body"] = json!(String::from_utf8_lossy(&body));
        Json(info)
    }

    let stats = ServiceStats::default();
    let app = Router::new()
        .route("/{*path}", any(echo))
        .with_state(stats.clone());
    (serve(app).await, stats)
}

/// What a stalling backend observed on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallEvent {
    /// A full request head arrived.
    Request,
    /// The peer closed the connection.
    Eof,
}

/// Raw TCP backend that reads requests and never answers.
pub async fn start_stalling_backend() -> (SocketAddr, mpsc::UnboundedReceiver<StallEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let events = events.clone();
            tokio::spawn(async move {
                let mut received = Vec::new();
                let mut buf = [0u8; 4096];
                let mut head_seen = false;
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => {
                            let _ = events.send(StallEvent::Eof);
                            return;
                        }
                        Ok(n) => {
                            received.extend_from_slice(&buf[..n]);
                            if !head_seen && received.windows(4).any(|w| w == b"\r\n\r\n") {
                                head_seen = true;
                                let _ = events.send(StallEvent::Request);
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, rx)
}

/// Mock match service: rejects every submission with a 400 and its own body.
pub async fn start_match_service() -> SocketAddr {
    async fn submit() -> Response {
        (
            StatusCode::BAD_REQUEST,
            [("content-type", "application/json"), ("x-backend", "match")],
            r#"{"detail":"invalid match payload","field":"score"}"#,
        )
            .into_response()
    }

    serve(Router::new().route("/api/v1/matches", post(submit))).await
}

/// How a mock chat session ended, from the backend's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEnd {
    /// The gateway sent a close frame with this code.
    Closed(Option<u16>),
    /// The connection ended without a close frame.
    Dropped,
}

/// Mock chat service.
pub async fn start_chat_service() -> SocketAddr {
    start_observed_chat_service().await.0
}

/// Mock chat service reporting how each session ended.
///
/// - echoes text and binary frames
/// - `whoami` answers with the identity header it received
/// - `bye` closes with 4000
/// - [`TRIGGER_ERROR`] drops the connection without a close frame
/// - `/api/v1/chat/closed` refuses the handshake with 403
/// - `/api/v1/chat/v1` selects the `chat.v1` subprotocol when offered
pub async fn start_observed_chat_service() -> (SocketAddr, mpsc::UnboundedReceiver<ChatEnd>) {
    type Ends = mpsc::UnboundedSender<ChatEnd>;

    async fn chat(State(ends): State<Ends>, ws: WebSocketUpgrade, headers: HeaderMap) -> Response {
        let user_id = identity(&headers);
        ws.on_upgrade(move |socket| session(socket, user_id, ends))
    }

    async fn chat_v1(State(ends): State<Ends>, ws: WebSocketUpgrade, headers: HeaderMap) -> Response {
        let user_id = identity(&headers);
        ws.protocols(["chat.v1"])
            .on_upgrade(move |socket| session(socket, user_id, ends))
    }

    fn identity(headers: &HeaderMap) -> String {
        headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    }

    async fn session(mut socket: WebSocket, user_id: String, ends: Ends) {
        loop {
            let message = match socket.recv().await {
                Some(Ok(message)) => message,
                Some(Err(_)) | None => {
                    let _ = ends.send(ChatEnd::Dropped);
                    return;
                }
            };
            let reply = match message {
                Message::Text(text) if text.as_str() == TRIGGER_ERROR => return,
                Message::Text(text) if text.as_str() == "whoami" => Message::Text(user_id.clone().into()),
                Message::Text(text) if text.as_str() == "bye" => Message::Close(Some(CloseFrame {
                    code: 4000,
                    reason: "bye".into(),
                })),
                Message::Text(text) => Message::Text(text),
                Message::Binary(data) => Message::Binary(data),
                Message::Close(frame) => {
                    let _ = ends.send(ChatEnd::Closed(frame.map(|f| f.code)));
                    return;
                }
                _ => continue,
            };
            if socket.send(reply).await.is_err() {
                let _ = ends.send(ChatEnd::Dropped);
                return;
            }
        }
    }

    async fn closed() -> Response {
        (StatusCode::FORBIDDEN, "chat is closed").into_response()
    }

    let (ends, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/api/v1/chat/closed", get(closed))
        .route("/api/v1/chat/v1", get(chat_v1))
        .route("/api/v1/chat", get(chat))
        .with_state(ends);
    (serve(app).await, rx)
}
