//! Frame relay between a client and its backend.
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Gateway ←──── WebSocket frames ────→ Backend
//!          axum::extract::ws                     tokio-tungstenite
//! ```
//!
//! # Design Decisions
//! - Both directions and the shutdown signal race in one `select!`; the first
//!   to finish decides how the session ends and the others are dropped
//! - Text and binary frames are forwarded unchanged and in order
//! - Ping/pong stay on their own hop; each WebSocket library answers pings
//! - Backend failure without a close frame reaches the client as 1011
//! - Every exit path closes both sides within the grace period, then drops
//!   both sockets

use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame as ClientCloseFrame, Message as ClientMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as BackendCloseFrame;
use tokio_tungstenite::tungstenite::Message as BackendMessage;

use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::tunnel::backend::BackendSocket;
use crate::tunnel::session::SessionGuard;

/// Close code for an upstream failure mid-session.
pub const CLOSE_UPSTREAM_FAILURE: u16 = 1011;
/// Close code sent to both sides when the gateway shuts down.
pub const CLOSE_GOING_AWAY: u16 = 1001;

type ClientRx = SplitStream<WebSocket>;
type ClientTx = SplitSink<WebSocket, ClientMessage>;
type BackendRx = SplitStream<BackendSocket>;
type BackendTx = SplitSink<BackendSocket, BackendMessage>;

/// A live client ↔ backend pairing, owned by the task running it.
pub struct TunnelSession {
    guard: SessionGuard,
    user_id: i64,
    route: String,
    created_at: Instant,
    client: WebSocket,
    backend: BackendSocket,
}

/// How a session ended.
#[derive(Debug)]
enum Exit {
    ClientClosed(Option<ClientCloseFrame>),
    ClientFailed(String),
    BackendClosed(Option<BackendCloseFrame>),
    BackendFailed(String),
    Shutdown,
}

impl Exit {
    fn label(&self) -> &'static str {
        match self {
            Exit::ClientClosed(_) => "client_closed",
            Exit::ClientFailed(_) => "client_failed",
            Exit::BackendClosed(_) => "backend_closed",
            Exit::BackendFailed(_) => "backend_failed",
            Exit::Shutdown => "shutdown",
        }
    }
}

impl TunnelSession {
    pub fn new(
        guard: SessionGuard,
        user_id: i64,
        route: impl Into<String>,
        client: WebSocket,
        backend: BackendSocket,
    ) -> Self {
        Self {
            guard,
            user_id,
            route: route.into(),
            created_at: Instant::now(),
            client,
            backend,
        }
    }

    /// Relay until either side ends or shutdown is triggered.
    pub async fn run(self, shutdown: Shutdown, close_grace: Duration) {
        let TunnelSession {
            guard,
            user_id,
            route,
            created_at,
            client,
            backend,
        } = self;
        let session = guard.id();

        tracing::info!(session = %session, user_id, route = %route, "Tunnel session opened");

        let (mut client_tx, mut client_rx) = client.split();
        let (mut backend_tx, mut backend_rx) = backend.split();

        let exit = tokio::select! {
            exit = client_to_backend(&mut client_rx, &mut backend_tx) => exit,
            exit = backend_to_client(&mut backend_rx, &mut client_tx) => exit,
            _ = shutdown.triggered() => Exit::Shutdown,
        };

        match &exit {
            Exit::ClientFailed(reason) | Exit::BackendFailed(reason) => {
                tracing::warn!(session = %session, route = %route, reason = %reason, outcome = exit.label(), "Tunnel failed");
            }
            _ => {}
        }
        let outcome = exit.label();

        let closed = tokio::time::timeout(
            close_grace,
            finish(exit, &mut client_tx, &mut backend_tx),
        )
        .await;
        if closed.is_err() {
            tracing::debug!(session = %session, "Close handshake exceeded grace period");
        }

        tracing::info!(
            session = %session,
            user_id,
            route = %route,
            outcome,
            duration_ms = created_at.elapsed().as_millis() as u64,
            "Tunnel session closed"
        );
        // Sockets and guard drop here.
    }
}

async fn client_to_backend(rx: &mut ClientRx, tx: &mut BackendTx) -> Exit {
    while let Some(message) = rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => return Exit::ClientFailed(e.to_string()),
        };
        let forwarded = match message {
            ClientMessage::Text(text) => BackendMessage::Text(text.as_str().to_owned().into()),
            ClientMessage::Binary(data) => BackendMessage::Binary(data),
            ClientMessage::Ping(_) | ClientMessage::Pong(_) => continue,
            ClientMessage::Close(frame) => return Exit::ClientClosed(frame),
        };
        if let Err(e) = tx.send(forwarded).await {
            return Exit::BackendFailed(e.to_string());
        }
        metrics::record_tunnel_frame("client_to_backend");
    }
    Exit::ClientFailed("connection dropped".to_string())
}

async fn backend_to_client(rx: &mut BackendRx, tx: &mut ClientTx) -> Exit {
    while let Some(message) = rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => return Exit::BackendFailed(e.to_string()),
        };
        let forwarded = match message {
            BackendMessage::Text(text) => ClientMessage::Text(text.as_str().to_owned().into()),
            BackendMessage::Binary(data) => ClientMessage::Binary(data),
            BackendMessage::Ping(_) | BackendMessage::Pong(_) | BackendMessage::Frame(_) => continue,
            BackendMessage::Close(frame) => return Exit::BackendClosed(frame),
        };
        if let Err(e) = tx.send(forwarded).await {
            return Exit::ClientFailed(e.to_string());
        }
        metrics::record_tunnel_frame("backend_to_client");
    }
    Exit::BackendFailed("connection dropped".to_string())
}

/// Tell the surviving side(s) the session is over. Send errors are ignored:
/// the peer may already be gone.
async fn finish(exit: Exit, client: &mut ClientTx, backend: &mut BackendTx) {
    match exit {
        Exit::ClientClosed(frame) => {
            let _ = backend
                .send(BackendMessage::Close(frame.map(to_backend_frame)))
                .await;
            let _ = backend.close().await;
            let _ = client.close().await;
        }
        Exit::ClientFailed(_) => {
            let _ = backend
                .send(BackendMessage::Close(Some(backend_frame(CLOSE_GOING_AWAY, "client disconnected"))))
                .await;
            let _ = backend.close().await;
        }
        Exit::BackendClosed(frame) => {
            let _ = client
                .send(ClientMessage::Close(frame.map(to_client_frame)))
                .await;
            let _ = client.close().await;
            let _ = backend.close().await;
        }
        Exit::BackendFailed(_) => {
            let _ = client
                .send(ClientMessage::Close(Some(client_frame(CLOSE_UPSTREAM_FAILURE, "upstream failure"))))
                .await;
            let _ = client.close().await;
        }
        Exit::Shutdown => {
            let to_client = client.send(ClientMessage::Close(Some(client_frame(
                CLOSE_GOING_AWAY,
                "gateway shutting down",
            ))));
            let to_backend = backend.send(BackendMessage::Close(Some(backend_frame(
                CLOSE_GOING_AWAY,
                "gateway shutting down",
            ))));
            let _ = tokio::join!(to_client, to_backend);
            let _ = tokio::join!(client.close(), backend.close());
        }
    }
}

fn client_frame(code: u16, reason: &str) -> ClientCloseFrame {
    ClientCloseFrame {
        code,
        reason: reason.to_owned().into(),
    }
}

fn backend_frame(code: u16, reason: &str) -> BackendCloseFrame {
    BackendCloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_owned().into(),
    }
}

fn to_backend_frame(frame: ClientCloseFrame) -> BackendCloseFrame {
    backend_frame(frame.code, frame.reason.as_str())
}

fn to_client_frame(frame: BackendCloseFrame) -> ClientCloseFrame {
    client_frame(u16::from(frame.code), frame.reason.as_str())
}
