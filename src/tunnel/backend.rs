//! Backend side of a tunnel.
//!
//! # Design Decisions
//! - The backend handshake completes before the client is answered, so every
//!   backend failure can still be reported as an ordinary HTTP status
//! - A backend that refuses the handshake has its status and body relayed

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderMap};
use axum::response::Response;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::{ProtocolError, SubProtocolError};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::UpstreamError;
use crate::http::headers::strip_hop_by_hop;

pub type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why the backend connection could not be set up.
#[derive(Debug)]
pub enum HandshakeError {
    /// The backend answered the upgrade with a non-101 response.
    Rejected(Response),
    Upstream(UpstreamError),
}

/// Open a WebSocket to `url`, sending `headers` with the handshake.
///
/// Returns the socket and the subprotocol the backend selected, if any.
pub async fn connect(
    url: &str,
    headers: HeaderMap,
    timeout: Duration,
) -> Result<(BackendSocket, Option<String>), HandshakeError> {
    match tokio::time::timeout(timeout, negotiate(url, headers)).await {
        Ok(Ok(connected)) => Ok(connected),
        Ok(Err(WsError::Http(response))) => {
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            // Body may be partial; let the server recompute the length.
            parts.headers.remove(header::CONTENT_LENGTH);
            Err(HandshakeError::Rejected(Response::from_parts(
                parts,
                Body::from(body.unwrap_or_default()),
            )))
        }
        Ok(Err(e)) => Err(HandshakeError::Upstream(UpstreamError::Unreachable(e.to_string()))),
        Err(_) => Err(HandshakeError::Upstream(UpstreamError::Timeout(timeout))),
    }
}

/// A backend may accept without picking any offered subprotocol. The client
/// library refuses that answer, so the handshake is repeated without an offer.
async fn negotiate(
    url: &str,
    mut headers: HeaderMap,
) -> Result<(BackendSocket, Option<String>), WsError> {
    match handshake(url, headers.clone()).await {
        Err(WsError::Protocol(ProtocolError::SecWebSocketSubProtocolError(
            SubProtocolError::NoSubProtocol,
        ))) => {
            tracing::debug!(url, "Backend chose no subprotocol, retrying without an offer");
            headers.remove(header::SEC_WEBSOCKET_PROTOCOL);
            handshake(url, headers).await
        }
        other => other,
    }
}

async fn handshake(
    url: &str,
    headers: HeaderMap,
) -> Result<(BackendSocket, Option<String>), WsError> {
    let mut request = url.into_client_request()?;
    request.headers_mut().extend(headers);

    let (socket, response) = connect_async(request).await?;
    let protocol = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    Ok((socket, protocol))
}
