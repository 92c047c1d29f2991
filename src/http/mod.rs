//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, body limit)
//!     → auth (bearer token → Claims)
//!     → routing (path → Route)
//!     → dispatch.rs + request.rs (HTTP routes)  |  tunnel (ws routes)
//!     → response.rs (relay backend response, or render GatewayError)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use dispatch::RequestDispatcher;
pub use request::ProxyRequest;
pub use server::{AppState, GatewayServer};
