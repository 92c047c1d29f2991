//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → metrics → bind listener → build server → serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → close tunnels (1001) → drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then metrics, then listener
//! - Ordered shutdown: stop accept, drain, close
//! - Drain has a deadline: remaining tunnels are abandoned after it

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
