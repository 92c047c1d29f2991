//! Tunnel session bookkeeping.
//!
//! # Responsibilities
//! - Generate unique session IDs for tracing
//! - Count live sessions so shutdown can drain them
//!
//! # Design Decisions
//! - RAII guard: a session is counted exactly as long as its guard lives,
//!   whichever way the relay task exits

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::observability::metrics;

/// Relaxed ordering is enough: IDs only need to be unique.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// Counts live tunnel sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    active: Arc<AtomicU64>,
    idle: Arc<Notify>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. Returns a guard that deregisters on drop.
    pub fn track(&self) -> SessionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        metrics::session_opened();
        SessionGuard {
            active: Arc::clone(&self.active),
            idle: Arc::clone(&self.idle),
            id: SessionId::next(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Resolve once no session is live.
    pub async fn wait_idle(&self) {
        loop {
            // Registered on creation, so a drop between the check and the
            // await still wakes us.
            let notified = self.idle.notified();
            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps a session counted while alive.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<AtomicU64>,
    idle: Arc<Notify>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
        metrics::session_closed();
        tracing::trace!(session = %self.id, "Session released");
    }
}
