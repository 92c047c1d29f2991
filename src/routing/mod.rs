//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route compilation (at startup):
//!     RouteConfig[]
//!     → matcher.rs (path-prefix matchers)
//!     → table.rs (frozen RouteTable)
//!
//! Per request:
//!     path → RouteTable::resolve → &Route or RouteError::NotFound
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Longest prefix wins; ties go to the earliest registered route
//! - Explicit NotFound rather than a silent default

pub mod matcher;
pub mod table;

pub use table::{Protocol, Route, RouteError, RouteTable};
