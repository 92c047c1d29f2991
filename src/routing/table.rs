//! Route lookup.
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan (acceptable for a handful of services)
//! - Deterministic: the same path always resolves to the same route

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::loader::ConfigError;
use crate::config::RouteConfig;
use crate::routing::matcher::PathPrefixMatcher;

/// How a route's backend is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Request/response proxying.
    #[default]
    Http,
    /// WebSocket tunneling.
    Ws,
}

/// Route resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no route matches {0}")]
    NotFound(String),
}

/// A compiled route: path prefix → backend.
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    matcher: PathPrefixMatcher,
    base: String,
    protocol: Protocol,
}

impl Route {
    /// Compile a route from configuration.
    ///
    /// WebSocket routes may name their backend with an `http` scheme; it is
    /// rewritten to `ws` so the backend URL is always dialable as-is.
    pub fn from_config(config: &RouteConfig) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidRoute {
            name: config.name.clone(),
            reason,
        };

        let mut url = Url::parse(&config.backend).map_err(|e| invalid(e.to_string()))?;
        if config.protocol == Protocol::Ws && url.scheme() == "http" {
            url.set_scheme("ws")
                .map_err(|_| invalid("cannot use backend as a websocket url".to_string()))?;
        }

        Ok(Self {
            name: config.name.clone(),
            matcher: PathPrefixMatcher::new(config.path_prefix.clone()),
            base: url.as_str().trim_end_matches('/').to_string(),
            protocol: config.protocol,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path_prefix(&self) -> &str {
        self.matcher.as_str()
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Backend base URL without a trailing slash.
    pub fn backend(&self) -> &str {
        &self.base
    }

    /// Full backend URL for an inbound path (and query).
    ///
    /// The inbound path is appended unchanged; a path on the backend base
    /// URL, if any, is kept in front of it.
    pub fn target(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base, path_and_query)
    }
}

/// Fixed set of routes, resolved by longest matching prefix.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build from routes in registration order.
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Compile every configured route.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, ConfigError> {
        let routes = configs
            .iter()
            .map(Route::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(routes))
    }

    /// Find the route for `path`.
    pub fn resolve(&self, path: &str) -> Result<&Route, RouteError> {
        let mut best: Option<&Route> = None;
        for route in &self.routes {
            if !route.matcher.matches(path) {
                continue;
            }
            // Strictly greater: an equal-length prefix registered later never
            // displaces the earlier one.
            if best.map_or(true, |b| route.matcher.specificity() > b.matcher.specificity()) {
                best = Some(route);
            }
        }
        best.ok_or_else(|| RouteError::NotFound(path.to_string()))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
