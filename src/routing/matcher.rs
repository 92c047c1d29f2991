//! Route matching logic.
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Prefixes match on segment boundaries: `/api/users` covers
//!   `/api/users` and `/api/users/me`, never `/api/usersettings`
//! - A prefix ending in `/` covers everything beneath it

/// Matches the request path against a registered prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns true if `path` falls under this prefix.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.prefix.ends_with('/'),
            None => false,
        }
    }

    /// Prefix length, used to rank competing matches.
    pub fn specificity(&self) -> usize {
        self.prefix.len()
    }

    pub fn as_str(&self) -> &str {
        &self.prefix
    }
}
