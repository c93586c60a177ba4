//! Id-prefix routing to backing stores
//!
//! The routing table is loaded once at startup and is the only input to
//! resolution: the working directory and environment are never consulted.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Opaque address of one backing store instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreLocator(String);

impl StoreLocator {
    /// Wrap a locator string
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// Locator as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StoreLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One routing table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Literal id prefix, e.g. `gt-` or `gt-mr-`
    pub prefix: String,
    /// Store serving ids with this prefix
    #[serde(alias = "path")]
    pub locator: StoreLocator,
    /// Id prefix the store must be configured with; defaults to `prefix`
    /// without its trailing `-`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_prefix: Option<String>,
}

impl Route {
    /// Create a route with the default id prefix
    pub fn new(prefix: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            locator: StoreLocator::new(locator),
            id_prefix: None,
        }
    }

    /// Id prefix the store behind this route must use
    pub fn required_id_prefix(&self) -> &str {
        self.id_prefix
            .as_deref()
            .unwrap_or_else(|| self.prefix.trim_end_matches('-'))
    }
}

/// Longest-prefix router over a static table
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Build a router, rejecting empty and duplicate prefixes
    pub fn new(routes: Vec<Route>) -> Result<Self> {
        let mut seen = HashSet::new();
        for route in &routes {
            if route.prefix.is_empty() {
                return Err(Error::Config(format!(
                    "route to {} has an empty prefix",
                    route.locator
                )));
            }
            if !seen.insert(route.prefix.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate route prefix '{}'",
                    route.prefix
                )));
            }
        }
        Ok(Self { routes })
    }

    /// Parse a beads-style `routes.jsonl` table
    ///
    /// One JSON object per line; blank lines and `#` comments are skipped.
    pub fn parse_jsonl(content: &str) -> Result<Vec<Route>> {
        content
            .lines()
            .enumerate()
            .map(|(n, line)| (n, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .map(|(n, line)| {
                serde_json::from_str::<Route>(line)
                    .map_err(|e| Error::Config(format!("routes line {}: {e}", n + 1)))
            })
            .collect()
    }

    /// Load a `routes.jsonl` file
    pub fn load_jsonl(path: &Path) -> Result<Vec<Route>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::parse_jsonl(&content)
    }

    /// All routes, in table order
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Route for an id: the entry with the longest matching prefix
    pub fn route(&self, id: &str) -> Result<&Route> {
        let route = self
            .routes
            .iter()
            .filter(|route| id.starts_with(route.prefix.as_str()))
            .max_by_key(|route| route.prefix.len())
            .ok_or_else(|| Error::NoRoute(id.to_string()))?;
        debug!(id, prefix = %route.prefix, locator = %route.locator, "resolved route");
        Ok(route)
    }

    /// Store locator for an id
    pub fn resolve(&self, id: &str) -> Result<&StoreLocator> {
        self.route(id).map(|route| &route.locator)
    }
}

/// Id prefix under which a tenant's merge requests are created
pub fn merge_request_prefix(tenant: &str) -> String {
    format!("{}-mr-", tenant.trim_end_matches('-'))
}
