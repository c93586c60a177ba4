//! Issue store access
//!
//! The store itself is an external collaborator. [`IssueStore`] is the
//! contract the queue needs from it; every call names the store it talks
//! to through an explicit [`StoreLocator`].

mod bd;

pub use bd::BdStore;

use crate::error::{Error, Result};
use crate::routing::StoreLocator;
use crate::types::{Issue, IssueStatus};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Config key listing the custom record types a store accepts
pub const TYPES_KEY: &str = "types.custom";

/// Config keys under which stores have accepted the id prefix, most
/// preferred first
pub const PREFIX_KEYS: [&str; 3] = ["issue_prefix", "issue-prefix", "prefix"];

/// Fields for a new record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    /// Title
    pub title: String,
    /// Record type
    pub issue_type: String,
    /// Priority (0 = most urgent)
    pub priority: u8,
    /// Description
    pub description: String,
}

/// Changes to apply to an existing record; `None` leaves a value untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueUpdate {
    /// New status
    pub status: Option<IssueStatus>,
    /// New description
    pub description: Option<String>,
}

/// List filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueQuery {
    /// Only records of this type
    pub issue_type: Option<String>,
    /// Only records with this status
    pub status: Option<IssueStatus>,
}

/// Issue store operations used by the merge queue
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Fetch a record with its dependency summaries
    async fn get_issue(&self, locator: &StoreLocator, id: &str) -> Result<Option<Issue>>;

    /// List records matching the query
    async fn list_issues(&self, locator: &StoreLocator, query: &IssueQuery) -> Result<Vec<Issue>>;

    /// Create a record; fails with `SchemaMismatch` when the type is not
    /// allowed or the id prefix is not configured
    async fn create_issue(&self, locator: &StoreLocator, issue: &NewIssue) -> Result<Issue>;

    /// Update a record
    async fn update_issue(
        &self,
        locator: &StoreLocator,
        id: &str,
        update: &IssueUpdate,
    ) -> Result<Issue>;

    /// Read a store configuration value
    async fn get_config(&self, locator: &StoreLocator, key: &str) -> Result<Option<String>>;

    /// Write a store configuration value
    async fn set_config(&self, locator: &StoreLocator, key: &str, value: &str) -> Result<()>;
}

/// A store bound to one resolved locator, with a per-call timeout
///
/// A timeout surfaces as [`Error::StoreUnavailable`], which is transient.
#[derive(Clone, Copy)]
pub struct StoreHandle<'a> {
    store: &'a dyn IssueStore,
    locator: &'a StoreLocator,
    timeout: Duration,
}

impl<'a> StoreHandle<'a> {
    /// Bind a store to a locator
    pub fn new(store: &'a dyn IssueStore, locator: &'a StoreLocator, timeout: Duration) -> Self {
        Self {
            store,
            locator,
            timeout,
        }
    }

    /// Locator this handle talks to
    pub const fn locator(&self) -> &'a StoreLocator {
        self.locator
    }

    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                Error::StoreUnavailable(format!(
                    "{op} on {} timed out after {}s",
                    self.locator,
                    self.timeout.as_secs_f64()
                ))
            })?
    }

    /// See [`IssueStore::get_issue`]
    pub async fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        self.bounded("show", self.store.get_issue(self.locator, id))
            .await
    }

    /// See [`IssueStore::list_issues`]
    pub async fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>> {
        self.bounded("list", self.store.list_issues(self.locator, query))
            .await
    }

    /// See [`IssueStore::create_issue`]
    pub async fn create_issue(&self, issue: &NewIssue) -> Result<Issue> {
        self.bounded("create", self.store.create_issue(self.locator, issue))
            .await
    }

    /// See [`IssueStore::update_issue`]
    pub async fn update_issue(&self, id: &str, update: &IssueUpdate) -> Result<Issue> {
        self.bounded("update", self.store.update_issue(self.locator, id, update))
            .await
    }

    /// See [`IssueStore::get_config`]
    pub async fn get_config(&self, key: &str) -> Result<Option<String>> {
        self.bounded("config get", self.store.get_config(self.locator, key))
            .await
    }

    /// See [`IssueStore::set_config`]
    pub async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.bounded("config set", self.store.set_config(self.locator, key, value))
            .await
    }
}
