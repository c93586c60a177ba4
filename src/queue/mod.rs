//! Merge request lifecycle
//!
//! `submit` creates merge requests, `list`/`status` read them, and
//! `retry`/`reject` move them between states. Merge attempts themselves
//! live in [`crate::refinery`].
//!
//! Every store access goes through [`MergeQueue::store_for`], which routes
//! the id to its store and bootstraps that store's schema first.

mod branch;
mod list;
mod reject;
mod retry;
mod status;
mod submit;

pub use branch::{BranchInfo, parse_branch_name};
pub use list::ListFilter;
pub use reject::RejectResult;
pub use retry::RetryOutcome;
pub use submit::SubmitRequest;

use crate::bootstrap::{Bootstrapper, SchemaRequirements};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::refinery::TargetLocks;
use crate::routing::{Route, Router};
use crate::store::{IssueStore, IssueUpdate, StoreHandle};
use crate::types::MergeRequest;
use crate::vcs::VcsService;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Queue behaviour settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// Branches that can never be submitted
    pub trunk_branches: Vec<String>,
    /// Priority used when the source issue cannot be read
    pub default_priority: u8,
    /// Record type of merge requests
    pub merge_request_type: String,
    /// Custom types every store must allow
    pub required_types: Vec<String>,
    /// Timeout for a single store call
    pub store_timeout: Duration,
    /// Timeout for one merge attempt
    pub merge_timeout: Duration,
    /// Directory of the per-target lock files shared between processes;
    /// `None` locks within this process only
    pub lock_dir: Option<PathBuf>,
}

impl Default for QueueSettings {
    /// Configuration defaults, locking within this process only
    fn default() -> Self {
        Self {
            lock_dir: None,
            ..Self::from(&Config::default())
        }
    }
}

impl From<&Config> for QueueSettings {
    fn from(config: &Config) -> Self {
        Self {
            trunk_branches: config.trunk_branches.clone(),
            default_priority: config.default_priority,
            merge_request_type: config.merge_request_type.clone(),
            required_types: config.required_types.clone(),
            store_timeout: config.store_timeout(),
            merge_timeout: Duration::from_secs(config.refinery.merge_timeout_secs),
            lock_dir: Some(config.lock_dir()),
        }
    }
}

impl QueueSettings {
    /// Schema a store behind `route` must provide
    pub fn requirements(&self, route: &Route) -> SchemaRequirements {
        let mut types = self.required_types.clone();
        if !types.contains(&self.merge_request_type) {
            types.push(self.merge_request_type.clone());
        }
        SchemaRequirements {
            types,
            id_prefix: route.required_id_prefix().to_string(),
        }
    }
}

/// The merge queue engine
pub struct MergeQueue {
    store: Arc<dyn IssueStore>,
    router: Router,
    bootstrap: Arc<Bootstrapper>,
    vcs: Arc<dyn VcsService>,
    notifier: Option<Arc<dyn Notifier>>,
    settings: QueueSettings,
    locks: TargetLocks,
}

impl MergeQueue {
    /// Create a queue with its own bootstrapper and no notifier
    pub fn new(
        store: Arc<dyn IssueStore>,
        router: Router,
        vcs: Arc<dyn VcsService>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            store,
            router,
            bootstrap: Arc::new(Bootstrapper::new()),
            vcs,
            notifier: None,
            locks: TargetLocks::new(settings.lock_dir.clone()),
            settings,
        }
    }

    /// Share a bootstrapper (and its memo) with other queues
    #[must_use]
    pub fn with_bootstrapper(mut self, bootstrap: Arc<Bootstrapper>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set the notification transport used by `reject --notify`
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Queue settings
    pub const fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Routing table
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Schema bootstrapper
    pub fn bootstrapper(&self) -> &Bootstrapper {
        &self.bootstrap
    }

    pub(crate) fn vcs(&self) -> &dyn VcsService {
        self.vcs.as_ref()
    }

    pub(crate) const fn locks(&self) -> &TargetLocks {
        &self.locks
    }

    /// Store serving `id`, with its schema verified
    pub async fn store_for(&self, id: &str) -> Result<StoreHandle<'_>> {
        let route = self.router.route(id)?;
        let handle = StoreHandle::new(
            self.store.as_ref(),
            &route.locator,
            self.settings.store_timeout,
        );
        self.bootstrap
            .ensure_configured(&handle, &self.settings.requirements(route))
            .await
            .map_err(|e| e.context(format!("preparing store {}", route.locator)))?;
        Ok(handle)
    }

    /// Load a merge request by id
    pub async fn get(&self, id: &str) -> Result<MergeRequest> {
        let store = self.store_for(id).await?;
        load(&store, id).await
    }
}

/// Load a merge request from an already resolved store
pub(crate) async fn load(store: &StoreHandle<'_>, id: &str) -> Result<MergeRequest> {
    store
        .get_issue(id)
        .await
        .map_err(|e| e.context(format!("fetching merge request {id}")))?
        .map(MergeRequest::from_issue)
        .ok_or_else(|| Error::NotFound(id.to_string()))
}

/// Write a merge request's status and description back to its store
pub(crate) async fn save(store: &StoreHandle<'_>, mr: &MergeRequest) -> Result<MergeRequest> {
    let update = IssueUpdate {
        status: Some(mr.status),
        description: Some(mr.description()),
    };
    store
        .update_issue(&mr.id, &update)
        .await
        .map(MergeRequest::from_issue)
        .map_err(|e| e.context(format!("updating merge request {}", mr.id)))
}
