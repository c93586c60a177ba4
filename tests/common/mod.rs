//! Shared test utilities

#![allow(dead_code)]

pub mod mock_notifier;
pub mod mock_store;
pub mod mock_vcs;

pub use mock_notifier::MockNotifier;
pub use mock_store::{MockStore, make_issue};
pub use mock_vcs::{MockVcs, commit_for};

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use mq_refinery::fields::{self, MrFields};
use mq_refinery::queue::{MergeQueue, QueueSettings};
use mq_refinery::refinery::Refinery;
use mq_refinery::routing::{Route, Router};
use mq_refinery::types::IssueStatus;
use std::sync::Arc;

/// Tenant store for `gt-` work items
pub const GT: &str = "/town/gastown/.beads";
/// Dedicated store for `gt-mr-` merge requests
pub const GT_MQ: &str = "/town/gastown/mq/.beads";
/// Another tenant
pub const BD: &str = "/town/beads/.beads";

/// Merge request record type
pub const MR_TYPE: &str = "merge-request";

/// Routing table used by the tests
///
/// `gt-mr-` is narrower than `gt-`, so merge requests live apart from the
/// tenant's work items.
pub fn test_router() -> Router {
    let mut mq = Route::new("gt-mr-", GT_MQ);
    mq.id_prefix = Some("gt-mr".to_string());
    Router::new(vec![Route::new("gt-", GT), mq, Route::new("bd-", BD)]).unwrap()
}

/// A queue wired to mocks
pub struct Harness {
    pub store: Arc<MockStore>,
    pub vcs: Arc<MockVcs>,
    pub notifier: Arc<MockNotifier>,
    pub queue: Arc<MergeQueue>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(QueueSettings::default())
    }

    pub fn with_settings(settings: QueueSettings) -> Self {
        let store = Arc::new(MockStore::new());
        store.seed_schema(GT, &[MR_TYPE], "gt");
        let vcs = Arc::new(MockVcs::new());
        let notifier = Arc::new(MockNotifier::new());
        let queue = MergeQueue::new(store.clone(), test_router(), vcs.clone(), settings)
            .with_notifier(notifier.clone());
        Self {
            store,
            vcs,
            notifier,
            queue: Arc::new(queue),
        }
    }

    /// A second queue over the same store and VCS with its own lock table,
    /// the way another process would see them
    pub fn sibling(&self) -> Arc<MergeQueue> {
        let queue = MergeQueue::new(
            self.store.clone(),
            test_router(),
            self.vcs.clone(),
            self.queue.settings().clone(),
        )
        .with_notifier(self.notifier.clone());
        Arc::new(queue)
    }

    pub fn refinery(&self) -> Refinery {
        Refinery::new(Arc::clone(&self.queue))
    }

    /// Seed a work item in the tenant store
    pub fn seed_source_issue(&self, id: &str, priority: u8) {
        self.store
            .seed_issue(GT, make_issue(id, "task", priority, "Do the thing", at_minutes_ago(90)));
    }

    /// Seed an open merge request from `worker/nix/<issue>`
    pub fn seed_mr(&self, id: &str, issue: &str, target: &str, priority: u8, age_mins: i64) {
        self.seed_mr_with(id, &format!("worker/nix/{issue}"), issue, target, priority, age_mins);
    }

    /// Seed an open merge request with an explicit branch
    pub fn seed_mr_with(
        &self,
        id: &str,
        branch: &str,
        issue: &str,
        target: &str,
        priority: u8,
        age_mins: i64,
    ) {
        let description = fields::encode(&MrFields {
            branch: Some(branch.to_string()),
            target: Some(target.to_string()),
            source_issue: Some(issue.to_string()),
            worker: Some("nix".to_string()),
            rig: Some("gastown".to_string()),
            ..MrFields::default()
        });
        let mut issue = make_issue(id, MR_TYPE, priority, &description, at_minutes_ago(age_mins));
        issue.title = format!("Merge: {}", branch.rsplit('/').next().unwrap_or(branch));
        self.store.seed_issue(GT_MQ, issue);
    }

    /// Seed a merge request in the failed substate
    pub fn seed_failed_mr(&self, id: &str, issue: &str, error: &str) {
        let description = fields::encode(&MrFields {
            branch: Some(format!("worker/nix/{issue}")),
            target: Some("main".to_string()),
            source_issue: Some(issue.to_string()),
            worker: Some("nix".to_string()),
            error: Some(error.to_string()),
            ..MrFields::default()
        });
        self.store
            .seed_issue(GT_MQ, make_issue(id, MR_TYPE, 2, &description, at_minutes_ago(30)));
    }

    /// Seed a closed merge request
    pub fn seed_closed_mr(&self, id: &str, issue: &str, reason: &str) {
        let description = fields::encode(&MrFields {
            branch: Some(format!("worker/nix/{issue}")),
            target: Some("main".to_string()),
            source_issue: Some(issue.to_string()),
            worker: Some("nix".to_string()),
            close_reason: Some(reason.to_string()),
            ..MrFields::default()
        });
        let mut issue = make_issue(id, MR_TYPE, 2, &description, at_minutes_ago(120));
        issue.status = IssueStatus::Closed;
        issue.closed_at = Some(at_minutes_ago(60));
        self.store.seed_issue(GT_MQ, issue);
    }
}

/// Fixed reference time minus some minutes
pub fn at_minutes_ago(minutes: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() - ChronoDuration::minutes(minutes)
}
