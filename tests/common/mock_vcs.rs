//! Mock VCS service for testing

#![allow(dead_code)]

use async_trait::async_trait;
use mq_refinery::error::{Error, Result};
use mq_refinery::vcs::{MergeOutcome, VcsService};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Call record for `merge`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCall {
    pub branch: String,
    pub target: String,
}

/// Scripted VCS
///
/// Merges succeed with a commit derived from the branch unless a response is
/// set for that branch. Tracks how many merges run at once per target so
/// tests can check attempts are serialized.
pub struct MockVcs {
    current_branch: Mutex<Option<String>>,
    responses: Mutex<HashMap<String, Result<MergeOutcome>>>,
    merge_delay: Mutex<Option<Duration>>,
    merge_calls: Mutex<Vec<MergeCall>>,
    active: Mutex<HashMap<String, usize>>,
    max_active_per_target: AtomicUsize,
    max_active_total: AtomicUsize,
}

impl Default for MockVcs {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVcs {
    pub fn new() -> Self {
        Self {
            current_branch: Mutex::new(None),
            responses: Mutex::new(HashMap::new()),
            merge_delay: Mutex::new(None),
            merge_calls: Mutex::new(Vec::new()),
            active: Mutex::new(HashMap::new()),
            max_active_per_target: AtomicUsize::new(0),
            max_active_total: AtomicUsize::new(0),
        }
    }

    /// Branch reported by `current_branch`
    pub fn set_current_branch(&self, branch: &str) {
        *self.current_branch.lock().unwrap() = Some(branch.to_string());
    }

    /// Make merging `branch` report a conflict
    pub fn fail_merge(&self, branch: &str, detail: &str) {
        self.responses.lock().unwrap().insert(
            branch.to_string(),
            Ok(MergeOutcome::Failed {
                detail: detail.to_string(),
            }),
        );
    }

    /// Make merging `branch` return a VCS error
    pub fn error_merge(&self, branch: &str, msg: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(branch.to_string(), Err(Error::Vcs(msg.to_string())));
    }

    /// Clear any scripted response for `branch`
    pub fn reset_merge(&self, branch: &str) {
        self.responses.lock().unwrap().remove(branch);
    }

    /// Make every merge take this long
    pub fn set_merge_delay(&self, delay: Duration) {
        *self.merge_delay.lock().unwrap() = Some(delay);
    }

    pub fn merge_calls(&self) -> Vec<MergeCall> {
        self.merge_calls.lock().unwrap().clone()
    }

    /// Most merges ever running at once into a single target
    pub fn max_active_per_target(&self) -> usize {
        self.max_active_per_target.load(Ordering::SeqCst)
    }

    /// Most merges ever running at once overall
    pub fn max_active_total(&self) -> usize {
        self.max_active_total.load(Ordering::SeqCst)
    }

    fn enter(&self, target: &str) {
        let mut active = self.active.lock().unwrap();
        let count = active.entry(target.to_string()).or_default();
        *count += 1;
        self.max_active_per_target.fetch_max(*count, Ordering::SeqCst);
        let total = active.values().sum();
        self.max_active_total.fetch_max(total, Ordering::SeqCst);
    }

    fn exit(&self, target: &str) {
        if let Some(count) = self.active.lock().unwrap().get_mut(target) {
            *count -= 1;
        }
    }

    fn scripted(&self, branch: &str) -> Option<Result<MergeOutcome>> {
        let responses = self.responses.lock().unwrap();
        responses.get(branch).map(|r| match r {
            Ok(outcome) => Ok(outcome.clone()),
            Err(e) => Err(Error::Vcs(e.to_string())),
        })
    }
}

/// Commit id the mock reports for a merged branch
pub fn commit_for(branch: &str) -> String {
    format!("c0ffee{:0>34}", branch.len())
}

#[async_trait]
impl VcsService for MockVcs {
    async fn current_branch(&self) -> Result<String> {
        self.current_branch
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Vcs("not on a branch".to_string()))
    }

    async fn merge(&self, branch: &str, target: &str) -> Result<MergeOutcome> {
        self.merge_calls.lock().unwrap().push(MergeCall {
            branch: branch.to_string(),
            target: target.to_string(),
        });
        self.enter(target);
        let delay = *self.merge_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.exit(target);

        self.scripted(branch).unwrap_or_else(|| {
            Ok(MergeOutcome::Merged {
                commit: commit_for(branch),
            })
        })
    }
}
