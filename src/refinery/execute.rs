//! Merge attempts - effectful operations
//!
//! An attempt moves one merge request through `in_progress` to either
//! closed (merged) or back to open with its `error` set. Conflicts, failed
//! checks and timeouts are recorded on the merge request. Errors from the
//! VCS or the store are returned, and the merge request is released from
//! `in_progress` on the way out.

use super::locks::{TargetGuard, TargetKey};
use crate::error::{Error, Result};
use crate::queue::{ListFilter, MergeQueue, load, save};
use crate::store::StoreHandle;
use crate::types::{CLOSE_REASON_MERGED, DisplayStatus, IssueStatus, MergeRequest};
use crate::vcs::MergeOutcome;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of one merge attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The branch landed and the merge request is closed
    Merged {
        /// Merge request id
        id: String,
        /// Target branch
        target: String,
        /// Resulting commit
        commit: String,
        /// Dependents that became ready
        unblocked: Vec<String>,
    },
    /// The merge failed; the merge request is open with `error` set
    Failed {
        /// Merge request id
        id: String,
        /// Target branch
        target: String,
        /// Recorded failure detail
        detail: String,
    },
    /// No attempt was made
    Skipped {
        /// Merge request id
        id: String,
        /// Why
        reason: String,
    },
}

impl AttemptOutcome {
    /// Merge request the outcome is about
    pub fn id(&self) -> &str {
        match self {
            Self::Merged { id, .. } | Self::Failed { id, .. } | Self::Skipped { id, .. } => id,
        }
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merged {
                id,
                target,
                commit,
                unblocked,
            } => {
                let short = commit.get(..8).unwrap_or(commit);
                write!(f, "merged {id} into {target} ({short})")?;
                if !unblocked.is_empty() {
                    write!(f, "; unblocked {}", unblocked.join(", "))?;
                }
                Ok(())
            }
            Self::Failed { id, target, detail } => {
                write!(f, "failed to merge {id} into {target}: {detail}")
            }
            Self::Skipped { id, reason } => write!(f, "skipped {id}: {reason}"),
        }
    }
}

/// How to treat a target whose lock is held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Wait for the running attempt to finish
    Wait,
    /// Skip the target this time
    Skip,
}

/// Attempt a merge request under its target's lock
///
/// The record is re-read once the lock is held, so a merge request that was
/// merged, rejected or blocked in the meantime is skipped rather than merged
/// twice.
pub async fn attempt_locked(queue: &MergeQueue, id: &str, mode: LockMode) -> Result<AttemptOutcome> {
    let store = queue.store_for(id).await?;
    let mr = load(&store, id).await?;
    let key = TargetKey::new(store.locator().clone(), mr.target.clone());

    let Some(_guard) = acquire(queue, &key, mode).await? else {
        debug!(mr_id = id, target = %key, "target busy");
        return Ok(AttemptOutcome::Skipped {
            id: id.to_string(),
            reason: format!("another merge into {} is running", mr.target),
        });
    };

    let mr = load(&store, id).await?;
    if let Some(reason) = not_ready_reason(&mr) {
        return Ok(AttemptOutcome::Skipped {
            id: mr.id,
            reason,
        });
    }
    attempt(queue, &store, mr).await
}

/// Attempt one merge request now, waiting for its target if busy
///
/// This is the path `retry --now` takes; it shares the lock with the
/// periodic cycle.
pub async fn process_now(queue: &MergeQueue, id: &str) -> Result<AttemptOutcome> {
    attempt_locked(queue, id, LockMode::Wait).await
}

async fn acquire(queue: &MergeQueue, key: &TargetKey, mode: LockMode) -> Result<Option<TargetGuard>> {
    match mode {
        LockMode::Wait => queue.locks().lock(key).await.map(Some),
        LockMode::Skip => queue.locks().try_lock(key),
    }
}

fn not_ready_reason(mr: &MergeRequest) -> Option<String> {
    match mr.display_status() {
        DisplayStatus::Ready => None,
        DisplayStatus::Blocked => Some(format!(
            "waiting on {}",
            mr.first_blocker().unwrap_or_default()
        )),
        DisplayStatus::Failed => Some("failed; retry it first".to_string()),
        DisplayStatus::InProgress => Some("already in progress".to_string()),
        DisplayStatus::Closed => Some(format!(
            "closed ({})",
            mr.close_reason.as_deref().unwrap_or("no reason")
        )),
    }
}

/// Drive a ready merge request through one merge
///
/// Callers must hold the target's lock.
async fn attempt(
    queue: &MergeQueue,
    store: &StoreHandle<'_>,
    mut mr: MergeRequest,
) -> Result<AttemptOutcome> {
    mr.status = IssueStatus::InProgress;
    mr.error = None;
    let mr = save(store, &mr).await?;
    info!(mr_id = %mr.id, branch = %mr.branch, target = %mr.target, "attempting merge");

    match merge_and_record(queue, store, &mr).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            release(store, mr, &e).await;
            Err(e)
        }
    }
}

async fn merge_and_record(
    queue: &MergeQueue,
    store: &StoreHandle<'_>,
    mr: &MergeRequest,
) -> Result<AttemptOutcome> {
    let timeout = queue.settings().merge_timeout;
    let detail = match tokio::time::timeout(timeout, queue.vcs().merge(&mr.branch, &mr.target)).await {
        Ok(Ok(MergeOutcome::Merged { commit })) => {
            return finish_merged(queue, store, mr.clone(), commit).await;
        }
        Ok(Ok(MergeOutcome::Failed { detail })) => detail,
        Ok(Err(e)) => return Err(e.context(format!("merging {}", mr.branch))),
        Err(_) => format!("merge timed out after {}s", timeout.as_secs()),
    };
    record_failure(store, mr.clone(), detail).await
}

/// Take a merge request out of `in_progress` after an errored attempt
///
/// A VCS error leaves nothing merged, so the request goes straight back to
/// ready. Any other error may have struck after the merge landed, so the
/// request is parked as failed for someone to look at. When the store is
/// still down the record stays `in_progress` until [`recover_stalled`]
/// finds it.
async fn release(store: &StoreHandle<'_>, mut mr: MergeRequest, err: &Error) {
    mr.status = IssueStatus::Open;
    mr.error = match err.root() {
        Error::Vcs(_) => None,
        _ => Some(format!("merge attempt interrupted: {err}")),
    };
    match save(store, &mr).await {
        Ok(mr) => warn!(mr_id = %mr.id, error = %err, failed = mr.is_failed(), "merge attempt errored"),
        Err(e) => warn!(mr_id = %mr.id, error = %e, "could not release merge request"),
    }
}

async fn finish_merged(
    queue: &MergeQueue,
    store: &StoreHandle<'_>,
    mut mr: MergeRequest,
    commit: String,
) -> Result<AttemptOutcome> {
    mr.status = IssueStatus::Closed;
    mr.close_reason = Some(CLOSE_REASON_MERGED.to_string());
    mr.merge_commit = Some(commit.clone());
    mr.error = None;
    let mr = save(store, &mr).await?;
    info!(mr_id = %mr.id, target = %mr.target, %commit, "merged");

    let unblocked = newly_ready_dependents(queue, &mr).await;
    if !unblocked.is_empty() {
        info!(mr_id = %mr.id, ?unblocked, "dependents ready");
    }
    Ok(AttemptOutcome::Merged {
        id: mr.id,
        target: mr.target,
        commit,
        unblocked,
    })
}

async fn record_failure(
    store: &StoreHandle<'_>,
    mut mr: MergeRequest,
    detail: String,
) -> Result<AttemptOutcome> {
    mr.status = IssueStatus::Open;
    mr.error = Some(detail.clone());
    let mr = save(store, &mr).await?;
    warn!(mr_id = %mr.id, target = %mr.target, %detail, "merge failed");
    Ok(AttemptOutcome::Failed {
        id: mr.id,
        target: mr.target,
        detail,
    })
}

/// Release merge requests left `in_progress` by an attempt that never
/// finished
///
/// A record is only touched while its target lock is free, so an attempt
/// that is still running (in this process or another sharing the lock
/// directory) is left alone. Released records are parked as failed.
/// Returns the ids released.
pub async fn recover_stalled(queue: &MergeQueue, tenant: &str) -> Result<Vec<String>> {
    let filter = ListFilter {
        status: Some(IssueStatus::InProgress),
        ..ListFilter::default()
    };
    let mut recovered = Vec::new();
    for stalled in queue.list(tenant, &filter).await? {
        match recover_one(queue, &stalled).await {
            Ok(true) => recovered.push(stalled.id),
            Ok(false) => {}
            Err(e) => warn!(mr_id = %stalled.id, error = %e, "could not release stalled merge request"),
        }
    }
    Ok(recovered)
}

async fn recover_one(queue: &MergeQueue, stalled: &MergeRequest) -> Result<bool> {
    let store = queue.store_for(&stalled.id).await?;
    let key = TargetKey::new(store.locator().clone(), stalled.target.clone());
    let Some(_guard) = queue.locks().try_lock(&key)? else {
        debug!(mr_id = %stalled.id, target = %key, "attempt still running");
        return Ok(false);
    };

    let mut mr = load(&store, &stalled.id).await?;
    if mr.status != IssueStatus::InProgress {
        return Ok(false);
    }
    mr.status = IssueStatus::Open;
    mr.error = Some(STALLED_ERROR.to_string());
    let mr = save(&store, &mr).await?;
    warn!(mr_id = %mr.id, target = %mr.target, "released stalled merge request");
    Ok(true)
}

const STALLED_ERROR: &str = "merge attempt interrupted; retry to attempt again";

/// Dependents of a merged request that are now ready
///
/// Blocker sets are recomputed by re-reading each dependent; the read is
/// side-effect free, so running this again after an interruption gives the
/// same answer. A dependent that cannot be read is logged and left out.
async fn newly_ready_dependents(queue: &MergeQueue, merged: &MergeRequest) -> Vec<String> {
    let mut ready = Vec::new();
    for dependent in &merged.dependents {
        if dependent.issue_type != queue.settings().merge_request_type {
            continue;
        }
        let lookup = async {
            let store = queue.store_for(&dependent.id).await?;
            load(&store, &dependent.id).await
        };
        match lookup.await {
            Ok(mr) if mr.is_ready() => ready.push(mr.id),
            Ok(mr) => debug!(mr_id = %mr.id, status = %mr.display_status(), "dependent still waiting"),
            Err(e) => warn!(mr_id = %dependent.id, error = %e, "could not re-check dependent"),
        }
    }
    ready
}
