//! Refinery - the scheduler that merges ready merge requests
//!
//! Three-phase pattern:
//! 1. Gather - release stalled attempts, then list the tenant's open merge
//!    requests (effectful)
//! 2. Plan - pick one merge request per target (`plan_cycle`, pure)
//! 3. Execute - attempt each pick under its target lock (effectful)

mod execute;
mod locks;
mod plan;

pub use execute::{AttemptOutcome, LockMode, attempt_locked, process_now, recover_stalled};
pub use locks::{TargetGuard, TargetKey, TargetLocks};
pub use plan::{
    CyclePlan, PlannedAttempt, WaitReason, Waiting, plan_cycle, queue_order, select_next,
};

use crate::error::Result;
use crate::queue::{ListFilter, MergeQueue};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// An attempt that errored instead of producing an outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleError {
    /// Merge request id
    pub mr_id: String,
    /// Stable error kind
    pub kind: String,
    /// Error message
    pub message: String,
}

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// The plan the cycle ran
    pub plan: CyclePlan,
    /// One outcome per planned attempt that did not error
    pub outcomes: Vec<AttemptOutcome>,
    /// Attempts that errored
    pub errors: Vec<CycleError>,
    /// Merge requests released from a stalled `in_progress` state
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recovered: Vec<String>,
}

impl CycleReport {
    /// Number of merge requests merged this cycle
    #[must_use]
    pub fn merged(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, AttemptOutcome::Merged { .. }))
            .count()
    }
}

/// Periodic merge scheduler for one queue
pub struct Refinery {
    queue: Arc<MergeQueue>,
}

impl Refinery {
    /// Create a refinery over a queue
    pub const fn new(queue: Arc<MergeQueue>) -> Self {
        Self { queue }
    }

    /// The queue being processed
    pub fn queue(&self) -> &MergeQueue {
        &self.queue
    }

    /// Run one cycle for a tenant
    ///
    /// Targets are attempted concurrently; a target already being merged
    /// into is skipped. A failing attempt never aborts the cycle: merge
    /// failures become `Failed` outcomes and other errors are collected in
    /// [`CycleReport::errors`]. Only listing the queue can fail the cycle.
    ///
    /// Before planning, merge requests stuck `in_progress` with a free
    /// target are released as failed (see [`recover_stalled`]).
    pub async fn run_cycle(&self, tenant: &str) -> Result<CycleReport> {
        let recovered = recover_stalled(&self.queue, tenant).await?;
        let mrs = self.queue.list(tenant, &ListFilter::default()).await?;
        let plan = plan_cycle(&mrs);
        debug!(tenant, attempts = plan.attempts.len(), waiting = plan.waiting.len(), "planned cycle");

        let mut tasks = JoinSet::new();
        for planned in &plan.attempts {
            let queue = Arc::clone(&self.queue);
            let mr_id = planned.mr_id.clone();
            tasks.spawn(async move {
                let result = attempt_locked(&queue, &mr_id, LockMode::Skip).await;
                (mr_id, result)
            });
        }

        let mut report = CycleReport {
            plan,
            recovered,
            ..CycleReport::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.outcomes.push(outcome),
                Ok((mr_id, Err(e))) => {
                    warn!(%mr_id, error = %e, "merge attempt errored");
                    report.errors.push(CycleError {
                        mr_id,
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => warn!(error = %e, "merge task panicked"),
            }
        }
        report.outcomes.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(report)
    }

    /// Run cycles every `interval` until `shutdown` resolves
    ///
    /// Transient errors (store unavailable) are logged and the loop carries
    /// on; anything else ends the loop.
    pub async fn run<F>(
        &self,
        tenant: &str,
        interval: Duration,
        shutdown: F,
        mut on_cycle: impl FnMut(&CycleReport) + Send,
    ) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(tenant, interval_secs = interval.as_secs(), "refinery started");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!(tenant, "refinery stopping");
                    return Ok(());
                }
                _ = ticker.tick() => match self.run_cycle(tenant).await {
                    Ok(report) => on_cycle(&report),
                    Err(e) if e.is_transient() => warn!(tenant, error = %e, "cycle skipped"),
                    Err(e) => return Err(e),
                },
            }
        }
    }
}
