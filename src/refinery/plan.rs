//! Cycle planning - pure functions deciding what merges next
//!
//! No I/O happens here: the caller lists the queue, these functions decide
//! which merge request each target branch should attempt.

use crate::types::{DisplayStatus, MergeRequest};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Queue order: lowest priority value, then oldest, then id
///
/// The id tie-break keeps the order total when two records share a
/// creation timestamp.
pub fn queue_order(a: &MergeRequest, b: &MergeRequest) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Next ready merge request for one target
pub fn select_next<'a>(mrs: &'a [MergeRequest], target: &str) -> Option<&'a MergeRequest> {
    mrs.iter()
        .filter(|mr| mr.target == target && mr.is_ready())
        .min_by(|a, b| queue_order(a, b))
}

/// One attempt the cycle should make
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedAttempt {
    /// Target branch
    pub target: String,
    /// Merge request to attempt
    pub mr_id: String,
    /// Source branch
    pub branch: String,
    /// Its priority
    pub priority: u8,
}

impl std::fmt::Display for PlannedAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "merge {} ({}) into {} [P{}]",
            self.mr_id, self.branch, self.target, self.priority
        )
    }
}

/// Why an open merge request is not attempted this cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum WaitReason {
    /// Another merge request for the same target goes first
    Queued {
        /// The merge request ahead of it
        behind: String,
    },
    /// An unresolved dependency
    Blocked {
        /// First unresolved dependency
        on: String,
    },
    /// Needs a retry
    Failed {
        /// Recorded failure
        error: String,
    },
}

/// An open merge request left waiting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Waiting {
    /// Merge request id
    pub mr_id: String,
    /// Target branch
    pub target: String,
    /// Why it waits
    #[serde(flatten)]
    pub reason: WaitReason,
}

impl std::fmt::Display for Waiting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            WaitReason::Queued { behind } => write!(f, "{} queued behind {behind}", self.mr_id),
            WaitReason::Blocked { on } => write!(f, "{} waiting on {on}", self.mr_id),
            WaitReason::Failed { error } => write!(f, "{} failed: {error}", self.mr_id),
        }
    }
}

/// What one refinery cycle should do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CyclePlan {
    /// At most one attempt per target, ordered by target name
    pub attempts: Vec<PlannedAttempt>,
    /// Open merge requests not attempted, in queue order per target
    pub waiting: Vec<Waiting>,
}

impl CyclePlan {
    /// Whether there is nothing to merge
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

impl std::fmt::Display for CyclePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.attempts.is_empty() {
            writeln!(f, "nothing ready to merge")?;
        }
        for attempt in &self.attempts {
            writeln!(f, "{attempt}")?;
        }
        for waiting in &self.waiting {
            writeln!(f, "  {waiting}")?;
        }
        Ok(())
    }
}

/// Plan one cycle over a snapshot of the queue
///
/// In-progress and closed records are ignored; their targets may still get
/// an attempt, and the per-target lock decides whether it runs.
pub fn plan_cycle(mrs: &[MergeRequest]) -> CyclePlan {
    let mut by_target: BTreeMap<&str, Vec<&MergeRequest>> = BTreeMap::new();
    for mr in mrs {
        by_target.entry(mr.target.as_str()).or_default().push(mr);
    }

    let mut plan = CyclePlan::default();
    for (target, mut queue) in by_target {
        queue.sort_by(|a, b| queue_order(a, b));

        let head_mr = queue.iter().copied().find(|mr| mr.is_ready());
        if let Some(mr) = head_mr {
            plan.attempts.push(PlannedAttempt {
                target: target.to_string(),
                mr_id: mr.id.clone(),
                branch: mr.branch.clone(),
                priority: mr.priority,
            });
        }
        let head = head_mr.map(|mr| mr.id.as_str());

        for mr in queue {
            let reason = match mr.display_status() {
                DisplayStatus::Ready => match head {
                    Some(head_id) if head_id != mr.id => WaitReason::Queued {
                        behind: head_id.to_string(),
                    },
                    _ => continue,
                },
                DisplayStatus::Blocked => WaitReason::Blocked {
                    on: mr.first_blocker().unwrap_or_default().to_string(),
                },
                DisplayStatus::Failed => WaitReason::Failed {
                    error: mr.error.clone().unwrap_or_default(),
                },
                DisplayStatus::InProgress | DisplayStatus::Closed => continue,
            };
            plan.waiting.push(Waiting {
                mr_id: mr.id.clone(),
                target: target.to_string(),
                reason,
            });
        }
    }
    plan
}
