//! Re-admitting failed merge requests

use super::{MergeQueue, load, save};
use crate::error::{Error, Result};
use crate::refinery::{AttemptOutcome, process_now};
use crate::types::MergeRequest;
use tracing::info;

/// Result of [`MergeQueue::retry`]
#[derive(Debug, Clone)]
pub enum RetryOutcome {
    /// Error cleared; the refinery picks it up on its next cycle
    Queued(MergeRequest),
    /// Error cleared and a merge attempt ran immediately
    Processed(AttemptOutcome),
}

impl MergeQueue {
    /// Clear a failed merge request's error, optionally attempting it now
    ///
    /// Only merge requests in the failed substate (open with a recorded
    /// error) can be retried.
    pub async fn retry(&self, id: &str, run_now: bool) -> Result<RetryOutcome> {
        let store = self.store_for(id).await?;
        let mut mr = load(&store, id).await?;

        if !mr.is_failed() {
            let status = mr.display_status().to_string();
            return Err(Error::NotFailed { id: mr.id, status });
        }

        let previous = mr.error.take();
        let mr = save(&store, &mr).await?;
        info!(mr_id = %mr.id, previous_error = ?previous, run_now, "retrying merge request");

        if run_now {
            let outcome = process_now(self, &mr.id).await?;
            return Ok(RetryOutcome::Processed(outcome));
        }
        Ok(RetryOutcome::Queued(mr))
    }
}
