//! Rejecting merge requests

use super::{MergeQueue, load, save};
use crate::error::{Error, Result};
use crate::notify::Notification;
use crate::refinery::TargetKey;
use crate::routing::merge_request_prefix;
use crate::store::{IssueQuery, StoreHandle};
use crate::types::{CLOSE_REASON_REJECTED, IssueStatus, MergeRequest};
use serde::Serialize;
use tracing::{info, warn};

/// Result of [`MergeQueue::reject`]
#[derive(Debug, Clone, Serialize)]
pub struct RejectResult {
    /// The closed merge request
    pub merge_request: MergeRequest,
    /// Whether the worker was notified
    pub notified: bool,
    /// Why notification failed, when it was requested and failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_error: Option<String>,
}

impl MergeQueue {
    /// Close a merge request without merging it
    ///
    /// `id_or_branch` is tried as a merge request id first, then as the
    /// branch of a merge request in the tenant's queue. The source issue is
    /// left open. A failed notification does not undo the rejection.
    ///
    /// The target's lock is held while closing, so a rejection waits for a
    /// running merge attempt and then sees its result.
    pub async fn reject(
        &self,
        tenant: &str,
        id_or_branch: &str,
        reason: &str,
        notify: bool,
    ) -> Result<RejectResult> {
        let (store, found) = self.find_for_reject(tenant, id_or_branch).await?;
        let key = TargetKey::new(store.locator().clone(), found.target.clone());
        let guard = self.locks().lock(&key).await?;
        let mut mr = load(&store, &found.id).await?;
        if mr.status == IssueStatus::Closed {
            return Err(Error::AlreadyClosed { id: mr.id });
        }

        mr.status = IssueStatus::Closed;
        mr.close_reason = Some(CLOSE_REASON_REJECTED.to_string());
        mr.merge_commit = None;
        mr.error = None;
        mr.notes = append_note(&mr.notes, &format!("Rejected: {reason}"));
        let mr = save(&store, &mr).await?;
        drop(guard);
        info!(mr_id = %mr.id, branch = %mr.branch, reason, "rejected merge request");

        let mut result = RejectResult {
            merge_request: mr,
            notified: false,
            notify_error: None,
        };
        if notify {
            match self.notify_rejection(&result.merge_request, reason).await {
                Ok(()) => result.notified = true,
                Err(e) => {
                    warn!(mr_id = %result.merge_request.id, error = %e, "rejection notice not delivered");
                    result.notify_error = Some(e.to_string());
                }
            }
        }
        Ok(result)
    }

    async fn find_for_reject(
        &self,
        tenant: &str,
        id_or_branch: &str,
    ) -> Result<(StoreHandle<'_>, MergeRequest)> {
        if self.router().route(id_or_branch).is_ok() {
            let store = self.store_for(id_or_branch).await?;
            match load(&store, id_or_branch).await {
                Ok(mr) => return Ok((store, mr)),
                Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let store = self.store_for(&merge_request_prefix(tenant)).await?;
        let query = IssueQuery {
            issue_type: Some(self.settings().merge_request_type.clone()),
            status: None,
        };
        let (closed, live): (Vec<MergeRequest>, Vec<MergeRequest>) = store
            .list_issues(&query)
            .await
            .map_err(|e| e.context(format!("searching merge queue for {id_or_branch}")))?
            .into_iter()
            .map(MergeRequest::from_issue)
            .filter(|mr| mr.branch == id_or_branch)
            .partition(|mr| mr.status == IssueStatus::Closed);

        match live.len() {
            1 => {
                let mr = live.into_iter().next().ok_or_else(|| Error::NotFound(id_or_branch.to_string()))?;
                Ok((store, mr))
            }
            0 => match closed.into_iter().max_by_key(|mr| mr.updated_at) {
                Some(mr) => Err(Error::AlreadyClosed { id: mr.id }),
                None => Err(Error::NotFound(id_or_branch.to_string())),
            },
            _ => Err(Error::AmbiguousBranch {
                branch: id_or_branch.to_string(),
                matches: live.into_iter().map(|mr| mr.id).collect(),
            }),
        }
    }

    async fn notify_rejection(&self, mr: &MergeRequest, reason: &str) -> Result<()> {
        let recipient = mr
            .worker
            .clone()
            .ok_or_else(|| Error::Notify(format!("no worker recorded on {}", mr.id)))?;
        let notifier = self
            .notifier
            .as_ref()
            .ok_or_else(|| Error::Notify("no notification transport configured".to_string()))?;

        let mut body = format!("Your merge request {} was rejected.\n\nReason: {reason}\n", mr.id);
        if let Some(ref issue) = mr.source_issue {
            body.push_str(&format!("\nIssue {issue} is still open.\n"));
        }
        notifier
            .send(&Notification {
                recipient,
                subject: format!("Merge request rejected: {}", mr.branch),
                body,
            })
            .await
    }
}

fn append_note(notes: &str, line: &str) -> String {
    if notes.is_empty() {
        line.to_string()
    } else {
        format!("{notes}\n{line}")
    }
}
