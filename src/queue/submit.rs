//! Submitting branches to the queue

use super::{MergeQueue, parse_branch_name};
use crate::error::{Error, Result};
use crate::fields::{self, MrFields};
use crate::routing::merge_request_prefix;
use crate::store::NewIssue;
use crate::types::{DEFAULT_TARGET, INTEGRATION_PREFIX, MergeRequest};
use tracing::{debug, info};

/// Highest (least urgent) priority
const MAX_PRIORITY: u8 = 4;

/// Options for [`MergeQueue::submit`]; unset values are inferred
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    /// Source branch (default: current branch)
    pub branch: Option<String>,
    /// Source issue (default: parsed from the branch name)
    pub issue: Option<String>,
    /// Target the epic's integration branch instead of `main`
    pub epic: Option<String>,
    /// Priority 0-4 (default: inherited from the source issue)
    pub priority: Option<u8>,
    /// Worker (default: parsed from the branch name)
    pub worker: Option<String>,
    /// Originating rig
    pub rig: Option<String>,
    /// Tenant prefix owning the merge request (default: the source
    /// issue's route)
    pub tenant: Option<String>,
}

impl MergeQueue {
    /// Create a merge request for a branch
    pub async fn submit(&self, request: SubmitRequest) -> Result<MergeRequest> {
        let branch = match request.branch {
            Some(branch) => branch,
            None => self
                .vcs()
                .current_branch()
                .await
                .map_err(|e| e.context("getting current branch"))?,
        };

        if self.settings().trunk_branches.contains(&branch) {
            return Err(Error::TrunkBranch(branch));
        }
        if let Some(priority) = request.priority.filter(|p| *p > MAX_PRIORITY) {
            return Err(Error::InvalidPriority(priority));
        }

        let info = parse_branch_name(&branch);
        let Some(issue_id) = request.issue.or(info.issue) else {
            return Err(Error::IssueRequired { branch });
        };
        let worker = request.worker.or(info.worker);

        let target = request.epic.as_deref().map_or_else(
            || DEFAULT_TARGET.to_string(),
            |epic| format!("{INTEGRATION_PREFIX}{epic}"),
        );

        let tenant = match request.tenant {
            Some(tenant) => tenant,
            None => self
                .router()
                .route(&issue_id)?
                .required_id_prefix()
                .to_string(),
        };

        let priority = match request.priority {
            Some(priority) => priority,
            None => self
                .source_priority(&issue_id)
                .await
                .unwrap_or(self.settings().default_priority),
        };

        let mr_fields = MrFields {
            branch: Some(branch.clone()),
            target: Some(target),
            source_issue: Some(issue_id.clone()),
            worker,
            rig: request.rig,
            ..MrFields::default()
        };
        let new_issue = NewIssue {
            title: format!("Merge: {issue_id}"),
            issue_type: self.settings().merge_request_type.clone(),
            priority,
            description: fields::encode(&mr_fields),
        };

        let store = self.store_for(&merge_request_prefix(&tenant)).await?;
        let created = store
            .create_issue(&new_issue)
            .await
            .map_err(|e| e.context(format!("creating merge request for {branch}")))?;

        let mr = MergeRequest::from_issue(created);
        info!(mr_id = %mr.id, %branch, target = %mr.target, priority, "submitted merge request");
        Ok(mr)
    }

    /// Priority of the source issue, if it can be read
    async fn source_priority(&self, issue_id: &str) -> Option<u8> {
        let lookup = async {
            let store = self.store_for(issue_id).await?;
            store.get_issue(issue_id).await
        };
        match lookup.await {
            Ok(Some(issue)) => Some(issue.priority),
            Ok(None) => {
                debug!(issue_id, "source issue not found, using default priority");
                None
            }
            Err(e) => {
                debug!(issue_id, error = %e, "source issue unavailable, using default priority");
                None
            }
        }
    }
}
