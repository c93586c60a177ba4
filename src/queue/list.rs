//! Listing the queue

use super::MergeQueue;
use crate::error::Result;
use crate::refinery::queue_order;
use crate::routing::merge_request_prefix;
use crate::store::IssueQuery;
use crate::types::{INTEGRATION_PREFIX, IssueStatus, MergeRequest};

/// Filter for [`MergeQueue::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Only ready merge requests (open, unblocked, not failed)
    pub ready: bool,
    /// Only this raw status; defaults to `open` unless `ready` is set
    pub status: Option<IssueStatus>,
    /// Only this worker (case-insensitive)
    pub worker: Option<String>,
    /// Only merge requests targeting `integration/<epic>`
    pub epic: Option<String>,
}

impl ListFilter {
    /// Raw status to ask the store for
    pub fn query_status(&self) -> Option<IssueStatus> {
        self.status.or(Some(IssueStatus::Open))
    }

    /// Whether a merge request passes the filter
    pub fn matches(&self, mr: &MergeRequest) -> bool {
        if self.ready && !mr.is_ready() {
            return false;
        }
        if self.status.is_some_and(|status| mr.status != status) {
            return false;
        }
        if let Some(ref worker) = self.worker {
            let mr_worker = mr.worker.as_deref().unwrap_or_default();
            if mr_worker.to_lowercase() != worker.to_lowercase() {
                return false;
            }
        }
        if let Some(ref epic) = self.epic {
            if mr.target != format!("{INTEGRATION_PREFIX}{epic}") {
                return false;
            }
        }
        true
    }
}

impl MergeQueue {
    /// Merge requests of a tenant, in queue order
    pub async fn list(&self, tenant: &str, filter: &ListFilter) -> Result<Vec<MergeRequest>> {
        let store = self.store_for(&merge_request_prefix(tenant)).await?;
        let query = IssueQuery {
            issue_type: Some(self.settings().merge_request_type.clone()),
            status: filter.query_status(),
        };
        let issues = store
            .list_issues(&query)
            .await
            .map_err(|e| e.context(format!("listing merge queue for {tenant}")))?;

        let mut mrs: Vec<MergeRequest> = issues
            .into_iter()
            .map(MergeRequest::from_issue)
            .filter(|mr| filter.matches(mr))
            .collect();
        mrs.sort_by(queue_order);
        Ok(mrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Issue;
    use chrono::Utc;

    fn mr(worker: &str, target: &str, description_extra: &str) -> MergeRequest {
        let now = Utc::now();
        MergeRequest::from_issue(Issue {
            id: "gt-mr-1".to_string(),
            title: "Merge: gt-1".to_string(),
            issue_type: "merge-request".to_string(),
            status: IssueStatus::Open,
            priority: 2,
            description: format!("branch: b\ntarget: {target}\nworker: {worker}\n{description_extra}"),
            assignee: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            dependencies: vec![],
            dependents: vec![],
        })
    }

    #[test]
    fn test_default_query_is_open() {
        assert_eq!(ListFilter::default().query_status(), Some(IssueStatus::Open));
        let closed = ListFilter {
            status: Some(IssueStatus::Closed),
            ..ListFilter::default()
        };
        assert_eq!(closed.query_status(), Some(IssueStatus::Closed));
    }

    #[test]
    fn test_worker_is_case_insensitive_exact() {
        let filter = ListFilter {
            worker: Some("NIX".to_string()),
            ..ListFilter::default()
        };
        assert!(filter.matches(&mr("nix", "main", "")));
        assert!(!filter.matches(&mr("nixon", "main", "")));
    }

    #[test]
    fn test_epic_matches_integration_target() {
        let filter = ListFilter {
            epic: Some("gt-epic".to_string()),
            ..ListFilter::default()
        };
        assert!(filter.matches(&mr("nix", "integration/gt-epic", "")));
        assert!(!filter.matches(&mr("nix", "main", "")));
    }

    #[test]
    fn test_ready_excludes_failed() {
        let filter = ListFilter {
            ready: true,
            ..ListFilter::default()
        };
        assert!(filter.matches(&mr("nix", "main", "")));
        assert!(!filter.matches(&mr("nix", "main", "error: conflict")));
    }
}
