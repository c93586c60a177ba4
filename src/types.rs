//! Core types for the merge queue

use crate::fields::{self, MrFields};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Close reason recorded when a merge lands
pub const CLOSE_REASON_MERGED: &str = "merged";

/// Close reason recorded when a merge request is rejected
pub const CLOSE_REASON_REJECTED: &str = "rejected";

/// Target branch used when none is recorded
pub const DEFAULT_TARGET: &str = "main";

/// Prefix of epic integration branches
pub const INTEGRATION_PREFIX: &str = "integration/";

/// Raw status of a record in the issue store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Waiting to be worked on
    Open,
    /// Claimed by a worker (for merge requests: a merge attempt is running)
    InProgress,
    /// Finished; closed records stay queryable
    Closed,
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for IssueStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "closed" => Ok(Self::Closed),
            other => Err(crate::error::Error::Config(format!(
                "unknown status '{other}' (expected open, in_progress or closed)"
            ))),
        }
    }
}

/// Summary of a related record (dependency or dependent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    /// Record id
    pub id: String,
    /// Record title
    #[serde(default)]
    pub title: String,
    /// Raw status
    pub status: IssueStatus,
    /// Priority (0 = most urgent)
    #[serde(default)]
    pub priority: u8,
    /// Record type
    #[serde(rename = "issue_type", alias = "type", default)]
    pub issue_type: String,
}

/// A generically-typed record from the issue store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Store-assigned id
    pub id: String,
    /// Title
    pub title: String,
    /// Record type (e.g. `merge-request`)
    #[serde(rename = "issue_type", alias = "type", default)]
    pub issue_type: String,
    /// Raw status
    pub status: IssueStatus,
    /// Priority (0 = most urgent)
    #[serde(default)]
    pub priority: u8,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    /// Assignee, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// Closing time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Records this one waits on
    #[serde(default)]
    pub dependencies: Vec<IssueRef>,
    /// Records waiting on this one
    #[serde(default)]
    pub dependents: Vec<IssueRef>,
}

/// Derived status of a merge request, independent of the raw store status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    /// Open, no unresolved dependencies, no recorded error
    Ready,
    /// Open with at least one unresolved dependency
    Blocked,
    /// Open with a recorded merge error; needs `retry`
    Failed,
    /// A merge attempt is running
    InProgress,
    /// Merged or rejected
    Closed,
}

impl std::fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Blocked => write!(f, "blocked"),
            Self::Failed => write!(f, "failed"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A merge request: the logical view over a `merge-request` issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeRequest {
    /// Store-assigned id
    pub id: String,
    /// Title (`Merge: <issue>`)
    pub title: String,
    /// Priority (0 = most urgent)
    pub priority: u8,
    /// Raw store status
    pub status: IssueStatus,
    /// Assignee, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// Closing time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Source branch
    pub branch: String,
    /// Destination branch
    pub target: String,
    /// Issue this merge request fulfils
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_issue: Option<String>,
    /// Author of the branch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    /// Originating workspace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rig: Option<String>,
    /// Commit produced by a successful merge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<String>,
    /// Why the record was closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    /// Failure detail of the last merge attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Records this merge request waits on
    #[serde(rename = "depends_on", skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<IssueRef>,
    /// Records waiting on this merge request
    #[serde(rename = "blocks", skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<IssueRef>,
    /// Description lines that are not merge request fields
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl MergeRequest {
    /// Build the merge request view of a store record
    pub fn from_issue(issue: Issue) -> Self {
        let decoded = fields::decode(&issue.description);
        let f = decoded.fields.unwrap_or_default();
        Self {
            id: issue.id,
            title: issue.title,
            priority: issue.priority,
            status: issue.status,
            assignee: issue.assignee,
            created_at: issue.created_at,
            updated_at: issue.updated_at,
            closed_at: issue.closed_at,
            branch: f.branch.unwrap_or_default(),
            target: f.target.unwrap_or_else(|| DEFAULT_TARGET.to_string()),
            source_issue: f.source_issue,
            worker: f.worker,
            rig: f.rig,
            merge_commit: f.merge_commit,
            close_reason: f.close_reason,
            error: f.error,
            dependencies: issue.dependencies,
            dependents: issue.dependents,
            notes: decoded.notes,
        }
    }

    /// Embedded fields as they should be written back to the description
    pub fn fields(&self) -> MrFields {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        MrFields {
            branch: non_empty(&self.branch),
            target: non_empty(&self.target),
            source_issue: self.source_issue.clone(),
            worker: self.worker.clone(),
            rig: self.rig.clone(),
            merge_commit: self.merge_commit.clone(),
            close_reason: self.close_reason.clone(),
            error: self.error.clone(),
        }
    }

    /// Description text for the current fields and notes
    pub fn description(&self) -> String {
        fields::compose(&self.fields(), &self.notes)
    }

    /// Dependencies that have not reached a closed state
    pub fn unresolved_blockers(&self) -> impl Iterator<Item = &IssueRef> {
        self.dependencies
            .iter()
            .filter(|dep| dep.status != IssueStatus::Closed)
    }

    /// Id of the first unresolved dependency
    pub fn first_blocker(&self) -> Option<&str> {
        self.unresolved_blockers().next().map(|dep| dep.id.as_str())
    }

    /// Open with a recorded merge error
    pub fn is_failed(&self) -> bool {
        self.status == IssueStatus::Open && self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Derived status used for listing and scheduling
    pub fn display_status(&self) -> DisplayStatus {
        match self.status {
            IssueStatus::InProgress => DisplayStatus::InProgress,
            IssueStatus::Closed => DisplayStatus::Closed,
            IssueStatus::Open if self.first_blocker().is_some() => DisplayStatus::Blocked,
            IssueStatus::Open if self.is_failed() => DisplayStatus::Failed,
            IssueStatus::Open => DisplayStatus::Ready,
        }
    }

    /// Whether the refinery may pick this merge request up
    pub fn is_ready(&self) -> bool {
        self.display_status() == DisplayStatus::Ready
    }

    /// Epic id when the target is an integration branch
    pub fn epic(&self) -> Option<&str> {
        self.target.strip_prefix(INTEGRATION_PREFIX)
    }
}

/// Detailed status of one merge request
#[derive(Debug, Clone, Serialize)]
pub struct MrStatus {
    /// Merge request view
    #[serde(flatten)]
    pub merge_request: MergeRequest,
    /// Raw record type
    #[serde(rename = "type")]
    pub issue_type: String,
    /// Derived status
    pub display_status: DisplayStatus,
}
