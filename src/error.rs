//! Error types for the merge queue

use thiserror::Error;

/// Errors raised by the merge queue, the router and the store bootstrapper
#[derive(Debug, Error)]
pub enum Error {
    /// Id or branch match resolved to no merge request
    #[error("merge request '{0}' not found")]
    NotFound(String),

    /// Retry requested for a merge request that is not in the failed substate
    #[error("merge request '{id}' has not failed (status: {status})")]
    NotFailed {
        /// Merge request id
        id: String,
        /// Display status at the time of the request
        status: String,
    },

    /// Reject requested for a merge request that is already closed
    #[error("merge request '{id}' is already closed")]
    AlreadyClosed {
        /// Merge request id
        id: String,
    },

    /// Submit could not determine the source issue
    #[error("cannot determine source issue from branch '{branch}'; use --issue to specify")]
    IssueRequired {
        /// Branch being submitted
        branch: String,
    },

    /// Submit refused a trunk branch
    #[error("cannot submit trunk branch '{0}' to the merge queue")]
    TrunkBranch(String),

    /// A branch name matched more than one open merge request
    #[error("branch '{branch}' matches several merge requests: {}", matches.join(", "))]
    AmbiguousBranch {
        /// Branch that was searched for
        branch: String,
        /// Ids of all matching merge requests
        matches: Vec<String>,
    },

    /// Priority outside 0..=4
    #[error("invalid priority {0} (expected 0-4)")]
    InvalidPriority(u8),

    /// No routing entry matches the id
    #[error("no route for '{0}'")]
    NoRoute(String),

    /// The store rejected a record because its schema does not allow it
    #[error("schema mismatch in store {locator}: {detail}")]
    SchemaMismatch {
        /// Store locator
        locator: String,
        /// Store-provided detail
        detail: String,
    },

    /// Writing the required store configuration could not be confirmed
    #[error("failed to configure store {locator}: {detail}")]
    ConfigWriteFailed {
        /// Store locator
        locator: String,
        /// What the read-back disagreed on
        detail: String,
    },

    /// The VCS reported a conflict or a failed pre-merge check
    #[error("merge of '{branch}' failed: {detail}")]
    MergeFailed {
        /// Source branch
        branch: String,
        /// Failure detail from the VCS
        detail: String,
    },

    /// The store could not be reached or did not answer in time
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store returned an error that is not otherwise classified
    #[error("store error: {0}")]
    Store(String),

    /// VCS command error
    #[error("vcs error: {0}")]
    Vcs(String),

    /// Notification transport error
    #[error("notification failed: {0}")]
    Notify(String),

    /// Invalid or unreadable configuration
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error wrapped with the operation that produced it
    #[error("{context}: {source}")]
    Context {
        /// Operation being performed
        context: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Stable machine-readable kind, unaffected by context wrapping
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotFailed { .. } => "not_failed",
            Self::AlreadyClosed { .. } => "already_closed",
            Self::IssueRequired { .. } => "issue_required",
            Self::TrunkBranch(_) => "trunk_branch",
            Self::AmbiguousBranch { .. } => "ambiguous_branch",
            Self::InvalidPriority(_) => "invalid_priority",
            Self::NoRoute(_) => "no_route",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::ConfigWriteFailed { .. } => "config_write_failed",
            Self::MergeFailed { .. } => "merge_failed",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Store(_) => "store",
            Self::Vcs(_) => "vcs",
            Self::Notify(_) => "notify",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) => true,
            Self::Context { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Innermost error beneath any context wrappers
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Wrap with a description of the operation being performed
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_kind() {
        let err = Error::StoreUnavailable("timed out".to_string())
            .context("listing merge requests")
            .context("refinery cycle");
        assert_eq!(err.kind(), "store_unavailable");
        assert!(err.is_transient());
        assert!(matches!(err.root(), Error::StoreUnavailable(_)));
        assert_eq!(
            err.to_string(),
            "refinery cycle: listing merge requests: store unavailable: timed out"
        );
    }

    #[test]
    fn test_merge_failed_is_not_transient() {
        let err = Error::MergeFailed {
            branch: "worker/nix/gt-42".to_string(),
            detail: "conflict".to_string(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.kind(), "merge_failed");
    }

    #[test]
    fn test_ambiguous_branch_lists_matches() {
        let err = Error::AmbiguousBranch {
            branch: "feat".to_string(),
            matches: vec!["gt-mr-1".to_string(), "gt-mr-2".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "branch 'feat' matches several merge requests: gt-mr-1, gt-mr-2"
        );
    }
}
