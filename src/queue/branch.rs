//! Source issue and worker inference from branch names

use regex::Regex;
use std::sync::LazyLock;

/// Branch namespaces of the form `<namespace>/<worker>/<issue>`
const WORKER_NAMESPACES: [&str; 2] = ["worker/", "polecat/"];

static ISSUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-z]+-[a-z0-9]+(?:\.[0-9]+)?)").unwrap_or_else(|e| panic!("bad issue pattern: {e}"))
});

/// What a branch name says about its work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    /// Full branch name
    pub branch: String,
    /// Issue id found in the name
    pub issue: Option<String>,
    /// Worker found in the name
    pub worker: Option<String>,
}

/// Parse `worker/<worker>/<issue>`, or find a bare issue id such as
/// `gt-xyz` or `gt-xyz.2` anywhere in the name
pub fn parse_branch_name(branch: &str) -> BranchInfo {
    let namespaced = WORKER_NAMESPACES
        .iter()
        .find_map(|ns| branch.strip_prefix(ns))
        .and_then(|rest| rest.split_once('/'))
        .filter(|(worker, issue)| !worker.is_empty() && !issue.is_empty());

    if let Some((worker, issue)) = namespaced {
        return BranchInfo {
            branch: branch.to_string(),
            issue: Some(issue.to_string()),
            worker: Some(worker.to_string()),
        };
    }

    BranchInfo {
        branch: branch.to_string(),
        issue: ISSUE_PATTERN
            .captures(branch)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string()),
        worker: None,
    }
}
