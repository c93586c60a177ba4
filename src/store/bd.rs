//! Issue store backed by the `bd` command line tool

use super::{IssueQuery, IssueStore, IssueUpdate, NewIssue};
use crate::error::{Error, Result};
use crate::routing::StoreLocator;
use crate::types::{Issue, IssueStatus};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// Environment variable `bd` reads its database directory from
const BEADS_DIR_ENV: &str = "BEADS_DIR";

/// `bd` CLI adapter
///
/// The locator is handed to every invocation through `BEADS_DIR`; the
/// child's working directory is never used to pick a database.
#[derive(Debug, Clone)]
pub struct BdStore {
    program: String,
}

impl BdStore {
    /// Create an adapter running the given executable
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, locator: &StoreLocator, args: &[&str]) -> Result<String> {
        debug!(locator = %locator, ?args, "running bd");
        let output = Command::new(&self.program)
            .args(args)
            .env(BEADS_DIR_ENV, locator.as_str())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::StoreUnavailable(format!("failed to run {}: {e}", self.program))
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(classify_failure(locator, stderr.trim()))
        }
    }
}

impl Default for BdStore {
    fn default() -> Self {
        Self::new("bd")
    }
}

/// Map `bd` error output onto the error taxonomy
fn classify_failure(locator: &StoreLocator, stderr: &str) -> Error {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("no issue") {
        Error::NotFound(stderr.to_string())
    } else if lower.contains("invalid issue type")
        || lower.contains("unknown type")
        || lower.contains("prefix mismatch")
        || lower.contains("does not match configured prefix")
    {
        Error::SchemaMismatch {
            locator: locator.to_string(),
            detail: stderr.to_string(),
        }
    } else if lower.contains("database is locked")
        || lower.contains("connection refused")
        || lower.contains("timeout")
    {
        Error::StoreUnavailable(stderr.to_string())
    } else {
        Error::Store(stderr.to_string())
    }
}

/// `bd` prints either a single object or an array of them
fn parse_issues(json: &str) -> Result<Vec<Issue>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Issue>),
        One(Box<Issue>),
    }

    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(match serde_json::from_str::<OneOrMany>(json)? {
        OneOrMany::Many(issues) => issues,
        OneOrMany::One(issue) => vec![*issue],
    })
}

fn first_issue(json: &str) -> Result<Issue> {
    parse_issues(json)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Store("bd returned no issue".to_string()))
}

/// `bd config get` prints `{"key": ..., "value": ...}` with `--json`,
/// older versions print the bare value
fn parse_config_value(output: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ConfigValue {
        value: Option<String>,
    }

    let trimmed = output.trim();
    let value = serde_json::from_str::<ConfigValue>(trimmed)
        .map_or_else(|_| Some(trimmed.to_string()), |c| c.value)?;
    (!value.is_empty()).then_some(value)
}

#[async_trait]
impl IssueStore for BdStore {
    async fn get_issue(&self, locator: &StoreLocator, id: &str) -> Result<Option<Issue>> {
        match self.run(locator, &["show", id, "--json"]).await {
            Ok(out) => Ok(parse_issues(&out)?.into_iter().next()),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_issues(&self, locator: &StoreLocator, query: &IssueQuery) -> Result<Vec<Issue>> {
        let status = query.status.map(|s| s.to_string());
        let mut args = vec!["list", "--json"];
        if let Some(ref issue_type) = query.issue_type {
            args.extend(["--type", issue_type.as_str()]);
        }
        if let Some(ref status) = status {
            args.extend(["--status", status.as_str()]);
        }
        let out = self.run(locator, &args).await?;
        parse_issues(&out)
    }

    async fn create_issue(&self, locator: &StoreLocator, issue: &NewIssue) -> Result<Issue> {
        let priority = issue.priority.to_string();
        let out = self
            .run(
                locator,
                &[
                    "create",
                    issue.title.as_str(),
                    "--type",
                    issue.issue_type.as_str(),
                    "--priority",
                    priority.as_str(),
                    "--description",
                    issue.description.as_str(),
                    "--json",
                ],
            )
            .await?;
        first_issue(&out)
    }

    async fn update_issue(
        &self,
        locator: &StoreLocator,
        id: &str,
        update: &IssueUpdate,
    ) -> Result<Issue> {
        let open_status = update
            .status
            .filter(|s| *s != IssueStatus::Closed)
            .map(|s| s.to_string());

        let mut args = vec!["update", id];
        if let Some(ref description) = update.description {
            args.extend(["--description", description.as_str()]);
        }
        if let Some(ref status) = open_status {
            args.extend(["--status", status.as_str()]);
        }
        if args.len() > 2 {
            args.push("--json");
            self.run(locator, &args).await?;
        }
        if update.status == Some(IssueStatus::Closed) {
            self.run(locator, &["close", id, "--json"]).await?;
        }

        self.get_issue(locator, id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn get_config(&self, locator: &StoreLocator, key: &str) -> Result<Option<String>> {
        match self.run(locator, &["config", "get", key, "--json"]).await {
            Ok(out) => Ok(parse_config_value(&out)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_config(&self, locator: &StoreLocator, key: &str, value: &str) -> Result<()> {
        self.run(locator, &["config", "set", key, value]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW_OUTPUT: &str = r#"[{
        "id": "gt-mr-x1",
        "title": "Merge: gt-42",
        "issue_type": "merge-request",
        "status": "open",
        "priority": 1,
        "description": "branch: worker/nix/gt-42\ntarget: main",
        "created_at": "2026-01-02T03:04:05Z",
        "updated_at": "2026-01-02T03:04:05Z",
        "dependencies": [
            {"id": "gt-mr-x0", "title": "Merge: gt-41", "status": "in_progress", "priority": 1, "issue_type": "merge-request"}
        ]
    }]"#;

    #[test]
    fn test_parse_issue_array() {
        let issues = parse_issues(SHOW_OUTPUT).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, "gt-mr-x1");
        assert_eq!(issues[0].status, IssueStatus::Open);
        assert_eq!(issues[0].dependencies[0].status, IssueStatus::InProgress);
        assert!(issues[0].dependents.is_empty());
    }

    #[test]
    fn test_parse_single_object_with_type_alias() {
        let json = r#"{"id": "gt-1", "title": "t", "type": "task", "status": "closed",
            "created_at": "2026-01-02T03:04:05Z", "updated_at": "2026-01-02T03:04:05Z",
            "closed_at": "2026-01-03T00:00:00Z"}"#;
        let issue = first_issue(json).unwrap();
        assert_eq!(issue.issue_type, "task");
        assert!(issue.closed_at.is_some());
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_issues("  \n").unwrap().is_empty());
        assert!(first_issue("[]").is_err());
    }

    #[test]
    fn test_parse_config_value() {
        assert_eq!(parse_config_value(r#"{"key": "issue_prefix", "value": "gt"}"#).as_deref(), Some("gt"));
        assert_eq!(parse_config_value("gt\n").as_deref(), Some("gt"));
        assert_eq!(parse_config_value(r#"{"key": "issue_prefix", "value": ""}"#), None);
        assert_eq!(parse_config_value(""), None);
    }

    #[test]
    fn test_classify_failure() {
        let loc = StoreLocator::new("/town/gastown/.beads");
        assert_eq!(classify_failure(&loc, "Error: issue gt-9 not found").kind(), "not_found");
        assert_eq!(
            classify_failure(&loc, "invalid issue type: merge-request").kind(),
            "schema_mismatch"
        );
        assert_eq!(classify_failure(&loc, "database is locked").kind(), "store_unavailable");
        assert_eq!(classify_failure(&loc, "boom").kind(), "store");
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let store = BdStore::new("definitely-not-a-real-bd-binary");
        let err = store
            .get_issue(&StoreLocator::new("/tmp"), "gt-1")
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
