//! Version control operations used by the queue
//!
//! Only two things are needed from the VCS: the current branch (to default
//! `submit`) and a merge of a source branch into a target.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Outcome of a merge attempt that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The branch landed; holds the resulting commit id
    Merged {
        /// Commit on the target branch
        commit: String,
    },
    /// Conflict or failed pre-merge check; the target is left untouched
    Failed {
        /// Human-readable failure detail
        detail: String,
    },
}

/// VCS service trait
#[async_trait]
pub trait VcsService: Send + Sync {
    /// Name of the checked-out branch
    async fn current_branch(&self) -> Result<String>;

    /// Merge `branch` into `target`
    ///
    /// Conflicts and failed checks are `Ok(MergeOutcome::Failed)`; `Err` is
    /// reserved for the VCS itself being unusable.
    async fn merge(&self, branch: &str, target: &str) -> Result<MergeOutcome>;
}

/// Merge settings for [`GitCli`]
#[derive(Debug, Clone, Default)]
pub struct GitOptions {
    /// Remote to fetch from and push to
    pub remote: Option<String>,
    /// Shell command run after merging, before the result is kept
    pub pre_merge_check: Option<String>,
    /// Push the target after a successful merge
    pub push: bool,
    /// Upper bound for the pre-merge check; a check that runs longer fails
    /// and the merge is rolled back
    pub check_timeout: Option<Duration>,
}

/// Git implementation driving the `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
    options: GitOptions,
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn detail(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        text.trim().to_string()
    }
}

impl GitCli {
    /// Create a git service for the repository at `repo`
    pub fn new(repo: impl Into<PathBuf>, options: GitOptions) -> Self {
        Self {
            repo: repo.into(),
            options,
        }
    }

    async fn git(&self, args: &[&str]) -> Result<GitOutput> {
        debug!(repo = %self.repo.display(), ?args, "running git");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Vcs(format!("failed to run git: {e}")))?;
        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn git_ok(&self, args: &[&str]) -> Result<String> {
        let out = self.git(args).await?;
        if out.success {
            Ok(out.stdout.trim().to_string())
        } else {
            Err(Error::Vcs(format!("git {}: {}", args.join(" "), out.detail())))
        }
    }

    async fn run_check(&self, check: &str) -> Result<Option<String>> {
        info!(check, "running pre-merge check");
        let run = Command::new("sh")
            .arg("-c")
            .arg(check)
            .current_dir(&self.repo)
            .kill_on_drop(true)
            .output();
        let output = match self.options.check_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(output) => output,
                Err(_) => {
                    return Ok(Some(format!(
                        "pre-merge check '{check}' timed out after {}s",
                        limit.as_secs_f64()
                    )));
                }
            },
            None => run.await,
        }
        .map_err(|e| Error::Vcs(format!("failed to run pre-merge check: {e}")))?;
        if output.status.success() {
            return Ok(None);
        }
        let out = GitOutput {
            success: false,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        Ok(Some(format!("pre-merge check '{check}' failed: {}", out.detail())))
    }

    /// Undo a merge commit that must not be kept
    async fn rollback(&self, before: &str) -> Result<()> {
        self.git_ok(&["reset", "--hard", before]).await.map(|_| ())
    }

    /// Abort a merge left half-done by an attempt that was cut short
    async fn clear_interrupted_merge(&self) -> Result<()> {
        let merging = self.git(&["rev-parse", "-q", "--verify", "MERGE_HEAD"]).await?;
        if merging.success {
            warn!(repo = %self.repo.display(), "aborting interrupted merge");
            self.git_ok(&["merge", "--abort"]).await?;
        }
        Ok(())
    }

    /// Check and publish a merge commit, rolling it back unless it is kept
    async fn keep_or_rollback(&self, before: &str, target: &str) -> Result<MergeOutcome> {
        match self.verify_and_push(target).await {
            Ok(MergeOutcome::Merged { commit }) => Ok(MergeOutcome::Merged { commit }),
            Ok(failed) => {
                self.rollback(before).await?;
                Ok(failed)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback(before).await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn verify_and_push(&self, target: &str) -> Result<MergeOutcome> {
        if let Some(ref check) = self.options.pre_merge_check {
            if let Some(detail) = self.run_check(check).await? {
                return Ok(MergeOutcome::Failed { detail });
            }
        }

        if self.options.push {
            let remote = self.options.remote.as_deref().unwrap_or("origin");
            let push = self.git(&["push", remote, target]).await?;
            if !push.success {
                return Ok(MergeOutcome::Failed {
                    detail: format!("push to {remote} failed: {}", push.detail()),
                });
            }
        }

        let commit = self.git_ok(&["rev-parse", "HEAD"]).await?;
        Ok(MergeOutcome::Merged { commit })
    }
}

#[async_trait]
impl VcsService for GitCli {
    async fn current_branch(&self) -> Result<String> {
        let branch = self.git_ok(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if branch == "HEAD" {
            return Err(Error::Vcs("HEAD is detached".to_string()));
        }
        Ok(branch)
    }

    async fn merge(&self, branch: &str, target: &str) -> Result<MergeOutcome> {
        self.clear_interrupted_merge().await?;
        if let Some(ref remote) = self.options.remote {
            self.git_ok(&["fetch", remote.as_str()]).await?;
        }

        let checkout = self.git(&["checkout", target]).await?;
        if !checkout.success {
            return Ok(MergeOutcome::Failed {
                detail: format!("cannot check out {target}: {}", checkout.detail()),
            });
        }
        let before = self.git_ok(&["rev-parse", "HEAD"]).await?;

        let message = format!("Merge {branch} into {target}");
        let merge = self
            .git(&["merge", "--no-ff", "-m", message.as_str(), branch])
            .await?;
        if !merge.success {
            let detail = merge.detail();
            warn!(branch, target, %detail, "merge failed");
            if let Err(e) = self.git_ok(&["merge", "--abort"]).await {
                debug!(error = %e, "merge --abort failed");
            }
            return Ok(MergeOutcome::Failed { detail });
        }

        let outcome = self.keep_or_rollback(&before, target).await?;
        if let MergeOutcome::Merged { ref commit } = outcome {
            info!(branch, target, %commit, "merged");
        }
        Ok(outcome)
    }
}
