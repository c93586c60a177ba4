//! Shared command context for CLI commands
//!
//! Loads the config once and builds the queue every command works through.

use mq_refinery::bootstrap::Bootstrapper;
use mq_refinery::config::{Config, config_path};
use mq_refinery::error::{Error, Result};
use mq_refinery::notify::WebhookNotifier;
use mq_refinery::queue::{MergeQueue, QueueSettings};
use mq_refinery::store::BdStore;
use mq_refinery::vcs::{GitCli, GitOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shared context for CLI commands
///
/// One context per process, so every command shares a single bootstrapper
/// and each store is verified at most once per run.
pub struct CommandContext {
    /// Loaded configuration
    pub config: Config,
    /// Queue wired to the `bd` store, git and the optional webhook
    pub queue: Arc<MergeQueue>,
}

impl CommandContext {
    /// Create a command context
    ///
    /// `config` overrides the default path (`$MQ_CONFIG`, then the user
    /// config dir). A missing file means defaults.
    pub fn new(config: Option<&Path>) -> Result<Self> {
        let path = match config {
            Some(path) => path.to_path_buf(),
            None => config_path()
                .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))?,
        };
        debug!(path = %path.display(), "loading config");
        let config = Config::load(&path)?;
        let queue = Arc::new(build_queue(&config)?);
        Ok(Self { config, queue })
    }

    /// Tenant prefix for a rig argument, falling back to `default_rig`
    pub fn tenant(&self, rig: Option<&str>) -> Result<String> {
        rig.or(self.config.default_rig.as_deref())
            .map(|rig| self.config.tenant_for(rig))
            .ok_or_else(|| Error::Config("no rig given and no default_rig configured".to_string()))
    }
}

fn build_queue(config: &Config) -> Result<MergeQueue> {
    let router = config.router()?;
    let store = Arc::new(BdStore::new(config.store.command.clone()));
    let repo = config
        .refinery
        .repo
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let vcs = Arc::new(GitCli::new(
        repo,
        GitOptions {
            remote: config.refinery.remote.clone(),
            pre_merge_check: config.refinery.pre_merge_check.clone(),
            push: config.refinery.push,
            check_timeout: Some(Duration::from_secs(config.refinery.check_timeout_secs)),
        },
    ));

    let mut queue = MergeQueue::new(store, router, vcs, QueueSettings::from(config))
        .with_bootstrapper(Arc::new(Bootstrapper::new()));
    if let Some(url) = config.webhook_url()? {
        queue = queue.with_notifier(Arc::new(WebhookNotifier::new(url, config.notify_timeout())?));
    }
    Ok(queue)
}
