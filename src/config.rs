//! Configuration loaded from `config.toml`

use crate::error::{Error, Result};
use crate::routing::{Route, Router};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable overriding the config path
pub const CONFIG_ENV: &str = "MQ_CONFIG";

/// Directory name under the user config dir
const CONFIG_DIR: &str = "mq";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

/// Lock directory name under the temp dir
const LOCK_DIR: &str = "mq-locks";

/// A named workspace and the id prefix of its tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigConfig {
    /// Rig name
    pub name: String,
    /// Tenant id prefix, e.g. `gt`
    pub prefix: String,
}

/// Issue store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `bd` executable
    pub command: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            command: "bd".to_string(),
        }
    }
}

/// Refinery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineryConfig {
    /// Repository merges happen in (default: current directory)
    pub repo: Option<PathBuf>,
    /// Remote to fetch from and push to
    pub remote: Option<String>,
    /// Shell command that must pass before a merge is kept
    pub pre_merge_check: Option<String>,
    /// Push targets after merging
    pub push: bool,
    /// Seconds between refinery cycles
    pub poll_interval_secs: u64,
    /// Upper bound for one merge attempt
    pub merge_timeout_secs: u64,
    /// Upper bound for the pre-merge check; must be below
    /// `merge_timeout_secs` so a slow check is rolled back in time
    pub check_timeout_secs: u64,
    /// Directory holding per-target lock files shared by every `mq`
    /// process on the host (default: `<temp dir>/mq-locks`)
    pub lock_dir: Option<PathBuf>,
}

impl Default for RefineryConfig {
    fn default() -> Self {
        Self {
            repo: None,
            remote: None,
            pre_merge_check: None,
            push: false,
            poll_interval_secs: 30,
            merge_timeout_secs: 600,
            check_timeout_secs: 480,
            lock_dir: None,
        }
    }
}

/// Notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook receiving rejection notices
    pub webhook_url: Option<String>,
    /// Upper bound for one webhook request
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Branches that can never be submitted
    pub trunk_branches: Vec<String>,
    /// Priority used when the source issue cannot be read
    pub default_priority: u8,
    /// Record type of merge requests
    pub merge_request_type: String,
    /// Custom types every store must allow
    pub required_types: Vec<String>,
    /// Timeout for a single store call
    pub store_timeout_secs: u64,
    /// Default rig for commands that take one
    pub default_rig: Option<String>,
    /// Inline routing table
    pub routes: Vec<Route>,
    /// Beads-style `routes.jsonl`, appended to `routes`
    pub routes_file: Option<PathBuf>,
    /// Known rigs
    pub rigs: Vec<RigConfig>,
    /// Store adapter
    pub store: StoreConfig,
    /// Refinery
    pub refinery: RefineryConfig,
    /// Notifications
    pub notify: NotifyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trunk_branches: vec!["main".to_string(), "master".to_string()],
            default_priority: 2,
            merge_request_type: "merge-request".to_string(),
            required_types: vec!["merge-request".to_string()],
            store_timeout_secs: 30,
            default_rig: None,
            routes: Vec::new(),
            routes_file: None,
            rigs: Vec::new(),
            store: StoreConfig::default(),
            refinery: RefineryConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

/// Default config path: `$MQ_CONFIG`, else `<config dir>/mq/config.toml`
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

impl Config {
    /// Parse and validate config text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    fn validate(&self) -> Result<()> {
        if self.default_priority > 4 {
            return Err(Error::Config(format!(
                "default_priority {} is outside 0-4",
                self.default_priority
            )));
        }
        if self.store_timeout_secs == 0 {
            return Err(Error::Config("store_timeout_secs must be positive".to_string()));
        }
        if self.notify.timeout_secs == 0 {
            return Err(Error::Config("notify.timeout_secs must be positive".to_string()));
        }
        let refinery = &self.refinery;
        if refinery.check_timeout_secs == 0 || refinery.check_timeout_secs >= refinery.merge_timeout_secs {
            return Err(Error::Config(format!(
                "refinery.check_timeout_secs ({}) must be positive and below merge_timeout_secs ({})",
                refinery.check_timeout_secs, refinery.merge_timeout_secs
            )));
        }
        self.webhook_url()?;
        Router::new(self.routes.clone())?;
        Ok(())
    }

    /// Parsed webhook URL, if configured
    pub fn webhook_url(&self) -> Result<Option<Url>> {
        self.notify
            .webhook_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| Error::Config(format!("invalid webhook_url '{raw}': {e}")))
            })
            .transpose()
    }

    /// Router over inline routes followed by the routes file
    pub fn router(&self) -> Result<Router> {
        let mut routes = self.routes.clone();
        if let Some(ref file) = self.routes_file {
            routes.extend(Router::load_jsonl(file)?);
        }
        Router::new(routes)
    }

    /// Tenant prefix for a rig name; unknown names are taken as a prefix
    pub fn tenant_for(&self, rig_or_prefix: &str) -> String {
        self.rigs
            .iter()
            .find(|rig| rig.name == rig_or_prefix)
            .map_or_else(
                || rig_or_prefix.trim_end_matches('-').to_string(),
                |rig| rig.prefix.trim_end_matches('-').to_string(),
            )
    }

    /// Per-call store timeout
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Webhook request timeout
    pub const fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify.timeout_secs)
    }

    /// Directory of the per-target lock files
    pub fn lock_dir(&self) -> PathBuf {
        self.refinery
            .lock_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(LOCK_DIR))
    }
}
