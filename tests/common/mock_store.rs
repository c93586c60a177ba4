//! In-memory issue store for testing

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mq_refinery::error::{Error, Result};
use mq_refinery::routing::StoreLocator;
use mq_refinery::store::{IssueQuery, IssueStore, IssueUpdate, NewIssue, PREFIX_KEYS, TYPES_KEY};
use mq_refinery::types::{Issue, IssueRef, IssueStatus};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Types every store accepts without configuration
const BUILTIN_TYPES: [&str; 5] = ["task", "bug", "feature", "epic", "chore"];

/// Call record for `set_config`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetConfigCall {
    pub locator: String,
    pub key: String,
    pub value: String,
}

/// Call record for `update_issue`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCall {
    pub id: String,
    pub status: Option<IssueStatus>,
}

#[derive(Debug, Clone)]
struct StoredIssue {
    issue: Issue,
    depends_on: Vec<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    config: HashMap<String, String>,
    issues: BTreeMap<String, StoredIssue>,
}

/// Multi-locator in-memory store
///
/// Mirrors the parts of `bd` the queue relies on:
/// - Records are created only if their type is allowed and an id prefix is
///   configured (`SchemaMismatch` otherwise)
/// - Dependencies and dependents are resolved across all locators on read
/// - Call tracking for verification
/// - Error, delay and lost-write injection
pub struct MockStore {
    stores: Mutex<HashMap<StoreLocator, StoreState>>,
    next_id: AtomicU64,
    // Call tracking
    get_config_calls: Mutex<Vec<(String, String)>>,
    set_config_calls: Mutex<Vec<SetConfigCall>>,
    create_calls: Mutex<Vec<(String, NewIssue)>>,
    update_calls: Mutex<Vec<UpdateCall>>,
    // Injection
    unavailable: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    dropped_writes: Mutex<HashSet<StoreLocator>>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(100),
            get_config_calls: Mutex::new(Vec::new()),
            set_config_calls: Mutex::new(Vec::new()),
            create_calls: Mutex::new(Vec::new()),
            update_calls: Mutex::new(Vec::new()),
            unavailable: Mutex::new(None),
            delay: Mutex::new(None),
            dropped_writes: Mutex::new(HashSet::new()),
        }
    }

    // === Seeding ===

    /// Write a config value directly, bypassing call tracking
    pub fn seed_config(&self, locator: &str, key: &str, value: &str) {
        self.stores
            .lock()
            .unwrap()
            .entry(StoreLocator::new(locator))
            .or_default()
            .config
            .insert(key.to_string(), value.to_string());
    }

    /// Fully configure a locator for the given types and prefix
    pub fn seed_schema(&self, locator: &str, types: &[&str], prefix: &str) {
        self.seed_config(locator, TYPES_KEY, &types.join(","));
        self.seed_config(locator, PREFIX_KEYS[0], prefix);
    }

    /// Insert a record directly
    pub fn seed_issue(&self, locator: &str, issue: Issue) {
        self.stores
            .lock()
            .unwrap()
            .entry(StoreLocator::new(locator))
            .or_default()
            .issues
            .insert(
                issue.id.clone(),
                StoredIssue {
                    issue,
                    depends_on: Vec::new(),
                },
            );
    }

    /// Record that `id` depends on `on` (`on` blocks `id`)
    pub fn add_dependency(&self, id: &str, on: &str) {
        let mut stores = self.stores.lock().unwrap();
        for state in stores.values_mut() {
            if let Some(stored) = state.issues.get_mut(id) {
                stored.depends_on.push(on.to_string());
                return;
            }
        }
        panic!("add_dependency: no record {id}");
    }

    // === Inspection ===

    /// Raw config value
    pub fn config_value(&self, locator: &str, key: &str) -> Option<String> {
        self.stores
            .lock()
            .unwrap()
            .get(&StoreLocator::new(locator))
            .and_then(|state| state.config.get(key).cloned())
    }

    /// Raw record as stored, without dependency resolution
    pub fn raw_issue(&self, id: &str) -> Option<Issue> {
        self.stores
            .lock()
            .unwrap()
            .values()
            .find_map(|state| state.issues.get(id).map(|s| s.issue.clone()))
    }

    /// Locator holding a record
    pub fn locator_of(&self, id: &str) -> Option<String> {
        self.stores
            .lock()
            .unwrap()
            .iter()
            .find(|(_, state)| state.issues.contains_key(id))
            .map(|(locator, _)| locator.to_string())
    }

    pub fn get_config_call_count(&self) -> usize {
        self.get_config_calls.lock().unwrap().len()
    }

    pub fn set_config_calls(&self) -> Vec<SetConfigCall> {
        self.set_config_calls.lock().unwrap().clone()
    }

    pub fn create_calls(&self) -> Vec<(String, NewIssue)> {
        self.create_calls.lock().unwrap().clone()
    }

    pub fn update_calls(&self) -> Vec<UpdateCall> {
        self.update_calls.lock().unwrap().clone()
    }

    /// Forget recorded calls
    pub fn reset_calls(&self) {
        self.get_config_calls.lock().unwrap().clear();
        self.set_config_calls.lock().unwrap().clear();
        self.create_calls.lock().unwrap().clear();
        self.update_calls.lock().unwrap().clear();
    }

    // === Injection ===

    /// Make every call fail with `StoreUnavailable`
    pub fn fail_all(&self, msg: &str) {
        *self.unavailable.lock().unwrap() = Some(msg.to_string());
    }

    /// Stop failing calls
    pub fn recover(&self) {
        *self.unavailable.lock().unwrap() = None;
    }

    /// Sleep before answering every call
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Accept `set_config` on a locator without persisting anything
    pub fn drop_config_writes(&self, locator: &str) {
        self.dropped_writes
            .lock()
            .unwrap()
            .insert(StoreLocator::new(locator));
    }

    async fn enter(&self) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let unavailable = self.unavailable.lock().unwrap().clone();
        unavailable.map_or(Ok(()), |msg| Err(Error::StoreUnavailable(msg)))
    }

    fn issue_ref(stored: &StoredIssue) -> IssueRef {
        IssueRef {
            id: stored.issue.id.clone(),
            title: stored.issue.title.clone(),
            status: stored.issue.status,
            priority: stored.issue.priority,
            issue_type: stored.issue.issue_type.clone(),
        }
    }

    /// Record with dependency edges resolved across all locators
    fn resolve(stores: &HashMap<StoreLocator, StoreState>, stored: &StoredIssue) -> Issue {
        let find = |id: &str| stores.values().find_map(|state| state.issues.get(id));
        let mut issue = stored.issue.clone();
        issue.dependencies = stored
            .depends_on
            .iter()
            .filter_map(|id| find(id))
            .map(Self::issue_ref)
            .collect();
        issue.dependents = stores
            .values()
            .flat_map(|state| state.issues.values())
            .filter(|other| other.depends_on.contains(&stored.issue.id))
            .map(Self::issue_ref)
            .collect();
        issue
    }
}

#[async_trait]
impl IssueStore for MockStore {
    async fn get_issue(&self, locator: &StoreLocator, id: &str) -> Result<Option<Issue>> {
        self.enter().await?;
        let stores = self.stores.lock().unwrap();
        Ok(stores
            .get(locator)
            .and_then(|state| state.issues.get(id))
            .map(|stored| Self::resolve(&stores, stored)))
    }

    async fn list_issues(&self, locator: &StoreLocator, query: &IssueQuery) -> Result<Vec<Issue>> {
        self.enter().await?;
        let stores = self.stores.lock().unwrap();
        let Some(state) = stores.get(locator) else {
            return Ok(Vec::new());
        };
        Ok(state
            .issues
            .values()
            .filter(|s| query.issue_type.as_ref().is_none_or(|t| *t == s.issue.issue_type))
            .filter(|s| query.status.is_none_or(|status| status == s.issue.status))
            .map(|stored| Self::resolve(&stores, stored))
            .collect())
    }

    async fn create_issue(&self, locator: &StoreLocator, new: &NewIssue) -> Result<Issue> {
        self.enter().await?;
        self.create_calls
            .lock()
            .unwrap()
            .push((locator.to_string(), new.clone()));

        let mut stores = self.stores.lock().unwrap();
        let state = stores.entry(locator.clone()).or_default();

        let allowed = state
            .config
            .get(TYPES_KEY)
            .is_some_and(|types| types.split(',').any(|t| t.trim() == new.issue_type))
            || BUILTIN_TYPES.contains(&new.issue_type.as_str());
        if !allowed {
            return Err(Error::SchemaMismatch {
                locator: locator.to_string(),
                detail: format!("invalid issue type: {}", new.issue_type),
            });
        }
        let Some(prefix) = PREFIX_KEYS.iter().find_map(|key| state.config.get(*key)) else {
            return Err(Error::SchemaMismatch {
                locator: locator.to_string(),
                detail: "no issue prefix configured".to_string(),
            });
        };

        let now = Utc::now();
        let id = format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let issue = Issue {
            id: id.clone(),
            title: new.title.clone(),
            issue_type: new.issue_type.clone(),
            status: IssueStatus::Open,
            priority: new.priority,
            description: new.description.clone(),
            assignee: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            dependencies: Vec::new(),
            dependents: Vec::new(),
        };
        state.issues.insert(
            id,
            StoredIssue {
                issue: issue.clone(),
                depends_on: Vec::new(),
            },
        );
        Ok(issue)
    }

    async fn update_issue(
        &self,
        locator: &StoreLocator,
        id: &str,
        update: &IssueUpdate,
    ) -> Result<Issue> {
        self.enter().await?;
        self.update_calls.lock().unwrap().push(UpdateCall {
            id: id.to_string(),
            status: update.status,
        });

        let mut stores = self.stores.lock().unwrap();
        let stored = stores
            .get_mut(locator)
            .and_then(|state| state.issues.get_mut(id))
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let now = Utc::now();
        if let Some(status) = update.status {
            stored.issue.closed_at = (status == IssueStatus::Closed).then_some(now);
            stored.issue.status = status;
        }
        if let Some(ref description) = update.description {
            stored.issue.description.clone_from(description);
        }
        stored.issue.updated_at = now;

        let snapshot = stored.clone();
        Ok(Self::resolve(&stores, &snapshot))
    }

    async fn get_config(&self, locator: &StoreLocator, key: &str) -> Result<Option<String>> {
        self.enter().await?;
        self.get_config_calls
            .lock()
            .unwrap()
            .push((locator.to_string(), key.to_string()));
        Ok(self
            .stores
            .lock()
            .unwrap()
            .get(locator)
            .and_then(|state| state.config.get(key).cloned()))
    }

    async fn set_config(&self, locator: &StoreLocator, key: &str, value: &str) -> Result<()> {
        self.enter().await?;
        self.set_config_calls.lock().unwrap().push(SetConfigCall {
            locator: locator.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        if self.dropped_writes.lock().unwrap().contains(locator) {
            return Ok(());
        }
        self.stores
            .lock()
            .unwrap()
            .entry(locator.clone())
            .or_default()
            .config
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Build a record for seeding
pub fn make_issue(
    id: &str,
    issue_type: &str,
    priority: u8,
    description: &str,
    created_at: DateTime<Utc>,
) -> Issue {
    Issue {
        id: id.to_string(),
        title: format!("Record {id}"),
        issue_type: issue_type.to_string(),
        status: IssueStatus::Open,
        priority,
        description: description.to_string(),
        assignee: None,
        created_at,
        updated_at: created_at,
        closed_at: None,
        dependencies: Vec::new(),
        dependents: Vec::new(),
    }
}
