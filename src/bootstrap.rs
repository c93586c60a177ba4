//! Store schema bootstrapping
//!
//! Makes sure a store accepts merge-request records and generates ids with
//! the prefix its route expects. The store's persisted configuration is the
//! only source of truth: writes are read back before a store counts as
//! configured, and the in-process memo only skips repeat checks of a
//! locator already verified by this process.

use crate::error::{Error, Result};
use crate::routing::StoreLocator;
use crate::store::{PREFIX_KEYS, StoreHandle, TYPES_KEY};
use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Number of write-then-verify rounds before giving up
const WRITE_ATTEMPTS: usize = 2;

/// Schema a store must provide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRequirements {
    /// Custom types the store must allow
    pub types: Vec<String>,
    /// Id prefix the store must generate
    pub id_prefix: String,
}

/// Schema as currently persisted by a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedSchema {
    /// Allowed custom types
    pub types: BTreeSet<String>,
    /// Values of each prefix key, in [`PREFIX_KEYS`] order
    pub prefixes: Vec<Option<String>>,
}

impl ObservedSchema {
    /// Effective prefix: first key that has a value
    pub fn prefix(&self) -> Option<&str> {
        self.prefixes.iter().flatten().next().map(String::as_str)
    }

    /// Problems with respect to the requirements; empty when satisfied
    ///
    /// Any prefix key that is set must agree, so every reader variant sees
    /// the required value.
    pub fn gaps(&self, required: &SchemaRequirements) -> Vec<String> {
        let mut gaps: Vec<String> = required
            .types
            .iter()
            .filter(|t| !self.types.contains(t.as_str()))
            .map(|t| format!("type '{t}' not allowed"))
            .collect();

        if self.prefix().is_none() {
            gaps.push("no id prefix configured".to_string());
        }
        for (key, value) in PREFIX_KEYS.iter().zip(&self.prefixes) {
            if let Some(value) = value.as_deref().filter(|v| *v != required.id_prefix) {
                gaps.push(format!(
                    "{key} is '{value}', expected '{}'",
                    required.id_prefix
                ));
            }
        }
        gaps
    }
}

fn parse_types(value: Option<&str>) -> BTreeSet<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read the persisted schema of a store
pub async fn read_schema(store: &StoreHandle<'_>) -> Result<ObservedSchema> {
    let types = parse_types(store.get_config(TYPES_KEY).await?.as_deref());
    let mut prefixes = Vec::with_capacity(PREFIX_KEYS.len());
    for key in PREFIX_KEYS {
        prefixes.push(
            store
                .get_config(key)
                .await?
                .filter(|v| !v.trim().is_empty()),
        );
    }
    Ok(ObservedSchema { types, prefixes })
}

/// Process-wide bootstrapper with a per-locator memo
#[derive(Debug, Default)]
pub struct Bootstrapper {
    verified: Mutex<HashSet<StoreLocator>>,
}

impl Bootstrapper {
    /// Create a bootstrapper with an empty memo
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this process already verified the locator
    pub fn is_verified(&self, locator: &StoreLocator) -> bool {
        self.verified
            .lock()
            .is_ok_and(|verified| verified.contains(locator))
    }

    fn mark_verified(&self, locator: &StoreLocator) {
        if let Ok(mut verified) = self.verified.lock() {
            verified.insert(locator.clone());
        }
    }

    /// Forget a locator so the next call reads the store again
    pub fn invalidate(&self, locator: &StoreLocator) {
        if let Ok(mut verified) = self.verified.lock() {
            verified.remove(locator);
        }
    }

    /// Ensure the store behind `store` satisfies `required`
    ///
    /// Reads the persisted configuration, writes whatever is missing (all
    /// prefix key synonyms included) and reads it back. Two failed
    /// read-backs in a row are `ConfigWriteFailed`.
    pub async fn ensure_configured(
        &self,
        store: &StoreHandle<'_>,
        required: &SchemaRequirements,
    ) -> Result<()> {
        let locator = store.locator();
        if self.is_verified(locator) {
            return Ok(());
        }

        let mut observed = read_schema(store).await?;
        let mut gaps = observed.gaps(required);
        if gaps.is_empty() {
            debug!(locator = %locator, "store already configured");
            self.mark_verified(locator);
            return Ok(());
        }

        for attempt in 1..=WRITE_ATTEMPTS {
            debug!(locator = %locator, attempt, ?gaps, "writing store configuration");
            write_schema(store, required, &observed).await?;

            observed = read_schema(store).await?;
            gaps = observed.gaps(required);
            if gaps.is_empty() {
                info!(locator = %locator, prefix = %required.id_prefix, "configured store");
                self.mark_verified(locator);
                return Ok(());
            }
            warn!(locator = %locator, attempt, ?gaps, "store configuration did not stick");
        }

        Err(Error::ConfigWriteFailed {
            locator: locator.to_string(),
            detail: gaps.join("; "),
        })
    }
}

async fn write_schema(
    store: &StoreHandle<'_>,
    required: &SchemaRequirements,
    observed: &ObservedSchema,
) -> Result<()> {
    let missing_type = required
        .types
        .iter()
        .any(|t| !observed.types.contains(t.as_str()));
    if missing_type {
        let mut types = observed.types.clone();
        types.extend(required.types.iter().cloned());
        let value = types.into_iter().collect::<Vec<_>>().join(",");
        store.set_config(TYPES_KEY, &value).await?;
    }

    for (key, value) in PREFIX_KEYS.iter().zip(&observed.prefixes) {
        if value.as_deref() != Some(required.id_prefix.as_str()) {
            store.set_config(key, &required.id_prefix).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> SchemaRequirements {
        SchemaRequirements {
            types: vec!["merge-request".to_string()],
            id_prefix: "gt".to_string(),
        }
    }

    #[test]
    fn test_parse_types() {
        let types = parse_types(Some(" agent, merge-request ,,convoy"));
        assert_eq!(
            types.into_iter().collect::<Vec<_>>(),
            vec!["agent", "convoy", "merge-request"]
        );
        assert!(parse_types(None).is_empty());
    }

    #[test]
    fn test_gaps_satisfied_with_single_prefix_key() {
        let observed = ObservedSchema {
            types: parse_types(Some("merge-request")),
            prefixes: vec![Some("gt".to_string()), None, None],
        };
        assert!(observed.gaps(&required()).is_empty());
    }

    #[test]
    fn test_gaps_flags_disagreeing_synonym() {
        let observed = ObservedSchema {
            types: parse_types(Some("merge-request")),
            prefixes: vec![Some("gt".to_string()), None, Some("bd".to_string())],
        };
        let gaps = observed.gaps(&required());
        assert_eq!(gaps, vec!["prefix is 'bd', expected 'gt'"]);
    }

    #[test]
    fn test_gaps_missing_everything() {
        let observed = ObservedSchema {
            types: BTreeSet::new(),
            prefixes: vec![None, None, None],
        };
        assert_eq!(observed.gaps(&required()).len(), 2);
    }
}
