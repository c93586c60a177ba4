//! mq-refinery - merge queue coordination for parallel work branches
//!
//! Merge requests are records in an external, multi-tenant issue store.
//! Their structured metadata rides inside the record description
//! ([`fields`]). Every store access is routed by id prefix ([`routing`]) and
//! preceded by a schema check of the target store ([`bootstrap`]).
//!
//! [`queue::MergeQueue`] implements the lifecycle operations (submit, list,
//! status, retry, reject); [`refinery::Refinery`] merges ready merge
//! requests one target branch at a time.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod fields;
pub mod logging;
pub mod notify;
pub mod queue;
pub mod refinery;
pub mod routing;
pub mod store;
pub mod types;
pub mod vcs;
