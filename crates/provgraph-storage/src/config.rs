//! Store configuration.
//!
//! Defaults are built in; [`StoreConfig::from_env`] overlays `PROVGRAPH_*`
//! environment variables, ignoring values that do not parse.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What the Edge Store does with a closure-eligible link whose output is
/// already an ancestor of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Refuse the link with [`StorageError::Cycle`](crate::StorageError::Cycle).
    #[default]
    Reject,
    /// Store the link with `include_in_closure = false`.
    Untrack,
}

impl FromStr for CyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(CyclePolicy::Reject),
            "untrack" => Ok(CyclePolicy::Untrack),
            _ => Err(format!(
                "invalid cycle policy '{}', expected reject/untrack",
                s
            )),
        }
    }
}

/// Configuration shared by all [`LinkStore`](crate::LinkStore) backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub cycle_policy: CyclePolicy,
    /// Refuse a second link with the same `(input, output, label)`.
    pub unique_links: bool,
    /// SQLite busy handler timeout.
    pub busy_timeout_ms: u64,
    /// Extra attempts for a write transaction that failed on lock contention.
    pub busy_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            cycle_policy: CyclePolicy::Reject,
            unique_links: false,
            busy_timeout_ms: 5_000,
            busy_retries: 3,
        }
    }
}

impl StoreConfig {
    /// Reads overrides from `PROVGRAPH_CYCLE_POLICY`, `PROVGRAPH_UNIQUE_LINKS`,
    /// `PROVGRAPH_BUSY_TIMEOUT_MS` and `PROVGRAPH_BUSY_RETRIES`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = StoreConfig::default();
        if let Some(policy) = lookup("PROVGRAPH_CYCLE_POLICY") {
            match policy.parse() {
                Ok(p) => config.cycle_policy = p,
                Err(e) => tracing::warn!("ignoring PROVGRAPH_CYCLE_POLICY: {}", e),
            }
        }
        if let Some(unique) = lookup("PROVGRAPH_UNIQUE_LINKS") {
            config.unique_links = matches!(unique.as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(ms) = lookup("PROVGRAPH_BUSY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.busy_timeout_ms = ms;
        }
        if let Some(n) = lookup("PROVGRAPH_BUSY_RETRIES").and_then(|v| v.parse().ok()) {
            config.busy_retries = n;
        }
        config
    }
}
