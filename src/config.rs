//! Scheduler and backend configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Execution backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Consume runs inline on the coordinator; deterministic, for tests and
    /// cheap workloads.
    Sync,
    /// One dedicated worker thread per actor behind bounded channels.
    Worker,
    /// Long-lived runtime tasks standing in for remote cluster workers.
    Cluster,
}

/// Backend key used when an unknown key is supplied.
pub const DEFAULT_BACKEND_KEY: &str = "sync";

impl BackendKind {
    /// Resolve a runtime key (`"sync"`, `"worker"`, `"cluster"`). Unknown
    /// keys log a warning and fall back to the sync backend.
    pub fn from_key(key: &str) -> Self {
        match key {
            "sync" => Self::Sync,
            "worker" => Self::Worker,
            "cluster" => Self::Cluster,
            other => {
                warn!(key = other, "unknown backend key, defaulting to {DEFAULT_BACKEND_KEY}");
                Self::Sync
            }
        }
    }
}

/// Scheduler construction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Which execution backend hosts the actors.
    pub backend: BackendKind,
    /// Recompute the pool after every completed task instead of only when
    /// the queue composition changes.
    pub reorganize_after_each_task: bool,
    /// Emit per-decision reorganization/dispatch logs. Log detail only;
    /// never affects error surfacing.
    pub verbose: bool,
    /// Depth of the per-actor request/response channels (worker backend).
    pub channel_depth: usize,
    /// Number of ready lock objects the pooled lock store keeps on hand.
    pub lock_pool_depth: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sync,
            reorganize_after_each_task: false,
            verbose: false,
            channel_depth: 1,
            lock_pool_depth: 8,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.channel_depth == 0 {
            return Err("channel_depth must be greater than 0".into());
        }
        if self.lock_pool_depth == 0 {
            return Err("lock_pool_depth must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: SchedulerConfig =
            serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
