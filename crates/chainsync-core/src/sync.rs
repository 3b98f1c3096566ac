//! Sync pipeline configuration and state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::retry::RetryConfig;

/// Configuration for one sync pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Unique name for this pipeline (used for cursor keys).
    pub id: String,
    /// Chain slug (e.g. `"ethereum"`).
    pub chain: String,
    /// Cursor position used when nothing was committed yet. The block at
    /// this height is treated as already indexed.
    pub start_height: u64,
    /// Stop once the cursor reaches this height. `None` = run forever.
    pub stop_at: Option<u64>,
    /// Above this distance to the head the engine is catching up; at or
    /// below it, following.
    pub lag_threshold: u64,
    /// Blocks per committed batch.
    pub batch_size: u64,
    /// Head polling interval while following (milliseconds).
    pub poll_interval_ms: u64,
    /// Parallel receipt / ABI lookups within one batch.
    pub receipt_concurrency: usize,
    /// Give up (fatal) when no common ancestor is found within this many blocks.
    pub max_reorg_depth: u64,
    /// Recently indexed headers kept in memory for reorg recovery.
    pub window_size: usize,
    /// Per-call timeout for node RPC (milliseconds).
    pub rpc_timeout_ms: u64,
    /// Per-call timeout for index and cursor writes (milliseconds).
    pub index_timeout_ms: u64,
    /// Maximum operations per bulk request.
    pub max_bulk_docs: usize,
    /// Backoff for transient failures.
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            chain: "ethereum".into(),
            start_height: 0,
            stop_at: None,
            lag_threshold: 6,
            batch_size: 50,
            poll_interval_ms: 2000,
            receipt_concurrency: 8,
            max_reorg_depth: 128,
            window_size: 128,
            rpc_timeout_ms: 10_000,
            index_timeout_ms: 30_000,
            max_bulk_docs: 1000,
            retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.id.is_empty() || self.chain.is_empty() {
            return Err(SyncError::Config("id and chain must be non-empty".into()));
        }
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be at least 1".into()));
        }
        if self.receipt_concurrency == 0 {
            return Err(SyncError::Config("receipt_concurrency must be at least 1".into()));
        }
        if self.max_bulk_docs == 0 {
            return Err(SyncError::Config("max_bulk_docs must be at least 1".into()));
        }
        if self.rpc_timeout_ms == 0 || self.index_timeout_ms == 0 {
            return Err(SyncError::Config("timeouts must be non-zero".into()));
        }
        if let Some(stop) = self.stop_at {
            if stop < self.start_height {
                return Err(SyncError::Config(format!(
                    "stop_at ({stop}) is below start_height ({})",
                    self.start_height
                )));
            }
        }
        Ok(())
    }
}

/// Runtime state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Loading the cursor and ensuring indices.
    Initializing,
    /// Far behind the head; indexing back-to-back batches.
    CatchingUp,
    /// Near the head; polling at a fixed interval.
    Following,
    /// Walking back to a common ancestor and retracting orphaned documents.
    ReorgRecovery,
    /// Clean stop (shutdown requested or `stop_at` reached).
    Stopped,
    /// Encountered an unrecoverable error.
    Fatal,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::CatchingUp => write!(f, "catching-up"),
            Self::Following => write!(f, "following"),
            Self::ReorgRecovery => write!(f, "reorg-recovery"),
            Self::Stopped => write!(f, "stopped"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SyncConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn rejects_zero_batch() {
        let cfg = SyncConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn rejects_stop_below_start() {
        let cfg = SyncConfig {
            start_height: 10,
            stop_at: Some(5),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_config_uses_defaults() {
        let cfg: SyncConfig =
            serde_json::from_str(r#"{"chain": "sepolia", "batch_size": 10}"#).unwrap();
        assert_eq!(cfg.chain, "sepolia");
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.max_reorg_depth, 128);
    }

    #[test]
    fn state_display() {
        assert_eq!(SyncState::ReorgRecovery.to_string(), "reorg-recovery");
        assert_eq!(SyncState::CatchingUp.to_string(), "catching-up");
    }
}
