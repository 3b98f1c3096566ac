//! Error types for the chainsync pipeline.

use thiserror::Error;

/// Errors that can occur while syncing a chain into the search index.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Node or index temporarily unreachable.
    #[error("transient network error: {0}")]
    Transient(String),

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {ms}ms")]
    Timeout { operation: String, ms: u64 },

    /// The requested block / transaction / receipt does not exist (yet).
    #[error("not found: {0}")]
    NotFound(String),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// A node or index response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// An index exists with a mapping that is incompatible with ours.
    #[error("schema mismatch on index '{index}': {detail}")]
    SchemaMismatch { index: String, detail: String },

    /// Parent-hash check failed; a chain reorganization happened.
    #[error("reorg detected at block {height}: expected parent {expected}, got {actual}")]
    ReorgDetected {
        height: u64,
        expected: String,
        actual: String,
    },

    /// A numeric value cannot be stored without losing precision.
    #[error("precision loss in field '{field}': {value} does not fit {target}")]
    PrecisionLoss {
        field: String,
        value: String,
        target: &'static str,
    },

    /// The search index permanently rejected a write.
    #[error("index write rejected for {index}/{id}: {reason}")]
    Rejected {
        index: String,
        id: String,
        reason: String,
    },

    /// Cursor store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Unrecoverable; the last committed cursor remains the resume point.
    #[error("fatal sync error: {0}")]
    Fatal(String),
}

impl SyncError {
    /// Returns `true` if the error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout { .. })
    }

    /// Returns `true` if the error is a reorg (recoverable state transition).
    pub fn is_reorg(&self) -> bool {
        matches!(self, Self::ReorgDetected { .. })
    }

    /// Returns `true` for the "not produced yet" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Escalate into [`SyncError::Fatal`], keeping the original diagnostic.
    pub fn into_fatal(self, context: &str) -> Self {
        match self {
            Self::Fatal(_) => self,
            other => Self::Fatal(format!("{context}: {other}")),
        }
    }
}

/// Convenience alias used across the workspace.
pub type SyncResult<T> = Result<T, SyncError>;
