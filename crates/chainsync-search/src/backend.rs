//! The `SearchBackend` trait — the narrow surface the sync pipeline needs
//! from a document index.

use async_trait::async_trait;
use serde_json::Value;

use chainsync_core::document::{BulkOp, DocumentKind};
use chainsync_core::error::SyncError;
use chainsync_core::schema::IndexSchema;

/// Result of a create-index call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateIndexOutcome {
    Acknowledged,
    /// The request went through but the cluster did not confirm it.
    NotAcknowledged,
    /// Someone else created it between our existence check and the create.
    AlreadyExists,
}

/// Per-operation outcome inside a bulk response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub index: String,
    pub id: String,
    /// HTTP-style status of this operation.
    pub status: u16,
    pub error: Option<String>,
    pub is_delete: bool,
}

impl BulkItem {
    /// Succeeded, or a delete of a document that was never there.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status) || (self.is_delete && self.status == 404)
    }

    /// Worth re-submitting (throttled or server-side failure).
    pub fn is_transient(&self) -> bool {
        self.status == 429 || self.status >= 500
    }
}

/// Parsed bulk response.
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    pub took_ms: u64,
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    pub fn has_failures(&self) -> bool {
        self.items.iter().any(|i| !i.is_ok())
    }
}

/// A document index (Elasticsearch-compatible).
///
/// # Object Safety
/// The trait is object-safe and is shared as `Arc<dyn SearchBackend>`.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool, SyncError>;

    async fn create_index(&self, schema: &IndexSchema) -> Result<CreateIndexOutcome, SyncError>;

    /// The `properties` object of an existing index's mapping.
    async fn get_mapping(&self, index: &str) -> Result<Option<Value>, SyncError>;

    /// A document's `_source`, if present.
    async fn get_document(&self, kind: DocumentKind, id: &str) -> Result<Option<Value>, SyncError>;

    /// Execute one bulk request. A transport-level failure is an `Err`;
    /// per-item failures are reported in the response.
    async fn bulk(&self, ops: &[BulkOp]) -> Result<BulkResponse, SyncError>;

    /// Identifier for logs (URL or name).
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: u16, is_delete: bool) -> BulkItem {
        BulkItem {
            index: "estx".into(),
            id: "0x1".into(),
            status,
            error: None,
            is_delete,
        }
    }

    #[test]
    fn item_classification() {
        assert!(item(201, false).is_ok());
        assert!(item(200, true).is_ok());
        assert!(item(404, true).is_ok());
        assert!(!item(404, false).is_ok());
        assert!(item(429, false).is_transient());
        assert!(item(503, false).is_transient());
        assert!(!item(400, false).is_transient());
    }
}
