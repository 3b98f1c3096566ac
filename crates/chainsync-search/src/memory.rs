//! In-memory search backend for tests and dry runs.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use chainsync_core::document::{BulkOp, DocumentKind};
use chainsync_core::error::SyncError;
use chainsync_core::schema::IndexSchema;

use crate::backend::{BulkItem, BulkResponse, CreateIndexOutcome, SearchBackend};

/// A scripted failure for the next bulk call.
#[derive(Debug, Clone)]
pub enum BulkFault {
    /// The call goes through normally (to fail a later call).
    Pass,
    /// The whole request fails at the transport level.
    Unreachable,
    /// Every item comes back with this status.
    ItemStatus(u16),
}

#[derive(Default)]
struct Inner {
    mappings: HashMap<String, Value>,
    docs: HashMap<String, BTreeMap<String, Value>>,
    faults: VecDeque<BulkFault>,
    bulk_calls: usize,
}

/// Stores documents in per-index ordered maps.
///
/// Clones share state, so a test can hold a handle while the engine owns
/// another. Bulk writes without a prior `create_index` auto-create the index
/// with an empty mapping, like a permissive cluster would.
#[derive(Default, Clone)]
pub struct InMemorySearch {
    inner: Arc<Mutex<Inner>>,
}

impl InMemorySearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an index with an arbitrary mapping (to test compatibility checks).
    pub fn with_mapping(self, index: &str, properties: Value) -> Self {
        self.inner
            .lock()
            .unwrap()
            .mappings
            .insert(index.to_string(), properties);
        self
    }

    /// Queue a failure for an upcoming bulk call.
    pub fn push_fault(&self, fault: BulkFault) {
        self.inner.lock().unwrap().faults.push_back(fault);
    }

    pub fn get(&self, kind: DocumentKind, id: &str) -> Option<Value> {
        self.inner
            .lock()
            .unwrap()
            .docs
            .get(kind.index())
            .and_then(|m| m.get(id).cloned())
    }

    pub fn count(&self, kind: DocumentKind) -> usize {
        self.inner
            .lock()
            .unwrap()
            .docs
            .get(kind.index())
            .map_or(0, BTreeMap::len)
    }

    /// Document ids of one index, in key order.
    pub fn ids(&self, kind: DocumentKind) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .docs
            .get(kind.index())
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of bulk requests received, failed ones included.
    pub fn bulk_calls(&self) -> usize {
        self.inner.lock().unwrap().bulk_calls
    }
}

#[async_trait]
impl SearchBackend for InMemorySearch {
    async fn index_exists(&self, index: &str) -> Result<bool, SyncError> {
        Ok(self.inner.lock().unwrap().mappings.contains_key(index))
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<CreateIndexOutcome, SyncError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.mappings.contains_key(schema.name()) {
            return Ok(CreateIndexOutcome::AlreadyExists);
        }
        inner
            .mappings
            .insert(schema.name().to_string(), schema.properties());
        inner.docs.entry(schema.name().to_string()).or_default();
        Ok(CreateIndexOutcome::Acknowledged)
    }

    async fn get_mapping(&self, index: &str) -> Result<Option<Value>, SyncError> {
        Ok(self.inner.lock().unwrap().mappings.get(index).cloned())
    }

    async fn get_document(&self, kind: DocumentKind, id: &str) -> Result<Option<Value>, SyncError> {
        Ok(self.get(kind, id))
    }

    async fn bulk(&self, ops: &[BulkOp]) -> Result<BulkResponse, SyncError> {
        let mut inner = self.inner.lock().unwrap();
        inner.bulk_calls += 1;

        let forced_status = match inner.faults.pop_front() {
            Some(BulkFault::Unreachable) => {
                return Err(SyncError::Transient("connection refused".into()))
            }
            Some(BulkFault::ItemStatus(status)) => Some(status),
            Some(BulkFault::Pass) | None => None,
        };

        let mut items = Vec::with_capacity(ops.len());
        for op in ops {
            let index = op.kind().index().to_string();
            let status = match forced_status {
                Some(status) => status,
                None => {
                    inner.mappings.entry(index.clone()).or_insert(Value::Object(Default::default()));
                    let docs = inner.docs.entry(index.clone()).or_default();
                    match op {
                        BulkOp::Index { doc, .. } => {
                            match docs.insert(doc.id.clone(), doc.body.clone()) {
                                Some(_) => 200,
                                None => 201,
                            }
                        }
                        BulkOp::Delete { id, .. } => match docs.remove(id) {
                            Some(_) => 200,
                            None => 404,
                        },
                    }
                }
            };
            items.push(BulkItem {
                index,
                id: op.id().to_string(),
                status,
                error: forced_status.map(|s| format!("scripted status {s}")),
                is_delete: op.is_delete(),
            });
        }
        Ok(BulkResponse { took_ms: 0, items })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainsync_core::document::IndexDocument;
    use chainsync_core::schema::block_schema;
    use chainsync_core::types::BlockRef;
    use serde_json::json;

    fn put(id: &str) -> BulkOp {
        BulkOp::index(
            IndexDocument {
                kind: DocumentKind::Block,
                id: id.into(),
                body: json!({ "height": id }),
            },
            BlockRef::new(1, "0x1"),
        )
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let es = InMemorySearch::new();
        assert_eq!(
            es.create_index(&block_schema()).await.unwrap(),
            CreateIndexOutcome::Acknowledged
        );
        assert_eq!(
            es.create_index(&block_schema()).await.unwrap(),
            CreateIndexOutcome::AlreadyExists
        );
        assert!(es.index_exists("esblock").await.unwrap());
    }

    #[tokio::test]
    async fn index_then_delete() {
        let es = InMemorySearch::new();
        let resp = es.bulk(&[put("1"), put("1")]).await.unwrap();
        assert_eq!(resp.items[0].status, 201);
        assert_eq!(resp.items[1].status, 200);
        assert_eq!(es.count(DocumentKind::Block), 1);

        let del = BulkOp::delete(DocumentKind::Block, "1", BlockRef::new(1, "0x1"));
        let resp = es.bulk(&[del.clone(), del]).await.unwrap();
        assert_eq!(resp.items[0].status, 200);
        assert_eq!(resp.items[1].status, 404);
        assert!(!resp.has_failures());
        assert_eq!(es.count(DocumentKind::Block), 0);
    }

    #[tokio::test]
    async fn scripted_faults_apply_once() {
        let es = InMemorySearch::new();
        es.push_fault(BulkFault::Unreachable);
        es.push_fault(BulkFault::ItemStatus(503));
        assert!(es.bulk(&[put("1")]).await.unwrap_err().is_transient());
        let resp = es.bulk(&[put("1")]).await.unwrap();
        assert!(resp.items[0].is_transient());
        assert_eq!(es.count(DocumentKind::Block), 0);
        es.bulk(&[put("1")]).await.unwrap();
        assert_eq!(es.count(DocumentKind::Block), 1);
        assert_eq!(es.bulk_calls(), 3);
    }

    #[tokio::test]
    async fn pass_lets_one_call_through() {
        let es = InMemorySearch::new();
        es.push_fault(BulkFault::Pass);
        es.push_fault(BulkFault::ItemStatus(400));
        es.bulk(&[put("1")]).await.unwrap();
        let resp = es.bulk(&[put("2")]).await.unwrap();
        assert!(resp.has_failures());
        assert_eq!(es.ids(DocumentKind::Block), vec!["1"]);
    }
}
