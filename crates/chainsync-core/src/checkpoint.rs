//! Cursor persistence — lets a restarted engine resume where it left off.
//!
//! A checkpoint stores the last committed block height and hash for one
//! `(chain, sync id)` pair. It is written only after the index acknowledged
//! the batch, so on restart the engine re-indexes at most one batch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cursor::SyncCursor;
use crate::error::SyncError;

/// A persisted cursor plus its key and write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Chain slug (e.g. `"ethereum"`).
    pub chain_id: String,
    /// Sync pipeline identifier.
    pub sync_id: String,
    /// Last committed block height.
    pub height: u64,
    /// Last committed block hash.
    pub hash: String,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

impl Checkpoint {
    pub fn cursor(&self) -> SyncCursor {
        SyncCursor::new(self.height, self.hash.clone())
    }
}

/// Trait for storing and loading cursors.
///
/// Implementations include [`MemoryCursorStore`] here and the file / SQLite
/// stores in `chainsync-storage`.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the checkpoint for a given chain + sync pair.
    async fn load(&self, chain_id: &str, sync_id: &str) -> Result<Option<Checkpoint>, SyncError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), SyncError>;

    /// Delete a checkpoint (e.g. when resetting a pipeline).
    async fn delete(&self, chain_id: &str, sync_id: &str) -> Result<(), SyncError>;
}

/// Binds a [`CursorStore`] to one `(chain, sync id)` key.
pub struct CursorManager {
    store: Box<dyn CursorStore>,
    chain_id: String,
    sync_id: String,
}

impl CursorManager {
    pub fn new(
        store: Box<dyn CursorStore>,
        chain_id: impl Into<String>,
        sync_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            chain_id: chain_id.into(),
            sync_id: sync_id.into(),
        }
    }

    /// Load the saved cursor (`None` if the pipeline never committed).
    pub async fn load(&self) -> Result<Option<SyncCursor>, SyncError> {
        Ok(self
            .store
            .load(&self.chain_id, &self.sync_id)
            .await?
            .map(|cp| cp.cursor()))
    }

    /// Persist `cursor`. Call only after the matching batch was acknowledged.
    pub async fn commit(&self, cursor: &SyncCursor) -> Result<(), SyncError> {
        let cp = Checkpoint {
            chain_id: self.chain_id.clone(),
            sync_id: self.sync_id.clone(),
            height: cursor.height,
            hash: cursor.hash.clone(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(cp).await
    }

    /// Forget the cursor; the next run starts from the configured start height.
    pub async fn reset(&self) -> Result<(), SyncError> {
        self.store.delete(&self.chain_id, &self.sync_id).await
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory cursor store for tests and ephemeral pipelines.
///
/// Clones share state, so a test can keep a handle while the engine owns the
/// boxed store. Every save is appended to a history for ordering assertions.
#[derive(Default, Clone)]
pub struct MemoryCursorStore {
    data: Arc<Mutex<HashMap<String, Checkpoint>>>,
    history: Arc<Mutex<Vec<SyncCursor>>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(chain_id: &str, sync_id: &str) -> String {
        format!("{chain_id}:{sync_id}")
    }

    /// Every cursor ever saved, oldest first.
    pub fn history(&self) -> Vec<SyncCursor> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self, chain_id: &str, sync_id: &str) -> Result<Option<Checkpoint>, SyncError> {
        Ok(self.data.lock().unwrap().get(&Self::key(chain_id, sync_id)).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), SyncError> {
        let key = Self::key(&checkpoint.chain_id, &checkpoint.sync_id);
        self.history.lock().unwrap().push(checkpoint.cursor());
        self.data.lock().unwrap().insert(key, checkpoint);
        Ok(())
    }

    async fn delete(&self, chain_id: &str, sync_id: &str) -> Result<(), SyncError> {
        self.data.lock().unwrap().remove(&Self::key(chain_id, sync_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let mgr = CursorManager::new(Box::new(MemoryCursorStore::new()), "ethereum", "main");

        // No cursor initially
        assert!(mgr.load().await.unwrap().is_none());

        mgr.commit(&SyncCursor::new(1000, "0xabc")).await.unwrap();

        let cursor = mgr.load().await.unwrap().unwrap();
        assert_eq!(cursor, SyncCursor::new(1000, "0xabc"));
    }

    #[tokio::test]
    async fn reset_removes_cursor() {
        let store = MemoryCursorStore::new();
        let mgr = CursorManager::new(Box::new(store.clone()), "ethereum", "main");
        mgr.commit(&SyncCursor::new(7, "0x7")).await.unwrap();
        mgr.reset().await.unwrap();
        assert!(mgr.load().await.unwrap().is_none());
        // history is append-only
        assert_eq!(store.history().len(), 1);
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let store = MemoryCursorStore::new();
        let a = CursorManager::new(Box::new(store.clone()), "ethereum", "a");
        let b = CursorManager::new(Box::new(store.clone()), "polygon", "a");
        a.commit(&SyncCursor::new(1, "0x1")).await.unwrap();
        assert!(b.load().await.unwrap().is_none());
    }
}
