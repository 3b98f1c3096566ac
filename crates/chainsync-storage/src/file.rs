//! JSON-file cursor store.
//!
//! All cursors live in one small JSON document keyed by `chain/sync id`.
//! Every save writes a sibling temp file, flushes it to disk, renames it over
//! the original and syncs the directory, so a crash or power loss leaves
//! either the old or the new cursor, never a torn file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use chainsync_core::checkpoint::{Checkpoint, CursorStore};
use chainsync_core::error::SyncError;

type CursorFile = BTreeMap<String, Checkpoint>;

/// File-backed [`CursorStore`].
pub struct FileCursorStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileCursorStore {
    /// Use `path` for storage. The file is created on the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key(chain_id: &str, sync_id: &str) -> String {
        format!("{chain_id}/{sync_id}")
    }

    async fn read(&self) -> Result<CursorFile, SyncError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                SyncError::Storage(format!("corrupt cursor file {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CursorFile::new()),
            Err(e) => Err(SyncError::Storage(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write(&self, cursors: &CursorFile) -> Result<(), SyncError> {
        let bytes = serde_json::to_vec_pretty(cursors)
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let io_err = |what: &str, path: &Path, e: std::io::Error| {
            SyncError::Storage(format!("cannot {what} {}: {e}", path.display()))
        };

        let dir = self.path.parent().filter(|d| !d.as_os_str().is_empty());
        if let Some(dir) = dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_err("create", dir, e))?;
        }

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| io_err("create", &tmp, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| io_err("write", &tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_err("sync", &tmp, e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_err("replace", &self.path, e))?;
        sync_dir(dir.unwrap_or_else(|| Path::new(".")))
            .await
            .map_err(|e| io_err("sync directory of", &self.path, e))
    }
}

/// Make the rename itself durable.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self, chain_id: &str, sync_id: &str) -> Result<Option<Checkpoint>, SyncError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.remove(&Self::key(chain_id, sync_id)))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), SyncError> {
        let _guard = self.lock.lock().await;
        let mut cursors = self.read().await?;
        let key = Self::key(&checkpoint.chain_id, &checkpoint.sync_id);
        let height = checkpoint.height;
        cursors.insert(key, checkpoint);
        self.write(&cursors).await?;
        debug!(path = %self.path.display(), height, "cursor saved");
        Ok(())
    }

    async fn delete(&self, chain_id: &str, sync_id: &str) -> Result<(), SyncError> {
        let _guard = self.lock.lock().await;
        let mut cursors = self.read().await?;
        if cursors.remove(&Self::key(chain_id, sync_id)).is_some() {
            self.write(&cursors).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainsync_core::checkpoint::CursorManager;
    use chainsync_core::cursor::SyncCursor;

    fn checkpoint(sync_id: &str, height: u64) -> Checkpoint {
        Checkpoint {
            chain_id: "ethereum".into(),
            sync_id: sync_id.into(),
            height,
            hash: format!("0x{height:x}"),
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn missing_file_means_no_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCursorStore::new(dir.path().join("cursor.json"));
        assert!(store.load("ethereum", "es").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cursor.json");

        let store = FileCursorStore::new(&path);
        store.save(checkpoint("es", 10)).await.unwrap();
        store.save(checkpoint("es", 12)).await.unwrap();
        drop(store);

        let reopened = FileCursorStore::new(&path);
        let cp = reopened.load("ethereum", "es").await.unwrap().unwrap();
        assert_eq!(cp.height, 12);
        assert_eq!(cp.hash, "0xc");
        assert!(!dir.path().join("state").join("cursor.json.tmp").exists());
    }

    #[tokio::test]
    async fn stale_temp_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        // Left behind by a crash between write and rename.
        std::fs::write(dir.path().join("cursor.json.tmp"), b"{\"torn").unwrap();

        let store = FileCursorStore::new(&path);
        assert!(store.load("ethereum", "es").await.unwrap().is_none());
        store.save(checkpoint("es", 7)).await.unwrap();

        assert!(!dir.path().join("cursor.json.tmp").exists());
        let on_disk: CursorFile = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk["ethereum/es"].height, 7);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCursorStore::new(dir.path().join("cursor.json"));
        store.save(checkpoint("a", 1)).await.unwrap();
        store.save(checkpoint("b", 2)).await.unwrap();
        store.delete("ethereum", "a").await.unwrap();

        assert!(store.load("ethereum", "a").await.unwrap().is_none());
        assert_eq!(store.load("ethereum", "b").await.unwrap().unwrap().height, 2);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = FileCursorStore::new(&path).load("ethereum", "es").await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
    }

    #[tokio::test]
    async fn works_behind_cursor_manager() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCursorStore::new(dir.path().join("cursor.json"));
        let mgr = CursorManager::new(Box::new(store), "ethereum", "es");

        assert!(mgr.load().await.unwrap().is_none());
        mgr.commit(&SyncCursor::new(3, "0xb3")).await.unwrap();
        assert_eq!(mgr.load().await.unwrap(), Some(SyncCursor::new(3, "0xb3")));
        mgr.reset().await.unwrap();
        assert!(mgr.load().await.unwrap().is_none());
    }
}
