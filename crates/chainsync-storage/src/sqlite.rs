//! SQLite cursor store.
//!
//! Persists one row per `(chain, sync id)` in a single SQLite file, using
//! `sqlx` with WAL mode.
//!
//! # Usage
//! ```rust,no_run
//! use chainsync_storage::sqlite::SqliteCursorStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteCursorStore::open("./chainsync.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteCursorStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainsync_core::checkpoint::{Checkpoint, CursorStore};
use chainsync_core::error::SyncError;

fn storage_err(e: sqlx::Error) -> SyncError {
    SyncError::Storage(e.to_string())
}

/// SQLite-backed [`CursorStore`].
pub struct SqliteCursorStore {
    pool: SqlitePool,
}

impl SqliteCursorStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./chainsync.db"`) or a full
    /// SQLite URL (`"sqlite:./chainsync.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, SyncError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database. All data is lost when the pool is dropped.
    pub async fn in_memory() -> Result<Self, SyncError> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), SyncError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_cursors (
                chain_id   TEXT    NOT NULL,
                sync_id    TEXT    NOT NULL,
                height     INTEGER NOT NULL,
                hash       TEXT    NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (chain_id, sync_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl CursorStore for SqliteCursorStore {
    async fn load(&self, chain_id: &str, sync_id: &str) -> Result<Option<Checkpoint>, SyncError> {
        let row = sqlx::query(
            "SELECT chain_id, sync_id, height, hash, updated_at
             FROM sync_cursors WHERE chain_id = ? AND sync_id = ?",
        )
        .bind(chain_id)
        .bind(sync_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| Checkpoint {
            chain_id: r.get("chain_id"),
            sync_id: r.get("sync_id"),
            height: r.get::<i64, _>("height") as u64,
            hash: r.get("hash"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), SyncError> {
        let height = i64::try_from(checkpoint.height)
            .map_err(|_| SyncError::Storage(format!("height {} out of range", checkpoint.height)))?;

        sqlx::query(
            "INSERT OR REPLACE INTO sync_cursors
             (chain_id, sync_id, height, hash, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.chain_id)
        .bind(&checkpoint.sync_id)
        .bind(height)
        .bind(&checkpoint.hash)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            chain_id = %checkpoint.chain_id,
            sync_id = %checkpoint.sync_id,
            height = checkpoint.height,
            "cursor saved"
        );
        Ok(())
    }

    async fn delete(&self, chain_id: &str, sync_id: &str) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM sync_cursors WHERE chain_id = ? AND sync_id = ?")
            .bind(chain_id)
            .bind(sync_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(sync_id: &str, height: u64, hash: &str) -> Checkpoint {
        Checkpoint {
            chain_id: "ethereum".into(),
            sync_id: sync_id.into(),
            height,
            hash: hash.into(),
            updated_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn cursor_roundtrip() {
        let store = SqliteCursorStore::in_memory().await.unwrap();
        store.save(checkpoint("es", 1_000, "0xabcdef")).await.unwrap();

        let loaded = store.load("ethereum", "es").await.unwrap().unwrap();
        assert_eq!(loaded.height, 1_000);
        assert_eq!(loaded.hash, "0xabcdef");
        assert_eq!(loaded.updated_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn save_overwrites() {
        let store = SqliteCursorStore::in_memory().await.unwrap();
        store.save(checkpoint("es", 100, "0xold")).await.unwrap();
        // Lower heights are legal (reorg recovery).
        store.save(checkpoint("es", 90, "0xancestor")).await.unwrap();

        let loaded = store.load("ethereum", "es").await.unwrap().unwrap();
        assert_eq!(loaded.height, 90);
        assert_eq!(loaded.hash, "0xancestor");
    }

    #[tokio::test]
    async fn missing_returns_none() {
        let store = SqliteCursorStore::in_memory().await.unwrap();
        assert!(store.load("unknown", "unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_and_isolation() {
        let store = SqliteCursorStore::in_memory().await.unwrap();
        store.save(checkpoint("a", 5, "0x5")).await.unwrap();
        store.save(checkpoint("b", 7, "0x7")).await.unwrap();

        store.delete("ethereum", "a").await.unwrap();
        assert!(store.load("ethereum", "a").await.unwrap().is_none());
        assert_eq!(store.load("ethereum", "b").await.unwrap().unwrap().height, 7);
    }

    #[tokio::test]
    async fn height_beyond_sqlite_integer_is_rejected() {
        let store = SqliteCursorStore::in_memory().await.unwrap();
        let err = store.save(checkpoint("es", u64::MAX, "0x1")).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
    }
}
