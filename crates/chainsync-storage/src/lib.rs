//! chainsync-storage — persistent cursor stores for ChainSync.
//!
//! Backends:
//! - [`file`] — a JSON file written atomically (default)
//! - [`sqlite`] — SQLite via `sqlx` (feature `sqlite`)
//!
//! The in-memory store lives in `chainsync-core` as
//! [`MemoryCursorStore`](chainsync_core::MemoryCursorStore).

pub mod file;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileCursorStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCursorStore;
