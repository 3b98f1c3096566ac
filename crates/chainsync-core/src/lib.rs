//! chainsync-core — foundation for the reorg-safe chain → search index sync.
//!
//! # Architecture
//!
//! ```text
//! SyncBuilder → SyncEngine
//!                  ├── ChainReader      (node JSON-RPC, chainsync-evm)
//!                  ├── mapper           (raw block → esblock / estx / escontract docs)
//!                  ├── BlockTracker     (recent headers for reorg recovery)
//!                  ├── reorg            (parent-hash and tip checks)
//!                  ├── CursorManager    (crash-safe resume point)
//!                  └── BulkIndexer      (search bulk API, chainsync-search)
//! ```

pub mod checkpoint;
pub mod cursor;
pub mod document;
pub mod error;
pub mod mapper;
pub mod reorg;
pub mod retry;
pub mod schema;
pub mod sync;
pub mod tracker;
pub mod types;

pub use checkpoint::{Checkpoint, CursorManager, CursorStore, MemoryCursorStore};
pub use cursor::SyncCursor;
pub use document::{BulkOp, DocumentKind, IndexDocument};
pub use error::{SyncError, SyncResult};
pub use reorg::{ReorgEvent, ReorgTrigger, ReorgType};
pub use retry::{RetryConfig, RetryPolicy};
pub use schema::{FieldType, IndexSchema};
pub use sync::{SyncConfig, SyncState};
pub use tracker::{BlockTracker, TrackedBlock};
pub use types::{BlockRef, RawBlock, RawReceipt, RawTransaction};
