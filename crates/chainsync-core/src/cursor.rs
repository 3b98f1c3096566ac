//! Sync cursor — the durable marker of the last block committed to the index.

use serde::{Deserialize, Serialize};

use crate::types::BlockRef;

/// The engine's current position in the chain.
///
/// `height`/`hash` always describe a block whose documents were acknowledged
/// by the index. The persisted form is exactly `{height, hash}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Last committed block height.
    pub height: u64,
    /// Last committed block hash.
    pub hash: String,
}

impl SyncCursor {
    /// Create a new cursor at the given position.
    pub fn new(height: u64, hash: impl Into<String>) -> Self {
        Self {
            height,
            hash: hash.into(),
        }
    }

    /// Advance the cursor to a newly committed block.
    pub fn advance(&mut self, height: u64, hash: impl Into<String>) {
        self.height = height;
        self.hash = hash.into();
    }

    /// Returns the next height to index (cursor + 1).
    pub fn next_height(&self) -> u64 {
        self.height + 1
    }

    /// How far `head` is ahead of the cursor.
    pub fn lag(&self, head: u64) -> u64 {
        head.saturating_sub(self.height)
    }

    pub fn as_block_ref(&self) -> BlockRef {
        BlockRef::new(self.height, self.hash.clone())
    }
}

impl From<BlockRef> for SyncCursor {
    fn from(b: BlockRef) -> Self {
        Self::new(b.height, b.hash)
    }
}

impl std::fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{height: {}, hash: {}}}", self.height, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advance() {
        let mut cursor = SyncCursor::new(100, "0xaaa");
        cursor.advance(101, "0xbbb");
        assert_eq!(cursor.height, 101);
        assert_eq!(cursor.hash, "0xbbb");
    }

    #[test]
    fn cursor_lag_and_next() {
        let cursor = SyncCursor::new(500, "0x123");
        assert_eq!(cursor.next_height(), 501);
        assert_eq!(cursor.lag(510), 10);
        assert_eq!(cursor.lag(400), 0);
    }

    #[test]
    fn persisted_shape() {
        let json = serde_json::to_value(SyncCursor::new(3, "0xabc")).unwrap();
        assert_eq!(json, serde_json::json!({"height": 3, "hash": "0xabc"}));
    }
}
