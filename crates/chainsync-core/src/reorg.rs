//! Reorg detection and the record of a completed recovery.
//!
//! Two triggers are recognized:
//! 1. **Parent mismatch**: the next block's `parent_hash` differs from the cursor hash
//! 2. **Tip replaced**: the node reports a different block at the cursor height
//!    while there is nothing new to index

use crate::cursor::SyncCursor;
use crate::error::SyncError;
use crate::types::{BlockRef, RawBlock};

/// What triggered a recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorgTrigger {
    ParentMismatch,
    TipReplaced,
}

impl std::fmt::Display for ReorgTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParentMismatch => write!(f, "parent mismatch"),
            Self::TipReplaced => write!(f, "tip replaced"),
        }
    }
}

/// Classification of a reorg by depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorgType {
    /// 1–3 blocks rolled back.
    ShortReorg,
    /// More than 3 blocks rolled back.
    DeepReorg,
}

impl ReorgType {
    pub fn from_depth(depth: u64) -> Self {
        if depth <= 3 {
            Self::ShortReorg
        } else {
            Self::DeepReorg
        }
    }
}

impl std::fmt::Display for ReorgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortReorg => write!(f, "short reorg"),
            Self::DeepReorg => write!(f, "deep reorg"),
        }
    }
}

/// Describes a completed reorg recovery.
#[derive(Debug, Clone)]
pub struct ReorgEvent {
    pub trigger: ReorgTrigger,
    /// Height at which the mismatch was observed.
    pub detected_at: u64,
    /// Last block shared by the indexed chain and the node's chain.
    pub ancestor: BlockRef,
    /// Retracted blocks, highest first.
    pub dropped: Vec<BlockRef>,
    pub depth: u64,
    pub reorg_type: ReorgType,
}

impl ReorgEvent {
    pub fn new(
        trigger: ReorgTrigger,
        detected_at: u64,
        ancestor: BlockRef,
        dropped: Vec<BlockRef>,
    ) -> Self {
        let depth = dropped.len() as u64;
        Self {
            trigger,
            detected_at,
            ancestor,
            dropped,
            depth,
            reorg_type: ReorgType::from_depth(depth),
        }
    }
}

/// Parent-hash check for the next block to index.
///
/// Returns [`SyncError::ReorgDetected`] when `next` does not build on the
/// cursor; any other shape mismatch (wrong height) is a decode error.
pub fn verify_parent(next: &RawBlock, cursor: &SyncCursor) -> Result<(), SyncError> {
    if next.number != cursor.next_height() {
        return Err(SyncError::Decode(format!(
            "node returned block {} when {} was requested",
            next.number,
            cursor.next_height()
        )));
    }
    if next.parent_hash != cursor.hash {
        tracing::warn!(
            height = next.number,
            expected = %cursor.hash,
            actual = %next.parent_hash,
            "Parent hash mismatch"
        );
        return Err(SyncError::ReorgDetected {
            height: next.number,
            expected: cursor.hash.clone(),
            actual: next.parent_hash.clone(),
        });
    }
    Ok(())
}

/// Same-height check used while idle at the tip.
pub fn verify_tip(node_hash: &str, cursor: &SyncCursor) -> Result<(), SyncError> {
    if node_hash != cursor.hash {
        tracing::warn!(
            height = cursor.height,
            indexed = %cursor.hash,
            node = %node_hash,
            "Tip replaced by node"
        );
        return Err(SyncError::ReorgDetected {
            height: cursor.height,
            expected: cursor.hash.clone(),
            actual: node_hash.to_string(),
        });
    }
    Ok(())
}
