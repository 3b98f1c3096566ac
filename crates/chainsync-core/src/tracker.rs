//! Block tracker — a sliding window of recently indexed block headers.
//!
//! The window answers "what did we index at height N?" without a round trip
//! to the search index, which is what reorg recovery asks for every height
//! it walks back over. It also remembers each block's transaction hashes so
//! the retraction of a dropped block can name every document it produced.

use std::collections::VecDeque;

use crate::types::BlockRef;

/// What the tracker remembers about one indexed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedBlock {
    pub height: u64,
    pub hash: String,
    pub parent_hash: String,
    pub tx_hashes: Vec<String>,
}

impl TrackedBlock {
    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.height, self.hash.clone())
    }
}

/// Tracks the last N indexed blocks.
pub struct BlockTracker {
    /// Oldest first.
    window: VecDeque<TrackedBlock>,
    window_size: usize,
}

impl BlockTracker {
    /// Create a new tracker with the given window size.
    /// A window of 128 covers deep reorgs for all major EVM chains.
    pub fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
        }
    }

    /// Record a committed block.
    ///
    /// Returns `Err(depth)` if `block` does not extend the current head; the
    /// depth is how many tracked blocks sit above the fork point.
    pub fn push(&mut self, block: TrackedBlock) -> Result<(), u64> {
        if let Some(head) = self.window.back() {
            if block.height != head.height + 1 || block.parent_hash != head.hash {
                return Err(self.find_reorg_depth(&block));
            }
        }
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(block);
        Ok(())
    }

    /// Returns the most recently tracked block.
    pub fn head(&self) -> Option<&TrackedBlock> {
        self.window.back()
    }

    /// Returns a block by height if it's in the window.
    pub fn get(&self, height: u64) -> Option<&TrackedBlock> {
        let first = self.window.front()?.height;
        let idx = height.checked_sub(first)? as usize;
        self.window.get(idx).filter(|b| b.height == height)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Discard everything above `height`; returns the removed blocks, highest first.
    pub fn rewind_to(&mut self, height: u64) -> Vec<TrackedBlock> {
        let mut dropped = Vec::new();
        while let Some(back) = self.window.back() {
            if back.height > height {
                dropped.extend(self.window.pop_back());
            } else {
                break;
            }
        }
        dropped
    }

    /// Drop all tracked state (e.g. the window no longer lines up with the cursor).
    pub fn clear(&mut self) {
        self.window.clear();
    }

    fn find_reorg_depth(&self, new_block: &TrackedBlock) -> u64 {
        for (i, tracked) in self.window.iter().enumerate().rev() {
            if tracked.hash == new_block.parent_hash {
                return (self.window.len() - 1 - i) as u64;
            }
        }
        // Common ancestor not in window
        self.window.len() as u64
    }
}
