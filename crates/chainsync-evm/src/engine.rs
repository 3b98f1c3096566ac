//! The sync engine — a height-ordered state machine that keeps the search
//! index in step with the node's canonical chain.
//!
//! # States
//! - **Initializing**: ensure indices, load the cursor (or anchor it at the
//!   configured start height).
//! - **CatchingUp**: more than `lag_threshold` blocks behind; index
//!   back-to-back batches.
//! - **Following**: near the head; poll every `poll_interval_ms`. When
//!   nothing new exists, re-check the hash at the cursor height (or at the
//!   node's head, if that is lower).
//! - **ReorgRecovery**: walk back to the last block both chains share,
//!   retract everything above it, reset the cursor there.
//! - **Stopped** / **Fatal**: terminal.
//!
//! The cursor is committed only after the index acknowledged the batch, so a
//! crash re-indexes at most one batch and never leaves a gap.

use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use serde_json::Value;
use tokio::sync::watch;

use chainsync_core::checkpoint::{CursorManager, CursorStore};
use chainsync_core::cursor::SyncCursor;
use chainsync_core::document::{BulkOp, DocumentKind};
use chainsync_core::error::SyncError;
use chainsync_core::mapper::{map_block_documents, TxExtras};
use chainsync_core::reorg::{self, ReorgEvent, ReorgTrigger};
use chainsync_core::retry::RetryPolicy;
use chainsync_core::schema::all_schemas;
use chainsync_core::sync::{SyncConfig, SyncState};
use chainsync_core::tracker::{BlockTracker, TrackedBlock};
use chainsync_core::types::{BlockRef, RawBlock};
use chainsync_search::{BulkAck, BulkIndexer, IndexManager, SearchBackend};

use crate::reader::{AbiSource, ChainReader};

/// What one call to [`SyncEngine::step`] did.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Initialized { cursor: SyncCursor },
    /// Blocks `from..=to` were indexed and the cursor committed at `to`.
    Indexed {
        from: u64,
        to: u64,
        docs: usize,
        ack: BulkAck,
    },
    /// Nothing new at the node.
    Idle { head: u64 },
    /// A mismatch was found; the next step recovers.
    ReorgDetected { height: u64 },
    Recovered(ReorgEvent),
    Stopped,
}

/// Drives one chain into the search index.
pub struct SyncEngine {
    config: SyncConfig,
    reader: Arc<dyn ChainReader>,
    abi: Arc<dyn AbiSource>,
    search: Arc<dyn SearchBackend>,
    indices: IndexManager,
    writer: BulkIndexer,
    cursors: CursorManager,
    tracker: BlockTracker,
    retry: RetryPolicy,
    state: SyncState,
    cursor: Option<SyncCursor>,
    pending_reorg: Option<(ReorgTrigger, u64)>,
    reorgs: Vec<ReorgEvent>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        reader: Arc<dyn ChainReader>,
        abi: Arc<dyn AbiSource>,
        search: Arc<dyn SearchBackend>,
        cursor_store: Box<dyn CursorStore>,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let retry = RetryPolicy::new(config.retry.clone());
        Ok(Self {
            indices: IndexManager::new(search.clone()),
            writer: BulkIndexer::new(
                search.clone(),
                config.max_bulk_docs,
                retry.clone(),
                config.index_timeout(),
            ),
            cursors: CursorManager::new(cursor_store, config.chain.clone(), config.id.clone()),
            tracker: BlockTracker::new(config.window_size),
            reader,
            abi,
            search,
            retry,
            state: SyncState::Initializing,
            cursor: None,
            pending_reorg: None,
            reorgs: Vec::new(),
            config,
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Last committed cursor (`None` before initialization).
    pub fn cursor(&self) -> Option<&SyncCursor> {
        self.cursor.as_ref()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Completed reorg recoveries, oldest first.
    pub fn reorgs(&self) -> &[ReorgEvent] {
        &self.reorgs
    }

    /// Run until `shutdown` flips to `true`, `stop_at` is reached, or a
    /// fatal error occurs. Shutdown is honored between batches and while
    /// waiting for new blocks.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SyncError> {
        tracing::info!(
            chain = %self.config.chain,
            id = %self.config.id,
            "Sync engine starting"
        );
        loop {
            if *shutdown.borrow() {
                tracing::info!(cursor = ?self.cursor, "Shutdown requested");
                self.set_state(SyncState::Stopped);
                return Ok(());
            }
            match self.step().await {
                Ok(StepOutcome::Stopped) => return Ok(()),
                Ok(StepOutcome::Idle { .. }) => self.wait(&mut shutdown).await,
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(error = %e, "Waiting for the node");
                    self.wait(&mut shutdown).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn wait(&self, shutdown: &mut watch::Receiver<bool>) {
        let interval = self.config.poll_interval();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                // Sender gone: nobody can request shutdown any more.
                if changed.is_err() {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    /// Perform one state-machine iteration.
    ///
    /// Any error other than [`SyncError::NotFound`] moves the engine to
    /// [`SyncState::Fatal`]; the last committed cursor stays the resume point.
    pub async fn step(&mut self) -> Result<StepOutcome, SyncError> {
        let result = match self.state {
            SyncState::Initializing => self.initialize().await,
            SyncState::CatchingUp | SyncState::Following => self.advance().await,
            SyncState::ReorgRecovery => self.recover().await.map(StepOutcome::Recovered),
            SyncState::Stopped => Ok(StepOutcome::Stopped),
            SyncState::Fatal => Err(SyncError::Fatal("engine already failed".into())),
        };
        if let Err(e) = &result {
            if !e.is_not_found() && self.state != SyncState::Fatal {
                tracing::error!(error = %e, cursor = ?self.cursor, "Sync failed");
                self.set_state(SyncState::Fatal);
            }
        }
        result
    }

    fn set_state(&mut self, next: SyncState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "State transition");
            self.state = next;
        }
    }

    fn current_cursor(&self) -> Result<SyncCursor, SyncError> {
        self.cursor
            .clone()
            .ok_or_else(|| SyncError::Fatal("cursor not initialized".into()))
    }

    fn stop_reached(&self, cursor: &SyncCursor) -> bool {
        self.config.stop_at.is_some_and(|stop| cursor.height >= stop)
    }

    // ─── Initializing ────────────────────────────────────────────────────────

    async fn initialize(&mut self) -> Result<StepOutcome, SyncError> {
        let schemas = all_schemas();
        self.retry
            .run("ensure indices", self.config.index_timeout(), || {
                self.indices.ensure_all(&schemas)
            })
            .await?;

        let loaded = self
            .retry
            .run("load cursor", self.config.index_timeout(), || self.cursors.load())
            .await?;

        let cursor = match loaded {
            Some(cursor) => {
                tracing::info!(height = cursor.height, hash = %cursor.hash, "Resuming from cursor");
                cursor
            }
            None => {
                let start = self.config.start_height;
                let block = self
                    .retry
                    .run("eth_getBlockByNumber", self.config.rpc_timeout(), || {
                        self.reader.block_at(start)
                    })
                    .await?
                    .ok_or_else(|| SyncError::NotFound(format!("start block {start}")))?;
                let cursor = SyncCursor::new(start, block.hash);
                self.commit_cursor(&cursor).await?;
                tracing::info!(height = start, hash = %cursor.hash, "No cursor found, anchored at start height");
                cursor
            }
        };
        self.cursor = Some(cursor.clone());

        if self.stop_reached(&cursor) {
            self.set_state(SyncState::Stopped);
            return Ok(StepOutcome::Initialized { cursor });
        }

        let head = self.latest_height().await?;
        self.set_state(if cursor.lag(head) > self.config.lag_threshold {
            SyncState::CatchingUp
        } else {
            SyncState::Following
        });
        Ok(StepOutcome::Initialized { cursor })
    }

    // ─── CatchingUp / Following ──────────────────────────────────────────────

    async fn latest_height(&self) -> Result<u64, SyncError> {
        self.retry
            .run("eth_blockNumber", self.config.rpc_timeout(), || {
                self.reader.latest_height()
            })
            .await
    }

    async fn advance(&mut self) -> Result<StepOutcome, SyncError> {
        let cursor = self.current_cursor()?;
        if self.stop_reached(&cursor) {
            tracing::info!(height = cursor.height, "Reached stop height");
            self.set_state(SyncState::Stopped);
            return Ok(StepOutcome::Stopped);
        }

        let head = self.latest_height().await?;
        if head <= cursor.height {
            return self.check_tip(&cursor, head).await;
        }

        self.set_state(if cursor.lag(head) > self.config.lag_threshold {
            SyncState::CatchingUp
        } else {
            SyncState::Following
        });

        let mut to = head.min(cursor.height.saturating_add(self.config.batch_size));
        if let Some(stop) = self.config.stop_at {
            to = to.min(stop);
        }

        let fetched = self.fetch_blocks(cursor.next_height(), to).await?;
        let blocks = match link_batch(&cursor, fetched) {
            Ok(blocks) => blocks,
            Err(SyncError::ReorgDetected { height, .. }) => {
                self.enter_recovery(ReorgTrigger::ParentMismatch, height);
                return Ok(StepOutcome::ReorgDetected { height });
            }
            Err(e) => return Err(e),
        };
        if blocks.is_empty() {
            return Ok(StepOutcome::Idle { head });
        }
        self.index_batch(blocks, head).await
    }

    /// Nothing new: make sure the node's tip (or the block under the cursor,
    /// whichever is lower) is still what we indexed there.
    async fn check_tip(&mut self, cursor: &SyncCursor, head: u64) -> Result<StepOutcome, SyncError> {
        self.set_state(SyncState::Following);
        let height = head.min(cursor.height);
        let at_node = self
            .retry
            .run("eth_getBlockByNumber", self.config.rpc_timeout(), || {
                self.reader.block_at(height)
            })
            .await?;
        let Some(block) = at_node else {
            return Ok(StepOutcome::Idle { head });
        };

        // Below the cursor the node may be on a shorter fork.
        let indexed = if height == cursor.height {
            cursor.clone()
        } else {
            match self.indexed_block(height, cursor).await? {
                Some((hash, _)) => SyncCursor::new(height, hash),
                None => return Ok(StepOutcome::Idle { head }),
            }
        };
        match reorg::verify_tip(&block.hash, &indexed) {
            Ok(()) => Ok(StepOutcome::Idle { head }),
            Err(e) if e.is_reorg() => {
                self.enter_recovery(ReorgTrigger::TipReplaced, height);
                Ok(StepOutcome::ReorgDetected { height })
            }
            Err(e) => Err(e),
        }
    }

    fn enter_recovery(&mut self, trigger: ReorgTrigger, height: u64) {
        tracing::warn!(height, %trigger, "Reorg detected");
        self.pending_reorg = Some((trigger, height));
        self.set_state(SyncState::ReorgRecovery);
    }

    /// Fetch `from..=to` in order with bounded concurrency.
    async fn fetch_blocks(&self, from: u64, to: u64) -> Result<Vec<Option<RawBlock>>, SyncError> {
        let reader = &self.reader;
        let retry = &self.retry;
        let timeout = self.config.rpc_timeout();
        stream::iter(from..=to)
            .map(|height| async move {
                retry
                    .run("eth_getBlockByNumber", timeout, || reader.block_at(height))
                    .await
            })
            .buffered(self.config.receipt_concurrency)
            .try_collect()
            .await
    }

    /// Receipts (and ABIs) for contract-creation transactions only; no other
    /// transaction can produce a contract document.
    async fn fetch_extras(&self, blocks: &[RawBlock]) -> Result<Vec<Vec<TxExtras>>, SyncError> {
        let mut extras: Vec<Vec<TxExtras>> = blocks
            .iter()
            .map(|b| vec![TxExtras::default(); b.transactions.len()])
            .collect();

        let jobs: Vec<(usize, usize, String)> = blocks
            .iter()
            .enumerate()
            .flat_map(|(bi, block)| {
                block
                    .transactions
                    .iter()
                    .enumerate()
                    .filter(|(_, tx)| tx.is_contract_creation())
                    .map(move |(ti, tx)| (bi, ti, tx.hash.clone()))
            })
            .collect();
        if jobs.is_empty() {
            return Ok(extras);
        }

        let reader = &self.reader;
        let abi = &self.abi;
        let retry = &self.retry;
        let timeout = self.config.rpc_timeout();
        let fetched: Vec<(usize, usize, TxExtras)> = stream::iter(jobs)
            .map(|(bi, ti, tx_hash)| async move {
                let hash = tx_hash.as_str();
                let receipt = retry
                    .run("eth_getTransactionReceipt", timeout, || async move {
                        reader.receipt_of(hash).await?.ok_or_else(|| {
                            SyncError::Transient(format!("receipt for {hash} not available yet"))
                        })
                    })
                    .await?;
                let abi_text = match receipt.contract_address.as_deref() {
                    Some(address) => {
                        retry
                            .run("abi lookup", timeout, || abi.abi_for(address))
                            .await?
                    }
                    None => None,
                };
                Ok::<_, SyncError>((
                    bi,
                    ti,
                    TxExtras {
                        receipt: Some(receipt),
                        abi: abi_text,
                    },
                ))
            })
            .buffered(self.config.receipt_concurrency)
            .try_collect()
            .await?;

        for (bi, ti, extra) in fetched {
            extras[bi][ti] = extra;
        }
        Ok(extras)
    }

    async fn index_batch(&mut self, blocks: Vec<RawBlock>, head: u64) -> Result<StepOutcome, SyncError> {
        let extras = self.fetch_extras(&blocks).await?;

        let mut ops = Vec::new();
        for (block, block_extras) in blocks.iter().zip(&extras) {
            let source = block.block_ref();
            for doc in map_block_documents(block, block_extras)? {
                ops.push(BulkOp::index(doc, source.clone()));
            }
        }

        let ack = self.writer.bulk_write(&ops).await?;

        let (from, last) = match (blocks.first(), blocks.last()) {
            (Some(first), Some(last)) => (first.number, last),
            _ => return Ok(StepOutcome::Idle { head }),
        };
        let next = SyncCursor::new(last.number, last.hash.clone());
        self.commit_cursor(&next).await?;

        for block in &blocks {
            let tracked = TrackedBlock {
                height: block.number,
                hash: block.hash.clone(),
                parent_hash: block.parent_hash.clone(),
                tx_hashes: block.tx_hashes(),
            };
            if self.tracker.push(tracked.clone()).is_err() {
                // Window no longer lines up (e.g. after a restart); start over.
                self.tracker.clear();
                let _ = self.tracker.push(tracked);
            }
        }
        self.cursor = Some(next);

        tracing::info!(
            from,
            to = last.number,
            head,
            docs = ops.len(),
            state = %self.state,
            "Batch committed"
        );
        Ok(StepOutcome::Indexed {
            from,
            to: last.number,
            docs: ops.len(),
            ack,
        })
    }

    async fn commit_cursor(&self, cursor: &SyncCursor) -> Result<(), SyncError> {
        self.retry
            .run("commit cursor", self.config.index_timeout(), || {
                self.cursors.commit(cursor)
            })
            .await
    }

    // ─── ReorgRecovery ───────────────────────────────────────────────────────

    /// Hash and transaction hashes we indexed at `height`, from the tracker
    /// window or, beyond it, from the block document itself.
    async fn indexed_block(
        &self,
        height: u64,
        cursor: &SyncCursor,
    ) -> Result<Option<(String, Vec<String>)>, SyncError> {
        if let Some(tracked) = self.tracker.get(height) {
            return Ok(Some((tracked.hash.clone(), tracked.tx_hashes.clone())));
        }
        let id = height.to_string();
        let doc = self
            .retry
            .run("get block document", self.config.index_timeout(), || {
                self.search.get_document(DocumentKind::Block, &id)
            })
            .await?;
        if let Some(doc) = doc {
            if let Some(hash) = doc.get("hash").and_then(Value::as_str) {
                let txs = doc
                    .get("txs")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
                    .unwrap_or_default();
                return Ok(Some((hash.to_string(), txs)));
            }
        }
        // The anchor block at the start height is known by hash only.
        if height == cursor.height {
            return Ok(Some((cursor.hash.clone(), Vec::new())));
        }
        Ok(None)
    }

    async fn recover(&mut self) -> Result<ReorgEvent, SyncError> {
        let cursor = self.current_cursor()?;
        let (trigger, detected_at) = self
            .pending_reorg
            .take()
            .unwrap_or((ReorgTrigger::ParentMismatch, cursor.next_height()));

        // The node's chain wins: walk down until our record matches it.
        let head = self.latest_height().await?;
        let floor = cursor.height.saturating_sub(self.config.max_reorg_depth);
        let mut height = head.min(cursor.height);
        let mut ancestor = None;
        while height >= floor {
            let ours = self.indexed_block(height, &cursor).await?;
            let theirs = self
                .retry
                .run("eth_getBlockByNumber", self.config.rpc_timeout(), || {
                    self.reader.block_at(height)
                })
                .await?;
            if let (Some((hash, _)), Some(node)) = (&ours, &theirs) {
                if *hash == node.hash {
                    ancestor = Some(BlockRef::new(height, hash.clone()));
                    break;
                }
            }
            if height == 0 {
                break;
            }
            height -= 1;
        }
        let ancestor = ancestor.ok_or_else(|| {
            SyncError::Fatal(format!(
                "no common ancestor within {} blocks below {}",
                self.config.max_reorg_depth, cursor.height
            ))
        })?;

        // Retract every document produced above the ancestor. The block
        // document lists the tx ids to delete, so it goes last: a write that
        // fails partway still leaves it for the next recovery.
        let mut ops = Vec::new();
        let mut dropped = Vec::new();
        for height in ((ancestor.height + 1)..=cursor.height).rev() {
            let (hash, txs) = self
                .indexed_block(height, &cursor)
                .await?
                .unwrap_or_default();
            let source = BlockRef::new(height, hash);
            for tx in txs {
                ops.push(BulkOp::delete(DocumentKind::Transaction, tx.clone(), source.clone()));
                ops.push(BulkOp::delete(DocumentKind::Contract, tx, source.clone()));
            }
            ops.push(BulkOp::delete(DocumentKind::Block, height.to_string(), source.clone()));
            dropped.push(source);
        }
        self.writer.bulk_write(&ops).await?;

        let reset = SyncCursor::from(ancestor.clone());
        self.commit_cursor(&reset).await?;
        self.tracker.rewind_to(ancestor.height);
        if self.tracker.head().is_some_and(|h| h.hash != ancestor.hash) {
            self.tracker.clear();
        }
        self.cursor = Some(reset);

        let event = ReorgEvent::new(trigger, detected_at, ancestor, dropped);
        tracing::warn!(
            trigger = %event.trigger,
            detected_at = event.detected_at,
            ancestor = event.ancestor.height,
            depth = event.depth,
            kind = %event.reorg_type,
            "Reorg recovered"
        );
        self.reorgs.push(event.clone());
        self.set_state(SyncState::CatchingUp);
        Ok(event)
    }
}

/// Keep the linked prefix of a fetched batch.
///
/// The first block must build on the cursor (else [`SyncError::ReorgDetected`]).
/// A missing block or a broken link later in the batch cuts it short; the
/// next step sees the rest.
fn link_batch(cursor: &SyncCursor, fetched: Vec<Option<RawBlock>>) -> Result<Vec<RawBlock>, SyncError> {
    let mut out: Vec<RawBlock> = Vec::with_capacity(fetched.len());
    for block in fetched {
        let Some(block) = block else { break };
        match out.last() {
            None => reorg::verify_parent(&block, cursor)?,
            Some(prev) if !block.extends(&prev.block_ref()) => {
                tracing::debug!(height = block.number, "Batch truncated at fork");
                break;
            }
            Some(_) => {}
        }
        out.push(block);
    }
    Ok(out)
}
