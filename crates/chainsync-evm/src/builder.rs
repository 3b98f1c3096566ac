//! Fluent builder API for sync engines.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use chainsync_core::MemoryCursorStore;
//! use chainsync_evm::{EvmChainReader, HttpRpcClient, SyncBuilder};
//! use chainsync_search::InMemorySearch;
//!
//! # fn main() -> Result<(), chainsync_core::SyncError> {
//! let rpc = HttpRpcClient::new("http://localhost:8545", Duration::from_secs(10))?;
//! let engine = SyncBuilder::new()
//!     .chain("ethereum")
//!     .start_height(19_000_000)
//!     .batch_size(100)
//!     .build(
//!         Arc::new(EvmChainReader::new(rpc)),
//!         Arc::new(InMemorySearch::new()),
//!         Box::new(MemoryCursorStore::new()),
//!     )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chainsync_core::checkpoint::CursorStore;
use chainsync_core::error::SyncError;
use chainsync_core::retry::RetryConfig;
use chainsync_core::sync::SyncConfig;
use chainsync_search::SearchBackend;

use crate::engine::SyncEngine;
use crate::reader::{AbiSource, ChainReader, NoAbi};

/// Fluent builder for [`SyncConfig`] and [`SyncEngine`].
#[derive(Default)]
pub struct SyncBuilder {
    config: SyncConfig,
    abi: Option<Arc<dyn AbiSource>>,
}

impl SyncBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. loaded from a file).
    pub fn from_config(config: SyncConfig) -> Self {
        Self { config, abi: None }
    }

    /// Set the pipeline ID (used for cursor keys).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.config.chain = chain.into();
        self
    }

    /// Height of the anchor block used when no cursor exists.
    pub fn start_height(mut self, height: u64) -> Self {
        self.config.start_height = height;
        self
    }

    /// Stop once this height is committed (bounded backfill).
    pub fn stop_at(mut self, height: u64) -> Self {
        self.config.stop_at = Some(height);
        self
    }

    pub fn lag_threshold(mut self, blocks: u64) -> Self {
        self.config.lag_threshold = blocks;
        self
    }

    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn receipt_concurrency(mut self, n: usize) -> Self {
        self.config.receipt_concurrency = n;
        self
    }

    pub fn max_reorg_depth(mut self, depth: u64) -> Self {
        self.config.max_reorg_depth = depth;
        self
    }

    pub fn window_size(mut self, blocks: usize) -> Self {
        self.config.window_size = blocks;
        self
    }

    pub fn rpc_timeout_ms(mut self, ms: u64) -> Self {
        self.config.rpc_timeout_ms = ms;
        self
    }

    pub fn index_timeout_ms(mut self, ms: u64) -> Self {
        self.config.index_timeout_ms = ms;
        self
    }

    pub fn max_bulk_docs(mut self, n: usize) -> Self {
        self.config.max_bulk_docs = n;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Where contract ABIs come from. Defaults to [`NoAbi`].
    pub fn abi_source(mut self, abi: Arc<dyn AbiSource>) -> Self {
        self.abi = Some(abi);
        self
    }

    pub fn build_config(self) -> SyncConfig {
        self.config
    }

    /// Validate the configuration and assemble the engine.
    pub fn build(
        self,
        reader: Arc<dyn ChainReader>,
        search: Arc<dyn SearchBackend>,
        cursor_store: Box<dyn CursorStore>,
    ) -> Result<SyncEngine, SyncError> {
        let abi = self.abi.unwrap_or_else(|| Arc::new(NoAbi));
        SyncEngine::new(self.config, reader, abi, search, cursor_store)
    }
}
