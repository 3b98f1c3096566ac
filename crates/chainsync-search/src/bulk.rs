//! Indexer Client — bulk writes with chunking, item classification and retry.
//!
//! A call returns `Ok` only once every operation was accepted. Transient
//! failures (transport errors, 429, 5xx items) re-submit the whole chunk with
//! backoff; since all writes are keyed upserts or deletes, re-submission is
//! harmless. Any other per-item failure is a permanent
//! [`SyncError::Rejected`].

use std::sync::Arc;
use std::time::Duration;

use chainsync_core::document::BulkOp;
use chainsync_core::error::SyncError;
use chainsync_core::retry::RetryPolicy;

use crate::backend::{BulkResponse, SearchBackend};

/// Totals for an acknowledged write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkAck {
    pub indexed: usize,
    pub deleted: usize,
    /// Bulk requests that succeeded (retries not counted).
    pub requests: usize,
}

pub struct BulkIndexer {
    backend: Arc<dyn SearchBackend>,
    max_docs: usize,
    retry: RetryPolicy,
    timeout: Duration,
}

impl BulkIndexer {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        max_docs: usize,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            max_docs: max_docs.max(1),
            retry,
            timeout,
        }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    /// Write `ops` in order, split into requests of at most `max_docs`.
    pub async fn bulk_write(&self, ops: &[BulkOp]) -> Result<BulkAck, SyncError> {
        let mut ack = BulkAck::default();
        for chunk in ops.chunks(self.max_docs) {
            let resp = self
                .retry
                .run("bulk write", self.timeout, || self.submit(chunk))
                .await?;
            for item in &resp.items {
                if item.is_delete {
                    ack.deleted += 1;
                } else {
                    ack.indexed += 1;
                }
            }
            ack.requests += 1;
            tracing::debug!(
                ops = chunk.len(),
                took_ms = resp.took_ms,
                "Bulk chunk acknowledged"
            );
        }
        Ok(ack)
    }

    async fn submit(&self, chunk: &[BulkOp]) -> Result<BulkResponse, SyncError> {
        let resp = self.backend.bulk(chunk).await?;
        if resp.items.len() != chunk.len() {
            return Err(SyncError::Decode(format!(
                "bulk response has {} items for {} operations",
                resp.items.len(),
                chunk.len()
            )));
        }
        if let Some(bad) = resp.items.iter().find(|i| !i.is_ok() && !i.is_transient()) {
            return Err(SyncError::Rejected {
                index: bad.index.clone(),
                id: bad.id.clone(),
                reason: bad
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("status {}", bad.status)),
            });
        }
        let retryable = resp.items.iter().filter(|i| i.is_transient()).count();
        if retryable > 0 {
            return Err(SyncError::Transient(format!(
                "{retryable} of {} bulk items throttled or failed",
                chunk.len()
            )));
        }
        Ok(resp)
    }
}
