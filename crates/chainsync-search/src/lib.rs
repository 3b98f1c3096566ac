//! chainsync-search — the document-index side of ChainSync.
//!
//! - [`SearchBackend`] — trait over an Elasticsearch-compatible index
//! - [`ElasticsearchBackend`] — REST/NDJSON implementation via `reqwest`
//! - [`InMemorySearch`] — in-process implementation for tests
//! - [`IndexManager`] — create or verify `esblock`, `estx`, `escontract`
//! - [`BulkIndexer`] — chunked, retried bulk writes

pub mod backend;
pub mod bulk;
pub mod elasticsearch;
pub mod manager;
pub mod memory;

pub use backend::{BulkItem, BulkResponse, CreateIndexOutcome, SearchBackend};
pub use bulk::{BulkAck, BulkIndexer};
pub use elasticsearch::{ElasticConfig, ElasticsearchBackend};
pub use manager::{EnsureOutcome, IndexManager};
pub use memory::{BulkFault, InMemorySearch};
