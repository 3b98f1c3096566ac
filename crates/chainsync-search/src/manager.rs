//! Index Manager — makes sure the three indices exist with compatible mappings.

use std::sync::Arc;

use chainsync_core::error::SyncError;
use chainsync_core::schema::IndexSchema;

use crate::backend::{CreateIndexOutcome, SearchBackend};

/// What `ensure_index` found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    /// Already present with a compatible mapping.
    Verified,
}

pub struct IndexManager {
    backend: Arc<dyn SearchBackend>,
}

impl IndexManager {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Create `schema`'s index if missing, otherwise verify its mapping.
    ///
    /// An existing index whose mapping lacks a declared field or types it
    /// differently fails with [`SyncError::SchemaMismatch`]. Safe to call on
    /// every startup.
    pub async fn ensure_index(&self, schema: &IndexSchema) -> Result<EnsureOutcome, SyncError> {
        let index = schema.name();
        if !self.backend.index_exists(index).await? {
            match self.backend.create_index(schema).await? {
                CreateIndexOutcome::Acknowledged => {
                    tracing::info!(index, backend = self.backend.name(), "Created index");
                    return Ok(EnsureOutcome::Created);
                }
                CreateIndexOutcome::NotAcknowledged => {
                    return Err(SyncError::Fatal(format!(
                        "creation of index '{index}' was not acknowledged"
                    )));
                }
                // Lost a creation race; fall through to verification.
                CreateIndexOutcome::AlreadyExists => {}
            }
        }

        let existing = self.backend.get_mapping(index).await?.ok_or_else(|| {
            SyncError::SchemaMismatch {
                index: index.to_string(),
                detail: "index exists but has no mapping".into(),
            }
        })?;
        schema.check_compatible(&existing)?;
        tracing::debug!(index, "Index mapping verified");
        Ok(EnsureOutcome::Verified)
    }

    /// `ensure_index` for each schema, stopping at the first failure.
    pub async fn ensure_all(&self, schemas: &[IndexSchema]) -> Result<(), SyncError> {
        for schema in schemas {
            self.ensure_index(schema).await?;
        }
        Ok(())
    }
}
