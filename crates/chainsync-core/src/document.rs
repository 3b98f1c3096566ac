//! The three indexed document shapes and the bulk operations that carry them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::BlockRef;

// ─── DocumentKind ────────────────────────────────────────────────────────────

/// Which index a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Block,
    Transaction,
    Contract,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [Self::Block, Self::Transaction, Self::Contract];

    /// Index name.
    pub fn index(&self) -> &'static str {
        match self {
            Self::Block => "esblock",
            Self::Transaction => "estx",
            Self::Contract => "escontract",
        }
    }

    /// Mapping type name (Elasticsearch 6.x style).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Transaction => "tx",
            Self::Contract => "contract",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.index())
    }
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// `esblock` document, keyed by height.
///
/// Integer fields are serialized as exact JSON integers; the mapper has
/// already checked that each fits the index `long` type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDocument {
    pub height: u64,
    pub hash: String,
    pub parenthash: String,
    pub sha3uncles: String,
    pub time: u64,
    pub miner: String,
    /// Bit pattern of the 8-byte PoW nonce.
    pub nonce: i64,
    pub difficulty: u64,
    pub size: f64,
    pub gaslimit: u64,
    pub gasused: u64,
    pub txs: Vec<String>,
}

/// `estx` document, keyed by transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDocument {
    pub thash: String,
    pub bhash: String,
    pub from: String,
    pub to: Option<String>,
    /// Wei, as a base-10 string.
    pub value: String,
}

/// `escontract` document, keyed by the creating transaction's hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDocument {
    pub owner: String,
    pub tx: String,
    pub abi: String,
}

/// A document ready for the bulk API: kind, natural id and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub kind: DocumentKind,
    pub id: String,
    pub body: Value,
}

impl BlockDocument {
    pub fn into_index_document(self) -> IndexDocument {
        IndexDocument {
            kind: DocumentKind::Block,
            id: self.height.to_string(),
            body: to_body(&self),
        }
    }
}

impl TransactionDocument {
    pub fn into_index_document(self) -> IndexDocument {
        IndexDocument {
            kind: DocumentKind::Transaction,
            id: self.thash.clone(),
            body: to_body(&self),
        }
    }
}

impl ContractDocument {
    pub fn into_index_document(self) -> IndexDocument {
        IndexDocument {
            kind: DocumentKind::Contract,
            id: self.tx.clone(),
            body: to_body(&self),
        }
    }
}

fn to_body<T: Serialize>(doc: &T) -> Value {
    // Plain structs of strings/integers/f64 always serialize.
    serde_json::to_value(doc).unwrap_or(Value::Null)
}

// ─── Bulk operations ─────────────────────────────────────────────────────────

/// One line pair of a bulk request, tagged with the block that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOp {
    /// Upsert (`index`) a document; re-submission overwrites.
    Index { doc: IndexDocument, source: BlockRef },
    /// Retract a document produced by a now-orphaned block.
    Delete {
        kind: DocumentKind,
        id: String,
        source: BlockRef,
    },
}

impl BulkOp {
    pub fn index(doc: IndexDocument, source: BlockRef) -> Self {
        Self::Index { doc, source }
    }

    pub fn delete(kind: DocumentKind, id: impl Into<String>, source: BlockRef) -> Self {
        Self::Delete {
            kind,
            id: id.into(),
            source,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Index { doc, .. } => doc.kind,
            Self::Delete { kind, .. } => *kind,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Index { doc, .. } => &doc.id,
            Self::Delete { id, .. } => id,
        }
    }

    pub fn source(&self) -> &BlockRef {
        match self {
            Self::Index { source, .. } | Self::Delete { source, .. } => source,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}
