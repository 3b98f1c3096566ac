//! Pure mapping from raw chain data to index documents.
//!
//! Nothing here performs I/O. Every quantity that lands in a `long` field is
//! range-checked against `i64`, `size` against the 2^53 exact-double range,
//! and `value` is rendered as a base-10 string, so a document either carries
//! the exact number or fails with [`SyncError::PrecisionLoss`].

use alloy_primitives::U256;

use crate::document::{BlockDocument, ContractDocument, IndexDocument, TransactionDocument};
use crate::error::SyncError;
use crate::types::{RawBlock, RawReceipt, RawTransaction};

/// Largest integer an IEEE-754 double represents exactly.
pub const MAX_EXACT_F64: u64 = 1 << 53;

fn fits_long(field: &str, v: u64) -> Result<u64, SyncError> {
    if v > i64::MAX as u64 {
        return Err(SyncError::PrecisionLoss {
            field: field.to_string(),
            value: v.to_string(),
            target: "long",
        });
    }
    Ok(v)
}

fn u256_fits_long(field: &str, v: &U256) -> Result<u64, SyncError> {
    if *v > U256::from(i64::MAX as u64) {
        return Err(SyncError::PrecisionLoss {
            field: field.to_string(),
            value: v.to_string(),
            target: "long",
        });
    }
    Ok(v.as_limbs()[0])
}

fn fits_double(field: &str, v: u64) -> Result<f64, SyncError> {
    if v > MAX_EXACT_F64 {
        return Err(SyncError::PrecisionLoss {
            field: field.to_string(),
            value: v.to_string(),
            target: "double",
        });
    }
    Ok(v as f64)
}

/// Build the `esblock` document for a block.
pub fn map_block(block: &RawBlock) -> Result<BlockDocument, SyncError> {
    Ok(BlockDocument {
        height: fits_long("height", block.number)?,
        hash: block.hash.clone(),
        parenthash: block.parent_hash.clone(),
        sha3uncles: block.sha3_uncles.clone(),
        time: fits_long("time", block.timestamp)?,
        miner: block.miner.clone(),
        // Opaque 8-byte value: stored as its two's-complement bit pattern so
        // all 64 bits survive in a `long`.
        nonce: block.nonce as i64,
        difficulty: u256_fits_long("difficulty", &block.difficulty)?,
        size: fits_double("size", block.size)?,
        gaslimit: fits_long("gaslimit", block.gas_limit)?,
        gasused: fits_long("gasused", block.gas_used)?,
        txs: block.tx_hashes(),
    })
}

/// Build the `estx` document for a transaction included in `block_hash`.
pub fn map_transaction(
    tx: &RawTransaction,
    block_hash: &str,
) -> Result<TransactionDocument, SyncError> {
    Ok(TransactionDocument {
        thash: tx.hash.clone(),
        bhash: block_hash.to_string(),
        from: tx.from.clone(),
        to: tx.to.clone(),
        value: tx.value.to_string(),
    })
}

/// Build the `escontract` document, if `receipt` shows a contract creation.
pub fn map_contract(
    tx: &RawTransaction,
    receipt: &RawReceipt,
    abi: Option<&str>,
) -> Option<ContractDocument> {
    if !receipt.created_contract() {
        return None;
    }
    Some(ContractDocument {
        owner: tx.from.clone(),
        tx: tx.hash.clone(),
        abi: abi.unwrap_or_default().to_string(),
    })
}

/// Receipt-side facts about one transaction, gathered by the engine.
#[derive(Debug, Clone, Default)]
pub struct TxExtras {
    pub receipt: Option<RawReceipt>,
    pub abi: Option<String>,
}

/// All documents of one block, in commit order: block, transactions, contracts.
///
/// `extras` is indexed like `block.transactions`; a missing entry means no
/// receipt was fetched for that transaction.
pub fn map_block_documents(
    block: &RawBlock,
    extras: &[TxExtras],
) -> Result<Vec<IndexDocument>, SyncError> {
    let mut docs = Vec::with_capacity(1 + block.transactions.len() * 2);
    docs.push(map_block(block)?.into_index_document());

    let mut contracts = Vec::new();
    for (i, tx) in block.transactions.iter().enumerate() {
        docs.push(map_transaction(tx, &block.hash)?.into_index_document());
        if let Some(TxExtras {
            receipt: Some(receipt),
            abi,
        }) = extras.get(i)
        {
            if let Some(contract) = map_contract(tx, receipt, abi.as_deref()) {
                contracts.push(contract.into_index_document());
            }
        }
    }
    docs.extend(contracts);
    Ok(docs)
}
