//! Chain Reader — read-only access to an EVM node.
//!
//! Uses `eth_blockNumber`, `eth_getBlockByNumber(n, true)`,
//! `eth_getBlockByHash(h, true)` and `eth_getTransactionReceipt`. A `null`
//! result means "not produced (yet)" and is returned as `None`.

use async_trait::async_trait;
use serde_json::{json, Value};

use chainsync_core::error::SyncError;
use chainsync_core::types::{
    parse_quantity_u256, parse_quantity_u64, to_quantity, RawBlock, RawReceipt, RawTransaction,
};

use crate::rpc::RpcTransport;

/// Source of blocks and receipts. Implementations do not retry.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn latest_height(&self) -> Result<u64, SyncError>;

    async fn block_at(&self, height: u64) -> Result<Option<RawBlock>, SyncError>;

    async fn block_by_hash(&self, hash: &str) -> Result<Option<RawBlock>, SyncError>;

    async fn receipt_of(&self, tx_hash: &str) -> Result<Option<RawReceipt>, SyncError>;
}

/// Looks up the ABI of a freshly created contract (e.g. from a verification
/// service). Returning `None` leaves the document's `abi` empty.
#[async_trait]
pub trait AbiSource: Send + Sync {
    async fn abi_for(&self, contract_address: &str) -> Result<Option<String>, SyncError>;
}

/// An [`AbiSource`] that never knows anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAbi;

#[async_trait]
impl AbiSource for NoAbi {
    async fn abi_for(&self, _contract_address: &str) -> Result<Option<String>, SyncError> {
        Ok(None)
    }
}

/// [`ChainReader`] over Ethereum JSON-RPC.
pub struct EvmChainReader<T> {
    rpc: T,
}

impl<T: RpcTransport> EvmChainReader<T> {
    pub fn new(rpc: T) -> Self {
        Self { rpc }
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }
}

#[async_trait]
impl<T: RpcTransport> ChainReader for EvmChainReader<T> {
    async fn latest_height(&self) -> Result<u64, SyncError> {
        let v = self.rpc.call("eth_blockNumber", vec![]).await?;
        let s = v
            .as_str()
            .ok_or_else(|| SyncError::Decode(format!("eth_blockNumber returned {v}")))?;
        parse_quantity_u64("blockNumber", s)
    }

    async fn block_at(&self, height: u64) -> Result<Option<RawBlock>, SyncError> {
        let v = self
            .rpc
            .call(
                "eth_getBlockByNumber",
                vec![json!(to_quantity(height)), json!(true)],
            )
            .await?;
        if v.is_null() {
            return Ok(None);
        }
        block_from_json(&v).map(Some)
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<RawBlock>, SyncError> {
        let v = self
            .rpc
            .call("eth_getBlockByHash", vec![json!(hash), json!(true)])
            .await?;
        if v.is_null() {
            return Ok(None);
        }
        block_from_json(&v).map(Some)
    }

    async fn receipt_of(&self, tx_hash: &str) -> Result<Option<RawReceipt>, SyncError> {
        let v = self
            .rpc
            .call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await?;
        if v.is_null() {
            return Ok(None);
        }
        receipt_from_json(&v).map(Some)
    }
}

// ─── JSON decoding ───────────────────────────────────────────────────────────

fn str_field<'a>(v: &'a Value, name: &str) -> Result<&'a str, SyncError> {
    v.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::Decode(format!("missing or non-string field '{name}'")))
}

fn opt_str_field(v: &Value, name: &str) -> Option<String> {
    v.get(name).and_then(Value::as_str).map(str::to_string)
}

fn quantity(v: &Value, name: &str) -> Result<u64, SyncError> {
    parse_quantity_u64(name, str_field(v, name)?)
}

/// Decode a full block object (transactions as objects).
pub fn block_from_json(v: &Value) -> Result<RawBlock, SyncError> {
    let transactions = match v.get("transactions") {
        Some(Value::Array(txs)) => txs
            .iter()
            .map(tx_from_json)
            .collect::<Result<Vec<_>, _>>()?,
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            return Err(SyncError::Decode(format!(
                "unexpected 'transactions' shape: {other}"
            )))
        }
    };

    Ok(RawBlock {
        number: quantity(v, "number")?,
        hash: str_field(v, "hash")?.to_string(),
        parent_hash: str_field(v, "parentHash")?.to_string(),
        sha3_uncles: opt_str_field(v, "sha3Uncles").unwrap_or_default(),
        timestamp: quantity(v, "timestamp")?,
        miner: opt_str_field(v, "miner").unwrap_or_default(),
        difficulty: match v.get("difficulty").and_then(Value::as_str) {
            Some(s) => parse_quantity_u256("difficulty", s)?,
            None => Default::default(),
        },
        size: quantity(v, "size")?,
        gas_limit: quantity(v, "gasLimit")?,
        gas_used: quantity(v, "gasUsed")?,
        nonce: match v.get("nonce").and_then(Value::as_str) {
            Some(s) => parse_quantity_u64("nonce", s)?,
            None => 0,
        },
        transactions,
    })
}

fn tx_from_json(v: &Value) -> Result<RawTransaction, SyncError> {
    if v.is_string() {
        return Err(SyncError::Decode(
            "block transactions are hashes; full objects were requested".into(),
        ));
    }
    Ok(RawTransaction {
        hash: str_field(v, "hash")?.to_string(),
        from: str_field(v, "from")?.to_string(),
        to: opt_str_field(v, "to"),
        value: parse_quantity_u256("value", str_field(v, "value")?)?,
    })
}

/// Decode a transaction receipt.
pub fn receipt_from_json(v: &Value) -> Result<RawReceipt, SyncError> {
    let success = match v.get("status").and_then(Value::as_str) {
        Some(s) => parse_quantity_u64("status", s)? == 1,
        None => true,
    };
    Ok(RawReceipt {
        tx_hash: str_field(v, "transactionHash")?.to_string(),
        block_hash: str_field(v, "blockHash")?.to_string(),
        contract_address: opt_str_field(v, "contractAddress"),
        success,
    })
}
