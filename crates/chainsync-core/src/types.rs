//! Raw chain data as read from the node, before document mapping.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

// ─── BlockRef ────────────────────────────────────────────────────────────────

/// A `(height, hash)` pair identifying one block on one fork.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub height: u64,
    pub hash: String,
}

impl BlockRef {
    pub fn new(height: u64, hash: impl Into<String>) -> Self {
        Self {
            height,
            hash: hash.into(),
        }
    }
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.height, self.hash)
    }
}

// ─── RawBlock ────────────────────────────────────────────────────────────────

/// A full block as returned by `eth_getBlockByNumber(n, true)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub sha3_uncles: String,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    pub miner: String,
    pub difficulty: U256,
    pub size: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// The 8-byte PoW nonce, as an integer.
    pub nonce: u64,
    pub transactions: Vec<RawTransaction>,
}

impl RawBlock {
    /// Returns `true` if `self` directly follows `parent` (`number + 1`, linked hash).
    pub fn extends(&self, parent: &BlockRef) -> bool {
        self.number == parent.height + 1 && self.parent_hash == parent.hash
    }

    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.number, self.hash.clone())
    }

    /// Ordered transaction hashes.
    pub fn tx_hashes(&self) -> Vec<String> {
        self.transactions.iter().map(|t| t.hash.clone()).collect()
    }
}

// ─── RawTransaction ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub hash: String,
    pub from: String,
    /// `None` for contract-creation transactions.
    pub to: Option<String>,
    /// Transferred value in wei.
    pub value: U256,
}

impl RawTransaction {
    /// A transaction without a recipient deploys a contract.
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

// ─── RawReceipt ──────────────────────────────────────────────────────────────

/// The subset of `eth_getTransactionReceipt` the sync pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReceipt {
    pub tx_hash: String,
    pub block_hash: String,
    /// Set when the transaction created a contract.
    pub contract_address: Option<String>,
    /// `true` on success (`status == 0x1`); pre-Byzantium receipts count as success.
    pub success: bool,
}

impl RawReceipt {
    pub fn created_contract(&self) -> bool {
        self.contract_address.is_some()
    }
}

// ─── Hex quantity helpers ────────────────────────────────────────────────────

fn strip_hex(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse a JSON-RPC hex quantity (`"0x1b4"`) into a `u64`.
pub fn parse_quantity_u64(field: &str, s: &str) -> Result<u64, SyncError> {
    let digits = strip_hex(s);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).map_err(|e| match e.kind() {
        std::num::IntErrorKind::PosOverflow => SyncError::PrecisionLoss {
            field: field.to_string(),
            value: s.to_string(),
            target: "u64",
        },
        _ => SyncError::Decode(format!("invalid hex quantity for '{field}': {s}")),
    })
}

/// Parse a JSON-RPC hex quantity into a 256-bit unsigned integer.
pub fn parse_quantity_u256(field: &str, s: &str) -> Result<U256, SyncError> {
    let digits = strip_hex(s);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    if digits.len() > 64 {
        return Err(SyncError::PrecisionLoss {
            field: field.to_string(),
            value: s.to_string(),
            target: "u256",
        });
    }
    U256::from_str_radix(digits, 16)
        .map_err(|_| SyncError::Decode(format!("invalid hex quantity for '{field}': {s}")))
}

/// Format a height as a JSON-RPC quantity.
pub fn to_quantity(n: u64) -> String {
    format!("0x{n:x}")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn block(number: u64, hash: &str, parent: &str) -> RawBlock {
        RawBlock {
            number,
            hash: hash.into(),
            parent_hash: parent.into(),
            sha3_uncles: "0x1dcc".into(),
            timestamp: number * 12,
            miner: "0xminer".into(),
            difficulty: U256::from(1u64),
            size: 512,
            gas_limit: 30_000_000,
            gas_used: 21_000,
            nonce: 0,
            transactions: vec![],
        }
    }

    #[test]
    fn block_extends_parent() {
        let parent = BlockRef::new(100, "0xaaa");
        assert!(block(101, "0xbbb", "0xaaa").extends(&parent));
        assert!(!block(101, "0xbbb", "0xzzz").extends(&parent));
        // gap
        assert!(!block(102, "0xccc", "0xaaa").extends(&parent));
    }

    #[test]
    fn parse_u64_quantities() {
        assert_eq!(parse_quantity_u64("n", "0x1").unwrap(), 1);
        assert_eq!(parse_quantity_u64("n", "0xff").unwrap(), 255);
        assert_eq!(parse_quantity_u64("n", "0x").unwrap(), 0);
        assert!(parse_quantity_u64("n", "0xzz").is_err());
        let overflow = parse_quantity_u64("gas", "0x1ffffffffffffffff").unwrap_err();
        assert!(matches!(overflow, SyncError::PrecisionLoss { .. }));
    }

    #[test]
    fn parse_u256_keeps_all_digits() {
        // 123456789012345678901234567890 wei
        let v = parse_quantity_u256("value", "0x18ee90ff6c373e0ee4e3f0ad2").unwrap();
        assert_eq!(v.to_string(), "123456789012345678901234567890");
        let too_wide = format!("0x1{}", "0".repeat(64));
        assert!(matches!(
            parse_quantity_u256("value", &too_wide),
            Err(SyncError::PrecisionLoss { .. })
        ));
    }

    #[test]
    fn quantity_formatting() {
        assert_eq!(to_quantity(0), "0x0");
        assert_eq!(to_quantity(255), "0xff");
    }
}
