//! Shared types for the bridge chains

use std::fmt;

use eyre::eyre;
use serde::{Deserialize, Serialize};

/// EVM address (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvmAddress(pub [u8; 20]);

impl EvmAddress {
    /// Create from hex string (with or without 0x prefix)
    pub fn from_hex(hex: &str) -> Result<Self, eyre::Error> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;

        if bytes.len() != 20 {
            return Err(eyre!("EvmAddress must be 20 bytes, got {} bytes", bytes.len()));
        }
        let mut result = [0u8; 20];
        result.copy_from_slice(&bytes);
        Ok(EvmAddress(result))
    }

    /// Convert to hex string with 0x prefix
    pub fn as_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

/// `TokensLocked` log emitted by the L1 bridge contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEvent {
    pub bridge_id: u64,
    pub user: EvmAddress,
    /// L1 base units (18 decimals)
    pub amount: u128,
    /// Destination owner address as written by the user (base58, unvalidated)
    pub recipient: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub log_index: u64,
}

/// SPL `MintTo` of the bridge mint found in a destination transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    pub token_account: String,
    /// Destination base units (9 decimals)
    pub amount: u64,
}

/// SPL `Burn` of the bridge mint found in a destination transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnRecord {
    pub token_account: String,
    pub owner: String,
    pub amount: u64,
}

/// Parsed destination-chain transaction, restricted to what the bridge needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestTransaction {
    pub signature: String,
    pub slot: u64,
    /// Unix seconds, when the node reports it
    pub block_time: Option<i64>,
    pub failed: bool,
    pub memos: Vec<String>,
    pub mints: Vec<MintRecord>,
    pub burns: Vec<BurnRecord>,
}

impl DestTransaction {
    /// Bridge id carried by any memo of this transaction
    pub fn bridge_id(&self) -> Option<u64> {
        self.memos
            .iter()
            .find_map(|memo| crate::memo::parse_bridge_id(memo))
    }

    /// L1 recipient named by any memo of this transaction
    pub fn l1_recipient(&self) -> Option<EvmAddress> {
        self.memos
            .iter()
            .find_map(|memo| crate::memo::parse_l1_recipient(memo))
    }

    pub fn burned_amount(&self) -> u64 {
        self.burns.iter().map(|b| b.amount).sum()
    }
}

/// One entry of a signature listing for an address (newest first)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub failed: bool,
}
