//! Hashing helpers shared by the L1 contract and the relayer
//!
//! The L1 bridge contract keys processed burns by a `bytes32` id. The id is the
//! keccak256 of the UTF-8 bytes of the base58 Solana signature, which is what
//! `ethers.id(signature)` produced for the contract's existing records.

use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// `bytes32` id the L1 contract uses for a destination-chain burn signature
pub fn origin_tx_id(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

/// Convert bytes32 to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}
