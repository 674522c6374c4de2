//! Chain client interfaces consumed by the relayer
//!
//! Implementations must be safe to call repeatedly: reads have no side
//! effects, and submissions are either deduplicated by the chain (same signed
//! transaction) or guarded by the bridge contract.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ChainError;
use crate::types::{DestTransaction, EvmAddress, LockEvent, SignatureInfo};

/// The L1 (EVM) side of the bridge
#[async_trait]
pub trait OriginChain: Send + Sync {
    /// Latest block number
    async fn current_height(&self) -> Result<u64, ChainError>;

    /// `TokensLocked` logs in the inclusive block range
    async fn lock_events(&self, from_block: u64, to_block: u64)
        -> Result<Vec<LockEvent>, ChainError>;

    /// Block containing the transaction, `None` while it is not mined
    async fn transaction_block(&self, tx_hash: &str) -> Result<Option<u64>, ChainError>;

    /// Whether the contract has already unlocked for this burn signature
    async fn is_origin_tx_processed(&self, burn_signature: &str) -> Result<bool, ChainError>;

    /// Submit `unlockTokens` and wait for the receipt, returning the tx hash
    async fn unlock(
        &self,
        recipient: &EvmAddress,
        amount: u128,
        burn_signature: &str,
    ) -> Result<String, ChainError>;
}

/// A signed destination transaction whose signature is known before sending
#[derive(Clone)]
pub struct PreparedTransaction {
    pub signature: String,
    pub description: String,
    payload: Arc<dyn Any + Send + Sync>,
}

impl PreparedTransaction {
    pub fn new<T: Any + Send + Sync>(
        signature: impl Into<String>,
        description: impl Into<String>,
        payload: T,
    ) -> Self {
        Self {
            signature: signature.into(),
            description: description.into(),
            payload: Arc::new(payload),
        }
    }

    /// Payload built by the client that prepared this transaction
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for PreparedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedTransaction")
            .field("signature", &self.signature)
            .field("description", &self.description)
            .finish()
    }
}

/// The destination (Solana) side of the bridge
#[async_trait]
pub trait DestinationChain: Send + Sync {
    /// Bridge mint address (base58)
    fn mint_address(&self) -> String;

    /// Associated token account of `owner` for the bridge mint
    ///
    /// Fails with a permanent error when `owner` is not a valid address.
    fn associated_token_account(&self, owner: &str) -> Result<String, ChainError>;

    async fn current_slot(&self) -> Result<u64, ChainError>;

    /// Signatures touching `address`, newest first, strictly older than `before`
    async fn signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, ChainError>;

    /// Parsed transaction, `None` when the node has no record of it
    async fn transaction(&self, signature: &str) -> Result<Option<DestTransaction>, ChainError>;

    async fn account_exists(&self, address: &str) -> Result<bool, ChainError>;

    /// Build and sign an idempotent create of `owner`'s associated token account
    async fn prepare_create_account(&self, owner: &str) -> Result<PreparedTransaction, ChainError>;

    /// Build and sign `memo` + `MintTo(owner's token account, amount)`
    async fn prepare_mint(
        &self,
        owner: &str,
        amount: u64,
        memo: &str,
    ) -> Result<PreparedTransaction, ChainError>;

    /// Send a prepared transaction and wait for confirmation
    async fn submit(&self, tx: &PreparedTransaction) -> Result<String, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepared_transaction_payload_downcast() {
        let tx = PreparedTransaction::new("sig", "mint", 7u64);
        assert_eq!(tx.payload::<u64>(), Some(&7));
        assert!(tx.payload::<String>().is_none());
        assert!(format!("{:?}", tx).contains("sig"));
    }
}
