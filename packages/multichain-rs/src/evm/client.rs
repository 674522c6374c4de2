//! L1 bridge client
//!
//! Reads go through a plain HTTP provider; writes build a wallet-filled
//! provider per submission, so nonce and gas are always fetched fresh.

use std::fmt::Display;

use alloy::{
    network::EthereumWallet,
    primitives::{Address, FixedBytes, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::Filter,
    signers::local::PrivateKeySigner,
    sol_types::SolEvent,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use eyre::{eyre, Result};
use tracing::{debug, info, warn};

use super::contracts::MarsBridge;
use super::events::parse_lock_log;
use crate::chain::OriginChain;
use crate::error::ChainError;
use crate::hash::{bytes32_to_hex, origin_tx_id};
use crate::redact::redact_url;
use crate::types::{EvmAddress, LockEvent};

/// L1 client configuration
#[derive(Clone)]
pub struct EvmBridgeConfig {
    pub rpc_url: String,
    pub bridge_address: String,
    pub private_key: String,
}

impl std::fmt::Debug for EvmBridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmBridgeConfig")
            .field("rpc_url", &redact_url(&self.rpc_url))
            .field("bridge_address", &self.bridge_address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// [`OriginChain`] backed by the Mars Credit bridge contract
pub struct EvmBridgeClient {
    provider: RootProvider<Http<Client>>,
    rpc_url: url::Url,
    bridge_address: Address,
    signer: PrivateKeySigner,
}

impl EvmBridgeClient {
    pub fn new(config: &EvmBridgeConfig) -> Result<Self> {
        let rpc_url: url::Url = config
            .rpc_url
            .parse()
            .map_err(|e| eyre!("Invalid L1 RPC URL: {}", e))?;
        let bridge_address: Address = config
            .bridge_address
            .parse()
            .map_err(|e| eyre!("Invalid bridge contract address: {}", e))?;
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .map_err(|e| eyre!("Invalid relayer private key: {}", e))?;

        let provider = ProviderBuilder::new().on_http(rpc_url.clone());

        info!(
            rpc_url = %redact_url(&config.rpc_url),
            bridge = %bridge_address,
            relayer = %signer.address(),
            "Created L1 bridge client"
        );

        Ok(Self {
            provider,
            rpc_url,
            bridge_address,
            signer,
        })
    }

    /// Address the relayer signs unlocks with
    pub fn relayer_address(&self) -> Address {
        self.signer.address()
    }

    /// Number of locks the contract has recorded; used as a startup probe
    pub async fn bridge_count(&self) -> Result<u64, ChainError> {
        let contract = MarsBridge::new(self.bridge_address, &self.provider);
        let count = contract.bridgeCount().call().await.map_err(classify)?.count;
        count
            .try_into()
            .map_err(|_| ChainError::Permanent(format!("bridge count {} exceeds u64", count)))
    }
}

fn classify(err: impl Display) -> ChainError {
    ChainError::classify(err.to_string())
}

#[async_trait]
impl OriginChain for EvmBridgeClient {
    async fn current_height(&self) -> Result<u64, ChainError> {
        self.provider.get_block_number().await.map_err(classify)
    }

    async fn lock_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LockEvent>, ChainError> {
        let filter = Filter::new()
            .address(self.bridge_address)
            .event_signature(MarsBridge::TokensLocked::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self.provider.get_logs(&filter).await.map_err(classify)?;
        let events: Vec<LockEvent> = logs.iter().filter_map(parse_lock_log).collect();

        if !events.is_empty() {
            debug!(
                count = events.len(),
                from = from_block,
                to = to_block,
                "Found lock events"
            );
        }

        Ok(events)
    }

    async fn transaction_block(&self, tx_hash: &str) -> Result<Option<u64>, ChainError> {
        let hash: B256 = tx_hash
            .parse()
            .map_err(|e| ChainError::Permanent(format!("invalid tx hash {}: {}", tx_hash, e)))?;

        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(classify)?;

        Ok(receipt.and_then(|r| if r.status() { r.block_number } else { None }))
    }

    async fn is_origin_tx_processed(&self, burn_signature: &str) -> Result<bool, ChainError> {
        let contract = MarsBridge::new(self.bridge_address, &self.provider);
        let id = FixedBytes::from(origin_tx_id(burn_signature));
        let result = contract
            .isSolanaTxProcessed(id)
            .call()
            .await
            .map_err(classify)?;
        Ok(result.processed)
    }

    async fn unlock(
        &self,
        recipient: &EvmAddress,
        amount: u128,
        burn_signature: &str,
    ) -> Result<String, ChainError> {
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.rpc_url.clone());
        let contract = MarsBridge::new(self.bridge_address, &provider);

        let burn_id = origin_tx_id(burn_signature);
        let id = FixedBytes::from(burn_id);
        let pending = contract
            .unlockTokens(Address::from(recipient.0), U256::from(amount), id)
            .send()
            .await
            .map_err(classify)?;

        let tx_hash = *pending.tx_hash();
        info!(
            tx_hash = %format!("0x{:x}", tx_hash),
            recipient = %recipient,
            burn_signature = %burn_signature,
            burn_id = %bytes32_to_hex(&burn_id),
            "Unlock transaction sent"
        );

        let receipt = pending.get_receipt().await.map_err(classify)?;
        if !receipt.status() {
            warn!(tx_hash = %format!("0x{:x}", tx_hash), "Unlock transaction reverted");
            return Err(ChainError::Permanent(format!(
                "unlock transaction 0x{:x} reverted",
                tx_hash
            )));
        }

        Ok(format!("0x{:x}", tx_hash))
    }
}
