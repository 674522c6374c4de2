//! Solana mint client
//!
//! The relayer keypair is both fee payer and mint authority. All reads use
//! `confirmed` commitment.

use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use eyre::{eyre, Result};
use solana_client::{
    nonblocking::rpc_client::RpcClient, rpc_client::GetConfirmedSignaturesForAddress2Config,
    rpc_config::RpcTransactionConfig, rpc_request::RpcRequest,
};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::Transaction,
};
use solana_transaction_status::{
    option_serializer::OptionSerializer, EncodedConfirmedTransactionWithStatusMeta, UiInstruction,
    UiTransactionEncoding,
};
use tracing::{debug, info, warn};

use super::instructions::{
    associated_token_address, create_associated_token_account_idempotent, memo, mint_to,
};
use super::parse::{parse_bridge_transaction, RawInstruction, TxHeader};
use crate::chain::{DestinationChain, PreparedTransaction};
use crate::error::ChainError;
use crate::redact::redact_url;
use crate::types::{DestTransaction, SignatureInfo};

/// Solana client configuration
#[derive(Clone)]
pub struct SolanaMintConfig {
    pub rpc_url: String,
    pub mint_address: String,
    /// JSON byte array or base58 secret key
    pub keypair: String,
}

impl std::fmt::Debug for SolanaMintConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaMintConfig")
            .field("rpc_url", &redact_url(&self.rpc_url))
            .field("mint_address", &self.mint_address)
            .field("keypair", &"<redacted>")
            .finish()
    }
}

/// Parse a keypair from a JSON byte array (`[12,34,...]`) or a base58 string
pub fn parse_keypair(raw: &str) -> Result<Keypair> {
    let raw = raw.trim();
    let bytes: Vec<u8> = if raw.starts_with('[') {
        serde_json::from_str(raw).map_err(|e| eyre!("Invalid keypair JSON: {}", e))?
    } else {
        bs58::decode(raw)
            .into_vec()
            .map_err(|e| eyre!("Invalid base58 keypair: {}", e))?
    };
    if bytes.len() != 64 {
        return Err(eyre!("Keypair must be 64 bytes, got {}", bytes.len()));
    }
    Keypair::from_bytes(&bytes).map_err(|e| eyre!("Invalid keypair bytes: {}", e))
}

fn parse_pubkey(value: &str) -> Result<Pubkey, ChainError> {
    Pubkey::from_str(value.trim())
        .map_err(|e| ChainError::Permanent(format!("invalid address {:?}: {}", value, e)))
}

fn classify(err: impl Display) -> ChainError {
    ChainError::classify(err.to_string())
}

/// [`DestinationChain`] backed by a Solana RPC node
pub struct SolanaMintClient {
    rpc: RpcClient,
    mint: Pubkey,
    authority: Keypair,
}

impl SolanaMintClient {
    pub fn new(config: &SolanaMintConfig) -> Result<Self> {
        let mint = Pubkey::from_str(&config.mint_address)
            .map_err(|e| eyre!("Invalid mint address: {}", e))?;
        let authority = parse_keypair(&config.keypair)?;
        let rpc = RpcClient::new_with_commitment(
            config.rpc_url.clone(),
            CommitmentConfig::confirmed(),
        );

        info!(
            rpc_url = %redact_url(&config.rpc_url),
            mint = %mint,
            authority = %authority.pubkey(),
            "Created Solana mint client"
        );

        Ok(Self {
            rpc,
            mint,
            authority,
        })
    }

    pub fn authority(&self) -> Pubkey {
        self.authority.pubkey()
    }

    async fn sign(&self, instructions: &[Instruction]) -> Result<Transaction, ChainError> {
        let blockhash = self.rpc.get_latest_blockhash().await.map_err(classify)?;
        Ok(Transaction::new_signed_with_payer(
            instructions,
            Some(&self.authority.pubkey()),
            &[&self.authority],
            blockhash,
        ))
    }

    fn to_prepared(tx: Transaction, description: String) -> Result<PreparedTransaction, ChainError> {
        let signature = tx
            .signatures
            .first()
            .ok_or_else(|| ChainError::Permanent("signed transaction has no signature".into()))?
            .to_string();
        Ok(PreparedTransaction::new(signature, description, tx))
    }

    fn decode(&self, encoded: EncodedConfirmedTransactionWithStatusMeta, signature: &str) -> Result<DestTransaction, ChainError> {
        let meta = encoded.transaction.meta;
        let transaction = encoded.transaction.transaction.decode().ok_or_else(|| {
            ChainError::Permanent(format!("could not decode transaction {}", signature))
        })?;

        let mut account_keys: Vec<Pubkey> = transaction.message.static_account_keys().to_vec();
        let mut instructions: Vec<RawInstruction> = transaction
            .message
            .instructions()
            .iter()
            .map(RawInstruction::from)
            .collect();
        let mut failed = false;

        if let Some(meta) = meta {
            failed = meta.err.is_some();

            // v0 transactions append lookup-table addresses: writable first, then readonly
            if let OptionSerializer::Some(loaded) = &meta.loaded_addresses {
                for address in loaded.writable.iter().chain(loaded.readonly.iter()) {
                    if let Ok(key) = Pubkey::from_str(address) {
                        account_keys.push(key);
                    }
                }
            }

            if let OptionSerializer::Some(inner) = &meta.inner_instructions {
                for group in inner {
                    for ix in &group.instructions {
                        if let UiInstruction::Compiled(compiled) = ix {
                            if let Ok(data) = bs58::decode(&compiled.data).into_vec() {
                                instructions.push(RawInstruction {
                                    program_id_index: compiled.program_id_index,
                                    accounts: compiled.accounts.clone(),
                                    data,
                                });
                            }
                        }
                    }
                }
            }
        }

        Ok(parse_bridge_transaction(
            TxHeader {
                signature: signature.to_string(),
                slot: encoded.slot,
                block_time: encoded.block_time,
                failed,
            },
            &account_keys,
            &instructions,
            &self.mint,
        ))
    }
}

#[async_trait]
impl DestinationChain for SolanaMintClient {
    fn mint_address(&self) -> String {
        self.mint.to_string()
    }

    fn associated_token_account(&self, owner: &str) -> Result<String, ChainError> {
        let owner = parse_pubkey(owner)?;
        Ok(associated_token_address(&owner, &self.mint).to_string())
    }

    async fn current_slot(&self) -> Result<u64, ChainError> {
        self.rpc.get_slot().await.map_err(classify)
    }

    async fn signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, ChainError> {
        let address = parse_pubkey(address)?;
        let before = before
            .map(Signature::from_str)
            .transpose()
            .map_err(|e| ChainError::Permanent(format!("invalid signature cursor: {}", e)))?;

        let statuses = self
            .rpc
            .get_signatures_for_address_with_config(
                &address,
                GetConfirmedSignaturesForAddress2Config {
                    before,
                    until: None,
                    limit: Some(limit),
                    commitment: Some(CommitmentConfig::confirmed()),
                },
            )
            .await
            .map_err(classify)?;

        Ok(statuses
            .into_iter()
            .map(|status| SignatureInfo {
                signature: status.signature,
                slot: status.slot,
                block_time: status.block_time,
                failed: status.err.is_some(),
            })
            .collect())
    }

    async fn transaction(&self, signature: &str) -> Result<Option<DestTransaction>, ChainError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        // getTransaction returns null for unknown signatures
        let encoded: Option<EncodedConfirmedTransactionWithStatusMeta> = self
            .rpc
            .send(
                RpcRequest::GetTransaction,
                serde_json::json!([signature, config]),
            )
            .await
            .map_err(classify)?;

        encoded
            .map(|encoded| self.decode(encoded, signature))
            .transpose()
    }

    async fn account_exists(&self, address: &str) -> Result<bool, ChainError> {
        let address = parse_pubkey(address)?;
        let response = self
            .rpc
            .get_account_with_commitment(&address, CommitmentConfig::confirmed())
            .await
            .map_err(classify)?;
        Ok(response.value.is_some())
    }

    async fn prepare_create_account(&self, owner: &str) -> Result<PreparedTransaction, ChainError> {
        let owner_key = parse_pubkey(owner)?;
        let ix = create_associated_token_account_idempotent(
            &self.authority.pubkey(),
            &owner_key,
            &self.mint,
        );
        let tx = self.sign(&[ix]).await?;
        Self::to_prepared(tx, format!("create token account for {}", owner))
    }

    async fn prepare_mint(
        &self,
        owner: &str,
        amount: u64,
        memo_text: &str,
    ) -> Result<PreparedTransaction, ChainError> {
        let owner_key = parse_pubkey(owner)?;
        let destination = associated_token_address(&owner_key, &self.mint);
        let authority = self.authority.pubkey();

        let tx = self
            .sign(&[
                memo(memo_text, &authority),
                mint_to(&self.mint, &destination, &authority, amount),
            ])
            .await?;
        Self::to_prepared(tx, format!("mint {} to {} ({})", amount, owner, memo_text))
    }

    async fn submit(&self, prepared: &PreparedTransaction) -> Result<String, ChainError> {
        let tx = prepared.payload::<Transaction>().ok_or_else(|| {
            ChainError::Permanent("prepared transaction was not built by this client".into())
        })?;

        debug!(signature = %prepared.signature, what = %prepared.description, "Submitting transaction");

        match self.rpc.send_and_confirm_transaction(tx).await {
            Ok(signature) => Ok(signature.to_string()),
            Err(e) => {
                let err = classify(e);
                // Resending a transaction that already landed
                if err.is_already_processed() {
                    warn!(signature = %prepared.signature, "Transaction already processed by the cluster");
                    return Ok(prepared.signature.clone());
                }
                Err(err)
            }
        }
    }
}
