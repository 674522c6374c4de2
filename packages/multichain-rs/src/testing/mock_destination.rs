//! Mock Solana mint

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::chain::{DestinationChain, PreparedTransaction};
use crate::error::ChainError;
use crate::solana::instructions::associated_token_address;
use crate::types::{BurnRecord, DestTransaction, MintRecord, SignatureInfo};

/// Payload of a transaction prepared by [`MockDestinationChain`]
#[derive(Debug, Clone)]
enum MockPayload {
    CreateAccount { owner: String, token_account: String },
    Mint { token_account: String, amount: u64, memo: String },
}

enum SubmitFailure {
    /// Rejected before reaching the ledger
    Reject(ChainError),
    /// Lands on the ledger but the client sees an error
    LandThenFail(ChainError),
}

struct LedgerEntry {
    tx: DestTransaction,
    touched: Vec<String>,
}

struct DestState {
    slot: u64,
    block_time: i64,
    accounts: HashSet<String>,
    ledger: Vec<LedgerEntry>,
    read_failures: VecDeque<ChainError>,
    /// signature → remaining failed `transaction` reads
    transaction_failures: HashMap<String, (usize, ChainError)>,
    submit_failures: VecDeque<SubmitFailure>,
    next_signature: u64,
    submit_calls: u64,
}

/// In-memory [`DestinationChain`] for one mint
pub struct MockDestinationChain {
    mint: Pubkey,
    authority: Pubkey,
    submit_latency: Option<Duration>,
    state: Mutex<DestState>,
}

impl Default for MockDestinationChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDestinationChain {
    pub fn new() -> Self {
        Self {
            mint: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            submit_latency: None,
            state: Mutex::new(DestState {
                slot: 1,
                block_time: 1_700_000_000,
                accounts: HashSet::new(),
                ledger: Vec::new(),
                read_failures: VecDeque::new(),
                transaction_failures: HashMap::new(),
                submit_failures: VecDeque::new(),
                next_signature: 1,
                submit_calls: 0,
            }),
        }
    }

    /// Delay every submission, to widen race windows in tests
    pub fn with_submit_latency(mut self, latency: Duration) -> Self {
        self.submit_latency = Some(latency);
        self
    }

    /// A fresh valid owner address
    pub fn new_owner() -> String {
        Pubkey::new_unique().to_string()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut DestState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn read(&self) -> Result<(), ChainError> {
        self.with_state(|s| match s.read_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        })
    }

    fn token_account(&self, owner: &str) -> Result<String, ChainError> {
        let owner = Pubkey::from_str(owner)
            .map_err(|e| ChainError::Permanent(format!("invalid address {:?}: {}", owner, e)))?;
        Ok(associated_token_address(&owner, &self.mint).to_string())
    }

    fn allocate_signature(state: &mut DestState) -> String {
        let sig = format!("mocksig{:08}", state.next_signature);
        state.next_signature += 1;
        sig
    }

    fn append(state: &mut DestState, tx: DestTransaction, touched: Vec<String>) {
        state.slot += 1;
        state.ledger.push(LedgerEntry { tx, touched });
    }

    fn blank_tx(state: &DestState, signature: String) -> DestTransaction {
        DestTransaction {
            signature,
            slot: state.slot,
            block_time: Some(state.block_time),
            failed: false,
            memos: Vec::new(),
            mints: Vec::new(),
            burns: Vec::new(),
        }
    }

    /// Record a mint that happened before the relayer started
    pub fn record_mint(&self, owner: &str, amount: u64, memo: Option<&str>, block_time: i64) -> String {
        let token_account = self
            .token_account(owner)
            .unwrap_or_else(|e| panic!("record_mint: {}", e));
        let mint = self.mint.to_string();
        self.with_state(|s| {
            s.accounts.insert(token_account.clone());
            let signature = Self::allocate_signature(s);
            let mut tx = Self::blank_tx(s, signature.clone());
            tx.block_time = Some(block_time);
            tx.memos = memo.map(|m| vec![m.to_string()]).unwrap_or_default();
            tx.mints.push(MintRecord {
                token_account: token_account.clone(),
                amount,
            });
            Self::append(s, tx, vec![token_account, mint]);
            signature
        })
    }

    /// Record a user burn, optionally with a memo
    pub fn record_burn(&self, owner: &str, amount: u64, memo: Option<&str>) -> String {
        let token_account = self
            .token_account(owner)
            .unwrap_or_else(|e| panic!("record_burn: {}", e));
        let mint = self.mint.to_string();
        self.with_state(|s| {
            let signature = Self::allocate_signature(s);
            let mut tx = Self::blank_tx(s, signature.clone());
            tx.memos = memo.map(|m| vec![m.to_string()]).unwrap_or_default();
            tx.burns.push(BurnRecord {
                token_account: token_account.clone(),
                owner: owner.to_string(),
                amount,
            });
            Self::append(s, tx, vec![token_account, mint, owner.to_string()]);
            signature
        })
    }

    /// Record a failed transaction touching the mint
    pub fn record_failed_burn(&self, owner: &str, amount: u64) -> String {
        let signature = self.record_burn(owner, amount, None);
        self.with_state(|s| {
            if let Some(entry) = s.ledger.iter_mut().find(|e| e.tx.signature == signature) {
                entry.tx.failed = true;
            }
        });
        signature
    }

    pub fn set_block_time(&self, block_time: i64) {
        self.with_state(|s| s.block_time = block_time);
    }

    /// All successful mints to `owner`'s token account
    pub fn mints_to(&self, owner: &str) -> Vec<DestTransaction> {
        let Ok(token_account) = self.token_account(owner) else {
            return Vec::new();
        };
        self.with_state(|s| {
            s.ledger
                .iter()
                .filter(|e| !e.tx.failed)
                .filter(|e| e.tx.mints.iter().any(|m| m.token_account == token_account))
                .map(|e| e.tx.clone())
                .collect()
        })
    }

    /// Number of successful mint transactions on the ledger
    pub fn mint_count(&self) -> usize {
        self.with_state(|s| {
            s.ledger
                .iter()
                .filter(|e| !e.tx.failed && !e.tx.mints.is_empty())
                .count()
        })
    }

    pub fn submit_calls(&self) -> u64 {
        self.with_state(|s| s.submit_calls)
    }

    pub fn fail_next_reads(&self, count: usize, err: ChainError) {
        self.with_state(|s| {
            for _ in 0..count {
                s.read_failures.push_back(err.clone());
            }
        });
    }

    /// Fail the next `count` fetches of one transaction
    pub fn fail_transaction_reads(&self, signature: &str, count: usize, err: ChainError) {
        self.with_state(|s| {
            s.transaction_failures
                .insert(signature.to_string(), (count, err));
        });
    }

    pub fn fail_next_submit(&self, err: ChainError) {
        self.with_state(|s| s.submit_failures.push_back(SubmitFailure::Reject(err)));
    }

    /// The next submission lands but reports `err` to the caller
    pub fn land_then_fail_next_submit(&self, err: ChainError) {
        self.with_state(|s| s.submit_failures.push_back(SubmitFailure::LandThenFail(err)));
    }

    fn apply(&self, state: &mut DestState, signature: &str, payload: &MockPayload) -> Result<(), ChainError> {
        let mut tx = Self::blank_tx(state, signature.to_string());
        let touched = match payload {
            MockPayload::CreateAccount {
                owner,
                token_account,
            } => {
                state.accounts.insert(token_account.clone());
                vec![token_account.clone(), owner.clone()]
            }
            MockPayload::Mint {
                token_account,
                amount,
                memo,
            } => {
                if !state.accounts.contains(token_account) {
                    return Err(ChainError::Permanent(
                        "Transaction simulation failed: invalid account data for instruction".into(),
                    ));
                }
                tx.memos.push(memo.clone());
                tx.mints.push(MintRecord {
                    token_account: token_account.clone(),
                    amount: *amount,
                });
                vec![token_account.clone(), self.mint.to_string(), self.authority.to_string()]
            }
        };
        Self::append(state, tx, touched);
        Ok(())
    }
}

#[async_trait]
impl DestinationChain for MockDestinationChain {
    fn mint_address(&self) -> String {
        self.mint.to_string()
    }

    fn associated_token_account(&self, owner: &str) -> Result<String, ChainError> {
        self.token_account(owner)
    }

    async fn current_slot(&self) -> Result<u64, ChainError> {
        self.read()?;
        Ok(self.with_state(|s| s.slot))
    }

    async fn signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, ChainError> {
        self.read()?;
        Ok(self.with_state(|s| {
            let newest_first = s
                .ledger
                .iter()
                .rev()
                .filter(|e| e.touched.iter().any(|a| a == address));

            let mut skipping = before.is_some();
            newest_first
                .filter(|e| {
                    if skipping {
                        if Some(e.tx.signature.as_str()) == before {
                            skipping = false;
                        }
                        return false;
                    }
                    true
                })
                .take(limit)
                .map(|e| SignatureInfo {
                    signature: e.tx.signature.clone(),
                    slot: e.tx.slot,
                    block_time: e.tx.block_time,
                    failed: e.tx.failed,
                })
                .collect()
        }))
    }

    async fn transaction(&self, signature: &str) -> Result<Option<DestTransaction>, ChainError> {
        self.read()?;
        self.with_state(|s| {
            if let Some((remaining, err)) = s.transaction_failures.get_mut(signature) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(err.clone());
                }
            }
            Ok(s.ledger
                .iter()
                .find(|e| e.tx.signature == signature)
                .map(|e| e.tx.clone()))
        })
    }

    async fn account_exists(&self, address: &str) -> Result<bool, ChainError> {
        self.read()?;
        Ok(self.with_state(|s| s.accounts.contains(address)))
    }

    async fn prepare_create_account(&self, owner: &str) -> Result<PreparedTransaction, ChainError> {
        let token_account = self.token_account(owner)?;
        let signature = self.with_state(Self::allocate_signature);
        Ok(PreparedTransaction::new(
            signature,
            format!("create token account for {}", owner),
            MockPayload::CreateAccount {
                owner: owner.to_string(),
                token_account,
            },
        ))
    }

    async fn prepare_mint(
        &self,
        owner: &str,
        amount: u64,
        memo: &str,
    ) -> Result<PreparedTransaction, ChainError> {
        let token_account = self.token_account(owner)?;
        let signature = self.with_state(Self::allocate_signature);
        Ok(PreparedTransaction::new(
            signature,
            format!("mint {} to {}", amount, owner),
            MockPayload::Mint {
                token_account,
                amount,
                memo: memo.to_string(),
            },
        ))
    }

    async fn submit(&self, prepared: &PreparedTransaction) -> Result<String, ChainError> {
        if let Some(latency) = self.submit_latency {
            tokio::time::sleep(latency).await;
        }
        let payload = prepared
            .payload::<MockPayload>()
            .ok_or_else(|| ChainError::Permanent("foreign prepared transaction".into()))?
            .clone();

        self.with_state(|s| {
            s.submit_calls += 1;

            // Same signature twice is deduplicated by the cluster
            if s.ledger.iter().any(|e| e.tx.signature == prepared.signature) {
                return Ok(prepared.signature.clone());
            }

            match s.submit_failures.pop_front() {
                Some(SubmitFailure::Reject(err)) => Err(err),
                Some(SubmitFailure::LandThenFail(err)) => {
                    self.apply(s, &prepared.signature, &payload)?;
                    Err(err)
                }
                None => {
                    self.apply(s, &prepared.signature, &payload)?;
                    Ok(prepared.signature.clone())
                }
            }
        })
    }
}
