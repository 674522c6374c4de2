//! Mock L1 bridge contract

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::chain::OriginChain;
use crate::error::ChainError;
use crate::types::{EvmAddress, LockEvent};

/// An unlock the mock contract executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockRecord {
    pub recipient: EvmAddress,
    pub amount: u128,
    pub burn_signature: String,
    pub tx_hash: String,
}

#[derive(Default)]
struct OriginState {
    height: u64,
    locks: Vec<LockEvent>,
    receipts: HashMap<String, u64>,
    processed: HashSet<String>,
    unlocks: Vec<UnlockRecord>,
    read_failures: VecDeque<ChainError>,
    unlock_failures: VecDeque<ChainError>,
    read_calls: u64,
}

/// In-memory [`OriginChain`]
#[derive(Default)]
pub struct MockOriginChain {
    state: Mutex<OriginState>,
}

impl MockOriginChain {
    pub fn new(height: u64) -> Self {
        let chain = Self::default();
        chain.set_height(height);
        chain
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut OriginState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn read(&self) -> Result<(), ChainError> {
        self.with_state(|s| {
            s.read_calls += 1;
            match s.read_failures.pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }

    pub fn set_height(&self, height: u64) {
        self.with_state(|s| s.height = height);
    }

    pub fn height(&self) -> u64 {
        self.with_state(|s| s.height)
    }

    /// Emit a `TokensLocked` log mined at `block`
    pub fn push_lock(&self, bridge_id: u64, recipient: &str, amount: u128, block: u64) -> LockEvent {
        let event = LockEvent {
            bridge_id,
            user: EvmAddress([0x11; 20]),
            amount,
            recipient: recipient.to_string(),
            tx_hash: format!("0x{:064x}", bridge_id),
            block_number: block,
            log_index: 0,
        };
        self.with_state(|s| {
            s.receipts.insert(event.tx_hash.clone(), block);
            s.locks.push(event.clone());
        });
        event
    }

    /// Re-mine a lock transaction in another block
    pub fn move_lock(&self, tx_hash: &str, block: u64) {
        self.with_state(|s| {
            s.receipts.insert(tx_hash.to_string(), block);
            for lock in s.locks.iter_mut().filter(|l| l.tx_hash == tx_hash) {
                lock.block_number = block;
            }
        });
    }

    /// Make a lock transaction unknown to the node (dropped by a reorg)
    pub fn drop_receipt(&self, tx_hash: &str) {
        self.with_state(|s| {
            s.receipts.remove(tx_hash);
        });
    }

    /// Mark a burn as unlocked without recording an unlock (settled elsewhere)
    pub fn mark_processed(&self, burn_signature: &str) {
        self.with_state(|s| {
            s.processed.insert(burn_signature.to_string());
        });
    }

    pub fn unlocks(&self) -> Vec<UnlockRecord> {
        self.with_state(|s| s.unlocks.clone())
    }

    pub fn unlock_count(&self) -> usize {
        self.with_state(|s| s.unlocks.len())
    }

    pub fn read_calls(&self) -> u64 {
        self.with_state(|s| s.read_calls)
    }

    /// Fail the next `count` read calls with `err`
    pub fn fail_next_reads(&self, count: usize, err: ChainError) {
        self.with_state(|s| {
            for _ in 0..count {
                s.read_failures.push_back(err.clone());
            }
        });
    }

    pub fn fail_next_unlock(&self, err: ChainError) {
        self.with_state(|s| s.unlock_failures.push_back(err));
    }
}

#[async_trait]
impl OriginChain for MockOriginChain {
    async fn current_height(&self) -> Result<u64, ChainError> {
        self.read()?;
        Ok(self.height())
    }

    async fn lock_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LockEvent>, ChainError> {
        self.read()?;
        Ok(self.with_state(|s| {
            s.locks
                .iter()
                .filter(|l| l.block_number >= from_block && l.block_number <= to_block)
                .filter(|l| s.receipts.contains_key(&l.tx_hash))
                .cloned()
                .collect()
        }))
    }

    async fn transaction_block(&self, tx_hash: &str) -> Result<Option<u64>, ChainError> {
        self.read()?;
        Ok(self.with_state(|s| s.receipts.get(tx_hash).copied()))
    }

    async fn is_origin_tx_processed(&self, burn_signature: &str) -> Result<bool, ChainError> {
        self.read()?;
        Ok(self.with_state(|s| s.processed.contains(burn_signature)))
    }

    async fn unlock(
        &self,
        recipient: &EvmAddress,
        amount: u128,
        burn_signature: &str,
    ) -> Result<String, ChainError> {
        self.with_state(|s| {
            if let Some(err) = s.unlock_failures.pop_front() {
                return Err(err);
            }
            if s.processed.contains(burn_signature) {
                return Err(ChainError::Permanent(
                    "execution reverted: Solana tx already processed".into(),
                ));
            }
            let tx_hash = format!("0x{:064x}", 0xdead_0000u64 + s.unlocks.len() as u64);
            s.processed.insert(burn_signature.to_string());
            s.unlocks.push(UnlockRecord {
                recipient: *recipient,
                amount,
                burn_signature: burn_signature.to_string(),
                tx_hash: tx_hash.clone(),
            });
            Ok(tx_hash)
        })
    }
}
