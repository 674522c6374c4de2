//! Idempotency oracle: "was this event already settled?"
//!
//! The answer always comes from chain history. Locks are settled when a mint
//! of the bridge mint carries the lock's bridge id memo (or, under the legacy
//! strategy, when a memo-less mint to the recipient matches on amount and
//! time). Burns are settled when the L1 contract reports the burn signature
//! as processed.
//!
//! The cache and the mint index only save RPC calls. A miss in either one
//! falls through to a full scan of the recipient's token account.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use multichain_rs::{
    dest_to_origin, origin_to_dest, ChainError, DestTransaction, DestinationChain, OriginChain,
};

use crate::cache::SettlementCache;
use crate::metrics;
use crate::retry::{RetryError, RpcEndpoint};
use crate::types::{BridgeEvent, EventKey, EvidenceKind, SettlementEvidence};

/// Which destination mints count as settling a lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OracleStrategy {
    /// Only mints tagged with the bridge id memo
    #[serde(rename = "memo-exact")]
    MemoExact,
    /// Memo-tagged mints first, then memo-less mints matched on amount
    #[serde(rename = "memo-with-legacy")]
    MemoWithLegacyAmount,
}

impl OracleStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleStrategy::MemoExact => "memo-exact",
            OracleStrategy::MemoWithLegacyAmount => "memo-with-legacy",
        }
    }
}

impl fmt::Display for OracleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OracleStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memo-exact" => Ok(OracleStrategy::MemoExact),
            "memo-with-legacy" => Ok(OracleStrategy::MemoWithLegacyAmount),
            other => Err(format!(
                "unknown idempotency strategy {:?} (expected memo-exact or memo-with-legacy)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub strategy: OracleStrategy,
    /// Legacy mints older than this never match
    pub legacy_window: Duration,
    /// Destination base units
    pub amount_tolerance: u64,
    pub cache_max_entries: usize,
    pub revalidate_after: Duration,
    /// Signatures requested per history page
    pub page_size: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            strategy: OracleStrategy::MemoWithLegacyAmount,
            legacy_window: Duration::from_secs(90 * 24 * 60 * 60),
            amount_tolerance: 1_000_000,
            cache_max_entries: 50_000,
            revalidate_after: Duration::from_secs(1800),
            page_size: 1000,
        }
    }
}

/// Result of one pass over the bridge mint's history
#[derive(Debug, Default)]
pub struct MintHistory {
    /// Successful transactions, newest first
    pub transactions: Vec<DestTransaction>,
    /// Signatures whose transaction could not be fetched
    pub skipped: Vec<String>,
}

/// A memo-less mint that may settle a pre-memo lock
#[derive(Debug, Clone)]
struct LegacyMint {
    amount: u64,
    block_time: Option<i64>,
}

struct OracleState {
    cache: SettlementCache,
    /// token account → signature → memo-less mint
    legacy: HashMap<String, BTreeMap<String, LegacyMint>>,
    /// legacy mint signature → bridge id it was matched to
    claims: HashMap<String, u64>,
}

pub struct IdempotencyOracle {
    dest: Arc<dyn DestinationChain>,
    origin: Arc<dyn OriginChain>,
    dest_rpc: RpcEndpoint,
    origin_rpc: RpcEndpoint,
    config: OracleConfig,
    state: Mutex<OracleState>,
}

impl IdempotencyOracle {
    pub fn new(
        dest: Arc<dyn DestinationChain>,
        origin: Arc<dyn OriginChain>,
        dest_rpc: RpcEndpoint,
        origin_rpc: RpcEndpoint,
        config: OracleConfig,
    ) -> Self {
        info!(
            strategy = %config.strategy,
            cache_max_entries = config.cache_max_entries,
            revalidate_secs = config.revalidate_after.as_secs(),
            legacy_window_secs = config.legacy_window.as_secs(),
            "Idempotency oracle initialized"
        );
        let state = OracleState {
            cache: SettlementCache::new(config.cache_max_entries, config.revalidate_after),
            legacy: HashMap::new(),
            claims: HashMap::new(),
        };
        Self {
            dest,
            origin,
            dest_rpc,
            origin_rpc,
            config,
            state: Mutex::new(state),
        }
    }

    pub fn strategy(&self) -> OracleStrategy {
        self.config.strategy
    }

    /// Index the mints in already-fetched destination transactions
    pub async fn absorb(&self, transactions: &[DestTransaction]) {
        let mut state = self.state.lock().await;
        for tx in transactions {
            self.absorb_locked(&mut state, tx);
        }
    }

    fn absorb_locked(&self, state: &mut OracleState, tx: &DestTransaction) {
        if tx.failed || tx.mints.is_empty() {
            return;
        }

        match tx.bridge_id() {
            Some(bridge_id) => {
                let key = EventKey::Lock { bridge_id };
                let mint = &tx.mints[0];
                if let Some(hit) = state.cache.get(&key) {
                    if hit.evidence.tx_id.as_deref() != Some(tx.signature.as_str())
                        && hit.evidence.kind != EvidenceKind::LegacyAmountMatch
                    {
                        error!(
                            bridge_id,
                            first = ?hit.evidence.tx_id,
                            second = %tx.signature,
                            "Multiple mints carry the same bridge id"
                        );
                        metrics::record_duplicate_mint();
                    }
                    if hit.evidence.kind != EvidenceKind::LegacyAmountMatch {
                        return;
                    }
                }
                state.cache.insert(
                    key,
                    SettlementEvidence {
                        tx_id: Some(tx.signature.clone()),
                        amount: mint.amount as u128,
                        recipient: mint.token_account.clone(),
                        kind: EvidenceKind::MemoTagged,
                        block_time: tx.block_time,
                    },
                );
            }
            None => {
                for mint in &tx.mints {
                    state
                        .legacy
                        .entry(mint.token_account.clone())
                        .or_default()
                        .insert(
                            tx.signature.clone(),
                            LegacyMint {
                                amount: mint.amount,
                                block_time: tx.block_time,
                            },
                        );
                }
            }
        }
    }

    /// Page through the full signature history of `address`, oldest pages last
    async fn signature_history(&self, address: &str) -> Result<Vec<String>, RetryError> {
        let mut signatures = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let page = self
                .dest_rpc
                .call("getSignaturesForAddress", || {
                    self.dest
                        .signatures_for_address(address, before.as_deref(), self.config.page_size)
                })
                .await?;

            let page_len = page.len();
            before = page.last().map(|info| info.signature.clone());
            signatures.extend(
                page.into_iter()
                    .filter(|info| !info.failed)
                    .map(|info| info.signature),
            );

            if page_len < self.config.page_size || before.is_none() {
                break;
            }
        }

        Ok(signatures)
    }

    async fn fetch_transaction(&self, signature: &str) -> Result<Option<DestTransaction>, RetryError> {
        self.dest_rpc
            .call("getTransaction", || self.dest.transaction(signature))
            .await
    }

    /// Fetch and index every transaction of the bridge mint
    ///
    /// A transaction that still fails after retries is skipped and reported,
    /// not fatal; only a failed signature listing aborts the scan.
    pub async fn scan_mint_history(&self) -> Result<MintHistory, RetryError> {
        let mint = self.dest.mint_address();
        let signatures = self.signature_history(&mint).await?;
        info!(mint = %mint, signatures = signatures.len(), "Scanning mint history");

        let mut history = MintHistory {
            transactions: Vec::with_capacity(signatures.len()),
            skipped: Vec::new(),
        };
        for signature in &signatures {
            match self.fetch_transaction(signature).await {
                Ok(Some(tx)) if !tx.failed => history.transactions.push(tx),
                Ok(_) => {}
                Err(e) => {
                    warn!(signature = %signature, error = %e, "Skipping unreadable mint transaction");
                    history.skipped.push(signature.clone());
                }
            }
        }

        self.absorb(&history.transactions).await;
        Ok(history)
    }

    /// Authoritative settlement check for a lock
    pub async fn check_lock(&self, event: &BridgeEvent) -> Result<Option<SettlementEvidence>, RetryError> {
        let key = event.key();
        let bridge_id = lock_bridge_id(event)?;

        if let Some(evidence) = self.cached(&key).await? {
            metrics::record_oracle_lookup("cache");
            return Ok(Some(evidence));
        }

        let owner = event.recipient.as_deref().unwrap_or_default();
        let token_account = self
            .dest
            .associated_token_account(owner)
            .map_err(|e| permanent("associated token account", e))?;

        let exists = self
            .dest_rpc
            .call("getAccountInfo", || self.dest.account_exists(&token_account))
            .await?;
        if !exists {
            debug!(key = %key, token_account = %token_account, "Recipient token account does not exist");
            metrics::record_oracle_lookup("miss");
            return Ok(None);
        }

        let signatures = self.signature_history(&token_account).await?;
        let mut tagged = None;
        let mut fetched = Vec::new();
        for signature in &signatures {
            let Some(tx) = self.fetch_transaction(signature).await? else {
                continue;
            };
            if tx.failed {
                continue;
            }
            if tagged.is_none() && tx.bridge_id() == Some(bridge_id) {
                if let Some(mint) = tx.mints.iter().find(|m| m.token_account == token_account) {
                    tagged = Some(SettlementEvidence {
                        tx_id: Some(tx.signature.clone()),
                        amount: mint.amount as u128,
                        recipient: mint.token_account.clone(),
                        kind: EvidenceKind::MemoTagged,
                        block_time: tx.block_time,
                    });
                }
            }
            fetched.push(tx);
        }

        let mut state = self.state.lock().await;
        for tx in &fetched {
            self.absorb_locked(&mut state, tx);
        }

        if let Some(evidence) = tagged {
            warn_on_amount_mismatch(event, &evidence);
            state.cache.insert(key, evidence.clone());
            metrics::record_oracle_lookup("scan");
            return Ok(Some(evidence));
        }

        let legacy = self.match_legacy(&mut state, event, bridge_id, &token_account);
        metrics::record_oracle_lookup(if legacy.is_some() { "legacy" } else { "miss" });
        Ok(legacy)
    }

    /// Settlement check for a lock from the index alone, without RPC
    ///
    /// A `None` here is not authoritative; the settlement worker repeats the
    /// full check before acting.
    pub async fn check_lock_indexed(&self, event: &BridgeEvent) -> Option<SettlementEvidence> {
        let key = event.key();
        let bridge_id = event.bridge_id?;
        let mut state = self.state.lock().await;
        if let Some(hit) = state.cache.get(&key) {
            return Some(hit.evidence);
        }
        let token_account = self
            .dest
            .associated_token_account(event.recipient.as_deref()?)
            .ok()?;
        self.match_legacy(&mut state, event, bridge_id, &token_account)
    }

    /// Authoritative settlement check for a burn
    pub async fn check_burn(&self, event: &BridgeEvent) -> Result<Option<SettlementEvidence>, RetryError> {
        let key = event.key();
        if let Some(hit) = self.state.lock().await.cache.get(&key) {
            return Ok(Some(hit.evidence));
        }

        let processed = self
            .origin_rpc
            .call("isSolanaTxProcessed", || {
                self.origin.is_origin_tx_processed(&event.source_tx_id)
            })
            .await?;
        if !processed {
            return Ok(None);
        }

        let amount = u64::try_from(event.amount)
            .map(dest_to_origin)
            .unwrap_or_default();
        let evidence = SettlementEvidence {
            tx_id: None,
            amount,
            recipient: event.recipient.clone().unwrap_or_default(),
            kind: EvidenceKind::ContractFlag,
            block_time: None,
        };
        self.state.lock().await.cache.insert(key, evidence.clone());
        Ok(Some(evidence))
    }

    /// Remember a settlement this process made itself
    pub async fn record_settlement(&self, key: EventKey, evidence: SettlementEvidence) {
        self.state.lock().await.cache.insert(key, evidence);
    }

    pub async fn cache_len(&self) -> usize {
        self.state.lock().await.cache.len()
    }

    /// Cached evidence, revalidated against the chain when stale
    async fn cached(&self, key: &EventKey) -> Result<Option<SettlementEvidence>, RetryError> {
        let Some(hit) = self.state.lock().await.cache.get(key) else {
            return Ok(None);
        };
        if !hit.stale {
            return Ok(Some(hit.evidence));
        }
        let Some(tx_id) = hit.evidence.tx_id.clone() else {
            return Ok(Some(hit.evidence));
        };

        let still_valid = matches!(
            self.fetch_transaction(&tx_id).await?,
            Some(tx) if !tx.failed && !tx.mints.is_empty()
        );

        let mut state = self.state.lock().await;
        if still_valid {
            state.cache.mark_validated(key);
            Ok(Some(hit.evidence))
        } else {
            warn!(key = %key, tx = %tx_id, "Cached settlement no longer visible, rescanning");
            state.cache.remove(key);
            if hit.evidence.kind == EvidenceKind::LegacyAmountMatch {
                state.claims.remove(&tx_id);
            }
            Ok(None)
        }
    }

    fn match_legacy(
        &self,
        state: &mut OracleState,
        event: &BridgeEvent,
        bridge_id: u64,
        token_account: &str,
    ) -> Option<SettlementEvidence> {
        if self.config.strategy != OracleStrategy::MemoWithLegacyAmount {
            return None;
        }
        let expected = origin_to_dest(event.amount).ok()?;
        let oldest_allowed = Utc::now().timestamp() - self.config.legacy_window.as_secs() as i64;

        let candidates = state.legacy.get(token_account)?;
        let (signature, mint) = candidates
            .iter()
            .filter(|(sig, _)| match state.claims.get(*sig) {
                Some(claimed_by) => *claimed_by == bridge_id,
                None => true,
            })
            .filter(|(_, mint)| mint.amount.abs_diff(expected) <= self.config.amount_tolerance)
            .filter(|(_, mint)| mint.block_time.map_or(true, |t| t >= oldest_allowed))
            .min_by_key(|(sig, mint)| (mint.block_time.unwrap_or(i64::MAX), (*sig).clone()))
            .map(|(sig, mint)| (sig.clone(), mint.clone()))?;

        info!(
            bridge_id,
            signature = %signature,
            minted = mint.amount,
            expected,
            "Matched memo-less mint to lock"
        );
        state.claims.insert(signature.clone(), bridge_id);

        let evidence = SettlementEvidence {
            tx_id: Some(signature),
            amount: mint.amount as u128,
            recipient: token_account.to_string(),
            kind: EvidenceKind::LegacyAmountMatch,
            block_time: mint.block_time,
        };
        state.cache.insert(event.key(), evidence.clone());
        Some(evidence)
    }
}

fn lock_bridge_id(event: &BridgeEvent) -> Result<u64, RetryError> {
    event
        .bridge_id
        .ok_or_else(|| permanent("lock lookup", ChainError::Permanent("event has no bridge id".into())))
}

fn permanent(context: &str, source: ChainError) -> RetryError {
    RetryError {
        context: context.to_string(),
        attempts: 1,
        source,
    }
}

fn warn_on_amount_mismatch(event: &BridgeEvent, evidence: &SettlementEvidence) {
    if let Ok(expected) = origin_to_dest(event.amount) {
        if evidence.amount != expected as u128 {
            warn!(
                key = %event.key(),
                expected,
                minted = %evidence.amount,
                "Memo-tagged mint amount differs from lock amount"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::types::EventSource;
    use multichain_rs::testing::{MockDestinationChain, MockOriginChain};
    use multichain_rs::{bridge_memo, DestinationChain as _};

    const TOKEN: u128 = 1_000_000_000_000_000_000;

    fn endpoint(name: &'static str) -> RpcEndpoint {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
            max_attempts: 3,
        };
        RpcEndpoint::new(name, policy, 4)
    }

    fn oracle_with(
        dest: Arc<MockDestinationChain>,
        origin: Arc<MockOriginChain>,
        config: OracleConfig,
    ) -> IdempotencyOracle {
        IdempotencyOracle::new(dest, origin, endpoint("solana"), endpoint("l1"), config)
    }

    fn lock(origin: &MockOriginChain, bridge_id: u64, owner: &str, amount: u128) -> BridgeEvent {
        let lock = origin.push_lock(bridge_id, owner, amount, 10);
        BridgeEvent::from_lock(&lock, EventSource::Watcher)
    }

    #[tokio::test]
    async fn test_unsettled_when_token_account_missing() {
        let dest = Arc::new(MockDestinationChain::new());
        let origin = Arc::new(MockOriginChain::new(100));
        let oracle = oracle_with(dest, origin.clone(), OracleConfig::default());
        let event = lock(&origin, 1, &MockDestinationChain::new_owner(), TOKEN);

        assert_eq!(oracle.check_lock(&event).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memo_tagged_mint_found_and_cached() {
        let dest = Arc::new(MockDestinationChain::new());
        let origin = Arc::new(MockOriginChain::new(100));
        let owner = MockDestinationChain::new_owner();
        let now = Utc::now().timestamp();
        dest.record_mint(&owner, 7, None, now);
        let sig = dest.record_mint(&owner, 500, Some(&bridge_memo(42)), now);

        let oracle = oracle_with(dest.clone(), origin.clone(), OracleConfig::default());
        let event = lock(&origin, 42, &owner, 500 * 1_000_000_000);

        let evidence = oracle.check_lock(&event).await.unwrap().unwrap();
        assert_eq!(evidence.kind, EvidenceKind::MemoTagged);
        assert_eq!(evidence.tx_id.as_deref(), Some(sig.as_str()));
        assert_eq!(evidence.amount, 500);

        // served from cache, no RPC
        dest.fail_next_reads(10, ChainError::Permanent("offline".into()));
        assert!(oracle.check_lock(&event).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_legacy_mint_justifies_only_one_lock() {
        let dest = Arc::new(MockDestinationChain::new());
        let origin = Arc::new(MockOriginChain::new(100));
        let owner = MockDestinationChain::new_owner();
        // 0.0005 token short of the lock amount, within tolerance
        dest.record_mint(&owner, 999_500_000, None, Utc::now().timestamp());

        let oracle = oracle_with(dest, origin.clone(), OracleConfig::default());
        let first = lock(&origin, 1, &owner, TOKEN);
        let second = lock(&origin, 2, &owner, TOKEN);

        let evidence = oracle.check_lock(&first).await.unwrap().unwrap();
        assert_eq!(evidence.kind, EvidenceKind::LegacyAmountMatch);
        assert_eq!(oracle.check_lock(&second).await.unwrap(), None);
        // the claim is stable for the lock that owns it
        assert!(oracle.check_lock(&first).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_legacy_match_respects_tolerance_window_and_strategy() {
        let dest = Arc::new(MockDestinationChain::new());
        let origin = Arc::new(MockOriginChain::new(100));
        let owner = MockDestinationChain::new_owner();
        let now = Utc::now().timestamp();
        dest.record_mint(&owner, 2_000_000_000, None, now - 100 * 24 * 60 * 60);
        dest.record_mint(&owner, 1_100_000_000, None, now);
        dest.record_mint(&owner, 3_000_000_000, None, now);

        let oracle = oracle_with(dest.clone(), origin.clone(), OracleConfig::default());
        // outside the 90-day window
        assert_eq!(oracle.check_lock(&lock(&origin, 1, &owner, 2 * TOKEN)).await.unwrap(), None);
        // 0.1 token off is beyond tolerance
        assert_eq!(oracle.check_lock(&lock(&origin, 2, &owner, TOKEN)).await.unwrap(), None);

        let exact = oracle_with(
            dest,
            origin.clone(),
            OracleConfig {
                strategy: OracleStrategy::MemoExact,
                ..OracleConfig::default()
            },
        );
        assert_eq!(exact.check_lock(&lock(&origin, 3, &owner, 3 * TOKEN)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mint_history_scan_warms_index() {
        let dest = Arc::new(MockDestinationChain::new());
        let origin = Arc::new(MockOriginChain::new(100));
        let owner = MockDestinationChain::new_owner();
        let now = Utc::now().timestamp();
        for id in 1..=3 {
            dest.record_mint(&owner, 10, Some(&bridge_memo(id)), now);
        }
        dest.record_burn(&owner, 5, None);

        let oracle = oracle_with(
            dest.clone(),
            origin.clone(),
            OracleConfig {
                page_size: 2,
                ..OracleConfig::default()
            },
        );
        let history = oracle.scan_mint_history().await.unwrap();
        assert_eq!(history.transactions.len(), 4);
        assert!(history.skipped.is_empty());

        for id in 1..=3 {
            let event = lock(&origin, id, &owner, 10 * 1_000_000_000);
            assert!(oracle.check_lock_indexed(&event).await.is_some());
        }
        assert!(oracle.check_lock_indexed(&lock(&origin, 4, &owner, TOKEN)).await.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_history_transaction_is_skipped() {
        let dest = Arc::new(MockDestinationChain::new());
        let origin = Arc::new(MockOriginChain::new(100));
        let owner = MockDestinationChain::new_owner();
        let now = Utc::now().timestamp();
        let unreadable = dest.record_mint(&owner, 10, Some(&bridge_memo(1)), now);
        dest.record_mint(&owner, 10, Some(&bridge_memo(2)), now);
        dest.fail_transaction_reads(&unreadable, 10, ChainError::Transient("timeout".into()));

        let oracle = oracle_with(dest.clone(), origin.clone(), OracleConfig::default());
        let history = oracle.scan_mint_history().await.unwrap();
        assert_eq!(history.transactions.len(), 1);
        assert_eq!(history.skipped, vec![unreadable]);

        let indexed = lock(&origin, 2, &owner, 10 * 1_000_000_000);
        assert!(oracle.check_lock_indexed(&indexed).await.is_some());
    }

    #[tokio::test]
    async fn test_stale_entry_is_revalidated() {
        let dest = Arc::new(MockDestinationChain::new());
        let origin = Arc::new(MockOriginChain::new(100));
        let owner = MockDestinationChain::new_owner();
        dest.record_mint(&owner, 10, Some(&bridge_memo(5)), Utc::now().timestamp());

        let oracle = oracle_with(
            dest.clone(),
            origin.clone(),
            OracleConfig {
                revalidate_after: Duration::ZERO,
                ..OracleConfig::default()
            },
        );
        let event = lock(&origin, 5, &owner, 10 * 1_000_000_000);
        assert!(oracle.check_lock(&event).await.unwrap().is_some());

        // revalidation has to reach the chain
        dest.fail_next_reads(1, ChainError::Permanent("offline".into()));
        assert!(oracle.check_lock(&event).await.is_err());
        assert!(oracle.check_lock(&event).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_burn_check_uses_contract_flag() {
        let dest = Arc::new(MockDestinationChain::new());
        let origin = Arc::new(MockOriginChain::new(100));
        let owner = MockDestinationChain::new_owner();
        let sig = dest.record_burn(&owner, 2_000_000_000, Some("l1:0x00000000000000000000000000000000000000aa"));
        let tx = dest.transaction(&sig).await.unwrap().unwrap();
        let event = BridgeEvent::from_burn(&tx, EventSource::Watcher).unwrap();

        let oracle = oracle_with(dest, origin.clone(), OracleConfig::default());
        assert_eq!(oracle.check_burn(&event).await.unwrap(), None);

        origin.mark_processed(&sig);
        let evidence = oracle.check_burn(&event).await.unwrap().unwrap();
        assert_eq!(evidence.kind, EvidenceKind::ContractFlag);
        assert_eq!(evidence.amount, 2 * TOKEN);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("memo-exact".parse::<OracleStrategy>(), Ok(OracleStrategy::MemoExact));
        assert_eq!(
            "MEMO-WITH-LEGACY".parse::<OracleStrategy>(),
            Ok(OracleStrategy::MemoWithLegacyAmount)
        );
        assert!("amount-only".parse::<OracleStrategy>().is_err());
    }
}
