use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use multichain_rs::{DestinationChain, SignatureInfo};

use crate::cache::BoundedSet;
use crate::config::SolanaConfig;
use crate::metrics;
use crate::oracle::IdempotencyOracle;
use crate::registry::{EventRegistry, IngestOutcome};
use crate::retry::RpcEndpoint;
use crate::shutdown::{self, ShutdownReceiver};
use crate::types::{BridgeEvent, EventSource};

const SEEN_SIGNATURES_MAX: usize = 10_000;

/// Solana watcher for burns of the bridge mint
///
/// Also feeds every mint it sees into the oracle index.
pub struct DestinationWatcher {
    dest: Arc<dyn DestinationChain>,
    rpc: RpcEndpoint,
    oracle: Arc<IdempotencyOracle>,
    registry: Arc<EventRegistry>,
    poll_interval: Duration,
    scan_limit: usize,
    seen: Mutex<BoundedSet<String>>,
    /// Newest signature with everything at or before it handled
    cursor: Mutex<Option<String>>,
}

impl DestinationWatcher {
    pub fn new(
        dest: Arc<dyn DestinationChain>,
        rpc: RpcEndpoint,
        oracle: Arc<IdempotencyOracle>,
        registry: Arc<EventRegistry>,
        config: &SolanaConfig,
    ) -> Self {
        Self {
            dest,
            rpc,
            oracle,
            registry,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            scan_limit: config.burn_scan_limit,
            seen: Mutex::new(BoundedSet::new(SEEN_SIGNATURES_MAX)),
            cursor: Mutex::new(None),
        }
    }

    /// Run the watcher loop
    pub async fn run(&self, mut shutdown_rx: ShutdownReceiver) -> Result<()> {
        info!(
            mint = %self.dest.mint_address(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            scan_limit = self.scan_limit,
            "Solana watcher starting"
        );

        loop {
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "Solana poll failed, retrying next interval");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown::requested(&mut shutdown_rx) => {
                    info!("Shutdown signal received, stopping Solana watcher");
                    return Ok(());
                }
            }
        }
    }

    /// Signatures newer than the cursor, newest first
    ///
    /// Without a cursor only the newest page is read; older history belongs
    /// to the startup backfill.
    async fn unseen_signatures(&self, mint: &str) -> Result<Vec<SignatureInfo>> {
        let cursor = self.cursor.lock().await.clone();
        let mut signatures = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let page = self
                .rpc
                .call("getSignaturesForAddress", || {
                    self.dest
                        .signatures_for_address(mint, before.as_deref(), self.scan_limit)
                })
                .await?;
            let page_len = page.len();

            let mut reached_cursor = false;
            for info in page {
                if cursor.as_deref() == Some(info.signature.as_str()) {
                    reached_cursor = true;
                    break;
                }
                signatures.push(info);
            }

            if reached_cursor || cursor.is_none() || page_len < self.scan_limit {
                break;
            }
            before = signatures.last().map(|info| info.signature.clone());
            debug!(collected = signatures.len(), "Paging back to the Solana cursor");
        }

        Ok(signatures)
    }

    /// Read mint signatures since the last poll; returns newly ingested burns
    pub async fn poll_once(&self) -> Result<usize> {
        let mint = self.dest.mint_address();
        let signatures = self.unseen_signatures(&mint).await?;
        if let Some(newest) = signatures.first() {
            metrics::set_latest_height("solana", newest.slot);
        }

        let mut fetched = Vec::new();
        let mut ingested = 0;
        let mut advanced_to = None;
        let mut gap = false;

        // oldest first so burns are ingested in chain order
        for info in signatures.iter().rev() {
            if self.seen.lock().await.contains(&info.signature) {
                if !gap {
                    advanced_to = Some(info.signature.clone());
                }
                continue;
            }
            if info.failed {
                self.seen.lock().await.insert(info.signature.clone());
                if !gap {
                    advanced_to = Some(info.signature.clone());
                }
                continue;
            }

            let tx = match self
                .rpc
                .call("getTransaction", || self.dest.transaction(&info.signature))
                .await
            {
                Ok(Some(tx)) => tx,
                Ok(None) => {
                    debug!(signature = %info.signature, "Transaction not yet available");
                    gap = true;
                    continue;
                }
                Err(e) => {
                    warn!(signature = %info.signature, error = %e, "Failed to fetch transaction");
                    gap = true;
                    continue;
                }
            };

            if let Some(event) = BridgeEvent::from_burn(&tx, EventSource::Watcher) {
                if event.recipient.is_none() {
                    warn!(
                        signature = %tx.signature,
                        amount = %event.amount,
                        "Burn carries no L1 recipient memo"
                    );
                }
                if self.registry.ingest(event).await == IngestOutcome::New {
                    ingested += 1;
                }
            }
            self.seen.lock().await.insert(info.signature.clone());
            if !gap {
                advanced_to = Some(info.signature.clone());
            }
            fetched.push(tx);
        }

        self.oracle.absorb(&fetched).await;
        // stays behind a transaction that could not be fetched, so it is read again
        if let Some(signature) = advanced_to {
            *self.cursor.lock().await = Some(signature);
        }
        metrics::record_successful_poll("solana");
        Ok(ingested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleConfig;
    use crate::retry::RetryPolicy;
    use crate::types::EventKey;
    use multichain_rs::testing::{MockDestinationChain, MockOriginChain};
    use multichain_rs::{bridge_memo, ChainError};

    struct Harness {
        dest: Arc<MockDestinationChain>,
        origin: Arc<MockOriginChain>,
        oracle: Arc<IdempotencyOracle>,
        registry: Arc<EventRegistry>,
        watcher: DestinationWatcher,
    }

    fn harness() -> Harness {
        let dest = Arc::new(MockDestinationChain::new());
        let origin = Arc::new(MockOriginChain::new(100));
        let registry = Arc::new(EventRegistry::new());
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(2),
            max_attempts: 1,
        };
        let rpc = RpcEndpoint::new("solana", policy.clone(), 2);
        let oracle = Arc::new(IdempotencyOracle::new(
            dest.clone(),
            origin.clone(),
            rpc.clone(),
            RpcEndpoint::new("l1", policy, 2),
            OracleConfig::default(),
        ));
        let config = SolanaConfig {
            rpc_url: "http://localhost:8899".into(),
            mint_address: dest.mint_address(),
            private_key: String::new(),
            poll_interval_ms: 10,
            burn_scan_limit: 100,
        };
        let watcher =
            DestinationWatcher::new(dest.clone(), rpc, oracle.clone(), registry.clone(), &config);
        Harness {
            dest,
            origin,
            oracle,
            registry,
            watcher,
        }
    }

    #[tokio::test]
    async fn test_ingests_burns_once_and_skips_failed() {
        let h = harness();
        let owner = MockDestinationChain::new_owner();
        let burn = h
            .dest
            .record_burn(&owner, 5, Some("l1:0x00000000000000000000000000000000000000aa"));
        h.dest.record_failed_burn(&owner, 9);
        h.dest.record_burn(&owner, 7, None);

        assert_eq!(h.watcher.poll_once().await.unwrap(), 2);
        assert_eq!(h.watcher.poll_once().await.unwrap(), 0);

        let event = h
            .registry
            .get(&EventKey::Burn { signature: burn })
            .await
            .unwrap();
        assert_eq!(
            event.recipient.as_deref(),
            Some("0x00000000000000000000000000000000000000aa")
        );
        assert_eq!(h.registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_indexes_mints_for_the_oracle() {
        let h = harness();
        let owner = MockDestinationChain::new_owner();
        h.dest
            .record_mint(&owner, 10, Some(&bridge_memo(3)), chrono::Utc::now().timestamp());

        h.watcher.poll_once().await.unwrap();

        let lock = h.origin.push_lock(3, &owner, 10 * 1_000_000_000, 1);
        let event = BridgeEvent::from_lock(&lock, EventSource::Backfill);
        assert!(h.oracle.check_lock_indexed(&event).await.is_some());
    }

    #[tokio::test]
    async fn test_failed_listing_is_retried_next_poll() {
        let h = harness();
        let owner = MockDestinationChain::new_owner();
        h.dest
            .record_burn(&owner, 5, Some("0x00000000000000000000000000000000000000aa"));

        h.dest.fail_next_reads(1, ChainError::RateLimited("429 Too Many Requests".into()));
        assert!(h.watcher.poll_once().await.is_err());
        assert!(h.registry.is_empty().await);

        assert_eq!(h.watcher.poll_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pages_back_when_burns_outrun_the_scan_limit() {
        let h = harness();
        let owner = MockDestinationChain::new_owner();
        let memo = Some("l1:0x00000000000000000000000000000000000000aa");

        h.dest.record_burn(&owner, 1, memo);
        assert_eq!(h.watcher.poll_once().await.unwrap(), 1);

        for _ in 0..250 {
            h.dest.record_burn(&owner, 1, memo);
        }
        assert_eq!(h.watcher.poll_once().await.unwrap(), 250);
        assert_eq!(h.watcher.poll_once().await.unwrap(), 0);
        assert_eq!(h.registry.len().await, 251);
    }

    #[tokio::test]
    async fn test_unfetched_transaction_holds_the_cursor() {
        let h = harness();
        let owner = MockDestinationChain::new_owner();
        let memo = Some("l1:0x00000000000000000000000000000000000000aa");

        h.dest.record_burn(&owner, 1, memo);
        assert_eq!(h.watcher.poll_once().await.unwrap(), 1);

        let stuck = h.dest.record_burn(&owner, 1, memo);
        for _ in 0..120 {
            h.dest.record_burn(&owner, 1, memo);
        }
        h.dest
            .fail_transaction_reads(&stuck, 1, ChainError::Transient("timeout".into()));
        assert_eq!(h.watcher.poll_once().await.unwrap(), 120);

        for _ in 0..120 {
            h.dest.record_burn(&owner, 1, memo);
        }
        assert_eq!(h.watcher.poll_once().await.unwrap(), 121);
        assert!(h
            .registry
            .get(&EventKey::Burn { signature: stuck })
            .await
            .is_some());
    }
}
