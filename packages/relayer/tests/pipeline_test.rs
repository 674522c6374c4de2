//! Pipeline tests for the bridge relayer
//!
//! Drive watchers, backfill, confirmation and settlement against the
//! in-memory chains from `multichain-rs`.
//!
//! Run with: cargo test --test pipeline_test -- --nocapture
//!
//! The live test at the bottom is ignored by default and needs a funded
//! devnet setup (see `LiveConfig::from_env`).

use std::sync::Arc;
use std::time::Duration;

use multichain_rs::testing::assertions::{assert_single_mint, assert_single_unlock};
use multichain_rs::testing::{MockDestinationChain, MockOriginChain};
use multichain_rs::{bridge_memo, DestinationChain as _};

use relayer::backfill::BackfillScanner;
use relayer::config::{ConfirmationSettings, L1Config, SettlementSettings, SolanaConfig};
use relayer::confirmation::ConfirmationTracker;
use relayer::oracle::{IdempotencyOracle, OracleConfig};
use relayer::registry::EventRegistry;
use relayer::retry::{RetryPolicy, RpcEndpoint};
use relayer::settlement::{MintWorker, SettlementRunner, SettlementWorker, UnlockWorker};
use relayer::shutdown;
use relayer::types::{BridgeEvent, BridgeStatus, EventKey, EventSource, EvidenceKind, FailureReason};
use relayer::watchers::{DestinationWatcher, L1Watcher};

/// One whole token on L1 (18 decimals)
const L1_TOKEN: u128 = 1_000_000_000_000_000_000;
/// One whole token on Solana (9 decimals)
const DEST_TOKEN: u64 = 1_000_000_000;
const FINALITY: u64 = 30;
const L1_RECIPIENT: &str = "0x00000000000000000000000000000000000000aa";

mod helpers {
    use super::*;
    use multichain_rs::DestinationChain as _;

    pub fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
            max_attempts: 3,
        }
    }

    /// A relayer process wired to shared chains; dropping it is a crash
    pub struct Relayer {
        pub registry: Arc<EventRegistry>,
        pub oracle: Arc<IdempotencyOracle>,
        pub l1_watcher: L1Watcher,
        pub dest_watcher: DestinationWatcher,
        pub tracker: ConfirmationTracker,
        pub runner: SettlementRunner,
        pub backfill: BackfillScanner,
    }

    impl Relayer {
        pub fn new(origin: Arc<MockOriginChain>, dest: Arc<MockDestinationChain>) -> Self {
            let l1_rpc = RpcEndpoint::new("l1", fast_policy(), 8);
            let solana_rpc = RpcEndpoint::new("solana", fast_policy(), 8);
            let registry = Arc::new(EventRegistry::new());
            let oracle = Arc::new(IdempotencyOracle::new(
                dest.clone(),
                origin.clone(),
                solana_rpc.clone(),
                l1_rpc.clone(),
                OracleConfig::default(),
            ));

            let l1_config = L1Config {
                rpc_url: "http://localhost:8545".into(),
                bridge_address: "0x0000000000000000000000000000000000000001".into(),
                private_key: String::new(),
                deploy_block: 0,
                poll_interval_ms: 10,
                lookback_blocks: 200,
                max_block_range: 100,
            };
            let solana_config = SolanaConfig {
                rpc_url: "http://localhost:8899".into(),
                mint_address: dest.mint_address(),
                private_key: String::new(),
                poll_interval_ms: 10,
                burn_scan_limit: 100,
            };
            let confirmation = ConfirmationSettings {
                finality_blocks: FINALITY,
                poll_interval_ms: 10,
                timeout_secs: 3600,
            };
            let settlement = SettlementSettings {
                interval_ms: 10,
                concurrency: 4,
                resubmit_grace_secs: 120,
                circuit_breaker_threshold: 10,
                circuit_breaker_pause_secs: 60,
                summary_interval_secs: 60,
            };

            let workers: Vec<Arc<dyn SettlementWorker>> = vec![
                Arc::new(MintWorker::new(
                    dest.clone(),
                    solana_rpc.clone(),
                    oracle.clone(),
                    registry.clone(),
                    Duration::from_secs(settlement.resubmit_grace_secs),
                )),
                Arc::new(UnlockWorker::new(origin.clone(), l1_rpc.clone(), oracle.clone())),
            ];

            Self {
                l1_watcher: L1Watcher::new(origin.clone(), l1_rpc.clone(), registry.clone(), &l1_config),
                dest_watcher: DestinationWatcher::new(
                    dest,
                    solana_rpc,
                    oracle.clone(),
                    registry.clone(),
                    &solana_config,
                ),
                tracker: ConfirmationTracker::new(
                    origin.clone(),
                    l1_rpc.clone(),
                    oracle.clone(),
                    registry.clone(),
                    &confirmation,
                ),
                runner: SettlementRunner::new(registry.clone(), workers, fast_policy(), &settlement),
                backfill: BackfillScanner::new(
                    origin,
                    l1_rpc,
                    oracle.clone(),
                    registry.clone(),
                    l1_config.deploy_block,
                    l1_config.max_block_range,
                ),
                registry,
                oracle,
            }
        }

        /// One pass of every live loop, in pipeline order
        pub async fn step(&self) {
            self.l1_watcher.poll_once().await.unwrap();
            self.dest_watcher.poll_once().await.unwrap();
            self.tracker.tick().await.unwrap();
            self.runner.tick().await;
        }

        pub async fn status(&self, key: EventKey) -> BridgeStatus {
            self.registry.get(&key).await.unwrap().status
        }
    }
}

use helpers::Relayer;

fn lock_key(bridge_id: u64) -> EventKey {
    EventKey::Lock { bridge_id }
}

#[tokio::test]
async fn test_end_to_end_lock_to_mint() {
    let origin = Arc::new(MockOriginChain::new(1000));
    let dest = Arc::new(MockDestinationChain::new());
    let owner = MockDestinationChain::new_owner();
    origin.push_lock(42, &owner, 500 * L1_TOKEN, 1000);

    let relayer = Relayer::new(origin.clone(), dest.clone());
    relayer.step().await;
    assert_eq!(relayer.status(lock_key(42)).await, BridgeStatus::Confirming);
    assert_eq!(dest.mint_count(), 0);

    origin.set_height(1030);
    relayer.step().await;
    assert_eq!(relayer.status(lock_key(42)).await, BridgeStatus::Settled);

    let minted = assert_single_mint(&dest, &owner, 42).unwrap();
    assert_eq!(minted, 500 * DEST_TOKEN);
    let mints = dest.mints_to(&owner);
    assert_eq!(mints[0].memos, vec![bridge_memo(42)]);

    // the same lock seen again by backfill settles nothing new
    let (_tx, rx) = shutdown::channel();
    let report = relayer.backfill.run(rx).await.unwrap();
    assert_eq!(report.duplicates, 1);
    relayer.step().await;
    assert_single_mint(&dest, &owner, 42).unwrap();
    assert_eq!(dest.mint_count(), 1);
}

#[tokio::test]
async fn test_confirmation_gating_at_threshold() {
    let origin = Arc::new(MockOriginChain::new(1000));
    let dest = Arc::new(MockDestinationChain::new());
    let owner = MockDestinationChain::new_owner();
    origin.push_lock(7, &owner, L1_TOKEN, 1000);
    let relayer = Relayer::new(origin.clone(), dest.clone());

    origin.set_height(1000 + FINALITY - 1);
    relayer.step().await;
    relayer.step().await;
    assert_eq!(relayer.status(lock_key(7)).await, BridgeStatus::Confirming);
    assert_eq!(dest.mint_count(), 0);

    origin.set_height(1000 + FINALITY);
    relayer.step().await;
    assert_eq!(relayer.status(lock_key(7)).await, BridgeStatus::Settled);
    assert_eq!(dest.mint_count(), 1);
}

#[tokio::test]
async fn test_concurrent_duplicates_settle_once() {
    let origin = Arc::new(MockOriginChain::new(2000));
    let dest = Arc::new(MockDestinationChain::new().with_submit_latency(Duration::from_millis(20)));
    let owner = MockDestinationChain::new_owner();
    let lock = origin.push_lock(9, &owner, 3 * L1_TOKEN, 1950);
    let relayer = Relayer::new(origin.clone(), dest.clone());

    // watcher and backfill race on the same lock
    let (_tx, rx) = shutdown::channel();
    let (watched, backfilled) = tokio::join!(relayer.l1_watcher.poll_once(), relayer.backfill.run(rx));
    watched.unwrap();
    backfilled.unwrap();
    relayer
        .registry
        .ingest(BridgeEvent::from_lock(&lock, EventSource::Watcher))
        .await;
    assert_eq!(relayer.registry.len().await, 1);

    relayer.tracker.tick().await.unwrap();
    let (first, second) = tokio::join!(relayer.runner.tick(), relayer.runner.tick());
    assert_eq!(first.dispatched + second.dispatched, 1);

    relayer.step().await;
    assert_eq!(relayer.status(lock_key(9)).await, BridgeStatus::Settled);
    assert_single_mint(&dest, &owner, 9).unwrap();
    assert_eq!(dest.mint_count(), 1);
}

#[tokio::test]
async fn test_restart_settles_only_the_remainder() {
    const TOTAL: u64 = 6;
    const SETTLED_BEFORE_CRASH: u64 = 4;

    let origin = Arc::new(MockOriginChain::new(1100));
    let dest = Arc::new(MockDestinationChain::new());
    let owners: Vec<String> = (0..TOTAL).map(|_| MockDestinationChain::new_owner()).collect();

    // the first N are final before the crash, the rest are not
    for id in 1..=TOTAL {
        let block = if id <= SETTLED_BEFORE_CRASH { 1000 + id } else { 1090 + id };
        origin.push_lock(id, &owners[(id - 1) as usize], L1_TOKEN, block);
    }

    let first = Relayer::new(origin.clone(), dest.clone());
    first.step().await;
    first.step().await;
    assert_eq!(dest.mint_count(), SETTLED_BEFORE_CRASH as usize);
    drop(first);

    origin.set_height(1200);
    let restarted = Relayer::new(origin.clone(), dest.clone());
    let (_tx, rx) = shutdown::channel();
    let report = restarted.backfill.run(rx).await.unwrap();
    assert_eq!(report.locks_scanned, TOTAL as usize);
    assert_eq!(report.locks_settled, SETTLED_BEFORE_CRASH as usize);
    assert_eq!(report.locks_pending, (TOTAL - SETTLED_BEFORE_CRASH) as usize);

    restarted.step().await;
    restarted.step().await;

    assert_eq!(dest.mint_count(), TOTAL as usize);
    for id in 1..=TOTAL {
        assert_single_mint(&dest, &owners[(id - 1) as usize], id).unwrap();
        assert_eq!(restarted.status(lock_key(id)).await, BridgeStatus::Settled);
    }

    let backfilled = restarted.registry.get(&lock_key(1)).await.unwrap();
    assert_eq!(
        backfilled.evidence.map(|e| e.kind),
        Some(EvidenceKind::MemoTagged)
    );
}

#[tokio::test]
async fn test_burn_unlocks_once() {
    let origin = Arc::new(MockOriginChain::new(500));
    let dest = Arc::new(MockDestinationChain::new());
    let owner = MockDestinationChain::new_owner();
    let memo = format!("l1:{}", L1_RECIPIENT);
    let signature = dest.record_burn(&owner, 2 * DEST_TOKEN, Some(&memo));

    let relayer = Relayer::new(origin.clone(), dest.clone());
    relayer.step().await;
    relayer.step().await;

    let key = EventKey::Burn {
        signature: signature.clone(),
    };
    assert_eq!(relayer.status(key).await, BridgeStatus::Settled);
    let unlocked = assert_single_unlock(&origin, &signature).unwrap();
    assert_eq!(unlocked, 2 * L1_TOKEN);

    // a fresh process sees the contract flag and does nothing
    let restarted = Relayer::new(origin.clone(), dest.clone());
    let (_tx, rx) = shutdown::channel();
    let report = restarted.backfill.run(rx).await.unwrap();
    assert_eq!(report.burns_settled, 1);
    restarted.step().await;
    assert_eq!(origin.unlock_count(), 1);
}

#[tokio::test]
async fn test_burn_without_recipient_fails() {
    let origin = Arc::new(MockOriginChain::new(500));
    let dest = Arc::new(MockDestinationChain::new());
    let owner = MockDestinationChain::new_owner();
    let signature = dest.record_burn(&owner, DEST_TOKEN, None);

    let relayer = Relayer::new(origin.clone(), dest);
    relayer.step().await;
    relayer.step().await;

    let event = relayer
        .registry
        .get(&EventKey::Burn { signature })
        .await
        .unwrap();
    assert_eq!(event.status, BridgeStatus::Failed);
    assert!(matches!(event.failure, Some(FailureReason::RecipientInvalid(_))));
    assert_eq!(origin.unlock_count(), 0);
}

#[tokio::test]
async fn test_pre_existing_mint_is_not_repeated() {
    let origin = Arc::new(MockOriginChain::new(1100));
    let dest = Arc::new(MockDestinationChain::new());
    let owner = MockDestinationChain::new_owner();
    origin.push_lock(5, &owner, 4 * L1_TOKEN, 1000);
    dest.record_mint(&owner, 4 * DEST_TOKEN, Some(&bridge_memo(5)), chrono::Utc::now().timestamp());

    // no backfill: the live path alone must find the mint
    let relayer = Relayer::new(origin.clone(), dest.clone());
    relayer.step().await;

    let event = relayer.registry.get(&lock_key(5)).await.unwrap();
    assert_eq!(event.status, BridgeStatus::Settled);
    assert_eq!(dest.mint_count(), 1);
    assert!(relayer.oracle.cache_len().await >= 1);
}

mod live {
    use super::*;
    use multichain_rs::evm::{EvmBridgeClient, EvmBridgeConfig};
    use multichain_rs::solana::{SolanaMintClient, SolanaMintConfig};
    use multichain_rs::{DestinationChain, OriginChain};

    /// Live endpoints, read from the environment
    pub struct LiveConfig {
        pub l1_rpc_url: String,
        pub bridge_address: String,
        pub relayer_private_key: String,
        pub solana_rpc_url: String,
        pub mint_address: String,
        pub solana_private_key: String,
    }

    impl LiveConfig {
        pub fn from_env() -> Option<Self> {
            Some(LiveConfig {
                l1_rpc_url: std::env::var("L1_RPC_URL").ok()?,
                bridge_address: std::env::var("BRIDGE_CONTRACT_ADDRESS").ok()?,
                relayer_private_key: std::env::var("RELAYER_PRIVATE_KEY").ok()?,
                solana_rpc_url: std::env::var("SOLANA_RPC_URL").ok()?,
                mint_address: std::env::var("MARS_MINT_ADDRESS").ok()?,
                solana_private_key: std::env::var("SOLANA_PRIVATE_KEY").ok()?,
            })
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_chains_reachable() {
        let config = LiveConfig::from_env().expect(
            "Set L1_RPC_URL, BRIDGE_CONTRACT_ADDRESS, RELAYER_PRIVATE_KEY, \
             SOLANA_RPC_URL, MARS_MINT_ADDRESS and SOLANA_PRIVATE_KEY",
        );

        let l1 = EvmBridgeClient::new(&EvmBridgeConfig {
            rpc_url: config.l1_rpc_url,
            bridge_address: config.bridge_address,
            private_key: config.relayer_private_key,
        })
        .unwrap();
        let solana = SolanaMintClient::new(&SolanaMintConfig {
            rpc_url: config.solana_rpc_url,
            mint_address: config.mint_address,
            keypair: config.solana_private_key,
        })
        .unwrap();

        let rpc = RpcEndpoint::new("live", helpers::fast_policy(), 2);
        let height = rpc.call("eth_blockNumber", || l1.current_height()).await.unwrap();
        let count = rpc.call("bridgeCount", || l1.bridge_count()).await.unwrap();
        let slot = rpc.call("getSlot", || solana.current_slot()).await.unwrap();
        println!("L1 height {}, {} locks, Solana slot {}", height, count, slot);
        assert!(height > 0);
        assert!(slot > 0);
    }
}
