use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use multichain_rs::OriginChain;

use crate::config::L1Config;
use crate::metrics;
use crate::registry::{EventRegistry, IngestOutcome};
use crate::retry::RpcEndpoint;
use crate::shutdown::{self, ShutdownReceiver};
use crate::types::{BridgeEvent, EventSource};
use crate::watchers::block_ranges;

/// L1 watcher for `TokensLocked` events
pub struct L1Watcher {
    origin: Arc<dyn OriginChain>,
    rpc: RpcEndpoint,
    registry: Arc<EventRegistry>,
    poll_interval: Duration,
    lookback_blocks: u64,
    max_block_range: u64,
    /// Next block to scan; unset until the first poll
    cursor: Mutex<Option<u64>>,
}

impl L1Watcher {
    pub fn new(
        origin: Arc<dyn OriginChain>,
        rpc: RpcEndpoint,
        registry: Arc<EventRegistry>,
        config: &L1Config,
    ) -> Self {
        Self {
            origin,
            rpc,
            registry,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            lookback_blocks: config.lookback_blocks,
            max_block_range: config.max_block_range,
            cursor: Mutex::new(None),
        }
    }

    /// Run the watcher loop
    pub async fn run(&self, mut shutdown_rx: ShutdownReceiver) -> Result<()> {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            lookback_blocks = self.lookback_blocks,
            "L1 watcher starting"
        );

        loop {
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "L1 poll failed, retrying next interval");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown::requested(&mut shutdown_rx) => {
                    info!("Shutdown signal received, stopping L1 watcher");
                    return Ok(());
                }
            }
        }
    }

    /// Scan from the cursor to the current height; returns newly ingested locks
    pub async fn poll_once(&self) -> Result<usize> {
        let current = self
            .rpc
            .call("eth_blockNumber", || self.origin.current_height())
            .await?;
        metrics::set_latest_height("l1", current);

        let mut cursor = self.cursor.lock().await;
        let from = cursor.unwrap_or_else(|| current.saturating_sub(self.lookback_blocks));
        if from > current {
            return Ok(0);
        }

        let mut ingested = 0;
        for (start, end) in block_ranges(from, current, self.max_block_range) {
            let locks = self
                .rpc
                .call("eth_getLogs", || self.origin.lock_events(start, end))
                .await?;
            debug!(from_block = start, to_block = end, locks = locks.len(), "Scanned L1 blocks");

            for lock in &locks {
                let event = BridgeEvent::from_lock(lock, EventSource::Watcher);
                if self.registry.ingest(event).await == IngestOutcome::New {
                    ingested += 1;
                }
            }
            *cursor = Some(end + 1);
        }

        metrics::record_successful_poll("l1");
        Ok(ingested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use multichain_rs::testing::MockOriginChain;
    use multichain_rs::ChainError;

    fn config() -> L1Config {
        L1Config {
            rpc_url: "http://localhost:8545".into(),
            bridge_address: "0x0000000000000000000000000000000000000001".into(),
            private_key: String::new(),
            deploy_block: 0,
            poll_interval_ms: 10,
            lookback_blocks: 100,
            max_block_range: 50,
        }
    }

    fn watcher(origin: Arc<MockOriginChain>, registry: Arc<EventRegistry>) -> L1Watcher {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
            max_attempts: 1,
        };
        L1Watcher::new(origin, RpcEndpoint::new("l1", policy, 2), registry, &config())
    }

    #[tokio::test]
    async fn test_first_poll_looks_back_then_follows_head() {
        let origin = Arc::new(MockOriginChain::new(1000));
        let registry = Arc::new(EventRegistry::new());
        origin.push_lock(1, "r", 5, 850);
        origin.push_lock(2, "r", 5, 950);
        let watcher = watcher(origin.clone(), registry.clone());

        // 850 is outside the 100-block lookback
        assert_eq!(watcher.poll_once().await.unwrap(), 1);

        origin.push_lock(3, "r", 5, 1001);
        origin.set_height(1005);
        assert_eq!(watcher.poll_once().await.unwrap(), 1);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_failed_poll_skips_nothing() {
        let origin = Arc::new(MockOriginChain::new(1000));
        let registry = Arc::new(EventRegistry::new());
        origin.push_lock(1, "r", 5, 990);
        let watcher = watcher(origin.clone(), registry.clone());

        origin.fail_next_reads(1, ChainError::Transient("timeout".into()));
        assert!(watcher.poll_once().await.is_err());
        assert!(registry.is_empty().await);
        assert_eq!(watcher.poll_once().await.unwrap(), 1);
    }
}
