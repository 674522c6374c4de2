//! Confirmation tracker
//!
//! Locks wait for `finality_blocks` confirmations on L1 before they may be
//! settled. Each tick re-reads the lock receipt, so a reorg that moves the
//! lock into another block restarts the count from the new block.
//!
//! Burns need no depth check here; they are confirmed once the L1 contract
//! has answered whether the burn was already unlocked.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eyre::Result;
use tracing::{debug, error, info, warn};

use multichain_rs::OriginChain;

use crate::config::ConfirmationSettings;
use crate::metrics;
use crate::oracle::IdempotencyOracle;
use crate::registry::EventRegistry;
use crate::retry::RpcEndpoint;
use crate::shutdown::{self, ShutdownReceiver};
use crate::types::{BridgeEvent, BridgeStatus, Direction, FailureReason};

/// Where a lock stands against the finality threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationCheck {
    /// No receipt yet
    NotMined,
    Confirming { confirmations: u64 },
    Confirmed { confirmations: u64 },
    TimedOut,
}

/// Classify a lock given its receipt block and the current height
pub fn evaluate(
    receipt_block: Option<u64>,
    current_height: u64,
    finality_blocks: u64,
    elapsed: Duration,
    timeout: Duration,
) -> ConfirmationCheck {
    let confirmations = receipt_block.map(|block| current_height.saturating_sub(block));

    match confirmations {
        Some(c) if c >= finality_blocks => ConfirmationCheck::Confirmed { confirmations: c },
        _ if elapsed > timeout => ConfirmationCheck::TimedOut,
        Some(c) => ConfirmationCheck::Confirming { confirmations: c },
        None => ConfirmationCheck::NotMined,
    }
}

/// Counts from one tracker pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub confirmed: usize,
    pub confirming: usize,
    pub pending: usize,
    pub timed_out: usize,
    pub settled: usize,
}

pub struct ConfirmationTracker {
    origin: Arc<dyn OriginChain>,
    rpc: RpcEndpoint,
    oracle: Arc<IdempotencyOracle>,
    registry: Arc<EventRegistry>,
    finality_blocks: u64,
    poll_interval: Duration,
    timeout: Duration,
}

impl ConfirmationTracker {
    pub fn new(
        origin: Arc<dyn OriginChain>,
        rpc: RpcEndpoint,
        oracle: Arc<IdempotencyOracle>,
        registry: Arc<EventRegistry>,
        settings: &ConfirmationSettings,
    ) -> Self {
        Self {
            origin,
            rpc,
            oracle,
            registry,
            finality_blocks: settings.finality_blocks,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    pub async fn run(&self, mut shutdown_rx: ShutdownReceiver) -> Result<()> {
        info!(
            finality_blocks = self.finality_blocks,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            timeout_secs = self.timeout.as_secs(),
            "Confirmation tracker starting"
        );

        loop {
            if let Err(e) = self.tick().await {
                warn!(error = %e, "Confirmation tick failed, retrying next interval");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown::requested(&mut shutdown_rx) => {
                    info!("Shutdown signal received, stopping confirmation tracker");
                    return Ok(());
                }
            }
        }
    }

    /// One pass over every unconfirmed event
    pub async fn tick(&self) -> Result<TickSummary> {
        let mut summary = TickSummary::default();

        let burns = self
            .registry
            .with_status(&[BridgeStatus::Detected], Some(Direction::DestToL1))
            .await;
        for burn in &burns {
            self.check_burn(burn, &mut summary).await;
        }

        let locks = self
            .registry
            .with_status(
                &[BridgeStatus::Detected, BridgeStatus::Confirming],
                Some(Direction::L1ToDest),
            )
            .await;
        if locks.is_empty() {
            return Ok(summary);
        }

        let current = self
            .rpc
            .call("eth_blockNumber", || self.origin.current_height())
            .await?;
        metrics::set_latest_height("l1", current);

        for lock in &locks {
            self.check_lock(lock, current, &mut summary).await;
        }

        if summary != TickSummary::default() {
            debug!(
                current_height = current,
                confirmed = summary.confirmed,
                confirming = summary.confirming,
                pending = summary.pending,
                timed_out = summary.timed_out,
                "Confirmation pass complete"
            );
        }
        Ok(summary)
    }

    async fn check_lock(&self, event: &BridgeEvent, current: u64, summary: &mut TickSummary) {
        let key = event.key();
        let receipt_block = match self
            .rpc
            .call("eth_getTransactionReceipt", || {
                self.origin.transaction_block(&event.source_tx_id)
            })
            .await
        {
            Ok(block) => block,
            Err(e) => {
                warn!(event = %key, error = %e, "Receipt lookup failed");
                return;
            }
        };

        let origin_height = match receipt_block {
            Some(block) if block != event.origin_height => {
                warn!(
                    event = %key,
                    tx = %event.source_tx_id,
                    recorded = event.origin_height,
                    observed = block,
                    "Lock moved to a different block (reorg), restarting confirmation count"
                );
                block
            }
            _ => event.origin_height,
        };

        let elapsed = (Utc::now() - event.detected_at).to_std().unwrap_or_default();
        let check = evaluate(
            receipt_block,
            current,
            self.finality_blocks,
            elapsed,
            self.timeout,
        );

        match check {
            ConfirmationCheck::Confirmed { confirmations } => {
                summary.confirmed += 1;
                self.registry
                    .transition(&key, BridgeStatus::Confirmed, |e| {
                        e.origin_height = origin_height;
                        e.confirmations = confirmations;
                    })
                    .await;
            }
            ConfirmationCheck::Confirming { confirmations } => {
                summary.confirming += 1;
                self.registry
                    .transition(&key, BridgeStatus::Confirming, |e| {
                        e.origin_height = origin_height;
                        e.confirmations = confirmations;
                    })
                    .await;
            }
            ConfirmationCheck::NotMined => {
                summary.pending += 1;
                if event.status != BridgeStatus::Detected {
                    warn!(event = %key, tx = %event.source_tx_id, "Lock receipt disappeared");
                }
                self.registry
                    .transition(&key, BridgeStatus::Detected, |e| e.confirmations = 0)
                    .await;
            }
            ConfirmationCheck::TimedOut => {
                summary.timed_out += 1;
                error!(
                    event = %key,
                    tx = %event.source_tx_id,
                    elapsed_secs = elapsed.as_secs(),
                    confirmations = event.confirmations,
                    "Lock not confirmed within timeout"
                );
                self.registry
                    .transition(&key, BridgeStatus::Failed, |e| {
                        e.failure = Some(FailureReason::ConfirmationTimeout(self.timeout.as_secs()));
                    })
                    .await;
            }
        }
    }

    async fn check_burn(&self, event: &BridgeEvent, summary: &mut TickSummary) {
        let key = event.key();
        match self.oracle.check_burn(event).await {
            Ok(Some(evidence)) => {
                summary.settled += 1;
                info!(event = %key, "Burn already unlocked on L1");
                self.registry
                    .transition(&key, BridgeStatus::Settled, |e| e.evidence = Some(evidence))
                    .await;
            }
            Ok(None) => {
                summary.confirmed += 1;
                self.registry
                    .transition(&key, BridgeStatus::Confirmed, |_| {})
                    .await;
            }
            Err(e) => {
                warn!(event = %key, error = %e, "Burn status lookup failed");
            }
        }
    }
}
