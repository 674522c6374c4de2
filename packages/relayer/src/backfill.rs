//! Startup backfill
//!
//! Rebuilds the registry from chain history: every lock since the bridge
//! deployment and every transaction of the bridge mint. Events already
//! settled on chain are registered as SETTLED; the rest enter the normal
//! confirmation path. This is what makes a restart from empty state safe.
//!
//! A pass that could not read everything is rerun with backoff until one
//! does.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::Result;
use tracing::{debug, info, warn};

use multichain_rs::{DestTransaction, OriginChain};

use crate::metrics;
use crate::oracle::IdempotencyOracle;
use crate::registry::{EventRegistry, IngestOutcome};
use crate::retry::RpcEndpoint;
use crate::shutdown::{self, ShutdownReceiver};
use crate::types::{BridgeEvent, BridgeStatus, EventSource};
use crate::watchers::block_ranges;

/// What one backfill pass found
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub locks_scanned: usize,
    pub locks_settled: usize,
    pub locks_pending: usize,
    pub burns_scanned: usize,
    pub burns_settled: usize,
    pub burns_pending: usize,
    /// Already known from a live watcher or an earlier pass
    pub duplicates: usize,
    /// Reads that still failed after retries: the mint listing, single
    /// transactions, the L1 height, L1 block ranges
    pub failed_reads: usize,
    pub interrupted: bool,
    /// Passes run, including the last one
    pub passes: u32,
    pub elapsed: Duration,
}

impl BackfillReport {
    /// Every part of history was read
    pub fn is_complete(&self) -> bool {
        !self.interrupted && self.failed_reads == 0
    }
}

pub struct BackfillScanner {
    origin: Arc<dyn OriginChain>,
    l1_rpc: RpcEndpoint,
    oracle: Arc<IdempotencyOracle>,
    registry: Arc<EventRegistry>,
    deploy_block: u64,
    max_block_range: u64,
}

impl BackfillScanner {
    pub fn new(
        origin: Arc<dyn OriginChain>,
        l1_rpc: RpcEndpoint,
        oracle: Arc<IdempotencyOracle>,
        registry: Arc<EventRegistry>,
        deploy_block: u64,
        max_block_range: u64,
    ) -> Self {
        Self {
            origin,
            l1_rpc,
            oracle,
            registry,
            deploy_block,
            max_block_range,
        }
    }

    /// Repeat backfill passes, backing off between them, until one reads all
    /// of history or shutdown is requested
    pub async fn run(&self, mut shutdown_rx: ShutdownReceiver) -> Result<BackfillReport> {
        let started = Instant::now();
        let policy = self.l1_rpc.policy();
        info!(
            deploy_block = self.deploy_block,
            strategy = %self.oracle.strategy(),
            "Backfill starting"
        );

        let mut passes: u32 = 0;
        loop {
            let mut report = self.pass(&shutdown_rx).await;
            passes += 1;
            report.passes = passes;
            report.elapsed = started.elapsed();

            if report.is_complete() || report.interrupted {
                info!(
                    locks_scanned = report.locks_scanned,
                    locks_settled = report.locks_settled,
                    locks_pending = report.locks_pending,
                    burns_scanned = report.burns_scanned,
                    burns_settled = report.burns_settled,
                    burns_pending = report.burns_pending,
                    duplicates = report.duplicates,
                    interrupted = report.interrupted,
                    passes,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Backfill complete"
                );
                return Ok(report);
            }

            let backoff = policy.backoff_for_attempt(passes - 1);
            warn!(
                endpoint = self.l1_rpc.name(),
                failed_reads = report.failed_reads,
                passes,
                ?backoff,
                "Backfill incomplete, rerunning after backoff"
            );
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown::requested(&mut shutdown_rx) => {
                    report.interrupted = true;
                    return Ok(report);
                }
            }
        }
    }

    /// One pass over mint history and L1 locks
    ///
    /// Read failures are counted, never fatal: a failed mint scan still lets
    /// the lock pass run, and its indexed misses fall through to the full
    /// check when the event is settled.
    async fn pass(&self, shutdown_rx: &ShutdownReceiver) -> BackfillReport {
        let mut report = BackfillReport::default();

        // mint history first, so lock lookups below hit a warm index
        match self.oracle.scan_mint_history().await {
            Ok(history) => {
                report.failed_reads += history.skipped.len();
                self.ingest_burns(&history.transactions, shutdown_rx, &mut report)
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "Mint history unavailable, scanning locks without it");
                report.failed_reads += 1;
            }
        }

        if !report.interrupted {
            self.ingest_locks(shutdown_rx, &mut report).await;
        }
        report
    }

    async fn ingest_burns(
        &self,
        history: &[DestTransaction],
        shutdown_rx: &ShutdownReceiver,
        report: &mut BackfillReport,
    ) {
        for tx in history {
            if shutdown::is_requested(shutdown_rx) {
                report.interrupted = true;
                return;
            }
            let Some(mut event) = BridgeEvent::from_burn(tx, EventSource::Backfill) else {
                continue;
            };
            report.burns_scanned += 1;

            match self.oracle.check_burn(&event).await {
                Ok(Some(evidence)) => {
                    event.status = BridgeStatus::Settled;
                    event.evidence = Some(evidence);
                    report.burns_settled += 1;
                }
                Ok(None) => report.burns_pending += 1,
                Err(e) => {
                    warn!(signature = %tx.signature, error = %e, "Burn status unknown, leaving for the tracker");
                    report.burns_pending += 1;
                }
            }
            self.ingest(event, report).await;
        }
    }

    async fn ingest_locks(&self, shutdown_rx: &ShutdownReceiver, report: &mut BackfillReport) {
        let current = match self
            .l1_rpc
            .call("eth_blockNumber", || self.origin.current_height())
            .await
        {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "L1 height unavailable, skipping lock scan");
                report.failed_reads += 1;
                return;
            }
        };
        metrics::set_latest_height("l1", current);

        for (start, end) in block_ranges(self.deploy_block, current, self.max_block_range) {
            if shutdown::is_requested(shutdown_rx) {
                report.interrupted = true;
                return;
            }
            let locks = match self
                .l1_rpc
                .call("eth_getLogs", || self.origin.lock_events(start, end))
                .await
            {
                Ok(locks) => locks,
                Err(e) => {
                    warn!(from_block = start, to_block = end, error = %e, "Skipping unreadable L1 block range");
                    report.failed_reads += 1;
                    continue;
                }
            };
            debug!(from_block = start, to_block = end, locks = locks.len(), "Backfill scanned L1 blocks");

            for lock in &locks {
                report.locks_scanned += 1;
                let mut event = BridgeEvent::from_lock(lock, EventSource::Backfill);
                match self.oracle.check_lock_indexed(&event).await {
                    Some(evidence) => {
                        event.status = BridgeStatus::Settled;
                        event.evidence = Some(evidence);
                        report.locks_settled += 1;
                    }
                    None => report.locks_pending += 1,
                }
                self.ingest(event, report).await;
            }
        }
    }

    async fn ingest(&self, event: BridgeEvent, report: &mut BackfillReport) {
        if let IngestOutcome::Duplicate(_) = self.registry.ingest(event).await {
            report.duplicates += 1;
        }
    }
}
