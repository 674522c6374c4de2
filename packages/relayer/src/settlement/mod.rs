//! Settlement of confirmed bridge events
//!
//! The [`SettlementRunner`] claims CONFIRMED events and hands each to the
//! worker for its direction:
//! - L1 lock → Solana mint: [`MintWorker`]
//! - Solana burn → L1 unlock: [`UnlockWorker`]
//!
//! A failed attempt never blocks other events. Deferred events return to
//! CONFIRMED with a per-event backoff, and a run of deferrals in one
//! direction trips that direction's circuit breaker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SettlementSettings;
use crate::metrics;
use crate::registry::EventRegistry;
use crate::retry::RetryPolicy;
use crate::shutdown::{self, ShutdownReceiver};
use crate::types::{
    BridgeEvent, BridgeStatus, Direction, EventKey, FailureReason, PendingSubmission,
    SettlementEvidence,
};

pub mod mint;
pub mod unlock;

pub use mint::MintWorker;
pub use unlock::UnlockWorker;

/// Result of one settlement attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Settled by this attempt
    Settled(SettlementEvidence),
    /// Found already settled on chain; nothing submitted
    AlreadySettled(SettlementEvidence),
    /// Try again later
    Deferred {
        reason: String,
        pending_tx: Option<PendingSubmission>,
    },
    Failed(FailureReason),
}

impl SettlementOutcome {
    pub fn deferred(reason: impl Into<String>) -> Self {
        SettlementOutcome::Deferred {
            reason: reason.into(),
            pending_tx: None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SettlementOutcome::Settled(_) => "settled",
            SettlementOutcome::AlreadySettled(_) => "already_settled",
            SettlementOutcome::Deferred { .. } => "deferred",
            SettlementOutcome::Failed(_) => "failed",
        }
    }
}

/// Settles events of one direction
#[async_trait]
pub trait SettlementWorker: Send + Sync {
    fn direction(&self) -> Direction;

    /// Drive one claimed event as far as possible
    ///
    /// Must be safe to call again for the same event after any outcome other
    /// than `Settled`/`AlreadySettled`/`Failed`.
    async fn settle(&self, event: &BridgeEvent) -> SettlementOutcome;
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive deferrals before pausing
    pub threshold: u32,
    /// How long to pause when the breaker trips
    pub pause_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            pause_duration: Duration::from_secs(60),
        }
    }
}

/// Pauses dispatch for a direction after repeated deferrals
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    consecutive: u32,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            consecutive: 0,
            open_until: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open_until.map_or(false, |until| Instant::now() < until)
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Returns true when this deferral tripped the breaker
    pub fn record_deferral(&mut self) -> bool {
        self.consecutive += 1;
        if self.consecutive >= self.config.threshold && !self.is_open() {
            self.open_until = Some(Instant::now() + self.config.pause_duration);
            self.consecutive = 0;
            return true;
        }
        false
    }

    pub fn record_progress(&mut self) {
        self.consecutive = 0;
        self.open_until = None;
    }
}

/// Counts from one dispatch pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub settled: usize,
    pub already_settled: usize,
    pub deferred: usize,
    pub failed: usize,
}

pub struct SettlementRunner {
    registry: Arc<EventRegistry>,
    workers: HashMap<Direction, Arc<dyn SettlementWorker>>,
    event_backoff: RetryPolicy,
    interval: Duration,
    summary_interval: Duration,
    permits: Arc<Semaphore>,
    breakers: Mutex<HashMap<Direction, CircuitBreaker>>,
}

impl SettlementRunner {
    pub fn new(
        registry: Arc<EventRegistry>,
        workers: Vec<Arc<dyn SettlementWorker>>,
        event_backoff: RetryPolicy,
        settings: &SettlementSettings,
    ) -> Self {
        let breaker_config = CircuitBreakerConfig {
            threshold: settings.circuit_breaker_threshold,
            pause_duration: Duration::from_secs(settings.circuit_breaker_pause_secs),
        };
        let workers: HashMap<Direction, Arc<dyn SettlementWorker>> =
            workers.into_iter().map(|w| (w.direction(), w)).collect();
        let breakers = workers
            .keys()
            .map(|d| (*d, CircuitBreaker::new(breaker_config.clone())))
            .collect();

        Self {
            registry,
            workers,
            event_backoff,
            interval: Duration::from_millis(settings.interval_ms),
            summary_interval: Duration::from_secs(settings.summary_interval_secs),
            permits: Arc::new(Semaphore::new(settings.concurrency.max(1))),
            breakers: Mutex::new(breakers),
        }
    }

    /// Dispatch until shutdown; in-flight settlements finish before returning
    pub async fn run(&self, mut shutdown_rx: ShutdownReceiver) -> Result<()> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            concurrency = self.permits.available_permits(),
            "Settlement runner starting"
        );
        let mut last_summary = Instant::now();

        loop {
            if shutdown::is_requested(&shutdown_rx) {
                break;
            }

            let report = self.tick().await;
            if report.dispatched > 0 {
                info!(
                    dispatched = report.dispatched,
                    settled = report.settled,
                    already_settled = report.already_settled,
                    deferred = report.deferred,
                    failed = report.failed,
                    "Settlement pass complete"
                );
            }

            if last_summary.elapsed() >= self.summary_interval {
                self.registry.log_summary().await;
                let paused = self.paused_directions().await;
                if !paused.is_empty() {
                    warn!(paused = ?paused, "Settlement paused by circuit breaker");
                }
                last_summary = Instant::now();
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown::requested(&mut shutdown_rx) => break,
            }
        }

        info!("Shutdown signal received, settlement runner stopped");
        self.registry.log_summary().await;
        Ok(())
    }

    /// Claim every ready CONFIRMED event and wait for all of them
    pub async fn tick(&self) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut tasks: JoinSet<(EventKey, Direction, SettlementOutcome)> = JoinSet::new();
        let mut claimed = Vec::new();

        for (direction, worker) in &self.workers {
            if self.breaker_open(*direction).await {
                debug!(direction = %direction, "Circuit breaker open, skipping dispatch");
                continue;
            }

            let ready = self
                .registry
                .with_status(&[BridgeStatus::Confirmed], Some(*direction))
                .await
                .into_iter()
                .filter(|e| self.event_backoff.is_ready_for_retry(e.retry_after));

            for candidate in ready {
                let key = candidate.key();
                let Some(event) = self.registry.try_begin_settling(&key).await else {
                    continue;
                };
                claimed.push(key.clone());
                report.dispatched += 1;

                let worker = worker.clone();
                let permits = self.permits.clone();
                let direction = *direction;
                tasks.spawn(async move {
                    let outcome = match permits.acquire_owned().await {
                        Ok(_permit) => worker.settle(&event).await,
                        Err(_) => SettlementOutcome::deferred("settlement runner closed"),
                    };
                    (key, direction, outcome)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, direction, outcome)) => {
                    self.apply(&key, direction, outcome, &mut report).await;
                }
                Err(e) => {
                    error!(error = %e, "Settlement task panicked");
                }
            }
        }

        // a panicked task leaves its event claimed
        for key in claimed {
            if let Some(event) = self.registry.get(&key).await {
                if event.status == BridgeStatus::Settling {
                    warn!(event = %key, "Releasing settlement claim left by a failed task");
                    self.registry
                        .transition(&key, BridgeStatus::Confirmed, |_| {})
                        .await;
                }
            }
        }

        report
    }

    async fn apply(
        &self,
        key: &EventKey,
        direction: Direction,
        outcome: SettlementOutcome,
        report: &mut DispatchReport,
    ) {
        debug!(event = %key, outcome = outcome.label(), "Settlement attempt finished");

        match outcome {
            SettlementOutcome::Settled(evidence) => {
                report.settled += 1;
                self.record_progress(direction).await;
                self.registry
                    .transition(key, BridgeStatus::Settled, |e| {
                        e.evidence = Some(evidence);
                        e.retry_after = None;
                    })
                    .await;
            }
            SettlementOutcome::AlreadySettled(evidence) => {
                report.already_settled += 1;
                self.record_progress(direction).await;
                info!(
                    event = %key,
                    evidence = evidence.kind.as_str(),
                    tx = evidence.tx_id.as_deref().unwrap_or(""),
                    "Already settled on chain, skipping"
                );
                self.registry
                    .transition(key, BridgeStatus::Settled, |e| {
                        e.evidence = Some(evidence);
                        e.retry_after = None;
                    })
                    .await;
            }
            SettlementOutcome::Deferred { reason, pending_tx } => {
                report.deferred += 1;
                metrics::record_deferral(direction.as_str());
                let policy = &self.event_backoff;
                let mut attempts = 0;
                self.registry
                    .transition(key, BridgeStatus::Confirmed, |e| {
                        e.attempts += 1;
                        e.retry_after = Some(policy.next_retry_after(e.attempts - 1));
                        if pending_tx.is_some() {
                            e.pending_tx = pending_tx;
                        }
                        attempts = e.attempts;
                    })
                    .await;
                warn!(event = %key, attempts, reason = %reason, "Settlement deferred");
                self.record_deferral(direction).await;
            }
            SettlementOutcome::Failed(reason) => {
                report.failed += 1;
                self.registry
                    .transition(key, BridgeStatus::Failed, |e| e.failure = Some(reason))
                    .await;
            }
        }
    }

    async fn breaker_open(&self, direction: Direction) -> bool {
        self.breakers
            .lock()
            .await
            .get(&direction)
            .map_or(false, |b| b.is_open())
    }

    async fn record_progress(&self, direction: Direction) {
        if let Some(breaker) = self.breakers.lock().await.get_mut(&direction) {
            breaker.record_progress();
            metrics::set_consecutive_deferrals(direction.as_str(), 0);
        }
    }

    async fn record_deferral(&self, direction: Direction) {
        let mut breakers = self.breakers.lock().await;
        let Some(breaker) = breakers.get_mut(&direction) else {
            return;
        };
        if breaker.record_deferral() {
            error!(
                direction = %direction,
                pause_secs = breaker.config.pause_duration.as_secs(),
                "Circuit breaker tripped, pausing settlement"
            );
        }
        metrics::set_consecutive_deferrals(direction.as_str(), breaker.consecutive());
    }

    /// Directions whose breaker is currently open
    pub async fn paused_directions(&self) -> Vec<Direction> {
        let breakers = self.breakers.lock().await;
        let mut paused: Vec<Direction> = breakers
            .iter()
            .filter(|(_, b)| b.is_open())
            .map(|(d, _)| *d)
            .collect();
        paused.sort();
        paused
    }
}
