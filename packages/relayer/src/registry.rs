//! In-process view of every bridge event this process has seen
//!
//! The registry is rebuilt by backfill after a restart. Settlement truth lives
//! on the chains; the registry only sequences work and answers status queries.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::metrics;
use crate::types::{BridgeEvent, BridgeStatus, Direction, EventKey};

/// Result of feeding an event into the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    New,
    /// Already known; carries the existing status
    Duplicate(BridgeStatus),
}

#[derive(Default)]
pub struct EventRegistry {
    events: RwLock<HashMap<EventKey, BridgeEvent>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single entry point for watchers and backfill
    ///
    /// The first sighting of a key wins; later sightings are no-ops.
    pub async fn ingest(&self, event: BridgeEvent) -> IngestOutcome {
        let key = event.key();
        let mut events = self.events.write().await;

        if let Some(existing) = events.get(&key) {
            debug!(
                event = %key,
                status = %existing.status,
                source = event.source.as_str(),
                "Duplicate detection ignored"
            );
            return IngestOutcome::Duplicate(existing.status);
        }

        metrics::record_event_detected(event.direction.as_str(), event.source.as_str());
        info!(
            event = %key,
            direction = %event.direction,
            amount = %event.amount,
            recipient = event.recipient.as_deref().unwrap_or("<none>"),
            origin_height = event.origin_height,
            status = %event.status,
            source = event.source.as_str(),
            "Bridge event ingested"
        );
        events.insert(key, event);
        IngestOutcome::New
    }

    pub async fn get(&self, key: &EventKey) -> Option<BridgeEvent> {
        self.events.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Snapshot of events in any of `statuses`, optionally one direction only
    pub async fn with_status(
        &self,
        statuses: &[BridgeStatus],
        direction: Option<Direction>,
    ) -> Vec<BridgeEvent> {
        let events = self.events.read().await;
        let mut matching: Vec<BridgeEvent> = events
            .values()
            .filter(|e| statuses.contains(&e.status))
            .filter(|e| direction.map_or(true, |d| e.direction == d))
            .cloned()
            .collect();
        matching.sort_by_key(|e| (e.origin_height, e.key()));
        matching
    }

    /// Move an event to `to`, applying `update` in the same critical section
    ///
    /// Terminal events never move. Returns the previous status when applied.
    pub async fn transition<F>(&self, key: &EventKey, to: BridgeStatus, update: F) -> Option<BridgeStatus>
    where
        F: FnOnce(&mut BridgeEvent),
    {
        let mut events = self.events.write().await;
        let event = events.get_mut(key)?;
        let from = event.status;
        if from.is_terminal() {
            debug!(event = %key, status = %from, target = %to, "Ignoring transition of terminal event");
            return None;
        }

        update(event);
        event.status = to;
        event.updated_at = Utc::now();

        match to {
            BridgeStatus::Failed => {
                let reason = event
                    .failure
                    .as_ref()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                metrics::record_failure(
                    event.direction.as_str(),
                    event.failure.as_ref().map_or("unknown", |f| f.label()),
                );
                error!(
                    event = %key,
                    from = %from,
                    to = %to,
                    reason = %reason,
                    "Bridge event FAILED, manual intervention required"
                );
            }
            BridgeStatus::Settled => {
                let latency = (event.updated_at - event.detected_at).num_milliseconds() as f64 / 1000.0;
                let kind = event.evidence.as_ref().map_or("unknown", |e| e.kind.as_str());
                metrics::record_settlement(event.direction.as_str(), kind, latency);
                info!(
                    event = %key,
                    from = %from,
                    evidence = kind,
                    tx = event.evidence.as_ref().and_then(|e| e.tx_id.as_deref()).unwrap_or(""),
                    "Bridge event SETTLED"
                );
            }
            _ if from != to => {
                info!(
                    event = %key,
                    from = %from,
                    to = %to,
                    confirmations = event.confirmations,
                    tx = event.evidence.as_ref().and_then(|e| e.tx_id.as_deref()).unwrap_or(""),
                    "Bridge event transition"
                );
            }
            _ => {}
        }

        Some(from)
    }

    /// Apply `update` without changing status
    pub async fn update<F>(&self, key: &EventKey, update: F) -> bool
    where
        F: FnOnce(&mut BridgeEvent),
    {
        let mut events = self.events.write().await;
        match events.get_mut(key) {
            Some(event) => {
                update(event);
                event.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Claim a CONFIRMED event for settlement
    ///
    /// Compare-and-set: exactly one caller gets the event for a given
    /// CONFIRMED period.
    pub async fn try_begin_settling(&self, key: &EventKey) -> Option<BridgeEvent> {
        let mut events = self.events.write().await;
        let event = events.get_mut(key)?;
        if event.status != BridgeStatus::Confirmed {
            return None;
        }
        event.status = BridgeStatus::Settling;
        event.updated_at = Utc::now();
        debug!(event = %key, "Claimed for settlement");
        Some(event.clone())
    }

    /// Number of events per status, every status present
    pub async fn counts(&self) -> BTreeMap<BridgeStatus, usize> {
        let events = self.events.read().await;
        let mut counts: BTreeMap<BridgeStatus, usize> =
            BridgeStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for event in events.values() {
            *counts.entry(event.status).or_default() += 1;
        }
        counts
    }

    /// Log and export the per-status counts
    pub async fn log_summary(&self) {
        let counts = self.counts().await;
        for (status, count) in &counts {
            metrics::set_events_by_status(status.as_str(), *count);
        }
        info!(
            detected = counts[&BridgeStatus::Detected],
            confirming = counts[&BridgeStatus::Confirming],
            confirmed = counts[&BridgeStatus::Confirmed],
            settling = counts[&BridgeStatus::Settling],
            settled = counts[&BridgeStatus::Settled],
            failed = counts[&BridgeStatus::Failed],
            "Bridge event summary"
        );
    }
}
