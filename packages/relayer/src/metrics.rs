//! Prometheus metrics for the Mars bridge relayer
//!
//! Exposed on the /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram_vec, Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec,
    TextEncoder,
};

lazy_static! {
    // Chain progress
    pub static ref LATEST_HEIGHT: GaugeVec = register_gauge_vec!(
        "relayer_latest_height",
        "Latest block (L1) or slot (Solana) observed",
        &["chain"]
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_POLL: GaugeVec = register_gauge_vec!(
        "relayer_last_successful_poll_timestamp",
        "Unix timestamp of last successful poll",
        &["chain"]
    ).unwrap();

    // Event pipeline
    pub static ref EVENTS_DETECTED: CounterVec = register_counter_vec!(
        "relayer_events_detected_total",
        "Bridge events ingested for the first time",
        &["direction", "source"]
    ).unwrap();

    pub static ref EVENTS_BY_STATUS: GaugeVec = register_gauge_vec!(
        "relayer_events_by_status",
        "Bridge events currently in each status",
        &["status"]
    ).unwrap();

    pub static ref SETTLEMENTS: CounterVec = register_counter_vec!(
        "relayer_settlements_total",
        "Events settled, by how settlement was established",
        &["direction", "evidence"]
    ).unwrap();

    pub static ref FAILURES: CounterVec = register_counter_vec!(
        "relayer_failures_total",
        "Events given up on",
        &["direction", "reason"]
    ).unwrap();

    pub static ref DEFERRALS: CounterVec = register_counter_vec!(
        "relayer_deferrals_total",
        "Settlement attempts that will be retried",
        &["direction"]
    ).unwrap();

    pub static ref CONSECUTIVE_DEFERRALS: GaugeVec = register_gauge_vec!(
        "relayer_consecutive_deferrals",
        "Consecutive deferred settlements (circuit breaker)",
        &["direction"]
    ).unwrap();

    pub static ref SETTLEMENT_LATENCY: HistogramVec = register_histogram_vec!(
        "relayer_settlement_latency_seconds",
        "Time from detection to settlement",
        &["direction"],
        vec![1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]
    ).unwrap();

    // RPC
    pub static ref RPC_RETRIES: CounterVec = register_counter_vec!(
        "relayer_rpc_retries_total",
        "RPC calls retried after a failure",
        &["endpoint", "class"]
    ).unwrap();

    // Oracle
    pub static ref ORACLE_LOOKUPS: CounterVec = register_counter_vec!(
        "relayer_oracle_lookups_total",
        "Lock settlement lookups by result",
        &["result"]
    ).unwrap();

    pub static ref DUPLICATE_MINTS: Counter = register_counter!(
        "relayer_duplicate_mints_total",
        "Mints observed carrying an already-settled bridge id"
    ).unwrap();

    // Health
    pub static ref UP: Gauge = register_gauge!(
        "relayer_up",
        "Whether the relayer is up and running"
    ).unwrap();
}

pub fn set_latest_height(chain: &str, height: u64) {
    LATEST_HEIGHT.with_label_values(&[chain]).set(height as f64);
}

/// Record last successful poll
pub fn record_successful_poll(chain: &str) {
    LAST_SUCCESSFUL_POLL
        .with_label_values(&[chain])
        .set(chrono::Utc::now().timestamp() as f64);
}

pub fn record_event_detected(direction: &str, source: &str) {
    EVENTS_DETECTED.with_label_values(&[direction, source]).inc();
}

pub fn set_events_by_status(status: &str, count: usize) {
    EVENTS_BY_STATUS.with_label_values(&[status]).set(count as f64);
}

/// Record a settlement and its detection-to-settlement latency
pub fn record_settlement(direction: &str, evidence: &str, latency_secs: f64) {
    SETTLEMENTS.with_label_values(&[direction, evidence]).inc();
    SETTLEMENT_LATENCY
        .with_label_values(&[direction])
        .observe(latency_secs.max(0.0));
}

pub fn record_failure(direction: &str, reason: &str) {
    FAILURES.with_label_values(&[direction, reason]).inc();
}

pub fn record_deferral(direction: &str) {
    DEFERRALS.with_label_values(&[direction]).inc();
}

/// Update consecutive deferrals (circuit breaker)
pub fn set_consecutive_deferrals(direction: &str, count: u32) {
    CONSECUTIVE_DEFERRALS
        .with_label_values(&[direction])
        .set(count as f64);
}

pub fn record_rpc_retry(endpoint: &str, class: &str) {
    RPC_RETRIES.with_label_values(&[endpoint, class]).inc();
}

pub fn record_oracle_lookup(result: &str) {
    ORACLE_LOOKUPS.with_label_values(&[result]).inc();
}

pub fn record_duplicate_mint() {
    DUPLICATE_MINTS.inc();
}

/// Render every registered metric in the Prometheus text format
pub fn encode() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
