//! Health & Status API endpoints
//!
//! - GET /health  - Per-status event counts and uptime (JSON)
//! - GET /healthz - Liveness probe
//! - GET /metrics - Prometheus metrics
//! - GET /events  - Registry snapshot, filterable by `status` and `direction`

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::metrics;
use crate::registry::EventRegistry;
use crate::shutdown::{self, ShutdownReceiver};
use crate::types::{BridgeEvent, BridgeStatus, Direction};

/// Upper bound on events returned by one /events call
const MAX_EVENTS: usize = 500;

#[derive(Clone)]
pub struct ApiState {
    registry: Arc<EventRegistry>,
    started: Instant,
}

impl ApiState {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self {
            registry,
            started: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub events: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub status: Option<String>,
    pub direction: Option<Direction>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub total: usize,
    pub truncated: bool,
    pub events: Vec<BridgeEvent>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(liveness))
        .route("/metrics", get(prometheus_metrics))
        .route("/events", get(events))
        .with_state(state)
}

/// Serve the API until shutdown
pub async fn start_api_server(
    bind_address: &str,
    state: ApiState,
    mut shutdown_rx: ShutdownReceiver,
) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| eyre!("Invalid API bind address {}: {}", bind_address, e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server started");
    metrics::UP.set(1.0);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown::requested(&mut shutdown_rx).await })
        .await?;

    metrics::UP.set(0.0);
    info!("API server stopped");
    Ok(())
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let events = state
        .registry
        .counts()
        .await
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), count))
        .collect();
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        events,
    })
}

async fn liveness() -> &'static str {
    "OK"
}

async fn prometheus_metrics() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        metrics::encode(),
    )
        .into_response()
}

async fn events(State(state): State<ApiState>, Query(query): Query<EventsQuery>) -> Response {
    let statuses = match query.status.as_deref() {
        Some(raw) => match raw.parse::<BridgeStatus>() {
            Ok(status) => vec![status],
            Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
        },
        None => BridgeStatus::ALL.to_vec(),
    };

    let mut events = state.registry.with_status(&statuses, query.direction).await;
    let total = events.len();
    events.truncate(MAX_EVENTS);

    Json(EventsResponse {
        total,
        truncated: total > MAX_EVENTS,
        events,
    })
    .into_response()
}
