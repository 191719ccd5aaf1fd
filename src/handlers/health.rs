//! Health and runtime introspection endpoints.
//!
//! - `GET /v1/healthcheck` - liveness plus environment/version info
//! - `GET /debug/vars` - request counters, background task count, pool stats

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::instrument;

use crate::metrics::MetricsSnapshot;
use crate::state::AppState;
use crate::store::PoolStats;

/// Health check endpoint.
#[instrument(skip(state))]
pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.env,
            "version": env!("CARGO_PKG_VERSION"),
        },
    }))
}

/// Runtime introspection snapshot served by `/debug/vars`.
#[derive(Debug, Serialize)]
pub struct DebugVars {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    /// Live count of tracked background tasks.
    pub background_tasks: usize,
    pub database: PoolStats,
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
}

/// Read-only runtime signals: cumulative request/response counters by
/// status, cumulative processing time, live background task count, and
/// store pool statistics.
#[instrument(skip(state))]
pub async fn debug_vars(State(state): State<AppState>) -> Json<DebugVars> {
    Json(DebugVars {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        background_tasks: state.tasks.task_count(),
        database: state.store.pool_stats(),
        metrics: state.metrics.snapshot(),
    })
}
