use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsCounters {
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub retained_errors: usize,
    pub total_queries: u64,
    pub slow_queries: u64,
    pub rss_bytes: u64,
}

// ─── GET /health ─────────────────────────────────────────────────

pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let now = Utc::now();
    let uptime = state.metrics.uptime_at(now);
    Json(json!({
        "status": "ok",
        "uptime": uptime.seconds,
        "timestamp": now,
    }))
}

// ─── GET /health/live ────────────────────────────────────────────

pub async fn live() -> Json<serde_json::Value> {
    Json(json!({ "status": "alive", "timestamp": Utc::now() }))
}

// ─── GET /health/ready ───────────────────────────────────────────
/// Ready once the sampler has produced its first memory snapshot.

pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.metrics.has_memory_sample() {
        (
            StatusCode::OK,
            Json(json!({ "status": "ready", "timestamp": Utc::now() })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "reason": "resource sampler has not reported yet",
                "timestamp": Utc::now(),
            })),
        )
    }
}

// ─── GET /metrics ────────────────────────────────────────────────

pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsCounters> {
    let stats = state.metrics.stats();
    Json(MetricsCounters {
        uptime_seconds: stats.uptime.seconds,
        total_requests: stats.requests.total,
        retained_errors: stats.requests.retained_errors,
        total_queries: stats.database.total_queries,
        slow_queries: stats.database.slow_queries,
        rss_bytes: state.metrics.current_rss(),
    })
}
