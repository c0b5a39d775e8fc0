use axum::extract::State;
use chrono::Utc;
use std::sync::Arc;

use crate::metrics::alerts::RealtimeStatus;
use crate::metrics::views::{DatabaseReport, ResourceReport};
use crate::AppState;

use super::{ApiResponse, ApiResult};

// ─── GET /api/performance/database ───────────────────────────────

pub async fn get_database(State(state): State<Arc<AppState>>) -> ApiResult<DatabaseReport> {
    Ok(ApiResponse::ok(state.metrics.database_report()))
}

// ─── GET /api/performance/resources ──────────────────────────────

pub async fn get_resources(State(state): State<Arc<AppState>>) -> ApiResult<ResourceReport> {
    Ok(ApiResponse::ok(state.metrics.resource_report()))
}

// ─── GET /api/performance/realtime ───────────────────────────────

pub async fn get_realtime(State(state): State<Arc<AppState>>) -> ApiResult<RealtimeStatus> {
    let status = state
        .metrics
        .realtime_at(Utc::now(), &state.config.alerts);
    Ok(ApiResponse::ok(status))
}
