use axum::extract::{rejection::QueryRejection, Query, State};
use std::sync::Arc;

use crate::metrics::views::{
    EndpointListing, EndpointQuery, ErrorListing, ErrorQuery, RequestListing, RequestQuery,
    SlowRequestQuery,
};
use crate::metrics::PerformanceStats;
use crate::AppState;

use super::{ApiResponse, ApiResult};

// ─── GET /api/performance/stats ──────────────────────────────────

pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<PerformanceStats> {
    Ok(ApiResponse::ok(state.metrics.stats()))
}

// ─── GET /api/performance/requests ───────────────────────────────

pub async fn get_requests(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RequestQuery>, QueryRejection>,
) -> ApiResult<RequestListing> {
    let Query(query) = query?;
    Ok(ApiResponse::ok(state.metrics.request_listing(&query)))
}

// ─── GET /api/performance/slow-requests ──────────────────────────

pub async fn get_slow_requests(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SlowRequestQuery>, QueryRejection>,
) -> ApiResult<RequestListing> {
    let Query(query) = query?;
    Ok(ApiResponse::ok(state.metrics.slow_request_listing(&query)))
}

// ─── GET /api/performance/errors ─────────────────────────────────

pub async fn get_errors(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ErrorQuery>, QueryRejection>,
) -> ApiResult<ErrorListing> {
    let Query(query) = query?;
    Ok(ApiResponse::ok(state.metrics.error_listing(&query)))
}

// ─── GET /api/performance/endpoints ──────────────────────────────

pub async fn get_endpoints(
    State(state): State<Arc<AppState>>,
    query: Result<Query<EndpointQuery>, QueryRejection>,
) -> ApiResult<EndpointListing> {
    let Query(query) = query?;
    Ok(ApiResponse::ok(state.metrics.endpoint_listing(&query)))
}
