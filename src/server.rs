use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Health ──────────────────────────────────────────────
        .route("/health", get(handlers::health::health))
        .route("/health/live", get(handlers::health::live))
        .route("/health/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        // ── Request-level reporting ─────────────────────────────
        .route("/api/performance/stats", get(handlers::performance::get_stats))
        .route(
            "/api/performance/requests",
            get(handlers::performance::get_requests),
        )
        .route(
            "/api/performance/slow-requests",
            get(handlers::performance::get_slow_requests),
        )
        .route("/api/performance/errors", get(handlers::performance::get_errors))
        .route(
            "/api/performance/endpoints",
            get(handlers::performance::get_endpoints),
        )
        // ── Resources / live status ─────────────────────────────
        .route(
            "/api/performance/database",
            get(handlers::resources::get_database),
        )
        .route(
            "/api/performance/resources",
            get(handlers::resources::get_resources),
        )
        .route(
            "/api/performance/realtime",
            get(handlers::resources::get_realtime),
        )
        .route("/api/performance/stream", get(stream::realtime_stream))
        // ── Admin ───────────────────────────────────────────────
        .route("/api/performance/reset", post(handlers::admin::reset_metrics))
        .fallback(handlers::not_found)
        // ── Provide shared state to all routes above ────────────
        .with_state(state.clone())
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(CatchPanicLayer::custom(handlers::panic_response))
        .layer(axum_mw::from_fn_with_state(state, timing::observe_request))
        .layer(CorsLayer::permissive())
}
