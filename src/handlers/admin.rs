use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;

use super::{ApiResponse, ApiResult, AppError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetStatus {
    pub message: String,
}

// ─── POST /api/performance/reset ─────────────────────────────────

pub async fn reset_metrics(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ResetRequest>, JsonRejection>,
) -> ApiResult<ResetStatus> {
    // A missing or unreadable body carries no credential
    let given = match body {
        Ok(Json(req)) => req.api_key,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "reset body not readable");
            None
        }
    };

    // No configured key means reset is disabled
    let authorized = match (&state.api_key, &given) {
        (Some(expected), Some(given)) => expected == given,
        _ => false,
    };
    if !authorized {
        tracing::warn!("rejected metrics reset: bad or missing API key");
        return Err(AppError::Unauthorized);
    }

    state.metrics.reset();
    tracing::info!("performance metrics reset");

    Ok(ApiResponse::ok(ResetStatus {
        message: "Performance metrics reset".into(),
    }))
}
