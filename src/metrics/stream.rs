use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::AppState;

// ─── GET /api/performance/stream ─────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes the realtime status (window stats + alerts) as JSON on every
/// `stream_interval` tick, for dashboards that prefer push over polling.

pub async fn realtime_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(state.config.stream_interval());

    let stream = IntervalStream::new(interval).map(move |_| {
        let status = state.metrics.realtime_at(Utc::now(), &state.config.alerts);
        let json = serde_json::to_string(&status).unwrap_or_default();
        Ok(Event::default().event("realtime").data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
