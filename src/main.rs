use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

mod config;
mod handlers;
mod logging;
mod metrics;
mod middleware;
mod server;

use config::{Args, MonitorConfig};
use metrics::sampler::{self, SysinfoProbe};

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Central metrics engine. The observer pushes requests, the sampler
    /// pushes resource snapshots, handlers read derived views.
    pub metrics: Arc<metrics::MetricsCollector>,

    /// Sampler cadence, SSE cadence and alert thresholds.
    pub config: MonitorConfig,

    /// Secret for POST /api/performance/reset; `None` disables reset.
    pub api_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    let monitor_config = args.monitor_config();

    // ── 1. Build shared state ────────────────────────────────────
    let collector = Arc::new(metrics::MetricsCollector::new());
    let state = Arc::new(AppState {
        metrics: collector.clone(),
        config: monitor_config.clone(),
        api_key: args.api_key.clone(),
    });
    if state.api_key.is_none() {
        tracing::warn!("PERFORMANCE_API_KEY not set; metrics reset is disabled");
    }

    // ── 2. Start resource sampling ───────────────────────────────
    let probe = SysinfoProbe::new().context("failed to initialise resource probe")?;
    let monitor = sampler::start_monitoring(collector, probe, monitor_config);

    // ── 3. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let addr = args.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    tracing::info!(%addr, "performance monitor listening");
    tracing::info!("stats     → http://{addr}/api/performance/stats");
    tracing::info!("realtime  → http://{addr}/api/performance/realtime");
    tracing::info!("stream    → http://{addr}/api/performance/stream");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    // ── 5. Stop timers so they don't hold the process open ───────
    monitor.stop().await;
    tracing::info!("shutdown complete");

    served.context("server exited with error")
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, stopping");
}
