//! Command-line / environment configuration.

use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::metrics::alerts::AlertThresholds;

/// Performance monitor for the blog API.
#[derive(Parser, Debug, Clone)]
#[command(name = "perf-monitor", version, about)]
pub struct Args {
    /// Host to bind to
    #[arg(long, env = "PERF_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PERF_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Secret required by POST /api/performance/reset. Unset disables reset.
    #[arg(long, env = "PERFORMANCE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, env = "PERF_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// CPU sampling interval (seconds)
    #[arg(long, env = "PERF_CPU_INTERVAL", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub cpu_interval: u64,

    /// Process/system memory sampling interval (seconds)
    #[arg(long, env = "PERF_MEMORY_INTERVAL", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub memory_interval: u64,

    /// Network sampling interval (seconds)
    #[arg(long, env = "PERF_NETWORK_INTERVAL", default_value_t = 15,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub network_interval: u64,

    /// Retention sweep interval (seconds)
    #[arg(long, env = "PERF_CLEANUP_INTERVAL", default_value_t = 3600,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub cleanup_interval: u64,
}

impl Args {
    /// Formatted listen address, e.g. "0.0.0.0:5000"
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            cpu_interval_secs: self.cpu_interval,
            memory_interval_secs: self.memory_interval,
            network_interval_secs: self.network_interval,
            cleanup_interval_secs: self.cleanup_interval,
            ..MonitorConfig::default()
        }
    }
}

/// Sampler cadence and alerting thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub cpu_interval_secs: u64,
    pub memory_interval_secs: u64,
    pub network_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    /// SSE push cadence for /api/performance/stream
    pub stream_interval_secs: u64,
    pub alerts: AlertThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cpu_interval_secs: 5,
            memory_interval_secs: 10,
            network_interval_secs: 15,
            cleanup_interval_secs: 3600,
            stream_interval_secs: 5,
            alerts: AlertThresholds::default(),
        }
    }
}

impl MonitorConfig {
    pub fn cpu_interval(&self) -> Duration {
        Duration::from_secs(self.cpu_interval_secs)
    }

    pub fn memory_interval(&self) -> Duration {
        Duration::from_secs(self.memory_interval_secs)
    }

    pub fn network_interval(&self) -> Duration {
        Duration::from_secs(self.network_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_secs(self.stream_interval_secs)
    }
}
