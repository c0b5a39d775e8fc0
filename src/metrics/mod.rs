pub mod alerts;
pub mod collector;
pub mod history;
pub mod percentiles;
pub mod sampler;
pub mod snapshot;
pub mod stream;
pub mod views;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub use collector::MetricsCollector;
pub use history::Timestamped;
pub use snapshot::PerformanceStats;

/// What the request observer knows once a response is finalized.
/// The middleware fills it and hands it over.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: String,
    /// Route template when the router matched one, raw path otherwise.
    pub path: String,
    pub status_code: u16,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One completed HTTP request observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSample {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    /// Fractional milliseconds
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    /// RSS change between request start and finish, from the cached snapshot
    pub memory_delta: i64,
}

impl Timestamped for RequestSample {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySample {
    /// First 100 characters of the query text
    pub query: String,
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
}

impl Timestamped for QuerySample {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSample {
    pub timestamp: DateTime<Utc>,
    pub usage_percent: f64,
    /// User CPU time spent during the interval (ms)
    pub user_time: f64,
    /// System CPU time spent during the interval (ms)
    pub system_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMemorySample {
    pub timestamp: DateTime<Utc>,
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMemorySample {
    pub timestamp: DateTime<Utc>,
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSample {
    pub timestamp: DateTime<Utc>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub bytes_in_per_sec: f64,
    pub bytes_out_per_sec: f64,
}
