//! Shapes returned by `MetricsCollector::stats`.
//!
//! Everything here is an owned copy; nothing borrows collector internals.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::collector::NetworkTotals;
use super::percentiles::{round2, PercentileSet};
use super::views::EndpointStats;
use super::{
    CpuSample, NetworkSample, ProcessMemorySample, QuerySample, RequestSample,
    SystemMemorySample,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub timestamp: DateTime<Utc>,
    pub uptime: UptimeInfo,
    pub requests: RequestStats,
    pub resources: ResourceStats,
    pub database: DatabaseStats,
    pub api: ApiStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeInfo {
    pub started_at: DateTime<Utc>,
    pub milliseconds: i64,
    pub seconds: f64,
    /// e.g. "2h 5m 13s"
    pub formatted: String,
}

impl UptimeInfo {
    pub fn new(started_at: DateTime<Utc>, milliseconds: i64) -> Self {
        Self {
            started_at,
            milliseconds,
            seconds: round2(milliseconds as f64 / 1000.0),
            formatted: format_uptime(milliseconds / 1000),
        }
    }
}

fn format_uptime(total_secs: i64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    pub total: u64,
    pub per_second: f64,
    /// Percent of requests that ended in a retained error record
    pub error_rate: f64,
    /// Mean over retained samples only
    pub average_response_time: f64,
    pub percentiles: PercentileSet,
    pub by_method: BTreeMap<String, u64>,
    pub by_status_code: BTreeMap<u16, u64>,
    /// Samples currently in the response-time history
    pub retained: usize,
    /// Records currently in the error history
    pub retained_errors: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStats {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub network: NetworkStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub current: Option<CpuSample>,
    pub history: Vec<CpuSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub process: Option<ProcessMemorySample>,
    pub system: Option<SystemMemorySample>,
    pub history: Vec<ProcessMemorySample>,
    pub system_history: Vec<SystemMemorySample>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub current: Option<NetworkSample>,
    pub totals: NetworkTotals,
    pub history: Vec<NetworkSample>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub total_queries: u64,
    pub slow_queries: u64,
    pub average_query_time: f64,
    pub recent_queries: Vec<QuerySample>,
    pub slow_query_log: Vec<QuerySample>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStats {
    pub endpoints: Vec<EndpointStats>,
    /// Slowest first
    pub slow_requests: Vec<RequestSample>,
    /// Newest first
    pub recent_errors: Vec<RequestSample>,
}
