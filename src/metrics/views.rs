//! Filtered / sorted read models behind the `/api/performance/*` listings.
//!
//! Every function here is pure: it takes borrowed history and returns owned
//! results, so the collector only holds its lock while these run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::collector::{EndpointAggregate, NetworkTotals, ERROR_STATUS_MIN, SLOW_REQUEST_MS};
use super::history::BoundedHistory;
use super::percentiles::{round2, DurationSummary};
use super::snapshot::{CpuStats, MemoryStats, NetworkStats};
use super::{
    CpuSample, NetworkSample, ProcessMemorySample, QuerySample, RequestSample,
    SystemMemorySample,
};

const DEFAULT_REQUEST_LIMIT: usize = 100;
const DEFAULT_SLOW_LIMIT: usize = 50;
const DEFAULT_ERROR_LIMIT: usize = 50;
const REPORT_HISTORY_LEN: usize = 20;
const TREND_WINDOW: usize = 10;

// ─── Query parameters ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestSortKey {
    #[default]
    Timestamp,
    Duration,
    StatusCode,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestQuery {
    pub limit: Option<usize>,
    #[serde(default)]
    pub sort_by: RequestSortKey,
    #[serde(default)]
    pub sort_order: SortOrder,
    pub status_code: Option<u16>,
    pub method: Option<String>,
    /// Substring match
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowRequestQuery {
    pub limit: Option<usize>,
    /// Milliseconds, inclusive
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorQuery {
    pub limit: Option<usize>,
    pub status_code: Option<u16>,
    pub method: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndpointSortKey {
    #[default]
    Count,
    AverageTime,
    MaxTime,
    ErrorRate,
    Path,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointQuery {
    #[serde(default)]
    pub sort_by: EndpointSortKey,
    #[serde(default)]
    pub sort_order: SortOrder,
}

// ─── Results ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestListing {
    pub requests: Vec<RequestSample>,
    /// Computed over every match, before `limit`
    pub summary: DurationSummary,
    pub total_matched: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorListing {
    pub errors: Vec<RequestSample>,
    pub summary: ErrorSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub total: usize,
    pub client_errors: usize,
    pub server_errors: usize,
    pub by_status_code: BTreeMap<u16, usize>,
}

/// Rounded, serializable view of an `EndpointAggregate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub method: String,
    pub path: String,
    pub count: u64,
    pub total_duration: f64,
    pub average_duration: f64,
    pub max_duration: f64,
    pub min_duration: f64,
    pub status_codes: BTreeMap<u16, u64>,
    pub error_count: u64,
    pub error_rate: f64,
}

impl From<&EndpointAggregate> for EndpointStats {
    fn from(agg: &EndpointAggregate) -> Self {
        let error_count = agg.error_count();
        let error_rate = if agg.count > 0 {
            error_count as f64 / agg.count as f64 * 100.0
        } else {
            0.0
        };
        Self {
            method: agg.method.clone(),
            path: agg.path.clone(),
            count: agg.count,
            total_duration: round2(agg.total_duration),
            average_duration: round2(agg.average_duration),
            max_duration: round2(agg.max_duration),
            min_duration: round2(agg.min_duration),
            status_codes: agg.status_codes.clone(),
            error_count,
            error_rate: round2(error_rate),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointListing {
    pub endpoints: Vec<EndpointStats>,
    pub summary: EndpointSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSummary {
    pub total_endpoints: usize,
    pub total_requests: u64,
    /// "METHOD path" with the highest average duration
    pub slowest: Option<String>,
    /// "METHOD path" with the highest request count
    pub busiest: Option<String>,
}

/// A bucket in the query-duration distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistBucket {
    pub range_start: f64,
    pub range_end: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseReport {
    pub total_queries: u64,
    pub slow_queries: u64,
    pub average_query_time: f64,
    pub retained_queries: usize,
    /// Newest first
    pub recent_queries: Vec<QuerySample>,
    /// Newest first
    pub slow_query_log: Vec<QuerySample>,
    pub distribution: Vec<DistBucket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    /// Newest minus oldest over the window
    pub change: f64,
    pub direction: TrendDirection,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTrends {
    pub cpu: Option<Trend>,
    pub memory: Option<Trend>,
    pub system_memory: Option<Trend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReport {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub network: NetworkStats,
    pub trends: ResourceTrends,
}

// ─── Builders ────────────────────────────────────────────────────

pub fn request_listing<'a, I>(samples: I, query: &RequestQuery) -> RequestListing
where
    I: Iterator<Item = &'a RequestSample>,
{
    let mut matched: Vec<RequestSample> = samples
        .filter(|s| query.status_code.map_or(true, |code| s.status_code == code))
        .filter(|s| {
            query
                .method
                .as_deref()
                .map_or(true, |m| s.method.eq_ignore_ascii_case(m))
        })
        .filter(|s| query.path.as_deref().map_or(true, |p| s.path.contains(p)))
        .cloned()
        .collect();

    let durations: Vec<f64> = matched.iter().map(|s| s.duration).collect();
    let summary = DurationSummary::from_durations(&durations);
    let total_matched = matched.len();

    match query.sort_by {
        RequestSortKey::Timestamp => matched.sort_by_key(|s| s.timestamp),
        RequestSortKey::Duration => matched.sort_by(|a, b| a.duration.total_cmp(&b.duration)),
        RequestSortKey::StatusCode => matched.sort_by_key(|s| s.status_code),
    }
    if query.sort_order == SortOrder::Desc {
        matched.reverse();
    }
    matched.truncate(query.limit.unwrap_or(DEFAULT_REQUEST_LIMIT));

    RequestListing {
        requests: matched,
        summary,
        total_matched,
    }
}

pub fn slow_request_listing<'a, I>(samples: I, query: &SlowRequestQuery) -> RequestListing
where
    I: Iterator<Item = &'a RequestSample>,
{
    let threshold = query.threshold.unwrap_or(SLOW_REQUEST_MS);
    let mut matched: Vec<RequestSample> =
        samples.filter(|s| s.duration >= threshold).cloned().collect();

    let durations: Vec<f64> = matched.iter().map(|s| s.duration).collect();
    let summary = DurationSummary::from_durations(&durations);
    let total_matched = matched.len();

    matched.sort_by(|a, b| b.duration.total_cmp(&a.duration));
    matched.truncate(query.limit.unwrap_or(DEFAULT_SLOW_LIMIT));

    RequestListing {
        requests: matched,
        summary,
        total_matched,
    }
}

pub fn error_listing<'a, I>(errors: I, query: &ErrorQuery) -> ErrorListing
where
    I: DoubleEndedIterator<Item = &'a RequestSample>,
{
    let matched: Vec<RequestSample> = errors
        .rev()
        .filter(|s| query.status_code.map_or(true, |code| s.status_code == code))
        .filter(|s| {
            query
                .method
                .as_deref()
                .map_or(true, |m| s.method.eq_ignore_ascii_case(m))
        })
        .cloned()
        .collect();

    let mut by_status_code = BTreeMap::new();
    for s in &matched {
        *by_status_code.entry(s.status_code).or_insert(0) += 1;
    }
    let client_errors = matched
        .iter()
        .filter(|s| (ERROR_STATUS_MIN..500).contains(&s.status_code))
        .count();
    let summary = ErrorSummary {
        total: matched.len(),
        client_errors,
        server_errors: matched.len() - client_errors,
        by_status_code,
    };

    let mut errors = matched;
    errors.truncate(query.limit.unwrap_or(DEFAULT_ERROR_LIMIT));
    ErrorListing { errors, summary }
}

pub fn endpoint_listing<'a, I>(aggregates: I, query: &EndpointQuery) -> EndpointListing
where
    I: Iterator<Item = &'a EndpointAggregate>,
{
    let mut endpoints: Vec<EndpointStats> = aggregates.map(EndpointStats::from).collect();

    let label = |e: &EndpointStats| format!("{} {}", e.method, e.path);
    let summary = EndpointSummary {
        total_endpoints: endpoints.len(),
        total_requests: endpoints.iter().map(|e| e.count).sum(),
        slowest: endpoints
            .iter()
            .max_by(|a, b| a.average_duration.total_cmp(&b.average_duration))
            .map(label),
        busiest: endpoints.iter().max_by_key(|e| e.count).map(label),
    };

    match query.sort_by {
        EndpointSortKey::Count => endpoints.sort_by_key(|e| e.count),
        EndpointSortKey::AverageTime => {
            endpoints.sort_by(|a, b| a.average_duration.total_cmp(&b.average_duration))
        }
        EndpointSortKey::MaxTime => {
            endpoints.sort_by(|a, b| a.max_duration.total_cmp(&b.max_duration))
        }
        EndpointSortKey::ErrorRate => {
            endpoints.sort_by(|a, b| a.error_rate.total_cmp(&b.error_rate))
        }
        EndpointSortKey::Path => endpoints.sort_by(|a, b| a.path.cmp(&b.path)),
    }
    if query.sort_order == SortOrder::Desc {
        endpoints.reverse();
    }

    EndpointListing { endpoints, summary }
}

pub fn database_report(
    total_queries: u64,
    slow_query_count: u64,
    average_duration: f64,
    queries: &BoundedHistory<QuerySample>,
    slow_queries: &BoundedHistory<QuerySample>,
) -> DatabaseReport {
    let durations: Vec<f64> = queries.iter().map(|q| q.duration).collect();

    let mut recent_queries = queries.tail(REPORT_HISTORY_LEN);
    recent_queries.reverse();
    let mut slow_query_log: Vec<QuerySample> = slow_queries.iter().cloned().collect();
    slow_query_log.reverse();

    DatabaseReport {
        total_queries,
        slow_queries: slow_query_count,
        average_query_time: round2(average_duration),
        retained_queries: queries.len(),
        recent_queries,
        slow_query_log,
        distribution: compute_distribution(&durations),
    }
}

pub fn resource_report(
    cpu: &BoundedHistory<CpuSample>,
    process_memory: &BoundedHistory<ProcessMemorySample>,
    system_memory: &BoundedHistory<SystemMemorySample>,
    network: &BoundedHistory<NetworkSample>,
    network_totals: NetworkTotals,
) -> ResourceReport {
    let cpu_values: Vec<f64> = cpu.iter().map(|s| s.usage_percent).collect();
    let rss_values: Vec<f64> = process_memory.iter().map(|s| s.rss_bytes as f64).collect();
    let sys_values: Vec<f64> = system_memory.iter().map(|s| s.used_percent).collect();

    ResourceReport {
        cpu: CpuStats {
            current: cpu.latest().copied(),
            history: cpu.tail(REPORT_HISTORY_LEN),
        },
        memory: MemoryStats {
            process: process_memory.latest().copied(),
            system: system_memory.latest().copied(),
            history: process_memory.tail(REPORT_HISTORY_LEN),
            system_history: system_memory.tail(REPORT_HISTORY_LEN),
        },
        network: NetworkStats {
            current: network.latest().copied(),
            totals: network_totals,
            history: network.tail(REPORT_HISTORY_LEN),
        },
        trends: ResourceTrends {
            cpu: trend(&cpu_values, Tolerance::Points(0.5)),
            memory: trend(&rss_values, Tolerance::Relative(0.01)),
            system_memory: trend(&sys_values, Tolerance::Points(0.5)),
        },
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Upper bucket boundaries (ms). A value equal to a boundary falls in
/// that boundary's bucket.
const DIST_BOUNDARIES: &[f64] = &[10.0, 50.0, 100.0, 500.0, 1_000.0];

fn compute_distribution(durations: &[f64]) -> Vec<DistBucket> {
    if durations.is_empty() {
        return Vec::new();
    }

    let bounds = DIST_BOUNDARIES;
    let mut counts = vec![0u64; bounds.len() + 1]; // +1 for overflow
    for &d in durations {
        // first boundary >= d
        let idx = bounds.partition_point(|&b| b < d);
        counts[idx] += 1;
    }

    let mut result = Vec::with_capacity(counts.len());
    let mut prev = 0.0;
    for (i, &boundary) in bounds.iter().enumerate() {
        if counts[i] > 0 {
            result.push(DistBucket {
                range_start: prev,
                range_end: boundary,
                count: counts[i],
            });
        }
        prev = boundary;
    }
    // Overflow bucket
    if counts[bounds.len()] > 0 {
        let max = durations.iter().copied().fold(f64::MIN, f64::max);
        result.push(DistBucket {
            range_start: prev,
            range_end: round2(max),
            count: counts[bounds.len()],
        });
    }
    result
}

enum Tolerance {
    /// Absolute, for values already in percent
    Points(f64),
    /// Fraction of the oldest value
    Relative(f64),
}

fn trend(values: &[f64], tolerance: Tolerance) -> Option<Trend> {
    if values.len() < 2 {
        return None;
    }
    let window = &values[values.len().saturating_sub(TREND_WINDOW)..];
    let oldest = window[0];
    let change = window[window.len() - 1] - oldest;
    let tolerance = match tolerance {
        Tolerance::Points(p) => p,
        Tolerance::Relative(f) => oldest.abs() * f,
    };
    let direction = if change > tolerance {
        TrendDirection::Increasing
    } else if change < -tolerance {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };
    Some(Trend {
        change: round2(change),
        direction,
        samples: window.len(),
    })
}
