use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use super::alerts::{self, AlertThresholds, RealtimeStatus};
use super::history::BoundedHistory;
use super::percentiles::{mean, round2, PercentileSet};
use super::snapshot::{
    ApiStats, CpuStats, DatabaseStats, MemoryStats, NetworkStats, PerformanceStats,
    RequestStats, ResourceStats, UptimeInfo,
};
use super::views::{
    self, DatabaseReport, EndpointListing, EndpointQuery, ErrorListing, ErrorQuery,
    RequestListing, RequestQuery, ResourceReport, SlowRequestQuery,
};
use super::{
    CpuSample, NetworkSample, ProcessMemorySample, QuerySample, RequestMeta, RequestSample,
    SystemMemorySample,
};

// ─── Configuration ───────────────────────────────────────────────

/// Retained request observations for averages and percentiles
const MAX_RESPONSE_SAMPLES: usize = 1000;
const MAX_SLOW_REQUESTS: usize = 50;
const MAX_ERROR_RECORDS: usize = 100;
const MAX_SLOW_QUERIES: usize = 50;

/// Per resource class (CPU, process memory, system memory, network)
pub const MAX_RESOURCE_SAMPLES: usize = 100;

pub const SLOW_REQUEST_MS: f64 = 1000.0;
pub const SLOW_QUERY_MS: f64 = 100.0;
pub const ERROR_STATUS_MIN: u16 = 400;

const QUERY_TEXT_LIMIT: usize = 100;

/// Entries older than this are swept by `cleanup`
pub const RETENTION_SECS: i64 = 3600;

/// How much of each history `stats()` ships
const STATS_HISTORY_LEN: usize = 20;
const STATS_TOP_N: usize = 10;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe metrics engine.
/// The request observer calls `begin_request`/`end_request`, the sampler
/// pushes resource snapshots, the HTTP read side calls `stats()` and friends.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
    /// Latest sampled RSS, readable without taking the lock
    current_rss: AtomicU64,
}

/// Captured by `begin_request`, consumed by `end_request`.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    started: Option<Instant>,
    rss_at_start: u64,
}

impl RequestContext {
    /// A context with no start time. `end_request` ignores it.
    #[cfg(test)]
    pub fn detached() -> Self {
        Self {
            started: None,
            rss_at_start: 0,
        }
    }
}

/// Running statistics for one (method, path) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointAggregate {
    pub method: String,
    pub path: String,
    pub count: u64,
    pub total_duration: f64,
    pub average_duration: f64,
    pub status_codes: BTreeMap<u16, u64>,
    pub max_duration: f64,
    pub min_duration: f64,
}

impl EndpointAggregate {
    fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_owned(),
            path: path.to_owned(),
            count: 0,
            total_duration: 0.0,
            average_duration: 0.0,
            status_codes: BTreeMap::new(),
            max_duration: f64::MIN,
            min_duration: f64::MAX,
        }
    }

    fn observe(&mut self, duration: f64, status: u16) {
        self.count += 1;
        self.total_duration += duration;
        self.average_duration = self.total_duration / self.count as f64;
        self.max_duration = self.max_duration.max(duration);
        self.min_duration = self.min_duration.min(duration);
        *self.status_codes.entry(status).or_insert(0) += 1;
    }

    pub fn error_count(&self) -> u64 {
        self.status_codes
            .iter()
            .filter(|(code, _)| **code >= ERROR_STATUS_MIN)
            .map(|(_, n)| n)
            .sum()
    }
}

/// Cumulative network counters since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTotals {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    started_at: DateTime<Utc>,

    // Counters
    total_requests: u64,
    by_method: BTreeMap<String, u64>,
    by_status: BTreeMap<u16, u64>,

    // Bounded request histories
    response_times: BoundedHistory<RequestSample>,
    slow_requests: BoundedHistory<RequestSample>,
    errors: BoundedHistory<RequestSample>,

    endpoints: BTreeMap<String, EndpointAggregate>,

    database: DatabaseState,

    // Hardware telemetry, survives `reset`
    resources: ResourceState,
}

struct DatabaseState {
    total_queries: u64,
    slow_query_count: u64,
    average_duration: f64,
    queries: BoundedHistory<QuerySample>,
    slow_queries: BoundedHistory<QuerySample>,
}

struct ResourceState {
    cpu: BoundedHistory<CpuSample>,
    process_memory: BoundedHistory<ProcessMemorySample>,
    system_memory: BoundedHistory<SystemMemorySample>,
    network: BoundedHistory<NetworkSample>,
    network_totals: NetworkTotals,
}

// ─── MetricsCollector impl ───────────────────────────────────────

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new(Utc::now())),
            current_rss: AtomicU64::new(0),
        }
    }

    /// Purely local capture; never touches the shared state.
    pub fn begin_request(&self) -> RequestContext {
        RequestContext {
            started: Some(Instant::now()),
            rss_at_start: self.current_rss.load(Ordering::Relaxed),
        }
    }

    /// Finalize one request and return the recorded duration (ms).
    /// A context without a start time is dropped.
    pub fn end_request(&self, ctx: RequestContext, meta: RequestMeta) -> Option<f64> {
        let Some(started) = ctx.started else {
            tracing::warn!(
                method = %meta.method,
                path = %meta.path,
                "request context missing start time, not recorded"
            );
            return None;
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let memory_delta =
            self.current_rss.load(Ordering::Relaxed) as i64 - ctx.rss_at_start as i64;
        self.inner
            .lock()
            .record_request(meta, duration_ms, memory_delta, Utc::now());
        Some(duration_ms)
    }

    /// Record an already-measured request.
    #[cfg(test)]
    pub fn record_request(&self, meta: RequestMeta, duration_ms: f64) {
        self.inner
            .lock()
            .record_request(meta, duration_ms, 0, Utc::now());
    }

    pub fn track_database_query(&self, query: &str, duration_ms: f64) {
        self.inner
            .lock()
            .database
            .track(query, duration_ms, Utc::now());
    }

    pub fn record_cpu(&self, sample: CpuSample) {
        self.inner.lock().resources.cpu.push(sample);
    }

    pub fn record_process_memory(&self, sample: ProcessMemorySample) {
        self.current_rss.store(sample.rss_bytes, Ordering::Relaxed);
        self.inner.lock().resources.process_memory.push(sample);
    }

    pub fn record_system_memory(&self, sample: SystemMemorySample) {
        self.inner.lock().resources.system_memory.push(sample);
    }

    /// Append a network delta and fold it into the running totals.
    pub fn record_network(&self, sample: NetworkSample) {
        let mut inner = self.inner.lock();
        let totals = &mut inner.resources.network_totals;
        totals.bytes_in = totals.bytes_in.saturating_add(sample.bytes_in);
        totals.bytes_out = totals.bytes_out.saturating_add(sample.bytes_out);
        inner.resources.network.push(sample);
    }

    /// Sweep request, error, slow and query records older than the retention window.
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(RETENTION_SECS);
        self.inner.lock().sweep(cutoff)
    }

    /// Clear workload counters and histories. Resource telemetry is kept.
    pub fn reset(&self) {
        self.inner.lock().reset_workload(Utc::now());
    }

    pub fn stats(&self) -> PerformanceStats {
        self.stats_at(Utc::now())
    }

    /// Read-only snapshot as of `now`.
    pub fn stats_at(&self, now: DateTime<Utc>) -> PerformanceStats {
        self.inner.lock().snapshot(now)
    }

    pub fn uptime_at(&self, now: DateTime<Utc>) -> UptimeInfo {
        self.inner.lock().uptime(now)
    }

    pub fn current_rss(&self) -> u64 {
        self.current_rss.load(Ordering::Relaxed)
    }

    pub fn has_memory_sample(&self) -> bool {
        !self.inner.lock().resources.process_memory.is_empty()
    }

    pub fn request_listing(&self, query: &RequestQuery) -> RequestListing {
        views::request_listing(self.inner.lock().response_times.iter(), query)
    }

    pub fn slow_request_listing(&self, query: &SlowRequestQuery) -> RequestListing {
        views::slow_request_listing(self.inner.lock().response_times.iter(), query)
    }

    pub fn error_listing(&self, query: &ErrorQuery) -> ErrorListing {
        views::error_listing(self.inner.lock().errors.iter(), query)
    }

    pub fn endpoint_listing(&self, query: &EndpointQuery) -> EndpointListing {
        views::endpoint_listing(self.inner.lock().endpoints.values(), query)
    }

    pub fn database_report(&self) -> DatabaseReport {
        let inner = self.inner.lock();
        let db = &inner.database;
        views::database_report(
            db.total_queries,
            db.slow_query_count,
            db.average_duration,
            &db.queries,
            &db.slow_queries,
        )
    }

    pub fn resource_report(&self) -> ResourceReport {
        let inner = self.inner.lock();
        let r = &inner.resources;
        views::resource_report(
            &r.cpu,
            &r.process_memory,
            &r.system_memory,
            &r.network,
            r.network_totals,
        )
    }

    pub fn realtime_at(
        &self,
        now: DateTime<Utc>,
        thresholds: &AlertThresholds,
    ) -> RealtimeStatus {
        let inner = self.inner.lock();
        let durations: Vec<f64> = inner.response_times.iter().map(|s| s.duration).collect();
        alerts::realtime_status(
            now,
            inner.response_times.iter(),
            PercentileSet::from_durations(&durations).p99,
            inner.resources.cpu.latest().copied(),
            inner.resources.process_memory.latest().copied(),
            thresholds,
        )
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            total_requests: 0,
            by_method: BTreeMap::new(),
            by_status: BTreeMap::new(),
            response_times: BoundedHistory::with_capacity(MAX_RESPONSE_SAMPLES),
            slow_requests: BoundedHistory::with_capacity(MAX_SLOW_REQUESTS),
            errors: BoundedHistory::with_capacity(MAX_ERROR_RECORDS),
            endpoints: BTreeMap::new(),
            database: DatabaseState::new(),
            resources: ResourceState::new(),
        }
    }

    fn record_request(
        &mut self,
        meta: RequestMeta,
        duration: f64,
        memory_delta: i64,
        now: DateTime<Utc>,
    ) {
        // ── Counters ────────────────────────────────────────────
        self.total_requests += 1;
        *self.by_method.entry(meta.method.clone()).or_insert(0) += 1;
        *self.by_status.entry(meta.status_code).or_insert(0) += 1;

        // ── Endpoint aggregate ──────────────────────────────────
        let key = format!("{} {}", meta.method, meta.path);
        self.endpoints
            .entry(key)
            .or_insert_with(|| EndpointAggregate::new(&meta.method, &meta.path))
            .observe(duration, meta.status_code);

        // ── Histories ───────────────────────────────────────────
        let sample = RequestSample {
            id: Uuid::new_v4(),
            method: meta.method,
            path: meta.path,
            status_code: meta.status_code,
            duration,
            timestamp: now,
            client_ip: meta.client_ip,
            user_agent: meta.user_agent,
            memory_delta,
        };

        if duration >= SLOW_REQUEST_MS {
            tracing::debug!(
                method = %sample.method,
                path = %sample.path,
                duration_ms = duration,
                "slow request"
            );
            self.slow_requests.push(sample.clone());
        }
        if sample.status_code >= ERROR_STATUS_MIN {
            self.errors.push(sample.clone());
        }
        self.response_times.push(sample);
    }

    fn sweep(&mut self, cutoff: DateTime<Utc>) -> usize {
        self.response_times.retain_since(cutoff)
            + self.slow_requests.retain_since(cutoff)
            + self.errors.retain_since(cutoff)
            + self.database.queries.retain_since(cutoff)
            + self.database.slow_queries.retain_since(cutoff)
    }

    fn reset_workload(&mut self, now: DateTime<Utc>) {
        let resources = std::mem::replace(&mut self.resources, ResourceState::new());
        *self = Inner::new(now);
        self.resources = resources;
    }

    fn uptime(&self, now: DateTime<Utc>) -> UptimeInfo {
        let ms = (now - self.started_at).num_milliseconds().max(0);
        UptimeInfo::new(self.started_at, ms)
    }

    /// Build a complete read-only snapshot.
    fn snapshot(&self, now: DateTime<Utc>) -> PerformanceStats {
        let uptime = self.uptime(now);
        let uptime_secs = uptime.milliseconds as f64 / 1000.0;

        let per_second = if uptime_secs > 0.0 {
            self.total_requests as f64 / uptime_secs
        } else {
            0.0
        };

        // Retained errors over the lifetime total; see DESIGN.md.
        let error_rate = if self.total_requests > 0 {
            self.errors.len() as f64 / self.total_requests as f64 * 100.0
        } else {
            0.0
        };

        let durations: Vec<f64> = self.response_times.iter().map(|s| s.duration).collect();

        let mut slowest: Vec<RequestSample> = self.slow_requests.iter().cloned().collect();
        slowest.sort_by(|a, b| b.duration.total_cmp(&a.duration));
        slowest.truncate(STATS_TOP_N);

        let mut recent_errors = self.errors.tail(STATS_TOP_N);
        recent_errors.reverse();

        let r = &self.resources;
        let db = &self.database;

        PerformanceStats {
            timestamp: now,
            uptime,
            requests: RequestStats {
                total: self.total_requests,
                per_second: round2(per_second),
                error_rate: round2(error_rate),
                average_response_time: round2(mean(&durations)),
                percentiles: PercentileSet::from_durations(&durations),
                by_method: self.by_method.clone(),
                by_status_code: self.by_status.clone(),
                retained: self.response_times.len(),
                retained_errors: self.errors.len(),
            },
            resources: ResourceStats {
                cpu: CpuStats {
                    current: r.cpu.latest().copied(),
                    history: r.cpu.tail(STATS_HISTORY_LEN),
                },
                memory: MemoryStats {
                    process: r.process_memory.latest().copied(),
                    system: r.system_memory.latest().copied(),
                    history: r.process_memory.tail(STATS_HISTORY_LEN),
                    system_history: r.system_memory.tail(STATS_HISTORY_LEN),
                },
                network: NetworkStats {
                    current: r.network.latest().copied(),
                    totals: r.network_totals,
                    history: r.network.tail(STATS_HISTORY_LEN),
                },
            },
            database: DatabaseStats {
                total_queries: db.total_queries,
                slow_queries: db.slow_query_count,
                average_query_time: round2(db.average_duration),
                recent_queries: db.queries.tail(STATS_TOP_N),
                slow_query_log: db.slow_queries.tail(STATS_TOP_N),
            },
            api: ApiStats {
                endpoints: self.endpoints.values().map(views::EndpointStats::from).collect(),
                slow_requests: slowest,
                recent_errors,
            },
        }
    }
}

impl DatabaseState {
    fn new() -> Self {
        Self {
            total_queries: 0,
            slow_query_count: 0,
            average_duration: 0.0,
            queries: BoundedHistory::unbounded(),
            slow_queries: BoundedHistory::with_capacity(MAX_SLOW_QUERIES),
        }
    }

    fn track(&mut self, query: &str, duration: f64, now: DateTime<Utc>) {
        self.total_queries += 1;
        let n = self.total_queries as f64;
        self.average_duration = (self.average_duration * (n - 1.0) + duration) / n;

        let sample = QuerySample {
            query: query.chars().take(QUERY_TEXT_LIMIT).collect(),
            duration,
            timestamp: now,
        };

        if duration > SLOW_QUERY_MS {
            self.slow_query_count += 1;
            self.slow_queries.push(sample.clone());
        }
        self.queries.push(sample);
    }
}

impl ResourceState {
    fn new() -> Self {
        Self {
            cpu: BoundedHistory::with_capacity(MAX_RESOURCE_SAMPLES),
            process_memory: BoundedHistory::with_capacity(MAX_RESOURCE_SAMPLES),
            system_memory: BoundedHistory::with_capacity(MAX_RESOURCE_SAMPLES),
            network: BoundedHistory::with_capacity(MAX_RESOURCE_SAMPLES),
            network_totals: NetworkTotals::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(method: &str, path: &str, status: u16) -> RequestMeta {
        RequestMeta {
            method: method.into(),
            path: path.into(),
            status_code: status,
            client_ip: Some("127.0.0.1".into()),
            user_agent: None,
        }
    }

    fn cpu(percent: f64) -> CpuSample {
        CpuSample {
            timestamp: Utc::now(),
            usage_percent: percent,
            user_time: 1.0,
            system_time: 1.0,
        }
    }

    #[test]
    fn counters_and_histories_update_per_request() {
        let c = MetricsCollector::new();
        c.record_request(meta("GET", "/api/posts", 200), 12.5);
        c.record_request(meta("POST", "/api/posts", 201), 30.0);
        c.record_request(meta("GET", "/api/posts/:id", 404), 4.0);

        let stats = c.stats();
        assert_eq!(stats.requests.total, 3);
        assert_eq!(stats.requests.by_method.get("GET"), Some(&2));
        assert_eq!(stats.requests.by_method.get("POST"), Some(&1));
        assert_eq!(stats.requests.by_status_code.get(&404), Some(&1));
        assert_eq!(stats.requests.retained, 3);
        assert_eq!(stats.api.recent_errors.len(), 1);
        assert_eq!(stats.api.endpoints.len(), 3);
    }

    #[test]
    fn endpoint_average_max_min() {
        let c = MetricsCollector::new();
        for d in [100.0, 200.0, 300.0] {
            c.record_request(meta("GET", "/api/posts", 200), d);
        }
        let stats = c.stats();
        let ep = &stats.api.endpoints[0];
        assert_eq!(ep.count, 3);
        assert_eq!(ep.average_duration, 200.0);
        assert_eq!(ep.max_duration, 300.0);
        assert_eq!(ep.min_duration, 100.0);
        assert_eq!(ep.status_codes.get(&200), Some(&3));
    }

    #[test]
    fn error_rate_over_total_requests() {
        let c = MetricsCollector::new();
        for i in 0..10 {
            let status = if i < 2 { 500 } else { 200 };
            c.record_request(meta("GET", "/api/posts", status), 10.0);
        }
        let stats = c.stats();
        assert_eq!(stats.requests.error_rate, 20.0);
        assert_eq!(stats.api.recent_errors.len(), 2);
    }

    #[test]
    fn slow_request_history_evicts_first_of_51() {
        let c = MetricsCollector::new();
        for i in 1..=51 {
            c.record_request(meta("GET", &format!("/slow/{i}"), 200), 1000.0 + i as f64);
        }
        let inner = c.inner.lock();
        assert_eq!(inner.slow_requests.len(), MAX_SLOW_REQUESTS);
        assert!(!inner.slow_requests.iter().any(|s| s.path == "/slow/1"));
        assert!(inner.slow_requests.iter().any(|s| s.path == "/slow/2"));
        assert_eq!(
            inner.slow_requests.latest().map(|s| s.path.as_str()),
            Some("/slow/51")
        );
    }

    #[test]
    fn error_history_capped_at_100() {
        let c = MetricsCollector::new();
        for i in 0..150 {
            c.record_request(meta("GET", &format!("/fail/{i}"), 500), 5.0);
        }
        let stats = c.stats();
        assert_eq!(stats.requests.total, 150);
        assert_eq!(stats.requests.retained_errors, 100);
        // Retained errors over lifetime total, so truncation lowers the rate
        assert_eq!(stats.requests.error_rate, round2(100.0 / 150.0 * 100.0));
        assert_eq!(stats.api.recent_errors[0].path, "/fail/149");

        let listing = c.error_listing(&ErrorQuery {
            limit: Some(200),
            ..Default::default()
        });
        assert_eq!(listing.summary.total, 100);
        assert!(!listing.errors.iter().any(|e| e.path == "/fail/49"));
        assert!(listing.errors.iter().any(|e| e.path == "/fail/50"));
    }

    #[test]
    fn slow_threshold_is_inclusive() {
        let c = MetricsCollector::new();
        c.record_request(meta("GET", "/fast", 200), 999.0);
        c.record_request(meta("GET", "/edge", 200), 1000.0);
        c.record_request(meta("GET", "/slow", 200), 2500.0);

        let slow: Vec<_> = c
            .stats()
            .api
            .slow_requests
            .into_iter()
            .map(|s| s.path)
            .collect();
        assert_eq!(slow, vec!["/slow".to_string(), "/edge".to_string()]);
    }

    #[test]
    fn response_history_is_bounded() {
        let c = MetricsCollector::new();
        for i in 0..1_050 {
            c.record_request(meta("GET", "/p", 200), i as f64);
        }
        let stats = c.stats();
        assert_eq!(stats.requests.total, 1_050);
        assert_eq!(stats.requests.retained, MAX_RESPONSE_SAMPLES);
        // Oldest 50 evicted, so the smallest retained duration is 50
        let listing = c.request_listing(&RequestQuery::default());
        assert_eq!(listing.summary.min, 50.0);
    }

    #[test]
    fn percentiles_over_retained_durations() {
        let c = MetricsCollector::new();
        for d in [10.0, 20.0, 30.0, 40.0, 50.0] {
            c.record_request(meta("GET", "/p", 200), d);
        }
        let stats = c.stats();
        assert_eq!(stats.requests.percentiles.p50, 30.0);
        assert_eq!(stats.requests.percentiles.p95, 50.0);
        assert_eq!(stats.requests.average_response_time, 30.0);
    }

    #[test]
    fn empty_collector_reports_zeros() {
        let c = MetricsCollector::new();
        let stats = c.stats();
        assert_eq!(stats.requests.total, 0);
        assert_eq!(stats.requests.error_rate, 0.0);
        assert_eq!(stats.requests.average_response_time, 0.0);
        assert_eq!(stats.requests.percentiles, PercentileSet::empty());
        assert!(stats.resources.cpu.current.is_none());
    }

    #[test]
    fn stats_read_is_idempotent() {
        let c = MetricsCollector::new();
        c.record_request(meta("GET", "/p", 200), 5.0);
        c.track_database_query("SELECT 1", 3.0);
        c.record_cpu(cpu(12.0));

        let now = Utc::now();
        let a = serde_json::to_value(c.stats_at(now)).unwrap();
        let b = serde_json::to_value(c.stats_at(now)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reset_keeps_resource_history() {
        let c = MetricsCollector::new();
        c.record_cpu(cpu(10.0));
        c.record_cpu(cpu(20.0));
        c.record_request(meta("GET", "/p", 500), 5.0);
        c.track_database_query("SELECT 1", 300.0);

        let cpu_before = c.stats().resources.cpu.history;
        c.reset();
        let stats = c.stats();

        assert_eq!(stats.requests.total, 0);
        assert_eq!(stats.requests.retained, 0);
        assert!(stats.api.recent_errors.is_empty());
        assert!(stats.api.endpoints.is_empty());
        assert_eq!(stats.database.total_queries, 0);
        assert_eq!(stats.database.slow_queries, 0);
        assert_eq!(stats.resources.cpu.history, cpu_before);
    }

    #[test]
    fn detached_context_is_ignored() {
        let c = MetricsCollector::new();
        c.end_request(RequestContext::detached(), meta("GET", "/p", 200));
        assert_eq!(c.stats().requests.total, 0);
    }

    #[test]
    fn begin_end_records_elapsed_time() {
        let c = MetricsCollector::new();
        let ctx = c.begin_request();
        c.end_request(ctx, meta("GET", "/p", 200));
        let stats = c.stats();
        assert_eq!(stats.requests.total, 1);
        assert!(stats.requests.average_response_time >= 0.0);
    }

    #[test]
    fn database_running_average_and_slow_log() {
        let c = MetricsCollector::new();
        c.track_database_query("SELECT * FROM posts", 50.0);
        c.track_database_query("SELECT * FROM users", 150.0);
        c.track_database_query("SELECT * FROM tags", 100.0);

        let db = c.stats().database;
        assert_eq!(db.total_queries, 3);
        assert_eq!(db.average_query_time, 100.0);
        // 100ms is not slow; only strictly greater counts
        assert_eq!(db.slow_queries, 1);
        assert_eq!(db.slow_query_log.len(), 1);
        assert_eq!(db.slow_query_log[0].duration, 150.0);
    }

    #[test]
    fn query_text_truncated_to_100_chars() {
        let c = MetricsCollector::new();
        let long = "x".repeat(250);
        c.track_database_query(&long, 1.0);
        let db = c.stats().database;
        assert_eq!(db.recent_queries[0].query.chars().count(), 100);
    }

    #[test]
    fn cleanup_sweeps_old_records() {
        let c = MetricsCollector::new();
        c.record_request(meta("GET", "/p", 500), 1500.0);
        c.track_database_query("SELECT 1", 200.0);

        // Nothing is an hour old yet
        assert_eq!(c.cleanup(Utc::now()), 0);

        let removed = c.cleanup(Utc::now() + Duration::seconds(RETENTION_SECS + 1));
        // request + slow + error + query + slow query
        assert_eq!(removed, 5);
        let stats = c.stats();
        assert_eq!(stats.requests.retained, 0);
        // Counters are monotonic and survive the sweep
        assert_eq!(stats.requests.total, 1);
        assert_eq!(stats.database.total_queries, 1);
    }

    #[test]
    fn network_totals_accumulate() {
        let c = MetricsCollector::new();
        for _ in 0..3 {
            c.record_network(NetworkSample {
                timestamp: Utc::now(),
                bytes_in: 100,
                bytes_out: 40,
                bytes_in_per_sec: 10.0,
                bytes_out_per_sec: 4.0,
            });
        }
        let net = c.stats().resources.network;
        assert_eq!(net.totals.bytes_in, 300);
        assert_eq!(net.totals.bytes_out, 120);
        assert_eq!(net.history.len(), 3);
    }

    #[test]
    fn resource_history_capped() {
        let c = MetricsCollector::new();
        for i in 0..(MAX_RESOURCE_SAMPLES + 20) {
            c.record_cpu(cpu(i as f64));
        }
        let report = c.resource_report();
        assert_eq!(report.cpu.current.map(|s| s.usage_percent), Some(119.0));
        // Stats ships a trimmed view
        assert_eq!(c.stats().resources.cpu.history.len(), STATS_HISTORY_LEN);
    }

    #[test]
    fn memory_sample_updates_cached_rss() {
        let c = MetricsCollector::new();
        assert!(!c.has_memory_sample());
        c.record_process_memory(ProcessMemorySample {
            timestamp: Utc::now(),
            rss_bytes: 4096,
            virtual_bytes: 8192,
        });
        assert!(c.has_memory_sample());
        assert_eq!(c.current_rss(), 4096);
    }
}
