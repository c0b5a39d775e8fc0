//! Live status and threshold-derived alerts.
//!
//! Alerts are computed on every read and never stored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::collector::ERROR_STATUS_MIN;
use super::percentiles::round2;
use super::{CpuSample, ProcessMemorySample, RequestSample};

/// Requests newer than this count towards the realtime window
const REALTIME_WINDOW_SECS: i64 = 60;

/// Warning / critical pair for one signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub warning: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertThresholds {
    /// Percent of requests in the realtime window
    pub error_rate: Level,
    pub cpu_percent: Level,
    /// Average over the realtime window (ms)
    pub response_time_ms: Level,
    pub p99_ms: Level,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            error_rate: Level {
                warning: 5.0,
                critical: 10.0,
            },
            cpu_percent: Level {
                warning: 80.0,
                critical: 95.0,
            },
            response_time_ms: Level {
                warning: 1_000.0,
                critical: 3_000.0,
            },
            p99_ms: Level {
                warning: 2_000.0,
                critical: 5_000.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertKind {
    HighErrorRate,
    HighCpu,
    SlowResponses,
    HighP99,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub requests: usize,
    pub requests_per_second: f64,
    pub average_response_time: f64,
    pub errors: usize,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeStatus {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub last_minute: WindowStats,
    pub cpu_percent: Option<f64>,
    pub rss_bytes: Option<u64>,
    pub p99: f64,
    pub alerts: Vec<Alert>,
}

pub fn realtime_status<'a, I>(
    now: DateTime<Utc>,
    samples: I,
    p99: f64,
    cpu: Option<CpuSample>,
    memory: Option<ProcessMemorySample>,
    thresholds: &AlertThresholds,
) -> RealtimeStatus
where
    I: Iterator<Item = &'a RequestSample>,
{
    let cutoff = now - Duration::seconds(REALTIME_WINDOW_SECS);
    let (mut requests, mut errors, mut total_ms) = (0usize, 0usize, 0.0f64);
    for s in samples.filter(|s| s.timestamp >= cutoff) {
        requests += 1;
        total_ms += s.duration;
        if s.status_code >= ERROR_STATUS_MIN {
            errors += 1;
        }
    }

    let (average, error_rate) = if requests > 0 {
        (
            total_ms / requests as f64,
            errors as f64 / requests as f64 * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    let last_minute = WindowStats {
        requests,
        requests_per_second: round2(requests as f64 / REALTIME_WINDOW_SECS as f64),
        average_response_time: round2(average),
        errors,
        error_rate: round2(error_rate),
    };

    let cpu_percent = cpu.map(|c| c.usage_percent);
    let mut alerts = Vec::new();
    if requests > 0 {
        push_alert(
            &mut alerts,
            AlertKind::HighErrorRate,
            error_rate,
            thresholds.error_rate,
            "error rate",
            "%",
        );
        push_alert(
            &mut alerts,
            AlertKind::SlowResponses,
            average,
            thresholds.response_time_ms,
            "average response time",
            "ms",
        );
    }
    if let Some(cpu) = cpu_percent {
        push_alert(
            &mut alerts,
            AlertKind::HighCpu,
            cpu,
            thresholds.cpu_percent,
            "CPU usage",
            "%",
        );
    }
    push_alert(
        &mut alerts,
        AlertKind::HighP99,
        p99,
        thresholds.p99_ms,
        "p99 response time",
        "ms",
    );

    let status = match alerts.iter().map(|a| a.severity).max() {
        Some(Severity::Critical) => HealthStatus::Critical,
        Some(Severity::Warning) => HealthStatus::Warning,
        None => HealthStatus::Healthy,
    };

    RealtimeStatus {
        timestamp: now,
        status,
        last_minute,
        cpu_percent,
        rss_bytes: memory.map(|m| m.rss_bytes),
        p99,
        alerts,
    }
}

fn push_alert(
    alerts: &mut Vec<Alert>,
    kind: AlertKind,
    value: f64,
    level: Level,
    label: &str,
    unit: &str,
) {
    let (severity, threshold) = if value > level.critical {
        (Severity::Critical, level.critical)
    } else if value > level.warning {
        (Severity::Warning, level.warning)
    } else {
        return;
    };
    let value = round2(value);
    alerts.push(Alert {
        kind,
        severity,
        message: format!("{label} {value}{unit} exceeds {threshold}{unit}"),
        value,
        threshold,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample(status: u16, duration: f64, age_secs: i64, now: DateTime<Utc>) -> RequestSample {
        RequestSample {
            id: Uuid::new_v4(),
            method: "GET".into(),
            path: "/api/posts".into(),
            status_code: status,
            duration,
            timestamp: now - Duration::seconds(age_secs),
            client_ip: None,
            user_agent: None,
            memory_delta: 0,
        }
    }

    fn cpu(percent: f64) -> CpuSample {
        CpuSample {
            timestamp: Utc::now(),
            usage_percent: percent,
            user_time: 0.0,
            system_time: 0.0,
        }
    }

    #[test]
    fn quiet_system_is_healthy() {
        let now = Utc::now();
        let data = vec![sample(200, 20.0, 5, now), sample(200, 40.0, 10, now)];
        let status = realtime_status(
            now,
            data.iter(),
            40.0,
            Some(cpu(12.0)),
            None,
            &AlertThresholds::default(),
        );
        assert_eq!(status.status, HealthStatus::Healthy);
        assert!(status.alerts.is_empty());
        assert_eq!(status.last_minute.requests, 2);
        assert_eq!(status.last_minute.average_response_time, 30.0);
    }

    #[test]
    fn only_last_minute_counts() {
        let now = Utc::now();
        let data = vec![sample(500, 20.0, 120, now), sample(200, 20.0, 1, now)];
        let status = realtime_status(now, data.iter(), 20.0, None, None, &AlertThresholds::default());
        assert_eq!(status.last_minute.requests, 1);
        assert_eq!(status.last_minute.errors, 0);
        assert_eq!(status.status, HealthStatus::Healthy);
    }

    #[test]
    fn error_rate_and_cpu_raise_alerts() {
        let now = Utc::now();
        let mut data: Vec<_> = (0..8).map(|_| sample(200, 10.0, 1, now)).collect();
        data.push(sample(500, 10.0, 1, now));
        data.push(sample(502, 10.0, 1, now));

        let status = realtime_status(
            now,
            data.iter(),
            10.0,
            Some(cpu(85.0)),
            None,
            &AlertThresholds::default(),
        );
        // 20% errors is past the critical mark
        assert_eq!(status.status, HealthStatus::Critical);
        let kinds: Vec<_> = status.alerts.iter().map(|a| (a.kind, a.severity)).collect();
        assert!(kinds.contains(&(AlertKind::HighErrorRate, Severity::Critical)));
        assert!(kinds.contains(&(AlertKind::HighCpu, Severity::Warning)));
    }

    #[test]
    fn p99_warning_alone_sets_warning() {
        let now = Utc::now();
        let status = realtime_status(
            now,
            std::iter::empty(),
            2_500.0,
            None,
            None,
            &AlertThresholds::default(),
        );
        assert_eq!(status.status, HealthStatus::Warning);
        assert_eq!(status.alerts[0].kind, AlertKind::HighP99);
        assert_eq!(status.alerts[0].threshold, 2_000.0);
    }
}
