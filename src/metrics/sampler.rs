//! Periodic resource sampling.
//!
//! One tokio task drives four intervals (CPU, memory, network, retention
//! sweep). Each tick is a synchronous read of the probe followed by a single
//! push into the collector. A failed read is logged and the tick skipped.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sysinfo::{Networks, Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, MissedTickBehavior};

use super::percentiles::round2;
use super::{CpuSample, MetricsCollector, NetworkSample, ProcessMemorySample, SystemMemorySample};
use crate::config::MonitorConfig;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("cpu times unavailable: {0}")]
    Cpu(String),
    #[error("process {0} not found")]
    ProcessMissing(u32),
    #[error("system memory reports zero total")]
    NoSystemMemory,
    #[error("{0} probe not supported on this platform")]
    #[cfg_attr(unix, allow(dead_code))]
    Unsupported(&'static str),
}

/// Cumulative CPU time consumed by this process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user_micros: u64,
    pub system_micros: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessMemory {
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemMemory {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
}

/// Cumulative bytes across every interface since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub received: u64,
    pub transmitted: u64,
}

/// Source of raw OS readings.
pub trait ResourceProbe: Send + 'static {
    fn cpu_times(&mut self) -> Result<CpuTimes, ProbeError>;
    fn process_memory(&mut self) -> Result<ProcessMemory, ProbeError>;
    fn system_memory(&mut self) -> Result<SystemMemory, ProbeError>;
    fn network_counters(&mut self) -> Result<InterfaceCounters, ProbeError>;
}

// ─── sysinfo-backed probe ────────────────────────────────────────

pub struct SysinfoProbe {
    system: System,
    pid: Pid,
}

impl SysinfoProbe {
    pub fn new() -> Result<Self, ProbeError> {
        let pid = sysinfo::get_current_pid().map_err(|e| ProbeError::Cpu(e.to_string()))?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl ResourceProbe for SysinfoProbe {
    fn cpu_times(&mut self) -> Result<CpuTimes, ProbeError> {
        rusage_times()
    }

    fn process_memory(&mut self) -> Result<ProcessMemory, ProbeError> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        let process = self
            .system
            .process(self.pid)
            .ok_or(ProbeError::ProcessMissing(self.pid.as_u32()))?;
        Ok(ProcessMemory {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        })
    }

    fn system_memory(&mut self) -> Result<SystemMemory, ProbeError> {
        self.system.refresh_memory();
        let total_bytes = self.system.total_memory();
        if total_bytes == 0 {
            return Err(ProbeError::NoSystemMemory);
        }
        Ok(SystemMemory {
            total_bytes,
            free_bytes: self.system.free_memory(),
            used_bytes: self.system.used_memory(),
        })
    }

    fn network_counters(&mut self) -> Result<InterfaceCounters, ProbeError> {
        let networks = Networks::new_with_refreshed_list();
        let mut counters = InterfaceCounters::default();
        for data in networks.list().values() {
            counters.received = counters.received.saturating_add(data.total_received());
            counters.transmitted = counters.transmitted.saturating_add(data.total_transmitted());
        }
        Ok(counters)
    }
}

#[cfg(unix)]
fn rusage_times() -> Result<CpuTimes, ProbeError> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: `usage` is a valid, writable rusage-sized buffer for the call.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return Err(ProbeError::Cpu(std::io::Error::last_os_error().to_string()));
    }
    // SAFETY: getrusage returned 0, so it filled the struct. It was zeroed
    // beforehand and rusage is plain integers, so every byte is initialised.
    let usage = unsafe { usage.assume_init() };
    Ok(CpuTimes {
        user_micros: timeval_micros(usage.ru_utime),
        system_micros: timeval_micros(usage.ru_stime),
    })
}

#[cfg(unix)]
fn timeval_micros(tv: libc::timeval) -> u64 {
    (tv.tv_sec.max(0) as u64) * 1_000_000 + tv.tv_usec.max(0) as u64
}

#[cfg(not(unix))]
fn rusage_times() -> Result<CpuTimes, ProbeError> {
    Err(ProbeError::Unsupported("cpu"))
}

// ─── Sampler ─────────────────────────────────────────────────────

/// Turns probe readings into samples. Keeps the previous cumulative
/// readings so CPU and network can be reported as deltas.
pub struct ResourceSampler<P> {
    collector: Arc<MetricsCollector>,
    probe: P,
    last_cpu: Option<(Instant, CpuTimes)>,
    last_net: Option<(Instant, InterfaceCounters)>,
}

impl<P: ResourceProbe> ResourceSampler<P> {
    pub fn new(collector: Arc<MetricsCollector>, probe: P) -> Self {
        Self {
            collector,
            probe,
            last_cpu: None,
            last_net: None,
        }
    }

    /// Take the CPU and network baselines without recording anything.
    pub fn prime(&mut self, at: Instant) {
        if let Ok(times) = self.probe.cpu_times() {
            self.last_cpu = Some((at, times));
        }
        if let Ok(counters) = self.probe.network_counters() {
            self.last_net = Some((at, counters));
        }
    }

    pub fn sample_cpu(&mut self, at: Instant) -> Result<(), ProbeError> {
        let times = self.probe.cpu_times()?;
        let Some((prev_at, prev)) = self.last_cpu.replace((at, times)) else {
            return Ok(());
        };

        let wall_micros = at.saturating_duration_since(prev_at).as_micros() as f64;
        if wall_micros <= 0.0 {
            return Ok(());
        }
        let user = times.user_micros.saturating_sub(prev.user_micros);
        let system = times.system_micros.saturating_sub(prev.system_micros);

        self.collector.record_cpu(CpuSample {
            timestamp: Utc::now(),
            usage_percent: round2((user + system) as f64 / wall_micros * 100.0),
            user_time: round2(user as f64 / 1000.0),
            system_time: round2(system as f64 / 1000.0),
        });
        Ok(())
    }

    pub fn sample_process_memory(&mut self) -> Result<(), ProbeError> {
        let mem = self.probe.process_memory()?;
        self.collector.record_process_memory(ProcessMemorySample {
            timestamp: Utc::now(),
            rss_bytes: mem.rss_bytes,
            virtual_bytes: mem.virtual_bytes,
        });
        Ok(())
    }

    pub fn sample_system_memory(&mut self) -> Result<(), ProbeError> {
        let mem = self.probe.system_memory()?;
        self.collector.record_system_memory(SystemMemorySample {
            timestamp: Utc::now(),
            total_bytes: mem.total_bytes,
            free_bytes: mem.free_bytes,
            used_bytes: mem.used_bytes,
            used_percent: round2(mem.used_bytes as f64 / mem.total_bytes as f64 * 100.0),
        });
        Ok(())
    }

    pub fn sample_network(&mut self, at: Instant) -> Result<(), ProbeError> {
        let counters = self.probe.network_counters()?;
        let (bytes_in, bytes_out, secs) = match self.last_net.replace((at, counters)) {
            Some((prev_at, prev)) => (
                // A counter that went backwards (interface reset) counts as zero
                counters.received.saturating_sub(prev.received),
                counters.transmitted.saturating_sub(prev.transmitted),
                at.saturating_duration_since(prev_at).as_secs_f64(),
            ),
            None => (0, 0, 0.0),
        };
        let rate = |bytes: u64| if secs > 0.0 { round2(bytes as f64 / secs) } else { 0.0 };

        self.collector.record_network(NetworkSample {
            timestamp: Utc::now(),
            bytes_in,
            bytes_out,
            bytes_in_per_sec: rate(bytes_in),
            bytes_out_per_sec: rate(bytes_out),
        });
        Ok(())
    }

    pub fn sweep(&self) {
        let removed = self.collector.cleanup(Utc::now());
        tracing::debug!(removed, "retention sweep");
    }

    async fn run(mut self, config: MonitorConfig, mut shutdown: watch::Receiver<bool>) {
        let start = tokio::time::Instant::now();
        let mut cpu = interval_at(start + config.cpu_interval(), config.cpu_interval());
        let mut memory = interval(config.memory_interval());
        let mut network = interval_at(start + config.network_interval(), config.network_interval());
        let mut cleanup = interval_at(start + config.cleanup_interval(), config.cleanup_interval());
        for timer in [&mut cpu, &mut memory, &mut network, &mut cleanup] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        self.prime(Instant::now());

        loop {
            tokio::select! {
                _ = cpu.tick() => {
                    let result = self.sample_cpu(Instant::now());
                    skip_on_fault("cpu", result);
                }
                _ = memory.tick() => {
                    let result = self.sample_process_memory();
                    skip_on_fault("process memory", result);
                    let result = self.sample_system_memory();
                    skip_on_fault("system memory", result);
                }
                _ = network.tick() => {
                    let result = self.sample_network(Instant::now());
                    skip_on_fault("network", result);
                }
                _ = cleanup.tick() => self.sweep(),
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("resource sampler stopped");
    }
}

fn skip_on_fault(kind: &str, result: Result<(), ProbeError>) {
    if let Err(e) = result {
        tracing::warn!(sampler = kind, error = %e, "sample skipped");
    }
}

// ─── Lifecycle ───────────────────────────────────────────────────

/// Owns the sampler task. `stop` must run during graceful shutdown.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        // Ignore JoinError, the task may have already finished
        let _ = self.task.await;
    }
}

pub fn start_monitoring<P: ResourceProbe>(
    collector: Arc<MetricsCollector>,
    probe: P,
    config: MonitorConfig,
) -> MonitorHandle {
    let (tx, rx) = watch::channel(false);
    let sampler = ResourceSampler::new(collector, probe);
    tracing::info!(
        cpu_secs = config.cpu_interval_secs,
        memory_secs = config.memory_interval_secs,
        network_secs = config.network_interval_secs,
        cleanup_secs = config.cleanup_interval_secs,
        "resource sampler started"
    );
    MonitorHandle {
        shutdown: tx,
        task: tokio::spawn(sampler.run(config, rx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays scripted readings; an empty script means the read fails.
    #[derive(Default)]
    struct FakeProbe {
        cpu: VecDeque<CpuTimes>,
        net: VecDeque<InterfaceCounters>,
        memory_ok: bool,
    }

    impl ResourceProbe for FakeProbe {
        fn cpu_times(&mut self) -> Result<CpuTimes, ProbeError> {
            self.cpu.pop_front().ok_or(ProbeError::Cpu("scripted failure".into()))
        }

        fn process_memory(&mut self) -> Result<ProcessMemory, ProbeError> {
            if self.memory_ok {
                Ok(ProcessMemory {
                    rss_bytes: 64 * 1024 * 1024,
                    virtual_bytes: 256 * 1024 * 1024,
                })
            } else {
                Err(ProbeError::ProcessMissing(1))
            }
        }

        fn system_memory(&mut self) -> Result<SystemMemory, ProbeError> {
            Ok(SystemMemory {
                total_bytes: 1_000,
                free_bytes: 250,
                used_bytes: 750,
            })
        }

        fn network_counters(&mut self) -> Result<InterfaceCounters, ProbeError> {
            self.net.pop_front().ok_or(ProbeError::Unsupported("network"))
        }
    }

    fn times(user_ms: u64, system_ms: u64) -> CpuTimes {
        CpuTimes {
            user_micros: user_ms * 1000,
            system_micros: system_ms * 1000,
        }
    }

    #[test]
    fn cpu_percent_from_delta_over_wall_time() {
        let collector = Arc::new(MetricsCollector::new());
        let probe = FakeProbe {
            cpu: VecDeque::from([times(0, 0), times(1_000, 500)]),
            ..Default::default()
        };
        let mut sampler = ResourceSampler::new(collector.clone(), probe);

        let t0 = Instant::now();
        sampler.prime(t0);
        sampler.sample_cpu(t0 + Duration::from_secs(5)).unwrap();

        let cpu = collector.stats().resources.cpu.current.unwrap();
        assert_eq!(cpu.usage_percent, 30.0);
        assert_eq!(cpu.user_time, 1_000.0);
        assert_eq!(cpu.system_time, 500.0);
    }

    #[test]
    fn failed_read_skips_tick_and_keeps_going() {
        let collector = Arc::new(MetricsCollector::new());
        let probe = FakeProbe {
            cpu: VecDeque::from([times(0, 0)]),
            ..Default::default()
        };
        let mut sampler = ResourceSampler::new(collector.clone(), probe);
        let t0 = Instant::now();
        sampler.prime(t0);

        assert!(sampler.sample_cpu(t0 + Duration::from_secs(5)).is_err());
        assert!(sampler.sample_process_memory().is_err());
        assert!(collector.stats().resources.cpu.history.is_empty());

        // Other resource classes are unaffected
        sampler.sample_system_memory().unwrap();
        let sys = collector.stats().resources.memory.system.unwrap();
        assert_eq!(sys.used_percent, 75.0);
    }

    #[test]
    fn network_rates_from_counter_deltas() {
        let collector = Arc::new(MetricsCollector::new());
        let probe = FakeProbe {
            net: VecDeque::from([
                InterfaceCounters { received: 1_000, transmitted: 500 },
                InterfaceCounters { received: 16_000, transmitted: 3_500 },
                // Interface reset
                InterfaceCounters { received: 10, transmitted: 10 },
            ]),
            ..Default::default()
        };
        let mut sampler = ResourceSampler::new(collector.clone(), probe);
        let t0 = Instant::now();
        sampler.prime(t0);

        sampler.sample_network(t0 + Duration::from_secs(15)).unwrap();
        sampler.sample_network(t0 + Duration::from_secs(30)).unwrap();

        let net = collector.stats().resources.network;
        assert_eq!(net.history[0].bytes_in, 15_000);
        assert_eq!(net.history[0].bytes_in_per_sec, 1_000.0);
        assert_eq!(net.history[0].bytes_out_per_sec, 200.0);
        assert_eq!(net.history[1].bytes_in, 0);
        assert_eq!(net.totals.bytes_in, 15_000);
        assert_eq!(net.totals.bytes_out, 3_000);
    }

    #[test]
    fn memory_tick_records_process_snapshot() {
        let collector = Arc::new(MetricsCollector::new());
        let probe = FakeProbe {
            memory_ok: true,
            ..Default::default()
        };
        let mut sampler = ResourceSampler::new(collector.clone(), probe);
        sampler.sample_process_memory().unwrap();
        assert_eq!(collector.current_rss(), 64 * 1024 * 1024);
    }

    #[tokio::test]
    async fn monitoring_samples_memory_immediately_and_stops() {
        let collector = Arc::new(MetricsCollector::new());
        let probe = FakeProbe {
            memory_ok: true,
            ..Default::default()
        };
        let handle = start_monitoring(collector.clone(), probe, MonitorConfig::default());

        for _ in 0..50 {
            if collector.has_memory_sample() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(collector.has_memory_sample());

        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("sampler should stop promptly");
    }
}
