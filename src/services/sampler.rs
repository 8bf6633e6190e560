//! 主机资源采样
//!
//! 后台任务按固定周期采样 CPU/内存（以及 frps 连接/流量），每轮生成一个完整的
//! `ResourceSample` 并通过 `watch` 通道整体替换当前值；读取方只克隆一个 `Arc`，
//! 不会等待正在进行的采样。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use sysinfo::System;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::domain::{ProxyStats, ResourceSample};
use crate::infra::{ProxyStatsSource, ProxyTotals};

/// 某项指标本轮无法测量
#[derive(Debug, Error)]
#[error("{metric} unavailable: {reason}")]
pub struct SampleError {
    pub metric: &'static str,
    pub reason: String,
}

impl SampleError {
    pub fn new(metric: &'static str, reason: impl Into<String>) -> Self {
        Self {
            metric,
            reason: reason.into(),
        }
    }
}

/// 所有逻辑核累加的 CPU 时间计数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuCounters {
    pub idle: u64,
    pub total: u64,
}

/// 内存读数（字节）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryReading {
    pub total: u64,
    pub free: u64,
}

/// 主机指标来源
pub trait HostProbe: Send + Sync {
    fn cpu_counters(&self) -> Result<CpuCounters, SampleError>;

    fn memory(&self) -> Result<MemoryReading, SampleError>;
}

/// `/proc/stat` + sysinfo 的实现
pub struct SystemProbe {
    system: Mutex<System>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SystemProbe {
    #[cfg(target_os = "linux")]
    fn cpu_counters(&self) -> Result<CpuCounters, SampleError> {
        let stat = std::fs::read_to_string("/proc/stat")
            .map_err(|e| SampleError::new("cpu", format!("failed to read /proc/stat: {}", e)))?;
        parse_proc_stat(&stat)
    }

    #[cfg(not(target_os = "linux"))]
    fn cpu_counters(&self) -> Result<CpuCounters, SampleError> {
        Err(SampleError::new(
            "cpu",
            "aggregate CPU counters are only read on Linux",
        ))
    }

    fn memory(&self) -> Result<MemoryReading, SampleError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| SampleError::new("memory", "probe lock poisoned"))?;
        system.refresh_memory();

        Ok(MemoryReading {
            total: system.total_memory(),
            free: system.available_memory(),
        })
    }
}

/// 解析 `/proc/stat` 的汇总行：`cpu user nice system idle iowait irq softirq steal ...`
///
/// guest 时间已计入 user，因此只累加前 8 列；idle 包含 iowait。
pub fn parse_proc_stat(stat: &str) -> Result<CpuCounters, SampleError> {
    let line = stat
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| SampleError::new("cpu", "no aggregate cpu line in /proc/stat"))?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|v| v.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|e| SampleError::new("cpu", format!("malformed /proc/stat: {}", e)))?;

    if fields.len() < 4 {
        return Err(SampleError::new("cpu", "too few fields in /proc/stat"));
    }

    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Ok(CpuCounters {
        idle,
        total: fields.iter().sum(),
    })
}

/// 两次计数之间的 CPU 使用率：`100 - floor(100 * Δidle / Δtotal)`
///
/// Δtotal 为 0 时返回 0。
pub fn cpu_percent(start: CpuCounters, end: CpuCounters) -> f64 {
    let total = end.total.saturating_sub(start.total);
    if total == 0 {
        return 0.0;
    }
    let idle = end.idle.saturating_sub(start.idle).min(total);
    let idle_percent = (100 * idle as u128) / total as u128;
    (100 - idle_percent) as f64
}

/// `(total - free) / total * 100`，保留一位小数
pub fn memory_percent(reading: MemoryReading) -> Result<f64, SampleError> {
    if reading.total == 0 {
        return Err(SampleError::new("memory", "total memory reported as zero"));
    }
    let used = reading.total.saturating_sub(reading.free) as f64;
    let percent = used / reading.total as f64 * 100.0;
    Ok(((percent * 10.0).round() / 10.0).clamp(0.0, 100.0))
}

pub struct ResourceSampler {
    probe: Arc<dyn HostProbe>,
    proxy: Option<Arc<dyn ProxyStatsSource>>,
    interval: Duration,
    cpu_window: Duration,
    history_limit: usize,
    current: watch::Sender<Arc<ResourceSample>>,
    history: RwLock<VecDeque<Arc<ResourceSample>>>,
    last_totals: Mutex<Option<(ProxyTotals, Instant)>>,
}

impl ResourceSampler {
    pub fn new(
        probe: Arc<dyn HostProbe>,
        proxy: Option<Arc<dyn ProxyStatsSource>>,
        config: &MonitorConfig,
    ) -> Self {
        let (current, _) = watch::channel(Arc::new(ResourceSample::empty()));
        Self {
            probe,
            proxy,
            interval: Duration::from_millis(config.interval_ms.max(1)),
            cpu_window: Duration::from_millis(config.cpu_window_ms),
            history_limit: config.history.max(1),
            current,
            history: RwLock::new(VecDeque::new()),
            last_totals: Mutex::new(None),
        }
    }

    /// 最近一次完成的采样（首轮完成前为全部不可用的占位值）
    pub fn current_sample(&self) -> Arc<ResourceSample> {
        self.current.borrow().clone()
    }

    /// 订阅采样更新
    pub fn subscribe(&self) -> watch::Receiver<Arc<ResourceSample>> {
        self.current.subscribe()
    }

    /// 最近的采样窗口，从旧到新
    pub async fn history(&self) -> Vec<Arc<ResourceSample>> {
        self.history.read().await.iter().cloned().collect()
    }

    /// 执行一轮采样
    pub async fn sample_once(&self) -> ResourceSample {
        let start = self.probe.cpu_counters();
        tokio::time::sleep(self.cpu_window).await;
        let end = self.probe.cpu_counters();

        let cpu_percent = match (start, end) {
            (Ok(start), Ok(end)) => Some(cpu_percent(start, end)),
            (Err(e), _) | (_, Err(e)) => {
                tracing::debug!(error = %e, "CPU sample unavailable");
                None
            }
        };

        let memory_percent = match self.probe.memory().and_then(memory_percent) {
            Ok(percent) => Some(percent),
            Err(e) => {
                tracing::debug!(error = %e, "Memory sample unavailable");
                None
            }
        };

        ResourceSample {
            cpu_percent,
            memory_percent,
            proxy: self.proxy_stats().await,
            timestamp: Utc::now(),
        }
    }

    async fn proxy_stats(&self) -> ProxyStats {
        let Some(source) = &self.proxy else {
            return ProxyStats::unavailable();
        };

        let totals = match source.totals().await {
            Ok(totals) => totals,
            Err(e) => {
                tracing::warn!(error = %e, "frps statistics unavailable");
                return ProxyStats::unavailable();
            }
        };

        let now = Instant::now();
        let previous = match self.last_totals.lock() {
            Ok(mut last) => last.replace((totals, now)),
            Err(_) => None,
        };

        let current_traffic = previous.and_then(|(prev, at)| {
            let secs = now.duration_since(at).as_secs_f64();
            let traffic_in = totals.traffic_in.checked_sub(prev.traffic_in)?;
            let traffic_out = totals.traffic_out.checked_sub(prev.traffic_out)?;
            (secs > 0.0).then(|| ((traffic_in + traffic_out) as f64 / secs).round() as u64)
        });

        ProxyStats {
            connections: Some(totals.connections),
            current_traffic,
            inbound: Some(totals.traffic_in),
            outbound: Some(totals.traffic_out),
        }
    }

    /// 整体替换当前采样并追加到历史窗口
    pub async fn publish(&self, sample: ResourceSample) {
        let sample = Arc::new(sample);
        self.current.send_replace(sample.clone());

        let mut history = self.history.write().await;
        history.push_back(sample);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    /// 后台采样循环，直到 `shutdown` 被取消
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            cpu_window_ms = self.cpu_window.as_millis() as u64,
            proxy_stats = self.proxy.is_some(),
            "Resource sampler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Resource sampler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let sample = self.sample_once().await;
                    self.publish(sample).await;
                }
            }
        }
    }
}
