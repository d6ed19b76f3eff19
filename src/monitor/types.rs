//! Resource telemetry, limit and alert types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MonitorConfig;

// ============================================================================
// Samples
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuMetrics {
    /// Utilisation in percent (0-100).
    pub usage: f64,
    pub cores: u32,
    pub throttled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryMetrics {
    /// Bytes in use.
    pub used: u64,
    /// Bytes available to the integration.
    pub limit: u64,
    /// `used / limit` in percent.
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkMetrics {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub requests_per_second: f64,
    pub active_connections: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOperations {
    pub reads: u64,
    pub writes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageMetrics {
    pub used: u64,
    pub limit: u64,
    pub operations: StorageOperations,
}

impl StorageMetrics {
    /// `used / limit` in percent; zero when no limit is reported.
    pub fn percentage(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        self.used as f64 / self.limit as f64 * 100.0
    }
}

/// One telemetry snapshot produced by a collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    #[serde(default)]
    pub cpu: CpuMetrics,
    #[serde(default)]
    pub memory: MemoryMetrics,
    #[serde(default)]
    pub network: NetworkMetrics,
    #[serde(default)]
    pub storage: StorageMetrics,
    pub timestamp: DateTime<Utc>,
}

impl Default for ResourceMetrics {
    fn default() -> Self {
        Self {
            cpu: CpuMetrics::default(),
            memory: MemoryMetrics::default(),
            network: NetworkMetrics::default(),
            storage: StorageMetrics::default(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Limits
// ============================================================================

/// Optional per-dimension ceilings for an integration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// CPU percent; replaces the global CPU threshold when set.
    pub max_cpu_percent: Option<f64>,
    pub max_memory_bytes: Option<u64>,
    pub max_connections: Option<u32>,
    pub max_requests_per_second: Option<f64>,
    pub max_storage_bytes: Option<u64>,
}

impl ResourceLimits {
    /// Whether any ceiling is set.
    pub fn is_configured(&self) -> bool {
        self.max_cpu_percent.is_some()
            || self.max_memory_bytes.is_some()
            || self.max_connections.is_some()
            || self.max_requests_per_second.is_some()
            || self.max_storage_bytes.is_some()
    }

    /// Resolve against the monitor defaults into a fully-populated set of
    /// thresholds, so the sampling loop never deals with missing values.
    pub fn resolve(&self, config: &MonitorConfig) -> Thresholds {
        Thresholds {
            cpu_percent: self.max_cpu_percent.unwrap_or(config.cpu_threshold),
            memory_percent: config.memory_threshold,
            storage_percent: config.storage_threshold,
            cpu_limit: self.max_cpu_percent,
            memory_bytes: self.max_memory_bytes,
            max_connections: self.max_connections,
            max_requests_per_second: self.max_requests_per_second,
            storage_bytes: self.max_storage_bytes,
            alert_on_rate_limit: config.alert_on_rate_limit,
        }
    }
}

/// Resolved thresholds for one monitored resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub storage_percent: f64,
    /// Enforcement ceilings (hooks fire only when these are set).
    pub cpu_limit: Option<f64>,
    pub memory_bytes: Option<u64>,
    pub max_connections: Option<u32>,
    pub max_requests_per_second: Option<f64>,
    pub storage_bytes: Option<u64>,
    pub alert_on_rate_limit: bool,
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Cpu,
    Memory,
    Network,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// A threshold breach observed on one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAlert {
    pub id: String,
    /// Integration id the sample belongs to.
    pub resource_id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub threshold: f64,
    pub current: f64,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Summaries
// ============================================================================

/// Per-dimension figures used for averages and peaks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageFigures {
    pub cpu_usage: f64,
    pub memory_percentage: f64,
    pub requests_per_second: f64,
    pub active_connections: f64,
    pub storage_percentage: f64,
}

impl UsageFigures {
    pub fn of(sample: &ResourceMetrics) -> Self {
        Self {
            cpu_usage: sample.cpu.usage,
            memory_percentage: sample.memory.percentage,
            requests_per_second: sample.network.requests_per_second,
            active_connections: f64::from(sample.network.active_connections),
            storage_percentage: sample.storage.percentage(),
        }
    }

    fn max_with(&self, other: &UsageFigures) -> UsageFigures {
        UsageFigures {
            cpu_usage: self.cpu_usage.max(other.cpu_usage),
            memory_percentage: self.memory_percentage.max(other.memory_percentage),
            requests_per_second: self.requests_per_second.max(other.requests_per_second),
            active_connections: self.active_connections.max(other.active_connections),
            storage_percentage: self.storage_percentage.max(other.storage_percentage),
        }
    }
}

/// Average, peak and current usage for one monitored resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub resource_id: String,
    pub sample_count: usize,
    pub current: ResourceMetrics,
    pub average: UsageFigures,
    pub peak: UsageFigures,
    pub alert_count: usize,
}

impl ResourceSummary {
    /// Summarize a non-empty sample window. Returns `None` for zero samples.
    pub fn from_samples<'a, I>(resource_id: &str, samples: I, alert_count: usize) -> Option<Self>
    where
        I: IntoIterator<Item = &'a ResourceMetrics>,
    {
        let mut count = 0usize;
        let mut sum = UsageFigures::default();
        let mut peak = UsageFigures::default();
        let mut current: Option<&ResourceMetrics> = None;

        for sample in samples {
            let figures = UsageFigures::of(sample);
            sum.cpu_usage += figures.cpu_usage;
            sum.memory_percentage += figures.memory_percentage;
            sum.requests_per_second += figures.requests_per_second;
            sum.active_connections += figures.active_connections;
            sum.storage_percentage += figures.storage_percentage;
            peak = peak.max_with(&figures);
            current = Some(sample);
            count += 1;
        }

        let current = current?.clone();
        let n = count as f64;
        Some(Self {
            resource_id: resource_id.to_string(),
            sample_count: count,
            current,
            average: UsageFigures {
                cpu_usage: sum.cpu_usage / n,
                memory_percentage: sum.memory_percentage / n,
                requests_per_second: sum.requests_per_second / n,
                active_connections: sum.active_connections / n,
                storage_percentage: sum.storage_percentage / n,
            },
            peak,
            alert_count,
        })
    }
}
