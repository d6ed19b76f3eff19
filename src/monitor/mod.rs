//! Resource monitor: periodic telemetry sampling, threshold alerts, retention.
//!
//! Each monitored integration gets one cancelable sampling task. Every tick
//! the task awaits the caller-supplied [`ResourceCollector`], appends the
//! sample to a bounded per-resource series, evaluates thresholds, notifies the
//! [`EnforcementPolicy`] and fans alerts out to subscribers.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use zeptogate::monitor::{MonitorConfig, ResourceCollector, ResourceMetrics, ResourceMonitor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let monitor = ResourceMonitor::new(MonitorConfig::default());
//!     let collector: Arc<dyn ResourceCollector> =
//!         Arc::new(|| async { Ok(ResourceMetrics::default()) });
//!     monitor.start_monitoring("plugin-1", collector, None).unwrap();
//!     assert!(monitor.is_monitoring("plugin-1"));
//!     monitor.stop_monitoring("plugin-1");
//! }
//! ```

pub mod enforcement;
pub mod types;

pub use enforcement::{EnforcementAction, EnforcementPolicy, LoggingEnforcement};
pub use types::{
    AlertSeverity, AlertType, CpuMetrics, MemoryMetrics, NetworkMetrics, ResourceAlert,
    ResourceLimits, ResourceMetrics, ResourceSummary, StorageMetrics, StorageOperations,
    Thresholds, UsageFigures,
};

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{GateError, Result};

/// CPU usage above this percent makes an alert critical.
const CPU_CRITICAL_PERCENT: f64 = 95.0;
/// Memory usage above this percent makes an alert critical.
const MEMORY_CRITICAL_PERCENT: f64 = 95.0;
/// Storage usage above this percent makes an alert critical.
const STORAGE_CRITICAL_PERCENT: f64 = 98.0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Resource monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sampling interval in milliseconds.
    pub interval_ms: u64,
    /// Samples and alerts older than this are pruned.
    pub retention_secs: u64,
    /// Hard cap on samples kept per resource.
    pub max_samples: usize,
    /// Global CPU alert threshold (percent).
    pub cpu_threshold: f64,
    /// Global memory alert threshold (percent).
    pub memory_threshold: f64,
    /// Global storage alert threshold (percent).
    pub storage_threshold: f64,
    /// Also raise a warning alert when the request-rate ceiling is exceeded.
    /// Off by default: rate breaches only notify the enforcement policy.
    pub alert_on_rate_limit: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            retention_secs: 3_600,
            max_samples: 720,
            cpu_threshold: 80.0,
            memory_threshold: 80.0,
            storage_threshold: 90.0,
            alert_on_rate_limit: false,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn retention(&self) -> chrono::Duration {
        // Capped at ten years so subtracting from now() cannot overflow.
        chrono::Duration::seconds(self.retention_secs.min(315_360_000) as i64)
    }
}

// ---------------------------------------------------------------------------
// Collector contract
// ---------------------------------------------------------------------------

/// Host-supplied telemetry source: one call, one snapshot.
///
/// Any `Fn() -> impl Future<Output = Result<ResourceMetrics>>` closure is a
/// collector.
#[async_trait]
pub trait ResourceCollector: Send + Sync {
    async fn collect(&self) -> Result<ResourceMetrics>;
}

#[async_trait]
impl<F, Fut> ResourceCollector for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResourceMetrics>> + Send,
{
    async fn collect(&self) -> Result<ResourceMetrics> {
        (self)().await
    }
}

// ---------------------------------------------------------------------------
// Threshold evaluation
// ---------------------------------------------------------------------------

/// Outcome of evaluating one sample.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub alerts: Vec<ResourceAlert>,
    pub enforcement: Vec<EnforcementAction>,
}

fn alert(
    resource_id: &str,
    alert_type: AlertType,
    severity: AlertSeverity,
    message: String,
    threshold: f64,
    current: f64,
) -> ResourceAlert {
    ResourceAlert {
        id: uuid::Uuid::new_v4().to_string(),
        resource_id: resource_id.to_string(),
        alert_type,
        severity,
        message,
        threshold,
        current,
        timestamp: Utc::now(),
    }
}

fn severity_above(value: f64, critical: f64) -> AlertSeverity {
    if value > critical {
        AlertSeverity::Critical
    } else {
        AlertSeverity::Warning
    }
}

/// Evaluate one sample against resolved thresholds.
///
/// At most one alert per dimension per sample. Request-rate breaches only
/// produce an enforcement action unless `alert_on_rate_limit` is set.
pub fn evaluate(resource_id: &str, sample: &ResourceMetrics, t: &Thresholds) -> Evaluation {
    let mut eval = Evaluation::default();

    let cpu = sample.cpu.usage;
    if cpu > t.cpu_percent {
        eval.alerts.push(alert(
            resource_id,
            AlertType::Cpu,
            severity_above(cpu, CPU_CRITICAL_PERCENT),
            format!("CPU usage {:.1}% exceeds threshold {:.1}%", cpu, t.cpu_percent),
            t.cpu_percent,
            cpu,
        ));
    }
    if let Some(limit) = t.cpu_limit {
        if cpu > limit {
            eval.enforcement
                .push(EnforcementAction::ThrottleCpu { usage: cpu, limit });
        }
    }

    let mem = sample.memory.percentage;
    if mem > t.memory_percent {
        eval.alerts.push(alert(
            resource_id,
            AlertType::Memory,
            severity_above(mem, MEMORY_CRITICAL_PERCENT),
            format!(
                "Memory usage {:.1}% exceeds threshold {:.1}%",
                mem, t.memory_percent
            ),
            t.memory_percent,
            mem,
        ));
    }
    if let Some(limit) = t.memory_bytes {
        if sample.memory.used > limit {
            eval.enforcement.push(EnforcementAction::LimitMemory {
                used: sample.memory.used,
                limit,
            });
        }
    }

    let connections = sample.network.active_connections;
    let mut network_alerted = false;
    if let Some(limit) = t.max_connections {
        if connections > limit {
            network_alerted = true;
            eval.alerts.push(alert(
                resource_id,
                AlertType::Network,
                AlertSeverity::Warning,
                format!(
                    "Active connections {} exceed limit {}",
                    connections, limit
                ),
                f64::from(limit),
                f64::from(connections),
            ));
        }
    }

    let rps = sample.network.requests_per_second;
    if let Some(limit) = t.max_requests_per_second {
        if rps > limit {
            eval.enforcement.push(EnforcementAction::RateLimit {
                requests_per_second: rps,
                limit,
            });
            if t.alert_on_rate_limit && !network_alerted {
                eval.alerts.push(alert(
                    resource_id,
                    AlertType::Network,
                    AlertSeverity::Warning,
                    format!("Request rate {:.1}/s exceeds limit {:.1}/s", rps, limit),
                    limit,
                    rps,
                ));
            }
        }
    }

    let storage_limit = match (sample.storage.limit, t.storage_bytes) {
        (0, Some(limit)) => limit,
        (reported, _) => reported,
    };
    if storage_limit > 0 {
        let pct = sample.storage.used as f64 / storage_limit as f64 * 100.0;
        if pct > t.storage_percent {
            eval.alerts.push(alert(
                resource_id,
                AlertType::Storage,
                severity_above(pct, STORAGE_CRITICAL_PERCENT),
                format!(
                    "Storage usage {:.1}% exceeds threshold {:.1}%",
                    pct, t.storage_percent
                ),
                t.storage_percent,
                pct,
            ));
        }
    }

    eval
}

// ---------------------------------------------------------------------------
// ResourceMonitor
// ---------------------------------------------------------------------------

type AlertHandler = Arc<dyn Fn(&ResourceAlert) + Send + Sync>;

#[derive(Default)]
struct ResourceSeries {
    samples: VecDeque<ResourceMetrics>,
    alerts: Vec<ResourceAlert>,
}

struct MonitorTask {
    epoch: u64,
    handle: JoinHandle<()>,
}

struct MonitorState {
    config: MonitorConfig,
    enforcement: Arc<dyn EnforcementPolicy>,
    tasks: Mutex<HashMap<String, MonitorTask>>,
    series: Mutex<HashMap<String, ResourceSeries>>,
    handlers: RwLock<Vec<(u64, AlertHandler)>>,
    /// Held shared while a sample's actions and alerts are delivered;
    /// stopping takes it exclusively to wait out in-flight deliveries.
    dispatch_gate: RwLock<()>,
    next_id: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as delivering alerts until dropped.
struct DispatchScope {
    previous: bool,
}

impl DispatchScope {
    fn enter() -> Self {
        Self {
            previous: DISPATCHING.with(|d| d.replace(true)),
        }
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.set(self.previous));
    }
}

impl MonitorState {
    /// Record a sample for `resource_id` if the task that produced it is
    /// still current. Returns the evaluation when the sample was kept.
    fn record(
        &self,
        resource_id: &str,
        epoch: u64,
        sample: ResourceMetrics,
        thresholds: &Thresholds,
    ) -> Option<Evaluation> {
        // Holding the task map while recording means a concurrent
        // stop_monitoring either runs first (sample dropped) or waits.
        let tasks = lock(&self.tasks);
        match tasks.get(resource_id) {
            Some(task) if task.epoch == epoch => {}
            _ => return None,
        }

        let eval = evaluate(resource_id, &sample, thresholds);
        let cutoff = Utc::now() - self.config.retention();

        let mut series = lock(&self.series);
        let entry = series.entry(resource_id.to_string()).or_default();
        entry.samples.push_back(sample);
        entry.alerts.extend(eval.alerts.iter().cloned());
        while entry.samples.len() > self.config.max_samples.max(1) {
            entry.samples.pop_front();
        }
        while entry
            .samples
            .front()
            .is_some_and(|s| s.timestamp < cutoff)
        {
            entry.samples.pop_front();
        }
        entry.alerts.retain(|a| a.timestamp >= cutoff);
        drop(series);
        drop(tasks);

        Some(eval)
    }

    fn is_current(&self, resource_id: &str, epoch: u64) -> bool {
        lock(&self.tasks)
            .get(resource_id)
            .is_some_and(|task| task.epoch == epoch)
    }

    /// Block until no alert delivery is in flight. A handler that stops
    /// monitoring from inside a delivery does not wait on itself.
    fn wait_for_dispatch(&self) {
        if DISPATCHING.with(Cell::get) {
            return;
        }
        drop(self.dispatch_gate.write().unwrap_or_else(|e| e.into_inner()));
    }

    /// Deliver enforcement actions and alerts for a recorded sample. Skipped
    /// when monitoring of `resource_id` stopped after the sample was recorded.
    fn dispatch(&self, resource_id: &str, epoch: u64, eval: &Evaluation) {
        let _gate = self.dispatch_gate.read().unwrap_or_else(|e| e.into_inner());
        if !self.is_current(resource_id, epoch) {
            return;
        }
        let _scope = DispatchScope::enter();
        for action in &eval.enforcement {
            self.enforcement.enforce(resource_id, action);
        }
        if eval.alerts.is_empty() {
            return;
        }
        let handlers: Vec<AlertHandler> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for alert in &eval.alerts {
            warn!(
                component = "monitor",
                resource_id,
                alert_type = ?alert.alert_type,
                severity = ?alert.severity,
                current = alert.current,
                threshold = alert.threshold,
                "Resource alert"
            );
            for handler in &handlers {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(alert)));
                if outcome.is_err() {
                    error!(
                        component = "monitor",
                        resource_id, "Alert handler panicked; continuing with remaining handlers"
                    );
                }
            }
        }
    }
}

/// Handle returned by [`ResourceMonitor::on_alert`].
///
/// Dropping it keeps the handler registered; call [`unsubscribe`](Self::unsubscribe)
/// to remove it.
pub struct AlertSubscription {
    id: u64,
    state: Weak<MonitorState>,
}

impl AlertSubscription {
    pub fn unsubscribe(self) {
        if let Some(state) = self.state.upgrade() {
            state
                .handlers
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// Periodic telemetry sampler with threshold alerting.
pub struct ResourceMonitor {
    state: Arc<MonitorState>,
}

impl ResourceMonitor {
    /// Create a monitor that logs enforcement actions.
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_enforcement(config, Arc::new(LoggingEnforcement))
    }

    /// Create a monitor with a custom enforcement policy.
    pub fn with_enforcement(config: MonitorConfig, enforcement: Arc<dyn EnforcementPolicy>) -> Self {
        Self {
            state: Arc::new(MonitorState {
                config,
                enforcement,
                tasks: Mutex::new(HashMap::new()),
                series: Mutex::new(HashMap::new()),
                handlers: RwLock::new(Vec::new()),
                dispatch_gate: RwLock::new(()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.state.config
    }

    /// Begin sampling `resource_id` every configured interval.
    ///
    /// The first sample is taken one interval after this call. Must be called
    /// from within a Tokio runtime.
    pub fn start_monitoring(
        &self,
        resource_id: &str,
        collector: Arc<dyn ResourceCollector>,
        limits: Option<ResourceLimits>,
    ) -> Result<()> {
        let mut tasks = lock(&self.state.tasks);
        if tasks.contains_key(resource_id) {
            return Err(GateError::Operation(format!(
                "resource '{}' is already being monitored",
                resource_id
            )));
        }

        let thresholds = limits.unwrap_or_default().resolve(&self.state.config);
        let epoch = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let period = self.state.config.interval();
        let weak = Arc::downgrade(&self.state);
        let id = resource_id.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let sample = match collector.collect().await {
                    Ok(sample) => sample,
                    Err(e) => {
                        error!(component = "monitor", resource_id = %id, error = %e, "Collector failed; skipping tick");
                        continue;
                    }
                };
                let Some(state) = weak.upgrade() else {
                    break;
                };
                match state.record(&id, epoch, sample, &thresholds) {
                    Some(eval) => state.dispatch(&id, epoch, &eval),
                    None => break,
                }
            }
            debug!(component = "monitor", resource_id = %id, "Sampling task finished");
        });

        tasks.insert(resource_id.to_string(), MonitorTask { epoch, handle });
        info!(
            component = "monitor",
            resource_id,
            interval_ms = period.as_millis() as u64,
            "Monitoring started"
        );
        Ok(())
    }

    /// Stop sampling `resource_id`. Returns `false` if it was not monitored.
    ///
    /// No sample is recorded and no alert for this resource is delivered
    /// after this returns.
    pub fn stop_monitoring(&self, resource_id: &str) -> bool {
        let removed = lock(&self.state.tasks).remove(resource_id);
        match removed {
            Some(task) => {
                task.handle.abort();
                self.state.wait_for_dispatch();
                info!(component = "monitor", resource_id, "Monitoring stopped");
                true
            }
            None => false,
        }
    }

    /// Stop every sampling task.
    pub fn stop_all(&self) {
        let drained: Vec<(String, MonitorTask)> = lock(&self.state.tasks).drain().collect();
        let any = !drained.is_empty();
        for (_, task) in drained {
            task.handle.abort();
        }
        if any {
            self.state.wait_for_dispatch();
        }
    }

    /// Drop all stored samples and alerts for `resource_id`.
    pub fn forget(&self, resource_id: &str) {
        lock(&self.state.series).remove(resource_id);
    }

    pub fn is_monitoring(&self, resource_id: &str) -> bool {
        lock(&self.state.tasks).contains_key(resource_id)
    }

    pub fn monitored_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.state.tasks).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Most recent sample for `resource_id`.
    pub fn latest(&self, resource_id: &str) -> Option<ResourceMetrics> {
        lock(&self.state.series)
            .get(resource_id)
            .and_then(|s| s.samples.back().cloned())
    }

    /// Samples for `resource_id`, optionally only those at or after `since`.
    pub fn get_metrics(&self, resource_id: &str, since: Option<DateTime<Utc>>) -> Vec<ResourceMetrics> {
        lock(&self.state.series)
            .get(resource_id)
            .map(|s| {
                s.samples
                    .iter()
                    .filter(|m| since.map_or(true, |t| m.timestamp >= t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_alerts(&self, resource_id: &str) -> Vec<ResourceAlert> {
        lock(&self.state.series)
            .get(resource_id)
            .map(|s| s.alerts.clone())
            .unwrap_or_default()
    }

    pub fn clear_alerts(&self, resource_id: &str) {
        if let Some(series) = lock(&self.state.series).get_mut(resource_id) {
            series.alerts.clear();
        }
    }

    /// Outstanding alerts across all resources.
    pub fn total_alert_count(&self) -> usize {
        lock(&self.state.series).values().map(|s| s.alerts.len()).sum()
    }

    /// Running average, peak and current sample. `None` when nothing was sampled.
    pub fn get_resource_summary(&self, resource_id: &str) -> Option<ResourceSummary> {
        let series = lock(&self.state.series);
        let entry = series.get(resource_id)?;
        ResourceSummary::from_samples(resource_id, &entry.samples, entry.alerts.len())
    }

    /// Subscribe to alerts. A panicking handler is isolated from the others.
    pub fn on_alert<F>(&self, handler: F) -> AlertSubscription
    where
        F: Fn(&ResourceAlert) + Send + Sync + 'static,
    {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        self.state
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(handler)));
        AlertSubscription {
            id,
            state: Arc::downgrade(&self.state),
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    fn cpu_sample(usage: f64) -> ResourceMetrics {
        ResourceMetrics {
            cpu: CpuMetrics {
                usage,
                cores: 1,
                throttled: false,
            },
            ..Default::default()
        }
    }

    fn thresholds() -> Thresholds {
        ResourceLimits::default().resolve(&MonitorConfig::default())
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            interval_ms: 100,
            ..Default::default()
        }
    }

    fn constant_collector(usage: f64) -> Arc<dyn ResourceCollector> {
        Arc::new(move || async move { Ok(cpu_sample(usage)) })
    }

    // -- evaluate --

    #[test]
    fn test_cpu_96_yields_one_critical_alert() {
        let eval = evaluate("r1", &cpu_sample(96.0), &thresholds());
        assert_eq!(eval.alerts.len(), 1);
        assert_eq!(eval.alerts[0].alert_type, AlertType::Cpu);
        assert_eq!(eval.alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(eval.alerts[0].threshold, 80.0);
    }

    #[test]
    fn test_cpu_85_is_warning() {
        let eval = evaluate("r1", &cpu_sample(85.0), &thresholds());
        assert_eq!(eval.alerts.len(), 1);
        assert_eq!(eval.alerts[0].severity, AlertSeverity::Warning);
    }

    #[test]
    fn test_below_thresholds_no_alerts() {
        let eval = evaluate("r1", &cpu_sample(50.0), &thresholds());
        assert!(eval.alerts.is_empty());
        assert!(eval.enforcement.is_empty());
    }

    #[test]
    fn test_memory_alert_severity() {
        let mut sample = cpu_sample(0.0);
        sample.memory.percentage = 96.0;
        let eval = evaluate("r1", &sample, &thresholds());
        assert_eq!(eval.alerts.len(), 1);
        assert_eq!(eval.alerts[0].alert_type, AlertType::Memory);
        assert_eq!(eval.alerts[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_connections_over_limit_is_warning() {
        let mut sample = cpu_sample(0.0);
        sample.network.active_connections = 11;
        let t = ResourceLimits {
            max_connections: Some(10),
            ..Default::default()
        }
        .resolve(&MonitorConfig::default());
        let eval = evaluate("r1", &sample, &t);
        assert_eq!(eval.alerts.len(), 1);
        assert_eq!(eval.alerts[0].alert_type, AlertType::Network);
        assert_eq!(eval.alerts[0].severity, AlertSeverity::Warning);
    }

    #[test]
    fn test_rate_limit_enforces_without_alert_by_default() {
        let mut sample = cpu_sample(0.0);
        sample.network.requests_per_second = 150.0;
        let t = ResourceLimits {
            max_requests_per_second: Some(100.0),
            ..Default::default()
        }
        .resolve(&MonitorConfig::default());
        let eval = evaluate("r1", &sample, &t);
        assert!(eval.alerts.is_empty());
        assert_eq!(
            eval.enforcement,
            vec![EnforcementAction::RateLimit {
                requests_per_second: 150.0,
                limit: 100.0
            }]
        );
    }

    #[test]
    fn test_rate_limit_alert_when_enabled() {
        let mut sample = cpu_sample(0.0);
        sample.network.requests_per_second = 150.0;
        let config = MonitorConfig {
            alert_on_rate_limit: true,
            ..Default::default()
        };
        let t = ResourceLimits {
            max_requests_per_second: Some(100.0),
            ..Default::default()
        }
        .resolve(&config);
        let eval = evaluate("r1", &sample, &t);
        assert_eq!(eval.alerts.len(), 1);
        assert_eq!(eval.alerts[0].alert_type, AlertType::Network);
    }

    #[test]
    fn test_storage_critical_above_98() {
        let mut sample = cpu_sample(0.0);
        sample.storage.used = 99;
        sample.storage.limit = 100;
        let eval = evaluate("r1", &sample, &thresholds());
        assert_eq!(eval.alerts.len(), 1);
        assert_eq!(eval.alerts[0].alert_type, AlertType::Storage);
        assert_eq!(eval.alerts[0].severity, AlertSeverity::Critical);

        sample.storage.used = 95;
        let eval = evaluate("r1", &sample, &thresholds());
        assert_eq!(eval.alerts[0].severity, AlertSeverity::Warning);
    }

    #[test]
    fn test_storage_uses_configured_limit_when_unreported() {
        let mut sample = cpu_sample(0.0);
        sample.storage.used = 950;
        let t = ResourceLimits {
            max_storage_bytes: Some(1000),
            ..Default::default()
        }
        .resolve(&MonitorConfig::default());
        let eval = evaluate("r1", &sample, &t);
        assert_eq!(eval.alerts.len(), 1);
    }

    #[test]
    fn test_cpu_ceiling_triggers_enforcement() {
        let t = ResourceLimits {
            max_cpu_percent: Some(50.0),
            ..Default::default()
        }
        .resolve(&MonitorConfig::default());
        let eval = evaluate("r1", &cpu_sample(60.0), &t);
        assert_eq!(eval.alerts.len(), 1);
        assert_eq!(
            eval.enforcement,
            vec![EnforcementAction::ThrottleCpu {
                usage: 60.0,
                limit: 50.0
            }]
        );
    }

    // -- sampling loop --

    #[tokio::test(start_paused = true)]
    async fn test_samples_after_one_interval() {
        let monitor = ResourceMonitor::new(fast_config());
        monitor
            .start_monitoring("r1", constant_collector(10.0), None)
            .unwrap();
        assert!(monitor.latest("r1").is_none());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(monitor.latest("r1").is_some());
        let summary = monitor.get_resource_summary("r1").unwrap();
        assert_eq!(summary.sample_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_start_is_error() {
        let monitor = ResourceMonitor::new(fast_config());
        monitor
            .start_monitoring("r1", constant_collector(10.0), None)
            .unwrap();
        let err = monitor
            .start_monitoring("r1", constant_collector(10.0), None)
            .unwrap_err();
        assert!(err.to_string().contains("already"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_samples_after_stop() {
        let monitor = ResourceMonitor::new(fast_config());
        monitor
            .start_monitoring("r1", constant_collector(10.0), None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(monitor.stop_monitoring("r1"));
        let count = monitor.get_metrics("r1", None).len();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(monitor.get_metrics("r1", None).len(), count);
        assert!(!monitor.is_monitoring("r1"));
        assert!(!monitor.stop_monitoring("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collector_failure_skips_tick() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let collector: Arc<dyn ResourceCollector> = Arc::new(move || {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(GateError::Operation("counter unavailable".into()))
                } else {
                    Ok(cpu_sample(5.0))
                }
            }
        });
        let monitor = ResourceMonitor::new(fast_config());
        monitor.start_monitoring("r1", collector, None).unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(monitor.latest("r1").is_none());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(monitor.latest("r1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_handlers_isolated_and_unsubscribable() {
        let monitor = ResourceMonitor::new(fast_config());
        let seen = Arc::new(AtomicUsize::new(0));

        let _panicky = monitor.on_alert(|_| panic!("handler bug"));
        let seen_clone = Arc::clone(&seen);
        let sub = monitor.on_alert(move |alert| {
            assert_eq!(alert.severity, AlertSeverity::Critical);
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        monitor
            .start_monitoring("r1", constant_collector(99.0), None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.get_alerts("r1").len(), 1);
        assert_eq!(monitor.total_alert_count(), 1);

        sub.unsubscribe();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.get_alerts("r1").len(), 2);

        monitor.clear_alerts("r1");
        assert_eq!(monitor.total_alert_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_waits_for_in_flight_alerts() {
        let monitor = ResourceMonitor::new(MonitorConfig {
            interval_ms: 10,
            ..Default::default()
        });
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let tx = Mutex::new(tx);
        let finished = Arc::new(AtomicBool::new(false));
        let delivered = Arc::new(AtomicUsize::new(0));

        let finished_clone = Arc::clone(&finished);
        let delivered_clone = Arc::clone(&delivered);
        let _sub = monitor.on_alert(move |_| {
            let _ = lock(&tx).send(());
            std::thread::sleep(Duration::from_millis(100));
            delivered_clone.fetch_add(1, Ordering::SeqCst);
            finished_clone.store(true, Ordering::SeqCst);
        });

        monitor
            .start_monitoring("r1", constant_collector(99.0), None)
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(monitor.stop_monitoring("r1"));
        assert!(finished.load(Ordering::SeqCst));

        let count = delivered.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_can_stop_its_own_resource() {
        let monitor = Arc::new(ResourceMonitor::new(fast_config()));
        let seen = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&monitor);
        let seen_clone = Arc::clone(&seen);
        let _sub = monitor.on_alert(move |alert| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
            inner.stop_monitoring(&alert.resource_id);
        });

        monitor
            .start_monitoring("r1", constant_collector(99.0), None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_monitoring("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_samples_bounds_series() {
        let monitor = ResourceMonitor::new(MonitorConfig {
            interval_ms: 10,
            max_samples: 3,
            ..Default::default()
        });
        monitor
            .start_monitoring("r1", constant_collector(1.0), None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(105)).await;
        assert_eq!(monitor.get_metrics("r1", None).len(), 3);
    }

    #[tokio::test]
    async fn test_forget_drops_history() {
        let monitor = ResourceMonitor::new(fast_config());
        monitor.forget("missing");
        assert!(monitor.get_resource_summary("missing").is_none());
        assert!(monitor.get_alerts("missing").is_empty());
        assert!(monitor.monitored_ids().is_empty());
    }
}
