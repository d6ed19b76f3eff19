//! Integration Manager for ZeptoGate
//!
//! The `IntegrationManager` owns the integration registry and drives each
//! integration through its lifecycle:
//!
//! ```text
//! register ──> registered ──activate──> active ──suspend──> suspended
//!                  │                      ▲                    │
//!                  └──(failed activate)──> error <──────────────┘
//! ```
//!
//! Admission runs the cheap policy checks first (blacklist, allowed types),
//! then the security scan and the license check. Nothing is stored unless all
//! of them pass. Activation asks the host runtime for a handler and starts
//! resource sampling; suspension stops both.
//!
//! Lifecycle calls for the same id are serialized by a per-id async lock, so
//! two concurrent `activate` calls create exactly one handler.
//!
//! # Example
//!
//! ```
//! use zeptogate::integrations::{IntegrationConfig, IntegrationPolicy, NewIntegration};
//! use zeptogate::manager::IntegrationManager;
//!
//! #[tokio::main]
//! async fn main() -> zeptogate::Result<()> {
//!     let manager = IntegrationManager::builder(IntegrationPolicy::default()).build()?;
//!     let request = NewIntegration::new(
//!         "left-pad",
//!         "1.3.0",
//!         IntegrationConfig::Library(Default::default()),
//!     )
//!     .with_license("MIT");
//!     let integration = manager.register(request).await?;
//!     manager.activate(&integration.id).await?;
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod runtime;
pub mod stats;

pub use runtime::{
    InertRuntime, IntegrationHandler, IntegrationRuntime, LoggingHandler, ScriptedRuntime,
};
pub use stats::IntegrationStatistics;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, EventKind, IntegrationEvent, SubscriptionId};
use crate::config::Config;
use crate::error::{GateError, Result};
use crate::integrations::{
    Integration, IntegrationConfig, IntegrationPolicy, IntegrationStatus, IntegrationType,
    NewIntegration,
};
use crate::license::LicenseChecker;
use crate::log_component;
use crate::monitor::{MonitorConfig, ResourceLimits, ResourceMetrics, ResourceMonitor, ResourceSummary};
use crate::scanner::{ScannerConfig, SecurityScanner};
use crate::versions::{UpdateOptions, UpdateResult, VersionCheckResult, VersionConfig, VersionManager};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn ensure_transition(integration: &Integration, next: IntegrationStatus) -> Result<()> {
    if integration.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(GateError::Validation(format!(
            "integration '{}' cannot move from {} to {}",
            integration.name, integration.status, next
        )))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles an [`IntegrationManager`]. Components not supplied are built
/// from their default configuration.
pub struct ManagerBuilder {
    policy: IntegrationPolicy,
    scanner: Option<SecurityScanner>,
    licenses: Option<LicenseChecker>,
    monitor: Option<ResourceMonitor>,
    versions: Option<VersionManager>,
    runtime: Option<Arc<dyn IntegrationRuntime>>,
}

impl ManagerBuilder {
    pub fn scanner(mut self, scanner: SecurityScanner) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn license_checker(mut self, checker: LicenseChecker) -> Self {
        self.licenses = Some(checker);
        self
    }

    pub fn monitor(mut self, monitor: ResourceMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn versions(mut self, versions: VersionManager) -> Self {
        self.versions = Some(versions);
        self
    }

    pub fn runtime(mut self, runtime: Arc<dyn IntegrationRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<IntegrationManager> {
        let versions = match self.versions {
            Some(v) => v,
            None => VersionManager::from_config(VersionConfig::default())?,
        };
        let monitor = self
            .monitor
            .unwrap_or_else(|| ResourceMonitor::new(MonitorConfig::default()));

        let bus = Arc::new(EventBus::new());
        let forward = Arc::clone(&bus);
        // Lives as long as the monitor; never unsubscribed.
        let _ = monitor.on_alert(move |alert| {
            forward.emit(&IntegrationEvent::ResourceAlert {
                integration_id: alert.resource_id.clone(),
                alert: alert.clone(),
            });
        });

        Ok(IntegrationManager {
            policy: RwLock::new(self.policy),
            registry: RwLock::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            scanner: self
                .scanner
                .unwrap_or_else(|| SecurityScanner::new(ScannerConfig::default())),
            licenses: self.licenses.unwrap_or_default(),
            monitor,
            versions,
            runtime: self
                .runtime
                .unwrap_or_else(|| Arc::new(InertRuntime) as Arc<dyn IntegrationRuntime>),
            bus,
        })
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Registry and lifecycle orchestrator for external integrations.
pub struct IntegrationManager {
    policy: RwLock<IntegrationPolicy>,
    registry: RwLock<HashMap<String, Integration>>,
    handlers: Mutex<HashMap<String, Arc<dyn IntegrationHandler>>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    scanner: SecurityScanner,
    licenses: LicenseChecker,
    monitor: ResourceMonitor,
    versions: VersionManager,
    runtime: Arc<dyn IntegrationRuntime>,
    bus: Arc<EventBus>,
}

impl IntegrationManager {
    pub fn builder(policy: IntegrationPolicy) -> ManagerBuilder {
        ManagerBuilder {
            policy,
            scanner: None,
            licenses: None,
            monitor: None,
            versions: None,
            runtime: None,
        }
    }

    /// Build every component from `config`, with the inert host runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::builder(config.policy.clone())
            .scanner(SecurityScanner::new(config.scanner.clone()))
            .license_checker(LicenseChecker::new(config.license.clone()))
            .monitor(ResourceMonitor::new(config.monitor.clone()))
            .versions(VersionManager::from_config(config.versions.clone())?)
            .build()
    }

    // -- accessors --

    pub fn policy(&self) -> IntegrationPolicy {
        read(&self.policy).clone()
    }

    /// Replace the admission/update policy. Existing integrations are not
    /// re-evaluated.
    pub fn update_policy(&self, policy: IntegrationPolicy) {
        *write(&self.policy) = policy;
        info!(component = "manager", "Integration policy updated");
    }

    pub fn scanner(&self) -> &SecurityScanner {
        &self.scanner
    }

    pub fn license_checker(&self) -> &LicenseChecker {
        &self.licenses
    }

    pub fn monitor(&self) -> &ResourceMonitor {
        &self.monitor
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&IntegrationEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // -- registry helpers --

    async fn lock_id(&self, id: &str) -> OwnedMutexGuard<()> {
        let mutex = Arc::clone(lock(&self.locks).entry(id.to_string()).or_default());
        mutex.lock_owned().await
    }

    fn record(&self, id: &str) -> Result<Integration> {
        read(&self.registry)
            .get(id)
            .cloned()
            .ok_or_else(|| GateError::NotFound(format!("integration '{}'", id)))
    }

    fn modify<F>(&self, id: &str, f: F) -> Result<Integration>
    where
        F: FnOnce(&mut Integration),
    {
        let mut registry = write(&self.registry);
        let integration = registry
            .get_mut(id)
            .ok_or_else(|| GateError::NotFound(format!("integration '{}'", id)))?;
        f(integration);
        Ok(integration.clone())
    }

    fn with_usage(&self, mut integration: Integration) -> Integration {
        if let Some(usage) = self.monitor.latest(&integration.id) {
            integration.resources.current_usage = Some(usage);
        }
        integration
    }

    fn is_trusted(policy: &IntegrationPolicy, integration: &Integration) -> bool {
        let registry = match &integration.config {
            IntegrationConfig::Library(c) => c.registry.as_deref(),
            _ => None,
        };
        [integration.metadata.homepage.as_deref(), registry]
            .into_iter()
            .flatten()
            .any(|location| policy.is_trusted_source(location))
    }

    /// Integration-specific limits win; otherwise the policy-wide ones.
    fn effective_limits(policy: &IntegrationPolicy, integration: &Integration) -> Option<ResourceLimits> {
        integration
            .resources
            .limits
            .clone()
            .filter(ResourceLimits::is_configured)
            .or_else(|| Some(policy.resource_limits.clone()).filter(ResourceLimits::is_configured))
    }

    // -- lifecycle --

    /// Admit a new integration.
    ///
    /// Fails with `Validation` for malformed requests, `PolicyViolation` for
    /// blacklisted names, disallowed types and incompatible licenses, and
    /// `SecurityRejected` when the scan does not pass. The registry is only
    /// touched on success.
    pub async fn register(&self, request: NewIntegration) -> Result<Integration> {
        request.validate()?;
        let policy = self.policy();

        if policy.is_blacklisted(&request.name) {
            warn!(component = "manager", integration = %request.name, "Rejected blacklisted integration");
            return Err(GateError::PolicyViolation(format!(
                "integration '{}' is blacklisted",
                request.name
            )));
        }
        let kind = request.config.kind();
        if !policy.allows_type(kind) {
            warn!(component = "manager", integration = %request.name, kind = %kind, "Rejected disallowed type");
            return Err(GateError::PolicyViolation(format!(
                "integration type '{}' is not allowed",
                kind
            )));
        }

        let mut integration = Integration::from_request(request);

        if policy.require_security_scan {
            let scan = self
                .scanner
                .scan_integration(&integration.name, &integration.metadata.version, &integration.config)
                .await?;
            if !scan.passed {
                warn!(
                    component = "manager",
                    integration = %integration.name,
                    score = scan.score,
                    "Security scan failed; integration rejected"
                );
                return Err(GateError::SecurityRejected {
                    name: integration.name.clone(),
                    score: scan.score,
                    reason: scan.failure_reason(),
                });
            }
            integration.security.last_scan = Some(scan);
        }

        if policy.require_license_check {
            let raw = integration.metadata.license.as_deref().unwrap_or("");
            let check = self.licenses.check(raw);
            if !check.compatible {
                let reason = check
                    .reason
                    .unwrap_or_else(|| format!("license '{}' is not allowed", check.license));
                warn!(component = "manager", integration = %integration.name, reason = %reason, "License check failed");
                return Err(GateError::PolicyViolation(format!(
                    "integration '{}': {}",
                    integration.name, reason
                )));
            }
        }

        ensure_transition(&integration, IntegrationStatus::Registered)?;
        integration.security.trusted = Self::is_trusted(&policy, &integration);
        integration.status = IntegrationStatus::Registered;
        integration.registered_at = Some(Utc::now());

        write(&self.registry).insert(integration.id.clone(), integration.clone());
        log_component!(
            info,
            "manager",
            "Integration registered",
            id = integration.id.as_str(),
            name = integration.name.as_str()
        );
        self.bus.emit(&IntegrationEvent::Registered {
            integration: Box::new(integration.clone()),
        });
        Ok(integration)
    }

    /// Activate an integration. A no-op if it is already active.
    ///
    /// A handler or start failure is recorded on the integration
    /// (`status = error`), emitted as an `error` event and returned.
    pub async fn activate(&self, id: &str) -> Result<Integration> {
        let _guard = self.lock_id(id).await;
        self.activate_locked(id).await
    }

    async fn activate_locked(&self, id: &str) -> Result<Integration> {
        let integration = self.record(id)?;
        if integration.is_active() {
            debug!(component = "manager", id, "Already active");
            return Ok(self.with_usage(integration));
        }
        ensure_transition(&integration, IntegrationStatus::Active)?;

        let started = match self.runtime.create_handler(&integration).await {
            Ok(handler) => {
                let outcome = handler.start().await;
                outcome.map(|()| handler)
            }
            Err(e) => Err(e),
        };
        let handler = match started {
            Ok(handler) => handler,
            Err(e) => {
                let message = e.to_string();
                self.modify(id, |i| {
                    i.status = IntegrationStatus::Error;
                    i.error = Some(message.clone());
                })?;
                error!(component = "manager", id, name = %integration.name, error = %message, "Activation failed");
                self.bus.emit(&IntegrationEvent::Error {
                    integration_id: id.to_string(),
                    name: integration.name.clone(),
                    error: message.clone(),
                });
                return Err(GateError::Operation(format!(
                    "activation of '{}' failed: {}",
                    integration.name, message
                )));
            }
        };
        lock(&self.handlers).insert(id.to_string(), handler);

        let limits = Self::effective_limits(&self.policy(), &integration);
        if let Err(e) = self
            .monitor
            .start_monitoring(id, self.runtime.collector(&integration), limits)
        {
            warn!(component = "manager", id, error = %e, "Monitoring not started");
        }

        let active = self.modify(id, |i| {
            i.status = IntegrationStatus::Active;
            i.last_active_at = Some(Utc::now());
            i.error = None;
        })?;
        log_component!(info, "manager", "Integration activated", id = id, name = active.name.as_str());
        self.bus.emit(&IntegrationEvent::Activated {
            integration_id: id.to_string(),
            name: active.name.clone(),
        });
        Ok(active)
    }

    /// Stop monitoring, stop and clean up the handler, and mark the
    /// integration suspended. A no-op if it is already suspended.
    pub async fn suspend(&self, id: &str, reason: Option<&str>) -> Result<Integration> {
        let _guard = self.lock_id(id).await;
        self.suspend_locked(id, reason).await
    }

    async fn suspend_locked(&self, id: &str, reason: Option<&str>) -> Result<Integration> {
        let integration = self.record(id)?;
        if integration.status == IntegrationStatus::Suspended {
            return Ok(integration);
        }
        ensure_transition(&integration, IntegrationStatus::Suspended)?;

        self.monitor.stop_monitoring(id);
        let handler = lock(&self.handlers).remove(id);
        if let Some(handler) = handler {
            if let Err(e) = handler.stop().await {
                warn!(component = "manager", id, error = %e, "Handler stop failed");
            }
            if let Err(e) = handler.cleanup().await {
                warn!(component = "manager", id, error = %e, "Handler cleanup failed");
            }
        }

        let usage = self.monitor.latest(id);
        let suspended = self.modify(id, |i| {
            i.status = IntegrationStatus::Suspended;
            i.resources.current_usage = usage;
        })?;
        log_component!(
            info,
            "manager",
            "Integration suspended",
            id = id,
            reason = reason.unwrap_or("")
        );
        self.bus.emit(&IntegrationEvent::Suspended {
            integration_id: id.to_string(),
            name: suspended.name.clone(),
            reason: reason.map(str::to_string),
        });
        Ok(suspended)
    }

    /// Suspend (if active) and delete. Unknown ids are ignored.
    pub async fn unregister(&self, id: &str) -> Result<()> {
        let _guard = self.lock_id(id).await;
        let Ok(integration) = self.record(id) else {
            debug!(component = "manager", id, "Unregister of unknown integration ignored");
            return Ok(());
        };
        if integration.is_active() {
            self.suspend_locked(id, Some("unregistered")).await?;
        }
        write(&self.registry).remove(id);
        lock(&self.handlers).remove(id);
        self.monitor.forget(id);
        self.versions.forget(id).await;
        lock(&self.locks).remove(id);
        info!(component = "manager", id, name = %integration.name, "Integration unregistered");
        Ok(())
    }

    /// Apply a JSON merge patch to the integration's config.
    ///
    /// An active integration is suspended first and reactivated afterwards.
    /// When scans are required the new config is re-scanned; a failing
    /// re-scan leaves the integration suspended, emits a `security-alert`
    /// event and returns `SecurityRejected`.
    pub async fn update_configuration(&self, id: &str, patch: &serde_json::Value) -> Result<Integration> {
        let _guard = self.lock_id(id).await;
        let current = self.record(id)?;
        let merged = current.config.merged(patch)?;
        let was_active = current.is_active();

        if was_active {
            self.suspend_locked(id, Some("reconfiguration")).await?;
        }
        let updated = self.modify(id, |i| i.config = merged)?;

        if self.policy().require_security_scan {
            let scan = self
                .scanner
                .scan_integration(&updated.name, &updated.metadata.version, &updated.config)
                .await?;
            self.modify(id, |i| i.security.last_scan = Some(scan.clone()))?;
            if !scan.passed {
                warn!(
                    component = "manager",
                    id,
                    name = %updated.name,
                    score = scan.score,
                    "Re-scan after reconfiguration failed; integration stays suspended"
                );
                let rejected = GateError::SecurityRejected {
                    name: updated.name.clone(),
                    score: scan.score,
                    reason: scan.failure_reason(),
                };
                self.bus.emit(&IntegrationEvent::SecurityAlert {
                    integration_id: id.to_string(),
                    name: updated.name.clone(),
                    scan: Box::new(scan),
                });
                return Err(rejected);
            }
        }

        if was_active {
            return self.activate_locked(id).await;
        }
        self.record(id)
    }

    // -- updates --

    pub async fn check_for_update(&self, id: &str) -> Result<VersionCheckResult> {
        let integration = self.record(id)?;
        self.versions.check_for_update(&integration).await
    }

    /// Check every registered integration. Failed checks are logged and
    /// left out of the result.
    pub async fn check_for_updates(&self) -> BTreeMap<String, VersionCheckResult> {
        let integrations = self.get_all_integrations();
        let checks = integrations
            .iter()
            .map(|i| self.versions.check_for_update(i));
        let outcomes = join_all(checks).await;

        let mut results = BTreeMap::new();
        for (integration, outcome) in integrations.iter().zip(outcomes) {
            match outcome {
                Ok(check) => {
                    results.insert(integration.id.clone(), check);
                }
                Err(e) => warn!(
                    component = "manager",
                    id = %integration.id,
                    name = %integration.name,
                    error = %e,
                    "Update check failed"
                ),
            }
        }
        results
    }

    /// Update an integration under the policy's auto-update rules.
    ///
    /// When an allowed update will really be applied, an active integration
    /// is suspended for the update and reactivated afterwards.
    pub async fn update_integration(&self, id: &str, options: &UpdateOptions) -> Result<UpdateResult> {
        let _guard = self.lock_id(id).await;
        let mut integration = self.record(id)?;
        let auto_update = self.policy().auto_update;

        let check = self.versions.check_for_update(&integration).await?;
        let applies = !options.dry_run && check.update_type.is_some_and(|t| auto_update.allows(t));
        let was_active = integration.is_active();

        if applies && was_active {
            integration = self.suspend_locked(id, Some("updating")).await?;
        }
        let result = self.versions.update(&mut integration, &auto_update, options).await;
        if result.applied() {
            let version = integration.metadata.version.clone();
            self.modify(id, |i| i.metadata.version = version)?;
        }
        if applies && was_active {
            self.activate_locked(id).await?;
        }
        Ok(result)
    }

    // -- queries --

    pub fn get_integration(&self, id: &str) -> Option<Integration> {
        let integration = read(&self.registry).get(id).cloned()?;
        Some(self.with_usage(integration))
    }

    /// All integrations, ordered by name then id.
    pub fn get_all_integrations(&self) -> Vec<Integration> {
        let mut all: Vec<Integration> = read(&self.registry).values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        all.into_iter().map(|i| self.with_usage(i)).collect()
    }

    pub fn get_integrations_by_type(&self, kind: IntegrationType) -> Vec<Integration> {
        self.get_all_integrations()
            .into_iter()
            .filter(|i| i.kind() == kind)
            .collect()
    }

    pub fn get_integrations_by_status(&self, status: IntegrationStatus) -> Vec<Integration> {
        self.get_all_integrations()
            .into_iter()
            .filter(|i| i.status == status)
            .collect()
    }

    /// Latest telemetry sample, if the integration has been sampled.
    pub fn get_resource_usage(&self, id: &str) -> Option<ResourceMetrics> {
        self.monitor.latest(id)
    }

    pub fn get_resource_summary(&self, id: &str) -> Option<ResourceSummary> {
        self.monitor.get_resource_summary(id)
    }

    pub async fn get_statistics(&self) -> IntegrationStatistics {
        let mut stats = IntegrationStatistics::collect(read(&self.registry).values());
        stats.outstanding_alerts = self.monitor.total_alert_count();
        stats.pending_updates = self.versions.pending_updates().await.len();
        stats
    }

    /// Suspend every active integration and stop all sampling.
    pub async fn shutdown(&self) {
        let active: Vec<String> = self
            .get_integrations_by_status(IntegrationStatus::Active)
            .into_iter()
            .map(|i| i.id)
            .collect();
        for id in active {
            if let Err(e) = self.suspend(&id, Some("shutdown")).await {
                warn!(component = "manager", id = %id, error = %e, "Suspend during shutdown failed");
            }
        }
        self.monitor.stop_all();
        info!(component = "manager", "Integration manager shut down");
    }
}
