//! Version manager: semver parsing, update checks and guarded update
//! execution.
//!
//! Update checks are cached per integration name. An update runs only when
//! the auto-update policy allows the bump type, and follows a fixed order:
//! backup, (dry-run stop), apply, tests, metadata. Any failure after the
//! backup triggers a restore.

pub mod executor;
pub mod semver;
pub mod source;

pub use executor::{LoggingExecutor, RecordingExecutor, UpdateExecutor};
pub use semver::{compare_versions, satisfies_range, UpdateType, Version, VersionRange};
pub use source::{HttpVersionSource, ReleaseInfo, StaticVersionSource, VersionSource};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::integrations::{AutoUpdatePolicy, Integration};

/// Version manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionConfig {
    /// How long an update check result is reused, in seconds.
    pub cache_ttl_secs: u64,
    pub npm_registry: String,
    pub docker_hub: String,
    pub http_timeout_secs: u64,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            npm_registry: "https://registry.npmjs.org".to_string(),
            docker_hub: "https://hub.docker.com".to_string(),
            http_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
    pub breaking: bool,
    pub migration_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionCheckResult {
    pub has_update: bool,
    pub current_version: String,
    pub latest_version: String,
    pub update_type: Option<UpdateType>,
    pub compatibility: Compatibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    pub backup: bool,
    pub dry_run: bool,
    pub run_tests: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            backup: true,
            dry_run: false,
            run_tests: true,
        }
    }
}

/// Outcome of one update attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub success: bool,
    pub from_version: String,
    pub to_version: Option<String>,
    pub update_type: Option<UpdateType>,
    pub dry_run: bool,
    pub rolled_back: bool,
    pub backup_id: Option<String>,
    /// Why the update did not happen or failed.
    pub error: Option<String>,
}

impl UpdateResult {
    fn new(from_version: &str) -> Self {
        Self {
            success: false,
            from_version: from_version.to_string(),
            to_version: None,
            update_type: None,
            dry_run: false,
            rolled_back: false,
            backup_id: None,
            error: None,
        }
    }

    /// `true` when the integration actually moved to a new version.
    pub fn applied(&self) -> bool {
        self.success && !self.dry_run && self.to_version.is_some()
    }
}

/// History entry for one attempted update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub integration_id: String,
    pub result: UpdateResult,
    pub at: DateTime<Utc>,
}

struct CacheEntry {
    release: Option<ReleaseInfo>,
    fetched_at: Instant,
}

pub struct VersionManager {
    config: VersionConfig,
    source: Arc<dyn VersionSource>,
    executor: Arc<dyn UpdateExecutor>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    pending: RwLock<BTreeSet<String>>,
    history: RwLock<HashMap<String, Vec<UpdateRecord>>>,
}

impl VersionManager {
    pub fn new(
        config: VersionConfig,
        source: Arc<dyn VersionSource>,
        executor: Arc<dyn UpdateExecutor>,
    ) -> Self {
        Self {
            config,
            source,
            executor,
            cache: RwLock::new(HashMap::new()),
            pending: RwLock::new(BTreeSet::new()),
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Registry-backed manager with the logging executor.
    pub fn from_config(config: VersionConfig) -> Result<Self> {
        let source = HttpVersionSource::new(
            &config.npm_registry,
            &config.docker_hub,
            Duration::from_secs(config.http_timeout_secs.max(1)),
        )?;
        Ok(Self::new(config, Arc::new(source), Arc::new(LoggingExecutor)))
    }

    pub fn config(&self) -> &VersionConfig {
        &self.config
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_secs)
    }

    async fn latest_release(&self, integration: &Integration) -> Result<Option<ReleaseInfo>> {
        let key = integration.name.clone();
        if let Some(entry) = self.cache.read().await.get(&key) {
            if entry.fetched_at.elapsed() < self.cache_ttl() {
                debug!(component = "versions", integration = %key, "Update check cache hit");
                return Ok(entry.release.clone());
            }
        }
        let release = self.source.latest(integration).await?;
        self.cache.write().await.insert(
            key,
            CacheEntry {
                release: release.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(release)
    }

    /// Compare the integration's version with the latest published release.
    ///
    /// An available update is queued in [`pending_updates`](Self::pending_updates).
    pub async fn check_for_update(&self, integration: &Integration) -> Result<VersionCheckResult> {
        let current = Version::parse(&integration.metadata.version)?;
        let release = self.latest_release(integration).await?;

        let (latest, breaking_flag) = match &release {
            Some(r) => match Version::parse_lenient(&r.version) {
                Ok(v) => (v, r.breaking),
                Err(e) => {
                    warn!(component = "versions", integration = %integration.name, error = %e, "Ignoring unparseable release version");
                    (current.clone(), false)
                }
            },
            None => (current.clone(), false),
        };

        let update_type = UpdateType::classify(&current, &latest);
        let breaking = update_type == Some(UpdateType::Major);
        let result = VersionCheckResult {
            has_update: update_type.is_some(),
            current_version: current.to_string(),
            latest_version: latest.to_string(),
            update_type,
            compatibility: Compatibility {
                breaking,
                migration_required: breaking && breaking_flag,
            },
        };

        if result.has_update {
            self.pending.write().await.insert(integration.id.clone());
            info!(
                component = "versions",
                integration = %integration.name,
                current = %result.current_version,
                latest = %result.latest_version,
                update_type = ?result.update_type,
                "Update available"
            );
        }
        Ok(result)
    }

    /// Update `integration` in place if an update exists and `policy` allows it.
    ///
    /// Never returns an error: every failure is reported through
    /// `UpdateResult::success == false`. The integration leaves the pending
    /// queue whatever the outcome.
    pub async fn update(
        &self,
        integration: &mut Integration,
        policy: &AutoUpdatePolicy,
        options: &UpdateOptions,
    ) -> UpdateResult {
        let result = self.run_update(integration, policy, options).await;
        self.pending.write().await.remove(&integration.id);
        if result.to_version.is_some() {
            self.history
                .write()
                .await
                .entry(integration.name.clone())
                .or_default()
                .push(UpdateRecord {
                    integration_id: integration.id.clone(),
                    result: result.clone(),
                    at: Utc::now(),
                });
        }
        result
    }

    async fn run_update(
        &self,
        integration: &mut Integration,
        policy: &AutoUpdatePolicy,
        options: &UpdateOptions,
    ) -> UpdateResult {
        let mut result = UpdateResult::new(&integration.metadata.version);

        let check = match self.check_for_update(integration).await {
            Ok(check) => check,
            Err(e) => {
                result.error = Some(format!("update check failed: {}", e));
                return result;
            }
        };
        let Some(update_type) = check.update_type else {
            result.success = true;
            return result;
        };
        result.to_version = Some(check.latest_version.clone());
        result.update_type = Some(update_type);

        if !policy.allows(update_type) {
            let reason = if policy.enabled {
                format!("{} updates are not allowed by policy", update_type)
            } else {
                "automatic updates are disabled by policy".to_string()
            };
            info!(component = "versions", integration = %integration.name, reason = %reason, "Update blocked");
            result.error = Some(reason);
            return result;
        }

        if options.backup {
            match self.executor.backup(integration).await {
                Ok(id) => result.backup_id = Some(id),
                Err(e) => {
                    result.error = Some(format!("backup failed: {}", e));
                    return result;
                }
            }
        }

        if options.dry_run {
            result.success = true;
            result.dry_run = true;
            return result;
        }

        let target = check.latest_version;
        let outcome = match self.executor.apply(integration, &target).await {
            Ok(()) if options.run_tests => self.executor.run_tests(integration).await,
            other => other,
        };

        if let Err(e) = outcome {
            error!(
                component = "versions",
                integration = %integration.name,
                target = %target,
                error = %e,
                "Update failed"
            );
            result.error = Some(e.to_string());
            if let Some(backup_id) = &result.backup_id {
                match self.executor.restore(integration, backup_id).await {
                    Ok(()) => result.rolled_back = true,
                    Err(re) => error!(
                        component = "versions",
                        integration = %integration.name,
                        error = %re,
                        "Rollback failed"
                    ),
                }
            }
            return result;
        }

        integration.metadata.version = target.clone();
        self.cache.write().await.remove(&integration.name);
        info!(
            component = "versions",
            integration = %integration.name,
            from = %result.from_version,
            to = %target,
            "Integration updated"
        );
        result.success = true;
        result
    }

    /// Attempted updates for the integration named `name`, oldest first.
    pub async fn history(&self, name: &str) -> Vec<UpdateRecord> {
        self.history
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Ids of integrations with a known, not-yet-attempted update.
    pub async fn pending_updates(&self) -> Vec<String> {
        self.pending.read().await.iter().cloned().collect()
    }

    /// Drop an integration from the pending queue (e.g. on unregister).
    pub async fn forget(&self, integration_id: &str) {
        self.pending.write().await.remove(integration_id);
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::{IntegrationConfig, LibraryConfig, NewIntegration};

    fn library(name: &str, version: &str) -> Integration {
        Integration::from_request(NewIntegration::new(
            name,
            version,
            IntegrationConfig::Library(LibraryConfig::default()),
        ))
    }

    fn enabled() -> AutoUpdatePolicy {
        AutoUpdatePolicy {
            enabled: true,
            ..Default::default()
        }
    }

    fn manager_with(
        source: StaticVersionSource,
        executor: Arc<RecordingExecutor>,
    ) -> VersionManager {
        VersionManager::new(VersionConfig::default(), Arc::new(source), executor)
    }

    #[tokio::test]
    async fn test_check_classifies_bumps() {
        let source = StaticVersionSource::new()
            .with_release("patchy", ReleaseInfo::new("1.0.1"))
            .with_release("major", ReleaseInfo::new("2.0.0").breaking())
            .with_release("soft-major", ReleaseInfo::new("2.0.0"));
        let vm = manager_with(source, Arc::new(RecordingExecutor::new()));

        let r = vm.check_for_update(&library("patchy", "1.0.0")).await.unwrap();
        assert!(r.has_update);
        assert_eq!(r.update_type, Some(UpdateType::Patch));
        assert!(!r.compatibility.breaking);

        let r = vm.check_for_update(&library("major", "1.4.0")).await.unwrap();
        assert_eq!(r.update_type, Some(UpdateType::Major));
        assert!(r.compatibility.breaking);
        assert!(r.compatibility.migration_required);

        let r = vm.check_for_update(&library("soft-major", "1.4.0")).await.unwrap();
        assert!(r.compatibility.breaking);
        assert!(!r.compatibility.migration_required);

        let r = vm.check_for_update(&library("unknown", "1.0.0")).await.unwrap();
        assert!(!r.has_update);
        assert_eq!(r.latest_version, "1.0.0");
        assert_eq!(vm.pending_updates().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_is_cached_for_ttl() {
        let source = Arc::new(StaticVersionSource::new().with_release("lib", ReleaseInfo::new("1.1.0")));
        let vm = VersionManager::new(
            VersionConfig::default(),
            source.clone(),
            Arc::new(RecordingExecutor::new()),
        );
        let lib = library("lib", "1.0.0");
        assert_eq!(vm.check_for_update(&lib).await.unwrap().latest_version, "1.1.0");

        source.set_release("lib", ReleaseInfo::new("1.2.0"));
        assert_eq!(vm.check_for_update(&lib).await.unwrap().latest_version, "1.1.0");

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(vm.check_for_update(&lib).await.unwrap().latest_version, "1.2.0");

        source.set_release("lib", ReleaseInfo::new("1.3.0"));
        vm.clear_cache().await;
        assert_eq!(vm.check_for_update(&lib).await.unwrap().latest_version, "1.3.0");
    }

    #[tokio::test]
    async fn test_update_noop_when_current() {
        let vm = manager_with(StaticVersionSource::new(), Arc::new(RecordingExecutor::new()));
        let mut lib = library("lib", "1.0.0");
        let result = vm.update(&mut lib, &enabled(), &UpdateOptions::default()).await;
        assert!(result.success);
        assert!(!result.applied());
        assert!(vm.history("lib").await.is_empty());
    }

    #[tokio::test]
    async fn test_update_gated_by_policy() {
        let source = StaticVersionSource::new().with_release("lib", ReleaseInfo::new("2.0.0"));
        let exec = Arc::new(RecordingExecutor::new());
        let vm = manager_with(source, exec.clone());
        let mut lib = library("lib", "1.0.0");

        let result = vm
            .update(&mut lib, &AutoUpdatePolicy::default(), &UpdateOptions::default())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("disabled"));

        let result = vm.update(&mut lib, &enabled(), &UpdateOptions::default()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("major"));
        assert_eq!(lib.metadata.version, "1.0.0");
        assert!(exec.steps().is_empty());
        assert!(vm.pending_updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_successful_update_sequence() {
        let source = StaticVersionSource::new().with_release("lib", ReleaseInfo::new("1.2.0"));
        let exec = Arc::new(RecordingExecutor::new());
        let vm = manager_with(source, exec.clone());
        let mut lib = library("lib", "1.0.0");

        let result = vm.update(&mut lib, &enabled(), &UpdateOptions::default()).await;
        assert!(result.applied());
        assert_eq!(result.update_type, Some(UpdateType::Minor));
        assert_eq!(lib.metadata.version, "1.2.0");
        assert_eq!(
            exec.steps(),
            vec!["backup:lib", "apply:lib@1.2.0", "test:lib"]
        );
        assert_eq!(vm.history("lib").await.len(), 1);
        assert!(vm.pending_updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_stops_after_backup() {
        let source = StaticVersionSource::new().with_release("lib", ReleaseInfo::new("1.0.5"));
        let exec = Arc::new(RecordingExecutor::new());
        let vm = manager_with(source, exec.clone());
        let mut lib = library("lib", "1.0.0");

        let options = UpdateOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = vm.update(&mut lib, &enabled(), &options).await;
        assert!(result.success);
        assert!(result.dry_run);
        assert!(!result.applied());
        assert_eq!(lib.metadata.version, "1.0.0");
        assert_eq!(exec.steps(), vec!["backup:lib"]);
    }

    #[tokio::test]
    async fn test_failed_tests_roll_back() {
        let source = StaticVersionSource::new().with_release("lib", ReleaseInfo::new("1.0.5"));
        let exec = Arc::new(RecordingExecutor::new().failing_tests());
        let vm = manager_with(source, exec.clone());
        let mut lib = library("lib", "1.0.0");

        let result = vm.update(&mut lib, &enabled(), &UpdateOptions::default()).await;
        assert!(!result.success);
        assert!(result.rolled_back);
        assert_eq!(lib.metadata.version, "1.0.0");
        assert_eq!(
            exec.steps(),
            vec!["backup:lib", "apply:lib@1.0.5", "test:lib", "restore:lib:backup-lib"]
        );
        assert!(vm.pending_updates().await.is_empty());
        assert!(!vm.history("lib").await[0].result.success);
    }

    #[tokio::test]
    async fn test_failed_apply_without_backup_cannot_roll_back() {
        let source = StaticVersionSource::new().with_release("lib", ReleaseInfo::new("1.0.5"));
        let exec = Arc::new(RecordingExecutor::new().failing_apply());
        let vm = manager_with(source, exec.clone());
        let mut lib = library("lib", "1.0.0");

        let options = UpdateOptions {
            backup: false,
            ..Default::default()
        };
        let result = vm.update(&mut lib, &enabled(), &options).await;
        assert!(!result.success);
        assert!(!result.rolled_back);
        assert_eq!(exec.steps(), vec!["apply:lib@1.0.5"]);
    }

    #[tokio::test]
    async fn test_source_failure_reported() {
        let source = StaticVersionSource::new();
        source.fail_for("lib", "registry down");
        let vm = manager_with(source, Arc::new(RecordingExecutor::new()));
        let mut lib = library("lib", "1.0.0");
        assert!(vm.check_for_update(&lib).await.is_err());
        let result = vm.update(&mut lib, &enabled(), &UpdateOptions::default()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("registry down"));
    }
}
