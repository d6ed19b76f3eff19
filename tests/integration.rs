//! Integration tests for ZeptoGate
//!
//! These tests drive the public API end to end: admission through the
//! policy / scan / license gate, the lifecycle state machine, resource
//! sampling with alerts on the event bus, updates, and configuration files.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;
use zeptogate::{
    bus::{EventKind, IntegrationEvent},
    config::Config,
    integrations::{
        AutoUpdatePolicy, ContainerConfig, IntegrationConfig, IntegrationPolicy,
        IntegrationStatus, IntegrationType, LibraryConfig, NewIntegration,
    },
    license::{DependencyNode, LicenseChecker, LicensePolicy},
    manager::{IntegrationManager, ScriptedRuntime},
    monitor::{AlertSeverity, AlertType, MonitorConfig, ResourceMetrics, ResourceMonitor},
    versions::{
        compare_versions, satisfies_range, RecordingExecutor, ReleaseInfo, StaticVersionSource,
        UpdateExecutor, UpdateOptions, UpdateType, VersionConfig, VersionManager,
    },
    GateError,
};

// ============================================================================
// Helpers
// ============================================================================

fn static_versions(source: StaticVersionSource) -> VersionManager {
    VersionManager::new(
        VersionConfig::default(),
        Arc::new(source),
        Arc::new(RecordingExecutor::new()),
    )
}

fn build_manager(policy: IntegrationPolicy, runtime: &ScriptedRuntime) -> IntegrationManager {
    IntegrationManager::builder(policy)
        .runtime(Arc::new(runtime.clone()))
        .monitor(ResourceMonitor::new(MonitorConfig {
            interval_ms: 100,
            ..Default::default()
        }))
        .versions(static_versions(StaticVersionSource::new()))
        .build()
        .unwrap()
}

fn library(name: &str, version: &str) -> NewIntegration {
    NewIntegration::new(name, version, IntegrationConfig::Library(LibraryConfig::default()))
        .with_license("MIT")
}

fn count_events(manager: &IntegrationManager, kind: EventKind) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    manager.subscribe(kind, move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    hits
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_blacklisted_registration_leaves_registry_unchanged() {
    let runtime = ScriptedRuntime::new();
    let manager = build_manager(
        IntegrationPolicy {
            blacklist: vec!["left-pad".into()],
            ..Default::default()
        },
        &runtime,
    );
    manager.register(library("is-odd", "3.0.1")).await.unwrap();
    let before = manager.get_all_integrations().len();

    let err = manager.register(library("left-pad", "1.0.0")).await.unwrap_err();
    assert!(matches!(err, GateError::PolicyViolation(_)));
    assert_eq!(manager.get_all_integrations().len(), before);
}

#[tokio::test]
async fn test_admission_errors_by_kind() {
    let runtime = ScriptedRuntime::new();
    let manager = build_manager(IntegrationPolicy::default(), &runtime);

    let missing_version = NewIntegration::new(
        "nameless-version",
        "",
        IntegrationConfig::Library(LibraryConfig::default()),
    );
    assert!(matches!(
        manager.register(missing_version).await.unwrap_err(),
        GateError::Validation(_)
    ));

    let vulnerable = library("lodash", "4.17.15");
    assert!(matches!(
        manager.register(vulnerable).await.unwrap_err(),
        GateError::SecurityRejected { .. }
    ));

    let agpl = library("server-kit", "1.0.0").with_license("AGPL-3.0");
    assert!(matches!(
        manager.register(agpl).await.unwrap_err(),
        GateError::PolicyViolation(_)
    ));

    assert!(manager.get_all_integrations().is_empty());
}

#[tokio::test]
async fn test_container_admission_uses_image_scan() {
    let runtime = ScriptedRuntime::new();
    let manager = build_manager(IntegrationPolicy::default(), &runtime);

    let old_node = NewIntegration::new(
        "legacy-node",
        "10.0.0",
        IntegrationConfig::Container(ContainerConfig {
            image: "node".into(),
            tag: "10".into(),
            user: Some("node".into()),
            ..Default::default()
        }),
    )
    .with_license("MIT");
    assert!(matches!(
        manager.register(old_node).await.unwrap_err(),
        GateError::SecurityRejected { .. }
    ));

    let redis = NewIntegration::new(
        "cache",
        "7.2.0",
        IntegrationConfig::Container(ContainerConfig {
            image: "redis".into(),
            tag: "7.2".into(),
            user: Some("redis".into()),
            ..Default::default()
        }),
    )
    .with_license("BSD-3-Clause");
    let registered = manager.register(redis).await.unwrap();
    assert_eq!(registered.kind(), IntegrationType::Container);
    assert_eq!(manager.get_integrations_by_type(IntegrationType::Container).len(), 1);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_clean_library_lifecycle() {
    let runtime = ScriptedRuntime::new();
    let manager = build_manager(IntegrationPolicy::default(), &runtime);

    let registered = manager.register(library("left-pad", "1.3.0")).await.unwrap();
    assert_eq!(registered.status, IntegrationStatus::Registered);
    assert!(registered.security.last_scan.as_ref().unwrap().passed);

    let active = manager.activate(&registered.id).await.unwrap();
    assert_eq!(active.status, IntegrationStatus::Active);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(manager.get_resource_usage(&registered.id).is_some());

    let suspended = manager.suspend(&registered.id, Some("maintenance")).await.unwrap();
    assert_eq!(suspended.status, IntegrationStatus::Suspended);
    assert!(!manager.monitor().is_monitoring(&registered.id));

    let samples = manager.monitor().get_metrics(&registered.id, None).len();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(manager.monitor().get_metrics(&registered.id, None).len(), samples);

    manager.activate(&registered.id).await.unwrap();
    manager.unregister(&registered.id).await.unwrap();
    assert!(manager.get_integration(&registered.id).is_none());
    assert_eq!(
        runtime.calls(),
        vec![
            "create:left-pad",
            "start:left-pad",
            "stop:left-pad",
            "cleanup:left-pad",
            "create:left-pad",
            "start:left-pad",
            "stop:left-pad",
            "cleanup:left-pad",
        ]
    );
}

#[tokio::test]
async fn test_activate_requires_registration_first() {
    let runtime = ScriptedRuntime::new();
    let manager = build_manager(IntegrationPolicy::default(), &runtime);
    assert!(matches!(
        manager.activate("no-such-id").await.unwrap_err(),
        GateError::NotFound(_)
    ));
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_activation_is_idempotent() {
    let runtime = ScriptedRuntime::new();
    let manager = Arc::new(build_manager(IntegrationPolicy::default(), &runtime));
    let id = manager.register(library("shared", "1.0.0")).await.unwrap().id;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let id = id.clone();
            tokio::spawn(async move { manager.activate(&id).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().unwrap().is_active());
    }
    assert_eq!(runtime.calls(), vec!["create:shared", "start:shared"]);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_failed_start_is_recorded_and_returned() {
    let runtime = ScriptedRuntime::new().failing_start("flaky");
    let manager = build_manager(IntegrationPolicy::default(), &runtime);
    let errors = count_events(&manager, EventKind::Error);

    let id = manager.register(library("flaky", "1.0.0")).await.unwrap().id;
    let err = manager.activate(&id).await.unwrap_err();
    assert!(matches!(err, GateError::Operation(_)));

    let stored = manager.get_integration(&id).unwrap();
    assert_eq!(stored.status, IntegrationStatus::Error);
    assert!(stored.error.is_some());
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert!(!manager.monitor().is_monitoring(&id));
}

// ============================================================================
// Monitoring
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cpu_spike_raises_one_critical_alert() {
    let runtime = ScriptedRuntime::new();
    let mut hot = ResourceMetrics::default();
    hot.cpu.usage = 96.0;
    runtime.set_sample(hot);

    let manager = build_manager(IntegrationPolicy::default(), &runtime);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    manager.subscribe(EventKind::ResourceAlert, move |event| {
        if let IntegrationEvent::ResourceAlert { alert, .. } = event {
            sink.lock().unwrap().push(alert.clone());
        }
    });

    let id = manager.register(library("busy", "1.0.0")).await.unwrap().id;
    manager.activate(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let alerts = seen.lock().unwrap().clone();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::Cpu);
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    assert_eq!(alerts[0].resource_id, id);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_panicking_subscriber_does_not_break_admission() {
    let runtime = ScriptedRuntime::new();
    let manager = build_manager(IntegrationPolicy::default(), &runtime);
    manager.subscribe(EventKind::Registered, |_| panic!("subscriber bug"));
    let registered = count_events(&manager, EventKind::Registered);

    manager.register(library("sturdy", "1.0.0")).await.unwrap();
    assert_eq!(registered.load(Ordering::SeqCst), 1);
    assert_eq!(manager.get_all_integrations().len(), 1);
}

// ============================================================================
// Reconfiguration & updates
// ============================================================================

#[tokio::test]
async fn test_reconfiguration_to_vulnerable_image_stays_suspended() {
    let runtime = ScriptedRuntime::new();
    let manager = build_manager(IntegrationPolicy::default(), &runtime);
    let alerts = count_events(&manager, EventKind::SecurityAlert);

    let request = NewIntegration::new(
        "web",
        "20.0.0",
        IntegrationConfig::Container(ContainerConfig {
            image: "node".into(),
            tag: "20".into(),
            user: Some("node".into()),
            ..Default::default()
        }),
    )
    .with_license("MIT");
    let id = manager.register(request).await.unwrap().id;
    manager.activate(&id).await.unwrap();

    let err = manager
        .update_configuration(&id, &json!({"tag": "10"}))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::SecurityRejected { .. }));

    let stored = manager.get_integration(&id).unwrap();
    assert_eq!(stored.status, IntegrationStatus::Suspended);
    assert!(!stored.security.last_scan.unwrap().passed);
    assert_eq!(alerts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_update_with_failing_tests_rolls_back() {
    let runtime = ScriptedRuntime::new();
    let executor = Arc::new(RecordingExecutor::new().failing_tests());
    let versions = VersionManager::new(
        VersionConfig::default(),
        Arc::new(StaticVersionSource::new().with_release("lib", ReleaseInfo::new("1.1.0"))),
        executor.clone() as Arc<dyn UpdateExecutor>,
    );
    let manager = IntegrationManager::builder(IntegrationPolicy {
        auto_update: AutoUpdatePolicy {
            enabled: true,
            ..Default::default()
        },
        ..Default::default()
    })
    .runtime(Arc::new(runtime.clone()))
    .versions(versions)
    .build()
    .unwrap();

    let id = manager.register(library("lib", "1.0.0")).await.unwrap().id;
    manager.activate(&id).await.unwrap();

    let result = manager
        .update_integration(&id, &UpdateOptions::default())
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.rolled_back);
    assert_eq!(result.update_type, Some(UpdateType::Minor));

    let stored = manager.get_integration(&id).unwrap();
    assert_eq!(stored.metadata.version, "1.0.0");
    assert!(stored.is_active());
    assert!(executor.steps().iter().any(|s| s.starts_with("restore:")));
    assert_eq!(manager.versions().history("lib").await.len(), 1);
}

#[tokio::test]
async fn test_dry_run_update_keeps_integration_running() {
    let runtime = ScriptedRuntime::new();
    let manager = IntegrationManager::builder(IntegrationPolicy {
        auto_update: AutoUpdatePolicy {
            enabled: true,
            ..Default::default()
        },
        ..Default::default()
    })
    .runtime(Arc::new(runtime.clone()))
    .versions(static_versions(
        StaticVersionSource::new().with_release("lib", ReleaseInfo::new("1.0.1")),
    ))
    .build()
    .unwrap();

    let id = manager.register(library("lib", "1.0.0")).await.unwrap().id;
    manager.activate(&id).await.unwrap();
    let options = UpdateOptions {
        dry_run: true,
        ..Default::default()
    };
    let result = manager.update_integration(&id, &options).await.unwrap();
    assert!(result.dry_run);
    assert!(!result.applied());
    assert_eq!(manager.get_integration(&id).unwrap().metadata.version, "1.0.0");
    assert_eq!(runtime.calls(), vec!["create:lib", "start:lib"]);
}

// ============================================================================
// License & semver
// ============================================================================

#[test]
fn test_mit_and_gpl_tree_conflicts_without_copyleft() {
    let checker = LicenseChecker::new(LicensePolicy {
        allow_copyleft: false,
        ..Default::default()
    });
    let tree = DependencyNode::new("app", "1.0.0", "MIT")
        .with_dependency(DependencyNode::new("readline-gpl", "2.0.0", "GPL-3.0"));
    let result = checker.check_dependency_tree(&tree);

    assert!(!result.overall_compatible);
    assert!(!result.conflicts.is_empty());
    let conflict = &result.conflicts[0];
    let named = [conflict.package_a.as_str(), conflict.package_b.as_str()];
    assert!(named.iter().any(|p| p.starts_with("app")));
    assert!(named.iter().any(|p| p.starts_with("readline-gpl")));

    let report = checker.generate_report(&result);
    assert_eq!(report, checker.generate_report(&result));
    let summary = report.find("## Summary").unwrap();
    let conflicts = report.find("## Conflicts").unwrap();
    assert!(summary < conflicts);
}

#[test]
fn test_semver_properties() {
    for (a, b) in [("1.2.3", "1.10.0"), ("2.0.0-rc.1", "2.0.0"), ("0.9.9", "0.9.9")] {
        let forward = compare_versions(a, b).unwrap();
        let backward = compare_versions(b, a).unwrap();
        assert_eq!(forward, backward.reverse());
    }
    assert!(compare_versions("1.2.3", "1.2.3").unwrap().is_eq());

    assert!(satisfies_range("1.2.3", "^1.0.0").unwrap());
    assert!(!satisfies_range("2.0.0", "^1.0.0").unwrap());
    assert!(satisfies_range("1.2.3", "~1.2.0").unwrap());
    assert!(!satisfies_range("1.3.0", "~1.2.0").unwrap());
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_manager_from_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "policy": {"allowed_types": ["container"], "require_license_check": false},
            "license": {"allow_copyleft": true},
            "monitor": {"interval_ms": 250}
        }"#,
    )
    .unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert!(config.license.allow_copyleft);
    assert_eq!(config.monitor.interval_ms, 250);

    let manager = IntegrationManager::from_config(&config).unwrap();
    let err = manager.register(library("lib", "1.0.0")).await.unwrap_err();
    assert!(matches!(err, GateError::PolicyViolation(_)));
    assert_eq!(manager.policy().allowed_types, vec![IntegrationType::Container]);
}
