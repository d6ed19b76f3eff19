//! ZeptoGate - trust and lifecycle management for third-party integrations
//!
//! Libraries, container images, API endpoints, plugins and MCP servers are
//! admitted through a policy / security scan / license gate, monitored while
//! active, and kept current by a semver-aware update engine.

pub mod bus;
pub mod config;
pub mod error;
pub mod integrations;
pub mod license;
pub mod manager;
pub mod monitor;
pub mod scanner;
pub mod utils;
pub mod versions;

pub use bus::{EventBus, EventKind, IntegrationEvent, SubscriptionId};
pub use config::Config;
pub use error::{GateError, Result};
pub use integrations::{
    Integration, IntegrationConfig, IntegrationPolicy, IntegrationStatus, IntegrationType,
    NewIntegration,
};
pub use license::{LicenseChecker, LicensePolicy};
pub use manager::{IntegrationManager, IntegrationStatistics};
pub use monitor::{ResourceAlert, ResourceLimits, ResourceMetrics, ResourceMonitor};
pub use scanner::{ScannerConfig, SecurityScanResult, SecurityScanner};
pub use versions::{UpdateOptions, UpdateResult, UpdateType, Version, VersionManager};
