//! Integration record types.
//!
//! The [`Integration`] struct is the serialization contract for any management
//! API or UI. Type-specific settings live in the tagged [`IntegrationConfig`]
//! union, so the integration kind is always derived from its config.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};
use crate::monitor::{ResourceLimits, ResourceMetrics};
use crate::scanner::SecurityScanResult;

// ============================================================================
// Kind & status
// ============================================================================

/// The kind of external artifact an integration wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrationType {
    /// A package from a language registry (npm, PyPI, crates.io, ...).
    Library,
    /// A remote HTTP API endpoint.
    Api,
    /// A container image.
    Container,
    /// Executable plugin code loaded by the host.
    Plugin,
    /// A Model Context Protocol server.
    McpServer,
}

impl IntegrationType {
    /// Every integration kind, in declaration order.
    pub const ALL: [IntegrationType; 5] = [
        IntegrationType::Library,
        IntegrationType::Api,
        IntegrationType::Container,
        IntegrationType::Plugin,
        IntegrationType::McpServer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationType::Library => "library",
            IntegrationType::Api => "api",
            IntegrationType::Container => "container",
            IntegrationType::Plugin => "plugin",
            IntegrationType::McpServer => "mcp-server",
        }
    }
}

impl fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationType {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        IntegrationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| GateError::Validation(format!("unknown integration type '{}'", s)))
    }
}

/// Lifecycle state of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Unregistered,
    Registered,
    Active,
    Suspended,
    Error,
}

impl IntegrationStatus {
    pub const ALL: [IntegrationStatus; 5] = [
        IntegrationStatus::Unregistered,
        IntegrationStatus::Registered,
        IntegrationStatus::Active,
        IntegrationStatus::Suspended,
        IntegrationStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Unregistered => "unregistered",
            IntegrationStatus::Registered => "registered",
            IntegrationStatus::Active => "active",
            IntegrationStatus::Suspended => "suspended",
            IntegrationStatus::Error => "error",
        }
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// `active` is only reachable through an explicit activation, and a
    /// failed activation may land in `error` from any activatable state.
    pub fn can_transition_to(&self, next: IntegrationStatus) -> bool {
        use IntegrationStatus::*;
        matches!(
            (self, next),
            (Unregistered, Registered)
                | (Registered, Active)
                | (Registered, Error)
                | (Active, Suspended)
                | (Active, Error)
                | (Suspended, Active)
                | (Suspended, Error)
                | (Error, Active)
                | (Error, Suspended)
                | (Error, Error)
        )
    }
}

impl fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Metadata & config
// ============================================================================

/// Descriptive metadata supplied at registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationMetadata {
    /// Semantic version of the artifact (e.g. "1.4.2").
    pub version: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub homepage: Option<String>,
    /// Free-text license string; normalized by the license checker.
    pub license: Option<String>,
    /// Declared dependencies, name -> version requirement.
    pub dependencies: BTreeMap<String, String>,
}

/// Settings for [`IntegrationType::Library`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Registry URL the package is pulled from. `None` means the public default.
    pub registry: Option<String>,
}

/// Settings for [`IntegrationType::Api`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API.
    pub endpoint: String,
    /// Static headers sent with each request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Settings for [`IntegrationType::Container`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image name (e.g. "redis").
    pub image: String,
    /// Image tag (e.g. "7-alpine").
    #[serde(default = "default_tag")]
    pub tag: String,
    /// User the container runs as. `None` means the image default.
    #[serde(default)]
    pub user: Option<String>,
    /// Port mappings (host:container).
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_tag() -> String {
    "latest".to_string()
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            tag: default_tag(),
            user: None,
            ports: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

/// Settings for [`IntegrationType::Plugin`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Entry point (file, function or module) the host loads.
    pub entry_point: String,
    /// Plugin source code submitted for the code scan.
    #[serde(default)]
    pub source: String,
}

/// Settings for [`IntegrationType::McpServer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// URL the server is reached at.
    pub endpoint: String,
    /// Command used to launch a local server, if any.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Type-specific configuration, tagged by integration kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IntegrationConfig {
    Library(LibraryConfig),
    Api(ApiConfig),
    Container(ContainerConfig),
    Plugin(PluginConfig),
    McpServer(McpServerConfig),
}

impl IntegrationConfig {
    pub fn kind(&self) -> IntegrationType {
        match self {
            IntegrationConfig::Library(_) => IntegrationType::Library,
            IntegrationConfig::Api(_) => IntegrationType::Api,
            IntegrationConfig::Container(_) => IntegrationType::Container,
            IntegrationConfig::Plugin(_) => IntegrationType::Plugin,
            IntegrationConfig::McpServer(_) => IntegrationType::McpServer,
        }
    }

    /// Check the required fields of the active variant.
    pub fn validate(&self) -> Result<()> {
        let missing = match self {
            IntegrationConfig::Library(_) => None,
            IntegrationConfig::Api(c) if c.endpoint.trim().is_empty() => Some("endpoint"),
            IntegrationConfig::Container(c) if c.image.trim().is_empty() => Some("image"),
            IntegrationConfig::Plugin(c) if c.entry_point.trim().is_empty() => {
                Some("entry_point")
            }
            IntegrationConfig::McpServer(c) if c.endpoint.trim().is_empty() => Some("endpoint"),
            _ => None,
        };
        match missing {
            Some(field) => Err(GateError::Validation(format!(
                "{} config is missing '{}'",
                self.kind(),
                field
            ))),
            None => Ok(()),
        }
    }

    /// Apply a JSON merge patch. The patch may not change the integration kind.
    pub fn merged(&self, patch: &serde_json::Value) -> Result<IntegrationConfig> {
        if !patch.is_object() {
            return Err(GateError::Validation(
                "configuration patch must be a JSON object".to_string(),
            ));
        }
        let mut current = serde_json::to_value(self)?;
        merge_json(&mut current, patch);
        let merged: IntegrationConfig = serde_json::from_value(current)
            .map_err(|e| GateError::Validation(format!("invalid configuration: {}", e)))?;
        if merged.kind() != self.kind() {
            return Err(GateError::Validation(format!(
                "cannot change integration type from {} to {}",
                self.kind(),
                merged.kind()
            )));
        }
        merged.validate()?;
        Ok(merged)
    }
}

/// RFC 7386 style merge: objects merge recursively, `null` deletes, anything
/// else replaces.
fn merge_json(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(t), serde_json::Value::Object(p)) => {
            for (key, value) in p {
                if value.is_null() {
                    t.remove(key);
                } else {
                    merge_json(t.entry(key.clone()).or_insert(serde_json::Value::Null), value);
                }
            }
        }
        (t, p) => *t = p.clone(),
    }
}

// ============================================================================
// Integration record
// ============================================================================

/// Security bookkeeping attached to an integration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityState {
    pub last_scan: Option<SecurityScanResult>,
    /// Capabilities granted to the integration by the host.
    pub permissions: Vec<String>,
    /// Whether the artifact comes from a trusted source.
    pub trusted: bool,
}

/// Resource ceilings and the latest observed usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceState {
    pub limits: Option<ResourceLimits>,
    pub current_usage: Option<ResourceMetrics>,
}

/// A registered external artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub name: String,
    /// Mirrors `config.type`; configuration patches cannot change it.
    #[serde(rename = "type")]
    integration_type: IntegrationType,
    pub status: IntegrationStatus,
    pub metadata: IntegrationMetadata,
    pub config: IntegrationConfig,
    #[serde(default)]
    pub security: SecurityState,
    #[serde(default)]
    pub resources: ResourceState,
    pub registered_at: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
    /// Last error message (set when activation fails).
    pub error: Option<String>,
}

impl Integration {
    /// Build an unregistered record from a registration request.
    pub fn from_request(request: NewIntegration) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name,
            integration_type: request.config.kind(),
            status: IntegrationStatus::Unregistered,
            metadata: request.metadata,
            config: request.config,
            security: SecurityState {
                last_scan: None,
                permissions: request.permissions,
                trusted: false,
            },
            resources: ResourceState {
                limits: request.limits,
                current_usage: None,
            },
            registered_at: None,
            last_active_at: None,
            error: None,
        }
    }

    pub fn kind(&self) -> IntegrationType {
        self.integration_type
    }

    pub fn is_active(&self) -> bool {
        self.status == IntegrationStatus::Active
    }
}

/// Everything a caller supplies to register an integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIntegration {
    pub name: String,
    #[serde(default)]
    pub metadata: IntegrationMetadata,
    pub config: IntegrationConfig,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

impl NewIntegration {
    pub fn new(name: impl Into<String>, version: impl Into<String>, config: IntegrationConfig) -> Self {
        Self {
            name: name.into(),
            metadata: IntegrationMetadata {
                version: version.into(),
                ..Default::default()
            },
            config,
            permissions: Vec::new(),
            limits: None,
        }
    }

    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.metadata.license = Some(license.into());
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Reject malformed requests before any policy or scan work.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GateError::Validation("integration name is required".to_string()));
        }
        if self.metadata.version.trim().is_empty() {
            return Err(GateError::Validation(format!(
                "integration '{}' has no version",
                self.name
            )));
        }
        self.config.validate()
    }
}
