//! Configuration types for ZeptoGate

use serde::{Deserialize, Serialize};

use crate::integrations::IntegrationPolicy;
use crate::license::LicensePolicy;
use crate::monitor::MonitorConfig;
use crate::scanner::ScannerConfig;
use crate::versions::VersionConfig;

/// Main configuration struct for ZeptoGate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log output settings
    pub logging: LoggingConfig,
    /// Admission and update policy
    pub policy: IntegrationPolicy,
    /// License compatibility policy
    pub license: LicensePolicy,
    /// Resource sampling and global thresholds
    pub monitor: MonitorConfig,
    /// Security scanner options
    pub scanner: ScannerConfig,
    /// Update checks and registries
    pub versions: VersionConfig,
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output
    Pretty,
    /// Compact single-line output with the `component` field
    #[default]
    Component,
    /// JSON lines
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "component" | "compact" => Ok(LogFormat::Component),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info",
    /// "zeptogate::monitor=debug").
    pub level: String,
    /// Append JSON logs to this file instead of stdout.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            file: None,
        }
    }
}
