//! Configuration management for ZeptoGate
//!
//! This module provides configuration loading, saving, and global state management.
//! Configuration is loaded from `~/.zeptogate/config.json` with environment variable overrides.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{GateError, Result};
use crate::integrations::IntegrationType;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::warn;

/// Global configuration instance
static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

impl Config {
    /// Returns the ZeptoGate configuration directory path (~/.zeptogate)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".zeptogate")
    }

    /// Returns the path to the config file (~/.zeptogate/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                GateError::Config(format!("invalid config file {}: {}", path.display(), e))
            })?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `ZEPTOGATE_*` environment variable overrides.
    ///
    /// Unparseable values are logged and ignored.
    fn apply_env_overrides(&mut self) {
        // Logging
        if let Ok(val) = std::env::var("ZEPTOGATE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("ZEPTOGATE_LOG_FORMAT") {
            match val.parse() {
                Ok(format) => self.logging.format = format,
                Err(e) => warn!("Ignoring ZEPTOGATE_LOG_FORMAT: {}", e),
            }
        }

        // Monitor
        env_parse("ZEPTOGATE_MONITOR_INTERVAL_MS", &mut self.monitor.interval_ms);
        env_parse("ZEPTOGATE_MONITOR_CPU_THRESHOLD", &mut self.monitor.cpu_threshold);
        env_parse("ZEPTOGATE_MONITOR_MEMORY_THRESHOLD", &mut self.monitor.memory_threshold);
        env_parse("ZEPTOGATE_MONITOR_STORAGE_THRESHOLD", &mut self.monitor.storage_threshold);

        // Policy
        env_parse("ZEPTOGATE_POLICY_REQUIRE_SECURITY_SCAN", &mut self.policy.require_security_scan);
        env_parse("ZEPTOGATE_POLICY_REQUIRE_LICENSE_CHECK", &mut self.policy.require_license_check);
        env_parse("ZEPTOGATE_POLICY_AUTO_UPDATE", &mut self.policy.auto_update.enabled);
        if let Ok(val) = std::env::var("ZEPTOGATE_POLICY_BLACKLIST") {
            self.policy.blacklist = split_list(&val);
        }
        if let Ok(val) = std::env::var("ZEPTOGATE_POLICY_ALLOWED_TYPES") {
            let parsed: std::result::Result<Vec<IntegrationType>, _> =
                split_list(&val).iter().map(|s| s.parse()).collect();
            match parsed {
                Ok(types) => self.policy.allowed_types = types,
                Err(e) => warn!("Ignoring ZEPTOGATE_POLICY_ALLOWED_TYPES: {}", e),
            }
        }

        // Scanner
        env_parse("ZEPTOGATE_SCANNER_DEEP", &mut self.scanner.deep);
        env_parse("ZEPTOGATE_SCANNER_FETCH_HEADERS", &mut self.scanner.fetch_headers);

        // Versions
        if let Ok(val) = std::env::var("ZEPTOGATE_VERSIONS_NPM_REGISTRY") {
            self.versions.npm_registry = val;
        }
        env_parse("ZEPTOGATE_VERSIONS_CACHE_TTL_SECS", &mut self.versions.cache_ttl_secs);
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Initialize the global configuration.
    ///
    /// This should be called once at startup. Subsequent calls will return
    /// an error if the config is already initialized.
    pub fn init() -> Result<()> {
        let config = Self::load()?;
        Self::init_with(config)
    }

    /// Initialize the global configuration with a specific config.
    pub fn init_with(config: Config) -> Result<()> {
        CONFIG
            .set(RwLock::new(config))
            .map_err(|_| GateError::Config("Configuration already initialized".to_string()))
    }

    /// Get a clone of the current global configuration.
    ///
    /// Returns default configuration if not yet initialized.
    pub fn get() -> Config {
        CONFIG
            .get()
            .map(|lock| lock.read().unwrap_or_else(|e| e.into_inner()).clone())
            .unwrap_or_default()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = std::env::var(key) {
        match val.trim().parse() {
            Ok(v) => *target = v,
            Err(_) => warn!("Ignoring {}: cannot parse '{}'", key, val),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
