//! Update execution hooks.
//!
//! The version manager decides *whether* and *in what order* an update runs;
//! the host's `UpdateExecutor` does the actual work (snapshot, install,
//! smoke-test, restore).

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::error::{GateError, Result};
use crate::integrations::Integration;

#[async_trait]
pub trait UpdateExecutor: Send + Sync {
    /// Snapshot the integration; returns an opaque backup id.
    async fn backup(&self, integration: &Integration) -> Result<String>;

    /// Move the integration to `target_version`.
    async fn apply(&self, integration: &Integration, target_version: &str) -> Result<()>;

    /// Post-update verification.
    async fn run_tests(&self, integration: &Integration) -> Result<()>;

    /// Restore a snapshot taken by [`backup`](Self::backup).
    async fn restore(&self, integration: &Integration, backup_id: &str) -> Result<()>;
}

/// Default executor: records intent in the log and always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExecutor;

#[async_trait]
impl UpdateExecutor for LoggingExecutor {
    async fn backup(&self, integration: &Integration) -> Result<String> {
        let id = format!("backup-{}", uuid::Uuid::new_v4());
        info!(component = "versions", integration = %integration.name, backup_id = %id, "Backup recorded");
        Ok(id)
    }

    async fn apply(&self, integration: &Integration, target_version: &str) -> Result<()> {
        info!(
            component = "versions",
            integration = %integration.name,
            from = %integration.metadata.version,
            to = target_version,
            "Update recorded"
        );
        Ok(())
    }

    async fn run_tests(&self, _integration: &Integration) -> Result<()> {
        Ok(())
    }

    async fn restore(&self, integration: &Integration, backup_id: &str) -> Result<()> {
        info!(component = "versions", integration = %integration.name, backup_id, "Restore recorded");
        Ok(())
    }
}

/// Executor that records every step and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    steps: Mutex<Vec<String>>,
    fail_backup: bool,
    fail_apply: bool,
    fail_tests: bool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_backup(mut self) -> Self {
        self.fail_backup = true;
        self
    }

    pub fn failing_apply(mut self) -> Self {
        self.fail_apply = true;
        self
    }

    pub fn failing_tests(mut self) -> Self {
        self.fail_tests = true;
        self
    }

    /// Steps in call order, e.g. `["backup:lodash", "apply:lodash@4.17.21"]`.
    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, step: String) {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(step);
    }
}

#[async_trait]
impl UpdateExecutor for RecordingExecutor {
    async fn backup(&self, integration: &Integration) -> Result<String> {
        self.record(format!("backup:{}", integration.name));
        if self.fail_backup {
            return Err(GateError::Operation("backup failed".to_string()));
        }
        Ok(format!("backup-{}", integration.name))
    }

    async fn apply(&self, integration: &Integration, target_version: &str) -> Result<()> {
        self.record(format!("apply:{}@{}", integration.name, target_version));
        if self.fail_apply {
            return Err(GateError::Operation("apply failed".to_string()));
        }
        Ok(())
    }

    async fn run_tests(&self, integration: &Integration) -> Result<()> {
        self.record(format!("test:{}", integration.name));
        if self.fail_tests {
            return Err(GateError::Operation("post-update tests failed".to_string()));
        }
        Ok(())
    }

    async fn restore(&self, integration: &Integration, backup_id: &str) -> Result<()> {
        self.record(format!("restore:{}:{}", integration.name, backup_id));
        Ok(())
    }
}
