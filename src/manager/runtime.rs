//! Runtime contract between the manager and the host.
//!
//! The manager never executes integration code. On activation it asks the
//! host's [`IntegrationRuntime`] for an [`IntegrationHandler`] (start / stop /
//! cleanup) and for a telemetry collector to sample while the integration is
//! active.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::info;

use crate::error::{GateError, Result};
use crate::integrations::Integration;
use crate::monitor::{ResourceCollector, ResourceMetrics};

/// Lifecycle capability for one activated integration.
#[async_trait]
pub trait IntegrationHandler: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    /// Release anything `start` acquired. Called after `stop` on suspend.
    async fn cleanup(&self) -> Result<()>;
}

/// Host runtime: produces handlers and telemetry collectors.
#[async_trait]
pub trait IntegrationRuntime: Send + Sync {
    async fn create_handler(&self, integration: &Integration) -> Result<Arc<dyn IntegrationHandler>>;

    fn collector(&self, integration: &Integration) -> Arc<dyn ResourceCollector>;
}

// ---------------------------------------------------------------------------
// Inert runtime
// ---------------------------------------------------------------------------

/// Handler that only logs its lifecycle calls.
pub struct LoggingHandler {
    name: String,
}

#[async_trait]
impl IntegrationHandler for LoggingHandler {
    async fn start(&self) -> Result<()> {
        info!(component = "runtime", integration = %self.name, "Handler started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!(component = "runtime", integration = %self.name, "Handler stopped");
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

struct IdleCollector;

#[async_trait]
impl ResourceCollector for IdleCollector {
    async fn collect(&self) -> Result<ResourceMetrics> {
        Ok(ResourceMetrics::default())
    }
}

/// Runtime for hosts without an execution layer: handlers log, collectors
/// report an idle sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertRuntime;

#[async_trait]
impl IntegrationRuntime for InertRuntime {
    async fn create_handler(&self, integration: &Integration) -> Result<Arc<dyn IntegrationHandler>> {
        Ok(Arc::new(LoggingHandler {
            name: integration.name.clone(),
        }))
    }

    fn collector(&self, _integration: &Integration) -> Arc<dyn ResourceCollector> {
        Arc::new(IdleCollector)
    }
}

// ---------------------------------------------------------------------------
// Scripted runtime
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<String>>,
    sample: RwLock<ResourceMetrics>,
}

impl Shared {
    fn record(&self, call: String) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }
}

struct ScriptedHandler {
    name: String,
    fail_start: bool,
    shared: Arc<Shared>,
}

#[async_trait]
impl IntegrationHandler for ScriptedHandler {
    async fn start(&self) -> Result<()> {
        self.shared.record(format!("start:{}", self.name));
        if self.fail_start {
            return Err(GateError::Operation(format!("{} refused to start", self.name)));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.shared.record(format!("stop:{}", self.name));
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        self.shared.record(format!("cleanup:{}", self.name));
        Ok(())
    }
}

struct ScriptedCollector {
    shared: Arc<Shared>,
}

#[async_trait]
impl ResourceCollector for ScriptedCollector {
    async fn collect(&self) -> Result<ResourceMetrics> {
        let mut sample = self
            .shared
            .sample
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        sample.timestamp = chrono::Utc::now();
        Ok(sample)
    }
}

/// Runtime with configurable failures, a settable telemetry sample and a
/// log of every handler call (`"create:NAME"`, `"start:NAME"`, ...).
#[derive(Clone, Default)]
pub struct ScriptedRuntime {
    fail_create: HashSet<String>,
    fail_start: HashSet<String>,
    shared: Arc<Shared>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler creation fails for the integration named `name`.
    pub fn failing_create(mut self, name: &str) -> Self {
        self.fail_create.insert(name.to_string());
        self
    }

    /// `start` fails for the integration named `name`.
    pub fn failing_start(mut self, name: &str) -> Self {
        self.fail_start.insert(name.to_string());
        self
    }

    /// Sample returned by every collector from now on.
    pub fn set_sample(&self, sample: ResourceMetrics) {
        *self.shared.sample.write().unwrap_or_else(|e| e.into_inner()) = sample;
    }

    pub fn calls(&self) -> Vec<String> {
        self.shared
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl IntegrationRuntime for ScriptedRuntime {
    async fn create_handler(&self, integration: &Integration) -> Result<Arc<dyn IntegrationHandler>> {
        self.shared.record(format!("create:{}", integration.name));
        if self.fail_create.contains(&integration.name) {
            return Err(GateError::Operation(format!(
                "no runtime available for {}",
                integration.name
            )));
        }
        Ok(Arc::new(ScriptedHandler {
            name: integration.name.clone(),
            fail_start: self.fail_start.contains(&integration.name),
            shared: Arc::clone(&self.shared),
        }))
    }

    fn collector(&self, _integration: &Integration) -> Arc<dyn ResourceCollector> {
        Arc::new(ScriptedCollector {
            shared: Arc::clone(&self.shared),
        })
    }
}
