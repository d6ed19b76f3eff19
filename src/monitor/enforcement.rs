//! Enforcement hooks for resource ceilings.
//!
//! The monitor does not throttle anything itself. When a sample exceeds an
//! enforcement ceiling it notifies an [`EnforcementPolicy`]; the host decides
//! what throttling, rate limiting or OOM handling actually means.

use tracing::warn;

/// A ceiling breach the host may want to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum EnforcementAction {
    /// CPU usage (percent) above the integration's CPU ceiling.
    ThrottleCpu { usage: f64, limit: f64 },
    /// Memory use (bytes) above the integration's memory ceiling.
    LimitMemory { used: u64, limit: u64 },
    /// Request rate above the integration's rate ceiling.
    RateLimit { requests_per_second: f64, limit: f64 },
}

/// Pluggable callback receiving enforcement notifications.
///
/// Implementations must be cheap; they run on the sampling task.
pub trait EnforcementPolicy: Send + Sync {
    fn enforce(&self, resource_id: &str, action: &EnforcementAction);
}

/// Default policy: log the breach and do nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEnforcement;

impl EnforcementPolicy for LoggingEnforcement {
    fn enforce(&self, resource_id: &str, action: &EnforcementAction) {
        match action {
            EnforcementAction::ThrottleCpu { usage, limit } => warn!(
                component = "monitor",
                resource_id, usage, limit, "CPU ceiling exceeded, throttle requested"
            ),
            EnforcementAction::LimitMemory { used, limit } => warn!(
                component = "monitor",
                resource_id, used, limit, "Memory ceiling exceeded, limit requested"
            ),
            EnforcementAction::RateLimit {
                requests_per_second,
                limit,
            } => warn!(
                component = "monitor",
                resource_id, requests_per_second, limit, "Request rate ceiling exceeded"
            ),
        }
    }
}
