//! Registry statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::integrations::{Integration, IntegrationStatus, IntegrationType};

/// Snapshot of the registry returned by
/// [`IntegrationManager::get_statistics`](super::IntegrationManager::get_statistics).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationStatistics {
    pub total: usize,
    pub by_type: BTreeMap<IntegrationType, usize>,
    pub by_status: BTreeMap<IntegrationStatus, usize>,
    /// Integrations whose most recent scan did not pass.
    pub failed_scans: usize,
    /// Resource alerts still held by the monitor.
    pub outstanding_alerts: usize,
    pub pending_updates: usize,
}

impl IntegrationStatistics {
    pub(crate) fn collect<'a, I>(integrations: I) -> Self
    where
        I: IntoIterator<Item = &'a Integration>,
    {
        let mut stats = IntegrationStatistics::default();
        for integration in integrations {
            stats.total += 1;
            *stats.by_type.entry(integration.kind()).or_default() += 1;
            *stats.by_status.entry(integration.status).or_default() += 1;
            if integration
                .security
                .last_scan
                .as_ref()
                .is_some_and(|scan| !scan.passed)
            {
                stats.failed_scans += 1;
            }
        }
        stats
    }

    pub fn count_type(&self, kind: IntegrationType) -> usize {
        self.by_type.get(&kind).copied().unwrap_or(0)
    }

    pub fn count_status(&self, status: IntegrationStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}
