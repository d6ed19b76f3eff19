//! Organization-wide admission and update policy.

use serde::{Deserialize, Serialize};

use super::types::IntegrationType;
use crate::monitor::ResourceLimits;
use crate::versions::UpdateType;

/// Which automatic updates are permitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoUpdatePolicy {
    pub enabled: bool,
    pub allow_major: bool,
    pub allow_minor: bool,
    pub allow_patch: bool,
}

impl Default for AutoUpdatePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_major: false,
            allow_minor: true,
            allow_patch: true,
        }
    }
}

impl AutoUpdatePolicy {
    /// Whether an update of the given bump type passes the gate.
    pub fn allows(&self, update_type: UpdateType) -> bool {
        self.enabled
            && match update_type {
                UpdateType::Major => self.allow_major,
                UpdateType::Minor => self.allow_minor,
                UpdateType::Patch => self.allow_patch,
            }
    }
}

/// Policy gating admission and update of integrations.
///
/// Owned by the manager; replaced only through an explicit update call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationPolicy {
    pub require_security_scan: bool,
    pub require_license_check: bool,
    pub auto_update: AutoUpdatePolicy,
    /// Policy-wide resource ceilings, used when an integration sets none.
    pub resource_limits: ResourceLimits,
    pub allowed_types: Vec<IntegrationType>,
    /// URL prefixes whose artifacts are marked trusted.
    pub trusted_sources: Vec<String>,
    /// Integration names that are never admitted (case-insensitive).
    pub blacklist: Vec<String>,
}

impl Default for IntegrationPolicy {
    fn default() -> Self {
        Self {
            require_security_scan: true,
            require_license_check: true,
            auto_update: AutoUpdatePolicy::default(),
            resource_limits: ResourceLimits::default(),
            allowed_types: IntegrationType::ALL.to_vec(),
            trusted_sources: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

impl IntegrationPolicy {
    pub fn is_blacklisted(&self, name: &str) -> bool {
        let name = name.trim();
        self.blacklist.iter().any(|b| b.trim().eq_ignore_ascii_case(name))
    }

    pub fn allows_type(&self, kind: IntegrationType) -> bool {
        self.allowed_types.contains(&kind)
    }

    /// Whether `location` starts with one of the trusted source prefixes.
    pub fn is_trusted_source(&self, location: &str) -> bool {
        self.trusted_sources
            .iter()
            .filter(|s| !s.is_empty())
            .any(|s| location.starts_with(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_requires_checks() {
        let policy = IntegrationPolicy::default();
        assert!(policy.require_security_scan);
        assert!(policy.require_license_check);
        assert!(!policy.auto_update.enabled);
        assert_eq!(policy.allowed_types.len(), 5);
    }

    #[test]
    fn test_blacklist_case_insensitive() {
        let policy = IntegrationPolicy {
            blacklist: vec!["left-pad".into()],
            ..Default::default()
        };
        assert!(policy.is_blacklisted("left-pad"));
        assert!(policy.is_blacklisted("Left-Pad"));
        assert!(!policy.is_blacklisted("right-pad"));
    }

    #[test]
    fn test_allows_type() {
        let policy = IntegrationPolicy {
            allowed_types: vec![IntegrationType::Library],
            ..Default::default()
        };
        assert!(policy.allows_type(IntegrationType::Library));
        assert!(!policy.allows_type(IntegrationType::Plugin));
    }

    #[test]
    fn test_trusted_source_prefix() {
        let policy = IntegrationPolicy {
            trusted_sources: vec!["https://registry.npmjs.org".into(), String::new()],
            ..Default::default()
        };
        assert!(policy.is_trusted_source("https://registry.npmjs.org/lodash"));
        assert!(!policy.is_trusted_source("https://evil.example.com"));
    }

    #[test]
    fn test_auto_update_gate() {
        let disabled = AutoUpdatePolicy::default();
        assert!(!disabled.allows(UpdateType::Patch));

        let enabled = AutoUpdatePolicy {
            enabled: true,
            ..Default::default()
        };
        assert!(enabled.allows(UpdateType::Patch));
        assert!(enabled.allows(UpdateType::Minor));
        assert!(!enabled.allows(UpdateType::Major));
    }

    #[test]
    fn test_policy_deserializes_partial() {
        let policy: IntegrationPolicy =
            serde_json::from_str(r#"{"blacklist":["left-pad"],"allowed_types":["library","mcp-server"]}"#)
                .unwrap();
        assert!(policy.require_security_scan);
        assert_eq!(
            policy.allowed_types,
            vec![IntegrationType::Library, IntegrationType::McpServer]
        );
    }
}
