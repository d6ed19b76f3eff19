//! License checker: normalization, policy compatibility and dependency-tree
//! conflict analysis.
//!
//! # Example
//!
//! ```
//! use zeptogate::license::{LicenseChecker, LicensePolicy};
//!
//! let checker = LicenseChecker::new(LicensePolicy::default());
//! assert!(checker.check("MIT").compatible);
//! assert!(!checker.check("GPLv3").compatible);
//! ```

pub mod database;
pub mod report;

pub use database::{lookup, normalize, LicenseInfo, LicenseType};

use std::collections::HashSet;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Which licenses are acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicensePolicy {
    pub allow_copyleft: bool,
    pub allow_proprietary: bool,
    pub allow_unknown: bool,
    /// When non-empty, only these SPDX ids are accepted.
    pub allowed: Vec<String>,
    /// Always rejected.
    pub denied: Vec<String>,
}

/// Result of checking one license string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseCheckResult {
    /// The license as supplied.
    pub license: String,
    /// Canonical id when recognised.
    pub spdx_id: Option<String>,
    #[serde(rename = "type")]
    pub license_type: LicenseType,
    pub compatible: bool,
    pub obligations: Vec<String>,
    pub restrictions: Vec<String>,
    pub share_alike: bool,
    pub warnings: Vec<String>,
    /// Why the license was rejected.
    pub reason: Option<String>,
}

impl LicenseCheckResult {
    fn unknown(license: &str, compatible: bool) -> Self {
        let warning = if compatible {
            format!("Unknown license '{}' accepted by policy", license)
        } else {
            format!("Unknown license '{}'", license)
        };
        Self {
            license: license.to_string(),
            spdx_id: None,
            license_type: LicenseType::Unknown,
            compatible,
            obligations: Vec::new(),
            restrictions: Vec::new(),
            share_alike: false,
            warnings: vec![warning],
            reason: (!compatible).then(|| format!("license '{}' is not recognised", license)),
        }
    }

    fn known(license: &str, info: &LicenseInfo, reason: Option<String>) -> Self {
        Self {
            license: license.to_string(),
            spdx_id: Some(info.spdx_id.clone()),
            license_type: info.license_type,
            compatible: reason.is_none(),
            obligations: info.obligations.clone(),
            restrictions: info.restrictions.clone(),
            share_alike: info.share_alike,
            warnings: Vec::new(),
            reason,
        }
    }
}

/// One node of a dependency tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyNode {
    pub name: String,
    pub version: String,
    pub license: Option<String>,
    pub dependencies: Vec<DependencyNode>,
}

impl DependencyNode {
    pub fn new(name: impl Into<String>, version: impl Into<String>, license: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            license: Some(license.into()),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, dep: DependencyNode) -> Self {
        self.dependencies.push(dep);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageLicense {
    pub name: String,
    pub version: String,
    pub result: LicenseCheckResult,
}

impl PackageLicense {
    pub fn label(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Two packages whose licenses cannot be combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseConflict {
    pub package_a: String,
    pub license_a: String,
    pub package_b: String,
    pub license_b: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyTreeResult {
    pub overall_compatible: bool,
    pub packages: Vec<PackageLicense>,
    pub conflicts: Vec<LicenseConflict>,
    pub warnings: Vec<String>,
}

/// License compatibility checker.
pub struct LicenseChecker {
    policy: RwLock<LicensePolicy>,
}

impl Default for LicenseChecker {
    fn default() -> Self {
        Self::new(LicensePolicy::default())
    }
}

impl LicenseChecker {
    pub fn new(policy: LicensePolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    pub fn policy(&self) -> LicensePolicy {
        self.policy.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_policy(&self, policy: LicensePolicy) {
        *self.policy.write().unwrap_or_else(|e| e.into_inner()) = policy;
    }

    /// Canonical SPDX id for free text, or the trimmed input when unknown.
    pub fn normalize(&self, license: &str) -> String {
        normalize(license)
    }

    /// Check a license string (possibly an `A OR B` expression) against policy.
    pub fn check(&self, license: &str) -> LicenseCheckResult {
        let policy = self.policy();
        check_with(&policy, license)
    }

    /// Walk the tree, check every package and scan all pairs for conflicts.
    pub fn check_dependency_tree(&self, root: &DependencyNode) -> DependencyTreeResult {
        let policy = self.policy();
        let mut seen = HashSet::new();
        let mut packages = Vec::new();
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            if !seen.insert(format!("{}@{}", node.name, node.version)) {
                continue;
            }
            let raw = node.license.as_deref().unwrap_or("");
            packages.push(PackageLicense {
                name: node.name.clone(),
                version: node.version.clone(),
                result: check_with(&policy, raw),
            });
            stack.extend(node.dependencies.iter().rev());
        }

        let mut conflicts = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        for (i, a) in packages.iter().enumerate() {
            for b in &packages[i + 1..] {
                let (Some(la), Some(lb)) = (resolved(a), resolved(b)) else {
                    continue;
                };
                if la.spdx_id == lb.spdx_id {
                    continue;
                }
                let reason = if la.conflicts_with(lb) {
                    Some(format!("{} is incompatible with {}", la.spdx_id, lb.spdx_id))
                } else {
                    copyleft_mix(la, lb).map(|(copyleft, permissive)| {
                        format!(
                            "copyleft {} combined with permissive {}",
                            copyleft, permissive
                        )
                    })
                };
                let Some(reason) = reason else { continue };

                let hard = la.conflicts_with(lb) || !policy.allow_copyleft;
                if hard {
                    conflicts.push(LicenseConflict {
                        package_a: a.label(),
                        license_a: la.spdx_id.clone(),
                        package_b: b.label(),
                        license_b: lb.spdx_id.clone(),
                        reason,
                    });
                } else {
                    warnings.push(format!("{} and {}: {}", a.label(), b.label(), reason));
                }
            }
        }

        for pkg in &packages {
            for w in &pkg.result.warnings {
                warnings.push(format!("{}: {}", pkg.label(), w));
            }
        }

        let overall_compatible =
            conflicts.is_empty() && packages.iter().all(|p| p.result.compatible);
        if !conflicts.is_empty() {
            warn!(
                component = "license",
                root = %root.name,
                conflicts = conflicts.len(),
                "License conflicts in dependency tree"
            );
        }
        debug!(
            component = "license",
            root = %root.name,
            packages = packages.len(),
            overall_compatible,
            "Dependency tree checked"
        );

        DependencyTreeResult {
            overall_compatible,
            packages,
            conflicts,
            warnings,
        }
    }

    /// Deterministic Markdown compliance report.
    pub fn generate_report(&self, result: &DependencyTreeResult) -> String {
        report::render(result)
    }
}

fn resolved(pkg: &PackageLicense) -> Option<&'static LicenseInfo> {
    pkg.result.spdx_id.as_deref().and_then(lookup)
}

/// `(copyleft, permissive)` ids when the pair mixes those categories.
fn copyleft_mix<'a>(a: &'a LicenseInfo, b: &'a LicenseInfo) -> Option<(&'a str, &'a str)> {
    match (a.license_type, b.license_type) {
        (LicenseType::Copyleft, LicenseType::Permissive) => Some((a.spdx_id.as_str(), b.spdx_id.as_str())),
        (LicenseType::Permissive, LicenseType::Copyleft) => Some((b.spdx_id.as_str(), a.spdx_id.as_str())),
        _ => None,
    }
}

fn check_with(policy: &LicensePolicy, license: &str) -> LicenseCheckResult {
    let alternatives: Vec<&str> = split_or(license);
    if alternatives.len() > 1 {
        let results: Vec<LicenseCheckResult> =
            alternatives.iter().map(|alt| check_single(policy, alt)).collect();
        let mut chosen = results
            .iter()
            .find(|r| r.compatible)
            .unwrap_or(&results[0])
            .clone();
        chosen.license = license.trim().to_string();
        if chosen.compatible {
            if let Some(id) = &chosen.spdx_id {
                chosen
                    .warnings
                    .push(format!("Dual-licensed; using {}", id));
            }
        }
        return chosen;
    }
    check_single(policy, license)
}

fn split_or(expr: &str) -> Vec<&str> {
    expr.split(" OR ")
        .flat_map(|part| part.split(" or "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn check_single(policy: &LicensePolicy, license: &str) -> LicenseCheckResult {
    let trimmed = license.trim();
    if trimmed.is_empty() {
        return LicenseCheckResult::unknown("(none)", policy.allow_unknown);
    }
    let id = normalize(trimmed);
    let matches = |list: &[String]| list.iter().any(|l| normalize(l) == id);

    let Some(info) = lookup(&id) else {
        if matches(&policy.denied) {
            let mut r = LicenseCheckResult::unknown(trimmed, false);
            r.reason = Some(format!("license '{}' is denied by policy", trimmed));
            return r;
        }
        let explicitly_allowed = matches(&policy.allowed);
        return LicenseCheckResult::unknown(trimmed, policy.allow_unknown || explicitly_allowed);
    };

    let reason = if matches(&policy.denied) {
        Some(format!("{} is denied by policy", id))
    } else if !policy.allowed.is_empty() && !matches(&policy.allowed) {
        Some(format!("{} is not in the allowed license list", id))
    } else if info.license_type == LicenseType::Copyleft && !policy.allow_copyleft {
        Some(format!("copyleft license {} is not allowed", id))
    } else if info.license_type == LicenseType::Proprietary && !policy.allow_proprietary {
        Some(format!("proprietary license {} is not allowed", id))
    } else {
        None
    };
    LicenseCheckResult::known(trimmed, info, reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mit_gpl_tree() -> DependencyNode {
        DependencyNode::new("app", "1.0.0", "MIT")
            .with_dependency(DependencyNode::new("gpl-lib", "2.0.0", "GPL-3.0"))
    }

    #[test]
    fn test_permissive_is_compatible() {
        let checker = LicenseChecker::default();
        let r = checker.check("MIT");
        assert!(r.compatible);
        assert_eq!(r.spdx_id.as_deref(), Some("MIT"));
        assert_eq!(r.license_type, LicenseType::Permissive);
        assert!(r.reason.is_none());
    }

    #[test]
    fn test_copyleft_gated_by_policy() {
        let checker = LicenseChecker::default();
        let r = checker.check("GPLv3");
        assert!(!r.compatible);
        assert_eq!(r.spdx_id.as_deref(), Some("GPL-3.0"));
        assert!(r.share_alike);

        checker.set_policy(LicensePolicy {
            allow_copyleft: true,
            ..Default::default()
        });
        assert!(checker.check("GPLv3").compatible);
    }

    #[test]
    fn test_unknown_license_follows_allow_unknown() {
        let checker = LicenseChecker::default();
        let r = checker.check("Beerware");
        assert!(!r.compatible);
        assert_eq!(r.license_type, LicenseType::Unknown);
        assert_eq!(r.warnings.len(), 1);

        let lenient = LicenseChecker::new(LicensePolicy {
            allow_unknown: true,
            ..Default::default()
        });
        assert!(lenient.check("Beerware").compatible);
        assert!(lenient.check("").spdx_id.is_none());
    }

    #[test]
    fn test_allow_and_deny_lists() {
        let checker = LicenseChecker::new(LicensePolicy {
            allowed: vec!["MIT".into(), "Apache 2.0".into()],
            denied: vec!["ISC".into()],
            ..Default::default()
        });
        assert!(checker.check("mit").compatible);
        assert!(checker.check("Apache-2.0").compatible);
        assert!(!checker.check("BSD-3-Clause").compatible);
        let isc = checker.check("ISC");
        assert!(!isc.compatible);
        assert!(isc.reason.unwrap().contains("denied"));
    }

    #[test]
    fn test_proprietary_gated() {
        let checker = LicenseChecker::default();
        assert!(!checker.check("UNLICENSED").compatible);
        let open = LicenseChecker::new(LicensePolicy {
            allow_proprietary: true,
            ..Default::default()
        });
        assert!(open.check("UNLICENSED").compatible);
    }

    #[test]
    fn test_or_expression_picks_compatible_alternative() {
        let checker = LicenseChecker::default();
        let r = checker.check("GPL-3.0 OR MIT");
        assert!(r.compatible);
        assert_eq!(r.spdx_id.as_deref(), Some("MIT"));
        assert_eq!(r.license, "GPL-3.0 OR MIT");

        let r = checker.check("GPL-3.0 OR AGPL-3.0");
        assert!(!r.compatible);
    }

    #[test]
    fn test_mit_gpl_tree_conflicts_without_copyleft() {
        let checker = LicenseChecker::default();
        let result = checker.check_dependency_tree(&mit_gpl_tree());
        assert!(!result.overall_compatible);
        assert_eq!(result.conflicts.len(), 1);
        let c = &result.conflicts[0];
        let named = format!("{} {}", c.package_a, c.package_b);
        assert!(named.contains("app@1.0.0"));
        assert!(named.contains("gpl-lib@2.0.0"));
    }

    #[test]
    fn test_mit_gpl_tree_warns_with_copyleft_allowed() {
        let checker = LicenseChecker::new(LicensePolicy {
            allow_copyleft: true,
            ..Default::default()
        });
        let result = checker.check_dependency_tree(&mit_gpl_tree());
        assert!(result.overall_compatible);
        assert!(result.conflicts.is_empty());
        assert!(result.warnings.iter().any(|w| w.contains("copyleft GPL-3.0")));
    }

    #[test]
    fn test_hard_incompatibility_always_conflicts() {
        let checker = LicenseChecker::new(LicensePolicy {
            allow_copyleft: true,
            ..Default::default()
        });
        let tree = DependencyNode::new("app", "1.0.0", "Apache-2.0")
            .with_dependency(DependencyNode::new("old", "0.1.0", "GPL-2.0"));
        let result = checker.check_dependency_tree(&tree);
        assert!(!result.overall_compatible);
        assert!(result.conflicts[0].reason.contains("incompatible"));
    }

    #[test]
    fn test_tree_dedupes_and_degrades_per_node() {
        let shared = DependencyNode::new("shared", "1.0.0", "MIT");
        let unlicensed = DependencyNode {
            name: "mystery".into(),
            version: "0.0.1".into(),
            license: None,
            dependencies: vec![],
        };
        let tree = DependencyNode::new("app", "1.0.0", "MIT")
            .with_dependency(DependencyNode::new("a", "1.0.0", "ISC").with_dependency(shared.clone()))
            .with_dependency(shared)
            .with_dependency(unlicensed);
        let result = LicenseChecker::default().check_dependency_tree(&tree);
        assert_eq!(result.packages.len(), 4);
        assert!(result.conflicts.is_empty());
        assert!(!result.overall_compatible);
        assert!(result.warnings.iter().any(|w| w.starts_with("mystery@0.0.1")));
    }
}
