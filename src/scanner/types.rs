//! Scan result types and scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::license::LicenseInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Points subtracted from the score per finding.
    pub fn penalty(&self) -> u32 {
        match self {
            Severity::Critical => 30,
            Severity::High => 20,
            Severity::Medium => 10,
            Severity::Low => 5,
        }
    }

    /// Critical and high findings fail a scan.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedComponent {
    pub component: String,
    pub version: String,
    pub fixed_in: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub cve: Option<String>,
    pub affected: AffectedComponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    DynamicEval,
    ProcessAccess,
    FilesystemAccess,
    NetworkAccess,
    Crypto,
    Secret,
    Obfuscation,
}

/// A suspicious construct found by a code scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaliciousPattern {
    pub name: String,
    pub category: PatternCategory,
    pub description: String,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// 1-based line of the first match.
    pub line: Option<usize>,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Library,
    Container,
    Endpoint,
    Code,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityScanResult {
    pub kind: ScanKind,
    pub passed: bool,
    pub vulnerabilities: Vec<Vulnerability>,
    pub licenses: Vec<LicenseInfo>,
    pub malicious_patterns: Vec<MaliciousPattern>,
    pub recommendations: Vec<String>,
    pub score: u8,
    pub scanned_at: DateTime<Utc>,
}

impl SecurityScanResult {
    /// Assemble a result, deriving `score` and `passed` from the findings.
    pub fn from_findings(
        kind: ScanKind,
        vulnerabilities: Vec<Vulnerability>,
        licenses: Vec<LicenseInfo>,
        malicious_patterns: Vec<MaliciousPattern>,
        recommendations: Vec<String>,
    ) -> Self {
        let score = score(&vulnerabilities, &malicious_patterns);
        let blocking_vuln = vulnerabilities.iter().any(|v| v.severity.is_blocking());
        let blocking_pattern = kind == ScanKind::Code && !malicious_patterns.is_empty();
        Self {
            kind,
            passed: !blocking_vuln && !blocking_pattern,
            vulnerabilities,
            licenses,
            malicious_patterns,
            recommendations,
            score,
            scanned_at: Utc::now(),
        }
    }

    /// One-line summary of what failed the scan.
    pub fn failure_reason(&self) -> String {
        let mut parts: Vec<String> = self
            .vulnerabilities
            .iter()
            .filter(|v| v.severity.is_blocking())
            .map(|v| format!("{} ({})", v.title, v.severity.as_str()))
            .collect();
        if self.kind == ScanKind::Code {
            parts.extend(self.malicious_patterns.iter().map(|p| p.name.clone()));
        }
        if parts.is_empty() {
            "no blocking findings".to_string()
        } else {
            parts.join(", ")
        }
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.vulnerabilities
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }
}

/// 100 minus severity penalties and `floor(confidence * 20)` per pattern,
/// clamped to 0..=100.
pub fn score(vulnerabilities: &[Vulnerability], patterns: &[MaliciousPattern]) -> u8 {
    let vuln_penalty: u32 = vulnerabilities.iter().map(|v| v.severity.penalty()).sum();
    let pattern_penalty: u32 = patterns
        .iter()
        .map(|p| (p.confidence.clamp(0.0, 1.0) * 20.0).floor() as u32)
        .sum();
    100u32.saturating_sub(vuln_penalty + pattern_penalty) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vuln(severity: Severity) -> Vulnerability {
        Vulnerability {
            id: "X".into(),
            severity,
            title: "t".into(),
            description: "d".into(),
            cve: None,
            affected: AffectedComponent {
                component: "c".into(),
                version: "1".into(),
                fixed_in: None,
            },
        }
    }

    fn pattern(confidence: f64) -> MaliciousPattern {
        MaliciousPattern {
            name: "eval".into(),
            category: PatternCategory::DynamicEval,
            description: "d".into(),
            confidence,
            line: None,
            snippet: None,
        }
    }

    #[test]
    fn test_score_penalties() {
        assert_eq!(score(&[], &[]), 100);
        assert_eq!(score(&[vuln(Severity::Critical)], &[]), 70);
        assert_eq!(
            score(
                &[vuln(Severity::High), vuln(Severity::Medium), vuln(Severity::Low)],
                &[]
            ),
            65
        );
        // floor(0.77 * 20) = 15
        assert_eq!(score(&[], &[pattern(0.77)]), 85);
    }

    #[test]
    fn test_score_clamps_at_zero() {
        let many: Vec<_> = (0..5).map(|_| vuln(Severity::Critical)).collect();
        assert_eq!(score(&many, &[]), 0);
    }

    #[test]
    fn test_passed_requires_no_blocking_vulnerabilities() {
        let r = SecurityScanResult::from_findings(
            ScanKind::Library,
            vec![vuln(Severity::Medium), vuln(Severity::Low)],
            vec![],
            vec![],
            vec![],
        );
        assert!(r.passed);
        let r = SecurityScanResult::from_findings(
            ScanKind::Library,
            vec![vuln(Severity::High)],
            vec![],
            vec![],
            vec![],
        );
        assert!(!r.passed);
        assert!(r.failure_reason().contains("high"));
    }

    #[test]
    fn test_patterns_only_fail_code_scans() {
        let lib = SecurityScanResult::from_findings(
            ScanKind::Library,
            vec![],
            vec![],
            vec![pattern(0.5)],
            vec![],
        );
        assert!(lib.passed);
        let code = SecurityScanResult::from_findings(
            ScanKind::Code,
            vec![],
            vec![],
            vec![pattern(0.5)],
            vec![],
        );
        assert!(!code.passed);
        assert_eq!(code.score, 90);
    }
}
