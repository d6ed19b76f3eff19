//! Security scanner: vulnerability, malicious-pattern and license detection
//! for one artifact.
//!
//! Scans are keyed by artifact kind:
//!
//! - **library**: advisory lookup by `name:version`, update advice, and in
//!   deep mode typosquatting detection plus license lookup
//! - **container**: vulnerable `image:tag` pairs, root-by-default images,
//!   floating `:latest` tags
//! - **endpoint**: transport security, credentials in the URL, optional
//!   header hardening advice
//! - **code**: regex pattern bank and obfuscation heuristic
//!
//! # Example
//!
//! ```
//! use zeptogate::scanner::{ScannerConfig, SecurityScanner};
//!
//! #[tokio::main]
//! async fn main() {
//!     let scanner = SecurityScanner::new(ScannerConfig::default());
//!     let result = scanner.scan_library("lodash", "4.17.15").await.unwrap();
//!     assert!(!result.passed);
//! }
//! ```

pub mod database;
pub mod patterns;
pub mod probe;
pub mod types;

pub use patterns::{CodeAnalysis, ObfuscationSignals, PatternBank};
pub use probe::{HeaderProbe, HttpHeaderProbe, StaticHeaderProbe};
pub use types::{
    AffectedComponent, MaliciousPattern, PatternCategory, ScanKind, SecurityScanResult, Severity,
    Vulnerability,
};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{GateError, Result};
use crate::integrations::{ContainerConfig, IntegrationConfig};
use crate::license;
use crate::utils::string::levenshtein;
use crate::versions::Version;

/// Maximum edit distance at which a name is considered a typosquat.
const TYPOSQUAT_MAX_DISTANCE: usize = 2;
/// Names shorter than this are too ambiguous for typosquat checks.
const TYPOSQUAT_MIN_LEN: usize = 4;
const SECRET_QUERY_KEYS: &[&str] = &[
    "token",
    "access_token",
    "api_key",
    "apikey",
    "key",
    "secret",
    "password",
    "auth",
];

/// Scanner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Typosquatting and license lookup on library scans.
    pub deep: bool,
    /// Fetch endpoint headers to recommend hardening.
    pub fetch_headers: bool,
    /// Timeout for header probes, in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            deep: false,
            fetch_headers: false,
            probe_timeout_secs: 5,
        }
    }
}

/// One artifact to scan in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScanTarget {
    Library { name: String, version: String },
    Container(ContainerConfig),
    Endpoint { url: String },
    Code { name: String, source: String },
}

impl ScanTarget {
    /// Key used in batch results.
    pub fn label(&self) -> String {
        match self {
            ScanTarget::Library { name, version } => format!("{}@{}", name, version),
            ScanTarget::Container(c) => format!("{}:{}", c.image, c.tag),
            ScanTarget::Endpoint { url } => url.clone(),
            ScanTarget::Code { name, .. } => name.clone(),
        }
    }
}

pub struct SecurityScanner {
    config: ScannerConfig,
    patterns: PatternBank,
    probe: Option<Arc<dyn HeaderProbe>>,
}

impl SecurityScanner {
    /// Build a scanner. When `fetch_headers` is set an HTTP probe is created;
    /// if the client cannot be built, header probing is disabled.
    pub fn new(config: ScannerConfig) -> Self {
        let probe: Option<Arc<dyn HeaderProbe>> = if config.fetch_headers {
            match HttpHeaderProbe::new(Duration::from_secs(config.probe_timeout_secs.max(1))) {
                Ok(p) => Some(Arc::new(p)),
                Err(e) => {
                    warn!(component = "scanner", error = %e, "Header probe unavailable");
                    None
                }
            }
        } else {
            None
        };
        Self {
            config,
            patterns: PatternBank::new(),
            probe,
        }
    }

    /// Replace the header probe (enables endpoint header checks).
    pub fn with_probe(mut self, probe: Arc<dyn HeaderProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Scan whatever `config` describes, the way the manager does on admission.
    ///
    /// Plugins are code-scanned from their `source`; API and MCP servers get
    /// an endpoint scan.
    pub async fn scan_integration(
        &self,
        name: &str,
        version: &str,
        config: &IntegrationConfig,
    ) -> Result<SecurityScanResult> {
        match config {
            IntegrationConfig::Library(_) => self.scan_library(name, version).await,
            IntegrationConfig::Container(c) => self.scan_container(c).await,
            IntegrationConfig::Api(c) => self.scan_endpoint(&c.endpoint).await,
            IntegrationConfig::McpServer(c) => self.scan_endpoint(&c.endpoint).await,
            IntegrationConfig::Plugin(c) => self.scan_code(&c.source).await,
        }
    }

    pub async fn scan_library(&self, name: &str, version: &str) -> Result<SecurityScanResult> {
        let name = name.trim();
        let version = version.trim();
        if name.is_empty() || version.is_empty() {
            return Err(GateError::Validation(
                "library scan needs a name and a version".to_string(),
            ));
        }

        let mut vulnerabilities = Vec::new();
        let mut recommendations = Vec::new();
        let mut licenses = Vec::new();

        for adv in database::package_advisories(name, version) {
            vulnerabilities.push(Vulnerability {
                id: adv.id.to_string(),
                severity: adv.severity,
                title: adv.title.to_string(),
                description: adv.description.to_string(),
                cve: adv.cve.map(str::to_string),
                affected: AffectedComponent {
                    component: name.to_string(),
                    version: version.to_string(),
                    fixed_in: adv.fixed_in.map(str::to_string),
                },
            });
            if let Some(fixed) = adv.fixed_in {
                recommendations.push(format!(
                    "Upgrade {} to {} or later to fix {}",
                    name, fixed, adv.id
                ));
            }
        }

        if let Some(latest) = database::latest_version(name) {
            match (Version::parse(version), Version::parse(latest)) {
                (Ok(current), Ok(newest)) if newest > current => recommendations.push(format!(
                    "Update {} from {} to latest {}",
                    name, version, latest
                )),
                _ => {}
            }
        }

        if self.config.deep {
            if let Some(target) = typosquat_target(name) {
                vulnerabilities.push(Vulnerability {
                    id: format!("TYPOSQUAT-{}", name),
                    severity: Severity::Medium,
                    title: format!("Possible typosquat of '{}'", target),
                    description: format!(
                        "'{}' is within edit distance {} of the popular package '{}'",
                        name, TYPOSQUAT_MAX_DISTANCE, target
                    ),
                    cve: None,
                    affected: AffectedComponent {
                        component: name.to_string(),
                        version: version.to_string(),
                        fixed_in: None,
                    },
                });
                recommendations.push(format!(
                    "Verify that '{}' is the intended package and not '{}'",
                    name, target
                ));
            }
            match database::package_license(name).and_then(license::lookup) {
                Some(info) => licenses.push(info.clone()),
                None => recommendations.push(format!(
                    "License for '{}' could not be determined; review it manually",
                    name
                )),
            }
        }

        let result = SecurityScanResult::from_findings(
            ScanKind::Library,
            vulnerabilities,
            licenses,
            Vec::new(),
            recommendations,
        );
        log_result(&format!("{}@{}", name, version), &result);
        Ok(result)
    }

    pub async fn scan_container(&self, container: &ContainerConfig) -> Result<SecurityScanResult> {
        let image = container.image.trim();
        if image.is_empty() {
            return Err(GateError::Validation(
                "container scan needs an image".to_string(),
            ));
        }
        let tag = match container.tag.trim() {
            "" => "latest",
            t => t,
        };
        let base = database::base_image_name(image);

        let mut vulnerabilities = Vec::new();
        let mut recommendations = Vec::new();
        let affected = |fixed_in: Option<&str>| AffectedComponent {
            component: image.to_string(),
            version: tag.to_string(),
            fixed_in: fixed_in.map(str::to_string),
        };

        if let Some(adv) = database::image_advisory(base, tag) {
            vulnerabilities.push(Vulnerability {
                id: adv.id.to_string(),
                severity: adv.severity,
                title: adv.title.to_string(),
                description: adv.description.to_string(),
                cve: adv.cve.map(str::to_string),
                affected: affected(adv.fixed_in),
            });
            recommendations.push(format!("Move {} off {}:{}", image, base, tag));
        }

        let runs_as_root = match container.user.as_deref().map(str::trim) {
            Some("root") | Some("0") => true,
            Some("") | None => database::ROOT_DEFAULT_IMAGES.contains(&base),
            Some(_) => false,
        };
        if runs_as_root {
            vulnerabilities.push(Vulnerability {
                id: "CONTAINER-ROOT-USER".to_string(),
                severity: Severity::Medium,
                title: "Container probably runs as root".to_string(),
                description: format!("{} runs as root unless a user is configured", image),
                cve: None,
                affected: affected(None),
            });
            recommendations.push("Run the container as a non-root user".to_string());
        }

        if tag == "latest" {
            vulnerabilities.push(Vulnerability {
                id: "CONTAINER-LATEST-TAG".to_string(),
                severity: Severity::Low,
                title: "Floating :latest tag".to_string(),
                description: format!("{}:latest may change without notice", image),
                cve: None,
                affected: affected(None),
            });
            recommendations.push(format!("Pin {} to a specific version tag", image));
        }

        let result = SecurityScanResult::from_findings(
            ScanKind::Container,
            vulnerabilities,
            Vec::new(),
            Vec::new(),
            recommendations,
        );
        log_result(&format!("{}:{}", image, tag), &result);
        Ok(result)
    }

    pub async fn scan_endpoint(&self, endpoint: &str) -> Result<SecurityScanResult> {
        let url = reqwest::Url::parse(endpoint.trim())
            .map_err(|e| GateError::Validation(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        // Report the endpoint without its userinfo.
        let mut display = url.clone();
        let _ = display.set_username("");
        let _ = display.set_password(None);
        let component = display.to_string();

        let mut vulnerabilities = Vec::new();
        let mut recommendations = Vec::new();
        let finding = |id: &str, severity, title: &str, description: String| Vulnerability {
            id: id.to_string(),
            severity,
            title: title.to_string(),
            description,
            cve: None,
            affected: AffectedComponent {
                component: component.clone(),
                version: String::new(),
                fixed_in: None,
            },
        };

        let secure = matches!(url.scheme(), "https" | "wss");
        if !secure {
            vulnerabilities.push(finding(
                "ENDPOINT-INSECURE-TRANSPORT",
                Severity::High,
                "Endpoint does not use TLS",
                format!("Traffic to {} is sent in clear text over {}", component, url.scheme()),
            ));
            recommendations.push("Use HTTPS for this endpoint".to_string());
        }

        if !url.username().is_empty() || url.password().is_some() {
            vulnerabilities.push(finding(
                "ENDPOINT-EMBEDDED-CREDENTIALS",
                Severity::Critical,
                "Credentials embedded in URL",
                "The endpoint URL carries a username or password".to_string(),
            ));
            recommendations
                .push("Move credentials out of the URL into a secret store".to_string());
        }

        let leaked: Vec<String> = url
            .query_pairs()
            .map(|(k, _)| k.to_ascii_lowercase())
            .filter(|k| SECRET_QUERY_KEYS.contains(&k.as_str()))
            .collect();
        if !leaked.is_empty() {
            vulnerabilities.push(finding(
                "ENDPOINT-SECRET-IN-QUERY",
                Severity::High,
                "Secret passed in query string",
                format!("Query parameters {} look like credentials", leaked.join(", ")),
            ));
            recommendations.push("Send credentials in a header, not the query string".to_string());
        }

        if let Some(probe) = &self.probe {
            if secure {
                match probe.fetch_headers(url.as_str()).await {
                    Ok(headers) => recommendations.extend(probe::missing_header_advice(&headers)),
                    Err(e) => {
                        warn!(component = "scanner", endpoint = %component, error = %e, "Header probe failed");
                        recommendations.push(format!("Could not fetch headers: {}", e));
                    }
                }
            }
        }

        let result = SecurityScanResult::from_findings(
            ScanKind::Endpoint,
            vulnerabilities,
            Vec::new(),
            Vec::new(),
            recommendations,
        );
        log_result(&component, &result);
        Ok(result)
    }

    pub async fn scan_code(&self, source: &str) -> Result<SecurityScanResult> {
        let analysis = self.patterns.analyze(source);
        let mut recommendations = Vec::new();
        if analysis.signals.is_minified() {
            recommendations
                .push("Code appears minified; review the unminified source".to_string());
        }
        if !analysis.patterns.is_empty() {
            recommendations.push(
                "Review flagged constructs and restrict the plugin's permissions".to_string(),
            );
        }
        let result = SecurityScanResult::from_findings(
            ScanKind::Code,
            Vec::new(),
            Vec::new(),
            analysis.patterns,
            recommendations,
        );
        log_result("code", &result);
        Ok(result)
    }

    pub async fn scan_target(&self, target: &ScanTarget) -> Result<SecurityScanResult> {
        match target {
            ScanTarget::Library { name, version } => self.scan_library(name, version).await,
            ScanTarget::Container(c) => self.scan_container(c).await,
            ScanTarget::Endpoint { url } => self.scan_endpoint(url).await,
            ScanTarget::Code { source, .. } => self.scan_code(source).await,
        }
    }

    /// Scan every target independently. Failed targets are logged and left
    /// out of the result.
    pub async fn batch_scan(&self, targets: &[ScanTarget]) -> BTreeMap<String, SecurityScanResult> {
        let outcomes = join_all(targets.iter().map(|t| async move {
            (t.label(), self.scan_target(t).await)
        }))
        .await;

        let mut results = BTreeMap::new();
        for (label, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    results.insert(label, result);
                }
                Err(e) => {
                    warn!(component = "scanner", target = %label, error = %e, "Batch scan target failed");
                }
            }
        }
        info!(
            component = "scanner",
            requested = targets.len(),
            scanned = results.len(),
            "Batch scan complete"
        );
        results
    }
}

/// Well-known package `name` imitates, if any.
fn typosquat_target(name: &str) -> Option<&'static str> {
    if name.chars().count() < TYPOSQUAT_MIN_LEN
        || database::WELL_KNOWN_PACKAGES.contains(&name)
    {
        return None;
    }
    database::WELL_KNOWN_PACKAGES
        .iter()
        .map(|known| (*known, levenshtein(name, known)))
        .filter(|(_, d)| (1..=TYPOSQUAT_MAX_DISTANCE).contains(d))
        .min_by_key(|(_, d)| *d)
        .map(|(known, _)| known)
}

fn log_result(target: &str, result: &SecurityScanResult) {
    if result.passed {
        debug!(
            component = "scanner",
            target,
            kind = ?result.kind,
            score = result.score,
            "Scan passed"
        );
    } else {
        warn!(
            component = "scanner",
            target,
            kind = ?result.kind,
            score = result.score,
            reason = %result.failure_reason(),
            "Scan failed"
        );
    }
}
