//! Configuration validation with unknown field detection.

use serde_json::{Map, Value};

use crate::integrations::IntegrationType;
use crate::license;
use crate::utils::string::closest_match;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["logging", "policy", "license", "monitor", "scanner", "versions"];

/// Known fields per section, keyed by dotted path.
const KNOWN_SECTIONS: &[(&str, &[&str])] = &[
    ("logging", &["format", "level", "file"]),
    (
        "policy",
        &[
            "require_security_scan",
            "require_license_check",
            "auto_update",
            "resource_limits",
            "allowed_types",
            "trusted_sources",
            "blacklist",
        ],
    ),
    (
        "policy.auto_update",
        &["enabled", "allow_major", "allow_minor", "allow_patch"],
    ),
    (
        "policy.resource_limits",
        &[
            "max_cpu_percent",
            "max_memory_bytes",
            "max_connections",
            "max_requests_per_second",
            "max_storage_bytes",
        ],
    ),
    (
        "license",
        &["allow_copyleft", "allow_proprietary", "allow_unknown", "allowed", "denied"],
    ),
    (
        "monitor",
        &[
            "interval_ms",
            "retention_secs",
            "max_samples",
            "cpu_threshold",
            "memory_threshold",
            "storage_threshold",
            "alert_on_rate_limit",
        ],
    ),
    ("scanner", &["deep", "fetch_headers", "probe_timeout_secs"]),
    (
        "versions",
        &["cache_ttl_secs", "npm_registry", "docker_hub", "http_timeout_secs"],
    ),
];

/// Percentages that must lie in 0..=100.
const PERCENT_FIELDS: &[&str] = &[
    "monitor.cpu_threshold",
    "monitor.memory_threshold",
    "monitor.storage_threshold",
    "policy.resource_limits.max_cpu_percent",
];

/// Fields that must be strictly positive.
const POSITIVE_FIELDS: &[&str] = &[
    "monitor.interval_ms",
    "monitor.max_samples",
    "scanner.probe_timeout_secs",
    "versions.http_timeout_secs",
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    closest_match(unknown, known, 3).map(|k| format!("did you mean '{}'?", k))
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn lookup<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = root.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn check_keys(
    obj: &Map<String, Value>,
    prefix: &str,
    known: &[&str],
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let mut has_unknown = false;
    for key in obj.keys() {
        if known.contains(&key.as_str()) {
            continue;
        }
        has_unknown = true;
        let msg = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}'; {}", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, join(prefix, key), msg));
    }
    has_unknown
}

/// Validate a raw JSON config value against known field names and ranges.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                "Config must be a JSON object",
            ));
            return diagnostics;
        }
    };
    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let mut has_unknown = check_keys(obj, "", KNOWN_TOP_LEVEL, &mut diagnostics);
    for (path, known) in KNOWN_SECTIONS {
        match lookup(obj, path) {
            Some(Value::Object(section)) => {
                has_unknown |= check_keys(section, path, known, &mut diagnostics);
            }
            Some(_) => diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                *path,
                "Expected an object",
            )),
            None => {}
        }
    }
    if !has_unknown {
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "All fields recognized"));
    }

    check_ranges(obj, &mut diagnostics);
    check_values(obj, &mut diagnostics);
    diagnostics
}

fn check_ranges(obj: &Map<String, Value>, diagnostics: &mut Vec<Diagnostic>) {
    for path in PERCENT_FIELDS {
        if let Some(value) = lookup(obj, path).and_then(Value::as_f64) {
            if !(0.0..=100.0).contains(&value) {
                diagnostics.push(Diagnostic::new(
                    DiagnosticLevel::Error,
                    *path,
                    format!("{} is outside 0-100", value),
                ));
            }
        }
    }
    for path in POSITIVE_FIELDS {
        if let Some(value) = lookup(obj, path).and_then(Value::as_f64) {
            if value <= 0.0 {
                diagnostics.push(Diagnostic::new(
                    DiagnosticLevel::Error,
                    *path,
                    "Must be greater than zero",
                ));
            }
        }
    }
}

fn check_values(obj: &Map<String, Value>, diagnostics: &mut Vec<Diagnostic>) {
    if let Some(format) = lookup(obj, "logging.format").and_then(Value::as_str) {
        if format.parse::<super::LogFormat>().is_err() {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "logging.format",
                format!("Unknown format '{}'; expected pretty, component or json", format),
            ));
        }
    }

    if let Some(types) = lookup(obj, "policy.allowed_types").and_then(Value::as_array) {
        let names: Vec<&str> = IntegrationType::ALL.iter().map(|t| t.as_str()).collect();
        for t in types.iter().filter_map(Value::as_str) {
            if t.parse::<IntegrationType>().is_err() {
                let msg = match closest_match(t, &names, 3) {
                    Some(s) => format!("Unknown integration type '{}'; did you mean '{}'?", t, s),
                    None => format!("Unknown integration type '{}'", t),
                };
                diagnostics.push(Diagnostic::new(
                    DiagnosticLevel::Error,
                    "policy.allowed_types",
                    msg,
                ));
            }
        }
    }

    for path in ["license.allowed", "license.denied"] {
        if let Some(ids) = lookup(obj, path).and_then(Value::as_array) {
            for id in ids.iter().filter_map(Value::as_str) {
                if license::lookup(id).is_none() {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticLevel::Warn,
                        path,
                        format!("License '{}' is not in the license database", id),
                    ));
                }
            }
        }
    }

    let scan = lookup(obj, "policy.require_security_scan").and_then(Value::as_bool);
    let licenses = lookup(obj, "policy.require_license_check").and_then(Value::as_bool);
    if scan == Some(false) && licenses == Some(false) {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "policy",
            "Both security scans and license checks are disabled; any artifact will be admitted",
        ));
    }
}
