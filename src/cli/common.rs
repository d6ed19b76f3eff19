//! Shared CLI helpers used across multiple command handlers.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use zeptogate::config::Config;
use zeptogate::scanner::SecurityScanResult;

/// Load the effective configuration (file + environment).
pub(crate) fn load_config() -> Result<Config> {
    Config::load().with_context(|| format!("Failed to load {}", Config::path().display()))
}

/// Read a file, or stdin when the path is "-".
pub(crate) fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Read and deserialize a JSON file.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = read_input(path)?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a scan result as text.
pub(crate) fn print_scan(label: &str, result: &SecurityScanResult) {
    let verdict = if result.passed { "PASS" } else { "FAIL" };
    println!("{} {} (score {}/100)", verdict, label, result.score);

    if !result.vulnerabilities.is_empty() {
        println!();
        println!("Vulnerabilities:");
        for v in &result.vulnerabilities {
            println!("  [{}] {} {}", v.severity.as_str(), v.id, v.title);
        }
    }
    if !result.malicious_patterns.is_empty() {
        println!();
        println!("Suspicious patterns:");
        for p in &result.malicious_patterns {
            match p.line {
                Some(line) => println!("  {} (line {}): {}", p.name, line, p.description),
                None => println!("  {}: {}", p.name, p.description),
            }
        }
    }
    if !result.licenses.is_empty() {
        println!();
        println!("Licenses:");
        for l in &result.licenses {
            println!("  {} ({})", l.spdx_id, l.license_type.as_str());
        }
    }
    if !result.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for r in &result.recommendations {
            println!("  - {}", r);
        }
    }
    if !result.passed {
        println!();
        println!("Reason: {}", result.failure_reason());
    }
}
