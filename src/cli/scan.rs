//! Scan command handlers.

use std::collections::BTreeMap;

use anyhow::Result;

use zeptogate::integrations::ContainerConfig;
use zeptogate::scanner::{ScanTarget, SecurityScanResult, SecurityScanner};

use super::common::{load_config, print_json, print_scan, read_input, read_json};
use super::ScanAction;

/// Run one scan (or a batch) and print the result.
///
/// Exits non-zero when any scanned artifact fails.
pub(crate) async fn cmd_scan(action: ScanAction, json: bool) -> Result<()> {
    let config = load_config()?;
    let scanner = SecurityScanner::new(config.scanner);

    let (label, result) = match action {
        ScanAction::Library { name, version } => {
            let label = format!("{}@{}", name, version);
            (label, scanner.scan_library(&name, &version).await?)
        }
        ScanAction::Container { image, user, ports } => {
            let container = parse_image(&image, user, ports);
            let label = format!("{}:{}", container.image, container.tag);
            (label, scanner.scan_container(&container).await?)
        }
        ScanAction::Endpoint { url } => {
            let result = scanner.scan_endpoint(&url).await?;
            (url, result)
        }
        ScanAction::Code { file } => {
            let source = read_input(&file)?;
            (file.display().to_string(), scanner.scan_code(&source).await?)
        }
        ScanAction::Batch { file } => {
            let targets: Vec<ScanTarget> = read_json(&file)?;
            let results = scanner.batch_scan(&targets).await;
            return report_batch(targets.len(), &results, json);
        }
    };

    if json {
        print_json(&result)?;
    } else {
        print_scan(&label, &result);
    }
    if !result.passed {
        anyhow::bail!("{} failed the security scan", label);
    }
    Ok(())
}

fn report_batch(
    requested: usize,
    results: &BTreeMap<String, SecurityScanResult>,
    json: bool,
) -> Result<()> {
    if json {
        print_json(results)?;
    } else {
        for (label, result) in results {
            print_scan(label, result);
            println!();
        }
        println!("{} of {} target(s) scanned.", results.len(), requested);
    }

    let failed: Vec<&str> = results
        .iter()
        .filter(|(_, r)| !r.passed)
        .map(|(label, _)| label.as_str())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("{} target(s) failed: {}", failed.len(), failed.join(", "));
    }
    if results.len() < requested {
        anyhow::bail!("{} target(s) could not be scanned", requested - results.len());
    }
    Ok(())
}

/// Split "image:tag" into a container config. A colon that belongs to a
/// registry host ("localhost:5000/app") is not a tag separator.
fn parse_image(image: &str, user: Option<String>, ports: Vec<String>) -> ContainerConfig {
    let (name, tag) = match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') && !tag.is_empty() => {
            (name.to_string(), tag.to_string())
        }
        _ => (image.to_string(), "latest".to_string()),
    };
    ContainerConfig {
        image: name,
        tag,
        user,
        ports,
        ..Default::default()
    }
}
