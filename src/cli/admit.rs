//! Admission command: run a manifest of integrations through the gate.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use zeptogate::integrations::{IntegrationStatus, NewIntegration};
use zeptogate::manager::{IntegrationManager, IntegrationStatistics};

use super::common::{load_config, print_json, read_json};

/// Either a bare array or `{"integrations": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    List(Vec<NewIntegration>),
    Wrapped { integrations: Vec<NewIntegration> },
}

impl Manifest {
    fn into_requests(self) -> Vec<NewIntegration> {
        match self {
            Manifest::List(list) => list,
            Manifest::Wrapped { integrations } => integrations,
        }
    }
}

#[derive(Serialize)]
struct Outcome {
    name: String,
    admitted: bool,
    id: Option<String>,
    status: Option<IntegrationStatus>,
    score: Option<u8>,
    error: Option<String>,
}

#[derive(Serialize)]
struct AdmitReport {
    outcomes: Vec<Outcome>,
    statistics: IntegrationStatistics,
}

pub(crate) async fn cmd_admit(manifest: PathBuf, activate: bool, json: bool) -> Result<()> {
    let requests = read_json::<Manifest>(&manifest)?.into_requests();
    let config = load_config()?;
    let manager =
        IntegrationManager::from_config(&config).context("Failed to build integration manager")?;

    let mut outcomes = Vec::with_capacity(requests.len());
    for request in requests {
        let name = request.name.clone();
        let outcome = match manager.register(request).await {
            Ok(integration) => {
                let integration = if activate {
                    match manager.activate(&integration.id).await {
                        Ok(active) => active,
                        Err(_) => manager.get_integration(&integration.id).unwrap_or(integration),
                    }
                } else {
                    integration
                };
                Outcome {
                    name,
                    admitted: true,
                    id: Some(integration.id.clone()),
                    status: Some(integration.status),
                    score: integration.security.last_scan.as_ref().map(|s| s.score),
                    error: integration.error.clone(),
                }
            }
            Err(e) => Outcome {
                name,
                admitted: false,
                id: None,
                status: None,
                score: None,
                error: Some(e.to_string()),
            },
        };
        outcomes.push(outcome);
    }

    let report = AdmitReport {
        outcomes,
        statistics: manager.get_statistics().await,
    };
    manager.shutdown().await;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    let rejected = report.outcomes.iter().filter(|o| !o.admitted).count();
    if rejected > 0 {
        anyhow::bail!("{} of {} integration(s) rejected", rejected, report.outcomes.len());
    }
    Ok(())
}

fn print_report(report: &AdmitReport) {
    for o in &report.outcomes {
        if o.admitted {
            let status = o.status.map(|s| s.as_str()).unwrap_or("?");
            match o.score {
                Some(score) => println!("[ADMITTED] {} ({}, score {})", o.name, status, score),
                None => println!("[ADMITTED] {} ({})", o.name, status),
            }
            if let Some(err) = &o.error {
                println!("    error: {}", err);
            }
        } else {
            println!(
                "[REJECTED] {}: {}",
                o.name,
                o.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let stats = &report.statistics;
    println!();
    println!("Integrations: {}", stats.total);
    for (kind, count) in &stats.by_type {
        println!("  {:<12} {}", kind.as_str(), count);
    }
    for (status, count) in &stats.by_status {
        println!("  {:<12} {}", status.as_str(), count);
    }
    if stats.failed_scans > 0 {
        println!("Failed scans: {}", stats.failed_scans);
    }
}
