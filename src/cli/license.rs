//! License command handlers.

use anyhow::Result;

use zeptogate::license::{DependencyNode, LicenseCheckResult, LicenseChecker};

use super::common::{load_config, print_json, read_json};
use super::LicenseAction;

pub(crate) async fn cmd_license(action: LicenseAction, json: bool) -> Result<()> {
    let config = load_config()?;
    let checker = LicenseChecker::new(config.license);

    match action {
        LicenseAction::Check { licenses } => {
            let results: Vec<LicenseCheckResult> =
                licenses.iter().map(|l| checker.check(l)).collect();
            if json {
                print_json(&results)?;
            } else {
                for result in &results {
                    print_check(result);
                }
            }
            let rejected = results.iter().filter(|r| !r.compatible).count();
            if rejected > 0 {
                anyhow::bail!("{} license(s) rejected by policy", rejected);
            }
        }
        LicenseAction::Report { tree } => {
            let root: DependencyNode = read_json(&tree)?;
            let result = checker.check_dependency_tree(&root);
            if json {
                print_json(&result)?;
            } else {
                print!("{}", checker.generate_report(&result));
            }
            if !result.overall_compatible {
                anyhow::bail!(
                    "dependency tree of '{}' is not license compatible",
                    root.name
                );
            }
        }
    }
    Ok(())
}

fn print_check(result: &LicenseCheckResult) {
    let verdict = if result.compatible { "[OK]" } else { "[REJECTED]" };
    let id = result.spdx_id.as_deref().unwrap_or("?");
    println!(
        "{} {} -> {} ({})",
        verdict,
        result.license,
        id,
        result.license_type.as_str()
    );
    if let Some(reason) = &result.reason {
        println!("    reason: {}", reason);
    }
    for w in &result.warnings {
        println!("    warning: {}", w);
    }
    if !result.obligations.is_empty() {
        println!("    obligations: {}", result.obligations.join(", "));
    }
}
