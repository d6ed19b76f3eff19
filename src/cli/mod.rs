//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod admit;
pub mod common;
pub mod config;
pub mod license;
pub mod scan;
pub mod semver;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "zeptogate")]
#[command(version)]
#[command(about = "Trust and lifecycle gate for third-party integrations", long_about = None)]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a security scan on one artifact
    Scan {
        #[command(subcommand)]
        action: ScanAction,
    },
    /// Check licenses and dependency trees
    License {
        #[command(subcommand)]
        action: LicenseAction,
    },
    /// Compare versions and evaluate ranges
    Semver {
        #[command(subcommand)]
        action: SemverAction,
    },
    /// Show, validate or locate the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the admission pipeline for every integration in a manifest
    Admit {
        /// JSON file with an array of integration requests
        manifest: PathBuf,
        /// Activate admitted integrations and report statistics
        #[arg(long)]
        activate: bool,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ScanAction {
    /// Scan a library package against the advisory table
    Library {
        /// Package name (e.g. "lodash")
        name: String,
        /// Installed version (e.g. "4.17.15")
        version: String,
    },
    /// Scan a container image and its runtime settings
    Container {
        /// Image name, optionally with a tag ("node:10")
        image: String,
        /// User the container runs as
        #[arg(long)]
        user: Option<String>,
        /// Port mapping (host:container); repeatable
        #[arg(long = "port")]
        ports: Vec<String>,
    },
    /// Scan an API endpoint URL
    Endpoint {
        /// Endpoint URL
        url: String,
    },
    /// Scan source code for malicious patterns ("-" reads stdin)
    Code {
        /// Source file
        file: PathBuf,
    },
    /// Scan every target in a JSON array file
    Batch {
        /// JSON file with tagged scan targets
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum LicenseAction {
    /// Check one or more license identifiers against the policy
    Check {
        /// License identifiers or names (e.g. "MIT", "GPLv3")
        #[arg(required = true)]
        licenses: Vec<String>,
    },
    /// Walk a dependency tree and print a Markdown report
    Report {
        /// JSON file with the root dependency node
        tree: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum SemverAction {
    /// Compare two versions (prints -1, 0 or 1)
    Compare { a: String, b: String },
    /// Check whether a version satisfies a range
    Satisfies { version: String, range: String },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment)
    Show,
    /// Validate the configuration file
    Check,
    /// Print the configuration file path
    Path,
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Load config early so we can respect the logging settings; fall back to
    // defaults if the config file is missing or unreadable.
    let logging_cfg = zeptogate::config::Config::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = zeptogate::utils::logging::init_logging(&logging_cfg) {
        eprintln!("Warning: {}", e);
    }

    let cli = Cli::parse();
    let json = cli.json;

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Scan { action }) => {
            scan::cmd_scan(action, json).await?;
        }
        Some(Commands::License { action }) => {
            license::cmd_license(action, json).await?;
        }
        Some(Commands::Semver { action }) => {
            semver::cmd_semver(action, json)?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action).await?;
        }
        Some(Commands::Admit { manifest, activate }) => {
            admit::cmd_admit(manifest, activate, json).await?;
        }
    }

    Ok(())
}

/// Display version information
fn cmd_version() {
    println!("zeptogate {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Trust and lifecycle gate for third-party integrations");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan_container() {
        let cli = Cli::try_parse_from([
            "zeptogate", "scan", "container", "node:10", "--user", "root", "--port", "80:80",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Scan {
                action: ScanAction::Container { image, user, ports },
            }) => {
                assert_eq!(image, "node:10");
                assert_eq!(user.as_deref(), Some("root"));
                assert_eq!(ports, vec!["80:80"]);
            }
            _ => panic!("expected scan container"),
        }
    }

    #[test]
    fn test_parse_global_json_after_subcommand() {
        let cli =
            Cli::try_parse_from(["zeptogate", "semver", "compare", "1.0.0", "2.0.0", "--json"])
                .unwrap();
        assert!(cli.json);
    }

    #[test]
    fn test_license_check_requires_argument() {
        assert!(Cli::try_parse_from(["zeptogate", "license", "check"]).is_err());
    }
}
