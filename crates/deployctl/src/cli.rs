//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution logic.

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};

use deploy_common::{Operation, EXIT_FAILURE, EXIT_SUCCESS};
use std::path::PathBuf;

/// Combi oven software deployer
#[derive(Parser, Debug)]
#[command(name = "deploy")]
#[command(about = "Update or roll back the combi oven controller software", long_about = None)]
#[command(version)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// TOML file overriding the built-in device layout
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Install the latest version from the release archive, then reboot
    Update,

    /// Install a specific version from the release archive, then reboot
    Rollback {
        /// Version directory name under app/, e.g. 1.5.2
        #[arg(value_parser = parse_rollback_version)]
        version: String,
    },

    /// List the deploy steps in execution order
    Steps {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

fn parse_rollback_version(s: &str) -> Result<String, String> {
    let operation = Operation::Rollback(s.to_string());
    operation.validate().map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

/// Exit code for a parse error: help and version exit 0, every invalid
/// invocation exits 1
pub fn parse_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_SUCCESS,
        _ => EXIT_FAILURE,
    }
}
