//! Command execution

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use deploy_common::{
    Collaborators, DeployConfig, DeployLog, Deployer, Operation, RunReport, Step,
};

use crate::cli::{Cli, Commands};

#[derive(Debug, Serialize)]
struct StepEntry {
    index: usize,
    name: Step,
    description: &'static str,
}

#[derive(Serialize)]
struct JsonOut<T: Serialize> {
    ok: bool,
    data: T,
}

pub fn load_config(path: Option<&Path>) -> Result<DeployConfig> {
    match path {
        Some(path) => DeployConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(DeployConfig::default()),
    }
}

/// Map a deploy subcommand to its operation
pub fn operation_for(command: &Commands) -> Option<Operation> {
    match command {
        Commands::Update => Some(Operation::Update),
        Commands::Rollback { version } => Some(Operation::Rollback(version.clone())),
        Commands::Steps { .. } | Commands::ShowConfig => None,
    }
}

pub fn render_steps(json: bool) -> Result<String> {
    let entries: Vec<StepEntry> = Deployer::plan()
        .iter()
        .enumerate()
        .map(|(i, step)| StepEntry {
            index: i + 1,
            name: *step,
            description: step.description(),
        })
        .collect();

    if json {
        return Ok(serde_json::to_string_pretty(&JsonOut {
            ok: true,
            data: entries,
        })?);
    }

    let lines: Vec<String> = entries
        .iter()
        .map(|e| format!("{:>2}. {:<22} {}", e.index, e.name.as_str(), e.description))
        .collect();
    Ok(lines.join("\n"))
}

/// Run a deploy operation with the given collaborators
pub fn deploy(
    config: DeployConfig,
    operation: &Operation,
    system: Collaborators,
    log: DeployLog,
) -> deploy_common::Result<RunReport> {
    let mut deployer = Deployer::new(config, system, log);
    let report = deployer.run(operation)?;

    if let Some(failure) = &report.failure {
        tracing::error!(
            "{} aborted at {} after {} steps",
            report.operation,
            failure.step.as_str(),
            report.completed.len()
        );
    }
    if let Ok(summary) = serde_json::to_string(&report.summary()) {
        tracing::debug!("run summary: {}", summary);
    }
    Ok(report)
}

pub fn execute(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Steps { json } => {
            println!("{}", render_steps(*json)?);
            Ok(deploy_common::EXIT_SUCCESS)
        }
        Commands::ShowConfig => {
            let text = config.to_toml().map_err(anyhow::Error::msg)?;
            print!("{}", text);
            Ok(deploy_common::EXIT_SUCCESS)
        }
        command => {
            let operation = operation_for(command)
                .context("subcommand is not a deploy operation")?;
            let log = DeployLog::open(&config.paths.log_file).with_context(|| {
                format!("Failed to open log {}", config.paths.log_file.display())
            })?;
            let system = Collaborators::system(&config);

            let report = deploy(config, &operation, system, log)?;
            Ok(report.exit_code())
        }
    }
}
