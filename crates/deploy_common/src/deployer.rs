//! Deployer
//!
//! Runs the fixed step sequence for an update or a rollback against a set
//! of collaborators. On success the last step reboots the device.

use std::path::{Component, Path};

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::ops_log::DeployLog;
use crate::runner::{run_steps, RunReport};
use crate::steps::{Step, StepContext};
use crate::system::Collaborators;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Install the highest version present in the archive
    Update,
    /// Install the named version
    Rollback(String),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Update => "update",
            Operation::Rollback(_) => "rollback",
        }
    }

    /// Reject a rollback whose version names no directory: empty or blank,
    /// or made only of `/`, `.` and `..`
    pub fn validate(&self) -> Result<()> {
        match self {
            Operation::Update => Ok(()),
            Operation::Rollback(version) => {
                let names_entry = Path::new(version)
                    .components()
                    .any(|c| matches!(c, Component::Normal(_)));
                if version.trim().is_empty() || !names_entry {
                    return Err(DeployError::Usage(format!(
                        "rollback requires a version, got '{}'",
                        version
                    )));
                }
                Ok(())
            }
        }
    }
}

pub struct Deployer {
    config: DeployConfig,
    system: Collaborators,
    log: DeployLog,
}

impl Deployer {
    pub fn new(config: DeployConfig, system: Collaborators, log: DeployLog) -> Self {
        Self {
            config,
            system,
            log,
        }
    }

    /// Steps a run will execute, in order
    pub fn plan() -> &'static [Step] {
        &Step::SEQUENCE
    }

    /// Run every step for `operation`. An invalid operation is logged and
    /// returned as an error before any step runs.
    pub fn run(&mut self, operation: &Operation) -> Result<RunReport> {
        if let Err(e) = operation.validate() {
            self.log.log(format!("Error: {}", e));
            return Err(e);
        }

        match operation {
            Operation::Update => self.log.log("Starting update"),
            Operation::Rollback(version) => {
                self.log.log(format!("Starting rollback to {}", version))
            }
        }

        let ctx = StepContext {
            config: &self.config,
            operation,
            system: &self.system,
            log: &mut self.log,
            version: None,
        };
        Ok(run_steps(Self::plan(), ctx))
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn log(&self) -> &DeployLog {
        &self.log
    }
}
