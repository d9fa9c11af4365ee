//! Step runner
//!
//! Executes steps in order, stops at the first failure and records which
//! steps completed.

use serde::Serialize;

use crate::error::{DeployError, EXIT_FAILURE, EXIT_SUCCESS};
use crate::steps::{Step, StepContext};

#[derive(Debug)]
pub struct StepFailure {
    pub step: Step,
    pub error: DeployError,
}

#[derive(Debug)]
pub struct RunReport {
    pub operation: String,
    /// Version selected by `resolve-version`, if reached
    pub version: Option<String>,
    pub completed: Vec<Step>,
    pub failure: Option<StepFailure>,
}

/// Serializable view of a [`RunReport`]
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub operation: &'a str,
    pub version: Option<&'a str>,
    pub completed: &'a [Step],
    pub failed_step: Option<Step>,
    pub error: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }

    pub fn has_completed(&self, step: Step) -> bool {
        self.completed.contains(&step)
    }

    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            operation: &self.operation,
            version: self.version.as_deref(),
            completed: &self.completed,
            failed_step: self.failure.as_ref().map(|f| f.step),
            error: self.failure.as_ref().map(|f| f.error.to_string()),
        }
    }
}

pub fn run_steps(steps: &[Step], mut ctx: StepContext<'_>) -> RunReport {
    let mut completed = Vec::with_capacity(steps.len());
    let mut failure = None;

    for &step in steps {
        tracing::debug!(step = step.as_str(), "starting step");

        let result = step
            .precondition(&ctx)
            .and_then(|()| step.apply(&mut ctx));

        match result {
            Ok(()) => completed.push(step),
            Err(error) => {
                ctx.log.log(format!("Error in {}: {}", step.as_str(), error));
                tracing::error!(step = step.as_str(), "step failed: {}", error);
                failure = Some(StepFailure { step, error });
                break;
            }
        }
    }

    RunReport {
        operation: ctx.operation.name().to_string(),
        version: ctx.version,
        completed,
        failure,
    }
}
