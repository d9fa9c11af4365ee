//! Combi oven deploy library
//!
//! Fetches a release archive, installs its runtime, scripts, unit files and
//! application version onto the controller, then reboots. See [`steps`] for
//! the exact sequence.

pub mod config;
pub mod deployer;
pub mod error;
pub mod ops_log;
pub mod runner;
pub mod steps;
pub mod system;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod version;

pub use config::{DeployConfig, ServiceMapping};
pub use deployer::{Deployer, Operation};
pub use error::{DeployError, Result, EXIT_FAILURE, EXIT_SUCCESS};
pub use ops_log::DeployLog;
pub use runner::{RunReport, RunSummary, StepFailure};
pub use steps::Step;
pub use system::Collaborators;
pub use version::Version;
