//! Deploy errors and exit codes
//!
//! Every failure aborts the run. There is no retry and no distinction
//! between transient (network) and permanent (bad archive) failures.

use std::io;
use std::path::PathBuf;

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for every failure mode
pub const EXIT_FAILURE: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Invalid invocation: {0}")]
    Usage(String),

    #[error("{tool} exited with {status}: {stderr}")]
    CommandFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to run {tool}: {source}")]
    CommandSpawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("{what} not found at {}", path.display())]
    MissingPath { what: String, path: PathBuf },

    #[error("No versions found in {}", dir.display())]
    NoVersions { dir: PathBuf },

    #[error("No version resolved before {step}")]
    VersionUnresolved { step: &'static str },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

impl DeployError {
    pub fn missing(what: &str, path: impl Into<PathBuf>) -> Self {
        Self::MissingPath {
            what: what.to_string(),
            path: path.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
