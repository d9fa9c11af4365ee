//! External command execution
//!
//! Runs a tool to completion, captures its output and turns a non-zero exit
//! into [`DeployError::CommandFailed`]. No timeout is applied.

use std::ffi::{OsStr, OsString};
use std::process::{Command, Output};

use crate::error::{DeployError, Result};

/// Maximum stderr length carried into an error message
const MAX_STDERR_CHARS: usize = 2048;

pub fn run<I, S>(tool: &str, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
    tracing::debug!("exec {} {:?}", tool, args);

    let output = Command::new(tool)
        .args(&args)
        .output()
        .map_err(|source| DeployError::CommandSpawn {
            tool: tool.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
        return Err(DeployError::CommandFailed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            stderr,
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_returns_output() {
        let output = run("sh", ["-c", "echo ready"]).unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ready");
    }

    #[test]
    fn test_non_zero_exit_is_error() {
        let err = run("sh", ["-c", "echo boom >&2; exit 3"]).unwrap_err();
        match err {
            DeployError::CommandFailed { tool, stderr, .. } => {
                assert_eq!(tool, "sh");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_tool_is_spawn_error() {
        let err = run("definitely-not-a-real-tool-name", Vec::<&str>::new()).unwrap_err();
        assert!(matches!(err, DeployError::CommandSpawn { .. }));
    }
}
