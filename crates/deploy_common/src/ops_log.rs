//! Deploy log
//!
//! Human-readable record of a single run, truncated when the run starts.
//!
//! Format: `<YYYY-MM-DD HH:MM:SS> - <message>`
//! Example: `2026-03-02 14:05:23 - Latest version found: 2.4.1`
//!
//! Every line is also mirrored to stdout so an operator on the serial
//! console sees progress live.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{DeployError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format one log line
pub fn format_line(timestamp: DateTime<Local>, message: &str) -> String {
    format!("{} - {}", timestamp.format(TIMESTAMP_FORMAT), message)
}

pub struct DeployLog {
    path: Option<PathBuf>,
    file: Option<File>,
    mirror_stdout: bool,
    lines: Vec<String>,
}

impl DeployLog {
    /// Open (and truncate) the log file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| DeployError::io(path, e))?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Some(file),
            mirror_stdout: true,
            lines: Vec::new(),
        })
    }

    /// Keep lines in memory only
    pub fn memory() -> Self {
        Self {
            path: None,
            file: None,
            mirror_stdout: false,
            lines: Vec::new(),
        }
    }

    pub fn with_stdout(mut self, mirror: bool) -> Self {
        self.mirror_stdout = mirror;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn log(&mut self, message: impl AsRef<str>) {
        let line = format_line(Local::now(), message.as_ref());

        if let Some(file) = self.file.as_mut() {
            // A full boot partition must not abort the deploy
            if let Err(e) = writeln!(file, "{}", line) {
                tracing::warn!("Failed to write deploy log: {}", e);
            }
        }
        if self.mirror_stdout {
            println!("{}", line);
        }
        self.lines.push(line);
    }

    /// Lines written during this run
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}
