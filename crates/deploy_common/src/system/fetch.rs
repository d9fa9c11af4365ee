//! Archive download
//!
//! `http(s)://` URLs are fetched with a blocking reqwest client, following
//! redirects (branch archives redirect to a codeload host). `file://` URLs
//! are copied from the local filesystem, which bench rigs use to serve a
//! release from a USB stick.

use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

use super::ArchiveFetcher;
use crate::error::{DeployError, Result};

const USER_AGENT: &str = concat!("combi-deploy/", env!("CARGO_PKG_VERSION"));

pub struct RemoteFetcher {
    timeout: Option<Duration>,
}

impl RemoteFetcher {
    pub fn new(timeout_secs: Option<u64>) -> Self {
        Self {
            timeout: timeout_secs.map(Duration::from_secs),
        }
    }

    fn fetch_http(&self, url: &str, dest: &Path) -> Result<u64> {
        let download_err = |reason: String| DeployError::Download {
            url: url.to_string(),
            reason,
        };

        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .build()
            .map_err(|e| download_err(e.to_string()))?;

        let mut response = client
            .get(url)
            .send()
            .map_err(|e| download_err(e.to_string()))?;

        let status = response.status();
        tracing::debug!("GET {} -> {}", url, status);
        if !status.is_success() {
            return Err(download_err(format!("HTTP {}", status)));
        }

        let mut file = File::create(dest).map_err(|e| DeployError::io(dest, e))?;
        response
            .copy_to(&mut file)
            .map_err(|e| download_err(e.to_string()))
    }

    fn fetch_file(&self, url: &str, path: &str, dest: &Path) -> Result<u64> {
        fs::copy(path, dest).map_err(|e| DeployError::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

impl ArchiveFetcher for RemoteFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
        }

        let bytes = match url.strip_prefix("file://") {
            Some(path) => self.fetch_file(url, path, dest)?,
            None => self.fetch_http(url, dest)?,
        };

        if bytes == 0 {
            return Err(DeployError::Download {
                url: url.to_string(),
                reason: "archive is empty".to_string(),
            });
        }

        tracing::info!("fetched {} bytes from {}", bytes, url);
        Ok(())
    }
}
