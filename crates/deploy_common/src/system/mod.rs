//! System collaborators
//!
//! Everything the deployer does to the device goes through one of these
//! traits: network fetch, archive extraction, filesystem changes and the
//! service manager. Real implementations shell out or use std; fakes in
//! [`crate::testing`] keep the whole sequence runnable without a device.

pub mod command;
pub mod extract;
pub mod fetch;
pub mod fs;
pub mod systemctl;

use std::path::Path;

use crate::config::DeployConfig;
use crate::error::Result;

pub use extract::UnzipExtractor;
pub use fetch::RemoteFetcher;
pub use fs::LocalFs;
pub use systemctl::Systemctl;

pub trait ArchiveFetcher {
    /// Download `url` to `dest`, replacing any existing file
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

pub trait ArchiveExtractor {
    /// Unpack `archive` into `dest`, overwriting existing files
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

pub trait FileSystemOps {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Entry names of a directory, sorted
    fn list_dir(&self, path: &Path) -> Result<Vec<String>>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Remove a file, link or directory tree. Missing paths are not an error.
    fn remove_all(&self, path: &Path) -> Result<()>;

    /// Copy one file to a full destination path, creating parents
    fn copy_file(&self, src: &Path, dest: &Path) -> Result<()>;

    /// Copy the contents of `src` into `dest`, overwriting by path.
    /// Entries already in `dest` that `src` does not have are left alone.
    fn copy_tree(&self, src: &Path, dest: &Path) -> Result<()>;

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()>;

    /// Apply `mode` to `path` and everything below it (links excluded)
    fn set_mode_recursive(&self, path: &Path, mode: u32) -> Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Create `link` pointing at `target`, replacing whatever is at `link`
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;
}

pub trait ServiceManager {
    fn daemon_reload(&self) -> Result<()>;

    fn enable(&self, unit: &str) -> Result<()>;

    fn disable(&self, unit: &str) -> Result<()>;

    fn stop(&self, unit: &str) -> Result<()>;

    fn restart(&self, unit: &str) -> Result<()>;

    fn reboot(&self) -> Result<()>;
}

/// The set of collaborators a deploy run works through
pub struct Collaborators {
    pub fetcher: Box<dyn ArchiveFetcher>,
    pub extractor: Box<dyn ArchiveExtractor>,
    pub fs: Box<dyn FileSystemOps>,
    pub services: Box<dyn ServiceManager>,
}

impl Collaborators {
    /// Real implementations acting on this host
    pub fn system(config: &DeployConfig) -> Self {
        Self {
            fetcher: Box::new(RemoteFetcher::new(config.source.fetch_timeout_secs)),
            extractor: Box::new(UnzipExtractor),
            fs: Box::new(LocalFs),
            services: Box::new(Systemctl),
        }
    }
}
