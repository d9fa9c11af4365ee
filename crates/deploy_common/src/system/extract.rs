use std::ffi::OsStr;
use std::path::Path;

use super::command;
use super::ArchiveExtractor;
use crate::error::Result;

/// Extracts ZIP archives with the `unzip` tool shipped in the device image
pub struct UnzipExtractor;

impl ArchiveExtractor for UnzipExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        command::run(
            "unzip",
            [
                OsStr::new("-o"),
                OsStr::new("-q"),
                archive.as_os_str(),
                OsStr::new("-d"),
                dest.as_os_str(),
            ],
        )?;
        tracing::debug!("extracted {} into {}", archive.display(), dest.display());
        Ok(())
    }
}
