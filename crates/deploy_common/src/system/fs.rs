//! Local filesystem operations
//!
//! Unix only: modes and symlinks are applied with `std::os::unix`.

use std::fs;
use std::io;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;

use walkdir::WalkDir;

use super::FileSystemOps;
use crate::error::{DeployError, Result};

pub struct LocalFs;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Replace whatever is at `dest` with a link copy of `src`
fn copy_link(src: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(src).map_err(|e| DeployError::io(src, e))?;
    if dest.symlink_metadata().is_ok() {
        LocalFs.remove_all(dest)?;
    }
    symlink(&target, dest).map_err(|e| DeployError::io(dest, e))
}

impl FileSystemOps for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let entries = fs::read_dir(path).map_err(|e| DeployError::io(path, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DeployError::io(path, e))?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| DeployError::io(path, e))
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let meta = match path.symlink_metadata() {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(DeployError::io(path, e)),
        };

        let result = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| DeployError::io(path, e))
    }

    fn copy_file(&self, src: &Path, dest: &Path) -> Result<()> {
        ensure_parent(dest)?;
        fs::copy(src, dest).map_err(|e| DeployError::io(src, e))?;
        Ok(())
    }

    fn copy_tree(&self, src: &Path, dest: &Path) -> Result<()> {
        if !src.is_dir() {
            return Err(DeployError::missing("Directory", src));
        }
        fs::create_dir_all(dest).map_err(|e| DeployError::io(dest, e))?;

        for entry in WalkDir::new(src).min_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(src).to_path_buf();
                DeployError::io(path, io::Error::new(io::ErrorKind::Other, e.to_string()))
            })?;
            let rel = match entry.path().strip_prefix(src) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let target = dest.join(rel);
            let file_type = entry.file_type();

            if file_type.is_symlink() {
                copy_link(entry.path(), &target)?;
            } else if file_type.is_dir() {
                fs::create_dir_all(&target).map_err(|e| DeployError::io(&target, e))?;
            } else {
                fs::copy(entry.path(), &target).map_err(|e| DeployError::io(entry.path(), e))?;
            }
        }
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| DeployError::io(path, e))
    }

    fn set_mode_recursive(&self, path: &Path, mode: u32) -> Result<()> {
        for entry in WalkDir::new(path) {
            let entry = entry.map_err(|e| {
                let p = e.path().unwrap_or(path).to_path_buf();
                DeployError::io(p, io::Error::new(io::ErrorKind::Other, e.to_string()))
            })?;
            if entry.file_type().is_symlink() {
                continue;
            }
            self.set_mode(entry.path(), mode)?;
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).map_err(|e| DeployError::io(from, e))
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        self.remove_all(link)?;
        ensure_parent(link)?;
        symlink(target, link).map_err(|e| DeployError::io(link, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_copy_tree_is_additive() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(src.join("images")).unwrap();
        fs::write(src.join("main.gapp"), "new").unwrap();
        fs::write(src.join("images/bg.png"), "png").unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("main.gapp"), "old").unwrap();
        fs::write(dest.join("stale.lua"), "stale").unwrap();

        LocalFs.copy_tree(&src, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("main.gapp")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dest.join("images/bg.png")).unwrap(), "png");
        assert_eq!(fs::read_to_string(dest.join("stale.lua")).unwrap(), "stale");
    }

    #[test]
    fn test_copy_tree_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFs
            .copy_tree(&dir.path().join("nope"), &dir.path().join("dest"))
            .unwrap_err();
        assert!(matches!(err, DeployError::MissingPath { .. }));
    }

    #[test]
    fn test_set_mode_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("runtime");
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lib/libsbengine.so"), "elf").unwrap();
        LocalFs.set_mode(&root.join("lib/libsbengine.so"), 0o600).unwrap();

        LocalFs.set_mode_recursive(&root, 0o755).unwrap();

        assert_eq!(mode_of(&root.join("lib/libsbengine.so")), 0o755);
        assert_eq!(mode_of(&root.join("lib")), 0o755);
    }

    #[test]
    fn test_symlink_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("etc/resolv.conf");
        fs::create_dir_all(link.parent().unwrap()).unwrap();
        fs::write(&link, "nameserver 10.0.0.1").unwrap();

        LocalFs
            .symlink(Path::new("/run/systemd/resolve/stub-resolv.conf"), &link)
            .unwrap();

        assert_eq!(
            fs::read_link(&link).unwrap(),
            Path::new("/run/systemd/resolve/stub-resolv.conf")
        );
    }

    #[test]
    fn test_remove_all_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        LocalFs.remove_all(&dir.path().join("absent")).unwrap();

        let tree = dir.path().join("staging");
        fs::create_dir_all(tree.join("a/b")).unwrap();
        LocalFs.remove_all(&tree).unwrap();
        assert!(!LocalFs.exists(&tree));
    }

    #[test]
    fn test_list_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2.0.0", "1.0.0", "10.0.1"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        assert_eq!(
            LocalFs.list_dir(dir.path()).unwrap(),
            vec!["1.0.0", "10.0.1", "2.0.0"]
        );
    }
}
