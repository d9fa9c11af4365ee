//! In-memory collaborators
//!
//! Lets the full deploy sequence run against the default device layout
//! without touching the host: files live in a [`MemoryFs`], downloads and
//! archive contents are scripted, and service manager calls are recorded.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::system::{
    ArchiveExtractor, ArchiveFetcher, Collaborators, FileSystemOps, ServiceManager,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir { mode: u32 },
    File { data: Vec<u8>, mode: u32 },
    Symlink { target: PathBuf },
}

const DEFAULT_DIR_MODE: u32 = 0o755;
const DEFAULT_FILE_MODE: u32 = 0o644;

fn not_found(path: &Path) -> DeployError {
    DeployError::io(
        path,
        io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
    )
}

/// Shared in-memory file tree. Clones see the same tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    nodes: Arc<Mutex<BTreeMap<PathBuf, Node>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Node>> {
        // A panicking test thread must not hide the tree from the others
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mkdirs(nodes: &mut BTreeMap<PathBuf, Node>, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            nodes
                .entry(ancestor.to_path_buf())
                .or_insert(Node::Dir {
                    mode: DEFAULT_DIR_MODE,
                });
        }
    }

    fn mkparents(nodes: &mut BTreeMap<PathBuf, Node>, path: &Path) {
        if let Some(parent) = path.parent() {
            Self::mkdirs(nodes, parent);
        }
    }

    pub fn write_file(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut nodes = self.lock();
        Self::mkparents(&mut nodes, path);
        nodes.insert(
            path.to_path_buf(),
            Node::File {
                data: data.into(),
                mode: DEFAULT_FILE_MODE,
            },
        );
    }

    pub fn mkdir(&self, path: impl AsRef<Path>) {
        Self::mkdirs(&mut self.lock(), path.as_ref());
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock().get(path.as_ref()) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Option<String> {
        self.read_file(path)
            .map(|data| String::from_utf8_lossy(&data).to_string())
    }

    pub fn mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        match self.lock().get(path.as_ref()) {
            Some(Node::Dir { mode }) | Some(Node::File { mode, .. }) => Some(*mode),
            _ => None,
        }
    }

    pub fn node(&self, path: impl AsRef<Path>) -> Option<Node> {
        self.lock().get(path.as_ref()).cloned()
    }

    pub fn link_target(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        match self.lock().get(path.as_ref()) {
            Some(Node::Symlink { target }) => Some(target.clone()),
            _ => None,
        }
    }

    /// Files below `root`, relative to it, sorted
    pub fn files_under(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        let root = root.as_ref();
        self.lock()
            .iter()
            .filter(|(path, node)| {
                path.starts_with(root) && *path != root && matches!(node, Node::File { .. })
            })
            .filter_map(|(path, _)| path.strip_prefix(root).ok().map(Path::to_path_buf))
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<PathBuf, Node> {
        self.lock().clone()
    }
}

impl FileSystemOps for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(Node::Dir { .. }))
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let nodes = self.lock();
        match nodes.get(path) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(DeployError::missing("Directory", path)),
            None => return Err(not_found(path)),
        }
        let mut names: Vec<String> = nodes
            .keys()
            .filter(|p| p.parent() == Some(path))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        names.sort();
        Ok(names)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut nodes = self.lock();
        if let Some(node) = nodes.get(path) {
            if !matches!(node, Node::Dir { .. }) {
                return Err(DeployError::io(
                    path,
                    io::Error::new(io::ErrorKind::AlreadyExists, "File exists"),
                ));
            }
        }
        Self::mkdirs(&mut nodes, path);
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        self.lock().retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn copy_file(&self, src: &Path, dest: &Path) -> Result<()> {
        let mut nodes = self.lock();
        let node = match nodes.get(src) {
            Some(node @ Node::File { .. }) => node.clone(),
            _ => return Err(not_found(src)),
        };
        Self::mkparents(&mut nodes, dest);
        nodes.insert(dest.to_path_buf(), node);
        Ok(())
    }

    fn copy_tree(&self, src: &Path, dest: &Path) -> Result<()> {
        let mut nodes = self.lock();
        if !matches!(nodes.get(src), Some(Node::Dir { .. })) {
            return Err(DeployError::missing("Directory", src));
        }

        let entries: Vec<(PathBuf, Node)> = nodes
            .iter()
            .filter(|(p, _)| p.starts_with(src) && p.as_path() != src)
            .filter_map(|(p, n)| p.strip_prefix(src).ok().map(|r| (dest.join(r), n.clone())))
            .collect();

        Self::mkdirs(&mut nodes, dest);
        for (target, node) in entries {
            Self::mkparents(&mut nodes, &target);
            match node {
                Node::Dir { .. } => Self::mkdirs(&mut nodes, &target),
                other => {
                    nodes.insert(target, other);
                }
            }
        }
        Ok(())
    }

    fn set_mode(&self, path: &Path, new_mode: u32) -> Result<()> {
        match self.lock().get_mut(path) {
            Some(Node::Dir { mode }) | Some(Node::File { mode, .. }) => {
                *mode = new_mode;
                Ok(())
            }
            Some(Node::Symlink { .. }) => Ok(()),
            None => Err(not_found(path)),
        }
    }

    fn set_mode_recursive(&self, path: &Path, new_mode: u32) -> Result<()> {
        let mut nodes = self.lock();
        if !nodes.contains_key(path) {
            return Err(not_found(path));
        }
        for (_, node) in nodes.iter_mut().filter(|(p, _)| p.starts_with(path)) {
            match node {
                Node::Dir { mode } | Node::File { mode, .. } => *mode = new_mode,
                Node::Symlink { .. } => {}
            }
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut nodes = self.lock();
        if !nodes.contains_key(from) {
            return Err(not_found(from));
        }
        let moved: Vec<PathBuf> = nodes
            .keys()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        nodes.retain(|p, _| !p.starts_with(to));
        for old in moved {
            if let (Some(node), Ok(rel)) = (nodes.remove(&old), old.strip_prefix(from)) {
                let new = if rel.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(rel)
                };
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let mut nodes = self.lock();
        nodes.retain(|p, _| !p.starts_with(link));
        Self::mkparents(&mut nodes, link);
        nodes.insert(
            link.to_path_buf(),
            Node::Symlink {
                target: target.to_path_buf(),
            },
        );
        Ok(())
    }
}

/// Scripted download: either writes fixed bytes or fails
#[derive(Debug, Clone)]
pub struct FakeFetcher {
    fs: MemoryFs,
    payload: Option<Vec<u8>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeFetcher {
    pub fn serving(fs: &MemoryFs, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fs: fs.clone(),
            payload: Some(payload.into()),
            calls: Arc::default(),
        }
    }

    pub fn failing(fs: &MemoryFs) -> Self {
        Self {
            fs: fs.clone(),
            payload: None,
            calls: Arc::default(),
        }
    }

    /// URLs requested so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ArchiveFetcher for FakeFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        match &self.payload {
            Some(data) => {
                self.fs.write_file(dest, data.clone());
                Ok(())
            }
            None => Err(DeployError::Download {
                url: url.to_string(),
                reason: "curl: (6) Could not resolve host".to_string(),
            }),
        }
    }
}

type ArchiveContents = Vec<(PathBuf, Vec<u8>)>;

/// Scripted extraction: maps an archive path to the files it contains
#[derive(Debug, Clone)]
pub struct FakeExtractor {
    fs: MemoryFs,
    archives: Arc<Mutex<HashMap<PathBuf, ArchiveContents>>>,
    failing: Arc<Mutex<HashSet<PathBuf>>>,
    calls: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
}

impl FakeExtractor {
    pub fn new(fs: &MemoryFs) -> Self {
        Self {
            fs: fs.clone(),
            archives: Arc::default(),
            failing: Arc::default(),
            calls: Arc::default(),
        }
    }

    pub fn with_archive(self, archive: impl AsRef<Path>, contents: ArchiveContents) -> Self {
        self.archives
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(archive.as_ref().to_path_buf(), contents);
        self
    }

    /// Make extraction of `archive` fail as a corrupt ZIP would
    pub fn fail_on(self, archive: impl AsRef<Path>) -> Self {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(archive.as_ref().to_path_buf());
        self
    }

    /// (archive, destination) pairs extracted so far
    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ArchiveExtractor for FakeExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((archive.to_path_buf(), dest.to_path_buf()));

        let corrupt = || DeployError::CommandFailed {
            tool: "unzip".to_string(),
            status: "exit status: 9".to_string(),
            stderr: format!(
                "End-of-central-directory signature not found in {}",
                archive.display()
            ),
        };

        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(archive)
            || !self.fs.exists(archive)
        {
            return Err(corrupt());
        }

        let contents = self
            .archives
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(archive)
            .cloned()
            .ok_or_else(corrupt)?;

        self.fs.mkdir(dest);
        for (rel, data) in contents {
            self.fs.write_file(dest.join(rel), data);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    DaemonReload,
    Enable(String),
    Disable(String),
    Stop(String),
    Restart(String),
    Reboot,
}

/// Records every service manager request
#[derive(Debug, Clone, Default)]
pub struct RecordingServices {
    calls: Arc<Mutex<Vec<ServiceCall>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `unit` fail
    pub fn fail_on(self, unit: &str) -> Self {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(unit.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: ServiceCall, unit: Option<&str>) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);

        if let Some(unit) = unit {
            if self
                .failing
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains(unit)
            {
                return Err(DeployError::CommandFailed {
                    tool: "systemctl".to_string(),
                    status: "exit status: 5".to_string(),
                    stderr: format!("Unit {} not found.", unit),
                });
            }
        }
        Ok(())
    }
}

impl ServiceManager for RecordingServices {
    fn daemon_reload(&self) -> Result<()> {
        self.record(ServiceCall::DaemonReload, None)
    }

    fn enable(&self, unit: &str) -> Result<()> {
        self.record(ServiceCall::Enable(unit.to_string()), Some(unit))
    }

    fn disable(&self, unit: &str) -> Result<()> {
        self.record(ServiceCall::Disable(unit.to_string()), Some(unit))
    }

    fn stop(&self, unit: &str) -> Result<()> {
        self.record(ServiceCall::Stop(unit.to_string()), Some(unit))
    }

    fn restart(&self, unit: &str) -> Result<()> {
        self.record(ServiceCall::Restart(unit.to_string()), Some(unit))
    }

    fn reboot(&self) -> Result<()> {
        self.record(ServiceCall::Reboot, None)
    }
}

/// Builder for the file set of a release archive, rooted at the archive's
/// top-level directory
#[derive(Debug, Clone)]
pub struct ReleaseArchive {
    root: String,
    files: ArchiveContents,
}

impl ReleaseArchive {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            files: Vec::new(),
        }
    }

    /// Archive carrying every directory and file the deployer expects
    pub fn complete(config: &DeployConfig, versions: &[&str]) -> Self {
        let mut archive = Self::new(&config.source.archive_root)
            .file(&config.source.runtime_archive, b"PK runtime".to_vec())
            .file("scripts/wifi_setup.sh", b"#!/bin/sh\n".to_vec())
            .file("scripts/factory_reset.sh", b"#!/bin/sh\n".to_vec())
            .file("img/logo.bmp", b"BM splash".to_vec());
        for mapping in &config.units.mappings {
            archive = archive.file(
                Path::new("services").join(&mapping.source),
                format!("[Unit]\nDescription={}\n", mapping.source).into_bytes(),
            );
        }
        for version in versions {
            archive = archive.version(version);
        }
        archive
    }

    pub fn file(mut self, rel: impl AsRef<Path>, data: Vec<u8>) -> Self {
        self.files
            .push((Path::new(&self.root).join(rel.as_ref()), data));
        self
    }

    /// Add `app/<version>/` with a main file tagged with the version
    pub fn version(self, version: &str) -> Self {
        let tag = format!("build {}", version).into_bytes();
        self.file(Path::new("app").join(version).join("CombiOven.gapp"), tag)
            .file(
                Path::new("app").join(version).join("scripts/ui.lua"),
                b"-- ui".to_vec(),
            )
    }

    /// Drop every entry under `rel`
    pub fn without(mut self, rel: impl AsRef<Path>) -> Self {
        let prefix = Path::new(&self.root).join(rel.as_ref());
        self.files.retain(|(p, _)| !p.starts_with(&prefix));
        self
    }

    pub fn into_contents(self) -> ArchiveContents {
        self.files
    }
}

/// A MemoryFs-backed device with scripted collaborators, using the default
/// device layout
pub struct TestRig {
    pub config: DeployConfig,
    pub fs: MemoryFs,
    pub fetcher: FakeFetcher,
    pub extractor: FakeExtractor,
    pub services: RecordingServices,
}

impl TestRig {
    pub fn new(archive: ReleaseArchive) -> Self {
        let config = DeployConfig::default();
        let fs = MemoryFs::new();

        // Pieces of the stock image the deployer expects to find
        fs.mkdir(config.paths.boot_logo.parent().unwrap_or(Path::new("/")));
        fs.write_file(&config.display.unit, b"[Unit]\nDescription=Weston\n".to_vec());
        fs.write_file(&config.network.connman_resolv_conf, b"nameserver 8.8.8.8\n".to_vec());

        let fetcher = FakeFetcher::serving(&fs, b"PK\x03\x04".to_vec());
        let extractor = FakeExtractor::new(&fs)
            .with_archive(&config.paths.staging_file, archive.into_contents())
            .with_archive(
                config.runtime_archive(),
                vec![
                    (PathBuf::from("bin/sbengine"), b"ELF".to_vec()),
                    (PathBuf::from("lib/libgreio.so"), b"ELF".to_vec()),
                ],
            );

        Self {
            config,
            fs,
            fetcher,
            extractor,
            services: RecordingServices::new(),
        }
    }

    pub fn with_versions(versions: &[&str]) -> Self {
        Self::new(ReleaseArchive::complete(&DeployConfig::default(), versions))
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            fetcher: Box::new(self.fetcher.clone()),
            extractor: Box::new(self.extractor.clone()),
            fs: Box::new(self.fs.clone()),
            services: Box::new(self.services.clone()),
        }
    }
}
