//! Deploy configuration
//!
//! Defaults reproduce the fixed layout of the Forlinx combi oven controller.
//! A TOML file may override any subset of fields, which is how tests and
//! bench rigs point the deployer at local paths.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DeployError, Result};

/// Root of the Storyboard installation on the device
pub const CRANK_DIR: &str = "/usr/crank";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DeployConfig {
    pub paths: PathSettings,
    pub source: SourceSettings,
    pub units: UnitSettings,
    pub network: NetworkSettings,
    pub services: ServiceSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Deploy log, truncated at the start of every run
    pub log_file: PathBuf,
    /// Extraction target for the downloaded archive
    pub staging_dir: PathBuf,
    /// Download target for the archive
    pub staging_file: PathBuf,
    pub runtime_dir: PathBuf,
    pub apps_dir: PathBuf,
    /// Live application directory served by the appliance
    pub app_dest: PathBuf,
    pub scripts_dest: PathBuf,
    /// Splash image on the boot partition
    pub boot_logo: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("/var/log/combi_deploy.log"),
            staging_dir: PathBuf::from("/tmp/combi_update"),
            staging_file: PathBuf::from("/tmp/combi_update.zip"),
            runtime_dir: Path::new(CRANK_DIR).join("runtimes"),
            apps_dir: Path::new(CRANK_DIR).join("apps"),
            app_dest: Path::new(CRANK_DIR).join("apps/CombiOven"),
            scripts_dest: Path::new(CRANK_DIR).join("scripts"),
            boot_logo: PathBuf::from("/run/media/boot-mmcblk0p1/logo.bmp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub archive_url: String,
    /// Top-level directory inside the branch archive
    pub archive_root: String,
    /// Runtime archive, relative to the archive root
    pub runtime_archive: PathBuf,
    /// Overall download timeout. `None` waits as long as the transfer takes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_secs: Option<u64>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            archive_url:
                "https://github.com/combi-oven/combi-release/archive/refs/heads/main.zip"
                    .to_string(),
            archive_root: "combi-release-main".to_string(),
            runtime_archive: PathBuf::from(
                "linux/linux-imx8yocto-armle-opengles_2.0-wayland-obj.zip",
            ),
            fetch_timeout_secs: None,
        }
    }
}

/// One unit or network file to install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMapping {
    /// File name under `services/` in the archive
    pub source: String,
    pub dest_dir: PathBuf,
}

impl ServiceMapping {
    pub fn new(source: &str, dest_dir: &str) -> Self {
        Self {
            source: source.to_string(),
            dest_dir: PathBuf::from(dest_dir),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitSettings {
    pub unit_mode: u32,
    pub script_mode: u32,
    pub tree_mode: u32,
    pub mappings: Vec<ServiceMapping>,
}

impl Default for UnitSettings {
    fn default() -> Self {
        Self {
            unit_mode: 0o644,
            script_mode: 0o755,
            tree_mode: 0o755,
            mappings: vec![
                ServiceMapping::new("storyboard_splash.service", "/etc/systemd/system"),
                ServiceMapping::new("storyboard.service", "/etc/systemd/system"),
                ServiceMapping::new("combi_backend.service", "/etc/systemd/system"),
                ServiceMapping::new("wpa_supplicant@wlan0.service", "/lib/systemd/system"),
                ServiceMapping::new("wired.network", "/etc/systemd/network"),
                ServiceMapping::new("wireless.network", "/etc/systemd/network"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Connection manager units to stop and disable
    pub disable_units: Vec<String>,
    /// Resolver config owned by the connection manager
    pub connman_resolv_conf: PathBuf,
    pub resolv_conf: PathBuf,
    /// New target of `resolv_conf`
    pub resolv_conf_target: PathBuf,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            disable_units: vec![
                "connman.service".to_string(),
                "connman-wait-online.service".to_string(),
            ],
            connman_resolv_conf: PathBuf::from("/etc/resolv-conf.connman"),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            resolv_conf_target: PathBuf::from("/run/systemd/resolve/stub-resolv.conf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Enabled and restarted in this order on every run
    pub enable: Vec<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            enable: [
                "systemd-networkd.service",
                "systemd-resolved.service",
                "wpa_supplicant@wlan0.service",
                "storyboard_splash.service",
                "storyboard.service",
                "combi_backend.service",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub unit: PathBuf,
    pub renamed_unit: PathBuf,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            unit: PathBuf::from("/lib/systemd/system/weston.service"),
            renamed_unit: PathBuf::from("/lib/systemd/system/weston.service.disabled"),
        }
    }
}

impl DeployConfig {
    /// Load a TOML override file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| DeployError::io(path, e))?;
        Self::from_toml(&content).map_err(|reason| DeployError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn to_toml(&self) -> std::result::Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }

    /// Top-level directory of the extracted archive
    pub fn repo_root(&self) -> PathBuf {
        self.paths.staging_dir.join(&self.source.archive_root)
    }

    pub fn app_source_dir(&self) -> PathBuf {
        self.repo_root().join("app")
    }

    /// `app/<version>`, built by concatenation so that an absolute or
    /// multi-component version still lands below `app/`
    pub fn version_source_dir(&self, version: &str) -> PathBuf {
        let mut path = self.app_source_dir().into_os_string();
        path.push("/");
        path.push(version);
        PathBuf::from(path)
    }

    pub fn scripts_source_dir(&self) -> PathBuf {
        self.repo_root().join("scripts")
    }

    pub fn services_source_dir(&self) -> PathBuf {
        self.repo_root().join("services")
    }

    pub fn runtime_archive(&self) -> PathBuf {
        self.repo_root().join(&self.source.runtime_archive)
    }

    pub fn boot_logo_source(&self) -> PathBuf {
        self.repo_root().join("img").join("logo.bmp")
    }

    /// Point every writable location below `root`. Used by tests and
    /// staging rigs that must never touch the real system.
    pub fn rooted_at(root: &Path) -> Self {
        let mut config = Self::default();
        let reroot = |p: &Path| root.join(p.strip_prefix("/").unwrap_or(p));

        config.paths = PathSettings {
            log_file: reroot(&config.paths.log_file),
            staging_dir: reroot(&config.paths.staging_dir),
            staging_file: reroot(&config.paths.staging_file),
            runtime_dir: reroot(&config.paths.runtime_dir),
            apps_dir: reroot(&config.paths.apps_dir),
            app_dest: reroot(&config.paths.app_dest),
            scripts_dest: reroot(&config.paths.scripts_dest),
            boot_logo: reroot(&config.paths.boot_logo),
        };
        for mapping in &mut config.units.mappings {
            mapping.dest_dir = reroot(&mapping.dest_dir);
        }
        config.network.connman_resolv_conf = reroot(&config.network.connman_resolv_conf);
        config.network.resolv_conf = reroot(&config.network.resolv_conf);
        config.display.unit = reroot(&config.display.unit);
        config.display.renamed_unit = reroot(&config.display.renamed_unit);
        config
    }
}
