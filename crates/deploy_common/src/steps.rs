//! Deploy steps
//!
//! The fixed, ordered unit-of-work list of a deploy run. Each step checks its
//! precondition and then applies its effect; the runner stops at the first
//! failure. Nothing already applied is undone.
//!
//! Sequence:
//! 1. fetch-archive
//! 2. extract-archive
//! 3. validate-layout
//! 4. resolve-version
//! 5. create-directories
//! 6. stage-runtime
//! 7. apply-permissions
//! 8. install-scripts
//! 9. install-units
//! 10. reconfigure-network
//! 11. enable-services
//! 12. rename-display-server
//! 13. copy-application
//! 14. replace-boot-logo
//! 15. cleanup
//! 16. reboot

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::DeployConfig;
use crate::deployer::Operation;
use crate::error::{DeployError, Result};
use crate::ops_log::DeployLog;
use crate::system::Collaborators;
use crate::version::{self, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    FetchArchive,
    ExtractArchive,
    ValidateLayout,
    ResolveVersion,
    CreateDirectories,
    StageRuntime,
    ApplyPermissions,
    InstallScripts,
    InstallUnits,
    ReconfigureNetwork,
    EnableServices,
    RenameDisplayServer,
    CopyApplication,
    ReplaceBootLogo,
    Cleanup,
    Reboot,
}

/// State shared by the steps of one run
pub struct StepContext<'a> {
    pub config: &'a DeployConfig,
    pub operation: &'a Operation,
    pub system: &'a Collaborators,
    pub log: &'a mut DeployLog,
    /// Set by `resolve-version`
    pub version: Option<String>,
}

impl StepContext<'_> {
    fn require(&self, what: &str, path: &Path) -> Result<()> {
        if self.system.fs.exists(path) {
            Ok(())
        } else {
            Err(DeployError::missing(what, path))
        }
    }

    fn require_dir(&self, what: &str, path: &Path) -> Result<()> {
        if self.system.fs.is_dir(path) {
            Ok(())
        } else {
            Err(DeployError::missing(what, path))
        }
    }

    fn selected_version(&self) -> Result<&str> {
        self.version
            .as_deref()
            .ok_or(DeployError::VersionUnresolved {
                step: "copy-application",
            })
    }
}

impl Step {
    pub const SEQUENCE: [Step; 16] = [
        Step::FetchArchive,
        Step::ExtractArchive,
        Step::ValidateLayout,
        Step::ResolveVersion,
        Step::CreateDirectories,
        Step::StageRuntime,
        Step::ApplyPermissions,
        Step::InstallScripts,
        Step::InstallUnits,
        Step::ReconfigureNetwork,
        Step::EnableServices,
        Step::RenameDisplayServer,
        Step::CopyApplication,
        Step::ReplaceBootLogo,
        Step::Cleanup,
        Step::Reboot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::FetchArchive => "fetch-archive",
            Step::ExtractArchive => "extract-archive",
            Step::ValidateLayout => "validate-layout",
            Step::ResolveVersion => "resolve-version",
            Step::CreateDirectories => "create-directories",
            Step::StageRuntime => "stage-runtime",
            Step::ApplyPermissions => "apply-permissions",
            Step::InstallScripts => "install-scripts",
            Step::InstallUnits => "install-units",
            Step::ReconfigureNetwork => "reconfigure-network",
            Step::EnableServices => "enable-services",
            Step::RenameDisplayServer => "rename-display-server",
            Step::CopyApplication => "copy-application",
            Step::ReplaceBootLogo => "replace-boot-logo",
            Step::Cleanup => "cleanup",
            Step::Reboot => "reboot",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Step::FetchArchive => "Download the release archive to the staging file",
            Step::ExtractArchive => "Extract the archive into a fresh staging directory",
            Step::ValidateLayout => "Check the archive has app/, scripts/ and services/",
            Step::ResolveVersion => "Pick the latest app version, or the rollback target",
            Step::CreateDirectories => "Create runtime, apps, application and scripts directories",
            Step::StageRuntime => "Unpack the bundled runtime into the runtime directory",
            Step::ApplyPermissions => "Apply permission bits to the runtime and apps trees",
            Step::InstallScripts => "Copy auxiliary scripts and make them executable",
            Step::InstallUnits => "Install systemd unit and network files, reload systemd",
            Step::ReconfigureNetwork => "Disable the connection manager and re-point the resolver",
            Step::EnableServices => "Enable and restart the service list",
            Step::RenameDisplayServer => "Rename the display server unit if still present",
            Step::CopyApplication => "Copy the selected version into the application directory",
            Step::ReplaceBootLogo => "Replace the boot splash image",
            Step::Cleanup => "Remove the staging file and directory",
            Step::Reboot => "Reboot the device",
        }
    }

    pub fn precondition(&self, ctx: &StepContext) -> Result<()> {
        let config = ctx.config;
        match self {
            Step::ExtractArchive => ctx.require("Downloaded archive", &config.paths.staging_file),
            Step::ValidateLayout => {
                ctx.require_dir("App directory", &config.app_source_dir())?;
                ctx.require_dir("Scripts directory", &config.scripts_source_dir())?;
                ctx.require_dir("Services directory", &config.services_source_dir())
            }
            Step::ResolveVersion => match ctx.operation {
                Operation::Update => Ok(()),
                Operation::Rollback(version) => ctx.require_dir(
                    &format!("Version {}", version),
                    &config.version_source_dir(version),
                ),
            },
            Step::StageRuntime => ctx.require("Runtime archive", &config.runtime_archive()),
            Step::ApplyPermissions => {
                ctx.require_dir("Runtime directory", &config.paths.runtime_dir)?;
                ctx.require_dir("Apps directory", &config.paths.apps_dir)
            }
            Step::InstallUnits => {
                let services = config.services_source_dir();
                for mapping in &config.units.mappings {
                    ctx.require(
                        &format!("Unit file {}", mapping.source),
                        &services.join(&mapping.source),
                    )?;
                }
                Ok(())
            }
            Step::CopyApplication => {
                let version = ctx.selected_version()?;
                ctx.require_dir(
                    &format!("Version {}", version),
                    &config.version_source_dir(version),
                )
            }
            Step::ReplaceBootLogo => {
                ctx.require("Boot logo", &config.boot_logo_source())?;
                match config.paths.boot_logo.parent() {
                    Some(mount) => ctx.require_dir("Boot partition", mount),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    pub fn apply(&self, ctx: &mut StepContext) -> Result<()> {
        let config = ctx.config;
        let system = ctx.system;
        let fs = &system.fs;
        let services = &system.services;

        match self {
            Step::FetchArchive => {
                ctx.log
                    .log(format!("Downloading {}", config.source.archive_url));
                fs.remove_all(&config.paths.staging_file)?;
                system
                    .fetcher
                    .fetch(&config.source.archive_url, &config.paths.staging_file)?;
                ctx.log.log("Download complete");
            }
            Step::ExtractArchive => {
                let staging = &config.paths.staging_dir;
                fs.remove_all(staging)?;
                fs.create_dir_all(staging)?;
                system
                    .extractor
                    .extract(&config.paths.staging_file, staging)?;
                ctx.log
                    .log(format!("Archive extracted to {}", staging.display()));
            }
            Step::ValidateLayout => {
                ctx.log.log("Archive layout verified");
            }
            Step::ResolveVersion => {
                let version = match ctx.operation {
                    Operation::Update => {
                        let app_dir = config.app_source_dir();
                        let names = fs.list_dir(&app_dir)?;
                        let dirs = names
                            .into_iter()
                            .filter(|name| fs.is_dir(&app_dir.join(name)));
                        let latest = version::select_latest(dirs)
                            .ok_or_else(|| DeployError::NoVersions {
                                dir: app_dir.clone(),
                            })?;
                        ctx.log.log(format!("Latest version found: {}", latest));
                        latest
                    }
                    Operation::Rollback(version) => {
                        // Used as a path segment exactly as given
                        if !Version::is_valid(version) {
                            ctx.log.log(format!(
                                "Warning: rollback target '{}' is not a MAJOR.MINOR.PATCH version",
                                version
                            ));
                        }
                        ctx.log.log(format!("Rolling back to version {}", version));
                        version.clone()
                    }
                };
                ctx.version = Some(version);
            }
            Step::CreateDirectories => {
                for dir in [
                    &config.paths.runtime_dir,
                    &config.paths.apps_dir,
                    &config.paths.app_dest,
                    &config.paths.scripts_dest,
                ] {
                    fs.create_dir_all(dir)?;
                }
                ctx.log.log("Destination directories ready");
            }
            Step::StageRuntime => {
                system
                    .extractor
                    .extract(&config.runtime_archive(), &config.paths.runtime_dir)?;
                ctx.log.log(format!(
                    "Runtime extracted to {}",
                    config.paths.runtime_dir.display()
                ));
            }
            Step::ApplyPermissions => {
                let mode = config.units.tree_mode;
                fs.set_mode_recursive(&config.paths.runtime_dir, mode)?;
                fs.set_mode_recursive(&config.paths.apps_dir, mode)?;
                ctx.log.log(format!("Permissions set to {:o}", mode));
            }
            Step::InstallScripts => {
                let src_dir = config.scripts_source_dir();
                let dest_dir = &config.paths.scripts_dest;
                fs.create_dir_all(dest_dir)?;

                let names = fs.list_dir(&src_dir)?;
                for name in &names {
                    let src = src_dir.join(name);
                    let dest = dest_dir.join(name);
                    if fs.is_dir(&src) {
                        fs.copy_tree(&src, &dest)?;
                        fs.set_mode_recursive(&dest, config.units.script_mode)?;
                    } else {
                        fs.copy_file(&src, &dest)?;
                        fs.set_mode(&dest, config.units.script_mode)?;
                    }
                }
                ctx.log.log(format!(
                    "Installed {} scripts to {}",
                    names.len(),
                    dest_dir.display()
                ));
            }
            Step::InstallUnits => {
                let src_dir = config.services_source_dir();
                for mapping in &config.units.mappings {
                    let dest = mapping.dest_dir.join(&mapping.source);
                    fs.create_dir_all(&mapping.dest_dir)?;
                    fs.copy_file(&src_dir.join(&mapping.source), &dest)?;
                    fs.set_mode(&dest, config.units.unit_mode)?;
                    ctx.log.log(format!("Installed {}", dest.display()));
                }
                services.daemon_reload()?;
            }
            Step::ReconfigureNetwork => {
                let network = &config.network;
                for unit in &network.disable_units {
                    services.stop(unit)?;
                    services.disable(unit)?;
                    ctx.log.log(format!("Disabled {}", unit));
                }
                fs.remove_all(&network.connman_resolv_conf)?;
                fs.symlink(&network.resolv_conf_target, &network.resolv_conf)?;
                ctx.log.log(format!(
                    "{} now points to {}",
                    network.resolv_conf.display(),
                    network.resolv_conf_target.display()
                ));
            }
            Step::EnableServices => {
                for unit in &config.services.enable {
                    services.enable(unit)?;
                    services.restart(unit)?;
                    ctx.log.log(format!("Enabled and started {}", unit));
                }
            }
            Step::RenameDisplayServer => {
                let display = &config.display;
                if fs.exists(&display.unit) {
                    fs.rename(&display.unit, &display.renamed_unit)?;
                    ctx.log.log(format!(
                        "Renamed {} to {}",
                        display.unit.display(),
                        display.renamed_unit.display()
                    ));
                } else {
                    ctx.log.log(format!(
                        "{} already renamed, skipping",
                        display.unit.display()
                    ));
                }
            }
            Step::CopyApplication => {
                let version = ctx.selected_version()?.to_string();
                let src = config.version_source_dir(&version);
                fs.copy_tree(&src, &config.paths.app_dest)?;
                ctx.log.log(format!(
                    "Version {} copied to {}",
                    version,
                    config.paths.app_dest.display()
                ));
            }
            Step::ReplaceBootLogo => {
                fs.copy_file(&config.boot_logo_source(), &config.paths.boot_logo)?;
                ctx.log.log("Boot logo replaced");
            }
            Step::Cleanup => {
                fs.remove_all(&config.paths.staging_dir)?;
                fs.remove_all(&config.paths.staging_file)?;
                ctx.log.log("Temporary files removed");
            }
            Step::Reboot => {
                ctx.log.log("Rebooting");
                services.reboot()?;
            }
        }
        Ok(())
    }
}
