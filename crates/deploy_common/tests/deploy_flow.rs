//! End-to-end deploy runs against in-memory collaborators
//!
//! Uses the stock device layout; nothing here touches the host filesystem
//! or systemd.

use std::path::{Path, PathBuf};

use deploy_common::system::FileSystemOps;
use deploy_common::testing::{
    FakeFetcher, MemoryFs, ReleaseArchive, ServiceCall, TestRig,
};
use deploy_common::{DeployConfig, DeployError, DeployLog, Deployer, Operation, RunReport, Step};

fn run(rig: &TestRig, operation: Operation) -> (RunReport, Vec<String>) {
    let mut deployer = Deployer::new(rig.config.clone(), rig.collaborators(), DeployLog::memory());
    let report = deployer.run(&operation).expect("operation is valid");
    (report, deployer.log().lines().to_vec())
}

fn app_file(rig: &TestRig) -> Option<String> {
    rig.fs
        .read_to_string(rig.config.paths.app_dest.join("CombiOven.gapp"))
}

// ============================================================================
// Version selection
// ============================================================================

#[test]
fn test_update_selects_numeric_latest() {
    let rig = TestRig::with_versions(&["1.0.0", "1.5.2", "2.0.0", "10.0.1"]);

    let (report, log) = run(&rig, Operation::Update);

    assert!(report.succeeded(), "{:?}", report.failure);
    assert_eq!(report.version.as_deref(), Some("10.0.1"));
    assert_eq!(app_file(&rig).as_deref(), Some("build 10.0.1"));
    assert!(log.iter().any(|l| l.ends_with(" - Latest version found: 10.0.1")));
}

#[test]
fn test_update_ignores_non_version_entries() {
    let config = DeployConfig::default();
    let archive = ReleaseArchive::complete(&config, &["3.2.1"])
        .file("app/shared/fonts.ttf", b"ttf".to_vec())
        .file("app/9.9.9.txt", b"notes".to_vec());
    let rig = TestRig::new(archive);

    let (report, _) = run(&rig, Operation::Update);

    assert_eq!(report.version.as_deref(), Some("3.2.1"));
}

#[test]
fn test_update_without_versions_fails() {
    let config = DeployConfig::default();
    let archive = ReleaseArchive::complete(&config, &[]).file("app/README.md", b"-".to_vec());
    let rig = TestRig::new(archive);

    let (report, _) = run(&rig, Operation::Update);

    let failure = report.failure.as_ref().expect("update must fail");
    assert_eq!(failure.step, Step::ResolveVersion);
    assert!(matches!(failure.error, DeployError::NoVersions { .. }));
    assert!(!rig.fs.exists(&rig.config.paths.runtime_dir));
}

// ============================================================================
// Fail-fast behaviour
// ============================================================================

#[test]
fn test_fetch_failure_stops_before_extraction() {
    let mut rig = TestRig::with_versions(&["1.0.0"]);
    rig.fetcher = FakeFetcher::failing(&rig.fs);

    let (report, log) = run(&rig, Operation::Update);

    let failure = report.failure.as_ref().expect("fetch must fail");
    assert_eq!(failure.step, Step::FetchArchive);
    assert!(matches!(failure.error, DeployError::Download { .. }));
    assert_eq!(report.exit_code(), 1);
    assert!(rig.extractor.calls().is_empty());
    assert!(rig.services.calls().is_empty());
    assert!(!rig.fs.exists(&rig.config.paths.app_dest));
    assert!(log.iter().any(|l| l.contains("Error in fetch-archive")));
}

#[test]
fn test_extraction_failure_aborts() {
    let mut rig = TestRig::with_versions(&["1.0.0"]);
    rig.extractor = rig.extractor.clone().fail_on(&rig.config.paths.staging_file);

    let (report, _) = run(&rig, Operation::Update);

    let failure = report.failure.as_ref().expect("extraction must fail");
    assert_eq!(failure.step, Step::ExtractArchive);
    assert!(matches!(failure.error, DeployError::CommandFailed { .. }));
    assert_eq!(report.completed, vec![Step::FetchArchive]);
}

#[test]
fn test_missing_app_dir_fails_before_system_dirs() {
    let config = DeployConfig::default();
    let rig = TestRig::new(ReleaseArchive::complete(&config, &["1.0.0"]).without("app"));
    let before: Vec<PathBuf> = [
        &rig.config.paths.runtime_dir,
        &rig.config.paths.apps_dir,
        &rig.config.paths.app_dest,
        &rig.config.paths.scripts_dest,
    ]
    .iter()
    .map(|p| p.to_path_buf())
    .collect();

    let (report, _) = run(&rig, Operation::Update);

    let failure = report.failure.as_ref().expect("layout check must fail");
    assert_eq!(failure.step, Step::ValidateLayout);
    match failure.error {
        DeployError::MissingPath { ref what, .. } => assert_eq!(what, "App directory"),
        ref other => panic!("unexpected error: {other}"),
    }
    for dir in before {
        assert!(!rig.fs.exists(&dir), "{} must not be created", dir.display());
    }
}

#[test]
fn test_missing_services_dir_fails_layout_check() {
    let config = DeployConfig::default();
    let rig = TestRig::new(ReleaseArchive::complete(&config, &["1.0.0"]).without("services"));

    let (report, _) = run(&rig, Operation::Update);

    assert_eq!(report.failure.map(|f| f.step), Some(Step::ValidateLayout));
}

#[test]
fn test_missing_runtime_zip_fails() {
    let config = DeployConfig::default();
    let archive = ReleaseArchive::complete(&config, &["1.0.0"]).without("linux");
    let rig = TestRig::new(archive);

    let (report, _) = run(&rig, Operation::Update);

    let failure = report.failure.as_ref().expect("runtime check must fail");
    assert_eq!(failure.step, Step::StageRuntime);
    assert!(report.has_completed(Step::CreateDirectories));
}

#[test]
fn test_missing_logo_leaves_service_changes_applied() {
    let config = DeployConfig::default();
    let archive = ReleaseArchive::complete(&config, &["1.0.0"]).without("img");
    let rig = TestRig::new(archive);

    let (report, _) = run(&rig, Operation::Update);

    let failure = report.failure.as_ref().expect("logo check must fail");
    assert_eq!(failure.step, Step::ReplaceBootLogo);
    assert!(report.has_completed(Step::EnableServices));
    assert!(report.has_completed(Step::CopyApplication));
    // No compensation: services stay enabled, staging stays behind, no reboot
    assert!(rig
        .services
        .calls()
        .contains(&ServiceCall::Enable("combi_backend.service".to_string())));
    assert!(!rig.services.calls().contains(&ServiceCall::Reboot));
    assert!(rig.fs.exists(&rig.config.paths.staging_dir));
}

// ============================================================================
// Rollback
// ============================================================================

#[test]
fn test_rollback_copy_is_additive() {
    let rig = TestRig::with_versions(&["1.5.2", "2.0.0"]);
    let dest = rig.config.paths.app_dest.clone();
    rig.fs.write_file(dest.join("CombiOven.gapp"), b"build 2.0.0".to_vec());
    rig.fs.write_file(dest.join("assets/new_ui.png"), b"png".to_vec());

    let (report, _) = run(&rig, Operation::Rollback("1.5.2".to_string()));

    assert!(report.succeeded(), "{:?}", report.failure);
    assert_eq!(report.version.as_deref(), Some("1.5.2"));
    assert_eq!(app_file(&rig).as_deref(), Some("build 1.5.2"));
    assert_eq!(
        rig.fs.files_under(&dest),
        vec![
            PathBuf::from("CombiOven.gapp"),
            PathBuf::from("assets/new_ui.png"),
            PathBuf::from("scripts/ui.lua"),
        ]
    );
}

#[test]
fn test_rollback_to_missing_version_fails() {
    let rig = TestRig::with_versions(&["2.0.0"]);

    let (report, _) = run(&rig, Operation::Rollback("1.9.0".to_string()));

    let failure = report.failure.as_ref().expect("rollback must fail");
    assert_eq!(failure.step, Step::ResolveVersion);
    assert!(failure.error.to_string().contains("Version 1.9.0 not found"));
}

#[test]
fn test_rollback_with_empty_version_is_rejected() {
    let rig = TestRig::with_versions(&["1.0.0", "2.0.0"]);
    let mut deployer = Deployer::new(rig.config.clone(), rig.collaborators(), DeployLog::memory());

    let err = deployer
        .run(&Operation::Rollback(String::new()))
        .expect_err("empty version must be rejected");

    assert!(matches!(err, DeployError::Usage(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(rig.fetcher.calls().is_empty());
    assert!(rig.extractor.calls().is_empty());
    assert!(rig.services.calls().is_empty());
    assert!(!rig.fs.exists(&rig.config.paths.app_dest));
}

#[test]
fn test_rollback_absolute_version_resolves_under_app() {
    let rig = TestRig::with_versions(&["1.0.0"]);
    rig.fs.write_file("/etc/shadow", b"root:*:0:0".to_vec());

    let (report, _) = run(&rig, Operation::Rollback("/etc".to_string()));

    let failure = report.failure.as_ref().expect("host /etc is not a release");
    assert_eq!(failure.step, Step::ResolveVersion);
    assert!(!rig.fs.exists(&rig.config.paths.app_dest.join("shadow")));
    assert!(rig
        .services
        .calls()
        .iter()
        .all(|c| *c != ServiceCall::Reboot));
}

#[test]
fn test_rollback_absolute_version_copies_release_dir() {
    let config = DeployConfig::default();
    let archive = ReleaseArchive::complete(&config, &["1.0.0"]).version("etc");
    let rig = TestRig::new(archive);
    rig.fs.write_file("/etc/shadow", b"root:*:0:0".to_vec());

    let (report, log) = run(&rig, Operation::Rollback("/etc".to_string()));

    assert!(report.succeeded(), "{:?}", report.failure);
    assert_eq!(app_file(&rig).as_deref(), Some("build etc"));
    assert!(!rig.fs.exists(&rig.config.paths.app_dest.join("shadow")));
    assert!(log.iter().any(|l| l.contains("Warning: rollback target '/etc'")));
}

#[test]
fn test_rollback_with_non_version_name_is_flagged_but_used() {
    let config = DeployConfig::default();
    let archive = ReleaseArchive::complete(&config, &["2.0.0"]).version("hotfix");
    let rig = TestRig::new(archive);

    let (report, log) = run(&rig, Operation::Rollback("hotfix".to_string()));

    assert!(report.succeeded(), "{:?}", report.failure);
    assert_eq!(app_file(&rig).as_deref(), Some("build hotfix"));
    assert!(log
        .iter()
        .any(|l| l.contains("Warning: rollback target 'hotfix'")));
}

// ============================================================================
// System effects
// ============================================================================

#[test]
fn test_units_scripts_and_modes_installed() {
    let rig = TestRig::with_versions(&["1.0.0"]);

    let (report, _) = run(&rig, Operation::Update);
    assert!(report.succeeded(), "{:?}", report.failure);

    let unit = Path::new("/etc/systemd/system/combi_backend.service");
    assert!(rig.fs.exists(unit));
    assert_eq!(rig.fs.mode(unit), Some(0o644));
    assert!(rig.fs.exists(Path::new("/etc/systemd/network/wired.network")));
    assert!(rig
        .fs
        .exists(Path::new("/lib/systemd/system/wpa_supplicant@wlan0.service")));

    let script = rig.config.paths.scripts_dest.join("wifi_setup.sh");
    assert_eq!(rig.fs.mode(&script), Some(0o755));
    assert_eq!(
        rig.fs.mode(rig.config.paths.runtime_dir.join("bin/sbengine")),
        Some(0o755)
    );
    assert_eq!(
        rig.fs.read_to_string(&rig.config.paths.boot_logo).as_deref(),
        Some("BM splash")
    );
}

#[test]
fn test_network_reconfiguration() {
    let rig = TestRig::with_versions(&["1.0.0"]);

    let (report, _) = run(&rig, Operation::Update);
    assert!(report.succeeded(), "{:?}", report.failure);

    let calls = rig.services.calls();
    for unit in ["connman.service", "connman-wait-online.service"] {
        assert!(calls.contains(&ServiceCall::Stop(unit.to_string())));
        assert!(calls.contains(&ServiceCall::Disable(unit.to_string())));
    }
    assert!(!rig.fs.exists(&rig.config.network.connman_resolv_conf));
    assert_eq!(
        rig.fs.link_target(&rig.config.network.resolv_conf),
        Some(rig.config.network.resolv_conf_target.clone())
    );
}

#[test]
fn test_services_enabled_and_restarted_in_order() {
    let rig = TestRig::with_versions(&["1.0.0"]);

    run(&rig, Operation::Update);

    let restarted: Vec<String> = rig
        .services
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ServiceCall::Restart(unit) => Some(unit),
            _ => None,
        })
        .collect();
    assert_eq!(restarted, rig.config.services.enable);

    let calls = rig.services.calls();
    let reload = calls.iter().position(|c| *c == ServiceCall::DaemonReload);
    let first_enable = calls
        .iter()
        .position(|c| matches!(c, ServiceCall::Enable(_)));
    assert!(reload < first_enable);
}

#[test]
fn test_staging_is_removed_on_success() {
    let rig = TestRig::with_versions(&["1.0.0"]);

    let (report, _) = run(&rig, Operation::Update);

    assert!(report.succeeded());
    assert!(!rig.fs.exists(&rig.config.paths.staging_dir));
    assert!(!rig.fs.exists(&rig.config.paths.staging_file));
}

#[test]
fn test_stale_staging_directory_is_replaced() {
    let rig = TestRig::with_versions(&["1.0.0"]);
    let leftover = rig.config.repo_root().join("app/0.0.1/old.gapp");
    rig.fs.write_file(&leftover, b"old".to_vec());

    let mut deployer = Deployer::new(rig.config.clone(), rig.collaborators(), DeployLog::memory());
    let report = deployer.run(&Operation::Update).unwrap();

    assert_eq!(report.version.as_deref(), Some("1.0.0"));
    assert!(!rig.fs.exists(&leftover));
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn test_second_run_skips_display_rename() {
    let rig = TestRig::with_versions(&["1.0.0"]);
    let display = rig.config.display.clone();

    let (first, _) = run(&rig, Operation::Update);
    assert!(first.succeeded(), "{:?}", first.failure);
    assert!(!rig.fs.exists(&display.unit));
    assert!(rig.fs.exists(&display.renamed_unit));

    let (second, log) = run(&rig, Operation::Update);
    assert!(second.succeeded(), "{:?}", second.failure);
    assert!(rig.fs.exists(&display.renamed_unit));
    assert!(log.iter().any(|l| l.contains("already renamed, skipping")));

    let reboots = rig
        .services
        .calls()
        .iter()
        .filter(|c| **c == ServiceCall::Reboot)
        .count();
    assert_eq!(reboots, 2);
}

#[test]
fn test_memory_fs_is_shared_across_collaborators() {
    let fs = MemoryFs::new();
    let fetcher = FakeFetcher::serving(&fs, b"zip".to_vec());
    deploy_common::system::ArchiveFetcher::fetch(
        &fetcher,
        "https://example.invalid/a.zip",
        Path::new("/tmp/a.zip"),
    )
    .unwrap();

    assert_eq!(fs.read_file("/tmp/a.zip"), Some(b"zip".to_vec()));
    assert_eq!(fetcher.calls(), vec!["https://example.invalid/a.zip"]);
}
