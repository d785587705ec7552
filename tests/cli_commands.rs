//! CLI command tests
//!
//! Commands are driven through their library entry points with a real
//! drive layout in a temp directory. `true` and `false` stand in for the
//! volume encryption tool so that the mount verdict is deterministic.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use smartdrive::cli::{
    check_layout, generate_recovery_kit, reconstruct, recover, status, validate_target,
    CommandReport, GenerateOptions, RecoverOptions,
};
use smartdrive::identity::{BusType, DiskIdentity};
use smartdrive::observability::RecoveryOutcome;
use smartdrive::paths::RuntimePaths;
use smartdrive::recovery::KdfParams;
use smartdrive::safety::{
    DiskEnumerator, DiskRecord, LauncherHint, PartitionInfo, SafetyResult,
};
use tempfile::TempDir;
use zeroize::Zeroizing;

const PASSWORD: &str = "Sup3rSecret!";

struct Drive {
    dir: TempDir,
    paths: RuntimePaths,
    volume: PathBuf,
}

fn drive() -> Drive {
    let dir = TempDir::new().unwrap();
    let paths = RuntimePaths::for_drive(dir.path()).unwrap();
    paths.ensure_layout().unwrap();
    let volume = dir.path().join("payload.hc");
    let header: Vec<u8> = (0..2048u32).map(|i| (i * 31 % 251) as u8).collect();
    fs::write(&volume, header).unwrap();
    Drive { dir, paths, volume }
}

fn generate_options(drive: &Drive) -> GenerateOptions {
    GenerateOptions {
        volume: Some(drive.volume.clone()),
        keyfile: None,
        header_backup: None,
        chunks_out: None,
        force: false,
        tool: "smartdrive-test-no-such-tool".into(),
        kdf: KdfParams::new(64, 1, 1).unwrap(),
    }
}

fn recover_options(drive: &Drive, tool: &str) -> RecoverOptions {
    RecoverOptions {
        volume: Some(drive.volume.clone()),
        mount_target: Some("/mnt/smartdrive-test".into()),
        tool: tool.into(),
    }
}

fn phrase_of(report: &CommandReport) -> Zeroizing<String> {
    Zeroizing::new(report.data["recovery_phrase"].as_str().unwrap().to_string())
}

// =============================================================================
// GENERATE / RECOVER
// =============================================================================

#[test]
fn test_generate_reports_phrase_and_chunks() {
    let drive = drive();
    let report =
        generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &generate_options(&drive))
            .unwrap();

    assert_eq!(report.outcome, RecoveryOutcome::Success);
    assert_eq!(report.data["word_count"], 24);
    assert_eq!(report.data["credential_kind"], "password_only");
    assert!(!report.data["chunks"].as_array().unwrap().is_empty());
    assert!(drive.paths.container_file().exists());
    assert!(drive.paths.environment_file().exists());
}

#[test]
fn test_existing_kit_needs_force() {
    let drive = drive();
    let mut options = generate_options(&drive);
    generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &options).unwrap();

    let err = generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &options)
        .unwrap_err();
    assert_eq!(err.code_str(), "SD_CLI_ALREADY_EXISTS");
    assert_eq!(err.exit_code(), 2);

    options.force = true;
    assert!(generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &options).is_ok());
}

#[test]
fn test_failed_mount_keeps_kit_then_success_burns_it() {
    let drive = drive();
    let generated =
        generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &generate_options(&drive))
            .unwrap();

    let failed = recover(&drive.paths, phrase_of(&generated), &recover_options(&drive, "false")).unwrap();
    assert_eq!(failed.outcome, RecoveryOutcome::TransientFailure);
    assert_eq!(failed.data["mounted"], false);
    assert_eq!(failed.data["container_present"], true);

    let mounted = recover(&drive.paths, phrase_of(&generated), &recover_options(&drive, "true")).unwrap();
    assert_eq!(mounted.outcome, RecoveryOutcome::Success);
    assert_eq!(mounted.data["rekey_required"], true);
    assert_eq!(mounted.data["container_present"], false);

    let reused = recover(&drive.paths, phrase_of(&generated), &recover_options(&drive, "true"))
        .unwrap_err();
    assert_eq!(reused.code_str(), "SD_RECOVERY_ALREADY_USED");
    assert_eq!(reused.exit_code(), 65);
}

#[test]
fn test_missing_mount_tool_is_environment_failure() {
    let drive = drive();
    let generated =
        generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &generate_options(&drive))
            .unwrap();

    let report = recover(
        &drive.paths,
        phrase_of(&generated),
        &recover_options(&drive, "smartdrive-test-no-such-tool"),
    )
    .unwrap();
    assert_eq!(report.outcome, RecoveryOutcome::EnvironmentFailure);
    assert!(drive.paths.container_file().exists());
}

#[test]
fn test_wrong_phrase_exits_permanent() {
    let drive = drive();
    generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &generate_options(&drive))
        .unwrap();

    let err = recover(
        &drive.paths,
        Zeroizing::new("abandon ".repeat(23) + "art"),
        &recover_options(&drive, "true"),
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), 65);
    assert!(drive.paths.container_file().exists());
}

#[test]
fn test_volume_comes_from_config_when_not_given() {
    let drive = drive();
    fs::write(
        drive.paths.config_file(),
        serde_json::to_vec(&json!({"volume_path": drive.volume, "mount_target": "/mnt/x"})).unwrap(),
    )
    .unwrap();
    let mut options = generate_options(&drive);
    options.volume = None;

    let report = generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &options).unwrap();
    assert_eq!(report.outcome, RecoveryOutcome::Success);
}

#[test]
fn test_legacy_config_migrated_by_first_write() {
    let drive = drive();
    fs::write(
        drive.paths.config_file(),
        serde_json::to_vec(&json!({"mode": "password", "schema_version": 2, "owner_note": "keep"}))
            .unwrap(),
    )
    .unwrap();

    generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &generate_options(&drive))
        .unwrap();

    let written: serde_json::Value =
        serde_json::from_slice(&fs::read(drive.paths.config_file()).unwrap()).unwrap();
    assert!(uuid::Uuid::parse_str(written["drive_id"].as_str().unwrap()).is_ok());
    assert_eq!(written["schema_version"], 3);
    assert_eq!(written["mode"], "pw_only");
    assert_eq!(written["owner_note"], "keep");
    assert_eq!(written["recovery"]["state"], "enabled");
}

// =============================================================================
// RECONSTRUCT
// =============================================================================

#[test]
fn test_chunk_sheet_reconstructs_lost_container() {
    let drive = drive();
    let sheet = drive.dir.path().join("paper.txt");
    let mut options = generate_options(&drive);
    options.chunks_out = Some(sheet.clone());
    let generated =
        generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &options).unwrap();

    let original = fs::read(drive.paths.container_file()).unwrap();
    fs::remove_file(drive.paths.container_file()).unwrap();

    let report = reconstruct(&drive.paths, &sheet, None, false).unwrap();
    assert_eq!(report.outcome, RecoveryOutcome::Success);
    assert_eq!(fs::read(drive.paths.container_file()).unwrap(), original);
    assert_eq!(report.data["volume_identity"], generated.data["volume_identity"]);

    let err = reconstruct(&drive.paths, &sheet, None, false).unwrap_err();
    assert_eq!(err.code_str(), "SD_CLI_ALREADY_EXISTS");
}

#[test]
fn test_reconstruct_refuses_output_outside_root() {
    let drive = drive();
    let sheet = drive.dir.path().join("paper.txt");
    let mut options = generate_options(&drive);
    options.chunks_out = Some(sheet.clone());
    generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &options).unwrap();

    let outside = drive.dir.path().join("stray.bin");
    let err = reconstruct(&drive.paths, &sheet, Some(&outside), true).unwrap_err();
    assert_eq!(err.code_str(), "SD_RECOVERY_PATH");
    assert!(!outside.exists());
}

// =============================================================================
// STATUS / LAYOUT / TARGET
// =============================================================================

#[test]
fn test_status_reflects_generation() {
    let drive = drive();
    let before = status(&drive.paths).unwrap();
    assert_eq!(before.data["container_present"], false);

    generate_recovery_kit(&drive.paths, Zeroizing::new(PASSWORD.into()), &generate_options(&drive))
        .unwrap();
    let after = status(&drive.paths).unwrap();
    assert_eq!(after.data["enabled"], true);
    assert_eq!(after.data["state"], "enabled");
    assert_eq!(after.data["container_present"], true);
    assert!(after.data["environment"]["dependency_set_hash"].is_string());
}

struct FakeDisks;

impl DiskEnumerator for FakeDisks {
    fn list_disks(&self) -> SafetyResult<Vec<DiskRecord>> {
        Ok(vec![
            record("SOURCE", 0),
            record("TARGET", 1),
        ])
    }

    fn disk_hosting(&self, _path: &Path) -> SafetyResult<Option<DiskIdentity>> {
        Ok(Some(DiskIdentity::new("SOURCE", BusType::Usb, 0)))
    }

    fn partition_layout(&self, disk_number: u32) -> SafetyResult<Vec<PartitionInfo>> {
        if disk_number != 1 {
            return Ok(Vec::new());
        }
        Ok(vec![part(1, 1 << 30, Some("/media/user/LAUNCHER")), part(2, 60 << 30, None)])
    }
}

fn record(id: &str, number: u32) -> DiskRecord {
    DiskRecord {
        identity: DiskIdentity::new(id, BusType::Usb, number),
        is_system: false,
        is_boot: false,
        is_read_only: false,
        size_bytes: 64 << 30,
        model: None,
        device_path: None,
    }
}

fn part(number: u32, size_bytes: u64, mount: Option<&str>) -> PartitionInfo {
    PartitionInfo {
        number,
        size_bytes,
        mount_point: mount.map(str::to_string),
        drive_letter: None,
        label: None,
        is_hidden: false,
    }
}

#[test]
fn test_validate_target_reports_identity_drift() {
    let drive = drive();
    fs::write(drive.paths.config_file(), br#"{"disk_unique_id": "EXPECTED"}"#).unwrap();
    let script = drive.paths.root().join("scripts").join("setup");

    let report = validate_target(FakeDisks, Some(&drive.paths), &script, 1).unwrap();
    assert_eq!(report.outcome, RecoveryOutcome::Success);
    assert_eq!(report.data["identity_drift"]["status"], "drifted");
    assert_eq!(report.data["identity_drift"]["actual"], "TARGET");

    let blocked = validate_target(FakeDisks, None, &script, 0).unwrap();
    assert_eq!(blocked.outcome, RecoveryOutcome::PermanentFailure);
    assert_eq!(blocked.data["validation"]["reason"], "SAME_AS_SOURCE");
}

#[test]
fn test_check_layout_resolves_partitions() {
    let drive = drive();
    let hint = LauncherHint::MountPoint("/media/user/LAUNCHER".into());

    let report = check_layout(&FakeDisks, &drive.paths, Some((1, Some(hint)))).unwrap();
    assert_eq!(report.outcome, RecoveryOutcome::Success);
    assert_eq!(report.data["layout"]["launcher"]["number"], 1);
    assert_eq!(report.data["layout"]["payload"]["number"], 2);

    let empty = check_layout(&FakeDisks, &drive.paths, Some((7, None))).unwrap();
    assert_eq!(empty.outcome, RecoveryOutcome::PermanentFailure);
}

#[test]
fn test_check_layout_flags_duplicate_config() {
    let drive = drive();
    fs::write(drive.paths.config_file(), "{}").unwrap();
    fs::write(drive.dir.path().join("config.json"), "{}").unwrap();

    let report = check_layout(&FakeDisks, &drive.paths, None).unwrap();
    assert_eq!(report.outcome, RecoveryOutcome::PermanentFailure);
    assert_eq!(report.data["duplicates"]["config.json"].as_array().unwrap().len(), 2);
}
