//! CLI command implementations
//!
//! Each command resolves the application root, runs one operation of the
//! core and reports the outcome. Policy lives in the core; this layer only
//! gathers inputs and shapes the response.
//!
//! Commands take their secrets as arguments so that they can be driven
//! without a terminal. Only `run_command` touches stdin and stdout.

use std::collections::BTreeMap;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use zeroize::Zeroizing;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{read_secret_line, write_outcome};
use crate::config::{ConfigDocument, KnownSettings};
use crate::external::{MountRequest, VeraCryptMounter, VolumeMounter};
use crate::identity::VolumeIdentity;
use crate::observability::{FileAuditLog, MemoryAuditLog, RecoveryOutcome};
use crate::paths::RuntimePaths;
use crate::persistence::write_bytes_atomic;
use crate::recovery::{
    reconstruct_file, Credentials, KdfParams, RecoveryContainer, RecoveryError, RecoveryVault,
};
use crate::safety::{
    check_identity_drift, resolve_drive_layout, BlockReason, DiskEnumerator, IdentityDrift,
    LauncherHint, LsblkEnumerator, SafetyPolicy,
};

/// Outcome of one command plus the `data` of its response
#[derive(Debug, Clone)]
pub struct CommandReport {
    pub outcome: RecoveryOutcome,
    pub data: Value,
}

impl CommandReport {
    fn new(outcome: RecoveryOutcome, data: Value) -> Self {
        Self { outcome, data }
    }

    fn success(data: Value) -> Self {
        Self::new(RecoveryOutcome::Success, data)
    }
}

/// Inputs of `generate-recovery-kit` other than the password
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub volume: Option<PathBuf>,
    pub keyfile: Option<PathBuf>,
    pub header_backup: Option<PathBuf>,
    pub chunks_out: Option<PathBuf>,
    pub force: bool,
    pub tool: String,
    pub kdf: KdfParams,
}

/// Inputs of `recover` other than the phrase
#[derive(Debug, Clone)]
pub struct RecoverOptions {
    pub volume: Option<PathBuf>,
    pub mount_target: Option<String>,
    pub tool: String,
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<RecoveryOutcome> {
    let cli = Cli::parse_args();
    run_command(cli.root.as_deref(), cli.command)
}

/// Run one command, write its JSON response and return its outcome.
pub fn run_command(root: Option<&Path>, cmd: Command) -> CliResult<RecoveryOutcome> {
    let report = match cmd {
        Command::GenerateRecoveryKit {
            volume,
            keyfile,
            header_backup,
            chunks_out,
            force,
            tool,
        } => {
            let paths = resolve_root(root)?;
            let password = read_secret_line("password")?;
            let options = GenerateOptions {
                volume,
                keyfile,
                header_backup,
                chunks_out,
                force,
                tool,
                kdf: KdfParams::default(),
            };
            generate_recovery_kit(&paths, password, &options)?
        }
        Command::Recover {
            volume,
            mount_target,
            tool,
        } => {
            let paths = resolve_root(root)?;
            let phrase = read_secret_line("recovery phrase")?;
            let options = RecoverOptions {
                volume,
                mount_target,
                tool,
            };
            recover(&paths, phrase, &options)?
        }
        Command::Reconstruct {
            chunk_file,
            output,
            force,
        } => {
            let paths = resolve_root(root)?;
            reconstruct(&paths, &chunk_file, output.as_deref(), force)?
        }
        Command::ValidateTarget { disk, script } => {
            let script = match script {
                Some(script) => script,
                None => std::env::current_exe()?,
            };
            if !script.is_absolute() {
                return Err(CliError::usage("--script must be an absolute path"));
            }
            let paths = optional_root(root, &script)?;
            validate_target(LsblkEnumerator::new(), paths.as_ref(), &script, disk)?
        }
        Command::CheckLayout {
            disk,
            launcher_mount,
            launcher_letter,
        } => {
            let paths = resolve_root(root)?;
            let hint = launcher_mount
                .map(LauncherHint::MountPoint)
                .or(launcher_letter.map(LauncherHint::DriveLetter));
            let disk = disk.map(|n| (n, hint));
            check_layout(&LsblkEnumerator::new(), &paths, disk)?
        }
        Command::Status => {
            let paths = resolve_root(root)?;
            status(&paths)?
        }
    };

    write_outcome(report.outcome, report.data)?;
    Ok(report.outcome)
}

// ==================
// Recovery kit
// ==================

/// Create a kit for the payload volume and return the phrase and chunks.
pub fn generate_recovery_kit(
    paths: &RuntimePaths,
    mut password: Zeroizing<String>,
    options: &GenerateOptions,
) -> CliResult<CommandReport> {
    let settings = load_settings(paths)?;
    let volume = configured_volume(options.volume.as_deref(), &settings)?;
    if let Some(ref out) = options.chunks_out {
        if !out.is_absolute() {
            return Err(CliError::usage("--chunks-out must be an absolute path"));
        }
    }
    let container_file = paths.container_file();
    if container_file.exists() && !options.force {
        return Err(CliError::already_exists(format!(
            "recovery kit {}",
            container_file.display()
        )));
    }
    paths.check_no_duplicates()?;

    let mut keyfile = match options.keyfile {
        Some(ref path) => Zeroizing::new(fs::read(path).map_err(|e| {
            RecoveryError::io(format!("failed to read keyfile {}", path.display()), e)
        })?),
        None => Zeroizing::new(Vec::new()),
    };
    let header = match options.header_backup {
        Some(ref path) => Some(fs::read(path).map_err(|e| {
            RecoveryError::io(format!("failed to read header backup {}", path.display()), e)
        })?),
        None => None,
    };
    let volume_identity = VolumeIdentity::from_volume(&volume)?;
    let credentials = Credentials::from_parts(mem::take(&mut *password), mem::take(&mut *keyfile));

    let audit = open_audit(paths)?;
    let tool = VeraCryptMounter::new(options.tool.clone());
    let vault = RecoveryVault::new(paths, &audit, &tool).with_kdf_params(options.kdf);
    let kit = vault.generate(&credentials, &volume_identity, header.as_deref())?;

    let chunks = kit.chunks();
    if let Some(ref out) = options.chunks_out {
        write_chunk_sheet(out, &volume_identity, &chunks)?;
    }

    let phrase = kit.phrase();
    Ok(CommandReport::success(json!({
        "recovery_phrase": phrase.expose(),
        "word_count": phrase.words().count(),
        "volume_identity": volume_identity.as_str(),
        "credential_kind": credentials.kind(),
        "container": container_file.display().to_string(),
        "chunks": chunks,
        "chunks_file": options.chunks_out.as_ref().map(|p| p.display().to_string()),
    })))
}

/// Decrypt the kit, mount the volume with the recovered credentials and
/// settle the kit on the mount verdict.
pub fn recover(
    paths: &RuntimePaths,
    phrase: Zeroizing<String>,
    options: &RecoverOptions,
) -> CliResult<CommandReport> {
    let settings = load_settings(paths)?;
    let volume = configured_volume(options.volume.as_deref(), &settings)?;
    let mount_target = match (&options.mount_target, &settings.mount_target) {
        (Some(target), _) | (None, Some(target)) => target.clone(),
        (None, None) => {
            return Err(CliError::usage(
                "no mount target: pass --mount-target or set mount_target in config.json",
            ))
        }
    };
    let live = VolumeIdentity::from_volume(&volume)?;

    let audit = open_audit(paths)?;
    let mounter = VeraCryptMounter::new(options.tool.clone()).with_staging_dir(paths.keys_dir());
    let vault = RecoveryVault::new(paths, &audit, &mounter);
    vault.resume_interrupted_commit()?;

    let decrypted = vault.begin_recovery(&phrase, &live)?;
    drop(phrase);

    let verdict = {
        let request = MountRequest {
            volume_path: &volume,
            mount_target: &mount_target,
            credentials: decrypted.credentials(),
        };
        mounter.mount(&request)
    };

    let mut data = json!({
        "volume_identity": live.as_str(),
        "mount_target": mount_target,
    });
    let outcome = match verdict {
        Ok(report) => {
            let mounted = report.is_mounted();
            let outcome = decrypted.confirm_mount(report)?;
            data["mounted"] = Value::from(mounted);
            data["rekey_required"] = Value::from(outcome.is_success());
            outcome
        }
        Err(err) => {
            let outcome = decrypted.abandon(err.outcome(), &err.to_string())?;
            data["mounted"] = Value::from(false);
            data["error"] = Value::from(err.to_string());
            outcome
        }
    };
    data["container_present"] = Value::from(paths.container_file().is_file());

    Ok(CommandReport::new(outcome, data))
}

/// Rebuild a container from a chunk file. The output must be inside the
/// root; it defaults to the container location.
pub fn reconstruct(
    paths: &RuntimePaths,
    chunk_file: &Path,
    output: Option<&Path>,
    force: bool,
) -> CliResult<CommandReport> {
    let target = match output {
        Some(path) => path.to_path_buf(),
        None => {
            paths.ensure_layout()?;
            paths.container_file()
        }
    };
    let target = paths.validate_write_path(&target)?;
    if target.exists() && !force {
        return Err(CliError::already_exists(target.display()));
    }

    let bytes = reconstruct_file(chunk_file, &target)?;
    let container = RecoveryContainer::read_from(&target)?;

    Ok(CommandReport::success(json!({
        "output": target.display().to_string(),
        "bytes": bytes,
        "volume_identity": container.volume_identity().as_str(),
        "kdf_memory_kib": container.kdf_params().memory_kib(),
    })))
}

/// Recovery state of the drive. Appends nothing to the audit log.
pub fn status(paths: &RuntimePaths) -> CliResult<CommandReport> {
    let audit = MemoryAuditLog::new();
    let tool = VeraCryptMounter::default();
    let vault = RecoveryVault::new(paths, &audit, &tool);
    let status = vault.status()?;

    let mut data = serde_json::to_value(&status)?;
    data["root"] = Value::from(paths.root().display().to_string());
    Ok(CommandReport::success(data))
}

// ==================
// Safety
// ==================

/// Validate a partitioning target and compare it with the configured drive.
pub fn validate_target<E: DiskEnumerator>(
    enumerator: E,
    paths: Option<&RuntimePaths>,
    script: &Path,
    disk: u32,
) -> CliResult<CommandReport> {
    let expected = match paths {
        Some(paths) => load_settings(paths)?.disk_unique_id,
        None => None,
    };

    let policy = SafetyPolicy::new(enumerator);
    let result = policy.validate_before_partition(script, disk);
    let drift = match result.target() {
        Some(target) => check_identity_drift(expected.as_deref(), target),
        None => IdentityDrift::NotRecorded,
    };

    let outcome = blocked_outcome(result.reason());
    Ok(CommandReport::new(
        outcome,
        json!({
            "validation": serde_json::to_value(&result)?,
            "identity_drift": serde_json::to_value(&drift)?,
        }),
    ))
}

/// Retry classification of a validation verdict
fn blocked_outcome(reason: BlockReason) -> RecoveryOutcome {
    match reason {
        BlockReason::None => RecoveryOutcome::Success,
        BlockReason::EnumerationFailed => RecoveryOutcome::TransientFailure,
        BlockReason::SourceUnknown => RecoveryOutcome::EnvironmentFailure,
        BlockReason::SameAsSource
        | BlockReason::SystemDisk
        | BlockReason::NotFound
        | BlockReason::InvalidIdentity
        | BlockReason::ReadOnly => RecoveryOutcome::PermanentFailure,
    }
}

/// Report duplicated layout resources and, for a disk, its partition roles.
pub fn check_layout<E: DiskEnumerator>(
    enumerator: &E,
    paths: &RuntimePaths,
    disk: Option<(u32, Option<LauncherHint>)>,
) -> CliResult<CommandReport> {
    let duplicates: BTreeMap<String, Vec<String>> = paths
        .detect_duplicates()?
        .into_iter()
        .map(|(resource, locations)| {
            let shown = locations.iter().map(|p| p.display().to_string()).collect();
            (resource, shown)
        })
        .collect();

    let mut outcome = if duplicates.is_empty() {
        RecoveryOutcome::Success
    } else {
        RecoveryOutcome::PermanentFailure
    };

    let mut data = json!({
        "root": paths.root().display().to_string(),
        "duplicates": duplicates,
    });
    if let Some((number, hint)) = disk {
        let partitions = enumerator.partition_layout(number)?;
        let layout = resolve_drive_layout(&partitions, hint.as_ref());
        if layout.is_none() {
            outcome = RecoveryOutcome::PermanentFailure;
        }
        data["disk"] = Value::from(number);
        data["layout"] = serde_json::to_value(&layout)?;
    }

    Ok(CommandReport::new(outcome, data))
}

// ==================
// Helpers
// ==================

fn resolve_root(root: Option<&Path>) -> CliResult<RuntimePaths> {
    match root {
        Some(root) if !root.is_absolute() => {
            Err(CliError::usage("--root must be an absolute path"))
        }
        Some(root) => Ok(RuntimePaths::for_target(root)?),
        None => {
            let exe = std::env::current_exe()?;
            Ok(RuntimePaths::from_script(&exe)?)
        }
    }
}

/// Root for commands that also run before a drive is set up. Only an
/// explicit `--root` is required to exist.
fn optional_root(root: Option<&Path>, script: &Path) -> CliResult<Option<RuntimePaths>> {
    match root {
        Some(_) => resolve_root(root).map(Some),
        None => Ok(RuntimePaths::from_script(script).ok()),
    }
}

fn load_settings(paths: &RuntimePaths) -> CliResult<KnownSettings> {
    Ok(ConfigDocument::load(paths)?.settings()?)
}

fn configured_volume(explicit: Option<&Path>, settings: &KnownSettings) -> CliResult<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| settings.volume_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| {
            CliError::usage("no payload volume: pass --volume or set volume_path in config.json")
        })
}

fn open_audit(paths: &RuntimePaths) -> CliResult<FileAuditLog> {
    let path = paths.validate_write_path(&paths.audit_log_file())?;
    Ok(FileAuditLog::open(path)?)
}

fn write_chunk_sheet(out: &Path, volume: &VolumeIdentity, chunks: &[String]) -> CliResult<()> {
    let mut sheet = format!(
        "# smartdrive recovery chunks\n# volume {}\n# {} lines, any order\n",
        volume,
        chunks.len()
    );
    for line in chunks {
        sheet.push_str(line);
        sheet.push('\n');
    }
    write_bytes_atomic(out, sheet.as_bytes()).map_err(RecoveryError::from)?;
    Ok(())
}
