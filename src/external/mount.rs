//! Volume mount collaborator
//!
//! The recovery core never decides on its own that a mount worked. It asks
//! a [`VolumeMounter`] and acts only on the report it gets back.

use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use super::errors::{ToolError, ToolResult};
use super::tool::{ToolCommand, ENUMERATION_TIMEOUT, MOUNT_TIMEOUT};
use crate::recovery::{Credentials, EnvironmentSource};

/// What to mount and with which credentials
pub struct MountRequest<'a> {
    pub volume_path: &'a Path,
    pub mount_target: &'a str,
    pub credentials: &'a Credentials,
}

/// Why a mount was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountFailureKind {
    /// Password or keyfile rejected by the volume
    InvalidCredentials,
    /// Volume header unreadable
    HeaderDamaged,
    /// Volume or mount target already in use
    Busy,
    Other,
}

impl MountFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountFailureKind::InvalidCredentials => "INVALID_CREDENTIALS",
            MountFailureKind::HeaderDamaged => "HEADER_DAMAGED",
            MountFailureKind::Busy => "BUSY",
            MountFailureKind::Other => "OTHER",
        }
    }

    fn classify(diagnostic: &str) -> Self {
        let lowered = diagnostic.to_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));
        if any(&["incorrect password", "wrong password", "invalid keyfile", "authentication failed"]) {
            MountFailureKind::InvalidCredentials
        } else if any(&["header damaged", "header corrupted", "invalid header", "crc check failed"]) {
            MountFailureKind::HeaderDamaged
        } else if any(&["already mounted", "in use"]) {
            MountFailureKind::Busy
        } else {
            MountFailureKind::Other
        }
    }
}

/// Result of one mount attempt as reported by the collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountReport {
    Mounted,
    Failed {
        kind: MountFailureKind,
        exit_code: Option<i32>,
        message: String,
    },
}

impl MountReport {
    pub fn is_mounted(&self) -> bool {
        matches!(self, MountReport::Mounted)
    }
}

/// Mount collaborator
pub trait VolumeMounter {
    /// Attempt the mount. `Err` means the tool could not be run to a
    /// verdict; `Ok(Failed)` means it ran and refused.
    fn mount(&self, request: &MountRequest<'_>) -> ToolResult<MountReport>;
}

/// Keyfile bytes on disk for the duration of one mount.
///
/// The content is overwritten with zeros before the file is unlinked.
struct StagedKeyfile {
    file: NamedTempFile,
    len: usize,
}

impl StagedKeyfile {
    fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for StagedKeyfile {
    fn drop(&mut self) {
        let _ = wipe(self.file.as_file_mut(), self.len);
    }
}

fn wipe(file: &mut File, len: usize) -> io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&vec![0u8; len])?;
    file.sync_all()
}

/// VeraCrypt text-mode CLI
#[derive(Debug, Clone)]
pub struct VeraCryptMounter {
    program: String,
    timeout: Duration,
    staging_dir: Option<PathBuf>,
}

impl VeraCryptMounter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: MOUNT_TIMEOUT,
            staging_dir: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stage keyfiles under `dir` instead of the system temp directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    fn stage_keyfile(&self, bytes: &[u8]) -> ToolResult<StagedKeyfile> {
        let io_err = |e| ToolError::io(&self.program, e);
        let mut builder = tempfile::Builder::new();
        builder.prefix(".sd-keyfile.");
        let file = match self.staging_dir {
            Some(ref dir) => {
                fs::create_dir_all(dir).map_err(io_err)?;
                builder.tempfile_in(dir)
            }
            None => builder.tempfile(),
        }
        .map_err(io_err)?;

        let mut staged = StagedKeyfile {
            file,
            len: bytes.len(),
        };
        staged
            .file
            .write_all(bytes)
            .and_then(|_| staged.file.as_file().sync_all())
            .map_err(io_err)?;
        Ok(staged)
    }
}

impl Default for VeraCryptMounter {
    fn default() -> Self {
        Self::new("veracrypt")
    }
}

impl VolumeMounter for VeraCryptMounter {
    fn mount(&self, request: &MountRequest<'_>) -> ToolResult<MountReport> {
        let keyfile = match request.credentials.keyfile_bytes() {
            [] => None,
            bytes => Some(self.stage_keyfile(bytes)?),
        };

        let mut command = ToolCommand::new(self.program.clone(), self.timeout).args([
            "--text",
            "--non-interactive",
            "--stdin",
            "--protect-hidden=no",
            "--pim=0",
        ]);
        if let Some(ref file) = keyfile {
            let mut flag = std::ffi::OsString::from("--keyfiles=");
            flag.push(file.path());
            command = command.arg(flag);
        }

        let mut secret = Zeroizing::new(request.credentials.password().as_bytes().to_vec());
        secret.push(b'\n');
        let output = command
            .arg(request.volume_path)
            .arg(request.mount_target)
            .stdin_secret(secret)
            .run()?;

        if output.success() {
            return Ok(MountReport::Mounted);
        }
        let message = output.diagnostic();
        Ok(MountReport::Failed {
            kind: MountFailureKind::classify(&message),
            exit_code: output.exit_code,
            message,
        })
    }
}

impl EnvironmentSource for VeraCryptMounter {
    fn external_tool_version(&self) -> ToolResult<String> {
        let output = ToolCommand::new(self.program.clone(), ENUMERATION_TIMEOUT)
            .args(["--text", "--version"])
            .run_checked()?;
        parse_version(&output.stdout)
            .ok_or_else(|| ToolError::failed(&self.program, "version string not recognised"))
    }
}

fn parse_version(text: &str) -> Option<String> {
    let pattern = Regex::new(r"(\d+\.\d+(?:\.\d+)?(?:-[A-Za-z0-9]+)?)").ok()?;
    pattern
        .captures(text)
        .map(|caps| caps[1].to_string())
}
