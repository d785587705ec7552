//! `lsblk`-backed disk enumeration (Linux)
//!
//! One `lsblk -J -b` call per observation. Older util-linux releases
//! report numbers and booleans as strings and a single `mountpoint`
//! instead of `mountpoints`; both shapes are accepted.
//!
//! The disk hosting a path is found through the kernel mount table, not
//! through lsblk mount points: lsblk omits network, FUSE and tmpfs mounts,
//! so a prefix match would attribute those paths to the root disk. A path
//! whose mount is not backed by an enumerated block device has no source.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use super::enumerator::{DiskEnumerator, DiskRecord, PartitionInfo};
use super::errors::{SafetyError, SafetyResult};
use crate::external::{ToolCommand, ENUMERATION_TIMEOUT};
use crate::identity::{BusType, DiskIdentity};
use crate::observability::{log_event, Event};

const COLUMNS: &str =
    "NAME,MAJ:MIN,PATH,SIZE,TYPE,TRAN,SERIAL,WWN,RO,MOUNTPOINT,LABEL,PARTTYPE,MODEL";

const MOUNTINFO: &str = "/proc/self/mountinfo";

/// Mount points that make a disk a system disk
const SYSTEM_MOUNTS: &[&str] = &["/", "/boot", "/boot/efi", "/usr", "/var", "[SWAP]"];

const BOOT_MOUNTS: &[&str] = &["/boot", "/boot/efi", "/efi"];

/// MBR hidden types and the GPT Microsoft reserved type
const HIDDEN_PART_TYPES: &[&str] = &[
    "0x11",
    "0x14",
    "0x16",
    "0x17",
    "0x1b",
    "0x1c",
    "0x1e",
    "e3c9e316-0b5c-4db8-817d-f92df00215ae",
];

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flex {
    Bool(bool),
    Num(u64),
    Str(String),
}

impl Flex {
    fn as_u64(&self) -> u64 {
        match self {
            Flex::Num(n) => *n,
            Flex::Str(s) => s.trim().parse().unwrap_or(0),
            Flex::Bool(b) => u64::from(*b),
        }
    }

    fn as_bool(&self) -> bool {
        match self {
            Flex::Bool(b) => *b,
            Flex::Num(n) => *n != 0,
            Flex::Str(s) => matches!(s.trim(), "1" | "true"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(rename = "maj:min", default)]
    maj_min: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    size: Option<Flex>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    tran: Option<String>,
    #[serde(default)]
    serial: Option<String>,
    #[serde(default)]
    wwn: Option<String>,
    #[serde(default)]
    ro: Option<Flex>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    mountpoints: Option<Vec<Option<String>>>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    parttype: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

impl LsblkDevice {
    fn mounts(&self) -> Vec<String> {
        let mut mounts: Vec<String> = self
            .mountpoints
            .iter()
            .flatten()
            .flatten()
            .cloned()
            .collect();
        if let Some(ref m) = self.mountpoint {
            if !mounts.contains(m) {
                mounts.push(m.clone());
            }
        }
        mounts
    }

    /// Mounts of this device and everything stacked on it
    fn all_mounts(&self) -> Vec<String> {
        let mut mounts = self.mounts();
        for child in &self.children {
            mounts.extend(child.all_mounts());
        }
        mounts
    }

    /// Kernel names and device numbers of this device and its descendants
    fn collect_devices(&self, names: &mut Vec<String>, numbers: &mut Vec<String>) {
        names.push(self.name.clone());
        if let Some(number) = non_empty(&self.maj_min) {
            numbers.push(number);
        }
        for child in &self.children {
            child.collect_devices(names, numbers);
        }
    }
}

/// One disk from one `lsblk` observation
#[derive(Debug, Clone)]
struct ObservedDisk {
    record: DiskRecord,
    partitions: Vec<PartitionInfo>,
    /// Names of the disk, its partitions and anything stacked on them
    device_names: Vec<String>,
    /// `major:minor` of the same devices
    device_numbers: Vec<String>,
}

impl ObservedDisk {
    fn backs(&self, mount: &MountEntry) -> bool {
        if self.device_numbers.iter().any(|n| *n == mount.device_number) {
            return true;
        }
        // btrfs and similar report an anonymous device number; fall back
        // to the source device node.
        mount
            .source
            .strip_prefix("/dev/")
            .and_then(|dev| Path::new(dev).file_name())
            .and_then(|name| name.to_str())
            .map_or(false, |name| self.device_names.iter().any(|n| n == name))
    }
}

/// One line of `/proc/self/mountinfo`
#[derive(Debug, Clone, PartialEq, Eq)]
struct MountEntry {
    device_number: String,
    mount_point: PathBuf,
    fs_type: String,
    source: String,
}

fn parse_mountinfo(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(' ').collect();
            let separator = fields.iter().position(|f| *f == "-")?;
            if separator < 6 {
                return None;
            }
            Some(MountEntry {
                device_number: fields[2].to_string(),
                mount_point: PathBuf::from(unescape_mount_field(fields[4])),
                fs_type: fields.get(separator + 1)?.to_string(),
                source: unescape_mount_field(fields.get(separator + 2)?),
            })
        })
        .collect()
}

/// Undo the kernel's octal escaping of space, tab, newline and backslash.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let value = std::str::from_utf8(&bytes[i + 1..i + 4])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 8).ok());
            if let Some(value) = value {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Innermost mount containing `path`. Later entries shadow earlier ones
/// mounted on the same point.
fn backing_mount<'m>(mounts: &'m [MountEntry], path: &Path) -> Option<&'m MountEntry> {
    mounts
        .iter()
        .enumerate()
        .filter(|(_, m)| path.starts_with(&m.mount_point))
        .max_by_key(|(index, m)| (m.mount_point.components().count(), *index))
        .map(|(_, m)| m)
}

fn parse_lsblk(json: &str) -> SafetyResult<Vec<ObservedDisk>> {
    let output: LsblkOutput = serde_json::from_str(json)
        .map_err(|e| SafetyError::unparseable(format!("lsblk output: {}", e)))?;
    let partition_number = Regex::new(r"p?(\d+)$")
        .map_err(|e| SafetyError::unparseable(e.to_string()))?;

    let disks = output
        .blockdevices
        .iter()
        .filter(|d| d.kind.as_deref() == Some("disk"))
        .enumerate()
        .map(|(number, disk)| {
            let mounts = disk.all_mounts();
            let mut device_names = Vec::new();
            let mut device_numbers = Vec::new();
            disk.collect_devices(&mut device_names, &mut device_numbers);
            let has_mount = |set: &[&str]| mounts.iter().any(|m| set.contains(&m.as_str()));

            let unique_id = non_empty(&disk.wwn)
                .or_else(|| non_empty(&disk.serial))
                .unwrap_or_default();
            let identity = DiskIdentity::new(
                unique_id,
                disk.tran
                    .as_deref()
                    .map_or(BusType::Unknown, BusType::from_transport),
                number as u32,
            );

            let partitions = disk
                .children
                .iter()
                .filter(|c| c.kind.as_deref() == Some("part"))
                .map(|part| PartitionInfo {
                    number: partition_number
                        .captures(&part.name)
                        .and_then(|c| c[1].parse().ok())
                        .unwrap_or(0),
                    size_bytes: part.size.as_ref().map_or(0, Flex::as_u64),
                    mount_point: part.all_mounts().into_iter().next(),
                    drive_letter: None,
                    label: non_empty(&part.label),
                    is_hidden: part.parttype.as_deref().map_or(false, |t| {
                        HIDDEN_PART_TYPES.contains(&t.trim().to_ascii_lowercase().as_str())
                    }),
                })
                .collect();

            ObservedDisk {
                record: DiskRecord {
                    identity,
                    is_system: has_mount(SYSTEM_MOUNTS),
                    is_boot: has_mount(BOOT_MOUNTS),
                    is_read_only: disk.ro.as_ref().map_or(false, Flex::as_bool),
                    size_bytes: disk.size.as_ref().map_or(0, Flex::as_u64),
                    model: non_empty(&disk.model),
                    device_path: disk
                        .path
                        .clone()
                        .or_else(|| Some(format!("/dev/{}", disk.name))),
                },
                partitions,
                device_names,
                device_numbers,
            }
        })
        .collect();
    Ok(disks)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Disk backing the mount that holds `path`, if that mount is on a
/// local block device at all.
fn hosting_disk<'d>(
    disks: &'d [ObservedDisk],
    mounts: &[MountEntry],
    path: &Path,
) -> Option<&'d ObservedDisk> {
    let shown = path.display().to_string();
    let Some(mount) = backing_mount(mounts, path) else {
        log_event(Event::SourceUnresolved, &[("path", shown.as_str())]);
        return None;
    };
    let disk = disks.iter().find(|d| d.backs(mount));
    if disk.is_none() {
        log_event(
            Event::SourceUnresolved,
            &[
                ("fs_type", mount.fs_type.as_str()),
                ("path", shown.as_str()),
                ("source", mount.source.as_str()),
            ],
        );
    }
    disk
}

/// System enumerator using util-linux `lsblk`
#[derive(Debug, Clone)]
pub struct LsblkEnumerator {
    program: String,
    timeout: Duration,
}

impl LsblkEnumerator {
    pub fn new() -> Self {
        Self {
            program: "lsblk".to_string(),
            timeout: ENUMERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn observe(&self) -> SafetyResult<Vec<ObservedDisk>> {
        let output = ToolCommand::new(self.program.clone(), self.timeout)
            .args(["-J", "-b", "-o", COLUMNS])
            .run_checked()?;
        parse_lsblk(&output.stdout)
    }
}

impl Default for LsblkEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskEnumerator for LsblkEnumerator {
    fn list_disks(&self) -> SafetyResult<Vec<DiskRecord>> {
        Ok(self.observe()?.into_iter().map(|d| d.record).collect())
    }

    fn disk_hosting(&self, path: &Path) -> SafetyResult<Option<DiskIdentity>> {
        let shown = path.display().to_string();
        // Symlinks must resolve so a link onto another disk is attributed
        // to that disk; an unresolvable path has no known source.
        let resolved = match path.canonicalize() {
            Ok(resolved) => resolved,
            Err(e) => {
                let reason = e.to_string();
                log_event(
                    Event::SourceUnresolved,
                    &[("error", reason.as_str()), ("path", shown.as_str())],
                );
                return Ok(None);
            }
        };
        let mounts = match fs::read_to_string(MOUNTINFO) {
            Ok(text) => parse_mountinfo(&text),
            Err(e) => {
                let reason = e.to_string();
                log_event(
                    Event::SourceUnresolved,
                    &[("error", reason.as_str()), ("path", shown.as_str())],
                );
                return Ok(None);
            }
        };
        let disks = self.observe()?;
        Ok(hosting_disk(&disks, &mounts, &resolved).map(|d| d.record.identity.clone()))
    }

    fn partition_layout(&self, disk_number: u32) -> SafetyResult<Vec<PartitionInfo>> {
        Ok(self
            .observe()?
            .into_iter()
            .find(|d| d.record.identity.disk_number == disk_number)
            .map(|d| d.partitions)
            .unwrap_or_default())
    }
}
