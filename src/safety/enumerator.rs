//! Disk enumeration collaborator

use std::path::Path;

use serde::Serialize;

use super::errors::SafetyResult;
use crate::identity::DiskIdentity;

/// One disk as seen by a single enumeration
#[derive(Debug, Clone, Serialize)]
pub struct DiskRecord {
    pub identity: DiskIdentity,
    /// Hosts the running OS (root, boot, usr or swap)
    pub is_system: bool,
    /// Hosts the boot or EFI partition
    pub is_boot: bool,
    pub is_read_only: bool,
    pub size_bytes: u64,
    pub model: Option<String>,
    /// Device node, where the platform has one
    pub device_path: Option<String>,
}

/// One partition of a disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionInfo {
    /// 1-based partition number
    pub number: u32,
    pub size_bytes: u64,
    pub mount_point: Option<String>,
    pub drive_letter: Option<char>,
    pub label: Option<String>,
    pub is_hidden: bool,
}

/// Source of live disk facts.
///
/// Implementations observe, never modify. Each call is a fresh observation;
/// disk numbers may differ between calls.
pub trait DiskEnumerator {
    /// All online disks
    fn list_disks(&self) -> SafetyResult<Vec<DiskRecord>>;

    /// Disk holding `path`, or `None` when it is not on a local disk
    fn disk_hosting(&self, path: &Path) -> SafetyResult<Option<DiskIdentity>>;

    /// Current partition layout of a disk
    fn partition_layout(&self, disk_number: u32) -> SafetyResult<Vec<PartitionInfo>>;
}
