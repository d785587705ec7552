//! Physical disk identity
//!
//! Disk numbers are reassigned by the OS across reboots and hotplug, so the
//! only thing that identifies a disk is its hardware `unique_id` (WWN or
//! serial). `DiskIdentity` deliberately has no `PartialEq`; comparisons go
//! through [`identity_matches`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport a disk is attached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    Usb,
    Sata,
    Nvme,
    Scsi,
    Sas,
    Mmc,
    Virtual,
    Unknown,
}

impl BusType {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BusType::Usb => "USB",
            BusType::Sata => "SATA",
            BusType::Nvme => "NVMe",
            BusType::Scsi => "SCSI",
            BusType::Sas => "SAS",
            BusType::Mmc => "MMC",
            BusType::Virtual => "VIRTUAL",
            BusType::Unknown => "UNKNOWN",
        }
    }

    /// Map a transport name as reported by the OS (`lsblk TRAN`, Windows `BusType`).
    pub fn from_transport(transport: &str) -> Self {
        match transport.trim().to_ascii_lowercase().as_str() {
            "usb" => BusType::Usb,
            "sata" | "ata" | "pata" => BusType::Sata,
            "nvme" => BusType::Nvme,
            "scsi" | "iscsi" | "spi" => BusType::Scsi,
            "sas" => BusType::Sas,
            "mmc" | "sd" => BusType::Mmc,
            "virtio" | "virtual" | "file backed virtual" => BusType::Virtual,
            _ => BusType::Unknown,
        }
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A disk as observed by one enumeration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskIdentity {
    /// Hardware identifier (WWN, serial, or platform unique id)
    pub unique_id: String,
    /// Attachment bus
    pub bus_type: BusType,
    /// OS disk number at the time of enumeration. Advisory only.
    pub disk_number: u32,
}

impl DiskIdentity {
    /// Create a new identity
    pub fn new(unique_id: impl Into<String>, bus_type: BusType, disk_number: u32) -> Self {
        Self {
            unique_id: unique_id.into(),
            bus_type,
            disk_number,
        }
    }

    /// Comparison form of the unique id: trimmed and lowercased.
    pub fn normalized_id(&self) -> String {
        self.unique_id.trim().to_lowercase()
    }

    /// False when the platform reported no usable identifier.
    pub fn has_identity(&self) -> bool {
        !self.unique_id.trim().is_empty()
    }
}

impl fmt::Display for DiskIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "disk {} [{}] {}",
            self.disk_number,
            self.bus_type,
            if self.has_identity() {
                self.unique_id.trim()
            } else {
                "<no unique id>"
            }
        )
    }
}

/// Two observations refer to the same physical disk.
///
/// Only `unique_id` is compared, case-insensitively. An empty id never
/// matches anything, including another empty id.
pub fn identity_matches(a: &DiskIdentity, b: &DiskIdentity) -> bool {
    a.has_identity() && b.has_identity() && a.normalized_id() == b.normalized_id()
}
