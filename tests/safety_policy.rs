//! Safety policy invariant tests
//!
//! Disks are identified by hardware id only. Disk numbers are reassigned
//! between observations, so every test that matters renumbers the disks
//! between the source lookup and the target lookup.

use std::cell::Cell;
use std::path::Path;

use smartdrive::identity::{identity_matches, BusType, DiskIdentity};
use smartdrive::safety::{
    BlockReason, DiskEnumerator, DiskRecord, PartitionInfo, SafetyError, SafetyPolicy,
    SafetyResult,
};

/// Enumerator that renumbers every disk on each `list_disks` call, the way
/// a hotplug between two observations would.
struct ShiftingEnumerator {
    source: Option<DiskIdentity>,
    disks: Vec<DiskRecord>,
    shift: u32,
    calls: Cell<u32>,
}

impl ShiftingEnumerator {
    fn new(source: Option<DiskIdentity>, disks: Vec<DiskRecord>) -> Self {
        Self {
            source,
            disks,
            shift: 0,
            calls: Cell::new(0),
        }
    }

    fn shifted_by(mut self, shift: u32) -> Self {
        self.shift = shift;
        self
    }
}

impl DiskEnumerator for ShiftingEnumerator {
    fn list_disks(&self) -> SafetyResult<Vec<DiskRecord>> {
        self.calls.set(self.calls.get() + 1);
        Ok(self
            .disks
            .iter()
            .cloned()
            .map(|mut d| {
                d.identity.disk_number += self.shift;
                d
            })
            .collect())
    }

    fn disk_hosting(&self, _path: &Path) -> SafetyResult<Option<DiskIdentity>> {
        Ok(self.source.clone())
    }

    fn partition_layout(&self, _disk_number: u32) -> SafetyResult<Vec<PartitionInfo>> {
        Ok(Vec::new())
    }
}

struct BrokenEnumerator;

impl DiskEnumerator for BrokenEnumerator {
    fn list_disks(&self) -> SafetyResult<Vec<DiskRecord>> {
        Err(SafetyError::unparseable("garbled enumeration"))
    }

    fn disk_hosting(&self, _path: &Path) -> SafetyResult<Option<DiskIdentity>> {
        Err(SafetyError::unparseable("garbled enumeration"))
    }

    fn partition_layout(&self, _disk_number: u32) -> SafetyResult<Vec<PartitionInfo>> {
        Err(SafetyError::unparseable("garbled enumeration"))
    }
}

fn disk(unique_id: &str, number: u32) -> DiskRecord {
    DiskRecord {
        identity: DiskIdentity::new(unique_id, BusType::Usb, number),
        is_system: false,
        is_boot: false,
        is_read_only: false,
        size_bytes: 64_000_000_000,
        model: None,
        device_path: None,
    }
}

fn script() -> &'static Path {
    Path::new("/media/user/LAUNCHER/.smartdrive/scripts/setup")
}

// =============================================================================
// IDENTITY EQUALITY
// =============================================================================

#[test]
fn test_identity_ignores_disk_number() {
    let a = DiskIdentity::new("4C530001230815117", BusType::Usb, 1);
    let b = DiskIdentity::new("4C530001230815117", BusType::Usb, 3);
    let c = DiskIdentity::new("4C530001230815118", BusType::Usb, 1);

    assert!(identity_matches(&a, &b));
    assert!(!identity_matches(&a, &c));
}

#[test]
fn test_identity_is_case_insensitive() {
    let a = DiskIdentity::new("eui.0025385B71B0C2A1", BusType::Nvme, 0);
    let b = DiskIdentity::new("EUI.0025385b71b0c2a1", BusType::Nvme, 0);
    assert!(identity_matches(&a, &b));
}

#[test]
fn test_empty_identity_never_matches() {
    let a = DiskIdentity::new("", BusType::Usb, 2);
    let b = DiskIdentity::new("", BusType::Usb, 2);
    assert!(!identity_matches(&a, &b));
}

// =============================================================================
// SAME AS SOURCE
// =============================================================================

/// The source drive is blocked even though the target number it has now
/// differs from the number it had when the source was resolved.
#[test]
fn test_source_blocked_after_renumbering() {
    let source = DiskIdentity::new("SRC-SERIAL", BusType::Usb, 1);
    let enumerator = ShiftingEnumerator::new(
        Some(source),
        vec![disk("SYS-SERIAL", 0), disk("src-serial", 1), disk("DST", 2)],
    )
    .shifted_by(3);
    let policy = SafetyPolicy::new(enumerator);

    // After the shift the source drive is disk 4.
    let result = policy.validate_before_partition(script(), 4);
    assert!(!result.is_safe());
    assert_eq!(result.reason(), BlockReason::SameAsSource);
    assert_eq!(policy.enumerator().calls.get(), 1);
}

/// The number the source had at lookup time now belongs to another disk,
/// which is therefore a legitimate target.
#[test]
fn test_stale_source_number_is_not_the_source() {
    let source = DiskIdentity::new("SRC-SERIAL", BusType::Usb, 1);
    let enumerator = ShiftingEnumerator::new(
        Some(source),
        vec![disk("OTHER", 0), disk("SRC-SERIAL", 5)],
    )
    .shifted_by(1);
    let policy = SafetyPolicy::new(enumerator);

    let result = policy.validate_before_partition(script(), 1);
    assert!(result.is_safe());
    assert_eq!(result.reason(), BlockReason::None);
    assert_eq!(result.target().unwrap().unique_id, "OTHER");
}

// =============================================================================
// FAIL CLOSED
// =============================================================================

#[test]
fn test_unknown_source_blocks_everything() {
    let enumerator = ShiftingEnumerator::new(None, vec![disk("A", 0), disk("B", 1)]);
    let policy = SafetyPolicy::new(enumerator);

    for n in 0..2 {
        let result = policy.validate_before_partition(Path::new("//server/share/setup"), n);
        assert!(!result.is_safe());
        assert_eq!(result.reason(), BlockReason::SourceUnknown);
    }
}

#[test]
fn test_source_without_hardware_id_blocks() {
    let source = DiskIdentity::new("   ", BusType::Unknown, 1);
    let policy = SafetyPolicy::new(ShiftingEnumerator::new(Some(source), vec![disk("B", 2)]));

    let result = policy.validate_before_partition(script(), 2);
    assert_eq!(result.reason(), BlockReason::SourceUnknown);
}

#[test]
fn test_enumeration_failure_blocks() {
    let policy = SafetyPolicy::new(BrokenEnumerator);
    let result = policy.validate_before_partition(script(), 1);
    assert!(!result.is_safe());
    assert_eq!(result.reason(), BlockReason::EnumerationFailed);
}

#[test]
fn test_missing_target_blocks() {
    let source = DiskIdentity::new("SRC", BusType::Usb, 1);
    let policy = SafetyPolicy::new(ShiftingEnumerator::new(Some(source), vec![disk("SRC", 1)]));

    let result = policy.validate_before_partition(script(), 9);
    assert_eq!(result.reason(), BlockReason::NotFound);
}

#[test]
fn test_target_without_identity_blocks() {
    let source = DiskIdentity::new("SRC", BusType::Usb, 1);
    let policy = SafetyPolicy::new(ShiftingEnumerator::new(
        Some(source),
        vec![disk("SRC", 1), disk("", 2)],
    ));

    let result = policy.validate_before_partition(script(), 2);
    assert_eq!(result.reason(), BlockReason::InvalidIdentity);
}

// =============================================================================
// SYSTEM AND READ-ONLY DISKS
// =============================================================================

#[test]
fn test_system_and_boot_disks_block() {
    let source = DiskIdentity::new("SRC", BusType::Usb, 1);
    let mut system = disk("SYS", 0);
    system.is_system = true;
    let mut boot = disk("EFI", 2);
    boot.is_boot = true;

    let policy = SafetyPolicy::new(ShiftingEnumerator::new(
        Some(source),
        vec![system, disk("SRC", 1), boot],
    ));

    assert_eq!(
        policy.validate_before_partition(script(), 0).reason(),
        BlockReason::SystemDisk
    );
    assert_eq!(
        policy.validate_before_partition(script(), 2).reason(),
        BlockReason::SystemDisk
    );
}

#[test]
fn test_read_only_target_blocks() {
    let source = DiskIdentity::new("SRC", BusType::Usb, 1);
    let mut locked = disk("LOCKED", 2);
    locked.is_read_only = true;
    let policy = SafetyPolicy::new(ShiftingEnumerator::new(
        Some(source),
        vec![disk("SRC", 1), locked],
    ));

    assert_eq!(
        policy.validate_before_partition(script(), 2).reason(),
        BlockReason::ReadOnly
    );
}

#[test]
fn test_result_serialises_reason_name() {
    let policy = SafetyPolicy::new(ShiftingEnumerator::new(None, vec![]));
    let result = policy.validate_before_partition(script(), 0);
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["reason"], "SOURCE_UNKNOWN");
    assert_eq!(value["is_safe"], false);
}
