//! Launcher and payload partition resolution
//!
//! The appliance drive carries a small unencrypted launcher partition and
//! the encrypted payload. The launcher is the partition the caller names
//! (by mount point or drive letter), else the first one. The payload is
//! the largest visible partition that is not the launcher.

use serde::Serialize;

use super::enumerator::PartitionInfo;

/// How the caller identifies the launcher partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherHint {
    MountPoint(String),
    DriveLetter(char),
}

impl LauncherHint {
    fn matches(&self, partition: &PartitionInfo) -> bool {
        match self {
            LauncherHint::MountPoint(mount) => {
                partition.mount_point.as_deref().map(|m| m.trim_end_matches('/'))
                    == Some(mount.trim_end_matches('/'))
            }
            LauncherHint::DriveLetter(letter) => partition
                .drive_letter
                .map_or(false, |l| l.eq_ignore_ascii_case(letter)),
        }
    }
}

/// Resolved partition roles of an appliance drive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveLayout {
    pub launcher: PartitionInfo,
    pub payload: Option<PartitionInfo>,
}

/// Assign launcher and payload roles. `None` for a disk without partitions.
pub fn resolve_drive_layout(
    partitions: &[PartitionInfo],
    hint: Option<&LauncherHint>,
) -> Option<DriveLayout> {
    let launcher = hint
        .and_then(|h| partitions.iter().find(|p| h.matches(p)))
        .or_else(|| partitions.iter().min_by_key(|p| p.number))?;

    let payload = partitions
        .iter()
        .filter(|p| p.number != launcher.number && !p.is_hidden)
        .max_by_key(|p| p.size_bytes)
        .cloned();

    Some(DriveLayout {
        launcher: launcher.clone(),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(number: u32, size_bytes: u64) -> PartitionInfo {
        PartitionInfo {
            number,
            size_bytes,
            mount_point: None,
            drive_letter: None,
            label: None,
            is_hidden: false,
        }
    }

    #[test]
    fn test_first_partition_is_default_launcher() {
        let parts = vec![part(2, 60_000), part(1, 1_000)];
        let layout = resolve_drive_layout(&parts, None).unwrap();
        assert_eq!(layout.launcher.number, 1);
        assert_eq!(layout.payload.unwrap().number, 2);
    }

    #[test]
    fn test_hint_selects_launcher() {
        let mut launcher = part(2, 1_000);
        launcher.drive_letter = Some('E');
        let parts = vec![part(1, 60_000), launcher, part(3, 500)];

        let layout = resolve_drive_layout(&parts, Some(&LauncherHint::DriveLetter('e'))).unwrap();
        assert_eq!(layout.launcher.number, 2);
        assert_eq!(layout.payload.unwrap().number, 1);
    }

    #[test]
    fn test_hidden_partitions_never_payload() {
        let mut hidden = part(2, 90_000);
        hidden.is_hidden = true;
        let parts = vec![part(1, 1_000), hidden, part(3, 50_000)];
        let layout = resolve_drive_layout(&parts, None).unwrap();
        assert_eq!(layout.payload.unwrap().number, 3);
    }

    #[test]
    fn test_single_partition_has_no_payload() {
        let layout = resolve_drive_layout(&[part(1, 1_000)], None).unwrap();
        assert!(layout.payload.is_none());
        assert!(resolve_drive_layout(&[], None).is_none());
    }

    #[test]
    fn test_mount_hint_ignores_trailing_slash() {
        let mut launcher = part(1, 1_000);
        launcher.mount_point = Some("/media/user/LAUNCHER".into());
        let parts = vec![launcher, part(2, 60_000)];
        let hint = LauncherHint::MountPoint("/media/user/LAUNCHER/".into());
        let layout = resolve_drive_layout(&parts, Some(&hint)).unwrap();
        assert_eq!(layout.launcher.number, 1);
    }
}
