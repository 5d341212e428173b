//! Device probing operations (lsblk/blkid).

use crate::HalResult;
use std::path::Path;

/// Probing operations trait.
pub trait ProbeOps {
    /// Whether a block device node currently exists.
    fn device_exists(&self, device: &Path) -> bool;

    /// Return a human-readable lsblk table for diagnostics.
    fn lsblk_table(&self, disk: &Path) -> HalResult<String>;

    /// Return UUID for a block device (e.g. `/dev/sda1`).
    fn blkid_uuid(&self, device: &Path) -> HalResult<String>;

    /// Mountpoints currently backed by the disk or any of its partitions.
    fn mounted_from(&self, disk: &Path) -> HalResult<Vec<String>>;
}
