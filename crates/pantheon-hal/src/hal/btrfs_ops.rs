//! btrfs operations used when laying out root subvolumes.

use crate::HalResult;
use std::path::Path;

pub trait BtrfsOps {
    /// Create a btrfs subvolume at `path`.
    fn btrfs_subvolume_create(&self, path: &Path) -> HalResult<()>;
}
