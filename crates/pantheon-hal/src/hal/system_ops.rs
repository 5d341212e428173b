//! System-level operations (privilege, sync, udev settle).

use crate::HalResult;

/// System operations trait.
pub trait SystemOps {
    /// Whether the current process runs with an effective uid of 0.
    fn is_root(&self) -> bool;

    /// Best-effort filesystem sync.
    fn sync(&self) -> HalResult<()>;

    /// Wait for block device events to quiesce (new partition nodes).
    fn udev_settle(&self) -> HalResult<()>;
}
