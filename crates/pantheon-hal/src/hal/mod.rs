//! HAL trait definitions and implementations.
//!
//! This module defines the core traits for system operations and provides
//! both real (LinuxHal) and fake (FakeHal) implementations.

pub mod btrfs_ops;
pub mod fake_hal;
pub mod file_ops;
pub mod format_ops;
pub mod guards;
pub mod linux_hal;
pub mod mount_ops;
pub mod partition_ops;
pub mod probe_ops;
pub mod process_ops;
pub mod system_ops;

pub use btrfs_ops::BtrfsOps;
pub use fake_hal::{FakeHal, Operation};
pub use file_ops::FileOps;
pub use format_ops::{FormatOps, FormatOptions};
pub use guards::MountGuard;
pub use linux_hal::LinuxHal;
pub use mount_ops::{MountOps, MountOptions};
pub use partition_ops::{PartedOp, PartedOptions, PartitionOps, WipeFsOptions};
pub use probe_ops::ProbeOps;
pub use process_ops::ProcessOps;
pub use system_ops::SystemOps;

/// Complete HAL combining all system operation traits.
pub trait SystemHal:
    ProcessOps
    + FormatOps
    + PartitionOps
    + MountOps
    + BtrfsOps
    + ProbeOps
    + FileOps
    + SystemOps
    + Send
    + Sync
{
}

/// Automatically implement SystemHal for any type implementing all required traits.
impl<T> SystemHal for T where
    T: ProcessOps
        + FormatOps
        + PartitionOps
        + MountOps
        + BtrfsOps
        + ProbeOps
        + FileOps
        + SystemOps
        + Send
        + Sync
{
}
