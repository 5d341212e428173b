//! pantheon Hardware Abstraction Layer (HAL).
//!
//! Every world-touching operation the provisioning pipeline performs (subprocesses,
//! mounts, block-device probes, writes below the staging root) goes through the traits
//! defined here, so the workflow can be exercised against [`FakeHal`] without root or
//! real hardware.

pub mod error;
pub mod hal;
pub mod procfs;

pub use error::{HalError, HalResult};
pub use hal::{
    BtrfsOps, FakeHal, FileOps, FormatOptions, FormatOps, LinuxHal, MountGuard, MountOps,
    MountOptions, Operation, PartedOp, PartedOptions, PartitionOps, ProbeOps, ProcessOps,
    SystemHal, SystemOps, WipeFsOptions,
};
