//! Filesystem creation and low-level drive formatting.

use crate::HalResult;
use std::path::Path;

/// Trait for formatting block devices.
pub trait FormatOps {
    /// Low-level format an NVMe namespace (`nvme format --ses=1`).
    fn nvme_format(&self, drive: &Path, opts: &FormatOptions) -> HalResult<()>;

    /// Create a FAT32 filesystem, typically used for EFI system partitions.
    fn format_vfat(&self, device: &Path, label: &str, opts: &FormatOptions) -> HalResult<()>;

    /// Create a btrfs filesystem.
    fn format_btrfs(&self, device: &Path, label: &str, opts: &FormatOptions) -> HalResult<()>;

    /// Create an XFS filesystem.
    fn format_xfs(&self, device: &Path, label: &str, opts: &FormatOptions) -> HalResult<()>;
}

/// Options for formatting operations.
#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    /// If true, the operator has confirmed the destructive operation
    pub confirmed: bool,
    /// Additional arguments to pass to the format command
    pub extra_args: Vec<String>,
}

impl FormatOptions {
    pub fn new(confirmed: bool) -> Self {
        Self {
            confirmed,
            extra_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}
