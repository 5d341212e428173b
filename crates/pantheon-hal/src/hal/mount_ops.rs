//! Mount operations trait.

use crate::HalResult;
use nix::mount::MsFlags;
use std::path::Path;

/// Trait for mounting and unmounting filesystems.
pub trait MountOps {
    /// Mount a device to a target path.
    ///
    /// # Arguments
    /// * `device` - Device path (e.g., `/dev/nvme0n1p2`)
    /// * `target` - Mount point path (must already exist)
    /// * `fstype` - Optional filesystem type (e.g., `"btrfs"`, `"vfat"`)
    /// * `options` - Mount options
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: &MountOptions,
    ) -> HalResult<()>;

    /// Unmount a filesystem.
    fn unmount(&self, target: &Path) -> HalResult<()>;

    /// Unmount `target` and everything mounted below it, deepest first.
    fn unmount_recursive(&self, target: &Path) -> HalResult<()>;

    /// Check if a path is currently mounted.
    fn is_mounted(&self, path: &Path) -> HalResult<bool>;
}

/// Mount options as the comma-separated string used in fstab (e.g. "noatime,subvol=@").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    pub options: Option<String>,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: impl Into<String>) -> Self {
        Self {
            options: Some(options.into()),
        }
    }

    /// Split into kernel mount flags and the filesystem-specific data string, the way
    /// mount(8) does before calling mount(2).
    pub fn split(&self) -> (MsFlags, Option<String>) {
        let mut flags = MsFlags::empty();
        let mut data = Vec::new();
        for opt in self
            .options
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
        {
            match opt {
                "ro" => flags |= MsFlags::MS_RDONLY,
                "rw" | "defaults" => {}
                "noatime" => flags |= MsFlags::MS_NOATIME,
                "nodiratime" => flags |= MsFlags::MS_NODIRATIME,
                "relatime" => flags |= MsFlags::MS_RELATIME,
                "nodev" => flags |= MsFlags::MS_NODEV,
                "nosuid" => flags |= MsFlags::MS_NOSUID,
                "noexec" => flags |= MsFlags::MS_NOEXEC,
                other => data.push(other),
            }
        }
        let data = (!data.is_empty()).then(|| data.join(","));
        (flags, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_separates_flags_from_data() {
        let opts = MountOptions::with_options("noatime,compress=zstd:3,space_cache=v2,subvol=@");
        let (flags, data) = opts.split();
        assert!(flags.contains(MsFlags::MS_NOATIME));
        assert_eq!(data.as_deref(), Some("compress=zstd:3,space_cache=v2,subvol=@"));
    }

    #[test]
    fn split_of_empty_options_is_empty() {
        let (flags, data) = MountOptions::new().split();
        assert!(flags.is_empty());
        assert!(data.is_none());
    }

    #[test]
    fn split_keeps_vfat_umask_as_data() {
        let (flags, data) = MountOptions::with_options("defaults,umask=0077").split();
        assert!(flags.is_empty());
        assert_eq!(data.as_deref(), Some("umask=0077"));
    }
}
