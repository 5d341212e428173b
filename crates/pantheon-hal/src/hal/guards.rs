use crate::MountOps;
use std::path::{Path, PathBuf};

/// RAII guard that unmounts a target path when dropped.
#[derive(Debug)]
pub struct MountGuard<'a, H: MountOps + ?Sized> {
    hal: &'a H,
    target: PathBuf,
    active: bool,
}

impl<'a, H: MountOps + ?Sized> MountGuard<'a, H> {
    pub fn new(hal: &'a H, target: impl Into<PathBuf>) -> Self {
        Self {
            hal,
            target: target.into(),
            active: true,
        }
    }

    /// Prevent automatic unmounting and return the target path.
    pub fn release(mut self) -> PathBuf {
        self.active = false;
        self.target.clone()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl<'a, H: MountOps + ?Sized> Drop for MountGuard<'a, H> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(err) = self.hal.unmount(&self.target) {
            log::warn!(
                "mount guard failed to unmount {}: {}",
                self.target.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FakeHal, MountOptions, Operation};

    #[test]
    fn guard_unmounts_on_drop() {
        let hal = FakeHal::new();
        let target = Path::new("/mnt");
        hal.mount_device(Path::new("/dev/sda2"), target, Some("btrfs"), &MountOptions::new())
            .unwrap();
        {
            let _guard = MountGuard::new(&hal, target);
        }
        assert!(!hal.is_mounted(target).unwrap());
        assert!(hal.has_operation(|op| matches!(op, Operation::Unmount { .. })));
    }

    #[test]
    fn released_guard_leaves_mount_in_place() {
        let hal = FakeHal::new();
        let target = Path::new("/mnt");
        hal.mount_device(Path::new("/dev/sda2"), target, None, &MountOptions::new())
            .unwrap();
        let guard = MountGuard::new(&hal, target);
        assert_eq!(guard.release(), PathBuf::from("/mnt"));
        assert!(hal.is_mounted(target).unwrap());
    }
}
