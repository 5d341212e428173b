use crate::guard::{DestructiveGuard, DestructiveToken};
use crate::repo_sync::SyncReport;
use crate::subprocess_failure;
use pantheon_core::hosts::HostProfile;
use pantheon_core::settings::Settings;
use pantheon_error::ProvisionError;
use pantheon_hal::{HalResult, SystemHal};
use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One external operation and whether it succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationRecord {
    pub target: String,
    pub program: String,
    pub ok: bool,
}

/// Everything a phase needs. Owned by the pipeline for the length of one run.
pub struct PhaseContext<'a> {
    pub hal: &'a dyn SystemHal,
    pub settings: &'a Settings,
    pub profile: &'a HostProfile,
    pub guard: DestructiveGuard,
    pub sleep: &'a dyn Fn(Duration),
    pub ledger: Vec<OperationRecord>,
    pub sync_reports: Vec<SyncReport>,
    /// Granted by the partition phase, spent by the filesystem phase.
    pub partition_token: Option<DestructiveToken>,
}

impl<'a> PhaseContext<'a> {
    pub fn new(
        hal: &'a dyn SystemHal,
        settings: &'a Settings,
        profile: &'a HostProfile,
        guard: DestructiveGuard,
        sleep: &'a dyn Fn(Duration),
    ) -> Self {
        Self {
            hal,
            settings,
            profile,
            guard,
            sleep,
            ledger: Vec::new(),
            sync_reports: Vec::new(),
            partition_token: None,
        }
    }

    /// Add an operation whose outcome was decided elsewhere (retried probes, role sync).
    pub fn note(&mut self, program: &str, target: impl Display, ok: bool) {
        self.ledger.push(OperationRecord {
            target: target.to_string(),
            program: program.to_string(),
            ok,
        });
    }

    /// Log `result` in the ledger and turn a HAL error into a `SubprocessFailure`.
    pub fn record<T>(
        &mut self,
        program: &str,
        target: impl Display,
        result: HalResult<T>,
    ) -> Result<T, ProvisionError> {
        let target = target.to_string();
        self.note(program, &target, result.is_ok());
        result.map_err(|e| subprocess_failure(program, target, e))
    }

    /// Path of `abs` (an absolute path on the installed system) below the staging root.
    pub fn target_path(&self, abs: impl AsRef<Path>) -> PathBuf {
        target_path(&self.settings.target_root, abs.as_ref())
    }

    /// Root as a string argument for `pacstrap`, `genfstab` and `arch-chroot`.
    pub fn root_arg(&self) -> String {
        self.settings.target_root.display().to_string()
    }

    pub fn failed_operations(&self) -> impl Iterator<Item = &OperationRecord> {
        self.ledger.iter().filter(|r| !r.ok)
    }
}

pub fn target_path(root: &Path, abs: &Path) -> PathBuf {
    let rel = abs.strip_prefix("/").unwrap_or(abs);
    if rel.as_os_str().is_empty() {
        return root.to_path_buf();
    }
    root.join(rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_path_joins_below_root() {
        let root = Path::new("/mnt");
        assert_eq!(target_path(root, Path::new("/")), PathBuf::from("/mnt"));
        assert_eq!(
            target_path(root, Path::new("/var/lib/libvirt/images")),
            PathBuf::from("/mnt/var/lib/libvirt/images")
        );
        assert_eq!(target_path(root, Path::new("etc/fstab")), PathBuf::from("/mnt/etc/fstab"));
    }
}
