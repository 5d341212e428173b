//! Role repository sync.
//!
//! Each repository is cloned when missing and fast-forwarded when present. The first
//! failure aborts the whole sync; earlier repositories stay on disk.

use crate::subprocess_failure;
use pantheon_core::hosts::RoleRepository;
use pantheon_error::ProvisionError;
use pantheon_hal::{FileOps, ProcessOps};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const GIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Cloned,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncEntry {
    pub name: String,
    pub url: String,
    pub action: SyncAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub target_dir: PathBuf,
    pub entries: Vec<SyncEntry>,
}

impl SyncReport {
    pub fn new(target_dir: &Path) -> Self {
        Self {
            target_dir: target_dir.to_path_buf(),
            entries: Vec::new(),
        }
    }

    pub fn count(&self, action: SyncAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }
}

impl SyncAction {
    pub fn program(self) -> &'static str {
        match self {
            SyncAction::Cloned => "git clone",
            SyncAction::Updated => "git pull",
        }
    }
}

pub fn sync<H>(
    hal: &H,
    repos: &[RoleRepository],
    target_dir: &Path,
) -> Result<SyncReport, ProvisionError>
where
    H: ProcessOps + FileOps + ?Sized,
{
    let mut report = SyncReport::new(target_dir);
    sync_into(hal, repos, &mut report)?;
    Ok(report)
}

/// Like [`sync`], but entries land in a caller-owned report, so the repositories
/// synced before a failure are still listed.
pub fn sync_into<H>(
    hal: &H,
    repos: &[RoleRepository],
    report: &mut SyncReport,
) -> Result<(), ProvisionError>
where
    H: ProcessOps + FileOps + ?Sized,
{
    let target_dir = report.target_dir.clone();
    hal.create_dir_all(&target_dir)
        .map_err(|e| subprocess_failure("mkdir", target_dir.display(), e))?;

    for repo in repos {
        let name = repo.dir_name();
        let dir = target_dir.join(name);
        let dir_arg = dir.display().to_string();

        let action = if hal.path_exists(&dir.join(".git")) {
            log::info!("Updating role {name}");
            hal.command_status(
                "git",
                &["-C", &dir_arg, "pull", "--ff-only", "--quiet"],
                GIT_TIMEOUT,
            )
            .map_err(|e| subprocess_failure("git pull", name, e))?;
            SyncAction::Updated
        } else {
            log::info!("Cloning role {name}");
            hal.command_status(
                "git",
                &["clone", "--quiet", &repo.url, &dir_arg],
                GIT_TIMEOUT,
            )
            .map_err(|e| subprocess_failure("git clone", name, e))?;
            SyncAction::Cloned
        };

        report.entries.push(SyncEntry {
            name: name.to_string(),
            url: repo.url.clone(),
            action,
        });
    }

    log::info!(
        "Synced {} role(s) into {} ({} cloned, {} updated)",
        report.entries.len(),
        target_dir.display(),
        report.count(SyncAction::Cloned),
        report.count(SyncAction::Updated)
    );
    Ok(())
}
