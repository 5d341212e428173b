//! Provisioning pipeline.
//!
//! Seven phases, each advancing [`ProvisionState`] by one step. The first failure stops
//! the run; nothing already done to the disks is rolled back.

mod base;
mod chroot;
pub mod context;
mod disks;
mod mounts;
mod prepare;

pub use base::{base_packages, hosts_file, normalize_fstab};
pub use chroot::{boot_entry, loader_conf, PLAYBOOK_COMMAND};
pub use context::{target_path, OperationRecord, PhaseContext};

use crate::stage_runner::{PhaseDefinition, PhaseRunner, ProvisionState};
use anyhow::Result;

pub fn phase_definitions<'a>() -> Vec<PhaseDefinition<'static, PhaseContext<'a>>> {
    vec![
        PhaseDefinition {
            name: "network readiness",
            reaches: ProvisionState::NetworkReady,
            run: Box::new(prepare::network_ready),
        },
        PhaseDefinition {
            name: "low-level format",
            reaches: ProvisionState::Formatted,
            run: Box::new(disks::low_level_format),
        },
        PhaseDefinition {
            name: "partition",
            reaches: ProvisionState::Partitioned,
            run: Box::new(disks::partition),
        },
        PhaseDefinition {
            name: "filesystems",
            reaches: ProvisionState::FilesystemsBuilt,
            run: Box::new(disks::build_filesystems),
        },
        PhaseDefinition {
            name: "mount",
            reaches: ProvisionState::Mounted,
            run: Box::new(mounts::mount_targets),
        },
        PhaseDefinition {
            name: "base install",
            reaches: ProvisionState::BaseInstalled,
            run: Box::new(base::install_base),
        },
        PhaseDefinition {
            name: "chroot handoff",
            reaches: ProvisionState::ChrootHandoff,
            run: Box::new(chroot::chroot_handoff),
        },
    ]
}

/// Run every phase for the host in `ctx`, then mark the run done.
pub fn provision(
    ctx: &mut PhaseContext<'_>,
    runner: &mut PhaseRunner,
) -> Result<ProvisionState> {
    log::info!(
        "Provisioning {} ({:?}, drives: {})",
        ctx.profile.host,
        ctx.profile.class,
        ctx.profile
            .drives
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if let Ok(json) = serde_json::to_string(ctx.profile) {
        log::debug!("Host profile: {json}");
    }

    let phases = phase_definitions();
    runner.run(ctx, &phases)?;
    let state = runner.finish()?;
    log::info!("{} provisioned", ctx.profile.host);
    Ok(state)
}
