//! FilesystemsBuilt -> Mounted.

use super::context::PhaseContext;
use anyhow::{Context, Result};
use pantheon_error::ProvisionError;
use pantheon_hal::MountOptions;

pub fn mount_targets(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let hal = ctx.hal;
    let profile = ctx.profile;
    let root = ctx.settings.target_root.clone();

    let busy = hal
        .is_mounted(&root)
        .with_context(|| format!("Failed to check whether {} is mounted", root.display()))?;
    if busy {
        return Err(ProvisionError::PreconditionFailure(format!(
            "staging root {} is already mounted",
            root.display()
        ))
        .into());
    }

    for mount in &profile.mounts {
        let target = ctx.target_path(&mount.mountpoint);
        if mount.create_dir {
            let made = hal.create_dir_all(&target);
            ctx.record("mkdir", target.display(), made)?;
        }
        log::info!(
            "Mounting {} at {} ({}, {})",
            mount.device.display(),
            target.display(),
            mount.fs.fstype(),
            mount.options
        );
        let mounted = hal.mount_device(
            &mount.device,
            &target,
            Some(mount.fs.fstype()),
            &MountOptions::with_options(mount.options.as_str()),
        );
        ctx.record("mount", target.display(), mounted)?;
    }
    Ok(())
}
