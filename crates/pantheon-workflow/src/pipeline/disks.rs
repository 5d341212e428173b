//! Destructive disk phases: low-level format, partitioning and filesystem creation.

use super::context::PhaseContext;
use crate::guard::DestructiveToken;
use anyhow::{Context, Result};
use pantheon_core::hosts::{FormatTarget, FsKind, PartitionRole, PartitionTarget};
use pantheon_error::ProvisionError;
use pantheon_hal::{MountGuard, MountOptions, PartedOp};
use std::path::Path;

/// Refuse to touch a drive that still has something mounted from it.
fn ensure_idle(ctx: &PhaseContext<'_>, drive: &Path) -> Result<()> {
    let mounted = ctx
        .hal
        .mounted_from(drive)
        .with_context(|| format!("Failed to check mounts on {}", drive.display()))?;
    if !mounted.is_empty() {
        return Err(ProvisionError::PreconditionFailure(format!(
            "{} is in use (mounted at {})",
            drive.display(),
            mounted.join(", ")
        ))
        .into());
    }
    Ok(())
}

/// Unmount leftovers of an earlier attempt below the staging root.
fn release_staging_root(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let hal = ctx.hal;
    let root = ctx.settings.target_root.clone();
    let released = hal.unmount_recursive(&root);
    ctx.record("umount", root.display(), released)?;
    Ok(())
}

fn show_layout(ctx: &PhaseContext<'_>, drive: &Path) {
    match ctx.hal.lsblk_table(drive) {
        Ok(table) => log::info!("Current layout of {}:\n{}", drive.display(), table.trim_end()),
        Err(err) => log::warn!("Could not read layout of {}: {}", drive.display(), err),
    }
}

/// NetworkReady -> Formatted.
pub fn low_level_format(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let profile = ctx.profile;
    let drives = profile.format_drives();
    if drives.is_empty() {
        log::info!(
            "{}: low-level format bypassed for pre-existing drive topology",
            profile.host
        );
        return Ok(());
    }

    let token = ctx.guard.authorize("low-level format", profile)?;
    release_staging_root(ctx)?;
    let hal = ctx.hal;
    for drive in drives {
        ensure_idle(ctx, drive)?;
        log::info!("Formatting {} (nvme format --ses=1)", drive.display());
        let result = hal.nvme_format(drive, &token.format_options());
        ctx.record("nvme format", drive.display(), result)?;
    }
    let settled = hal.udev_settle();
    ctx.record("udevadm settle", "udev", settled)?;
    Ok(())
}

fn partition_drive(
    ctx: &mut PhaseContext<'_>,
    token: &DestructiveToken,
    target: &PartitionTarget,
) -> Result<()> {
    let hal = ctx.hal;
    let drive = target.drive.as_path();
    ensure_idle(ctx, drive)?;

    let wiped = hal.wipefs_all(drive, &token.wipefs_options());
    ctx.record("wipefs", drive.display(), wiped)?;

    let mut ops = vec![PartedOp::MkLabel {
        label: "gpt".to_string(),
    }];
    for part in target.layout.partitions() {
        ops.push(PartedOp::MkPart {
            name: part.role.part_name().to_string(),
            fs_type: part.role.fs().parted_type().to_string(),
            start: part.start.to_string(),
            end: part.end.to_string(),
        });
        if part.role == PartitionRole::Boot {
            ops.push(PartedOp::SetFlag {
                part_num: part.number,
                flag: "esp".to_string(),
                state: "on".to_string(),
            });
        }
    }
    for op in &ops {
        let result = hal.parted(drive, op, &token.parted_options());
        ctx.record("parted", drive.display(), result)?;
    }
    log::info!(
        "Partitioned {} ({})",
        drive.display(),
        target
            .produced()
            .iter()
            .map(|(dev, role)| format!("{} {:?}", dev.display(), role))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

/// Formatted -> Partitioned.
pub fn partition(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let profile = ctx.profile;
    for drive in &profile.drives {
        show_layout(ctx, drive);
    }
    let token = ctx.guard.authorize("repartition", profile)?;
    release_staging_root(ctx)?;

    let effective = profile.effective_partitions();
    for target in effective {
        partition_drive(ctx, &token, target)?;
    }
    if effective.len() < profile.partitions.len() {
        log::info!(
            "{}: minimum partition set complete after {} of {} targets",
            profile.host,
            effective.len(),
            profile.partitions.len()
        );
    }

    let hal = ctx.hal;
    let settled = hal.udev_settle();
    ctx.record("udevadm settle", "udev", settled)?;
    ctx.partition_token = Some(token);
    Ok(())
}

fn create_subvolumes(ctx: &mut PhaseContext<'_>, fs: &FormatTarget) -> Result<()> {
    let hal = ctx.hal;
    let top = ctx.settings.target_root.clone();
    let made = hal.create_dir_all(&top);
    ctx.record("mkdir", top.display(), made)?;
    let mounted = hal.mount_device(
        &fs.device,
        &top,
        Some(FsKind::Btrfs.fstype()),
        &MountOptions::new(),
    );
    ctx.record("mount", fs.device.display(), mounted)?;

    let guard = MountGuard::new(hal, top.clone());
    for name in &fs.subvolumes {
        let path = top.join(name);
        let created = hal.btrfs_subvolume_create(&path);
        ctx.record("btrfs subvolume create", path.display(), created)?;
    }
    drop(guard);
    Ok(())
}

fn build_filesystem(
    ctx: &mut PhaseContext<'_>,
    token: &DestructiveToken,
    fs: &FormatTarget,
) -> Result<()> {
    let hal = ctx.hal;
    let opts = token.format_options().with_args(fs.mkfs_args.clone());
    let device = fs.device.as_path();
    log::info!(
        "Creating {} on {} (label {})",
        fs.fs.fstype(),
        device.display(),
        fs.label
    );
    let (program, result) = match fs.fs {
        FsKind::Vfat => ("mkfs.fat", hal.format_vfat(device, &fs.label, &opts)),
        FsKind::Btrfs => ("mkfs.btrfs", hal.format_btrfs(device, &fs.label, &opts)),
        FsKind::Xfs => ("mkfs.xfs", hal.format_xfs(device, &fs.label, &opts)),
    };
    ctx.record(program, device.display(), result)?;

    if !fs.subvolumes.is_empty() {
        create_subvolumes(ctx, fs)?;
    }
    Ok(())
}

/// Partitioned -> FilesystemsBuilt.
pub fn build_filesystems(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let profile = ctx.profile;
    let token = ctx.partition_token.take().ok_or_else(|| {
        ProvisionError::PreconditionFailure(
            "filesystems can only be built on freshly partitioned drives".to_string(),
        )
    })?;

    let effective = profile.effective_filesystems();
    for fs in effective {
        build_filesystem(ctx, &token, fs)?;
    }
    if effective.len() < profile.filesystems.len() {
        log::info!(
            "{}: minimum filesystem set built ({} of {})",
            profile.host,
            effective.len(),
            profile.filesystems.len()
        );
    }
    let hal = ctx.hal;
    let synced = hal.sync();
    ctx.record("sync", "block devices", synced)?;
    Ok(())
}
