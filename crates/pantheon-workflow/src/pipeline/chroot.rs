//! BaseInstalled -> ChrootHandoff: in-target configuration and operator handoff.

use super::context::PhaseContext;
use anyhow::Result;
use pantheon_core::hosts::HostProfile;
use pantheon_core::settings::{KEYMAP, LOCALE, TIMEZONE};
use pantheon_error::ProvisionError;
use std::path::Path;
use std::time::Duration;

const CHROOT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const PLAYBOOK_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub const LIVE_PACMAN_CONF: &str = "/etc/pacman.conf";
pub const PLAYBOOK_COMMAND: &str =
    "cd /root/ansible && ansible-playbook -i localhost, -c local site.yml --tags users,desktop";

pub fn loader_conf() -> String {
    "default arch.conf\ntimeout 3\n".to_string()
}

pub fn boot_entry(profile: &HostProfile, root_uuid: &str) -> String {
    let mut entry = format!("title   Arch Linux ({})\n", profile.host);
    entry.push_str(&format!("linux   /vmlinuz-{}\n", profile.kernel));
    for image in profile.microcode_images() {
        entry.push_str(&format!("initrd  {image}\n"));
    }
    entry.push_str(&format!("initrd  /initramfs-{}.img\n", profile.kernel));
    entry.push_str(&format!(
        "options root=UUID={root_uuid} rootflags=subvol=@ rw\n"
    ));
    entry
}

fn chroot(ctx: &mut PhaseContext<'_>, step: &str, cmd: &[&str], timeout: Duration) -> Result<()> {
    let hal = ctx.hal;
    let root = ctx.root_arg();
    let mut args = vec![root.as_str()];
    args.extend_from_slice(cmd);
    log::info!("chroot: {}", cmd.join(" "));
    let result = hal.command_status("arch-chroot", &args, timeout);
    ctx.record("arch-chroot", step, result)?;
    Ok(())
}

fn write_target(ctx: &mut PhaseContext<'_>, abs: &str, contents: &str) -> Result<()> {
    let hal = ctx.hal;
    let path = ctx.target_path(abs);
    if let Some(parent) = path.parent() {
        let made = hal.create_dir_all(parent);
        ctx.record("mkdir", parent.display(), made)?;
    }
    let written = hal.write_file(&path, contents);
    ctx.record("write", path.display(), written)?;
    Ok(())
}

fn configure_system(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let zoneinfo = format!("/usr/share/zoneinfo/{TIMEZONE}");
    chroot(
        ctx,
        "timezone",
        &["ln", "-sf", zoneinfo.as_str(), "/etc/localtime"],
        CHROOT_TIMEOUT,
    )?;
    chroot(ctx, "hardware clock", &["hwclock", "--systohc"], CHROOT_TIMEOUT)?;

    let hal = ctx.hal;
    let locale_gen = ctx.target_path("/etc/locale.gen");
    let appended = hal.append_file(&locale_gen, &format!("{LOCALE} UTF-8\n"));
    ctx.record("write", locale_gen.display(), appended)?;
    write_target(ctx, "/etc/locale.conf", &format!("LANG={LOCALE}\n"))?;
    write_target(ctx, "/etc/vconsole.conf", &format!("KEYMAP={KEYMAP}\n"))?;
    chroot(ctx, "locale", &["locale-gen"], CHROOT_TIMEOUT)?;
    Ok(())
}

fn install_boot_loader(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let profile = ctx.profile;
    chroot(ctx, "boot loader", &["bootctl", "install"], CHROOT_TIMEOUT)?;

    let root_mount = profile.root_mount().ok_or_else(|| {
        ProvisionError::PreconditionFailure(format!("{} has no root mount", profile.host))
    })?;
    let hal = ctx.hal;
    let uuid = hal.blkid_uuid(&root_mount.device);
    let uuid = ctx.record("blkid", root_mount.device.display(), uuid)?;

    write_target(ctx, "/boot/loader/loader.conf", &loader_conf())?;
    write_target(
        ctx,
        "/boot/loader/entries/arch.conf",
        &boot_entry(profile, &uuid),
    )?;
    chroot(ctx, "initramfs", &["mkinitcpio", "-P"], CHROOT_TIMEOUT)?;
    Ok(())
}

fn apply_roles(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let hal = ctx.hal;
    let source = ctx.settings.ansible_dir();
    if !hal.path_exists(&source) {
        return Err(ProvisionError::PreconditionFailure(format!(
            "configuration tree {} is missing",
            source.display()
        ))
        .into());
    }
    let dest = ctx.target_path("/root/ansible");
    let copied = hal.copy_tree(&source, &dest);
    ctx.record("cp", dest.display(), copied)?;

    log::info!("{}: applying user and desktop roles", ctx.profile.host);
    chroot(
        ctx,
        "configuration roles",
        &["/bin/bash", "-c", PLAYBOOK_COMMAND],
        PLAYBOOK_TIMEOUT,
    )
}

pub fn chroot_handoff(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let hal = ctx.hal;
    let profile = ctx.profile;

    let pacman_conf = ctx.target_path(LIVE_PACMAN_CONF);
    let copied = hal.copy_file(Path::new(LIVE_PACMAN_CONF), &pacman_conf);
    ctx.record("cp", pacman_conf.display(), copied)?;

    configure_system(ctx)?;
    install_boot_loader(ctx)?;

    if profile.flags.is_workstation {
        apply_roles(ctx)?;
    } else {
        log::info!("{}: server class, no desktop roles", profile.host);
    }

    let root = ctx.root_arg();
    log::info!("Entering interactive chroot in {root}; exit the shell to finish");
    let session = hal.command_interactive("arch-chroot", &[root.as_str()]);
    ctx.record("arch-chroot", "interactive session", session)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantheon_core::hosts::resolve;

    #[test]
    fn boot_entry_lists_microcode_before_initramfs() {
        let entry = boot_entry(&resolve("ASTER").unwrap(), "1234-abcd");
        let lines: Vec<&str> = entry.lines().collect();
        assert_eq!(lines[1], "linux   /vmlinuz-linux-zen");
        assert_eq!(lines[2], "initrd  /intel-ucode.img");
        assert_eq!(lines[3], "initrd  /initramfs-linux-zen.img");
        assert_eq!(lines[4], "options root=UUID=1234-abcd rootflags=subvol=@ rw");
    }

    #[test]
    fn loader_defaults_to_arch_entry() {
        assert_eq!(loader_conf(), "default arch.conf\ntimeout 3\n");
    }
}
