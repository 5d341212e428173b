//! Mounted -> BaseInstalled: base packages, fstab, host records and auxiliary mounts.

use super::context::PhaseContext;
use super::prepare;
use anyhow::Result;
use pantheon_core::hosts::HostProfile;
use pantheon_hal::MountOptions;
use std::time::Duration;

const TIMEDATECTL_TIMEOUT: Duration = Duration::from_secs(30);
const PACSTRAP_TIMEOUT: Duration = Duration::from_secs(90 * 60);
const GENFSTAB_TIMEOUT: Duration = Duration::from_secs(60);
const MDADM_TIMEOUT: Duration = Duration::from_secs(60);

const BASE_PACKAGES: &[&str] = &[
    "base",
    "base-devel",
    "linux-firmware",
    "btrfs-progs",
    "xfsprogs",
    "dosfstools",
    "networkmanager",
    "openssh",
    "sudo",
    "git",
    "vim",
    "man-db",
];

/// Package set handed to pacstrap for `profile`.
pub fn base_packages(profile: &HostProfile) -> Vec<String> {
    let mut packages: Vec<String> = BASE_PACKAGES.iter().map(|p| p.to_string()).collect();
    packages.push(profile.kernel.clone());
    packages.push(format!("{}-headers", profile.kernel));
    packages.extend(profile.extra_packages.iter().cloned());
    if profile.flags.is_workstation {
        packages.push("ansible".to_string());
    }
    packages
}

/// Drop `subvolid=N` from the options column so fstab survives snapshot rollbacks.
pub fn normalize_fstab(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        let mut fields: Vec<String> = line.split_whitespace().map(String::from).collect();
        if let Some(options) = fields.get_mut(3) {
            *options = options
                .split(',')
                .filter(|opt| !opt.starts_with("subvolid="))
                .collect::<Vec<_>>()
                .join(",");
        }
        out.push_str(&fields.join("\t"));
        out.push('\n');
    }
    out
}

pub fn hosts_file(hostname: &str) -> String {
    format!(
        "127.0.0.1\tlocalhost\n::1\t\tlocalhost\n127.0.1.1\t{hostname}.localdomain\t{hostname}\n"
    )
}

fn run(
    ctx: &mut PhaseContext<'_>,
    program: &str,
    args: &[&str],
    target: &str,
    timeout: Duration,
) -> Result<()> {
    let hal = ctx.hal;
    let result = hal.command_status(program, args, timeout);
    ctx.record(program, target, result)?;
    Ok(())
}

fn mount_auxiliary(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let hal = ctx.hal;
    let profile = ctx.profile;
    for aux in &profile.aux_mounts {
        if !hal.device_exists(&aux.device) {
            log::warn!(
                "{}: auxiliary device {} not present; skipping {}",
                profile.host,
                aux.device.display(),
                aux.mountpoint.display()
            );
            continue;
        }
        let target = ctx.target_path(&aux.mountpoint);
        let made = hal.create_dir_all(&target);
        ctx.record("mkdir", target.display(), made)?;
        let mounted = hal.mount_device(
            &aux.device,
            &target,
            Some(aux.fs.fstype()),
            &MountOptions::with_options(aux.options.as_str()),
        );
        ctx.record("mount", target.display(), mounted)?;

        let uuid = hal.blkid_uuid(&aux.device);
        let uuid = ctx.record("blkid", aux.device.display(), uuid)?;
        let line = format!(
            "# {}\nUUID={}\t{}\t{}\t{}\t0 2\n",
            aux.device.display(),
            uuid,
            aux.mountpoint.display(),
            aux.fs.fstype(),
            aux.options
        );
        let fstab = ctx.target_path("/etc/fstab");
        let appended = hal.append_file(&fstab, &line);
        ctx.record("write", fstab.display(), appended)?;
        log::info!(
            "Mounted auxiliary {} at {}",
            aux.device.display(),
            aux.mountpoint.display()
        );
    }
    Ok(())
}

pub fn install_base(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let hal = ctx.hal;
    let profile = ctx.profile;
    let root = ctx.root_arg();

    // Disk phases can take long enough for DHCP leases or wifi to drop.
    prepare::probe_network(ctx)?;

    run(
        ctx,
        "timedatectl",
        &["set-ntp", "true"],
        "system clock",
        TIMEDATECTL_TIMEOUT,
    )?;

    let packages = base_packages(profile);
    log::info!("Installing base system into {}: {}", root, packages.join(" "));
    let mut args: Vec<&str> = vec!["-K", root.as_str()];
    args.extend(packages.iter().map(String::as_str));
    run(ctx, "pacstrap", &args, &root, PACSTRAP_TIMEOUT)?;

    let fstab = ctx.target_path("/etc/fstab");
    let output = hal.command_output("genfstab", &["-U", root.as_str()], GENFSTAB_TIMEOUT);
    let output = ctx.record("genfstab", &root, output)?;
    let table = normalize_fstab(&String::from_utf8_lossy(&output.stdout));
    let written = hal.write_file(&fstab, &table);
    ctx.record("write", fstab.display(), written)?;

    let hostname = profile.host.hostname();
    let path = ctx.target_path("/etc/hostname");
    let written = hal.write_file(&path, &format!("{hostname}\n"));
    ctx.record("write", path.display(), written)?;
    let path = ctx.target_path("/etc/hosts");
    let written = hal.write_file(&path, &hosts_file(&hostname));
    ctx.record("write", path.display(), written)?;

    mount_auxiliary(ctx)?;

    if profile.flags.has_raid {
        let scan = hal.command_output("mdadm", &["--detail", "--scan"], MDADM_TIMEOUT);
        let scan = ctx.record("mdadm", "raid arrays", scan)?;
        let conf = ctx.target_path("/etc/mdadm.conf");
        let appended = hal.append_file(&conf, &String::from_utf8_lossy(&scan.stdout));
        ctx.record("write", conf.display(), appended)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantheon_core::hosts::resolve;

    #[test]
    fn normalize_drops_subvolid_only() {
        let raw = "# /dev/nvme0n1p2 LABEL=ROOT\n\
            UUID=abc\t/\tbtrfs\trw,noatime,compress=zstd:3,subvolid=256,subvol=/@\t0 0\n\
            \n\
            UUID=def  /boot  vfat  rw,umask=0077  0 2\n";
        let out = normalize_fstab(raw);
        assert!(!out.contains("subvolid"));
        assert!(out.contains("rw,noatime,compress=zstd:3,subvol=/@"));
        assert!(out.contains("UUID=def\t/boot\tvfat\trw,umask=0077\t0\t2"));
        assert!(out.starts_with("# /dev/nvme0n1p2 LABEL=ROOT\n"));
    }

    #[test]
    fn packages_follow_host_selection() {
        let aster = base_packages(&resolve("ASTER").unwrap());
        assert!(aster.contains(&"linux-zen".to_string()));
        assert!(aster.contains(&"linux-zen-headers".to_string()));
        assert!(aster.contains(&"intel-ucode".to_string()));
        assert!(aster.contains(&"ansible".to_string()));

        let themis = base_packages(&resolve("THEMIS").unwrap());
        assert!(themis.contains(&"linux-lts".to_string()));
        assert!(themis.contains(&"mdadm".to_string()));
        assert!(!themis.contains(&"ansible".to_string()));
    }

    #[test]
    fn hosts_file_names_host() {
        let hosts = hosts_file("themis");
        assert!(hosts.contains("127.0.1.1\tthemis.localdomain\tthemis"));
    }
}
