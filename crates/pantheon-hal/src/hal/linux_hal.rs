//! Linux HAL implementation using real system calls and subprocesses.

use super::{
    BtrfsOps, FileOps, FormatOps, FormatOptions, MountOps, MountOptions, PartedOp, PartedOptions,
    PartitionOps, ProbeOps, ProcessOps, SystemOps, WipeFsOptions,
};
use crate::procfs::mountinfo;
use crate::{HalError, HalResult};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Real HAL implementation for Linux systems.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal;

impl LinuxHal {
    pub fn new() -> Self {
        Self
    }
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const SYNC_TIMEOUT: Duration = Duration::from_secs(60);
const NVME_FORMAT_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const MKFS_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const WIPEFS_TIMEOUT: Duration = Duration::from_secs(60);
const PARTED_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const BTRFS_TIMEOUT: Duration = Duration::from_secs(60);

fn map_command_err(program: &str, err: std::io::Error) -> HalError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

fn output_failed(program: &str, output: &Output) -> HalError {
    HalError::CommandFailed {
        program: program.to_string(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

fn output_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> HalResult<Output> {
    // Nothing the pipeline runs non-interactively may wait on the operator's terminal.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Drain pipes concurrently to avoid deadlocks on large output (pacstrap is chatty).
    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout.take() {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr.take() {
            let _ = err.read_to_end(&mut buf);
        }
        buf
    });

    let status = match child.wait_timeout(timeout).map_err(HalError::Io)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_handle.join();
            let _ = stderr_handle.join();
            return Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

fn status_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> HalResult<()> {
    let output = output_with_timeout(program, cmd, timeout)?;
    if !output.status.success() {
        return Err(output_failed(program, &output));
    }
    Ok(())
}

fn map_nix_err(err: nix::errno::Errno) -> HalError {
    use nix::errno::Errno;
    match err {
        Errno::EBUSY => HalError::DiskBusy,
        Errno::EACCES | Errno::EPERM => HalError::PermissionDenied,
        other => HalError::Nix(other),
    }
}

fn read_mountinfo() -> HalResult<Vec<mountinfo::MountInfo>> {
    let content = fs::read_to_string("/proc/self/mountinfo")?;
    Ok(mountinfo::parse_mountinfo(&content))
}

fn mkfs(program: &str, args: Vec<String>, device: &Path, opts: &FormatOptions) -> HalResult<()> {
    if !opts.confirmed {
        return Err(HalError::SafetyLock);
    }
    log::info!("{} {}", program, device.display());

    let mut cmd = Command::new(program);
    cmd.args(&args)
        .args(&opts.extra_args)
        .arg(device);
    status_with_timeout(program, &mut cmd, MKFS_TIMEOUT)
}

impl ProcessOps for LinuxHal {
    fn command_output_with_cwd(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> HalResult<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        output_with_timeout(program, &mut cmd, timeout)
    }

    fn command_status_with_cwd(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> HalResult<()> {
        let output = self.command_output_with_cwd(program, args, cwd, timeout)?;
        if !output.status.success() {
            return Err(output_failed(program, &output));
        }
        Ok(())
    }

    fn command_interactive(&self, program: &str, args: &[&str]) -> HalResult<()> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| map_command_err(program, e))?;
        if !status.success() {
            return Err(HalError::CommandFailed {
                program: program.to_string(),
                code: status.code(),
                stderr: String::new(),
            });
        }
        Ok(())
    }
}

impl MountOps for LinuxHal {
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: &MountOptions,
    ) -> HalResult<()> {
        let (flags, data) = options.split();
        nix::mount::mount(Some(device), target, fstype, flags, data.as_deref())
            .map_err(map_nix_err)?;
        Ok(())
    }

    fn unmount(&self, target: &Path) -> HalResult<()> {
        nix::mount::umount2(target, nix::mount::MntFlags::empty()).map_err(map_nix_err)?;
        Ok(())
    }

    fn unmount_recursive(&self, target: &Path) -> HalResult<()> {
        let entries = read_mountinfo()?;
        for mp in mountinfo::mounted_below(&entries, target) {
            nix::mount::umount2(&mp, nix::mount::MntFlags::empty()).map_err(map_nix_err)?;
        }
        Ok(())
    }

    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        let entries = read_mountinfo()?;
        Ok(mountinfo::is_mounted_from_info(path, &entries))
    }
}

impl FormatOps for LinuxHal {
    fn nvme_format(&self, drive: &Path, opts: &FormatOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        log::info!("nvme format {}", drive.display());

        let mut cmd = Command::new("nvme");
        cmd.arg("format")
            .arg(drive)
            .args(["--ses=1", "--force"])
            .args(&opts.extra_args);
        status_with_timeout("nvme", &mut cmd, NVME_FORMAT_TIMEOUT)
    }

    fn format_vfat(&self, device: &Path, label: &str, opts: &FormatOptions) -> HalResult<()> {
        let args = vec![
            "-F".to_string(),
            "32".to_string(),
            "-n".to_string(),
            label.to_string(),
        ];
        mkfs("mkfs.fat", args, device, opts)
    }

    fn format_btrfs(&self, device: &Path, label: &str, opts: &FormatOptions) -> HalResult<()> {
        let args = vec!["-f".to_string(), "-L".to_string(), label.to_string()];
        mkfs("mkfs.btrfs", args, device, opts)
    }

    fn format_xfs(&self, device: &Path, label: &str, opts: &FormatOptions) -> HalResult<()> {
        let args = vec![
            "-f".to_string(),
            "-m".to_string(),
            "crc=1".to_string(),
            "-L".to_string(),
            label.to_string(),
        ];
        mkfs("mkfs.xfs", args, device, opts)
    }
}

impl PartitionOps for LinuxHal {
    fn wipefs_all(&self, disk: &Path, opts: &WipeFsOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut cmd = Command::new("wipefs");
        cmd.arg("-a").arg(disk);
        status_with_timeout("wipefs", &mut cmd, WIPEFS_TIMEOUT)
    }

    fn parted(&self, disk: &Path, op: &PartedOp, opts: &PartedOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut cmd = Command::new("parted");
        cmd.arg("-s").arg(disk).args(op.args());
        status_with_timeout("parted", &mut cmd, PARTED_TIMEOUT)
    }
}

impl BtrfsOps for LinuxHal {
    fn btrfs_subvolume_create(&self, path: &Path) -> HalResult<()> {
        let mut cmd = Command::new("btrfs");
        cmd.args(["subvolume", "create"]).arg(path);
        status_with_timeout("btrfs", &mut cmd, BTRFS_TIMEOUT)
    }
}

impl ProbeOps for LinuxHal {
    fn device_exists(&self, device: &Path) -> bool {
        device.exists()
    }

    fn lsblk_table(&self, disk: &Path) -> HalResult<String> {
        let mut cmd = Command::new("lsblk");
        cmd.args(["-o", "NAME,SIZE,TYPE,FSTYPE,MOUNTPOINTS,MODEL"])
            .arg(disk);
        let output = output_with_timeout("lsblk", &mut cmd, PROBE_TIMEOUT)?;

        if !output.status.success() {
            return Err(output_failed("lsblk", &output));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn blkid_uuid(&self, device: &Path) -> HalResult<String> {
        let mut cmd = Command::new("blkid");
        cmd.args(["-s", "UUID", "-o", "value"]).arg(device);
        let output = output_with_timeout("blkid", &mut cmd, PROBE_TIMEOUT)?;

        if !output.status.success() {
            return Err(output_failed("blkid", &output));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn mounted_from(&self, disk: &Path) -> HalResult<Vec<String>> {
        let entries = read_mountinfo()?;
        Ok(mountinfo::mounted_under_device(&entries, disk))
    }
}

impl FileOps for LinuxHal {
    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> HalResult<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> HalResult<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn write_file(&self, path: &Path, contents: &str) -> HalResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    fn append_file(&self, path: &Path, contents: &str) -> HalResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> HalResult<()> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
        Ok(())
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> HalResult<()> {
        for entry in walkdir::WalkDir::new(src).follow_links(false) {
            let entry = entry.map_err(|e| HalError::Other(e.to_string()))?;
            let rel = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| HalError::Other(e.to_string()))?;
            let out = dst.join(rel);
            let file_type = entry.file_type();
            if file_type.is_dir() {
                fs::create_dir_all(&out)?;
            } else if file_type.is_symlink() {
                let link = fs::read_link(entry.path())?;
                if out.symlink_metadata().is_ok() {
                    fs::remove_file(&out)?;
                }
                std::os::unix::fs::symlink(link, &out)?;
            } else {
                fs::copy(entry.path(), &out)?;
            }
        }
        Ok(())
    }
}

impl SystemOps for LinuxHal {
    fn is_root(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn sync(&self) -> HalResult<()> {
        let mut cmd = Command::new("sync");
        status_with_timeout("sync", &mut cmd, SYNC_TIMEOUT)
    }

    fn udev_settle(&self) -> HalResult<()> {
        let mut cmd = Command::new("udevadm");
        cmd.arg("settle");
        status_with_timeout("udevadm", &mut cmd, SYNC_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn format_btrfs_requires_confirmation() {
        let hal = LinuxHal::new();
        let opts = FormatOptions::new(false);
        let err = hal
            .format_btrfs(Path::new("/dev/null"), "ROOT", &opts)
            .unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));
    }

    #[test]
    fn nvme_format_requires_confirmation() {
        let hal = LinuxHal::new();
        let err = hal
            .nvme_format(Path::new("/dev/null"), &FormatOptions::new(false))
            .unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));
    }

    #[test]
    fn parted_requires_confirmation() {
        let hal = LinuxHal::new();
        let op = PartedOp::MkLabel {
            label: "gpt".to_string(),
        };
        let err = hal
            .parted(Path::new("/dev/null"), &op, &PartedOptions::new(false))
            .unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));
    }

    #[test]
    fn missing_program_maps_to_command_not_found() {
        let hal = LinuxHal::new();
        let err = hal
            .command_status(
                "pantheon-definitely-missing-binary",
                &[],
                Duration::from_secs(1),
            )
            .unwrap_err();
        assert!(matches!(err, HalError::CommandNotFound(_)));
    }

    #[test]
    fn failing_command_reports_exit_code() {
        let hal = LinuxHal::new();
        let err = hal
            .command_status("sh", &["-c", "echo boom >&2; exit 3"], Duration::from_secs(5))
            .unwrap_err();
        match err {
            HalError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn command_times_out() {
        let hal = LinuxHal::new();
        let err = hal
            .command_status("sleep", &["5"], Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, HalError::CommandTimeout { .. }));
    }

    #[test]
    fn write_and_append_create_parents() {
        let dir = tempdir().unwrap();
        let hal = LinuxHal::new();
        let path = dir.path().join("etc/hosts");
        hal.write_file(&path, "a\n").unwrap();
        hal.append_file(&path, "b\n").unwrap();
        assert_eq!(hal.read_to_string(&path).unwrap(), "a\nb\n");
    }

    #[test]
    fn copy_tree_copies_nested_files() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("ansible");
        std::fs::create_dir_all(src.join("roles/base/tasks")).unwrap();
        std::fs::write(src.join("site.yml"), "- hosts: all\n").unwrap();
        std::fs::write(src.join("roles/base/tasks/main.yml"), "---\n").unwrap();

        let dst = dir.path().join("mnt/root/ansible");
        LinuxHal::new().copy_tree(&src, &dst).unwrap();

        assert!(dst.join("site.yml").is_file());
        assert!(dst.join("roles/base/tasks/main.yml").is_file());
    }
}
