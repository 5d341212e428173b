//! Fake HAL implementation for testing.
//!
//! This implementation records all operations without executing them,
//! allowing for CI-safe testing without root privileges or real hardware.
//! A handful of scripting hooks (failure injection, canned stdout, present
//! devices, seeded files) let tests model the machine being provisioned.

use super::{
    BtrfsOps, FileOps, FormatOps, FormatOptions, MountOps, MountOptions, PartedOp, PartedOptions,
    PartitionOps, ProbeOps, ProcessOps, SystemOps, WipeFsOptions,
};
use crate::procfs::mountinfo;
use crate::{HalError, HalResult};
use std::collections::{BTreeMap, HashMap, HashSet};
#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Command {
        program: String,
        args: Vec<String>,
        cwd: Option<PathBuf>,
    },
    Interactive {
        program: String,
        args: Vec<String>,
    },
    Mount {
        device: PathBuf,
        target: PathBuf,
        fstype: Option<String>,
        options: Option<String>,
    },
    Unmount {
        target: PathBuf,
    },
    NvmeFormat {
        drive: PathBuf,
    },
    FormatVfat {
        device: PathBuf,
        label: String,
    },
    FormatBtrfs {
        device: PathBuf,
        label: String,
    },
    FormatXfs {
        device: PathBuf,
        label: String,
    },
    WipeFsAll {
        disk: PathBuf,
    },
    Parted {
        disk: PathBuf,
        op: PartedOp,
    },
    BtrfsSubvolumeCreate {
        path: PathBuf,
    },
    CreateDir {
        path: PathBuf,
    },
    WriteFile {
        path: PathBuf,
    },
    AppendFile {
        path: PathBuf,
    },
    CopyFile {
        src: PathBuf,
        dst: PathBuf,
    },
    CopyTree {
        src: PathBuf,
        dst: PathBuf,
    },
    LsblkTable {
        disk: PathBuf,
    },
    BlkidUuid {
        device: PathBuf,
    },
    Sync,
    UdevSettle,
}

impl Operation {
    /// Program name a real backend would spawn for this operation.
    pub fn program(&self) -> &str {
        match self {
            Operation::Command { program, .. } | Operation::Interactive { program, .. } => program,
            Operation::Mount { .. } => "mount",
            Operation::Unmount { .. } => "umount",
            Operation::NvmeFormat { .. } => "nvme",
            Operation::FormatVfat { .. } => "mkfs.fat",
            Operation::FormatBtrfs { .. } => "mkfs.btrfs",
            Operation::FormatXfs { .. } => "mkfs.xfs",
            Operation::WipeFsAll { .. } => "wipefs",
            Operation::Parted { .. } => "parted",
            Operation::BtrfsSubvolumeCreate { .. } => "btrfs",
            Operation::CreateDir { .. } => "mkdir",
            Operation::WriteFile { .. } | Operation::AppendFile { .. } => "write",
            Operation::CopyFile { .. } | Operation::CopyTree { .. } => "cp",
            Operation::LsblkTable { .. } => "lsblk",
            Operation::BlkidUuid { .. } => "blkid",
            Operation::Sync => "sync",
            Operation::UdevSettle => "udevadm",
        }
    }
}

#[derive(Debug, Clone)]
struct FailRule {
    program: String,
    needle: Option<String>,
    remaining: Option<u32>,
}

/// Shared state for FakeHal operations.
#[derive(Debug, Clone, Default)]
struct FakeHalState {
    /// All operations that were recorded
    operations: Vec<Operation>,
    /// Currently mounted paths and the device behind each
    mounted_paths: BTreeMap<PathBuf, PathBuf>,
    /// Block devices reported as present
    devices: HashSet<PathBuf>,
    /// In-memory file contents
    files: BTreeMap<PathBuf, String>,
    /// Directories known to exist
    dirs: HashSet<PathBuf>,
    /// Canned stdout per program
    stdout: HashMap<String, String>,
    fail_rules: Vec<FailRule>,
    not_root: bool,
}

/// Fake HAL implementation that records operations without executing them.
///
/// This is designed for testing and CI environments where real system
/// operations would fail or be dangerous.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeHalState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.lock().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.lock().operations.iter().any(check)
    }

    /// Recorded `Command` invocations of `program`, as argument vectors.
    pub fn commands(&self, program: &str) -> Vec<Vec<String>> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Command {
                    program: p, args, ..
                } if p == program => Some(args.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear all recorded operations.
    pub fn clear(&self) {
        self.lock().operations.clear();
    }

    /// Fail every operation of `program` whose arguments contain `needle`.
    pub fn fail_on(&self, program: &str, needle: Option<&str>) {
        self.lock().fail_rules.push(FailRule {
            program: program.to_string(),
            needle: needle.map(String::from),
            remaining: None,
        });
    }

    /// Fail the next `times` operations of `program`, then succeed.
    pub fn fail_times(&self, program: &str, times: u32) {
        self.lock().fail_rules.push(FailRule {
            program: program.to_string(),
            needle: None,
            remaining: Some(times),
        });
    }

    /// Canned stdout returned by every invocation of `program`.
    pub fn set_stdout(&self, program: &str, stdout: &str) {
        self.lock()
            .stdout
            .insert(program.to_string(), stdout.to_string());
    }

    /// Report `device` as present.
    pub fn add_device(&self, device: impl Into<PathBuf>) {
        self.lock().devices.insert(device.into());
    }

    /// Seed a mount that already exists before the run, without recording it.
    pub fn add_mount(&self, device: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        self.lock().mounted_paths.insert(target.into(), device.into());
    }

    /// Seed a file (e.g. the live system's `/etc/pacman.conf`).
    pub fn add_file(&self, path: impl Into<PathBuf>, contents: &str) {
        self.lock().files.insert(path.into(), contents.to_string());
    }

    /// Seed an existing directory.
    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        self.lock().dirs.insert(path.into());
    }

    /// Current contents of an in-memory file.
    pub fn file(&self, path: &Path) -> Option<String> {
        self.lock().files.get(path).cloned()
    }

    pub fn set_root(&self, is_root: bool) {
        self.lock().not_root = !is_root;
    }

    fn record_operation(&self, op: Operation) {
        self.lock().operations.push(op);
    }

    /// Record `op` unless a failure rule matches it.
    fn attempt(&self, op: Operation, args: &[String]) -> HalResult<()> {
        let mut state = self.lock();
        let program = op.program().to_string();
        state.operations.push(op);

        let mut failed = false;
        for rule in state.fail_rules.iter_mut() {
            if rule.program != program {
                continue;
            }
            if let Some(needle) = &rule.needle {
                if !args.iter().any(|a| a.contains(needle.as_str())) {
                    continue;
                }
            }
            match rule.remaining.as_mut() {
                Some(0) => continue,
                Some(n) => *n -= 1,
                None => {}
            }
            failed = true;
            break;
        }
        if failed {
            log::info!("FAKE HAL: injected failure for {} {:?}", program, args);
            return Err(HalError::CommandFailed {
                program,
                code: Some(1),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    /// Model the side effect of a successful `git clone <url> <dir>`.
    fn apply_command_effects(&self, program: &str, args: &[String]) {
        if program != "git" {
            return;
        }
        if let Some(pos) = args.iter().position(|a| a == "clone") {
            if let Some(dir) = args.iter().skip(pos + 1).filter(|a| !a.starts_with('-')).nth(1) {
                let dir = PathBuf::from(dir);
                let mut state = self.lock();
                state.dirs.insert(dir.join(".git"));
                state.dirs.insert(dir);
            }
        }
    }
}

fn path_arg(path: &Path) -> Vec<String> {
    vec![path.display().to_string()]
}

impl ProcessOps for FakeHal {
    fn command_output_with_cwd(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        _timeout: Duration,
    ) -> HalResult<Output> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.attempt(
            Operation::Command {
                program: program.to_string(),
                args: args.clone(),
                cwd: cwd.map(Path::to_path_buf),
            },
            &args,
        )?;
        self.apply_command_effects(program, &args);

        let stdout = self.lock().stdout.get(program).cloned().unwrap_or_default();
        #[cfg(unix)]
        let status = std::process::ExitStatus::from_raw(0);
        #[cfg(not(unix))]
        let status = std::process::Command::new("true").status()?;

        Ok(Output {
            status,
            stdout: stdout.into_bytes(),
            stderr: Vec::new(),
        })
    }

    fn command_status_with_cwd(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> HalResult<()> {
        let _ = self.command_output_with_cwd(program, args, cwd, timeout)?;
        Ok(())
    }

    fn command_interactive(&self, program: &str, args: &[&str]) -> HalResult<()> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.attempt(
            Operation::Interactive {
                program: program.to_string(),
                args: args.clone(),
            },
            &args,
        )
    }
}

impl MountOps for FakeHal {
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: &MountOptions,
    ) -> HalResult<()> {
        log::info!(
            "FAKE HAL: mount {} -> {} (type: {:?})",
            device.display(),
            target.display(),
            fstype
        );
        let args = vec![device.display().to_string(), target.display().to_string()];
        self.attempt(
            Operation::Mount {
                device: device.to_path_buf(),
                target: target.to_path_buf(),
                fstype: fstype.map(String::from),
                options: options.options.clone(),
            },
            &args,
        )?;
        self.lock()
            .mounted_paths
            .insert(target.to_path_buf(), device.to_path_buf());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> HalResult<()> {
        log::info!("FAKE HAL: unmount {}", target.display());
        self.record_operation(Operation::Unmount {
            target: target.to_path_buf(),
        });
        self.lock().mounted_paths.remove(target);
        Ok(())
    }

    fn unmount_recursive(&self, target: &Path) -> HalResult<()> {
        let mut below: Vec<PathBuf> = self
            .lock()
            .mounted_paths
            .keys()
            .filter(|p| p.starts_with(target))
            .cloned()
            .collect();
        below.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        for path in below {
            self.unmount(&path)?;
        }
        Ok(())
    }

    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        Ok(self.lock().mounted_paths.contains_key(path))
    }
}

impl FormatOps for FakeHal {
    fn nvme_format(&self, drive: &Path, opts: &FormatOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        log::info!("FAKE HAL: nvme format {}", drive.display());
        self.attempt(
            Operation::NvmeFormat {
                drive: drive.to_path_buf(),
            },
            &path_arg(drive),
        )
    }

    fn format_vfat(&self, device: &Path, label: &str, opts: &FormatOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        log::info!("FAKE HAL: mkfs.fat {} ({})", device.display(), label);
        self.attempt(
            Operation::FormatVfat {
                device: device.to_path_buf(),
                label: label.to_string(),
            },
            &path_arg(device),
        )
    }

    fn format_btrfs(&self, device: &Path, label: &str, opts: &FormatOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        log::info!("FAKE HAL: mkfs.btrfs {} ({})", device.display(), label);
        self.attempt(
            Operation::FormatBtrfs {
                device: device.to_path_buf(),
                label: label.to_string(),
            },
            &path_arg(device),
        )
    }

    fn format_xfs(&self, device: &Path, label: &str, opts: &FormatOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        log::info!("FAKE HAL: mkfs.xfs {} ({})", device.display(), label);
        self.attempt(
            Operation::FormatXfs {
                device: device.to_path_buf(),
                label: label.to_string(),
            },
            &path_arg(device),
        )
    }
}

impl PartitionOps for FakeHal {
    fn wipefs_all(&self, disk: &Path, opts: &WipeFsOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        self.attempt(
            Operation::WipeFsAll {
                disk: disk.to_path_buf(),
            },
            &path_arg(disk),
        )
    }

    fn parted(&self, disk: &Path, op: &PartedOp, opts: &PartedOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        self.attempt(
            Operation::Parted {
                disk: disk.to_path_buf(),
                op: op.clone(),
            },
            &path_arg(disk),
        )
    }
}

impl BtrfsOps for FakeHal {
    fn btrfs_subvolume_create(&self, path: &Path) -> HalResult<()> {
        self.attempt(
            Operation::BtrfsSubvolumeCreate {
                path: path.to_path_buf(),
            },
            &path_arg(path),
        )
    }
}

impl ProbeOps for FakeHal {
    fn device_exists(&self, device: &Path) -> bool {
        self.lock().devices.contains(device)
    }

    fn lsblk_table(&self, disk: &Path) -> HalResult<String> {
        self.record_operation(Operation::LsblkTable {
            disk: disk.to_path_buf(),
        });
        Ok(format!("NAME SIZE TYPE\n{} 1T disk\n", disk.display()))
    }

    fn blkid_uuid(&self, device: &Path) -> HalResult<String> {
        self.attempt(
            Operation::BlkidUuid {
                device: device.to_path_buf(),
            },
            &path_arg(device),
        )?;
        Ok("FAKE-UUID".to_string())
    }

    fn mounted_from(&self, disk: &Path) -> HalResult<Vec<String>> {
        Ok(self
            .lock()
            .mounted_paths
            .iter()
            .filter(|(_, device)| mountinfo::source_on_device(&device.to_string_lossy(), disk))
            .map(|(target, _)| target.display().to_string())
            .collect())
    }
}

impl FileOps for FakeHal {
    fn path_exists(&self, path: &Path) -> bool {
        let state = self.lock();
        state.dirs.contains(path) || state.files.contains_key(path)
    }

    fn create_dir_all(&self, path: &Path) -> HalResult<()> {
        self.record_operation(Operation::CreateDir {
            path: path.to_path_buf(),
        });
        let mut state = self.lock();
        for ancestor in path.ancestors() {
            state.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> HalResult<String> {
        self.lock().files.get(path).cloned().ok_or_else(|| {
            HalError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))
        })
    }

    fn write_file(&self, path: &Path, contents: &str) -> HalResult<()> {
        self.record_operation(Operation::WriteFile {
            path: path.to_path_buf(),
        });
        self.lock()
            .files
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn append_file(&self, path: &Path, contents: &str) -> HalResult<()> {
        self.record_operation(Operation::AppendFile {
            path: path.to_path_buf(),
        });
        self.lock()
            .files
            .entry(path.to_path_buf())
            .or_default()
            .push_str(contents);
        Ok(())
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> HalResult<()> {
        let contents = self.read_to_string(src)?;
        self.record_operation(Operation::CopyFile {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
        });
        self.lock().files.insert(dst.to_path_buf(), contents);
        Ok(())
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> HalResult<()> {
        self.attempt(
            Operation::CopyTree {
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
            },
            &path_arg(src),
        )?;
        self.lock().dirs.insert(dst.to_path_buf());
        Ok(())
    }
}

impl SystemOps for FakeHal {
    fn is_root(&self) -> bool {
        !self.lock().not_root
    }

    fn sync(&self) -> HalResult<()> {
        self.record_operation(Operation::Sync);
        Ok(())
    }

    fn udev_settle(&self) -> HalResult<()> {
        self.record_operation(Operation::UdevSettle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_hal_records_mount() {
        let hal = FakeHal::new();
        let device = Path::new("/dev/nvme0n1p2");
        let target = Path::new("/mnt");

        hal.mount_device(device, target, Some("btrfs"), &MountOptions::new())
            .unwrap();

        assert_eq!(hal.operation_count(), 1);
        assert!(hal.has_operation(|op| matches!(op, Operation::Mount { .. })));
        assert!(hal.is_mounted(target).unwrap());
    }

    #[test]
    fn fake_hal_unmount_recursive_goes_deepest_first() {
        let hal = FakeHal::new();
        hal.mount_device(Path::new("/dev/a"), Path::new("/mnt"), None, &MountOptions::new())
            .unwrap();
        hal.mount_device(Path::new("/dev/b"), Path::new("/mnt/boot"), None, &MountOptions::new())
            .unwrap();
        hal.clear();

        hal.unmount_recursive(Path::new("/mnt")).unwrap();

        assert_eq!(
            hal.operations(),
            vec![
                Operation::Unmount {
                    target: PathBuf::from("/mnt/boot")
                },
                Operation::Unmount {
                    target: PathBuf::from("/mnt")
                },
            ]
        );
    }

    #[test]
    fn mounted_from_reports_partitions_of_the_disk_only() {
        let hal = FakeHal::new();
        hal.add_mount("/dev/sda2", "/data");
        hal.add_mount("/dev/sdaa1", "/media/usb");
        hal.mount_device(Path::new("/dev/sda1"), Path::new("/mnt"), None, &MountOptions::new())
            .unwrap();

        assert_eq!(
            hal.mounted_from(Path::new("/dev/sda")).unwrap(),
            vec!["/data".to_string(), "/mnt".to_string()]
        );
        hal.unmount(Path::new("/mnt")).unwrap();
        assert_eq!(
            hal.mounted_from(Path::new("/dev/sda")).unwrap(),
            vec!["/data".to_string()]
        );
        assert!(hal.mounted_from(Path::new("/dev/sdb")).unwrap().is_empty());
    }

    #[test]
    fn fake_hal_requires_confirmation() {
        let hal = FakeHal::new();
        let opts = FormatOptions::new(false);

        let err = hal
            .format_btrfs(Path::new("/dev/sda2"), "ROOT", &opts)
            .unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));

        let err = hal.nvme_format(Path::new("/dev/nvme0n1"), &opts).unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));
        assert_eq!(hal.operation_count(), 0);
    }

    #[test]
    fn fail_times_recovers_after_budget() {
        let hal = FakeHal::new();
        hal.fail_times("ping", 2);
        let t = Duration::from_secs(1);
        assert!(hal.command_status("ping", &["-c", "1"], t).is_err());
        assert!(hal.command_status("ping", &["-c", "1"], t).is_err());
        assert!(hal.command_status("ping", &["-c", "1"], t).is_ok());
        assert_eq!(hal.commands("ping").len(), 3);
    }

    #[test]
    fn fail_on_matches_needle_only() {
        let hal = FakeHal::new();
        hal.fail_on("mkfs.xfs", Some("/dev/sda1"));
        let opts = FormatOptions::new(true);
        assert!(hal.format_xfs(Path::new("/dev/sdb1"), "VM", &opts).is_ok());
        let err = hal
            .format_xfs(Path::new("/dev/sda1"), "STORAGE", &opts)
            .unwrap_err();
        assert_eq!(err.program(), Some("mkfs.xfs"));
    }

    #[test]
    fn git_clone_materializes_checkout() {
        let hal = FakeHal::new();
        hal.command_status(
            "git",
            &["clone", "--quiet", "https://example.com/r.git", "/roles/r"],
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(hal.path_exists(Path::new("/roles/r/.git")));
    }

    #[test]
    fn canned_stdout_is_returned() {
        let hal = FakeHal::new();
        hal.set_stdout("genfstab", "UUID=x / btrfs rw 0 0\n");
        let out = hal
            .command_output("genfstab", &["-U", "/mnt"], Duration::from_secs(1))
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout), "UUID=x / btrfs rw 0 0\n");
    }

    #[test]
    fn files_append_and_copy() {
        let hal = FakeHal::new();
        hal.add_file("/etc/pacman.conf", "[core]\n");
        hal.copy_file(Path::new("/etc/pacman.conf"), Path::new("/mnt/etc/pacman.conf"))
            .unwrap();
        hal.append_file(Path::new("/mnt/etc/pacman.conf"), "[extra]\n")
            .unwrap();
        assert_eq!(
            hal.file(Path::new("/mnt/etc/pacman.conf")).as_deref(),
            Some("[core]\n[extra]\n")
        );
    }
}
