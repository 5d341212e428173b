//! Host registry.
//!
//! The static tables in this module are the only place drive topology differs between
//! hosts. `resolve` turns a host identifier into a validated, immutable [`HostProfile`];
//! nothing here touches the system.

use pantheon_error::ConfigError;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ROLE_BASE_URL: &str = "https://github.com/pantheon-provisioning";

const COMMON_ROLES: &[&str] = &["ansible-role-base", "ansible-role-users", "ansible-role-shell"];
const WORKSTATION_ROLES: &[&str] = &[
    "ansible-role-desktop",
    "ansible-role-fonts",
    "ansible-role-audio",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HostId {
    Aster,
    Apollo,
    Hephaestus,
    Themis,
}

impl HostId {
    pub fn all() -> &'static [HostId] {
        &[
            HostId::Aster,
            HostId::Apollo,
            HostId::Hephaestus,
            HostId::Themis,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostId::Aster => "ASTER",
            HostId::Apollo => "APOLLO",
            HostId::Hephaestus => "HEPHAESTUS",
            HostId::Themis => "THEMIS",
        }
    }

    /// Name written to `/etc/hostname`.
    pub fn hostname(&self) -> String {
        self.as_str().to_lowercase()
    }

    fn expected() -> String {
        HostId::all()
            .iter()
            .map(HostId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HostId::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownHost {
                host: s.to_string(),
                expected: HostId::expected(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HostClass {
    Laptop,
    Workstation,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FsKind {
    Vfat,
    Btrfs,
    Xfs,
}

impl FsKind {
    /// Type name as understood by `mount -t`.
    pub fn fstype(&self) -> &'static str {
        match self {
            FsKind::Vfat => "vfat",
            FsKind::Btrfs => "btrfs",
            FsKind::Xfs => "xfs",
        }
    }

    /// Type hint passed to `parted mkpart`.
    pub fn parted_type(&self) -> &'static str {
        match self {
            FsKind::Vfat => "fat32",
            FsKind::Btrfs => "btrfs",
            FsKind::Xfs => "xfs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PartitionRole {
    Boot,
    Root,
    Data,
    Bulk,
    Virtualization,
    Storage,
}

impl PartitionRole {
    pub fn fs(&self) -> FsKind {
        match self {
            PartitionRole::Boot => FsKind::Vfat,
            PartitionRole::Root | PartitionRole::Data | PartitionRole::Bulk => FsKind::Btrfs,
            PartitionRole::Virtualization | PartitionRole::Storage => FsKind::Xfs,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PartitionRole::Boot => "BOOT",
            PartitionRole::Root => "ROOT",
            PartitionRole::Data => "DATA",
            PartitionRole::Bulk => "BULK",
            PartitionRole::Virtualization => "VM",
            PartitionRole::Storage => "STORAGE",
        }
    }

    /// GPT partition name.
    pub fn part_name(&self) -> &'static str {
        match self {
            PartitionRole::Boot => "boot",
            PartitionRole::Root => "root",
            PartitionRole::Data => "data",
            PartitionRole::Bulk => "bulk",
            PartitionRole::Virtualization => "vm",
            PartitionRole::Storage => "storage",
        }
    }
}

/// One partition in a table layout. Offsets are parted unit strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSpec {
    pub number: u32,
    pub role: PartitionRole,
    pub start: &'static str,
    pub end: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartitionLayout {
    /// ESP plus root. Laptops and workstations.
    BootRoot,
    /// ESP, root and a bulk-storage partition. Server class.
    BootRootBulk,
    /// One partition spanning the drive.
    Single(PartitionRole),
}

impl PartitionLayout {
    pub fn partitions(&self) -> Vec<PartitionSpec> {
        match self {
            PartitionLayout::BootRoot => vec![
                PartitionSpec {
                    number: 1,
                    role: PartitionRole::Boot,
                    start: "1MiB",
                    end: "1025MiB",
                },
                PartitionSpec {
                    number: 2,
                    role: PartitionRole::Root,
                    start: "1025MiB",
                    end: "100%",
                },
            ],
            PartitionLayout::BootRootBulk => vec![
                PartitionSpec {
                    number: 1,
                    role: PartitionRole::Boot,
                    start: "1MiB",
                    end: "1025MiB",
                },
                PartitionSpec {
                    number: 2,
                    role: PartitionRole::Root,
                    start: "1025MiB",
                    end: "256GiB",
                },
                PartitionSpec {
                    number: 3,
                    role: PartitionRole::Bulk,
                    start: "256GiB",
                    end: "100%",
                },
            ],
            PartitionLayout::Single(role) => vec![PartitionSpec {
                number: 1,
                role: *role,
                start: "1MiB",
                end: "100%",
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionTarget {
    pub drive: PathBuf,
    pub layout: PartitionLayout,
}

impl PartitionTarget {
    /// Device nodes this target produces, with their roles.
    pub fn produced(&self) -> Vec<(PathBuf, PartitionRole)> {
        self.layout
            .partitions()
            .into_iter()
            .map(|p| (partition_path(&self.drive, p.number), p.role))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatTarget {
    pub device: PathBuf,
    pub role: PartitionRole,
    pub fs: FsKind,
    pub label: String,
    /// Btrfs subvolumes created on the fresh filesystem.
    pub subvolumes: Vec<String>,
    pub mkfs_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountTarget {
    pub device: PathBuf,
    /// Absolute path inside the target root.
    pub mountpoint: PathBuf,
    pub fs: FsKind,
    pub options: String,
    /// The mountpoint directory must be created before mounting.
    pub create_dir: bool,
}

/// Pre-existing device mounted only when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuxMount {
    pub device: PathBuf,
    pub mountpoint: PathBuf,
    pub fs: FsKind,
    pub options: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostFlags {
    pub requires_wifi: bool,
    pub has_raid: bool,
    pub is_workstation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRepository {
    pub url: String,
    pub workstation_only: bool,
}

impl RoleRepository {
    fn new(name: &str, workstation_only: bool) -> Self {
        Self {
            url: format!("{ROLE_BASE_URL}/{name}.git"),
            workstation_only,
        }
    }

    /// Local directory name: last URL segment without `.git`.
    pub fn dir_name(&self) -> &str {
        let last = self.url.rsplit('/').next().unwrap_or(&self.url);
        last.strip_suffix(".git").unwrap_or(last)
    }
}

pub fn common_roles() -> Vec<RoleRepository> {
    COMMON_ROLES
        .iter()
        .map(|n| RoleRepository::new(n, false))
        .collect()
}

pub fn workstation_roles() -> Vec<RoleRepository> {
    WORKSTATION_ROLES
        .iter()
        .map(|n| RoleRepository::new(n, true))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostProfile {
    pub host: HostId,
    pub class: HostClass,
    pub drives: Vec<PathBuf>,
    /// Run `nvme format` on the NVMe drives before partitioning.
    pub low_level_format: bool,
    pub partitions: Vec<PartitionTarget>,
    /// Number of partition targets actually applied.
    pub partition_limit: usize,
    pub filesystems: Vec<FormatTarget>,
    /// Number of format targets actually built.
    pub filesystem_limit: usize,
    pub mounts: Vec<MountTarget>,
    pub aux_mounts: Vec<AuxMount>,
    pub boot_disk: PathBuf,
    pub kernel: String,
    pub extra_packages: Vec<String>,
    pub flags: HostFlags,
}

impl HostProfile {
    pub fn effective_partitions(&self) -> &[PartitionTarget] {
        &self.partitions[..self.partition_limit.min(self.partitions.len())]
    }

    pub fn effective_filesystems(&self) -> &[FormatTarget] {
        &self.filesystems[..self.filesystem_limit.min(self.filesystems.len())]
    }

    /// Drives that get a low-level format. Empty for hosts that bypass formatting.
    pub fn format_drives(&self) -> Vec<&Path> {
        if !self.low_level_format {
            return Vec::new();
        }
        self.drives
            .iter()
            .map(PathBuf::as_path)
            .filter(|d| is_nvme(d))
            .collect()
    }

    pub fn root_mount(&self) -> Option<&MountTarget> {
        self.mounts.iter().find(|m| m.mountpoint == Path::new("/"))
    }

    /// Initrd images for microcode packages, in package order.
    pub fn microcode_images(&self) -> Vec<String> {
        self.extra_packages
            .iter()
            .filter(|p| p.ends_with("-ucode"))
            .map(|p| format!("/{p}.img"))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let malformed = |reason: String| ConfigError::MalformedProfile {
            host: self.host.to_string(),
            reason,
        };

        if self.drives.is_empty() {
            return Err(malformed("no drives".into()));
        }
        if self.partitions.is_empty() || self.filesystems.is_empty() || self.mounts.is_empty() {
            return Err(malformed("partition, format and mount lists must be non-empty".into()));
        }
        if self.kernel.is_empty() {
            return Err(malformed("no kernel package".into()));
        }
        if self.partition_limit == 0 || self.partition_limit > self.partitions.len() {
            return Err(malformed(format!(
                "partition limit {} out of range 1..={}",
                self.partition_limit,
                self.partitions.len()
            )));
        }
        if self.filesystem_limit == 0 || self.filesystem_limit > self.filesystems.len() {
            return Err(malformed(format!(
                "filesystem limit {} out of range 1..={}",
                self.filesystem_limit,
                self.filesystems.len()
            )));
        }
        if !self.drives.contains(&self.boot_disk) {
            return Err(malformed(format!(
                "boot disk {} is not a listed drive",
                self.boot_disk.display()
            )));
        }

        let mut produced: Vec<(PathBuf, PartitionRole)> = Vec::new();
        for target in self.effective_partitions() {
            if !self.drives.contains(&target.drive) {
                return Err(malformed(format!(
                    "partition target {} is not a listed drive",
                    target.drive.display()
                )));
            }
            produced.extend(target.produced());
        }

        let mut built: HashSet<&Path> = HashSet::new();
        for fs in self.effective_filesystems() {
            match produced.iter().find(|(dev, _)| dev == &fs.device) {
                Some((_, role)) if *role == fs.role && role.fs() == fs.fs => {}
                Some(_) => {
                    return Err(malformed(format!(
                        "format target {} does not match its partition role",
                        fs.device.display()
                    )))
                }
                None => {
                    return Err(malformed(format!(
                        "format target {} is not produced by the partition phase",
                        fs.device.display()
                    )))
                }
            }
            built.insert(fs.device.as_path());
        }

        match self.mounts.first() {
            Some(m) if m.mountpoint == Path::new("/") => {}
            _ => return Err(malformed("root must be the first mount".into())),
        }
        let mut mounted: Vec<&Path> = Vec::new();
        for (idx, mount) in self.mounts.iter().enumerate() {
            if !built.contains(mount.device.as_path()) {
                return Err(malformed(format!(
                    "mount target {} refers to unbuilt filesystem {}",
                    mount.mountpoint.display(),
                    mount.device.display()
                )));
            }
            if !mount.mountpoint.is_absolute() {
                return Err(malformed(format!(
                    "mountpoint {} is not absolute",
                    mount.mountpoint.display()
                )));
            }
            // A later mount may not be the parent of an earlier one.
            for later in &self.mounts[idx + 1..] {
                if later.mountpoint != mount.mountpoint
                    && mount.mountpoint.starts_with(&later.mountpoint)
                {
                    return Err(malformed(format!(
                        "{} is mounted before its parent {}",
                        mount.mountpoint.display(),
                        later.mountpoint.display()
                    )));
                }
            }
            if mounted.contains(&mount.mountpoint.as_path()) {
                return Err(malformed(format!(
                    "mountpoint {} listed twice",
                    mount.mountpoint.display()
                )));
            }
            mounted.push(mount.mountpoint.as_path());
        }

        Ok(())
    }
}

/// Resolve and validate the profile for `host`.
pub fn resolve(host: &str) -> Result<HostProfile, ConfigError> {
    let id: HostId = host.parse()?;
    let profile = profile_for(id);
    profile.validate()?;
    Ok(profile)
}

/// Partition device node: `nvme0n1` + 2 -> `nvme0n1p2`, `sda` + 2 -> `sda2`.
pub fn partition_path(drive: &Path, number: u32) -> PathBuf {
    let raw = drive.to_string_lossy();
    let needs_p = raw.chars().last().is_some_and(|c| c.is_ascii_digit());
    if needs_p {
        PathBuf::from(format!("{raw}p{number}"))
    } else {
        PathBuf::from(format!("{raw}{number}"))
    }
}

pub fn is_nvme(drive: &Path) -> bool {
    drive
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("nvme"))
}

fn dev(name: &str) -> PathBuf {
    Path::new("/dev").join(name)
}

fn btrfs_options(class: HostClass, subvol: Option<&str>) -> String {
    let mut opts = match class {
        HostClass::Server => "noatime,compress=zstd:1,space_cache=v2".to_string(),
        HostClass::Laptop => "noatime,compress=zstd:3,space_cache=v2,discard=async".to_string(),
        HostClass::Workstation => "noatime,compress=zstd:3,space_cache=v2".to_string(),
    };
    if let Some(subvol) = subvol {
        opts.push_str(",subvol=");
        opts.push_str(subvol);
    }
    opts
}

const ESP_OPTIONS: &str = "umask=0077";
const XFS_OPTIONS: &str = "noatime,inode64";

fn format_target(device: PathBuf, role: PartitionRole, mkfs_args: &[&str]) -> FormatTarget {
    let subvolumes = if role == PartitionRole::Root {
        vec!["@".to_string(), "@home".to_string(), "@var".to_string()]
    } else {
        Vec::new()
    };
    FormatTarget {
        device,
        role,
        fs: role.fs(),
        label: role.label().to_string(),
        subvolumes,
        mkfs_args: mkfs_args.iter().map(|s| s.to_string()).collect(),
    }
}

fn mount(device: PathBuf, mountpoint: &str, fs: FsKind, options: String) -> MountTarget {
    MountTarget {
        device,
        create_dir: mountpoint != "/",
        mountpoint: PathBuf::from(mountpoint),
        fs,
        options,
    }
}

/// Root, boot, home and var on a boot/root drive.
fn system_mounts(class: HostClass, boot: PathBuf, root: PathBuf) -> Vec<MountTarget> {
    vec![
        mount(root.clone(), "/", FsKind::Btrfs, btrfs_options(class, Some("@"))),
        mount(boot, "/boot", FsKind::Vfat, ESP_OPTIONS.to_string()),
        mount(
            root.clone(),
            "/home",
            FsKind::Btrfs,
            btrfs_options(class, Some("@home")),
        ),
        mount(root, "/var", FsKind::Btrfs, btrfs_options(class, Some("@var"))),
    ]
}

fn workstation_partitions() -> Vec<PartitionTarget> {
    vec![
        PartitionTarget {
            drive: dev("nvme0n1"),
            layout: PartitionLayout::BootRoot,
        },
        PartitionTarget {
            drive: dev("nvme1n1"),
            layout: PartitionLayout::Single(PartitionRole::Data),
        },
        PartitionTarget {
            drive: dev("nvme2n1"),
            layout: PartitionLayout::Single(PartitionRole::Virtualization),
        },
    ]
}

fn workstation_filesystems() -> Vec<FormatTarget> {
    vec![
        format_target(dev("nvme0n1p1"), PartitionRole::Boot, &[]),
        format_target(dev("nvme0n1p2"), PartitionRole::Root, &[]),
        format_target(dev("nvme1n1p1"), PartitionRole::Data, &[]),
        format_target(dev("nvme2n1p1"), PartitionRole::Virtualization, &[]),
    ]
}

fn profile_for(id: HostId) -> HostProfile {
    match id {
        HostId::Aster => HostProfile {
            host: id,
            class: HostClass::Laptop,
            drives: vec![dev("nvme0n1")],
            low_level_format: true,
            partitions: workstation_partitions(),
            partition_limit: 1,
            filesystems: workstation_filesystems(),
            filesystem_limit: 2,
            mounts: system_mounts(HostClass::Laptop, dev("nvme0n1p1"), dev("nvme0n1p2")),
            aux_mounts: Vec::new(),
            boot_disk: dev("nvme0n1"),
            kernel: "linux-zen".into(),
            extra_packages: vec!["intel-ucode".into(), "sof-firmware".into(), "iwd".into()],
            flags: HostFlags {
                requires_wifi: true,
                has_raid: false,
                is_workstation: true,
            },
        },
        HostId::Apollo => {
            let mut mounts =
                system_mounts(HostClass::Workstation, dev("nvme0n1p1"), dev("nvme0n1p2"));
            mounts.push(mount(
                dev("nvme1n1p1"),
                "/data",
                FsKind::Btrfs,
                btrfs_options(HostClass::Workstation, None),
            ));
            mounts.push(mount(
                dev("nvme2n1p1"),
                "/var/lib/libvirt/images",
                FsKind::Xfs,
                XFS_OPTIONS.to_string(),
            ));
            HostProfile {
                host: id,
                class: HostClass::Workstation,
                drives: vec![dev("nvme0n1"), dev("nvme1n1"), dev("nvme2n1")],
                low_level_format: true,
                partitions: workstation_partitions(),
                partition_limit: 3,
                filesystems: workstation_filesystems(),
                filesystem_limit: 4,
                mounts,
                aux_mounts: Vec::new(),
                boot_disk: dev("nvme0n1"),
                kernel: "linux".into(),
                extra_packages: vec!["amd-ucode".into()],
                flags: HostFlags {
                    requires_wifi: false,
                    has_raid: false,
                    is_workstation: true,
                },
            }
        }
        HostId::Hephaestus => HostProfile {
            host: id,
            class: HostClass::Workstation,
            drives: vec![dev("sda")],
            low_level_format: false,
            partitions: vec![PartitionTarget {
                drive: dev("sda"),
                layout: PartitionLayout::BootRoot,
            }],
            partition_limit: 1,
            filesystems: vec![
                format_target(dev("sda1"), PartitionRole::Boot, &[]),
                format_target(dev("sda2"), PartitionRole::Root, &[]),
            ],
            filesystem_limit: 2,
            mounts: system_mounts(HostClass::Workstation, dev("sda1"), dev("sda2")),
            aux_mounts: vec![AuxMount {
                device: dev("md127"),
                mountpoint: PathBuf::from("/srv/raid"),
                fs: FsKind::Xfs,
                options: format!("{XFS_OPTIONS},nofail"),
            }],
            boot_disk: dev("sda"),
            kernel: "linux".into(),
            extra_packages: vec!["amd-ucode".into(), "mdadm".into()],
            flags: HostFlags {
                requires_wifi: false,
                has_raid: true,
                is_workstation: true,
            },
        },
        HostId::Themis => {
            let mut mounts = system_mounts(HostClass::Server, dev("nvme0n1p1"), dev("nvme0n1p2"));
            mounts.push(mount(
                dev("nvme0n1p3"),
                "/srv/bulk",
                FsKind::Btrfs,
                btrfs_options(HostClass::Server, None),
            ));
            mounts.push(mount(
                dev("nvme1n1p1"),
                "/var/lib/libvirt/images",
                FsKind::Xfs,
                XFS_OPTIONS.to_string(),
            ));
            mounts.push(mount(
                dev("sda1"),
                "/srv/storage",
                FsKind::Xfs,
                format!("{XFS_OPTIONS},logbufs=8"),
            ));
            HostProfile {
                host: id,
                class: HostClass::Server,
                drives: vec![dev("nvme0n1"), dev("nvme1n1"), dev("sda")],
                low_level_format: true,
                partitions: vec![
                    PartitionTarget {
                        drive: dev("nvme0n1"),
                        layout: PartitionLayout::BootRootBulk,
                    },
                    PartitionTarget {
                        drive: dev("nvme1n1"),
                        layout: PartitionLayout::Single(PartitionRole::Virtualization),
                    },
                    PartitionTarget {
                        drive: dev("sda"),
                        layout: PartitionLayout::Single(PartitionRole::Storage),
                    },
                ],
                partition_limit: 3,
                filesystems: vec![
                    format_target(dev("nvme0n1p1"), PartitionRole::Boot, &[]),
                    format_target(dev("nvme0n1p2"), PartitionRole::Root, &[]),
                    format_target(dev("nvme0n1p3"), PartitionRole::Bulk, &["--nodesize", "32k"]),
                    format_target(dev("nvme1n1p1"), PartitionRole::Virtualization, &[]),
                    format_target(dev("sda1"), PartitionRole::Storage, &["-d", "agcount=16"]),
                ],
                filesystem_limit: 5,
                mounts,
                aux_mounts: vec![AuxMount {
                    device: dev("md0"),
                    mountpoint: PathBuf::from("/srv/backup"),
                    fs: FsKind::Xfs,
                    options: format!("{XFS_OPTIONS},nofail"),
                }],
                boot_disk: dev("nvme0n1"),
                kernel: "linux-lts".into(),
                extra_packages: vec!["amd-ucode".into(), "mdadm".into()],
                flags: HostFlags {
                    requires_wifi: false,
                    has_raid: true,
                    is_workstation: false,
                },
            }
        }
    }
}
