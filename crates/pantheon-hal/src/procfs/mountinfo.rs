//! Parsing helpers for `/proc/self/mountinfo`.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub mount_point: PathBuf,
    pub source: String,
}

pub fn parse_mountinfo(content: &str) -> Vec<MountInfo> {
    content
        .lines()
        .filter_map(|line| {
            // <id> <parent> <maj:min> <root> <mount point> <opts...> - <fstype> <source> ...
            let (pre, post) = line.split_once(" - ")?;
            let pre_fields: Vec<&str> = pre.split_whitespace().collect();
            if pre_fields.len() < 5 {
                return None;
            }
            let mut post_fields = post.split_whitespace();
            let _fstype = post_fields.next()?;
            let source = post_fields.next()?.to_string();
            Some(MountInfo {
                mount_point: PathBuf::from(unescape_mount_path(pre_fields[4])),
                source,
            })
        })
        .collect()
}

pub fn is_mounted_from_info(path: &Path, entries: &[MountInfo]) -> bool {
    let target = normalize_path(path);
    entries
        .iter()
        .any(|entry| normalize_path(&entry.mount_point) == target)
}

/// Whether `source` is `disk` itself or one of its numbered partitions.
///
/// Disks whose name ends in a digit take a `p` before the partition number
/// (`/dev/nvme0n1p2`, `/dev/md0p1`), others take the number directly (`/dev/sda2`).
pub fn source_on_device(source: &str, disk: &Path) -> bool {
    let disk = disk.to_string_lossy();
    let Some(rest) = source.strip_prefix(disk.as_ref()) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let number = if disk.ends_with(|c: char| c.is_ascii_digit()) {
        match rest.strip_prefix('p') {
            Some(n) => n,
            None => return false,
        }
    } else {
        rest
    };
    !number.is_empty() && number.chars().all(|c| c.is_ascii_digit())
}

/// Mountpoints whose source device lives on `dev_path` (the disk itself or one of its
/// partitions).
pub fn mounted_under_device(entries: &[MountInfo], dev_path: &Path) -> Vec<String> {
    let mut mounts: Vec<String> = entries
        .iter()
        .filter(|entry| source_on_device(&entry.source, dev_path))
        .map(|entry| entry.mount_point.display().to_string())
        .collect();
    mounts.sort();
    mounts.dedup();
    mounts
}

/// Mountpoints at or below `target`, deepest first.
pub fn mounted_below(entries: &[MountInfo], target: &Path) -> Vec<PathBuf> {
    let mut under: Vec<PathBuf> = entries
        .iter()
        .map(|e| e.mount_point.clone())
        .filter(|mp| mp == target || mp.starts_with(target))
        .collect();
    under.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
    under.dedup();
    under
}

pub fn unescape_mount_path(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

fn normalize_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.len() > 1 && s.ends_with('/') {
        s.trim_end_matches('/').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "36 28 0:31 / / rw,relatime - ext4 /dev/sda3 rw\n\
                          37 28 0:32 / /mnt rw,relatime - btrfs /dev/nvme0n1p2 rw\n\
                          38 37 0:33 / /mnt/boot rw,relatime - vfat /dev/nvme0n1p1 rw\n\
                          39 28 0:34 / /srv/raid\\040disk rw,relatime - xfs /dev/md127 rw\n";

    #[test]
    fn parse_mountinfo_extracts_mountpoints_and_sources() {
        let entries = parse_mountinfo(SAMPLE);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].mount_point, PathBuf::from("/mnt"));
        assert_eq!(entries[1].source, "/dev/nvme0n1p2");
    }

    #[test]
    fn is_mounted_from_info_ignores_trailing_slash() {
        let entries = parse_mountinfo(SAMPLE);
        assert!(is_mounted_from_info(Path::new("/mnt/"), &entries));
        assert!(!is_mounted_from_info(Path::new("/mnt/home"), &entries));
    }

    #[test]
    fn mountinfo_unescapes_paths() {
        let entries = parse_mountinfo(SAMPLE);
        assert_eq!(entries[3].mount_point, PathBuf::from("/srv/raid disk"));
    }

    #[test]
    fn mounted_under_device_finds_partitions() {
        let entries = parse_mountinfo(SAMPLE);
        let mounts = mounted_under_device(&entries, Path::new("/dev/nvme0n1"));
        assert_eq!(mounts, vec!["/mnt".to_string(), "/mnt/boot".to_string()]);
    }

    #[test]
    fn mounted_under_device_ignores_sibling_disks() {
        let entries = parse_mountinfo(
            "40 28 0:35 / /media/usb rw - vfat /dev/sdaa1 rw\n\
             41 28 0:36 / /srv rw - xfs /dev/nvme1n10p1 rw\n\
             42 28 0:37 / /data rw - xfs /dev/sda2 rw\n",
        );
        assert_eq!(
            mounted_under_device(&entries, Path::new("/dev/sda")),
            vec!["/data".to_string()]
        );
        assert!(mounted_under_device(&entries, Path::new("/dev/nvme1n1")).is_empty());
        assert_eq!(
            mounted_under_device(&entries, Path::new("/dev/nvme1n10")),
            vec!["/srv".to_string()]
        );
    }

    #[test]
    fn source_on_device_follows_partition_naming() {
        assert!(source_on_device("/dev/nvme0n1", Path::new("/dev/nvme0n1")));
        assert!(source_on_device("/dev/nvme0n1p12", Path::new("/dev/nvme0n1")));
        assert!(!source_on_device("/dev/nvme0n12", Path::new("/dev/nvme0n1")));
        assert!(!source_on_device("/dev/nvme0n1p", Path::new("/dev/nvme0n1")));
        assert!(source_on_device("/dev/md0p1", Path::new("/dev/md0")));
        assert!(!source_on_device("/dev/sdap1", Path::new("/dev/sda")));
        assert!(!source_on_device("tmpfs", Path::new("/dev/sda")));
    }

    #[test]
    fn mounted_below_orders_deepest_first() {
        let entries = parse_mountinfo(SAMPLE);
        let below = mounted_below(&entries, Path::new("/mnt"));
        assert_eq!(
            below,
            vec![PathBuf::from("/mnt/boot"), PathBuf::from("/mnt")]
        );
    }
}
