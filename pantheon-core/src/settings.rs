//! Run settings resolved from the environment.
//!
//! Every value has a default; `PANTHEON_*` variables override them for a single run.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};

pub const TIMEZONE: &str = "Europe/London";
pub const LOCALE: &str = "en_GB.UTF-8";
pub const KEYMAP: &str = "uk";

pub const DEFAULT_TARGET_ROOT: &str = "/mnt";
pub const DEFAULT_WIFI_DEVICE: &str = "wlan0";
pub const DEFAULT_WIFI_SSID: &str = "pantheon";
pub const DEFAULT_PROBE_HOST: &str = "1.1.1.1";
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiSettings {
    pub device: String,
    pub ssid: String,
    /// `None` for an open network.
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub home: PathBuf,
    pub log_dir: PathBuf,
    pub target_root: PathBuf,
    pub wifi: WifiSettings,
    pub probe_host: String,
    pub probe_attempts: u32,
}

impl Settings {
    /// Settings for this process: `PANTHEON_*` overrides on top of defaults rooted at the
    /// executable's directory.
    pub fn from_env() -> Result<Self> {
        let exe = env::current_exe().context("Failed to locate the pantheon executable")?;
        let default_home = exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_lookup(|key| env::var(key).ok(), default_home)
    }

    pub fn from_lookup<F>(lookup: F, default_home: PathBuf) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let home = non_empty("PANTHEON_HOME")
            .map(PathBuf::from)
            .unwrap_or(default_home);
        let log_dir = non_empty("PANTHEON_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("logs"));
        let target_root = non_empty("PANTHEON_TARGET_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_ROOT));

        let wifi = WifiSettings {
            device: non_empty("PANTHEON_WIFI_DEVICE")
                .unwrap_or_else(|| DEFAULT_WIFI_DEVICE.to_string()),
            ssid: non_empty("PANTHEON_WIFI_SSID").unwrap_or_else(|| DEFAULT_WIFI_SSID.to_string()),
            passphrase: non_empty("PANTHEON_WIFI_PASSPHRASE"),
        };

        let probe_host =
            non_empty("PANTHEON_PROBE_HOST").unwrap_or_else(|| DEFAULT_PROBE_HOST.to_string());
        let probe_attempts = match non_empty("PANTHEON_PROBE_ATTEMPTS") {
            Some(raw) => parse_attempts(&raw)?,
            None => DEFAULT_PROBE_ATTEMPTS,
        };

        Ok(Self {
            home,
            log_dir,
            target_root,
            wifi,
            probe_host,
            probe_attempts,
        })
    }

    /// Configuration-management tree copied into the target root.
    pub fn ansible_dir(&self) -> PathBuf {
        self.home.join("ansible")
    }

    /// Where role repositories are cloned.
    pub fn roles_dir(&self) -> PathBuf {
        self.ansible_dir().join("roles")
    }
}

fn parse_attempts(raw: &str) -> Result<u32> {
    let attempts: u32 = raw
        .trim()
        .parse()
        .with_context(|| format!("PANTHEON_PROBE_ATTEMPTS is not a number: {raw}"))?;
    if attempts == 0 {
        return Err(anyhow!("PANTHEON_PROBE_ATTEMPTS must be at least 1"));
    }
    Ok(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_rooted_at_home() {
        let s = Settings::from_lookup(lookup(&[]), PathBuf::from("/opt/pantheon")).unwrap();
        assert_eq!(s.home, PathBuf::from("/opt/pantheon"));
        assert_eq!(s.log_dir, PathBuf::from("/opt/pantheon/logs"));
        assert_eq!(s.target_root, PathBuf::from("/mnt"));
        assert_eq!(s.roles_dir(), PathBuf::from("/opt/pantheon/ansible/roles"));
        assert_eq!(s.wifi.device, "wlan0");
        assert_eq!(s.wifi.passphrase, None);
        assert_eq!(s.probe_host, "1.1.1.1");
        assert_eq!(s.probe_attempts, 30);
    }

    #[test]
    fn overrides_replace_defaults() {
        let s = Settings::from_lookup(
            lookup(&[
                ("PANTHEON_HOME", "/srv/p"),
                ("PANTHEON_TARGET_ROOT", "/tmp/target"),
                ("PANTHEON_WIFI_SSID", "lab"),
                ("PANTHEON_WIFI_PASSPHRASE", "hunter2"),
                ("PANTHEON_PROBE_ATTEMPTS", "5"),
            ]),
            PathBuf::from("/unused"),
        )
        .unwrap();
        assert_eq!(s.log_dir, PathBuf::from("/srv/p/logs"));
        assert_eq!(s.target_root, PathBuf::from("/tmp/target"));
        assert_eq!(s.wifi.ssid, "lab");
        assert_eq!(s.wifi.passphrase.as_deref(), Some("hunter2"));
        assert_eq!(s.probe_attempts, 5);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let s = Settings::from_lookup(
            lookup(&[("PANTHEON_WIFI_PASSPHRASE", "  "), ("PANTHEON_LOG_DIR", "")]),
            PathBuf::from("/h"),
        )
        .unwrap();
        assert_eq!(s.wifi.passphrase, None);
        assert_eq!(s.log_dir, PathBuf::from("/h/logs"));
    }

    #[test]
    fn rejects_bad_probe_attempts() {
        let zero = Settings::from_lookup(lookup(&[("PANTHEON_PROBE_ATTEMPTS", "0")]), "/h".into());
        assert!(zero.is_err());
        let junk =
            Settings::from_lookup(lookup(&[("PANTHEON_PROBE_ATTEMPTS", "lots")]), "/h".into());
        assert!(junk.is_err());
    }

    #[test]
    fn from_env_reads_process_environment() {
        let _guard = crate::test_env::lock();
        env::set_var("PANTHEON_HOME", "/tmp/pantheon-env-test");
        env::set_var("PANTHEON_PROBE_HOST", "9.9.9.9");

        let s = Settings::from_env().unwrap();

        env::remove_var("PANTHEON_HOME");
        env::remove_var("PANTHEON_PROBE_HOST");

        assert_eq!(s.home, PathBuf::from("/tmp/pantheon-env-test"));
        assert_eq!(s.probe_host, "9.9.9.9");
    }
}
