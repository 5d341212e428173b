//! Network readiness gate.
//!
//! Wireless association is best effort: exhaustion only warns, since a wired fallback or
//! manual fix may exist. The reachability probe is the real gate and exhaustion is fatal.

use crate::retry::{retry, Exhaustion, RetryOutcome, RetryPolicy};
use pantheon_core::settings::WifiSettings;
use pantheon_error::ProvisionError;
use pantheon_hal::ProcessOps;
use std::time::Duration;

pub const WIFI_ATTEMPTS: u32 = 6;
pub const WIFI_INTERVAL: Duration = Duration::from_secs(5);
pub const PROBE_INTERVAL: Duration = Duration::from_secs(2);

const IWCTL_TIMEOUT: Duration = Duration::from_secs(30);
const PING_TIMEOUT: Duration = Duration::from_secs(10);

pub fn wifi_policy() -> RetryPolicy {
    RetryPolicy {
        attempts: WIFI_ATTEMPTS,
        interval: WIFI_INTERVAL,
        on_exhaustion: Exhaustion::Warn,
    }
}

pub fn probe_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        interval: PROBE_INTERVAL,
        on_exhaustion: Exhaustion::Fatal,
    }
}

fn iwctl_args(wifi: &WifiSettings) -> Vec<&str> {
    let mut args = Vec::new();
    if let Some(passphrase) = wifi.passphrase.as_deref() {
        args.push("--passphrase");
        args.push(passphrase);
    }
    args.extend(["station", wifi.device.as_str(), "connect", wifi.ssid.as_str()]);
    args
}

/// Try to associate with the configured wireless network. Returns whether it worked.
pub fn associate_wireless<H: ProcessOps + ?Sized>(
    hal: &H,
    wifi: &WifiSettings,
    sleep: &dyn Fn(Duration),
) -> bool {
    log::info!(
        "Associating {} with wireless network '{}'",
        wifi.device,
        wifi.ssid
    );
    let args = iwctl_args(wifi);
    let outcome = retry("wireless association", &wifi_policy(), sleep, |_| {
        hal.command_status("iwctl", &args, IWCTL_TIMEOUT)?;
        Ok(())
    });
    outcome.succeeded()
}

/// Block until `probe_host` answers a ping, or fail with `NetworkUnavailable`.
pub fn wait_for_network<H: ProcessOps + ?Sized>(
    hal: &H,
    probe_host: &str,
    attempts: u32,
    sleep: &dyn Fn(Duration),
) -> Result<(), ProvisionError> {
    let policy = probe_policy(attempts);
    let outcome = retry("reachability probe", &policy, sleep, |_| {
        hal.command_status("ping", &["-c", "1", "-W", "2", probe_host], PING_TIMEOUT)?;
        Ok(())
    });
    match outcome {
        RetryOutcome::Succeeded { attempt } => {
            log::info!("Network reachable ({probe_host} answered on attempt {attempt})");
            Ok(())
        }
        RetryOutcome::Exhausted { attempts } => Err(ProvisionError::NetworkUnavailable {
            target: probe_host.to_string(),
            attempts,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantheon_hal::FakeHal;
    use std::cell::Cell;

    fn wifi(passphrase: Option<&str>) -> WifiSettings {
        WifiSettings {
            device: "wlan0".into(),
            ssid: "pantheon".into(),
            passphrase: passphrase.map(String::from),
        }
    }

    #[test]
    fn probe_succeeds_on_first_reply() {
        let hal = FakeHal::new();
        let sleeps = Cell::new(0);
        wait_for_network(&hal, "1.1.1.1", 30, &|_| sleeps.set(sleeps.get() + 1)).unwrap();
        assert_eq!(hal.commands("ping").len(), 1);
        assert_eq!(sleeps.get(), 0);
        assert_eq!(hal.commands("ping")[0], ["-c", "1", "-W", "2", "1.1.1.1"]);
    }

    #[test]
    fn probe_exhaustion_is_fatal_after_exactly_n_attempts() {
        let hal = FakeHal::new();
        hal.fail_on("ping", None);
        let sleeps = Cell::new(0);
        let err = wait_for_network(&hal, "1.1.1.1", 7, &|_| sleeps.set(sleeps.get() + 1))
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::NetworkUnavailable { attempts: 7, .. }
        ));
        assert_eq!(hal.commands("ping").len(), 7);
        assert_eq!(sleeps.get(), 6);
    }

    #[test]
    fn probe_recovers_after_transient_failures() {
        let hal = FakeHal::new();
        hal.fail_times("ping", 3);
        wait_for_network(&hal, "1.1.1.1", 30, &|_| {}).unwrap();
        assert_eq!(hal.commands("ping").len(), 4);
    }

    #[test]
    fn wireless_exhaustion_only_warns() {
        let hal = FakeHal::new();
        hal.fail_on("iwctl", None);
        let slept = Cell::new(Duration::ZERO);
        let ok = associate_wireless(&hal, &wifi(None), &|d| slept.set(slept.get() + d));
        assert!(!ok);
        assert_eq!(hal.commands("iwctl").len(), WIFI_ATTEMPTS as usize);
        assert_eq!(slept.get(), WIFI_INTERVAL * (WIFI_ATTEMPTS - 1));
    }

    #[test]
    fn wireless_passes_passphrase_when_configured() {
        let hal = FakeHal::new();
        assert!(associate_wireless(&hal, &wifi(Some("s3cret")), &|_| {}));
        assert_eq!(
            hal.commands("iwctl")[0],
            ["--passphrase", "s3cret", "station", "wlan0", "connect", "pantheon"]
        );
    }
}
