//! Error taxonomy shared by every pantheon crate.
//!
//! Application code passes these around inside `anyhow::Error`; the binary recovers them with
//! `downcast_ref` to pick the process exit status.

use thiserror::Error;

/// Host configuration problems. Never reachable once the pipeline has started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown host '{host}' (expected one of: {expected})")]
    UnknownHost { host: String, expected: String },

    #[error("Host profile for {host} is malformed: {reason}")]
    MalformedProfile { host: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("pantheon must run as root (effective uid 0)")]
    NotPrivileged,

    #[error("Network unreachable: no reply from {target} after {attempts} attempts")]
    NetworkUnavailable { target: String, attempts: u32 },

    #[error("Aborted by operator before: {action}")]
    UserAborted { action: String },

    #[error("{program} failed on {target}: {detail}")]
    SubprocessFailure {
        program: String,
        target: String,
        detail: String,
    },

    #[error("Precondition failed: {0}")]
    PreconditionFailure(String),
}

impl ProvisionError {
    pub fn exit_code(&self) -> u8 {
        match self {
            ProvisionError::Config(_) => 2,
            ProvisionError::NotPrivileged => 3,
            ProvisionError::NetworkUnavailable { .. } => 4,
            ProvisionError::UserAborted { .. } => 5,
            ProvisionError::SubprocessFailure { .. } => 6,
            ProvisionError::PreconditionFailure(_) => 7,
        }
    }
}

/// Exit status for an arbitrary error chain: the first [`ProvisionError`] or [`ConfigError`]
/// found in the chain decides, anything else maps to 1.
pub fn exit_code_for(err: &(dyn std::error::Error + 'static)) -> u8 {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(p) = e.downcast_ref::<ProvisionError>() {
            return p.exit_code();
        }
        if e.downcast_ref::<ConfigError>().is_some() {
            return 2;
        }
        current = e.source();
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let errors = [
            ProvisionError::Config(ConfigError::UnknownHost {
                host: "MARS".into(),
                expected: "ASTER".into(),
            }),
            ProvisionError::NotPrivileged,
            ProvisionError::NetworkUnavailable {
                target: "1.1.1.1".into(),
                attempts: 30,
            },
            ProvisionError::UserAborted {
                action: "format".into(),
            },
            ProvisionError::SubprocessFailure {
                program: "parted".into(),
                target: "/dev/sda".into(),
                detail: "exit 1".into(),
            },
            ProvisionError::PreconditionFailure("x".into()),
        ];
        let mut codes: Vec<u8> = errors.iter().map(ProvisionError::exit_code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn bare_config_error_maps_to_two() {
        let err = ConfigError::MalformedProfile {
            host: "ASTER".into(),
            reason: "no drives".into(),
        };
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn subprocess_failure_names_target() {
        let err = ProvisionError::SubprocessFailure {
            program: "mkfs.xfs".into(),
            target: "/dev/sda1".into(),
            detail: "exit=1".into(),
        };
        assert_eq!(err.to_string(), "mkfs.xfs failed on /dev/sda1: exit=1");
    }
}
