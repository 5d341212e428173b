//! pantheon provisioning workflow.
//!
//! Network readiness gate, role repository sync, destructive action guard and the phase
//! pipeline that takes a resolved host from a live installer to a chroot handoff.

pub mod guard;
pub mod network;
pub mod pipeline;
pub mod repo_sync;
pub mod retry;
pub mod stage_runner;

use pantheon_error::ProvisionError;
use pantheon_hal::HalError;
use std::fmt::Display;

/// Wrap a HAL failure with the program and device/target it concerned.
pub fn subprocess_failure(program: &str, target: impl Display, err: HalError) -> ProvisionError {
    ProvisionError::SubprocessFailure {
        program: err.program().unwrap_or(program).to_string(),
        target: target.to_string(),
        detail: err.to_string(),
    }
}
