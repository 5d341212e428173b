//! pantheon installer entry points.

use anyhow::Result;
use pantheon_core::cli::Cli;
use pantheon_core::hosts;
use pantheon_core::settings::Settings;
use pantheon_error::ProvisionError;
use pantheon_hal::SystemHal;
use pantheon_workflow::guard::{ConfirmationPort, DestructiveGuard};
use pantheon_workflow::pipeline::{self, PhaseContext};
use pantheon_workflow::stage_runner::{PhaseRunner, ProvisionState};
use std::time::Duration;

/// Provision the host named on the command line.
pub fn run(
    cli: &Cli,
    hal: &dyn SystemHal,
    settings: &Settings,
    port: impl ConfirmationPort + 'static,
    sleep: &dyn Fn(Duration),
) -> Result<ProvisionState> {
    if !hal.is_root() {
        return Err(ProvisionError::NotPrivileged.into());
    }

    let profile = hosts::resolve(&cli.host).map_err(ProvisionError::from)?;
    log::info!(
        "Resolved {}: kernel {}, staging root {}",
        profile.host,
        profile.kernel,
        settings.target_root.display()
    );

    let mut ctx = PhaseContext::new(hal, settings, &profile, DestructiveGuard::new(port), sleep);
    let mut runner = PhaseRunner::new();
    let result = pipeline::provision(&mut ctx, &mut runner);

    let failed = ctx.failed_operations().count();
    log::info!(
        "{} external operation(s), {} failed, final state {:?}",
        ctx.ledger.len(),
        failed,
        runner.state()
    );
    if let Ok(json) = serde_json::to_string(&ctx.ledger) {
        log::debug!("Operation ledger: {json}");
    }
    result
}

/// Process exit status for a failed run.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .map(pantheon_error::exit_code_for)
        .find(|code| *code != 1)
        .unwrap_or(1)
}
