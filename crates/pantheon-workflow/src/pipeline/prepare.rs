//! Init -> NetworkReady: wireless association, reachability and role sync.

use super::context::PhaseContext;
use crate::network;
use crate::repo_sync::{self, SyncReport};
use anyhow::Result;
use pantheon_core::hosts::{common_roles, workstation_roles, RoleRepository};
use pantheon_error::ProvisionError;

fn sync_roles(ctx: &mut PhaseContext<'_>, repos: &[RoleRepository]) -> Result<()> {
    let mut report = SyncReport::new(&ctx.settings.roles_dir());
    let synced = repo_sync::sync_into(ctx.hal, repos, &mut report);
    for entry in &report.entries {
        ctx.note(entry.action.program(), &entry.name, true);
    }
    ctx.sync_reports.push(report);
    if let Err(ProvisionError::SubprocessFailure {
        program, target, ..
    }) = &synced
    {
        ctx.note(program, target, false);
    }
    synced?;
    Ok(())
}

/// Run the reachability gate and note its outcome in the ledger.
pub(super) fn probe_network(ctx: &mut PhaseContext<'_>) -> Result<(), ProvisionError> {
    let settings = ctx.settings;
    let reachable = network::wait_for_network(
        ctx.hal,
        &settings.probe_host,
        settings.probe_attempts,
        ctx.sleep,
    );
    ctx.note("ping", &settings.probe_host, reachable.is_ok());
    reachable
}

pub fn network_ready(ctx: &mut PhaseContext<'_>) -> Result<()> {
    let profile = ctx.profile;
    let settings = ctx.settings;

    if profile.flags.requires_wifi {
        let associated = network::associate_wireless(ctx.hal, &settings.wifi, ctx.sleep);
        ctx.note("iwctl", &settings.wifi.ssid, associated);
        if !associated {
            log::warn!(
                "{}: wireless association failed; relying on the reachability probe",
                profile.host
            );
        }
    } else {
        log::info!("{}: wired host, skipping wireless association", profile.host);
    }

    probe_network(ctx)?;

    sync_roles(ctx, &common_roles())?;
    if profile.flags.is_workstation {
        sync_roles(ctx, &workstation_roles())?;
    }

    for report in &ctx.sync_reports {
        if let Ok(json) = serde_json::to_string(report) {
            log::debug!("Sync report: {json}");
        }
    }
    Ok(())
}
