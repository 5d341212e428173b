use chrono::Local;
use clap::Parser;
use pantheon_core::cli::Cli;
use pantheon_core::logging;
use pantheon_core::settings::Settings;
use pantheon_hal::LinuxHal;
use pantheon_workflow::guard::TerminalPrompt;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let started = Local::now();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("ERROR: {err:#}");
            return ExitCode::from(2);
        }
    };

    let log_path = logging::init(&settings.log_dir, &started);
    if let Some(path) = &log_path {
        log::info!("Logging to {}", path.display());
    }

    let hal = LinuxHal::new();
    match pantheon_installer::run(&cli, &hal, &settings, TerminalPrompt, &std::thread::sleep) {
        Ok(_) => {
            log::info!("Done. Reboot into the new system when ready.");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err:#}");
            if let Some(path) = &log_path {
                log::error!("Full log: {}", path.display());
            }
            ExitCode::from(pantheon_installer::exit_code(&err))
        }
    }
}
