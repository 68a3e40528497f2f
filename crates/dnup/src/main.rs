mod cli;
mod commands;
mod error;
mod logging;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use dnup_platform::AppPaths;
use log::{info, warn};

use crate::cli::Cli;
use crate::settings::DnupSettings;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = match AppPaths::new() {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("dnup: {err}");
            return ExitCode::FAILURE;
        }
    };

    let settings_file = paths.settings_file();
    let (settings, settings_problem) = match DnupSettings::load_from(&settings_file) {
        Ok(settings) => (settings, None),
        Err(err) => (DnupSettings::default(), Some(err)),
    };

    logging::init_logging(
        &paths,
        cli.verbose || settings.debug_logging,
        settings.max_log_size_bytes,
    );

    if let Some(problem) = settings_problem {
        warn!("{problem}; using default settings");
    } else if !settings_file.exists()
        && let Err(err) = settings.save(&settings_file)
    {
        warn!("{err}");
    }

    match commands::run(&cli.command, &paths, &settings) {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            info!("Command failed: {err}");
            eprintln!("dnup: {err}");
            ExitCode::FAILURE
        }
    }
}
