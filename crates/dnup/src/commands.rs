use dnup_backend::{ComponentSpec, InstallRoot};
use dnup_core::{
    ChannelResolver, FileReleaseIndex, InstallOptions, InstallOutcome, InstallRequest,
    InstallStatus, Installer, LocalArchiveDirectory, MuxerAction, MuxerPolicy,
};
use dnup_platform::AppPaths;
use log::{debug, info};

use crate::cli::{Command, InstallArgs};
use crate::error::CliError;
use crate::settings::DnupSettings;

/// Run one subcommand, returning the lines to print on success.
pub fn run(
    command: &Command,
    paths: &AppPaths,
    settings: &DnupSettings,
) -> Result<Vec<String>, CliError> {
    let index_file = settings
        .release_index_file
        .clone()
        .unwrap_or_else(|| paths.release_index_file());
    debug!("Loading release index from {}", index_file.display());
    let index = FileReleaseIndex::load(&index_file)?;

    match command {
        Command::Channels => Ok(ChannelResolver::new(&index).supported_channels()?),
        Command::Install(args) => install(args, &index, paths, settings),
    }
}

fn install(
    args: &InstallArgs,
    index: &FileReleaseIndex,
    paths: &AppPaths,
    settings: &DnupSettings,
) -> Result<Vec<String>, CliError> {
    let spec = ComponentSpec::parse(&args.spec, args.default_component())?;
    let root = install_root(args, paths, settings);

    let archives = LocalArchiveDirectory::new(
        settings
            .archive_dir
            .clone()
            .unwrap_or_else(|| paths.archive_dir()),
    );
    debug!("Serving archives from {}", archives.dir().display());

    let installer = Installer::for_paths(index, &archives, paths);
    let options = InstallOptions {
        no_fallback: args.no_fallback,
        muxer_policy: if args.strict_muxer || settings.strict_muxer {
            MuxerPolicy::Strict
        } else {
            MuxerPolicy::Lenient
        },
        lock_timeout: settings.lock_timeout(),
        progress: None,
    };
    let request = InstallRequest::new(root, spec.channel, spec.component).with_options(options);

    info!("Installing {} from channel {}", request.component, request.channel);
    let outcome = installer.install(&request)?;
    Ok(describe(&outcome))
}

fn install_root(args: &InstallArgs, paths: &AppPaths, settings: &DnupSettings) -> InstallRoot {
    let path = args
        .install_path
        .clone()
        .or_else(|| settings.install_root.clone())
        .unwrap_or_else(|| paths.default_install_root());
    let architecture = args
        .architecture
        .clone()
        .or_else(|| settings.architecture.clone())
        .unwrap_or_else(|| dnup_platform::default_architecture().to_string());
    InstallRoot::new(path, architecture)
}

fn describe(outcome: &InstallOutcome) -> Vec<String> {
    let mut lines = vec![match outcome.status {
        InstallStatus::Installed => format!("Installed {}", outcome.install),
        InstallStatus::AlreadyInstalled => format!("{} is already installed", outcome.install),
        InstallStatus::RecordedExisting => {
            format!("Recorded {}; files already exist", outcome.install)
        }
    }];
    match outcome.muxer {
        MuxerAction::Installed => lines.push("Installed the dotnet muxer".to_string()),
        MuxerAction::Updated => lines.push("Updated the dotnet muxer".to_string()),
        MuxerAction::KeptExistingAfterFailure => lines.push(
            "The dotnet muxer is in use and was not updated; rerun once it has exited".to_string(),
        ),
        MuxerAction::NotStaged | MuxerAction::KeptExisting => {}
    }
    lines
}
