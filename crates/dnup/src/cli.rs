use clap::{Args, Parser, Subcommand};
use dnup_backend::InstallComponent;
use std::path::PathBuf;

/// Install .NET SDKs and runtimes into user-owned roots.
#[derive(Parser, Debug)]
#[command(name = "dnup", version)]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install a component from a channel such as `9.0`, `lts` or `aspnetcore@9.0`
    Install(InstallArgs),

    /// List the channels the release index can resolve
    Channels,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Channel, optionally prefixed with a component (`runtime@lts`)
    pub spec: String,

    /// Install the SDK instead of the runtime
    #[arg(long, conflicts_with = "component")]
    pub sdk: bool,

    /// Component used when the spec has no prefix
    #[arg(long, value_parser = parse_component)]
    pub component: Option<InstallComponent>,

    /// Install root (defaults to the configured or per-user root)
    #[arg(long, value_name = "DIR")]
    pub install_path: Option<PathBuf>,

    #[arg(long, value_name = "ARCH")]
    pub architecture: Option<String>,

    /// Do not fall back to a release when `preview` has no prerelease
    #[arg(long)]
    pub no_fallback: bool,

    /// Fail instead of keeping the old muxer when it cannot be replaced
    #[arg(long)]
    pub strict_muxer: bool,
}

impl InstallArgs {
    #[must_use]
    pub fn default_component(&self) -> InstallComponent {
        if self.sdk {
            InstallComponent::Sdk
        } else {
            self.component.unwrap_or(InstallComponent::Runtime)
        }
    }
}

fn parse_component(name: &str) -> Result<InstallComponent, String> {
    InstallComponent::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = InstallComponent::ALL
            .iter()
            .map(|component| component.as_str())
            .collect();
        format!("unknown component '{name}' (expected one of {})", known.join(", "))
    })
}
