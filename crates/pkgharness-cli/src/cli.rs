use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use pkgharness_core::{InstallerBackend, ProvisionVariant};

#[derive(Parser, Debug)]
#[command(
    name = "pkgharness",
    author,
    version,
    about = "Maintain the sandboxes used to black-box test a package manager",
    disable_help_subcommand = true
)]
pub struct HarnessCli {
    #[arg(
        long,
        env = "PKGHARNESS_CACHE",
        help = "Directory holding live sandboxes and their backups",
        global = true
    )]
    pub cache: Option<PathBuf>,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v", global = true)]
    pub trace: bool,
    #[arg(long, help = "Emit machine-readable JSON", global = true)]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: CommandKind,
}

#[derive(Subcommand, Debug)]
pub enum CommandKind {
    #[command(about = "Build a sandbox variant and store its backup")]
    Warm(WarmArgs),
    #[command(about = "Drop stored backups so the next run rebuilds them")]
    Invalidate(InvalidateArgs),
    #[command(about = "Print a JSON snapshot of a directory tree")]
    Snapshot(SnapshotArgs),
    #[command(about = "Compare two JSON snapshots (exit 1 when they differ)")]
    Diff(DiffArgs),
    #[command(about = "Remove every live sandbox and backup under the cache")]
    Clean,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct VariantArgs {
    #[arg(long, help = "Use the distribute installer variant")]
    pub distribute: bool,
    #[arg(long, help = "Give the sandbox access to the host's site-packages")]
    pub system_site_packages: bool,
}

impl VariantArgs {
    pub fn variant(self) -> ProvisionVariant {
        ProvisionVariant {
            installer: if self.distribute {
                InstallerBackend::Distribute
            } else {
                InstallerBackend::Setuptools
            },
            system_site_packages: self.system_site_packages,
        }
    }
}

#[derive(Args, Debug)]
pub struct WarmArgs {
    #[command(flatten)]
    pub variant: VariantArgs,
    #[arg(long, help = "Rebuild even when a valid backup exists")]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct InvalidateArgs {
    #[command(flatten)]
    pub variant: VariantArgs,
    #[arg(long, help = "Drop backups of every variant")]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,
    #[arg(long, help = "Skip entries whose name starts with a dot")]
    pub ignore_hidden: bool,
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    #[arg(value_name = "BEFORE")]
    pub before: PathBuf,
    #[arg(value_name = "AFTER")]
    pub after: PathBuf,
    #[arg(long = "ignore", value_name = "PREFIX", help = "Skip paths at or below PREFIX")]
    pub ignore: Vec<String>,
}
