use std::{fs, path::Path};

use atty::Stream;
use clap::Parser;
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use pkgharness_core::{
    diff, remove_tree, snapshot, BackupStore, ChangeSet, Harness, HarnessConfig, Snapshot, SnapshotOptions,
    VenvProvisioner,
};
use serde_json::json;

mod cli;
mod style;

use cli::{CommandKind, DiffArgs, HarnessCli, InvalidateArgs, SnapshotArgs, WarmArgs};
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = HarnessCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let mut config = HarnessConfig::from_env();
    if let Some(cache) = &cli.cache {
        config.cache_root.clone_from(cache);
    }
    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    let code = match &cli.command {
        CommandKind::Warm(args) => warm(&cli, &style, config, args)?,
        CommandKind::Invalidate(args) => invalidate(&cli, &style, &config, args)?,
        CommandKind::Snapshot(args) => snapshot_tree(args)?,
        CommandKind::Diff(args) => diff_snapshots(&cli, &style, args)?,
        CommandKind::Clean => clean(&cli, &style, &config)?,
    };

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("pkgharness_core={level},pkgharness={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn warm(cli: &HarnessCli, style: &Style, config: HarnessConfig, args: &WarmArgs) -> Result<i32> {
    let variant = args.variant.variant();
    let mut harness = Harness::new(config, VenvProvisioner::new())?;
    if args.force {
        harness.force_rebuild(&variant)?;
    }
    harness.warm(&variant)?;
    let tool = harness.config().tool.name.clone();
    let manifest = harness
        .backups()
        .lookup(&variant, &tool)
        .ok_or_else(|| eyre!("backup for '{}' missing after warm", variant.tag()))?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    } else {
        println!(
            "{}",
            style.ok(&format!(
                "sandbox '{}' ready in {}",
                variant.tag(),
                harness.backups().root().display()
            ))
        );
    }
    Ok(0)
}

fn invalidate(
    cli: &HarnessCli,
    style: &Style,
    config: &HarnessConfig,
    args: &InvalidateArgs,
) -> Result<i32> {
    let store = BackupStore::new(config.backup_dir());
    let removed: Vec<String> = if args.all {
        store.clear()?
    } else {
        let variant = args.variant.variant();
        store.invalidate(&variant)?;
        vec![variant.tag().to_string()]
    };
    if cli.json {
        println!("{}", json!({ "invalidated": removed }));
    } else {
        println!(
            "{}",
            style.ok(&format!("invalidated backups: {}", removed.join(", ")))
        );
    }
    Ok(0)
}

fn snapshot_tree(args: &SnapshotArgs) -> Result<i32> {
    let options = SnapshotOptions {
        ignore_hidden: args.ignore_hidden,
    };
    let snap = snapshot(&args.dir, options)?;
    println!("{}", serde_json::to_string_pretty(&snap)?);
    Ok(0)
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let contents =
        fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .wrap_err_with(|| format!("{} is not a snapshot", path.display()))
}

fn diff_snapshots(cli: &HarnessCli, style: &Style, args: &DiffArgs) -> Result<i32> {
    let before = read_snapshot(&args.before)?;
    let after = read_snapshot(&args.after)?;
    let changes = diff(&before, &after, &args.ignore);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
    } else {
        print_changes(style, &changes);
    }
    Ok(i32::from(!changes.is_empty()))
}

fn print_changes(style: &Style, changes: &ChangeSet) {
    if changes.is_empty() {
        println!("{}", style.ok("no changes"));
        return;
    }
    for (label, entries) in changes.groups() {
        if entries.is_empty() {
            continue;
        }
        println!("{}", style.label(&format!("{label}:")));
        for (path, record) in entries {
            let detail = if record.is_dir() {
                "dir".to_string()
            } else {
                format!("{} bytes", record.size)
            };
            println!("  {path} {}", style.dim(&format!("({detail})")));
        }
    }
}

fn clean(cli: &HarnessCli, style: &Style, config: &HarnessConfig) -> Result<i32> {
    let mut removed = Vec::new();
    for dir in [config.live_dir(), config.backup_dir()] {
        if !dir.exists() {
            continue;
        }
        remove_tree(&dir).wrap_err_with(|| format!("failed to remove {}", dir.display()))?;
        removed.push(dir.display().to_string());
    }
    if cli.json {
        println!("{}", json!({ "removed": removed }));
    } else if removed.is_empty() {
        println!("{}", style.ok("nothing to clean"));
    } else {
        println!("{}", style.ok(&format!("removed {}", removed.join(", "))));
    }
    Ok(0)
}
