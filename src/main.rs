mod backup;
mod config;
mod error;
mod executor;
mod fs;
mod identity;
mod model;
mod pipeline;
mod planner;
mod refresh;
mod sources;

use anyhow::{Result, bail};
use clap::Parser;
use crate::config::{WineDir, load_config};
use crate::executor::{Mode, RefreshOutcome};
use crate::fs::RealFs;
use crate::pipeline::{Prepared, RunReport};
use crate::refresh::{CacheRefresher, CommandRefresher, NoRefresh};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Remove duplicate applications from \"Open With\" menus", long_about = None)]
struct Args {
    /// Show what would be done without making changes
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Apply without asking for confirmation
    #[arg(short = 'y', long, alias = "auto")]
    yes: bool,

    /// Show detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Configuration file (default: ~/.config/launcher-dedup/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// User launcher directory
    #[arg(long)]
    user_dir: Option<PathBuf>,

    /// System launcher directory, in lookup order (repeatable)
    #[arg(long = "system-dir")]
    system_dirs: Vec<PathBuf>,

    /// Wine menu directory, scanned recursively (repeatable)
    #[arg(long = "wine-dir")]
    wine_dirs: Vec<PathBuf>,

    /// Where backups of changed files are kept
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Do not run update-desktop-database / update-mime-database afterwards
    #[arg(long)]
    no_refresh: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    if nix::unistd::geteuid().is_root() {
        bail!("refusing to run as root: only the invoking user's launchers are cleaned");
    }

    // 1. Load Config, then let flags override it
    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.user_dir {
        config.user_applications = dir;
    }
    if !args.system_dirs.is_empty() {
        config.system_applications = args.system_dirs;
    }
    if !args.wine_dirs.is_empty() {
        config.wine = args
            .wine_dirs
            .into_iter()
            .map(|path| WineDir { path, recursive: true, writable: true })
            .collect();
    }
    if let Some(dir) = args.backup_dir {
        config.backup_dir = dir;
    }
    if args.no_refresh {
        config.refresh.enabled = false;
    }

    // 2. Plan and execute, asking first unless told not to
    let mode = if args.dry_run { Mode::DryRun } else { Mode::Apply };
    let refresher: Box<dyn CacheRefresher> = if config.refresh.enabled {
        Box::new(CommandRefresher::from_config(&config))
    } else {
        Box::new(NoRefresh)
    };

    let report = if mode == Mode::DryRun || args.yes {
        pipeline::run(&config, mode, &RealFs, refresher.as_ref())?
    } else {
        let prepared = pipeline::prepare(&config, &RealFs)?;
        if !prepared.plan.is_empty() && !confirm(&prepared)? {
            println!("Operation cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
        pipeline::execute(&config, prepared, mode, &RealFs, refresher.as_ref())
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, &config.backup_dir);
    }

    Ok(if report.stats.has_errors() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn confirm(prepared: &Prepared) -> Result<bool> {
    println!("{} change(s) will be made (backups are kept):", prepared.plan.len());
    for action in &prepared.plan.actions {
        println!("  - {}", action.describe());
    }
    print!("Continue? (y/N): ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_summary(report: &RunReport, backup_dir: &std::path::Path) {
    let stats = &report.stats;
    let dry = report.mode == Mode::DryRun;

    if dry && !report.plan.is_empty() {
        println!("Planned changes:");
        for action in &report.plan.actions {
            println!("  - {}", action.describe());
        }
    }
    for issue in &report.issues {
        println!("Skipped: {}", issue.message);
    }

    println!("Summary:");
    println!("  Wine files removed:        {}", stats.wine_files_removed);
    println!("  User duplicates removed:   {}", stats.user_files_removed);
    println!("  System duplicates hidden:  {}", stats.overrides_created);
    println!("  Repeated associations:     {}", stats.association_entries_deduped);
    println!("  Backups created:           {}", stats.backups_created);

    for err in &stats.errors {
        println!("  Error: {} ({}): {}", err.path.display(), err.kind, err.message);
    }
    for record in &report.drifted_backups {
        println!(
            "  Warning: {} changed since {} was taken; the older backup was kept",
            record.original.display(),
            record.backup.display()
        );
    }
    if let RefreshOutcome::Failed(reason) = &report.refresh {
        println!("  Cache refresh failed: {}", reason);
    }

    if dry {
        println!("Dry run: no changes were made.");
    } else if report.plan.is_empty() {
        println!("Nothing to clean.");
    } else if stats.backups_created > 0 {
        println!("Done. Backups are in {}", backup_dir.display());
    } else {
        println!("Done.");
    }
}
