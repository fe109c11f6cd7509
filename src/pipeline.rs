//! Scan, resolve, plan and execute: the whole cleanup behind one call.

use crate::backup::BackupRecord;
use crate::config::Config;
use crate::error::Error;
use crate::executor::{Executor, Mode, RefreshOutcome};
use crate::fs::FileSystem;
use crate::identity;
use crate::model::{Plan, RunStats};
use crate::planner;
use crate::refresh::CacheRefresher;
use crate::sources::{self, ScanIssue, mimeapps};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// A plan together with the files that had to be skipped to build it.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub plan: Plan,
    pub issues: Vec<ScanIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub plan: Plan,
    pub stats: RunStats,
    pub issues: Vec<ScanIssue>,
    pub refresh: RefreshOutcome,
    pub drifted_backups: Vec<BackupRecord>,
}

/// Read the current launcher state and decide what to change. Read-only.
pub fn prepare(config: &Config, fs: &dyn FileSystem) -> Result<Prepared, Error> {
    let mut scan = sources::scan_all(&config.source_dirs(), fs)?;
    let (lists, list_issues) = mimeapps::load_lists(&config.association_lists(), fs);
    scan.issues.extend(list_issues);

    let unscanned: BTreeSet<PathBuf> = scan.issues.iter().map(|i| i.path.clone()).collect();
    let resolution = identity::resolve(&scan.entries);
    let plan = planner::plan(&resolution, &lists, &config.user_applications, &unscanned);
    Ok(Prepared { plan, issues: scan.issues })
}

pub fn execute(
    config: &Config,
    prepared: Prepared,
    mode: Mode,
    fs: &dyn FileSystem,
    refresher: &dyn CacheRefresher,
) -> RunReport {
    let execution = Executor::new(fs, &config.backup_dir, refresher).run(&prepared.plan, mode);
    RunReport {
        mode,
        plan: prepared.plan,
        stats: execution.stats,
        issues: prepared.issues,
        refresh: execution.refresh,
        drifted_backups: execution.drifted,
    }
}

/// Prepare and execute in one go, without a confirmation step in between.
pub fn run(
    config: &Config,
    mode: Mode,
    fs: &dyn FileSystem,
    refresher: &dyn CacheRefresher,
) -> Result<RunReport, Error> {
    let prepared = prepare(config, fs)?;
    Ok(execute(config, prepared, mode, fs, refresher))
}
