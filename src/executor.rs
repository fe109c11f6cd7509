use crate::backup::{BackupManager, BackupRecord};
use crate::error::ErrorKind;
use crate::fs::{FileSystem, OverlayFs};
use crate::model::{Action, ActionError, Origin, Plan, RunStats};
use crate::refresh::CacheRefresher;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    DryRun,
    Apply,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Nothing changed on disk.
    NotNeeded,
    /// Dry run: a refresh would have been triggered.
    Skipped,
    Done,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub stats: RunStats,
    pub refresh: RefreshOutcome,
    /// Earlier backups that no longer match the file they were taken from.
    pub drifted: Vec<BackupRecord>,
}

pub struct Executor<'a> {
    fs: &'a dyn FileSystem,
    backup_dir: PathBuf,
    refresher: &'a dyn CacheRefresher,
}

impl<'a> Executor<'a> {
    pub fn new(fs: &'a dyn FileSystem, backup_dir: impl Into<PathBuf>, refresher: &'a dyn CacheRefresher) -> Self {
        Self { fs, backup_dir: backup_dir.into(), refresher }
    }

    /// Apply the plan in order. A dry run executes the very same steps
    /// against an in-memory overlay, so nothing reaches the disk.
    pub fn run(&self, plan: &Plan, mode: Mode) -> Execution {
        match mode {
            Mode::DryRun => {
                let overlay = OverlayFs::new(self.fs);
                let (stats, drifted) = apply_plan(&overlay, &self.backup_dir, plan);
                let refresh = if stats.mutations() > 0 { RefreshOutcome::Skipped } else { RefreshOutcome::NotNeeded };
                Execution { stats, refresh, drifted }
            }
            Mode::Apply => {
                let (stats, drifted) = apply_plan(self.fs, &self.backup_dir, plan);
                let refresh = if stats.mutations() == 0 {
                    RefreshOutcome::NotNeeded
                } else {
                    match self.refresher.refresh() {
                        Ok(()) => {
                            info!("Desktop caches refreshed");
                            RefreshOutcome::Done
                        }
                        Err(e) => {
                            warn!("{}", e);
                            RefreshOutcome::Failed(e.to_string())
                        }
                    }
                };
                Execution { stats, refresh, drifted }
            }
        }
    }
}

fn apply_plan(fs: &dyn FileSystem, backup_dir: &Path, plan: &Plan) -> (RunStats, Vec<BackupRecord>) {
    let mut backups = BackupManager::new(fs, backup_dir);
    let mut stats = RunStats::default();

    for action in &plan.actions {
        match apply_action(fs, &mut backups, action) {
            Ok(()) => {
                debug!("Done: {}", action.describe());
                record_success(&mut stats, action);
            }
            Err((kind, message)) => {
                error!("Failed to {}: {}", action.describe(), message);
                stats.errors.push(ActionError { path: action.target().clone(), kind, message });
            }
        }
    }

    stats.backups_created = backups.created();
    let drifted = backups.records().filter(|r| r.drifted).cloned().collect();
    (stats, drifted)
}

fn apply_action(fs: &dyn FileSystem, backups: &mut BackupManager, action: &Action) -> Result<(), (ErrorKind, String)> {
    if let Action::DeleteFile { path, origin: Origin::System } = action {
        return Err((ErrorKind::Permission, format!("refusing to delete system file {}", path.display())));
    }

    backups
        .ensure_backup(action.target())
        .map_err(|e| (ErrorKind::Backup, format!("backup failed, file left untouched: {}", e)))?;

    let result = match action {
        Action::DeleteFile { path, .. } => fs.remove(path),
        Action::CreateOverride { path, content, .. } => fs.write(path, content.as_bytes()),
        Action::RewriteAssociationList { path, list, .. } => fs.write(path, list.render().as_bytes()),
    };
    result.map_err(|e| (ErrorKind::from(e.kind()), e.to_string()))
}

fn record_success(stats: &mut RunStats, action: &Action) {
    match action {
        Action::DeleteFile { origin: Origin::WineGenerated, .. } => stats.wine_files_removed += 1,
        Action::DeleteFile { .. } => stats.user_files_removed += 1,
        Action::CreateOverride { .. } => stats.overrides_created += 1,
        Action::RewriteAssociationList { removed, .. } => {
            stats.association_lists_rewritten += 1;
            stats.association_entries_deduped += removed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fs::MemFs;
    use crate::sources::mimeapps::AssociationList;
    use std::cell::Cell;

    struct CountingRefresher {
        calls: Cell<usize>,
        fail: bool,
    }

    impl CountingRefresher {
        fn new(fail: bool) -> Self {
            Self { calls: Cell::new(0), fail }
        }
    }

    impl CacheRefresher for CountingRefresher {
        fn refresh(&self) -> Result<(), Error> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(Error::CacheRefresh("update-desktop-database exited with 1".into()));
            }
            Ok(())
        }
    }

    fn sample_fs() -> MemFs {
        let fs = MemFs::new();
        fs.add("/home/u/apps/wine-extension-zip.desktop", "[Desktop Entry]\nName=Zip\n");
        fs.add("/home/u/apps/old-viewer.desktop", "[Desktop Entry]\nName=Viewer\n");
        fs.add("/home/u/.config/mimeapps.list", "[Default Applications]\ntext/plain=ed.desktop;ed.desktop\n");
        fs
    }

    fn sample_plan() -> Plan {
        let list = AssociationList::parse(
            Path::new("/home/u/.config/mimeapps.list"),
            "[Default Applications]\ntext/plain=ed.desktop;ed.desktop\n",
        )
        .unwrap();
        let (clean, removed) = list.deduplicated();
        Plan {
            actions: vec![
                Action::DeleteFile { path: "/home/u/apps/wine-extension-zip.desktop".into(), origin: Origin::WineGenerated },
                Action::DeleteFile { path: "/home/u/apps/old-viewer.desktop".into(), origin: Origin::User },
                Action::CreateOverride {
                    path: "/home/u/apps/viewer.desktop".into(),
                    shadows: "/usr/share/applications/viewer.desktop".into(),
                    content: "[Desktop Entry]\nType=Application\nName=Viewer\nHidden=true\n".into(),
                },
                Action::RewriteAssociationList { path: "/home/u/.config/mimeapps.list".into(), list: clean, removed },
            ],
        }
    }

    #[test]
    fn apply_executes_every_action_and_refreshes() {
        let fs = sample_fs();
        let refresher = CountingRefresher::new(false);
        let execution = Executor::new(&fs, "/backups", &refresher).run(&sample_plan(), Mode::Apply);

        let stats = &execution.stats;
        assert_eq!(stats.wine_files_removed, 1);
        assert_eq!(stats.user_files_removed, 1);
        assert_eq!(stats.overrides_created, 1);
        assert_eq!(stats.association_lists_rewritten, 1);
        assert_eq!(stats.association_entries_deduped, 1);
        assert_eq!(stats.backups_created, 3);
        assert!(stats.errors.is_empty());
        assert_eq!(execution.refresh, RefreshOutcome::Done);
        assert_eq!(refresher.calls.get(), 1);

        assert_eq!(fs.content("/home/u/apps/wine-extension-zip.desktop"), None);
        assert_eq!(
            fs.content("/backups/home/u/apps/wine-extension-zip.desktop").as_deref(),
            Some("[Desktop Entry]\nName=Zip\n")
        );
        assert_eq!(
            fs.content("/home/u/.config/mimeapps.list").as_deref(),
            Some("[Default Applications]\ntext/plain=ed.desktop\n")
        );
    }

    #[test]
    fn dry_run_predicts_without_writing() {
        let fs = sample_fs();
        let before = fs.snapshot();
        let refresher = CountingRefresher::new(false);
        let executor = Executor::new(&fs, "/backups", &refresher);

        let dry = executor.run(&sample_plan(), Mode::DryRun);
        assert_eq!(fs.snapshot(), before);
        assert_eq!(refresher.calls.get(), 0);
        assert_eq!(dry.refresh, RefreshOutcome::Skipped);

        let applied = executor.run(&sample_plan(), Mode::Apply);
        assert_eq!(dry.stats, applied.stats);
    }

    #[test]
    fn one_failure_does_not_stop_the_run() {
        let fs = sample_fs();
        fs.deny_writes("/home/u/apps/old-viewer.desktop");
        let refresher = CountingRefresher::new(false);
        let execution = Executor::new(&fs, "/backups", &refresher).run(&sample_plan(), Mode::Apply);

        let stats = &execution.stats;
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].path, PathBuf::from("/home/u/apps/old-viewer.desktop"));
        assert_eq!(stats.errors[0].kind, ErrorKind::Permission);
        assert_eq!(stats.wine_files_removed, 1);
        assert_eq!(stats.overrides_created, 1);
        assert_eq!(stats.association_lists_rewritten, 1);
        // Backed up before the failing removal was attempted.
        assert!(fs.content("/backups/home/u/apps/old-viewer.desktop").is_some());
    }

    #[test]
    fn failed_backup_leaves_file_untouched() {
        let fs = sample_fs();
        fs.deny_writes("/backups");
        let refresher = CountingRefresher::new(false);
        let execution = Executor::new(&fs, "/backups", &refresher).run(&sample_plan(), Mode::Apply);

        assert!(fs.content("/home/u/apps/wine-extension-zip.desktop").is_some());
        assert!(execution.stats.errors.iter().all(|e| e.kind == ErrorKind::Backup));
        // The override target did not exist, so it needed no backup.
        assert_eq!(execution.stats.overrides_created, 1);
        assert_eq!(execution.refresh, RefreshOutcome::Done);
    }

    #[test]
    fn refresh_failure_is_reported_not_fatal() {
        let fs = sample_fs();
        let refresher = CountingRefresher::new(true);
        let execution = Executor::new(&fs, "/backups", &refresher).run(&sample_plan(), Mode::Apply);

        assert!(matches!(execution.refresh, RefreshOutcome::Failed(_)));
        assert!(execution.stats.errors.is_empty());
        assert_eq!(fs.content("/home/u/apps/old-viewer.desktop"), None);
    }

    #[test]
    fn drifted_backups_are_reported() {
        let fs = sample_fs();
        fs.add("/backups/home/u/apps/old-viewer.desktop", "[Desktop Entry]\nName=Older Viewer\n");
        let refresher = CountingRefresher::new(false);
        let execution = Executor::new(&fs, "/backups", &refresher).run(&sample_plan(), Mode::Apply);

        assert_eq!(execution.drifted.len(), 1);
        assert_eq!(execution.drifted[0].original, PathBuf::from("/home/u/apps/old-viewer.desktop"));
        assert_eq!(execution.stats.backups_created, 2);
        assert_eq!(
            fs.content("/backups/home/u/apps/old-viewer.desktop").as_deref(),
            Some("[Desktop Entry]\nName=Older Viewer\n")
        );
    }

    #[test]
    fn empty_plan_needs_no_refresh() {
        let fs = MemFs::new();
        let refresher = CountingRefresher::new(false);
        let execution = Executor::new(&fs, "/backups", &refresher).run(&Plan::default(), Mode::Apply);
        assert_eq!(execution.refresh, RefreshOutcome::NotNeeded);
        assert_eq!(refresher.calls.get(), 0);
    }

    #[test]
    fn system_files_are_never_deleted() {
        let fs = MemFs::new();
        fs.add("/usr/share/applications/viewer.desktop", "[Desktop Entry]\nName=Viewer\n");
        let plan = Plan {
            actions: vec![Action::DeleteFile {
                path: "/usr/share/applications/viewer.desktop".into(),
                origin: Origin::System,
            }],
        };
        let refresher = CountingRefresher::new(false);
        let execution = Executor::new(&fs, "/backups", &refresher).run(&plan, Mode::Apply);
        assert_eq!(execution.stats.errors.len(), 1);
        assert!(fs.content("/usr/share/applications/viewer.desktop").is_some());
    }
}
