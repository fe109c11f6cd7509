//! Write-once backups of every file the executor is about to change.
//!
//! A backup lives at `<backup dir>/<absolute path of the original>`. Once it
//! exists it is never replaced, so it always holds the content from before
//! the first run that touched the file.

use crate::error::Error;
use crate::fs::FileSystem;
use log::{debug, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupRecord {
    pub original: PathBuf,
    pub backup: PathBuf,
    /// SHA-256 of the backed up content.
    pub hash: String,
    /// The live file no longer matches a backup taken by an earlier run.
    pub drifted: bool,
}

pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub struct BackupManager<'a> {
    fs: &'a dyn FileSystem,
    root: PathBuf,
    // None: the path had no content to back up.
    records: BTreeMap<PathBuf, Option<BackupRecord>>,
    created: usize,
}

impl<'a> BackupManager<'a> {
    pub fn new(fs: &'a dyn FileSystem, root: impl Into<PathBuf>) -> Self {
        Self { fs, root: root.into(), records: BTreeMap::new(), created: 0 }
    }

    pub fn backup_path(&self, original: &Path) -> PathBuf {
        let relative: PathBuf = original
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.root.join(relative)
    }

    /// Make sure the current content of `path` is saved before it is mutated.
    /// Returns `None` when there is nothing to save (the file does not exist yet).
    pub fn ensure_backup(&mut self, path: &Path) -> Result<Option<BackupRecord>, Error> {
        if let Some(record) = self.records.get(path) {
            return Ok(record.clone());
        }

        if !self.fs.exists(path) {
            debug!("{:?} does not exist yet, nothing to back up", path);
            self.records.insert(path.to_path_buf(), None);
            return Ok(None);
        }

        let live = self.fs.read(path).map_err(|e| Error::io(path, e))?;
        let live_hash = content_hash(&live);
        let backup = self.backup_path(path);

        let record = if self.fs.exists(&backup) {
            let stored = self.fs.read(&backup).map_err(|e| Error::io(&backup, e))?;
            let hash = content_hash(&stored);
            let drifted = hash != live_hash;
            if drifted {
                warn!("{:?} changed since {:?} was taken; keeping the older backup", path, backup);
            } else {
                debug!("Backup {:?} already up to date", backup);
            }
            BackupRecord { original: path.to_path_buf(), backup, hash, drifted }
        } else {
            self.fs.copy(path, &backup).map_err(|e| Error::io(&backup, e))?;
            self.created += 1;
            debug!("Backed up {:?} to {:?}", path, backup);
            BackupRecord { original: path.to_path_buf(), backup, hash: live_hash, drifted: false }
        };

        self.records.insert(path.to_path_buf(), Some(record.clone()));
        Ok(Some(record))
    }

    /// Backups written during this run.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Every backup consulted this run, including ones left by earlier runs.
    pub fn records(&self) -> impl Iterator<Item = &BackupRecord> {
        self.records.values().flatten()
    }
}
