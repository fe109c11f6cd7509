use crate::config::SourceDir;
use crate::error::{Error, ErrorKind};
use crate::fs::FileSystem;
use crate::model::Entry;
use log::info;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub mod desktop;
pub mod mimeapps;

pub trait Source {
    fn scan(&self, fs: &dyn FileSystem) -> Result<Scan, Error>;
}

#[derive(Debug, Default)]
pub struct Scan {
    pub entries: Vec<Entry>,
    pub issues: Vec<ScanIssue>,
}

/// A file that was skipped while reading the launcher state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanIssue {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

impl ScanIssue {
    pub fn new(path: &Path, err: &Error) -> Self {
        Self { path: path.to_path_buf(), kind: err.kind(), message: err.to_string() }
    }
}

/// Scan every configured directory in lookup order. Fails only when none of
/// them exists.
pub fn scan_all(dirs: &[SourceDir], fs: &dyn FileSystem) -> Result<Scan, Error> {
    if !dirs.iter().any(|d| fs.exists(&d.path)) {
        return Err(Error::NoUsableDirectories);
    }

    let mut all = Scan::default();
    let mut seen = BTreeSet::new();
    for (rank, dir) in dirs.iter().enumerate() {
        let source = desktop::DesktopSource { dir: dir.clone(), rank };
        let scan = match source.scan(fs) {
            Ok(scan) => scan,
            Err(e) => {
                log::warn!("{}", e);
                all.issues.push(ScanIssue::new(&dir.path, &e));
                continue;
            }
        };
        // Overlapping directories must not yield the same file twice.
        all.entries.extend(scan.entries.into_iter().filter(|e| seen.insert(e.path.clone())));
        all.issues.extend(scan.issues);
    }

    info!("Scanned {} launcher entries ({} skipped)", all.entries.len(), all.issues.len());
    Ok(all)
}
