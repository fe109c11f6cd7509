//! Filesystem capability used by the scanner, backup manager and executor.
//!
//! The engine never touches `std::fs` directly. [`RealFs`] is the production
//! implementation, [`OverlayFs`] layers copy-on-write changes over another
//! filesystem for dry runs, and `MemFs` backs the unit tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub trait FileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    /// Replace the file's content, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn remove(&self, path: &Path) -> io::Result<()>;
    /// Regular files below `dir`, sorted. Only direct children unless `recursive`.
    fn list(&self, dir: &Path, recursive: bool) -> io::Result<Vec<PathBuf>>;

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub struct RealFs;

impl FileSystem for RealFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        // Write through symlinks: the link itself must survive the rename.
        let path = &resolve_link(path)?;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        // Stage next to the target so the final rename stays on one filesystem.
        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        staged.write_all(contents)?;
        staged.as_file().sync_all()?;
        if let Ok(meta) = fs::metadata(path) {
            staged.as_file().set_permissions(meta.permissions())?;
        }
        staged.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)?;
        fs::File::open(to)?.sync_all()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn list(&self, dir: &Path, recursive: bool) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if recursive {
            for entry in WalkDir::new(dir).min_depth(1).follow_links(true) {
                let entry = entry.map_err(io::Error::from)?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                // Follows symlinks, unlike DirEntry::file_type.
                if path.is_file() {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

fn resolve_link(path: &Path) -> io::Result<PathBuf> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => fs::canonicalize(path),
        _ => Ok(path.to_path_buf()),
    }
}

/// Copy-on-write view over another filesystem. Writes and removals are kept
/// in memory; the underlying filesystem is only ever read.
pub struct OverlayFs<'a> {
    inner: &'a dyn FileSystem,
    // None marks a removed file.
    changes: RefCell<BTreeMap<PathBuf, Option<Vec<u8>>>>,
}

impl<'a> OverlayFs<'a> {
    pub fn new(inner: &'a dyn FileSystem) -> Self {
        Self { inner, changes: RefCell::new(BTreeMap::new()) }
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("{} does not exist", path.display()))
    }
}

impl FileSystem for OverlayFs<'_> {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.changes.borrow().get(path) {
            Some(Some(bytes)) => Ok(bytes.clone()),
            Some(None) => Err(Self::not_found(path)),
            None => self.inner.read(path),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.changes.borrow_mut().insert(path.to_path_buf(), Some(contents.to_vec()));
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        let bytes = self.read(from)?;
        self.write(to, &bytes)
    }

    fn exists(&self, path: &Path) -> bool {
        match self.changes.borrow().get(path) {
            Some(change) => change.is_some(),
            None => self.inner.exists(path),
        }
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        if !self.exists(path) {
            return Err(Self::not_found(path));
        }
        self.changes.borrow_mut().insert(path.to_path_buf(), None);
        Ok(())
    }

    fn list(&self, dir: &Path, recursive: bool) -> io::Result<Vec<PathBuf>> {
        let mut files = if self.inner.exists(dir) {
            self.inner.list(dir, recursive)?
        } else {
            Vec::new()
        };
        for (path, change) in self.changes.borrow().iter() {
            let inside = if recursive { path.starts_with(dir) } else { path.parent() == Some(dir) };
            if !inside {
                continue;
            }
            match change {
                Some(_) if !files.contains(path) => files.push(path.clone()),
                None => files.retain(|p| p != path),
                _ => {}
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
pub use mem::MemFs;
