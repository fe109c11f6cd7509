use crate::error::ErrorKind;
use crate::sources::desktop::DesktopFile;
use crate::sources::mimeapps::AssociationList;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Where an entry came from. The derived order is the canonical-entry
/// preference: system entries win over user entries, which win over wine's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    System,
    User,
    WineGenerated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Visibility {
    Shown,
    NoDisplay,
    /// `Hidden=true`: the entry counts as deleted.
    Hidden,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub path: PathBuf,
    pub id: String,            // Desktop file id, e.g. "firefox.desktop"
    pub origin: Origin,
    pub writable: bool,
    pub rank: usize,           // Position of the source directory in lookup order
    pub record: DesktopFile,
}

impl Entry {
    pub fn name(&self) -> Option<&str> {
        self.record.get("Name")
    }

    pub fn exec(&self) -> Option<&str> {
        self.record.get("Exec")
    }

    pub fn mime_types(&self) -> BTreeSet<String> {
        self.record
            .get("MimeType")
            .map(|v| {
                v.split(';')
                    .map(|m| m.trim().to_lowercase())
                    .filter(|m| !m.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_application(&self) -> bool {
        self.record.get("Type") == Some("Application")
    }

    pub fn visibility(&self) -> Visibility {
        if self.record.flag("Hidden") {
            Visibility::Hidden
        } else if self.record.flag("NoDisplay") {
            Visibility::NoDisplay
        } else {
            Visibility::Shown
        }
    }
}

/// What makes two entries the same application.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentityKey {
    Launcher {
        name: String,
        exec: String,
        mime_types: BTreeSet<String>,
    },
    /// Wine's per-suffix mime handler files (`wine-extension-zip.desktop`).
    WineHandler { kind: String, suffix: String },
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKey::Launcher { name, exec, .. } => write!(f, "{} ({})", name, exec),
            IdentityKey::WineHandler { kind, suffix } => write!(f, "wine {} handler for .{}", kind, suffix),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub key: IdentityKey,
    pub canonical: Entry,
    pub duplicates: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    DeleteFile {
        path: PathBuf,
        origin: Origin,
    },
    CreateOverride {
        path: PathBuf,
        shadows: PathBuf,
        #[serde(skip)]
        content: String,
    },
    RewriteAssociationList {
        path: PathBuf,
        #[serde(skip)]
        list: AssociationList,
        removed: usize,
    },
}

impl Action {
    pub fn target(&self) -> &PathBuf {
        match self {
            Action::DeleteFile { path, .. }
            | Action::CreateOverride { path, .. }
            | Action::RewriteAssociationList { path, .. } => path,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Action::DeleteFile { path, .. } => format!("delete {}", path.display()),
            Action::CreateOverride { path, shadows, .. } => {
                format!("hide {} via {}", shadows.display(), path.display())
            }
            Action::RewriteAssociationList { path, removed, .. } => {
                format!("drop {} repeated association(s) from {}", removed, path.display())
            }
        }
    }
}

/// Ordered actions: file actions first, association rewrites last.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionError {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub wine_files_removed: usize,
    pub user_files_removed: usize,
    pub overrides_created: usize,
    pub association_entries_deduped: usize,
    pub association_lists_rewritten: usize,
    pub backups_created: usize,
    pub errors: Vec<ActionError>,
}

impl RunStats {
    pub fn mutations(&self) -> usize {
        self.wine_files_removed
            + self.user_files_removed
            + self.overrides_created
            + self.association_lists_rewritten
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
impl Entry {
    /// Entry as the scanner would produce it for a top-level file.
    pub fn fixture(path: &str, origin: Origin, content: &str) -> Entry {
        let path = PathBuf::from(path);
        Entry {
            id: path.file_name().unwrap().to_string_lossy().into_owned(),
            writable: origin != Origin::System,
            rank: if origin == Origin::System { 2 } else { 0 },
            record: DesktopFile::parse(content).unwrap(),
            origin,
            path,
        }
    }
}
