//! Duplicate detection.
//!
//! Entries are keyed by what the user sees in an "Open With" menu (name,
//! command and handled mime types) and each group keeps one canonical entry.

use crate::model::{DuplicateGroup, Entry, IdentityKey, Origin, Visibility};
use crate::sources::desktop::wine_handler;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ffi::OsStr;

#[derive(Debug, Default)]
pub struct Resolution {
    pub groups: Vec<DuplicateGroup>,
    /// Ids of writable files that currently shadow a read-only entry.
    pub shadowing: BTreeSet<String>,
}

pub fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Executable basename of an `Exec` line, lowercased.
pub fn normalize_exec(exec: &str) -> String {
    let exec = exec.trim();
    let program = match exec.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or_default(),
        None => exec.split_whitespace().next().unwrap_or_default(),
    };
    program.rsplit('/').next().unwrap_or(program).to_lowercase()
}

pub fn identity_key(entry: &Entry) -> IdentityKey {
    let file_name = entry.path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
    if let Some((kind, suffix)) = wine_handler(file_name) {
        return IdentityKey::WineHandler { kind, suffix };
    }
    IdentityKey::Launcher {
        name: normalize_name(entry.name().unwrap_or_default()),
        exec: normalize_exec(entry.exec().unwrap_or_default()),
        mime_types: entry.mime_types(),
    }
}

/// Ordering used to pick the canonical entry: system before user before
/// wine, displayed before NoDisplay, then by path.
fn preference(entry: &Entry) -> (Origin, Visibility, &OsStr) {
    (entry.origin, entry.visibility(), entry.path.as_os_str())
}

/// Entries a desktop would actually show. A read-only entry (every system
/// entry) is invisible when a writable file has the same id, or when an
/// earlier read-only directory does.
fn visible<'a>(entries: &'a [Entry], shadowing: &mut BTreeSet<String>) -> Vec<&'a Entry> {
    let local_ids: BTreeSet<&str> = entries
        .iter()
        .filter(|e| e.writable)
        .map(|e| e.id.as_str())
        .collect();

    let mut first_readonly: HashMap<&str, usize> = HashMap::new();
    for entry in entries.iter().filter(|e| !e.writable) {
        let rank = first_readonly.entry(entry.id.as_str()).or_insert(entry.rank);
        *rank = (*rank).min(entry.rank);
        if local_ids.contains(entry.id.as_str()) {
            shadowing.insert(entry.id.clone());
        }
    }

    entries
        .iter()
        .filter(|e| {
            e.writable
                || (!local_ids.contains(e.id.as_str()) && first_readonly.get(e.id.as_str()) == Some(&e.rank))
        })
        .collect()
}

/// Group entries into duplicate sets. The result depends only on the set of
/// entries, not on their order.
pub fn resolve(entries: &[Entry]) -> Resolution {
    let mut resolution = Resolution::default();

    let mut buckets: BTreeMap<IdentityKey, Vec<&Entry>> = BTreeMap::new();
    for entry in visible(entries, &mut resolution.shadowing) {
        if !entry.is_application() || entry.visibility() == Visibility::Hidden {
            continue;
        }
        buckets.entry(identity_key(entry)).or_default().push(entry);
    }

    for (key, mut members) in buckets {
        if members.len() < 2 {
            continue;
        }
        members.sort_by(|a, b| preference(a).cmp(&preference(b)));
        let canonical = members[0].clone();
        debug!("{}: keeping {:?}, {} duplicate(s)", key, canonical.path, members.len() - 1);
        resolution.groups.push(DuplicateGroup {
            key,
            canonical,
            duplicates: members[1..].iter().map(|e| (*e).clone()).collect(),
        });
    }

    info!("Found {} applications with duplicates", resolution.groups.len());
    resolution
}
