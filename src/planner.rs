use crate::identity::Resolution;
use crate::model::{Action, Entry, Origin, Plan};
use crate::sources::desktop::DesktopFile;
use crate::sources::mimeapps::AssociationList;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Turn duplicate groups and association lists into an ordered plan.
/// Reads nothing from disk. `unscanned` holds files that exist but could not
/// be read as entries; no override is ever written over one of them.
pub fn plan(
    resolution: &Resolution,
    lists: &[AssociationList],
    user_applications: &Path,
    unscanned: &BTreeSet<PathBuf>,
) -> Plan {
    let mut file_actions = Vec::new();
    let mut targets = BTreeSet::new();

    for group in &resolution.groups {
        for dup in &group.duplicates {
            let action = file_action(dup, &resolution.shadowing, user_applications);
            if unscanned.contains(action.target()) {
                warn!("{:?} exists but could not be read, not hiding {:?} over it", action.target(), dup.path);
                continue;
            }
            if !targets.insert(action.target().clone()) {
                debug!("{:?} is already targeted, skipping {}", action.target(), action.describe());
                continue;
            }
            debug!("{}: {}", group.key, action.describe());
            file_actions.push(action);
        }
    }

    let mut rewrites = Vec::new();
    for list in lists {
        let (clean, removed) = list.deduplicated();
        if removed > 0 {
            rewrites.push(Action::RewriteAssociationList { path: list.path.clone(), list: clean, removed });
        }
    }

    info!("Planned {} file action(s) and {} association rewrite(s)", file_actions.len(), rewrites.len());
    file_actions.extend(rewrites);
    Plan { actions: file_actions }
}

fn file_action(dup: &Entry, shadowing: &BTreeSet<String>, user_applications: &Path) -> Action {
    let name = dup.name().unwrap_or_default();

    if dup.origin == Origin::System || !dup.writable {
        // Read-only: shadow it with a same-id override in the user directory.
        return Action::CreateOverride {
            path: user_applications.join(&dup.id),
            shadows: dup.path.clone(),
            content: DesktopFile::hidden_override(name, &dup.path).render(),
        };
    }

    if shadowing.contains(&dup.id) {
        // Deleting this file would bring back the read-only entry it covers.
        return Action::CreateOverride {
            path: dup.path.clone(),
            shadows: dup.path.clone(),
            content: DesktopFile::hidden_override(name, &dup.path).render(),
        };
    }

    Action::DeleteFile { path: dup.path.clone(), origin: dup.origin }
}
