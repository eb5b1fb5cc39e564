//! Dry-run planning: what a sync cycle would do to a local tree, without touching it.

use crate::path_utils::LongshipPath;
use crate::{EntryKind, LocalEntry, ManifestEntry};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    /// Entry is missing locally.
    Create { path: String, kind: EntryKind },
    /// Same kind, different content.
    Update { path: String, kind: EntryKind },
    /// Local entry has the wrong kind and will be removed first.
    Replace {
        path: String,
        from: EntryKind,
        to: EntryKind,
    },
    /// Unlisted local entry under a deletable prefix.
    Delete { path: String },
}

impl PlanAction {
    pub fn path(&self) -> &str {
        match self {
            PlanAction::Create { path, .. }
            | PlanAction::Update { path, .. }
            | PlanAction::Replace { path, .. }
            | PlanAction::Delete { path } => path,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub actions: Vec<PlanAction>,
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn deletes(&self) -> impl Iterator<Item = &PlanAction> {
        self.actions
            .iter()
            .filter(|a| matches!(a, PlanAction::Delete { .. }))
    }

    pub fn transfers(&self) -> impl Iterator<Item = &PlanAction> {
        self.actions
            .iter()
            .filter(|a| !matches!(a, PlanAction::Delete { .. }))
    }
}

/// Compare a manifest against a hashed local walk.
///
/// `local` should come from a hashing walk; entries without a digest are treated as
/// changed.
pub fn plan(remote: &[ManifestEntry], local: &[LocalEntry], deletable_prefixes: &[String]) -> SyncPlan {
    let local_map: HashMap<String, &LocalEntry> = local
        .iter()
        .map(|l| (LongshipPath::canonicalize(&l.relative_path), l))
        .collect();

    let mut actions = Vec::new();
    let mut unchanged = 0;
    let mut listed = HashSet::new();

    for entry in remote {
        let key = LongshipPath::canonicalize(&entry.relative_path);
        // Parents of listed entries are implicitly listed even when the manifest omits them.
        for parent in LongshipPath::ancestors(&key) {
            listed.insert(parent.to_string());
        }
        listed.insert(key.clone());

        match local_map.get(&key) {
            None => actions.push(PlanAction::Create {
                path: entry.relative_path.clone(),
                kind: entry.kind,
            }),
            Some(l) if l.kind != entry.kind => actions.push(PlanAction::Replace {
                path: entry.relative_path.clone(),
                from: l.kind,
                to: entry.kind,
            }),
            Some(_) if entry.kind == EntryKind::Directory => unchanged += 1,
            Some(l) => {
                let same = !entry.content_hash.is_empty()
                    && l
                        .content_hash
                        .as_deref()
                        .is_some_and(|h| h.eq_ignore_ascii_case(&entry.content_hash));
                if same {
                    unchanged += 1;
                } else {
                    actions.push(PlanAction::Update {
                        path: entry.relative_path.clone(),
                        kind: entry.kind,
                    });
                }
            }
        }
    }

    let mut deleted: Vec<&str> = Vec::new();
    for l in local {
        if listed.contains(&LongshipPath::canonicalize(&l.relative_path)) {
            continue;
        }
        if !deletable_prefixes
            .iter()
            .any(|p| LongshipPath::is_under_prefix(&l.relative_path, p))
        {
            continue;
        }
        // A removed directory takes its children with it.
        if deleted
            .iter()
            .any(|d| LongshipPath::is_under_prefix(&l.relative_path, d))
        {
            continue;
        }
        deleted.push(&l.relative_path);
        actions.push(PlanAction::Delete {
            path: l.relative_path.clone(),
        });
    }

    SyncPlan { actions, unchanged }
}
