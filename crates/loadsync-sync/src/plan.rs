//! Tree processing: signatures, actions and per-action groupings.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use loadsync_core::{ContentHash, ContentStore, GamePath, SyncPolicy};

use crate::action::{Action, ActionSet};
use crate::signature::{Delta, Signature};
use crate::tree::{FileOrigin, SyncTree};

/// Paths of a processed tree grouped by action, each group in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncActionGroupings {
    groups: BTreeMap<Action, Vec<GamePath>>,
}

impl SyncActionGroupings {
    /// Group the already computed actions of every node.
    pub fn from_tree(tree: &SyncTree) -> Self {
        let mut groups: BTreeMap<Action, Vec<GamePath>> = BTreeMap::new();
        for node in tree.files() {
            for action in node.actions.iter() {
                groups.entry(action).or_default().push(node.path.clone());
            }
        }
        Self { groups }
    }

    pub fn get(&self, action: Action) -> &[GamePath] {
        self.groups.get(&action).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of paths per action.
    pub fn counts(&self) -> BTreeMap<Action, usize> {
        self.groups
            .iter()
            .map(|(action, paths)| (*action, paths.len()))
            .collect()
    }

    /// Whether applying these groupings would change nothing.
    pub fn is_noop(&self) -> bool {
        self.groups.keys().all(|action| *action == Action::DoNothing)
    }
}

/// Compute the signature and actions of every node of `tree`.
pub fn process_sync_tree(
    tree: &mut SyncTree,
    store: &dyn ContentStore,
    policy: &dyn SyncPolicy,
) -> SyncActionGroupings {
    let hashes: BTreeSet<ContentHash> = tree
        .files()
        .flat_map(|node| {
            [
                node.disk.as_ref().map(|e| e.hash),
                node.previous.as_ref().map(|e| e.hash),
                node.loadout.as_ref().map(|e| e.hash),
            ]
        })
        .flatten()
        .collect();
    let archived: HashSet<ContentHash> = hashes
        .par_iter()
        .filter(|hash| store.have_file(hash))
        .copied()
        .collect();
    let is_archived = |hash: Option<ContentHash>| hash.is_some_and(|h| archived.contains(&h));

    for node in tree.files_mut() {
        let signature = Signature {
            disk: node.disk.as_ref().map(|e| e.hash),
            previous: node.previous.as_ref().map(|e| e.hash),
            loadout: node.loadout.as_ref().map(|e| e.hash),
            disk_archived: is_archived(node.disk.as_ref().map(|e| e.hash)),
            previous_archived: is_archived(node.previous.as_ref().map(|e| e.hash)),
            loadout_archived: is_archived(node.loadout.as_ref().map(|e| e.hash)),
            path_is_ignored: policy.is_ignored_backup_path(&node.path),
        };

        // A game file the user deleted is remembered rather than restored.
        let reified_delete = signature.disk_delta() == Delta::Removed
            && signature.loadout_delta() == Delta::Unchanged
            && node
                .loadout
                .as_ref()
                .is_some_and(|l| l.origin == FileOrigin::GameFiles);

        node.actions = if reified_delete {
            ActionSet::single(Action::AddReifiedDelete)
        } else {
            signature.actions()
        };
        node.signature = Some(signature);
    }

    let groupings = SyncActionGroupings::from_tree(tree);
    debug!(paths = tree.len(), counts = ?groupings.counts(), "Processed sync tree");
    groupings
}

/// Remove `actions` from every node, turning emptied nodes into no-ops, and
/// regroup.
pub fn strip_actions(tree: &mut SyncTree, actions: ActionSet) -> SyncActionGroupings {
    for node in tree.files_mut() {
        let mut remaining = node.actions.without(actions);
        if remaining.is_empty() {
            remaining.insert(Action::DoNothing);
        }
        node.actions = remaining;
    }
    SyncActionGroupings::from_tree(tree)
}
