//! Three-way sync tree joining disk, previous and desired states by path.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use loadsync_core::{
    ContentHash, Db, DiskStateEntry, EntityId, GamePath, GroupKind, ItemKind, Loadout,
    LoadoutItem, SyncPolicy,
};

use crate::action::ActionSet;
use crate::signature::Signature;

/// Which part of a loadout a desired file comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileOrigin {
    GameFiles,
    Overrides,
    /// Any other group, such as a mod.
    UserGroup,
    /// A disk snapshot rather than a loadout item.
    Snapshot,
}

/// One desired file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadoutFileEntry {
    pub path: GamePath,
    pub hash: ContentHash,
    pub size: u64,
    /// The winning loadout item, `None` for snapshot entries.
    pub item: Option<EntityId>,
    pub origin: FileOrigin,
}

impl LoadoutFileEntry {
    /// Desire the content of a disk-state entry.
    pub fn from_disk(entry: &DiskStateEntry) -> Self {
        Self {
            path: entry.path.clone(),
            hash: entry.hash,
            size: entry.size,
            item: None,
            origin: FileOrigin::Snapshot,
        }
    }
}

/// All three views of one path, plus the planned actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncTreeNode {
    pub path: GamePath,
    pub disk: Option<DiskStateEntry>,
    pub previous: Option<DiskStateEntry>,
    pub loadout: Option<LoadoutFileEntry>,
    /// Filled in by tree processing.
    pub signature: Option<Signature>,
    pub actions: ActionSet,
}

impl SyncTreeNode {
    fn new(path: GamePath) -> Self {
        Self {
            path,
            disk: None,
            previous: None,
            loadout: None,
            signature: None,
            actions: ActionSet::EMPTY,
        }
    }
}

/// File nodes keyed by path, plus a directory index for listing.
#[derive(Debug, Clone, Default)]
pub struct SyncTree {
    files: BTreeMap<GamePath, SyncTreeNode>,
    directories: BTreeMap<GamePath, BTreeSet<GamePath>>,
}

impl SyncTree {
    pub fn get(&self, path: &GamePath) -> Option<&SyncTreeNode> {
        self.files.get(path)
    }

    pub fn get_mut(&mut self, path: &GamePath) -> Option<&mut SyncTreeNode> {
        self.files.get_mut(path)
    }

    /// File nodes in path order.
    pub fn files(&self) -> impl Iterator<Item = &SyncTreeNode> {
        self.files.values()
    }

    pub fn files_mut(&mut self) -> impl Iterator<Item = &mut SyncTreeNode> {
        self.files.values_mut()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Immediate children (files and directories) of a directory.
    pub fn list_directory(&self, dir: &GamePath) -> Vec<&GamePath> {
        self.directories
            .get(dir)
            .map(|children| children.iter().collect())
            .unwrap_or_default()
    }

    fn node(&mut self, path: &GamePath) -> &mut SyncTreeNode {
        if !self.files.contains_key(path) {
            self.index_directories(path);
        }
        self.files
            .entry(path.clone())
            .or_insert_with(|| SyncTreeNode::new(path.clone()))
    }

    fn index_directories(&mut self, path: &GamePath) {
        let mut child = path.clone();
        for dir in path.ancestors() {
            let inserted = self.directories.entry(dir.clone()).or_default().insert(child);
            if !inserted {
                break;
            }
            child = dir;
        }
    }
}

/// Join the three states by path. When a state lists the same path twice the
/// first entry wins.
pub fn build_sync_tree(
    current: &[DiskStateEntry],
    previous: &[DiskStateEntry],
    desired: &[LoadoutFileEntry],
) -> SyncTree {
    let mut tree = SyncTree::default();

    for entry in desired {
        let node = tree.node(&entry.path);
        if node.loadout.is_none() {
            node.loadout = Some(entry.clone());
        }
    }
    for entry in previous {
        let node = tree.node(&entry.path);
        if node.previous.is_none() {
            node.previous = Some(entry.clone());
        }
    }
    for entry in current {
        let node = tree.node(&entry.path);
        if node.disk.is_none() {
            node.disk = Some(entry.clone());
        }
    }
    tree
}

/// Join disk states with the flattened items of `loadout`.
pub fn build_sync_tree_for_items(
    db: &Db,
    current: &[DiskStateEntry],
    previous: &[DiskStateEntry],
    loadout: &Loadout,
    policy: &dyn SyncPolicy,
) -> SyncTree {
    let desired = flatten_loadout(db, loadout, policy);
    build_sync_tree(current, previous, &desired)
}

/// Resolve a loadout's items into one desired file per path.
///
/// Disabled items (or items below a disabled group) are skipped. When several
/// items target the same path the policy picks the winner; a winning
/// tombstone removes the path altogether.
pub fn flatten_loadout(
    db: &Db,
    loadout: &Loadout,
    policy: &dyn SyncPolicy,
) -> Vec<LoadoutFileEntry> {
    let mut by_path: IndexMap<GamePath, Vec<LoadoutItem>> = IndexMap::new();
    for item in loadout.items(db) {
        let Some(path) = item.target_path() else {
            continue;
        };
        if !item.is_enabled(db) {
            continue;
        }
        by_path.entry(path.clone()).or_default().push(item);
    }

    let mut entries = Vec::with_capacity(by_path.len());
    for (path, candidates) in by_path {
        let winner = match candidates.len() {
            1 => 0,
            _ => policy.select_winning_file(db, &candidates),
        };
        let Some(item) = candidates.get(winner) else {
            debug_assert!(false, "winner {winner} out of {} candidates", candidates.len());
            continue;
        };
        match &item.kind {
            ItemKind::File { hash, size, .. } => entries.push(LoadoutFileEntry {
                path,
                hash: *hash,
                size: *size,
                item: Some(item.id),
                origin: origin_of(db, item),
            }),
            ItemKind::DeletedFile { .. } => {
                debug!(%path, "Path hidden by deleted-file item");
            }
            ItemKind::Group(_) | ItemKind::Other => {}
        }
    }
    entries
}

fn origin_of(db: &Db, item: &LoadoutItem) -> FileOrigin {
    match item.containing_group(db).and_then(|g| g.group_kind()) {
        Some(GroupKind::GameFiles) => FileOrigin::GameFiles,
        Some(GroupKind::Overrides) => FileOrigin::Overrides,
        _ => FileOrigin::UserGroup,
    }
}
