//! Loadout versus disk comparison.

use serde::Serialize;
use strum::Display;

use loadsync_core::{ContentHash, GamePath};

use crate::action::Action;
use crate::tree::SyncTree;

/// How a path would change if the loadout were applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum FileChangeType {
    None,
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskDiffEntry {
    pub path: GamePath,
    pub hash: Option<ContentHash>,
    pub size: Option<u64>,
    pub change: FileChangeType,
}

/// Summarise a processed tree whose previous state equals its disk state.
pub fn diff_entries(tree: &SyncTree) -> Vec<DiskDiffEntry> {
    tree.files()
        .map(|node| {
            let loadout = node.loadout.as_ref().map(|l| (l.hash, l.size));
            let disk = node.disk.as_ref().map(|d| (d.hash, d.size));
            let (change, source) = if node.actions.contains(Action::DoNothing) {
                (FileChangeType::None, loadout.or(disk))
            } else if node.actions.contains(Action::ExtractToDisk) {
                let change = if node.actions.contains(Action::DeleteFromDisk) {
                    FileChangeType::Modified
                } else {
                    FileChangeType::Added
                };
                (change, loadout)
            } else if node.actions.contains(Action::DeleteFromDisk) {
                (FileChangeType::Removed, disk)
            } else {
                (FileChangeType::None, loadout.or(disk))
            };
            DiskDiffEntry {
                path: node.path.clone(),
                hash: source.map(|(hash, _)| hash),
                size: source.map(|(_, size)| size),
                change,
            }
        })
        .collect()
}

/// Render diff entries as pretty-printed JSON.
pub fn diff_to_json(entries: &[DiskDiffEntry]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(entries)
}
