//! Per-game synchronization policy.

use std::fmt;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::db::{Db, EntityId, Transaction};
use crate::hash::ContentHash;
use crate::model::{GroupKind, Loadout, LoadoutItem};
use crate::path::GamePath;

/// A file item created by ingesting a new file from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedEntry {
    /// Id of the new loadout item (temporary until commit).
    pub item: EntityId,
    pub path: GamePath,
    pub hash: ContentHash,
    pub size: u64,
}

/// Customization points of the synchronizer.
///
/// Every method has a default, so a game only overrides what it needs.
pub trait SyncPolicy: Send + Sync + fmt::Debug {
    /// Pick the winning item among candidates for the same path. Returns an
    /// index into `candidates`, which is never empty.
    fn select_winning_file(&self, db: &Db, candidates: &[LoadoutItem]) -> usize {
        default_winner(db, candidates)
    }

    /// Paths that are never scanned, ingested or backed up.
    fn is_ignored_path(&self, _path: &GamePath) -> bool {
        false
    }

    /// Paths that are tracked but never backed up.
    fn is_ignored_backup_path(&self, _path: &GamePath) -> bool {
        false
    }

    /// Relocate freshly ingested files, which start out in the Overrides
    /// group, into more fitting groups.
    fn move_new_files_to_groups(
        &self,
        _db: &Db,
        _loadout: &Loadout,
        _added: &[AddedEntry],
        _tx: &mut Transaction,
    ) {
    }
}

/// Priority of a file item, higher wins.
///
/// Game Files rank lowest, Overrides highest, and any other group ranks by
/// its creation time in Unix seconds.
pub fn item_priority(db: &Db, item: &LoadoutItem) -> i64 {
    let Some(group) = item.containing_group(db) else {
        debug_assert!(false, "loadout item {} has no containing group", item.id);
        return 0;
    };
    match group.group_kind() {
        Some(GroupKind::GameFiles) => 0,
        Some(GroupKind::Overrides) => i64::MAX,
        _ => group.created_at.timestamp(),
    }
}

/// Highest priority candidate; on a tie the first candidate wins.
pub fn default_winner(db: &Db, candidates: &[LoadoutItem]) -> usize {
    let mut best = 0;
    let mut best_priority = i64::MIN;
    for (idx, item) in candidates.iter().enumerate() {
        let priority = item_priority(db, item);
        if idx == 0 || priority > best_priority {
            best = idx;
            best_priority = priority;
        }
    }
    best
}

/// Policy driven by [`SyncConfig`] glob patterns.
#[derive(Debug, Clone)]
pub struct DefaultPolicy {
    ignored: GlobSet,
    ignored_backup: GlobSet,
}

impl DefaultPolicy {
    /// Compile the ignore patterns of a config.
    pub fn from_config(config: &SyncConfig) -> Result<Self, globset::Error> {
        Ok(Self {
            ignored: compile(&config.ignore_patterns)?,
            ignored_backup: compile(&config.ignore_backup_patterns)?,
        })
    }
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self {
            ignored: GlobSet::empty(),
            ignored_backup: GlobSet::empty(),
        }
    }
}

fn compile(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

impl SyncPolicy for DefaultPolicy {
    fn is_ignored_path(&self, path: &GamePath) -> bool {
        self.ignored.is_match(path.path())
    }

    fn is_ignored_backup_path(&self, path: &GamePath) -> bool {
        self.ignored.is_match(path.path()) || self.ignored_backup.is_match(path.path())
    }
}
