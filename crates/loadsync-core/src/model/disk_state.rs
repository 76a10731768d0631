//! Persisted disk-state entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Attribute, Db, EntityId, Transaction, Value};
use crate::hash::ContentHash;
use crate::path::GamePath;

/// What the synchronizer knows about one file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskStateEntry {
    pub id: EntityId,
    pub path: GamePath,
    pub hash: ContentHash,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// The installation record this entry belongs to.
    pub game: EntityId,
}

/// A full disk snapshot, ordered by path.
pub type DiskState = Vec<DiskStateEntry>;

impl DiskStateEntry {
    /// Load an entry, `None` if the entity is not a disk-state entry.
    pub fn load(db: &Db, id: EntityId) -> Option<Self> {
        let entity = db.get(id)?;
        Some(Self {
            id,
            path: entity.get_path(Attribute::DiskPath)?.clone(),
            hash: entity.get_hash(Attribute::DiskHash)?,
            size: entity.get_u64(Attribute::DiskSize)?,
            last_modified: entity.get_time(Attribute::DiskLastModified)?,
            game: entity.get_ref(Attribute::DiskGame)?,
        })
    }

    /// Every entry of an installation, sorted by path.
    pub fn all_for_game(db: &Db, game: EntityId) -> DiskState {
        let mut entries: DiskState = db
            .entities_with(Attribute::DiskGame, &Value::Ref(game))
            .into_iter()
            .filter_map(|id| Self::load(db, id))
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Record a new entry, returning its temporary id.
    pub fn insert(
        tx: &mut Transaction,
        game: EntityId,
        path: GamePath,
        hash: ContentHash,
        size: u64,
        last_modified: DateTime<Utc>,
    ) -> EntityId {
        let id = tx.temp_id();
        tx.add(id, Attribute::DiskPath, path);
        tx.add(id, Attribute::DiskHash, hash);
        tx.add(id, Attribute::DiskSize, size);
        tx.add(id, Attribute::DiskLastModified, last_modified);
        tx.add(id, Attribute::DiskGame, game);
        id
    }

    /// Overwrite the content fields of an existing entry.
    pub fn update(
        &self,
        tx: &mut Transaction,
        hash: ContentHash,
        size: u64,
        last_modified: DateTime<Utc>,
    ) {
        tx.add(self.id, Attribute::DiskHash, hash);
        tx.add(self.id, Attribute::DiskSize, size);
        tx.add(self.id, Attribute::DiskLastModified, last_modified);
    }

    /// Refresh only the modification time.
    pub fn touch(&self, tx: &mut Transaction, last_modified: DateTime<Utc>) {
        tx.add(self.id, Attribute::DiskLastModified, last_modified);
    }

    /// Remove the entry.
    pub fn retract(&self, tx: &mut Transaction) {
        tx.delete(self.id, false);
    }
}
