//! Loadouts and their items.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::db::{Attribute, Db, EntityId, Transaction, Value};
use crate::hash::ContentHash;
use crate::path::GamePath;

/// Kind of a loadout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum LoadoutKind {
    /// A user-visible loadout.
    Default,
    /// Hidden loadout mirroring the unmodded game.
    VanillaState,
}

/// A named, user-declared desired state for a game installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    pub id: EntityId,
    pub name: CompactString,
    pub short_name: CompactString,
    pub installation: EntityId,
    pub kind: LoadoutKind,
    pub revision: u64,
    pub last_applied: Option<DateTime<Utc>>,
}

/// Fields of a loadout about to be created.
#[derive(Debug, Clone)]
pub struct NewLoadout {
    pub name: CompactString,
    pub short_name: CompactString,
    pub installation: EntityId,
    pub kind: LoadoutKind,
}

impl NewLoadout {
    /// Add the loadout entity to `tx`, returning its temporary id.
    pub fn write(&self, tx: &mut Transaction) -> EntityId {
        let id = tx.temp_id();
        tx.add(id, Attribute::LoadoutName, self.name.clone());
        tx.add(id, Attribute::LoadoutShortName, self.short_name.clone());
        tx.add(id, Attribute::LoadoutInstallation, self.installation);
        tx.add(id, Attribute::LoadoutKind, self.kind.to_string());
        tx.add(id, Attribute::LoadoutRevision, 0u64);
        id
    }
}

impl Loadout {
    pub fn load(db: &Db, id: EntityId) -> Option<Self> {
        let entity = db.get(id)?;
        Some(Self {
            id,
            name: entity.get_str(Attribute::LoadoutName)?.into(),
            short_name: entity
                .get_str(Attribute::LoadoutShortName)
                .unwrap_or_default()
                .into(),
            installation: entity.get_ref(Attribute::LoadoutInstallation)?,
            kind: entity
                .get_str(Attribute::LoadoutKind)
                .and_then(|s| LoadoutKind::from_str(s).ok())
                .unwrap_or(LoadoutKind::Default),
            revision: entity.get_u64(Attribute::LoadoutRevision).unwrap_or(0),
            last_applied: entity.get_time(Attribute::LoadoutLastApplied),
        })
    }

    /// Every loadout in the database, in creation order.
    pub fn all(db: &Db) -> Vec<Self> {
        db.entities_having(Attribute::LoadoutName)
            .into_iter()
            .filter_map(|id| Self::load(db, id))
            .collect()
    }

    /// Loadouts belonging to one installation, in creation order.
    pub fn for_installation(db: &Db, installation: EntityId) -> Vec<Self> {
        db.entities_with(Attribute::LoadoutInstallation, &Value::Ref(installation))
            .into_iter()
            .filter_map(|id| Self::load(db, id))
            .collect()
    }

    /// Hidden loadouts are not shown to users and not counted when deciding
    /// whether a new loadout should be activated.
    pub fn is_visible(&self) -> bool {
        self.kind == LoadoutKind::Default
    }

    /// All items of the loadout, in creation order.
    pub fn items(&self, db: &Db) -> Vec<LoadoutItem> {
        db.entities_with(Attribute::ItemLoadout, &Value::Ref(self.id))
            .into_iter()
            .filter_map(|id| LoadoutItem::load(db, id))
            .collect()
    }

    pub fn game_files_group(&self, db: &Db) -> Option<EntityId> {
        db.entities_with(Attribute::GroupGameFilesFor, &Value::Ref(self.id))
            .into_iter()
            .next()
    }

    pub fn overrides_group(&self, db: &Db) -> Option<EntityId> {
        db.entities_with(Attribute::GroupOverridesFor, &Value::Ref(self.id))
            .into_iter()
            .next()
    }

    /// Record a content change of the loadout.
    pub fn bump_revision(&self, tx: &mut Transaction) {
        tx.add(self.id, Attribute::LoadoutRevision, self.revision + 1);
    }
}

/// Role of a group within its loadout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum GroupKind {
    /// Files of the unmodded game.
    GameFiles,
    /// Files the user changed on disk outside of any mod.
    Overrides,
    /// A user collection such as "My Mods".
    Collection,
    /// Any other group, typically an installed mod.
    User,
}

/// What a loadout item represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Group(GroupKind),
    File {
        path: GamePath,
        hash: ContentHash,
        size: u64,
    },
    /// A tombstone hiding a file provided by a lower priority group.
    DeletedFile {
        path: GamePath,
        reason: CompactString,
    },
    Other,
}

/// One entry of a loadout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadoutItem {
    pub id: EntityId,
    pub name: CompactString,
    pub loadout: EntityId,
    pub parent: Option<EntityId>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub kind: ItemKind,
}

impl LoadoutItem {
    pub fn load(db: &Db, id: EntityId) -> Option<Self> {
        let entity = db.get(id)?;
        let kind = if let Some(marker) = entity.get_str(Attribute::GroupMarker) {
            ItemKind::Group(GroupKind::from_str(marker).unwrap_or(GroupKind::User))
        } else if let Some(path) = entity.get_path(Attribute::TargetPath) {
            match (
                entity.get_hash(Attribute::FileHash),
                entity.get_str(Attribute::DeletedReason),
            ) {
                (Some(hash), _) => ItemKind::File {
                    path: path.clone(),
                    hash,
                    size: entity.get_u64(Attribute::FileSize).unwrap_or(0),
                },
                (None, Some(reason)) => ItemKind::DeletedFile {
                    path: path.clone(),
                    reason: reason.into(),
                },
                (None, None) => ItemKind::Other,
            }
        } else {
            ItemKind::Other
        };

        Some(Self {
            id,
            name: entity.get_str(Attribute::ItemName).unwrap_or_default().into(),
            loadout: entity.get_ref(Attribute::ItemLoadout)?,
            parent: entity.get_ref(Attribute::ItemParent),
            disabled: entity.get_bool(Attribute::ItemDisabled).unwrap_or(false),
            created_at: entity
                .get_time(Attribute::ItemCreatedAt)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            kind,
        })
    }

    /// Target path of file and tombstone items.
    pub fn target_path(&self) -> Option<&GamePath> {
        match &self.kind {
            ItemKind::File { path, .. } | ItemKind::DeletedFile { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn group_kind(&self) -> Option<GroupKind> {
        match self.kind {
            ItemKind::Group(kind) => Some(kind),
            _ => None,
        }
    }

    /// This item followed by its ancestors, nearest first. Stops at a
    /// missing parent or a cycle.
    pub fn this_and_parents(&self, db: &Db) -> Vec<LoadoutItem> {
        let mut seen = HashSet::from([self.id]);
        let mut chain = vec![self.clone()];
        let mut next = self.parent;
        while let Some(id) = next {
            if !seen.insert(id) {
                break;
            }
            let Some(item) = LoadoutItem::load(db, id) else {
                break;
            };
            next = item.parent;
            chain.push(item);
        }
        chain
    }

    /// The nearest enclosing group.
    pub fn containing_group(&self, db: &Db) -> Option<LoadoutItem> {
        self.this_and_parents(db)
            .into_iter()
            .skip(1)
            .find(|item| item.group_kind().is_some())
    }

    /// An item is enabled only if it and every ancestor are enabled.
    pub fn is_enabled(&self, db: &Db) -> bool {
        self.this_and_parents(db).iter().all(|item| !item.disabled)
    }

    /// Add a group. Game Files and Overrides groups are indexed on their
    /// loadout so they can be found directly.
    pub fn add_group(
        tx: &mut Transaction,
        loadout: EntityId,
        name: &str,
        kind: GroupKind,
        parent: Option<EntityId>,
        created_at: DateTime<Utc>,
    ) -> EntityId {
        let id = tx.temp_id();
        tx.add(id, Attribute::ItemName, name);
        tx.add(id, Attribute::ItemLoadout, loadout);
        tx.add(id, Attribute::GroupMarker, kind.to_string());
        tx.add(id, Attribute::ItemCreatedAt, created_at);
        if let Some(parent) = parent {
            tx.add(id, Attribute::ItemParent, parent);
        }
        match kind {
            GroupKind::GameFiles => {
                tx.add(id, Attribute::GroupGameFilesFor, loadout);
                tx.add(id, Attribute::GroupReadOnly, true);
            }
            GroupKind::Overrides => tx.add(id, Attribute::GroupOverridesFor, loadout),
            GroupKind::Collection | GroupKind::User => {}
        }
        id
    }

    /// Add a file item under `parent`.
    pub fn add_file(
        tx: &mut Transaction,
        loadout: EntityId,
        parent: EntityId,
        path: GamePath,
        hash: ContentHash,
        size: u64,
        created_at: DateTime<Utc>,
    ) -> EntityId {
        let id = tx.temp_id();
        tx.add(id, Attribute::ItemName, path.file_name());
        tx.add(id, Attribute::ItemLoadout, loadout);
        tx.add(id, Attribute::ItemParent, parent);
        tx.add(id, Attribute::ItemCreatedAt, created_at);
        tx.add(id, Attribute::TargetPath, path);
        tx.add(id, Attribute::FileHash, hash);
        tx.add(id, Attribute::FileSize, size);
        id
    }

    /// Add a tombstone for `path` under `parent`.
    pub fn add_deleted_file(
        tx: &mut Transaction,
        loadout: EntityId,
        parent: EntityId,
        path: GamePath,
        reason: &str,
        created_at: DateTime<Utc>,
    ) -> EntityId {
        let id = tx.temp_id();
        tx.add(id, Attribute::ItemName, path.file_name());
        tx.add(id, Attribute::ItemLoadout, loadout);
        tx.add(id, Attribute::ItemParent, parent);
        tx.add(id, Attribute::ItemCreatedAt, created_at);
        tx.add(id, Attribute::TargetPath, path);
        tx.add(id, Attribute::DeletedReason, reason);
        id
    }

    /// Replace the content of a file item.
    pub fn update_file(tx: &mut Transaction, id: EntityId, hash: ContentHash, size: u64) {
        tx.add(id, Attribute::FileHash, hash);
        tx.add(id, Attribute::FileSize, size);
    }

    pub fn set_disabled(tx: &mut Transaction, id: EntityId, disabled: bool) {
        tx.add(id, Attribute::ItemDisabled, disabled);
    }
}
