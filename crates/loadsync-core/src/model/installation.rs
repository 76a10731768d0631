//! Game installations and their persisted records.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{Attribute, Db, EntityId, MetadataLog, TxId, Value};
use crate::error::StoreError;
use crate::locations::LocationsRegister;
use crate::model::disk_state::{DiskState, DiskStateEntry};

/// A managed game installation.
#[derive(Debug, Clone)]
pub struct GameInstallation {
    pub game_name: CompactString,
    /// Id of the persisted [`GameInstallMetadata`] record.
    pub metadata_id: EntityId,
    pub locations: LocationsRegister,
}

impl GameInstallation {
    /// Find or create the installation record for `name`.
    pub fn register(
        log: &dyn MetadataLog,
        name: &str,
        locations: LocationsRegister,
    ) -> Result<Self, StoreError> {
        let db = log.db();
        let existing = db
            .entities_with(Attribute::InstallName, &Value::from(name))
            .into_iter()
            .next();

        let metadata_id = match existing {
            Some(id) => id,
            None => {
                let mut tx = log.begin_transaction();
                let id = tx.temp_id();
                tx.add(id, Attribute::InstallName, name);
                let result = log.commit(tx)?;
                info!(game = name, "Registered game installation");
                result.remap(id)
            }
        };

        Ok(Self {
            game_name: name.into(),
            metadata_id,
            locations,
        })
    }

    /// The persisted record as of `db`.
    pub fn metadata(&self, db: &Db) -> Result<GameInstallMetadata, StoreError> {
        GameInstallMetadata::load(db, self.metadata_id).ok_or(StoreError::EntityNotFound {
            id: self.metadata_id,
        })
    }

    /// The current disk snapshot.
    pub fn disk_state(&self, db: &Db) -> DiskState {
        DiskStateEntry::all_for_game(db, self.metadata_id)
    }

    /// The snapshot taken when the game was first indexed, if any.
    pub fn initial_disk_state(&self, log: &dyn MetadataLog) -> Option<DiskState> {
        let tx = self.metadata(&log.db()).ok()?.initial_disk_state_tx?;
        Some(self.disk_state(&log.db_as_of(tx)))
    }

    /// The snapshot as of the last applied loadout, falling back to the
    /// initial snapshot, then to nothing.
    pub fn last_applied_disk_state(&self, log: &dyn MetadataLog) -> DiskState {
        let Ok(meta) = self.metadata(&log.db()) else {
            return DiskState::new();
        };
        match meta.last_synced_loadout_tx.or(meta.initial_disk_state_tx) {
            Some(tx) => self.disk_state(&log.db_as_of(tx)),
            None => DiskState::new(),
        }
    }
}

/// The persisted installation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInstallMetadata {
    pub id: EntityId,
    pub name: CompactString,
    /// Transaction holding the pristine, pre-modding snapshot.
    pub initial_disk_state_tx: Option<TxId>,
    pub last_scanned_tx: Option<TxId>,
    /// The loadout currently applied, if any.
    pub last_synced_loadout: Option<EntityId>,
    pub last_synced_loadout_tx: Option<TxId>,
}

impl GameInstallMetadata {
    pub fn load(db: &Db, id: EntityId) -> Option<Self> {
        let entity = db.get(id)?;
        Some(Self {
            id,
            name: entity.get_str(Attribute::InstallName)?.into(),
            initial_disk_state_tx: entity.get_tx(Attribute::InitialDiskStateTx),
            last_scanned_tx: entity.get_tx(Attribute::LastScannedDiskStateTx),
            last_synced_loadout: entity.get_ref(Attribute::LastSyncedLoadout),
            last_synced_loadout_tx: entity.get_tx(Attribute::LastSyncedLoadoutTx),
        })
    }
}
