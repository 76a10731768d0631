//! Metadata-log contract.
//!
//! The synchronizer persists disk snapshots, installations and loadouts as
//! entities in an append-only transactional log. Every commit produces a new
//! immutable [`Db`] snapshot identified by a [`TxId`]; older snapshots stay
//! queryable through [`MetadataLog::db_as_of`].

mod snapshot;
mod transaction;

use std::fmt;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::hash::ContentHash;
use crate::path::GamePath;

pub use snapshot::{Db, Entity};
pub use transaction::{CommitResult, MetadataLog, Transaction, TxOp};

/// Identifier of an entity in the metadata log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Marks ids that only exist inside an uncommitted transaction.
    pub const TEMP_BIT: u64 = 1 << 63;

    /// Create a new EntityId from a u64.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Whether this id is a transaction-local temporary id.
    pub fn is_temp(self) -> bool {
        self.0 & Self::TEMP_BIT != 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_temp() {
            write!(f, "tmp:{}", self.0 & !Self::TEMP_BIT)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Identifier of a committed transaction. Transaction ids grow monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl TxId {
    /// Placeholder for "the transaction being built", resolved on commit.
    pub const PENDING: TxId = TxId(u64::MAX);
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Attributes known to the synchronizer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
pub enum Attribute {
    // Disk state entries
    DiskPath,
    DiskHash,
    DiskSize,
    DiskLastModified,
    DiskGame,

    // Installation records
    InstallName,
    InitialDiskStateTx,
    LastScannedDiskStateTx,
    LastSyncedLoadout,
    LastSyncedLoadoutTx,

    // Loadouts
    LoadoutName,
    LoadoutShortName,
    LoadoutInstallation,
    LoadoutRevision,
    LoadoutKind,
    LoadoutLastApplied,

    // Loadout items
    ItemName,
    ItemLoadout,
    ItemParent,
    ItemDisabled,
    ItemCreatedAt,

    // Groups and files
    GroupMarker,
    GroupGameFilesFor,
    GroupOverridesFor,
    GroupReadOnly,
    TargetPath,
    FileHash,
    FileSize,
    DeletedReason,
}

impl Attribute {
    /// References that make the referencing entity a component of the target:
    /// deleting the target recursively deletes the referencing entity too.
    pub fn is_component_ref(self) -> bool {
        matches!(self, Attribute::ItemParent | Attribute::ItemLoadout)
    }
}

/// A value stored under an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Ref(EntityId),
    Tx(TxId),
    Str(CompactString),
    U64(u64),
    Bool(bool),
    Hash(ContentHash),
    Path(GamePath),
    Time(DateTime<Utc>),
}

impl Value {
    pub fn as_ref_id(&self) -> Option<EntityId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_tx(&self) -> Option<TxId> {
        match self {
            Value::Tx(tx) => Some(*tx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<ContentHash> {
        match self {
            Value::Hash(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&GamePath> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Rewrite an entity reference through `map`, leaving other values alone.
    pub fn remap_refs(&self, map: impl Fn(EntityId) -> EntityId) -> Value {
        match self {
            Value::Ref(id) => Value::Ref(map(*id)),
            other => other.clone(),
        }
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::Ref(id)
    }
}

impl From<TxId> for Value {
    fn from(tx: TxId) -> Self {
        Value::Tx(tx)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<CompactString> for Value {
    fn from(s: CompactString) -> Self {
        Value::Str(s)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<ContentHash> for Value {
    fn from(h: ContentHash) -> Self {
        Value::Hash(h)
    }
}

impl From<GamePath> for Value {
    fn from(p: GamePath) -> Self {
        Value::Path(p)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}
