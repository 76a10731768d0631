//! Core types and contracts for loadsync.
//!
//! This crate provides the data model shared by the scanner and the
//! synchronizer: game-relative paths, content hashes, the persisted
//! disk-state and loadout read models, and the two external contracts the
//! reconciliation engine is written against:
//!
//! - [`MetadataLog`] - an append-only transactional entity store
//! - [`ContentStore`] - a content-addressed blob store
//!
//! Per-game customization goes through the [`SyncPolicy`] strategy trait.

mod config;
pub mod db;
mod error;
mod gc;
mod hash;
mod locations;
pub mod model;
mod path;
mod policy;
mod store;

pub use config::{SyncConfig, SyncConfigBuilder, DEFAULT_EXECUTABLE_EXTENSIONS};
pub use db::{
    Attribute, CommitResult, Db, Entity, EntityId, MetadataLog, Transaction, TxId, TxOp, Value,
};
pub use error::{ScanError, StoreError};
pub use gc::{GarbageCollector, GcRunMode, NoopGarbageCollector};
pub use hash::ContentHash;
pub use locations::LocationsRegister;
pub use model::{
    DiskState, DiskStateEntry, GameInstallMetadata, GameInstallation, GroupKind, ItemKind,
    Loadout, LoadoutItem, LoadoutKind, NewLoadout,
};
pub use path::{GamePath, LocationId};
pub use policy::{default_winner, item_priority, AddedEntry, DefaultPolicy, SyncPolicy};
pub use store::{ArchivedFile, ContentStore, FileFailure, NativeFileSource, StreamFactory};
