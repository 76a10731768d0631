//! loadsync - keep a game folder in line with its mod loadouts.
//!
//! This crate re-exports the workspace members under one name:
//!
//! - [`loadsync_core`] - data model, metadata-log and content-store contracts
//! - [`loadsync_store`] - in-memory log, in-memory and filesystem content stores
//! - [`loadsync_scan`] - the disk scanner
//! - [`loadsync_sync`] - the synchronizer and the loadout lifecycle
//!
//! The most used types are also available at the crate root.

pub use loadsync_core;
pub use loadsync_scan;
pub use loadsync_store;
pub use loadsync_sync;

pub use loadsync_core::{
    ContentHash, ContentStore, GameInstallation, GamePath, LocationId, LocationsRegister,
    MetadataLog, SyncConfig, SyncPolicy,
};
pub use loadsync_scan::DiskScanner;
pub use loadsync_store::{FsContentStore, MemoryContentStore, MemoryLog};
pub use loadsync_sync::{
    Action, ActionSet, ApplyReport, LoadoutState, LoadoutSynchronizer, SyncError,
};
