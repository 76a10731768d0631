//! Three-way synchronization between a game folder and its loadouts.
//!
//! Every path is looked at in three states: what is on disk now, what was on
//! disk when the last loadout was applied, and what the active loadout wants.
//! From the three a [`Signature`] is built and mapped to an [`ActionSet`];
//! the [`ActionExecutor`] then applies all actions in a fixed order within a
//! single metadata transaction.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use loadsync_core::{GameInstallation, LocationId, LocationsRegister};
//! use loadsync_store::{FsContentStore, MemoryLog};
//! use loadsync_sync::LoadoutSynchronizer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let log = Arc::new(MemoryLog::new());
//! let store = Arc::new(FsContentStore::open("/var/lib/loadsync/store")?);
//! let locations = LocationsRegister::new().with_location(LocationId::game(), "/games/skyrim");
//! let installation = GameInstallation::register(log.as_ref(), "Skyrim", locations)?;
//!
//! let synchronizer = LoadoutSynchronizer::new(installation, log, store);
//! let loadout = synchronizer.create_loadout(None)?;
//! let report = synchronizer.synchronize(loadout.id)?;
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```

mod action;
mod diff;
mod error;
mod executor;
pub mod jobs;
mod names;
mod permissions;
mod plan;
mod reaper;
mod signature;
mod state;
mod synchronizer;
mod tree;

pub use action::{Action, ActionSet, ACTIONS_IN_ORDER};
pub use diff::{diff_entries, diff_to_json, DiskDiffEntry, FileChangeType};
pub use error::SyncError;
pub use executor::{
    backup_new_files, ActionExecutor, ApplyReport, ApplyTarget, Diagnostic, DiagnosticKind,
    OVERRIDES_GROUP_NAME, REIFIED_DELETE_REASON,
};
pub use names::{next_short_name, short_name};
pub use permissions::mark_executable;
pub use plan::{process_sync_tree, strip_actions, SyncActionGroupings};
pub use reaper::DirectoryReaper;
pub use signature::{map_actions, Delta, Signature};
pub use state::{InFlight, InFlightGuard, LoadoutState};
pub use synchronizer::{
    LoadoutSynchronizer, GAME_FILES_GROUP_NAME, MY_MODS_GROUP_NAME, VANILLA_SHORT_NAME,
};
pub use tree::{
    build_sync_tree, build_sync_tree_for_items, flatten_loadout, FileOrigin, LoadoutFileEntry,
    SyncTree, SyncTreeNode,
};
