//! Synchronizer errors.

use compact_str::CompactString;
use thiserror::Error;

use loadsync_core::{EntityId, LocationId, ScanError, StoreError};

/// Errors returned by the synchronizer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The metadata log or content store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Scanning the game folder failed.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// An operation was requested in a context that cannot honour it.
    #[error("Invalid use: {message}")]
    Misuse { message: String },

    #[error("Loadout not found: {id}")]
    LoadoutNotFound { id: EntityId },

    /// The loadout belongs to a different game installation.
    #[error("Loadout {id} belongs to another installation")]
    ForeignLoadout { id: EntityId },

    #[error("No initial disk state recorded for {game}")]
    MissingInitialState { game: CompactString },

    #[error("Location not registered: {location}")]
    UnknownLocation { location: LocationId },

    /// Another synchronization of the same loadout is running.
    #[error("Loadout {id} is already being synchronized")]
    Busy { id: EntityId },

    /// A background task panicked or was cancelled.
    #[error("Background task failed: {message}")]
    Task { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl SyncError {
    pub(crate) fn misuse(message: impl Into<String>) -> Self {
        Self::Misuse {
            message: message.into(),
        }
    }
}
