//! Game folder scanning for loadsync.
//!
//! This crate walks the registered locations of a game installation, hashes
//! the files it finds and reconciles them against the persisted disk-state
//! snapshot, writing the differences into a metadata-log transaction.
//!
//! # Overview
//!
//! - **Parallel traversal** via jwalk
//! - **Parallel hashing** via rayon, only for files whose size or mtime moved
//! - **Progress updates** via broadcast channels
//! - **Cooperative cancellation** via `CancellationToken`
//!
//! # Example
//!
//! ```rust,no_run
//! use loadsync_core::{DefaultPolicy, GameInstallation, MetadataLog, SyncConfig};
//! use loadsync_scan::DiskScanner;
//! use tokio_util::sync::CancellationToken;
//!
//! fn rescan(log: &dyn MetadataLog, installation: &GameInstallation) {
//!     let scanner = DiskScanner::new(SyncConfig::default());
//!     let mut tx = log.begin_transaction();
//!     let changed = scanner
//!         .rescan(
//!             installation,
//!             &log.db(),
//!             &DefaultPolicy::default(),
//!             &mut tx,
//!             &CancellationToken::new(),
//!         )
//!         .unwrap();
//!     if changed {
//!         log.commit(tx).unwrap();
//!     }
//! }
//! ```

mod progress;
mod scanner;

pub use progress::ScanProgress;
pub use scanner::DiskScanner;

// Re-export core types for convenience
pub use loadsync_core::{DiskState, DiskStateEntry, ScanError};
