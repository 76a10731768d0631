//! JWalk-based disk-state scanner.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use loadsync_core::{
    Attribute, ContentHash, Db, DiskStateEntry, GameInstallation, GamePath, ScanError, SyncConfig,
    SyncPolicy, Transaction,
};

use crate::progress::{ProgressTracker, ScanProgress};

/// A regular file found on disk.
#[derive(Debug)]
struct FoundFile {
    native: PathBuf,
    path: GamePath,
    size: u64,
    modified: DateTime<Utc>,
}

/// Difference between a found file and the persisted snapshot.
#[derive(Debug)]
enum Change<'a> {
    New {
        file: &'a FoundFile,
        hash: ContentHash,
    },
    Modified {
        entry: &'a DiskStateEntry,
        file: &'a FoundFile,
        hash: ContentHash,
    },
}

impl Change<'_> {
    fn path(&self) -> &GamePath {
        match self {
            Change::New { file, .. } | Change::Modified { file, .. } => &file.path,
        }
    }
}

/// Reconciles the files of a game installation with its persisted disk state.
pub struct DiskScanner {
    config: SyncConfig,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl DiskScanner {
    /// Create a new scanner.
    pub fn new(config: SyncConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            config,
            progress_tx,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Bring the persisted disk state of `installation` up to date.
    ///
    /// Changes are written into `tx`; nothing is committed. Files whose size
    /// differs or whose mtime is newer than recorded are re-hashed, unknown
    /// files get new entries and entries for vanished files are retracted.
    /// Returns whether anything changed; when it did, the installation's
    /// last-scanned pointer is set to `tx`.
    pub fn rescan(
        &self,
        installation: &GameInstallation,
        db: &Db,
        policy: &dyn SyncPolicy,
        tx: &mut Transaction,
        cancel: &CancellationToken,
    ) -> Result<bool, ScanError> {
        let known = installation.disk_state(db);
        let changed = self.reconcile(installation, &known, policy, tx, cancel)?;
        if changed {
            let this = tx.this_tx();
            tx.add(installation.metadata_id, Attribute::LastScannedDiskStateTx, this);
        }
        Ok(changed)
    }

    /// Index the game from scratch, ignoring any persisted entries.
    pub fn index_new_state(
        &self,
        installation: &GameInstallation,
        policy: &dyn SyncPolicy,
        tx: &mut Transaction,
        cancel: &CancellationToken,
    ) -> Result<bool, ScanError> {
        self.reconcile(installation, &[], policy, tx, cancel)
    }

    fn reconcile(
        &self,
        installation: &GameInstallation,
        known: &[DiskStateEntry],
        policy: &dyn SyncPolicy,
        tx: &mut Transaction,
        cancel: &CancellationToken,
    ) -> Result<bool, ScanError> {
        let files = self.collect_files(installation, policy, cancel)?;
        self.reconcile_files(installation, known, &files, tx, cancel)
    }

    /// Diff enumerated files against `known`, hashing where needed.
    fn reconcile_files(
        &self,
        installation: &GameInstallation,
        known: &[DiskStateEntry],
        files: &[FoundFile],
        tx: &mut Transaction,
        cancel: &CancellationToken,
    ) -> Result<bool, ScanError> {
        let by_path: HashMap<&GamePath, &DiskStateEntry> =
            known.iter().map(|e| (&e.path, e)).collect();

        let tracker = ProgressTracker::new();
        let seen: DashSet<&GamePath> = DashSet::new();
        let interval = self.config.progress_interval.max(1) as u64;

        let mut changes: Vec<Change<'_>> = files
            .par_iter()
            .map(|file| {
                if cancel.is_cancelled() {
                    return Err(ScanError::Interrupted);
                }
                if tracker.record_file() % interval == 0 {
                    let _ = self.progress_tx.send(tracker.snapshot(file.native.clone()));
                }

                let known = by_path.get(&file.path).copied();
                let unchanged = known.is_some_and(|entry| {
                    file.size == entry.size && file.modified <= entry.last_modified
                });
                if unchanged {
                    seen.insert(&file.path);
                    return Ok(None);
                }

                // A file removed after enumeration is treated as absent.
                let hash = match hash_file(&file.native, &tracker, file.size) {
                    Ok(hash) => hash,
                    Err(ScanError::NotFound { path }) => {
                        warn!(path = %path.display(), "File vanished before hashing");
                        return Ok(None);
                    }
                    Err(err) => return Err(err),
                };
                seen.insert(&file.path);
                Ok(Some(match known {
                    Some(entry) => Change::Modified { entry, file, hash },
                    None => Change::New { file, hash },
                }))
            })
            .filter_map(Result::transpose)
            .collect::<Result<_, _>>()?;

        if cancel.is_cancelled() {
            return Err(ScanError::Interrupted);
        }

        changes.sort_by(|a, b| a.path().cmp(b.path()));
        let mut changed = !changes.is_empty();
        for change in &changes {
            match change {
                Change::New { file, hash } => {
                    DiskStateEntry::insert(
                        tx,
                        installation.metadata_id,
                        file.path.clone(),
                        *hash,
                        file.size,
                        file.modified,
                    );
                }
                Change::Modified { entry, file, hash } => {
                    entry.update(tx, *hash, file.size, file.modified);
                }
            }
        }

        let mut removed = 0usize;
        for entry in known {
            if !seen.contains(&entry.path) {
                entry.retract(tx);
                removed += 1;
            }
        }
        changed |= removed > 0;

        let _ = self.progress_tx.send(tracker.snapshot(PathBuf::new()));
        info!(
            game = %installation.game_name,
            files = files.len(),
            updated = changes.len(),
            removed,
            "Scanned game files"
        );
        Ok(changed)
    }

    /// Enumerate regular files below every top-level location.
    fn collect_files(
        &self,
        installation: &GameInstallation,
        policy: &dyn SyncPolicy,
        cancel: &CancellationToken,
    ) -> Result<Vec<FoundFile>, ScanError> {
        let parallelism = match self.config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let mut files = Vec::new();
        let mut found: HashSet<GamePath> = HashSet::new();
        for (location, root) in installation.locations.top_level_locations() {
            if !root.is_dir() {
                debug!(%location, root = %root.display(), "Skipping missing location");
                continue;
            }

            let walker = WalkDir::new(&root)
                .parallelism(parallelism.clone())
                .skip_hidden(false)
                .follow_links(false)
                .sort(true);

            for entry_result in walker {
                if cancel.is_cancelled() {
                    return Err(ScanError::Interrupted);
                }
                let entry = match entry_result {
                    Ok(e) => e,
                    Err(err) => {
                        warn!(error = %err, "Failed to read directory entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }

                let native = entry.path();
                let Some(path) = installation.locations.to_game_path(&native) else {
                    continue;
                };
                if policy.is_ignored_path(&path) || found.contains(&path) {
                    continue;
                }
                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(err) => {
                        warn!(path = %native.display(), error = %err, "Failed to read metadata");
                        continue;
                    }
                };
                let modified = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .map_err(|e| ScanError::io(&native, e))?;

                found.insert(path.clone());
                files.push(FoundFile {
                    native,
                    path,
                    size: metadata.len(),
                    modified,
                });
            }
        }
        Ok(files)
    }
}

fn hash_file(path: &Path, tracker: &ProgressTracker, size: u64) -> Result<ContentHash, ScanError> {
    let hash = ContentHash::of_file(path).map_err(|e| ScanError::io(path, e))?;
    tracker.record_hash(size);
    Ok(hash)
}
