//! Applies grouped actions to the game folder and the metadata log.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use loadsync_core::{
    AddedEntry, ArchivedFile, Attribute, ContentHash, ContentStore, Db, DiskStateEntry, EntityId,
    GameInstallation, GamePath, GroupKind, Loadout, LoadoutItem, LocationsRegister, MetadataLog,
    NativeFileSource, StoreError, SyncConfig, SyncPolicy, Transaction, TxId,
};

use crate::action::{Action, ACTIONS_IN_ORDER};
use crate::error::SyncError;
use crate::permissions;
use crate::plan::SyncActionGroupings;
use crate::reaper::DirectoryReaper;
use crate::tree::SyncTree;

/// Reason recorded on tombstones created for files the user deleted.
pub const REIFIED_DELETE_REASON: &str = "Reified delete";

/// Name of the group receiving files ingested from disk.
pub const OVERRIDES_GROUP_NAME: &str = "Overrides";

/// What a run of the executor is applied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyTarget {
    /// Apply a loadout; it becomes the active loadout.
    Loadout(EntityId),
    /// Apply a bare disk state, leaving no loadout active.
    Installation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum DiagnosticKind {
    Conflict,
    UnableToExtract,
    FailedToBackup,
    FailedToExtract,
    FailedToDelete,
}

/// A per-path problem that did not abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub path: GamePath,
    pub message: String,
}

/// Outcome of a committed run.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    /// The transaction the run committed.
    pub tx: TxId,
    pub counts: BTreeMap<Action, usize>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ApplyReport {
    pub fn count(&self, action: Action) -> usize {
        self.counts.get(&action).copied().unwrap_or(0)
    }

    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Mutable bookkeeping of one run.
#[derive(Debug, Default)]
struct Pass {
    diagnostics: Vec<Diagnostic>,
    /// Paths whose backup failed. Their disk bytes must survive the run.
    held: HashSet<GamePath>,
    failed_deletes: HashSet<GamePath>,
    deleted: Vec<GamePath>,
    overrides: Option<EntityId>,
    loadout_changed: bool,
}

impl Pass {
    fn diagnose(&mut self, kind: DiagnosticKind, path: &GamePath, message: impl Into<String>) {
        let message = message.into();
        warn!(%kind, %path, %message, "Synchronization problem");
        self.diagnostics.push(Diagnostic {
            kind,
            path: path.clone(),
            message,
        });
    }
}

/// Executes the actions of a processed sync tree in one transaction.
pub struct ActionExecutor<'a> {
    pub log: &'a dyn MetadataLog,
    pub store: &'a dyn ContentStore,
    pub policy: &'a dyn SyncPolicy,
    pub config: &'a SyncConfig,
    pub installation: &'a GameInstallation,
    pub cancel: &'a CancellationToken,
}

impl ActionExecutor<'_> {
    /// Apply `groupings` in [`ACTIONS_IN_ORDER`] and commit.
    ///
    /// Ingestion and reified deletes need a loadout to record into; asking
    /// for them with [`ApplyTarget::Installation`] is rejected before
    /// anything is touched.
    pub fn run(
        &self,
        tree: &SyncTree,
        groupings: &SyncActionGroupings,
        target: ApplyTarget,
    ) -> Result<ApplyReport, SyncError> {
        let db = self.log.db();
        let meta = self.installation.metadata(&db)?;
        let loadout = match target {
            ApplyTarget::Loadout(id) => {
                let loadout = Loadout::load(&db, id).ok_or(SyncError::LoadoutNotFound { id })?;
                if loadout.installation != meta.id {
                    return Err(SyncError::ForeignLoadout { id });
                }
                Some(loadout)
            }
            ApplyTarget::Installation => {
                for action in [Action::IngestFromDisk, Action::AddReifiedDelete] {
                    if !groupings.get(action).is_empty() {
                        return Err(SyncError::misuse(format!(
                            "{action} requires a loadout to record into"
                        )));
                    }
                }
                None
            }
        };

        let mut tx = self.log.begin_transaction();
        let mut pass = Pass::default();

        for action in ACTIONS_IN_ORDER {
            let paths = groupings.get(action);
            if paths.is_empty() {
                continue;
            }
            debug!(%action, count = paths.len(), "Applying action");

            match action {
                Action::DoNothing => {}
                Action::BackupFile => self.backup(tree, paths, &mut pass)?,
                Action::IngestFromDisk => {
                    if let Some(loadout) = &loadout {
                        self.ingest(&db, loadout, tree, paths, &mut tx, &mut pass);
                    }
                }
                Action::DeleteFromDisk => self.delete(tree, paths, &mut tx, &mut pass),
                Action::ExtractToDisk => self.extract(tree, paths, &mut tx, &mut pass)?,
                Action::AddReifiedDelete => {
                    if let Some(loadout) = &loadout {
                        self.add_reified_deletes(&db, loadout, paths, &mut tx, &mut pass);
                    }
                }
                Action::WarnOfUnableToExtract => {
                    for path in paths {
                        pass.diagnose(
                            DiagnosticKind::UnableToExtract,
                            path,
                            "content is missing from the store",
                        );
                    }
                }
                Action::WarnOfConflict => {
                    for path in paths {
                        pass.diagnose(
                            DiagnosticKind::Conflict,
                            path,
                            "changed both on disk and in the loadout",
                        );
                    }
                }
            }
        }

        let this = tx.this_tx();
        match &loadout {
            Some(loadout) => {
                tx.add(meta.id, Attribute::LastSyncedLoadout, loadout.id);
                tx.add(meta.id, Attribute::LastSyncedLoadoutTx, this);
                tx.add(meta.id, Attribute::LastScannedDiskStateTx, this);
                tx.add(loadout.id, Attribute::LoadoutLastApplied, Utc::now());
                if pass.loadout_changed {
                    loadout.bump_revision(&mut tx);
                }
            }
            None => {
                if let Some(previous) = meta.last_synced_loadout {
                    tx.retract(meta.id, Attribute::LastSyncedLoadout, previous);
                }
                if let Some(previous_tx) = meta.last_synced_loadout_tx {
                    tx.retract(meta.id, Attribute::LastSyncedLoadoutTx, previous_tx);
                }
                tx.add(meta.id, Attribute::LastScannedDiskStateTx, this);
            }
        }

        let result = self.log.commit(tx)?;

        let surviving = self.installation.disk_state(&result.db);
        let reaped =
            DirectoryReaper::new(&self.installation.locations).reap(&pass.deleted, &surviving);

        let counts = groupings.counts();
        let summary = counts
            .iter()
            .map(|(action, n)| format!("{action}={n}"))
            .join(" ");
        info!(
            game = %self.installation.game_name,
            tx = %result.tx,
            actions = %summary,
            diagnostics = pass.diagnostics.len(),
            directories_removed = reaped.len(),
            "Applied sync actions"
        );

        Ok(ApplyReport {
            tx: result.tx,
            counts,
            diagnostics: pass.diagnostics,
        })
    }

    fn backup(
        &self,
        tree: &SyncTree,
        paths: &[GamePath],
        pass: &mut Pass,
    ) -> Result<(), SyncError> {
        let entries: Vec<&DiskStateEntry> = paths
            .iter()
            .filter_map(|path| tree.get(path))
            .filter_map(|node| node.disk.as_ref())
            .collect();
        let failures = backup_new_files(self.store, &self.installation.locations, &entries)?;
        for (path, message) in failures {
            pass.held.insert(path.clone());
            pass.diagnose(DiagnosticKind::FailedToBackup, &path, message);
        }
        Ok(())
    }

    fn ingest(
        &self,
        db: &Db,
        loadout: &Loadout,
        tree: &SyncTree,
        paths: &[GamePath],
        tx: &mut Transaction,
        pass: &mut Pass,
    ) {
        let mut added = Vec::new();
        for path in paths {
            let Some(disk) = tree.get(path).and_then(|node| node.disk.as_ref()) else {
                debug_assert!(false, "ingest of {path} without a disk entry");
                continue;
            };

            let linked = tree
                .get(path)
                .and_then(|node| node.loadout.as_ref())
                .and_then(|entry| entry.item)
                .filter(|item| db.contains(*item));
            match linked {
                Some(item) => LoadoutItem::update_file(tx, item, disk.hash, disk.size),
                None => {
                    let group = self.overrides_group(db, loadout, tx, pass);
                    let item = LoadoutItem::add_file(
                        tx,
                        loadout.id,
                        group,
                        disk.path.clone(),
                        disk.hash,
                        disk.size,
                        Utc::now(),
                    );
                    added.push(AddedEntry {
                        item,
                        path: disk.path.clone(),
                        hash: disk.hash,
                        size: disk.size,
                    });
                }
            }

            if let Some((_, modified)) = self.native_metadata(path) {
                disk.touch(tx, modified);
            }
            pass.loadout_changed = true;
        }

        if !added.is_empty() {
            debug!(count = added.len(), "Ingested new files into overrides");
            self.policy.move_new_files_to_groups(db, loadout, &added, tx);
        }
    }

    fn delete(&self, tree: &SyncTree, paths: &[GamePath], tx: &mut Transaction, pass: &mut Pass) {
        for path in paths {
            if pass.held.contains(path) {
                continue;
            }
            let Some(node) = tree.get(path) else {
                continue;
            };
            match self.remove_file(path) {
                Ok(()) => {
                    if !node.actions.contains(Action::ExtractToDisk) {
                        if let Some(disk) = &node.disk {
                            disk.retract(tx);
                        }
                    }
                    pass.deleted.push(path.clone());
                }
                Err(err) => {
                    pass.failed_deletes.insert(path.clone());
                    pass.diagnose(DiagnosticKind::FailedToDelete, path, err.to_string());
                }
            }
        }
    }

    fn extract(
        &self,
        tree: &SyncTree,
        paths: &[GamePath],
        tx: &mut Transaction,
        pass: &mut Pass,
    ) -> Result<(), SyncError> {
        let mut jobs: Vec<(ContentHash, PathBuf)> = Vec::with_capacity(paths.len());
        let mut targets: HashMap<PathBuf, &GamePath> = HashMap::with_capacity(paths.len());
        for path in paths {
            if pass.held.contains(path) {
                continue;
            }
            let Some(desired) = tree.get(path).and_then(|node| node.loadout.as_ref()) else {
                debug_assert!(false, "extract of {path} without a desired file");
                continue;
            };
            match self.native(path) {
                Ok(native) => {
                    targets.insert(native.clone(), path);
                    jobs.push((desired.hash, native));
                }
                Err(err) => pass.diagnose(DiagnosticKind::FailedToExtract, path, err.to_string()),
            }
        }
        if jobs.is_empty() {
            return Ok(());
        }

        let failures = self.store.extract_files(&jobs, self.cancel)?;

        let mut failed: HashSet<&GamePath> = HashSet::new();
        for failure in &failures {
            match failure
                .path
                .as_ref()
                .and_then(|native| targets.get(native).copied())
            {
                Some(path) => {
                    failed.insert(path);
                    pass.diagnose(DiagnosticKind::FailedToExtract, path, failure.message.clone());
                }
                None => {
                    for (hash, native) in &jobs {
                        if *hash != failure.hash {
                            continue;
                        }
                        if let Some(path) = targets.get(native).copied() {
                            failed.insert(path);
                            pass.diagnose(
                                DiagnosticKind::FailedToExtract,
                                path,
                                failure.message.clone(),
                            );
                        }
                    }
                }
            }
        }

        for (hash, native) in &jobs {
            let Some(path) = targets.get(native).copied() else {
                continue;
            };
            let Some(node) = tree.get(path) else {
                continue;
            };

            if failed.contains(path) {
                // The old file is gone and nothing replaced it.
                let deleted = node.actions.contains(Action::DeleteFromDisk)
                    && !pass.failed_deletes.contains(path);
                if deleted {
                    if let Some(disk) = &node.disk {
                        disk.retract(tx);
                    }
                }
                continue;
            }

            if self.config.is_executable_extension(path.extension()) {
                if let Err(err) = permissions::mark_executable(native) {
                    warn!(path = %native.display(), error = %err, "Failed to set executable bits");
                }
            }

            let desired_size = node.loadout.as_ref().map_or(0, |l| l.size);
            let (size, modified) = self
                .native_metadata(path)
                .unwrap_or_else(|| (desired_size, Utc::now()));
            match &node.disk {
                Some(disk) => disk.update(tx, *hash, size, modified),
                None => {
                    DiskStateEntry::insert(
                        tx,
                        self.installation.metadata_id,
                        path.clone(),
                        *hash,
                        size,
                        modified,
                    );
                }
            }
        }
        Ok(())
    }

    fn add_reified_deletes(
        &self,
        db: &Db,
        loadout: &Loadout,
        paths: &[GamePath],
        tx: &mut Transaction,
        pass: &mut Pass,
    ) {
        for path in paths {
            let group = self.overrides_group(db, loadout, tx, pass);
            LoadoutItem::add_deleted_file(
                tx,
                loadout.id,
                group,
                path.clone(),
                REIFIED_DELETE_REASON,
                Utc::now(),
            );
            pass.loadout_changed = true;
        }
        debug!(count = paths.len(), "Recorded deleted game files");
    }

    /// The loadout's Overrides group, created in `tx` on first use.
    fn overrides_group(
        &self,
        db: &Db,
        loadout: &Loadout,
        tx: &mut Transaction,
        pass: &mut Pass,
    ) -> EntityId {
        *pass.overrides.get_or_insert_with(|| {
            loadout.overrides_group(db).unwrap_or_else(|| {
                LoadoutItem::add_group(
                    tx,
                    loadout.id,
                    OVERRIDES_GROUP_NAME,
                    GroupKind::Overrides,
                    None,
                    Utc::now(),
                )
            })
        })
    }

    fn native(&self, path: &GamePath) -> Result<PathBuf, SyncError> {
        self.installation
            .locations
            .resolve(path)
            .ok_or_else(|| SyncError::UnknownLocation {
                location: path.location().clone(),
            })
    }

    fn native_metadata(&self, path: &GamePath) -> Option<(u64, DateTime<Utc>)> {
        let native = self.installation.locations.resolve(path)?;
        let metadata = fs::metadata(native).ok()?;
        let modified = metadata.modified().ok()?;
        Some((metadata.len(), modified.into()))
    }

    fn remove_file(&self, path: &GamePath) -> Result<(), SyncError> {
        let native = self.native(path)?;
        match fs::remove_file(&native) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(native, err).into()),
        }
    }
}

/// Back up the disk files whose content the store does not hold yet.
///
/// Presence checks run in parallel and each distinct hash is read once.
/// Returns the paths that could not be backed up, with the reason.
pub fn backup_new_files(
    store: &dyn ContentStore,
    locations: &LocationsRegister,
    entries: &[&DiskStateEntry],
) -> Result<Vec<(GamePath, String)>, SyncError> {
    let mut by_hash: HashMap<ContentHash, Vec<&DiskStateEntry>> = HashMap::new();
    for entry in entries {
        by_hash.entry(entry.hash).or_default().push(*entry);
    }

    let missing: Vec<(&ContentHash, &Vec<&DiskStateEntry>)> = by_hash
        .par_iter()
        .filter(|(hash, _)| !store.have_file(hash))
        .collect();
    if missing.is_empty() {
        return Ok(Vec::new());
    }

    let mut failed = Vec::new();
    let mut files = Vec::with_capacity(missing.len());
    for (hash, group) in &missing {
        let Some(first) = group.first() else {
            continue;
        };
        match locations.resolve(&first.path) {
            Some(native) => files.push(ArchivedFile {
                hash: **hash,
                size: first.size,
                source: Box::new(NativeFileSource(native)),
            }),
            None => failed.extend(group.iter().map(|e| {
                let message = format!("location {} is not registered", e.path.location());
                (e.path.clone(), message)
            })),
        }
    }

    let submitted = files.len();
    for failure in store.backup_files(files, false)? {
        if let Some(group) = by_hash.get(&failure.hash) {
            failed.extend(group.iter().map(|e| (e.path.clone(), failure.message.clone())));
        }
    }
    info!(files = submitted, failed = failed.len(), "Backed up new files");
    Ok(failed)
}
