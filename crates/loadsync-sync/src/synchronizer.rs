//! Loadout lifecycle for one game installation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use compact_str::{format_compact, CompactString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use loadsync_core::{
    Attribute, ContentHash, ContentStore, Db, DefaultPolicy, DiskState, DiskStateEntry, EntityId,
    GameInstallMetadata, GameInstallation, GamePath, GarbageCollector, GcRunMode, GroupKind,
    Loadout, LoadoutItem, LoadoutKind, MetadataLog, NewLoadout, NoopGarbageCollector, SyncConfig,
    SyncPolicy,
};
use loadsync_scan::{DiskScanner, ScanProgress};

use crate::action::Action;
use crate::diff::{diff_entries, DiskDiffEntry};
use crate::error::SyncError;
use crate::executor::{backup_new_files, ActionExecutor, ApplyReport, ApplyTarget};
use crate::names::next_short_name;
use crate::plan::{process_sync_tree, strip_actions, SyncActionGroupings};
use crate::state::{InFlight, LoadoutState};
use crate::tree::{
    build_sync_tree, build_sync_tree_for_items, flatten_loadout, LoadoutFileEntry, SyncTree,
};

/// Name of the group holding the unmodded game files.
pub const GAME_FILES_GROUP_NAME: &str = "Game Files";

/// Name of the collection new loadouts start with.
pub const MY_MODS_GROUP_NAME: &str = "My Mods";

/// Short name of the hidden vanilla-state loadout.
pub const VANILLA_SHORT_NAME: &str = "-";

/// Keeps the game folder of one installation in line with its loadouts.
///
/// All operations are blocking; see [`crate::jobs`] for channel-based
/// wrappers.
pub struct LoadoutSynchronizer {
    installation: GameInstallation,
    log: Arc<dyn MetadataLog>,
    store: Arc<dyn ContentStore>,
    policy: Arc<dyn SyncPolicy>,
    gc: Arc<dyn GarbageCollector>,
    config: SyncConfig,
    scanner: DiskScanner,
    in_flight: InFlight,
    cancel: CancellationToken,
}

impl LoadoutSynchronizer {
    /// Create a synchronizer with the default config and policy.
    pub fn new(
        installation: GameInstallation,
        log: Arc<dyn MetadataLog>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        let config = SyncConfig::default();
        Self {
            installation,
            log,
            store,
            policy: Arc::new(DefaultPolicy::default()),
            gc: Arc::new(NoopGarbageCollector),
            scanner: DiskScanner::new(config.clone()),
            config,
            in_flight: InFlight::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `config`, replacing the policy with one built from its patterns.
    pub fn with_config(mut self, config: SyncConfig) -> Result<Self, SyncError> {
        let policy = DefaultPolicy::from_config(&config).map_err(|e| SyncError::InvalidConfig {
            message: e.to_string(),
        })?;
        self.policy = Arc::new(policy);
        self.scanner = DiskScanner::new(config.clone());
        self.config = config;
        Ok(self)
    }

    pub fn with_policy(mut self, policy: Arc<dyn SyncPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_garbage_collector(mut self, gc: Arc<dyn GarbageCollector>) -> Self {
        self.gc = gc;
        self
    }

    /// Token checked by scans and extractions.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn installation(&self) -> &GameInstallation {
        &self.installation
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Subscribe to progress of the scans this synchronizer runs.
    pub fn subscribe_scan(&self) -> tokio::sync::broadcast::Receiver<ScanProgress> {
        self.scanner.subscribe()
    }

    /// Rescan the game folder and commit what changed. The first scan also
    /// becomes the initial disk state.
    pub fn reindex_state(&self) -> Result<GameInstallMetadata, SyncError> {
        let db = self.log.db();
        let meta = self.installation.metadata(&db)?;
        let mut tx = self.log.begin_transaction();
        let mut changed = self.scanner.rescan(
            &self.installation,
            &db,
            self.policy.as_ref(),
            &mut tx,
            &self.cancel,
        )?;
        if meta.initial_disk_state_tx.is_none() {
            let this = tx.this_tx();
            tx.add(meta.id, Attribute::InitialDiskStateTx, this);
            tx.add(meta.id, Attribute::LastScannedDiskStateTx, this);
            changed = true;
        }
        if !changed {
            return Ok(meta);
        }
        let result = self.log.commit(tx)?;
        Ok(self.installation.metadata(&result.db)?)
    }

    /// Alias of [`Self::reindex_state`].
    pub fn rescan_game_files(&self) -> Result<GameInstallMetadata, SyncError> {
        self.reindex_state()
    }

    /// The pristine disk state, indexing the game first if it never was.
    pub fn get_or_create_initial_disk_state(&self) -> Result<DiskState, SyncError> {
        let db = self.log.db();
        let meta = self.installation.metadata(&db)?;
        if let Some(initial) = meta.initial_disk_state_tx {
            return Ok(self.installation.disk_state(&self.log.db_as_of(initial)));
        }

        let mut tx = self.log.begin_transaction();
        if self.installation.disk_state(&db).is_empty() {
            self.scanner.index_new_state(
                &self.installation,
                self.policy.as_ref(),
                &mut tx,
                &self.cancel,
            )?;
        } else {
            self.scanner.rescan(
                &self.installation,
                &db,
                self.policy.as_ref(),
                &mut tx,
                &self.cancel,
            )?;
        }
        let this = tx.this_tx();
        tx.add(meta.id, Attribute::InitialDiskStateTx, this);
        tx.add(meta.id, Attribute::LastScannedDiskStateTx, this);
        let result = self.log.commit(tx)?;

        let state = self.installation.disk_state(&result.db);
        info!(
            game = %self.installation.game_name,
            files = state.len(),
            "Recorded initial disk state"
        );
        Ok(state)
    }

    /// Rescan, then join the disk, the last applied state and `loadout`.
    pub fn build_sync_tree(&self, loadout: &Loadout) -> Result<SyncTree, SyncError> {
        self.reindex_state()?;
        let db = self.log.db();
        let current = self.installation.disk_state(&db);
        let previous = self.installation.last_applied_disk_state(self.log.as_ref());
        Ok(build_sync_tree_for_items(
            &db,
            &current,
            &previous,
            loadout,
            self.policy.as_ref(),
        ))
    }

    pub fn process_sync_tree(&self, tree: &mut SyncTree) -> SyncActionGroupings {
        process_sync_tree(tree, self.store.as_ref(), self.policy.as_ref())
    }

    pub fn run_groupings(
        &self,
        tree: &SyncTree,
        groupings: &SyncActionGroupings,
        target: ApplyTarget,
    ) -> Result<ApplyReport, SyncError> {
        ActionExecutor {
            log: self.log.as_ref(),
            store: self.store.as_ref(),
            policy: self.policy.as_ref(),
            config: &self.config,
            installation: &self.installation,
            cancel: &self.cancel,
        }
        .run(tree, groupings, target)
    }

    /// Bring `loadout` and the game folder in line with each other.
    ///
    /// When another loadout is active it is synchronized and deactivated
    /// first, then `loadout` is activated.
    pub fn synchronize(&self, loadout: EntityId) -> Result<ApplyReport, SyncError> {
        let _guard = self.in_flight.try_begin(loadout)?;
        self.synchronize_inner(loadout)
    }

    fn synchronize_inner(&self, id: EntityId) -> Result<ApplyReport, SyncError> {
        let db = self.log.db();
        let loadout = self.load_loadout(&db, id)?;
        let meta = self.installation.metadata(&db)?;

        if let Some(previous) = meta.last_synced_loadout.filter(|p| *p != id) {
            if Loadout::load(&db, previous).is_some() {
                info!(from = %previous, to = %id, "Switching active loadout");
                self.synchronize_inner(previous)?;
                self.deactivate_inner()?;
                return self.activate_inner(id);
            }
        }

        let mut tree = self.build_sync_tree(&loadout)?;
        let groupings = self.process_sync_tree(&mut tree);
        self.run_groupings(&tree, &groupings, ApplyTarget::Loadout(id))
    }

    /// Make `loadout` the active loadout, treating the current disk as the
    /// previous state.
    pub fn activate_loadout(&self, loadout: EntityId) -> Result<ApplyReport, SyncError> {
        let _guard = self.in_flight.try_begin(loadout)?;
        self.activate_inner(loadout)
    }

    fn activate_inner(&self, id: EntityId) -> Result<ApplyReport, SyncError> {
        self.reindex_state()?;
        let db = self.log.db();
        let loadout = self.load_loadout(&db, id)?;
        let current = self.installation.disk_state(&db);

        let mut tree =
            build_sync_tree_for_items(&db, &current, &current, &loadout, self.policy.as_ref());
        let groupings = self.process_sync_tree(&mut tree);
        let report = self.run_groupings(&tree, &groupings, ApplyTarget::Loadout(id))?;
        info!(loadout = %loadout.name, "Activated loadout");
        Ok(report)
    }

    /// Synchronize the active loadout, then restore the original game files.
    /// Returns `None` when no loadout is active.
    pub fn deactivate_current_loadout(&self) -> Result<Option<ApplyReport>, SyncError> {
        self.deactivate_inner()
    }

    fn deactivate_inner(&self) -> Result<Option<ApplyReport>, SyncError> {
        let db = self.log.db();
        let meta = self.installation.metadata(&db)?;
        let Some(active) = meta.last_synced_loadout else {
            return Ok(None);
        };
        if Loadout::load(&db, active).is_some() {
            self.synchronize_inner(active)?;
        }
        let report = self.reset_to_original_game_state()?;
        info!(loadout = %active, "Deactivated loadout");
        Ok(Some(report))
    }

    /// Put the game folder back to its initial disk state. Disk changes are
    /// not ingested anywhere and no loadout stays active.
    pub fn reset_to_original_game_state(&self) -> Result<ApplyReport, SyncError> {
        let meta = self.reindex_state()?;
        let initial_tx = meta
            .initial_disk_state_tx
            .ok_or_else(|| SyncError::MissingInitialState {
                game: self.installation.game_name.clone(),
            })?;

        let db = self.log.db();
        let current = self.installation.disk_state(&db);
        let initial = self.installation.disk_state(&self.log.db_as_of(initial_tx));
        let previous = self.installation.last_applied_disk_state(self.log.as_ref());
        let desired: Vec<LoadoutFileEntry> =
            initial.iter().map(LoadoutFileEntry::from_disk).collect();

        let mut tree = build_sync_tree(&current, &previous, &desired);
        self.process_sync_tree(&mut tree);
        let groupings = strip_actions(&mut tree, Action::IngestFromDisk | Action::AddReifiedDelete);
        self.run_groupings(&tree, &groupings, ApplyTarget::Installation)
    }

    /// Create a loadout seeded with the initial game files. The first
    /// visible loadout of an installation is activated right away.
    pub fn create_loadout(&self, name: Option<&str>) -> Result<Loadout, SyncError> {
        let db = self.log.db();
        let existing = self.visible_short_names(&db);
        let is_only = existing.is_empty();
        let short_name = next_short_name(&existing);
        let name = match name {
            Some(name) => CompactString::from(name),
            None => format_compact!("Loadout {short_name}"),
        };

        let id = self.seed_loadout(
            NewLoadout {
                name,
                short_name,
                installation: self.installation.metadata_id,
                kind: LoadoutKind::Default,
            },
            true,
        )?;
        if is_only {
            self.activate_loadout(id)?;
        }
        self.reload(id)
    }

    /// Create the hidden loadout mirroring the unmodded game.
    pub fn create_vanilla_state_loadout(&self) -> Result<Loadout, SyncError> {
        let id = self.seed_loadout(
            NewLoadout {
                name: format_compact!("Vanilla State Loadout for {}", self.installation.game_name),
                short_name: VANILLA_SHORT_NAME.into(),
                installation: self.installation.metadata_id,
                kind: LoadoutKind::VanillaState,
            },
            false,
        )?;
        self.reload(id)
    }

    fn seed_loadout(&self, new: NewLoadout, with_collection: bool) -> Result<EntityId, SyncError> {
        let initial = self.get_or_create_initial_disk_state()?;
        let now = Utc::now();

        let mut tx = self.log.begin_transaction();
        let loadout = new.write(&mut tx);
        let game_files = LoadoutItem::add_group(
            &mut tx,
            loadout,
            GAME_FILES_GROUP_NAME,
            GroupKind::GameFiles,
            None,
            now,
        );
        for entry in &initial {
            LoadoutItem::add_file(
                &mut tx,
                loadout,
                game_files,
                entry.path.clone(),
                entry.hash,
                entry.size,
                now,
            );
        }
        if with_collection {
            LoadoutItem::add_group(
                &mut tx,
                loadout,
                MY_MODS_GROUP_NAME,
                GroupKind::Collection,
                None,
                now,
            );
        }

        self.backup_game_files(&initial)?;
        let result = self.log.commit(tx)?;
        let id = result.remap(loadout);
        info!(
            loadout = %new.name,
            kind = %new.kind,
            files = initial.len(),
            "Created loadout"
        );
        Ok(id)
    }

    fn backup_game_files(&self, initial: &[DiskStateEntry]) -> Result<(), SyncError> {
        let entries: Vec<&DiskStateEntry> = initial
            .iter()
            .filter(|entry| !self.policy.is_ignored_backup_path(&entry.path))
            .collect();
        let failures = backup_new_files(
            self.store.as_ref(),
            &self.installation.locations,
            &entries,
        )?;
        for (path, message) in failures {
            warn!(%path, %message, "Failed to back up game file");
        }
        Ok(())
    }

    /// Duplicate a loadout and all of its items under a fresh name.
    pub fn copy_loadout(&self, loadout: EntityId) -> Result<Loadout, SyncError> {
        let db = self.log.db();
        let source = self.load_loadout(&db, loadout)?;
        let short_name = next_short_name(&self.visible_short_names(&db));
        let name = format_compact!("Loadout {short_name}");

        let mut tx = self.log.begin_transaction();
        let old_ids: Vec<EntityId> = std::iter::once(source.id)
            .chain(source.items(&db).into_iter().map(|item| item.id))
            .collect();
        let remap: HashMap<EntityId, EntityId> =
            old_ids.iter().map(|old| (*old, tx.temp_id())).collect();

        for old in &old_ids {
            let (Some(entity), Some(&new)) = (db.get(*old), remap.get(old)) else {
                continue;
            };
            for (attribute, value) in entity.iter() {
                if attribute == Attribute::LoadoutLastApplied {
                    continue;
                }
                let value = value.remap_refs(|r| remap.get(&r).copied().unwrap_or(r));
                tx.add(new, attribute, value);
            }
        }

        let Some(&copy) = remap.get(&source.id) else {
            return Err(SyncError::LoadoutNotFound { id: source.id });
        };
        tx.add(copy, Attribute::LoadoutName, name.clone());
        tx.add(copy, Attribute::LoadoutShortName, short_name);
        tx.add(copy, Attribute::LoadoutKind, LoadoutKind::Default.to_string());

        let result = self.log.commit(tx)?;
        info!(from = %source.name, to = %name, items = old_ids.len() - 1, "Copied loadout");
        self.reload(result.remap(copy))
    }

    /// Delete a loadout and its items, deactivating it first when active.
    pub fn delete_loadout(&self, loadout: EntityId, gc: GcRunMode) -> Result<(), SyncError> {
        if self.in_flight.contains(loadout) {
            return Err(SyncError::Busy { id: loadout });
        }
        let db = self.log.db();
        let target = self.load_loadout(&db, loadout)?;
        let meta = self.installation.metadata(&db)?;
        if meta.last_synced_loadout == Some(loadout) {
            self.deactivate_inner()?;
        }

        let db = self.log.db();
        let mut tx = self.log.begin_transaction();
        let items = target.items(&db);
        for item in &items {
            tx.delete(item.id, false);
        }
        tx.delete(target.id, false);
        self.log.commit(tx)?;
        info!(loadout = %target.name, items = items.len(), "Deleted loadout");

        if gc != GcRunMode::DoNotRun {
            self.gc.run(gc);
        }
        Ok(())
    }

    /// Restore the original game files and forget every loadout.
    pub fn unmanage(&self, run_gc: bool) -> Result<(), SyncError> {
        self.deactivate_inner()?;
        let db = self.log.db();
        for loadout in Loadout::for_installation(&db, self.installation.metadata_id) {
            self.delete_loadout(loadout.id, GcRunMode::DoNotRun)?;
        }
        if run_gc {
            self.gc.run(GcRunMode::RunSynchronously);
        }
        info!(game = %self.installation.game_name, "Stopped managing game");
        Ok(())
    }

    pub fn currently_active_loadout(&self) -> Result<Option<Loadout>, SyncError> {
        let db = self.log.db();
        let meta = self.installation.metadata(&db)?;
        Ok(meta
            .last_synced_loadout
            .and_then(|id| Loadout::load(&db, id)))
    }

    /// Whether `loadout` is applied, and if so whether it was edited since.
    ///
    /// Removing items does not leave a trace on the items themselves; such
    /// edits are noticed through the loadout revision.
    pub fn loadout_state(&self, loadout: EntityId) -> Result<LoadoutState, SyncError> {
        if self.in_flight.contains(loadout) {
            return Ok(LoadoutState::Synchronizing);
        }
        let db = self.log.db();
        let target = self.load_loadout(&db, loadout)?;
        let meta = self.installation.metadata(&db)?;
        if meta.last_synced_loadout != Some(loadout) {
            return Ok(LoadoutState::Inactive);
        }
        let Some(synced_tx) = meta.last_synced_loadout_tx else {
            return Ok(LoadoutState::Unsynchronized);
        };

        let items = target.items(&db);
        let edited = std::iter::once(target.id)
            .chain(items.iter().map(|item| item.id))
            .any(|id| db.last_touched(id).is_some_and(|tx| tx > synced_tx));

        let applied: HashMap<GamePath, ContentHash> = self
            .installation
            .disk_state(&self.log.db_as_of(synced_tx))
            .into_iter()
            .map(|entry| (entry.path, entry.hash))
            .collect();
        let drifted = flatten_loadout(&db, &target, self.policy.as_ref())
            .iter()
            .any(|file| applied.get(&file.path) != Some(&file.hash));

        debug!(%loadout, edited, drifted, "Computed loadout state");
        Ok(if edited || drifted {
            LoadoutState::Unsynchronized
        } else {
            LoadoutState::Active
        })
    }

    /// What applying `loadout` on top of `disk_state` would change, per path.
    pub fn loadout_to_disk_diff(
        &self,
        loadout: EntityId,
        disk_state: &[DiskStateEntry],
    ) -> Result<Vec<DiskDiffEntry>, SyncError> {
        let db = self.log.db();
        let target = self.load_loadout(&db, loadout)?;
        let desired = flatten_loadout(&db, &target, self.policy.as_ref());
        let mut tree = build_sync_tree(disk_state, disk_state, &desired);
        self.process_sync_tree(&mut tree);
        Ok(diff_entries(&tree))
    }

    fn load_loadout(&self, db: &Db, id: EntityId) -> Result<Loadout, SyncError> {
        let loadout = Loadout::load(db, id).ok_or(SyncError::LoadoutNotFound { id })?;
        if loadout.installation != self.installation.metadata_id {
            return Err(SyncError::ForeignLoadout { id });
        }
        Ok(loadout)
    }

    fn reload(&self, id: EntityId) -> Result<Loadout, SyncError> {
        self.load_loadout(&self.log.db(), id)
    }

    fn visible_short_names(&self, db: &Db) -> Vec<CompactString> {
        Loadout::for_installation(db, self.installation.metadata_id)
            .into_iter()
            .filter(Loadout::is_visible)
            .map(|loadout| loadout.short_name)
            .collect()
    }
}
