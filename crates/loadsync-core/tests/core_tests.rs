use std::sync::Mutex;

use chrono::{DateTime, Utc};
use loadsync_core::{
    Attribute, CommitResult, ContentHash, Db, DiskStateEntry, EntityId, GameInstallation,
    GamePath, GroupKind, ItemKind, Loadout, LoadoutItem, LoadoutKind, LocationId,
    LocationsRegister, MetadataLog, NewLoadout, StoreError, Transaction, TxId,
};

/// Minimal log keeping every snapshot.
struct VecLog {
    history: Mutex<Vec<Db>>,
    next_entity: Mutex<u64>,
}

impl VecLog {
    fn new() -> Self {
        Self {
            history: Mutex::new(vec![Db::empty()]),
            next_entity: Mutex::new(1),
        }
    }
}

impl MetadataLog for VecLog {
    fn db(&self) -> Db {
        self.history.lock().unwrap().last().cloned().unwrap()
    }

    fn db_as_of(&self, tx: TxId) -> Db {
        let history = self.history.lock().unwrap();
        history
            .iter()
            .rev()
            .find(|db| db.basis_tx() <= tx)
            .cloned()
            .unwrap()
    }

    fn commit(&self, tx: Transaction) -> Result<CommitResult, StoreError> {
        let mut history = self.history.lock().unwrap();
        let current = history.last().cloned().unwrap();
        let tx_id = TxId(history.len() as u64);
        let mut next = self.next_entity.lock().unwrap();
        let (ops, remap) = tx.resolve(tx_id, || {
            let id = EntityId(*next);
            *next += 1;
            id
        });
        let db = current.apply(tx_id, &ops);
        history.push(db.clone());
        Ok(CommitResult::new(tx_id, db, remap))
    }
}

fn game(path: &str) -> GamePath {
    GamePath::new(LocationId::game(), path)
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn locations() -> LocationsRegister {
    LocationsRegister::new().with_location(LocationId::game(), "/games/test")
}

#[test]
fn test_register_is_idempotent() {
    let log = VecLog::new();
    let first = GameInstallation::register(&log, "Test Game", locations()).unwrap();
    let second = GameInstallation::register(&log, "Test Game", locations()).unwrap();

    assert_eq!(first.metadata_id, second.metadata_id);
    let meta = first.metadata(&log.db()).unwrap();
    assert_eq!(meta.name, "Test Game");
    assert!(meta.initial_disk_state_tx.is_none());
    assert!(meta.last_synced_loadout.is_none());
}

#[test]
fn test_last_applied_state_falls_back_to_initial() {
    let log = VecLog::new();
    let install = GameInstallation::register(&log, "game", locations()).unwrap();
    assert!(install.initial_disk_state(&log).is_none());
    assert!(install.last_applied_disk_state(&log).is_empty());

    let mut tx = log.begin_transaction();
    DiskStateEntry::insert(
        &mut tx,
        install.metadata_id,
        game("b.txt"),
        ContentHash::of_bytes(b"b"),
        1,
        at(10),
    );
    DiskStateEntry::insert(
        &mut tx,
        install.metadata_id,
        game("a.txt"),
        ContentHash::of_bytes(b"a"),
        1,
        at(10),
    );
    let this = tx.this_tx();
    tx.add(install.metadata_id, Attribute::InitialDiskStateTx, this);
    let initial = log.commit(tx).unwrap();

    // later changes do not leak into the initial snapshot
    let mut tx = log.begin_transaction();
    DiskStateEntry::insert(
        &mut tx,
        install.metadata_id,
        game("c.txt"),
        ContentHash::of_bytes(b"c"),
        1,
        at(20),
    );
    log.commit(tx).unwrap();

    let snapshot = install.initial_disk_state(&log).unwrap();
    let paths: Vec<&str> = snapshot.iter().map(|e| e.path.path()).collect();
    assert_eq!(paths, vec!["a.txt", "b.txt"]);
    assert_eq!(install.last_applied_disk_state(&log), snapshot);
    assert_eq!(install.disk_state(&log.db()).len(), 3);
    assert_eq!(
        install.metadata(&log.db()).unwrap().initial_disk_state_tx,
        Some(initial.tx)
    );
}

#[test]
fn test_loadout_items_and_groups() {
    let log = VecLog::new();
    let install = GameInstallation::register(&log, "game", locations()).unwrap();

    let mut tx = log.begin_transaction();
    let loadout = NewLoadout {
        name: "Main".into(),
        short_name: "A".into(),
        installation: install.metadata_id,
        kind: LoadoutKind::Default,
    }
    .write(&mut tx);
    let game_files =
        LoadoutItem::add_group(&mut tx, loadout, "Game Files", GroupKind::GameFiles, None, at(1));
    let collection =
        LoadoutItem::add_group(&mut tx, loadout, "My Mods", GroupKind::Collection, None, at(2));
    let mod_group =
        LoadoutItem::add_group(&mut tx, loadout, "Mod", GroupKind::User, Some(collection), at(3));
    let exe = LoadoutItem::add_file(
        &mut tx,
        loadout,
        game_files,
        game("game.exe"),
        ContentHash::of_bytes(b"exe"),
        3,
        at(1),
    );
    let plugin = LoadoutItem::add_file(
        &mut tx,
        loadout,
        mod_group,
        game("data/mod.esp"),
        ContentHash::of_bytes(b"esp"),
        3,
        at(3),
    );
    let gone = LoadoutItem::add_deleted_file(
        &mut tx,
        loadout,
        mod_group,
        game("old.dll"),
        "removed",
        at(3),
    );
    let result = log.commit(tx).unwrap();

    let db = result.db.clone();
    let loadout = Loadout::load(&db, result.remap(loadout)).unwrap();
    assert_eq!(loadout.name, "Main");
    assert_eq!(loadout.revision, 0);
    assert!(loadout.is_visible());
    assert_eq!(loadout.game_files_group(&db), Some(result.remap(game_files)));
    assert!(loadout.overrides_group(&db).is_none());
    assert_eq!(loadout.items(&db).len(), 6);
    assert_eq!(Loadout::for_installation(&db, install.metadata_id), vec![loadout.clone()]);

    let plugin = LoadoutItem::load(&db, result.remap(plugin)).unwrap();
    assert_eq!(plugin.target_path(), Some(&game("data/mod.esp")));
    assert_eq!(plugin.containing_group(&db).unwrap().name, "Mod");
    assert_eq!(plugin.this_and_parents(&db).len(), 3);
    assert!(plugin.is_enabled(&db));

    let exe = LoadoutItem::load(&db, result.remap(exe)).unwrap();
    assert_eq!(
        exe.containing_group(&db).and_then(|g| g.group_kind()),
        Some(GroupKind::GameFiles)
    );

    let gone = LoadoutItem::load(&db, result.remap(gone)).unwrap();
    assert!(matches!(gone.kind, ItemKind::DeletedFile { .. }));

    // disabling the collection disables everything below it
    let mut tx = log.begin_transaction();
    LoadoutItem::set_disabled(&mut tx, result.remap(collection), true);
    loadout.bump_revision(&mut tx);
    let db = log.commit(tx).unwrap().db;
    assert!(!LoadoutItem::load(&db, plugin.id).unwrap().is_enabled(&db));
    assert!(LoadoutItem::load(&db, exe.id).unwrap().is_enabled(&db));
    assert_eq!(Loadout::load(&db, loadout.id).unwrap().revision, 1);
}

#[test]
fn test_disk_state_entry_updates() {
    let log = VecLog::new();
    let install = GameInstallation::register(&log, "game", locations()).unwrap();

    let mut tx = log.begin_transaction();
    let id = DiskStateEntry::insert(
        &mut tx,
        install.metadata_id,
        game("a.txt"),
        ContentHash::of_bytes(b"a"),
        1,
        at(10),
    );
    let result = log.commit(tx).unwrap();
    let entry = DiskStateEntry::load(&result.db, result.remap(id)).unwrap();

    let mut tx = log.begin_transaction();
    entry.update(&mut tx, ContentHash::of_bytes(b"abc"), 3, at(20));
    let db = log.commit(tx).unwrap().db;
    let updated = DiskStateEntry::load(&db, entry.id).unwrap();
    assert_eq!(updated.size, 3);
    assert_eq!(updated.last_modified, at(20));
    assert_eq!(db.last_touched(entry.id), Some(db.basis_tx()));

    let mut tx = log.begin_transaction();
    updated.touch(&mut tx, at(30));
    let db = log.commit(tx).unwrap().db;
    assert_eq!(DiskStateEntry::load(&db, entry.id).unwrap().hash, updated.hash);

    let mut tx = log.begin_transaction();
    updated.retract(&mut tx);
    let db = log.commit(tx).unwrap().db;
    assert!(DiskStateEntry::load(&db, entry.id).is_none());
    assert!(install.disk_state(&db).is_empty());
}

#[test]
fn test_locations_round_trip_game_paths() {
    let locations = locations().with_location(LocationId::new("Saves"), "/games/test/saves");
    let native = locations.resolve(&game("data/a.pak")).unwrap();
    assert_eq!(locations.to_game_path(&native), Some(game("data/a.pak")));
    assert_eq!(
        locations.to_game_path(std::path::Path::new("/games/test/saves/slot1.sav")),
        Some(GamePath::new(LocationId::new("Saves"), "slot1.sav"))
    );
    assert!(locations
        .resolve(&GamePath::new(LocationId::new("Missing"), "x"))
        .is_none());
    assert_eq!(game("data/a.pak").to_string(), "{Game}/data/a.pak");
}
