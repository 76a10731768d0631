//! Integration tests for the storage backends.

use std::fs;

use loadsync_core::{
    ArchivedFile, Attribute, ContentHash, ContentStore, MetadataLog, NativeFileSource, StoreError,
    TxId,
};
use loadsync_store::{FsContentStore, MemoryContentStore, MemoryLog};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[test]
fn test_db_as_of_sees_past_snapshots() {
    let log = MemoryLog::new();

    let mut tx = log.begin_transaction();
    let id = tx.temp_id();
    tx.add(id, Attribute::ItemName, "first");
    let first = log.commit(tx).unwrap();
    let id = first.remap(id);

    let mut tx = log.begin_transaction();
    tx.add(id, Attribute::ItemName, "second");
    let second = log.commit(tx).unwrap();

    let name = |tx: TxId| {
        log.db_as_of(tx)
            .get(id)
            .and_then(|e| e.get_str(Attribute::ItemName).map(str::to_owned))
    };
    assert_eq!(name(first.tx).as_deref(), Some("first"));
    assert_eq!(name(second.tx).as_deref(), Some("second"));
    assert_eq!(name(TxId(0)), None);
    assert!(second.tx > first.tx);
}

#[test]
fn test_this_tx_resolves_to_commit_id() {
    let log = MemoryLog::new();
    let mut tx = log.begin_transaction();
    let id = tx.temp_id();
    let this = tx.this_tx();
    tx.add(id, Attribute::LastScannedDiskStateTx, this);
    let result = log.commit(tx).unwrap();

    let stored = log
        .db()
        .get(result.remap(id))
        .and_then(|e| e.get_tx(Attribute::LastScannedDiskStateTx));
    assert_eq!(stored, Some(result.tx));
}

#[test]
fn test_memory_store_reports_missing_content() {
    let dir = TempDir::new().unwrap();
    let store = MemoryContentStore::new();
    let present = store.insert_bytes(b"present");
    let missing = ContentHash::of_bytes(b"missing");

    let failures = store
        .extract_files(
            &[
                (present, dir.path().join("a.txt")),
                (missing, dir.path().join("b.txt")),
            ],
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].hash, missing);
    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"present");
    assert!(!dir.path().join("b.txt").exists());
}

#[test]
fn test_memory_store_cancelled_extract() {
    let dir = TempDir::new().unwrap();
    let store = MemoryContentStore::new();
    let hash = store.insert_bytes(b"data");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = store.extract_files(&[(hash, dir.path().join("a"))], &cancel);
    assert!(matches!(result, Err(StoreError::Interrupted)));
}

#[test]
fn test_memory_store_dedupe_skips_reading() {
    let store = MemoryContentStore::new();
    let hash = store.insert_bytes(b"already here");

    // source does not exist, so reading it would fail
    let file = || ArchivedFile {
        hash,
        size: 12,
        source: Box::new(NativeFileSource("/nonexistent/loadsync/file".into())),
    };
    assert!(store.backup_files(vec![file()], true).unwrap().is_empty());
    assert_eq!(store.backup_files(vec![file()], false).unwrap().len(), 1);
}

#[test]
fn test_fs_store_missing_blob() {
    let dir = TempDir::new().unwrap();
    let store = FsContentStore::open(dir.path().join("store")).unwrap();
    let missing = ContentHash::of_bytes(b"nope");

    let failures = store
        .extract_files(
            &[(missing, dir.path().join("out.bin"))],
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(failures.len(), 1);
    assert!(!store.have_file(&missing));
}
