//! In-memory content store.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use loadsync_core::{ArchivedFile, ContentHash, ContentStore, FileFailure, StoreError};

/// A [`ContentStore`] holding blobs in memory.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: DashMap<ContentHash, Arc<[u8]>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes directly, returning their hash.
    pub fn insert_bytes(&self, data: &[u8]) -> ContentHash {
        let hash = ContentHash::of_bytes(data);
        self.blobs.insert(hash, Arc::from(data));
        hash
    }

    /// Bytes stored for a hash.
    pub fn get(&self, hash: &ContentHash) -> Option<Arc<[u8]>> {
        self.blobs.get(hash).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop a blob, as a garbage collector would.
    pub fn remove(&self, hash: &ContentHash) -> bool {
        self.blobs.remove(hash).is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl ContentStore for MemoryContentStore {
    fn have_file(&self, hash: &ContentHash) -> bool {
        self.blobs.contains_key(hash)
    }

    fn extract_files(
        &self,
        files: &[(ContentHash, PathBuf)],
        cancel: &CancellationToken,
    ) -> Result<Vec<FileFailure>, StoreError> {
        let mut failures = Vec::new();
        for (hash, dest) in files {
            if cancel.is_cancelled() {
                return Err(StoreError::Interrupted);
            }
            let Some(bytes) = self.get(hash) else {
                failures.push(FileFailure {
                    path: Some(dest.clone()),
                    hash: *hash,
                    message: "content not found in store".into(),
                });
                continue;
            };
            let written = dest
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|()| fs::write(dest, &bytes));
            if let Err(e) = written {
                failures.push(FileFailure {
                    path: Some(dest.clone()),
                    hash: *hash,
                    message: e.to_string(),
                });
            }
        }
        debug!(files = files.len(), failed = failures.len(), "Extracted files");
        Ok(failures)
    }

    fn backup_files(
        &self,
        files: Vec<ArchivedFile>,
        deduplicate: bool,
    ) -> Result<Vec<FileFailure>, StoreError> {
        let mut failures = Vec::new();
        for file in files {
            if deduplicate && self.have_file(&file.hash) {
                continue;
            }
            let mut data = Vec::with_capacity(file.size as usize);
            let read = file
                .source
                .open()
                .and_then(|mut reader| reader.read_to_end(&mut data));
            if let Err(e) = read {
                failures.push(FileFailure {
                    path: None,
                    hash: file.hash,
                    message: e.to_string(),
                });
                continue;
            }
            let actual = ContentHash::of_bytes(&data);
            if actual != file.hash {
                failures.push(FileFailure {
                    path: None,
                    hash: file.hash,
                    message: StoreError::HashMismatch {
                        expected: file.hash,
                        actual,
                    }
                    .to_string(),
                });
                continue;
            }
            self.blobs.insert(actual, Arc::from(data));
        }
        Ok(failures)
    }
}
