//! Content-store contract.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::hash::ContentHash;

/// Something that can open a fresh stream of a file's bytes.
pub trait StreamFactory: Send + Sync + fmt::Debug {
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// Streams a file from the native filesystem.
#[derive(Debug, Clone)]
pub struct NativeFileSource(pub PathBuf);

impl StreamFactory for NativeFileSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.0)?))
    }
}

/// A file submitted for backup.
#[derive(Debug)]
pub struct ArchivedFile {
    /// Hash the bytes are expected to have.
    pub hash: ContentHash,
    pub size: u64,
    pub source: Box<dyn StreamFactory>,
}

/// A per-file failure reported by a batch store operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    /// Filesystem path involved, when there is one.
    pub path: Option<PathBuf>,
    pub hash: ContentHash,
    pub message: String,
}

/// A content-addressed blob store.
///
/// Batch operations report individual file failures in their result and
/// keep processing the remaining files; `Err` is reserved for failures of
/// the store as a whole and for cancellation.
pub trait ContentStore: Send + Sync {
    /// Whether the store holds the bytes for `hash`.
    fn have_file(&self, hash: &ContentHash) -> bool;

    /// Write each hash's bytes to the paired path, creating parent
    /// directories and overwriting existing files.
    fn extract_files(
        &self,
        files: &[(ContentHash, PathBuf)],
        cancel: &CancellationToken,
    ) -> Result<Vec<FileFailure>, StoreError>;

    /// Store the given files. With `deduplicate` set, files whose hash is
    /// already present are skipped without reading their source.
    fn backup_files(
        &self,
        files: Vec<ArchivedFile>,
        deduplicate: bool,
    ) -> Result<Vec<FileFailure>, StoreError>;
}
