//! Filesystem content store.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use loadsync_core::{ArchivedFile, ContentHash, ContentStore, FileFailure, StoreError};

/// A [`ContentStore`] writing gzip-compressed blobs below a root directory.
///
/// Blobs live at `objects/<first two hex chars>/<hex>.gz`. New blobs are
/// written to `tmp/` and renamed into place once their hash is verified, so
/// a present object file is always complete.
#[derive(Debug)]
pub struct FsContentStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FsContentStore {
    /// Open or create a store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for dir in [root.join("objects"), root.join("tmp")] {
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(Self {
            root,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the blob for `hash`.
    pub fn object_path(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        self.root
            .join("objects")
            .join(&hex[..2])
            .join(format!("{hex}.gz"))
    }

    fn tmp_path(&self, hash: &ContentHash) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.root
            .join("tmp")
            .join(format!("{}.{}.{n}", hash.to_hex(), std::process::id()))
    }

    fn extract_one(&self, hash: &ContentHash, dest: &Path) -> Result<(), StoreError> {
        let object = self.object_path(hash);
        let file = match File::open(&object) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::MissingContent { hash: *hash });
            }
            Err(e) => return Err(StoreError::io(&object, e)),
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let mut reader = HashingReader::new(GzDecoder::new(BufReader::new(file)));
        let mut writer = BufWriter::new(File::create(dest).map_err(|e| StoreError::io(dest, e))?);
        io::copy(&mut reader, &mut writer)
            .and_then(|_| writer.flush())
            .map_err(|e| StoreError::io(dest, e))?;

        let actual = reader.finish();
        if actual != *hash {
            let _ = fs::remove_file(dest);
            return Err(StoreError::HashMismatch {
                expected: *hash,
                actual,
            });
        }
        Ok(())
    }

    fn backup_one(&self, file: &ArchivedFile) -> Result<(), StoreError> {
        let tmp = self.tmp_path(&file.hash);
        let result = self.write_blob(file, &tmp);
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    fn write_blob(&self, file: &ArchivedFile, tmp: &Path) -> Result<(), StoreError> {
        let source = file
            .source
            .open()
            .map_err(|e| StoreError::io(format!("{:?}", file.source), e))?;
        let mut reader = HashingReader::new(source);
        let out = File::create(tmp).map_err(|e| StoreError::io(tmp, e))?;
        let mut encoder = GzEncoder::new(BufWriter::new(out), Compression::fast());
        io::copy(&mut reader, &mut encoder).map_err(|e| StoreError::io(tmp, e))?;
        encoder
            .finish()
            .and_then(|mut w| w.flush())
            .map_err(|e| StoreError::io(tmp, e))?;

        let actual = reader.finish();
        if actual != file.hash {
            return Err(StoreError::HashMismatch {
                expected: file.hash,
                actual,
            });
        }

        let object = self.object_path(&file.hash);
        if let Some(parent) = object.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        fs::rename(tmp, &object).map_err(|e| StoreError::io(&object, e))
    }
}

impl ContentStore for FsContentStore {
    fn have_file(&self, hash: &ContentHash) -> bool {
        self.object_path(hash).is_file()
    }

    fn extract_files(
        &self,
        files: &[(ContentHash, PathBuf)],
        cancel: &CancellationToken,
    ) -> Result<Vec<FileFailure>, StoreError> {
        let interrupted = AtomicBool::new(false);
        let failures: Vec<FileFailure> = files
            .par_iter()
            .filter_map(|(hash, dest)| {
                if cancel.is_cancelled() {
                    interrupted.store(true, Ordering::Relaxed);
                    return None;
                }
                self.extract_one(hash, dest).err().map(|e| {
                    warn!(%hash, path = %dest.display(), error = %e, "Failed to extract file");
                    FileFailure {
                        path: Some(dest.clone()),
                        hash: *hash,
                        message: e.to_string(),
                    }
                })
            })
            .collect();

        if interrupted.load(Ordering::Relaxed) {
            return Err(StoreError::Interrupted);
        }
        debug!(files = files.len(), failed = failures.len(), "Extracted files");
        Ok(failures)
    }

    fn backup_files(
        &self,
        files: Vec<ArchivedFile>,
        deduplicate: bool,
    ) -> Result<Vec<FileFailure>, StoreError> {
        let total = files.len();
        let failures: Vec<FileFailure> = files
            .par_iter()
            .filter(|file| !(deduplicate && self.have_file(&file.hash)))
            .filter_map(|file| {
                self.backup_one(file).err().map(|e| {
                    warn!(hash = %file.hash, error = %e, "Failed to back up file");
                    FileFailure {
                        path: None,
                        hash: file.hash,
                        message: e.to_string(),
                    }
                })
            })
            .collect();
        debug!(files = total, failed = failures.len(), "Backed up files");
        Ok(failures)
    }
}

/// Reader adapter computing a BLAKE3 hash of everything read through it.
struct HashingReader<R> {
    inner: R,
    hasher: blake3::Hasher,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
        }
    }

    fn finish(&self) -> ContentHash {
        self.hasher.finalize().into()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadsync_core::NativeFileSource;
    use tempfile::TempDir;

    #[test]
    fn test_backup_then_extract() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::open(dir.path().join("store")).unwrap();

        let source = dir.path().join("source.bin");
        fs::write(&source, b"payload").unwrap();
        let hash = ContentHash::of_bytes(b"payload");

        let failures = store
            .backup_files(
                vec![ArchivedFile {
                    hash,
                    size: 7,
                    source: Box::new(NativeFileSource(source)),
                }],
                false,
            )
            .unwrap();
        assert!(failures.is_empty());
        assert!(store.have_file(&hash));

        let dest = dir.path().join("out/nested/file.bin");
        let failures = store
            .extract_files(&[(hash, dest.clone())], &CancellationToken::new())
            .unwrap();
        assert!(failures.is_empty());
        assert_eq!(fs::read(dest).unwrap(), b"payload");
    }

    #[test]
    fn test_backup_rejects_wrong_hash() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::open(dir.path().join("store")).unwrap();
        let source = dir.path().join("source.bin");
        fs::write(&source, b"actual").unwrap();
        let claimed = ContentHash::of_bytes(b"claimed");

        let failures = store
            .backup_files(
                vec![ArchivedFile {
                    hash: claimed,
                    size: 6,
                    source: Box::new(NativeFileSource(source)),
                }],
                false,
            )
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert!(!store.have_file(&claimed));
        assert_eq!(fs::read_dir(dir.path().join("store/tmp")).unwrap().count(), 0);
    }
}
