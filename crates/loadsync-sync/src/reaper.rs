//! Removal of directories left empty by deletions.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use loadsync_core::{DiskStateEntry, GamePath, LocationsRegister};

/// Deletes the highest empty ancestor directories of deleted files.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryReaper<'a> {
    locations: &'a LocationsRegister,
}

impl<'a> DirectoryReaper<'a> {
    pub fn new(locations: &'a LocationsRegister) -> Self {
        Self { locations }
    }

    /// Directories to remove after `deleted` files are gone, given the disk
    /// state that survives. Location roots are never returned.
    pub fn plan(deleted: &[GamePath], surviving: &[DiskStateEntry]) -> BTreeSet<GamePath> {
        let non_empty: HashSet<GamePath> = surviving
            .iter()
            .flat_map(|entry| entry.path.ancestors())
            .collect();

        let mut seen: HashSet<GamePath> = HashSet::new();
        let mut roots = BTreeSet::new();
        for path in deleted {
            let mut candidate = None;
            let mut parent = path.parent();
            while let Some(dir) = parent {
                if dir.is_root() || non_empty.contains(&dir) {
                    break;
                }
                if !seen.insert(dir.clone()) {
                    // Already handled through an earlier path.
                    candidate = None;
                    break;
                }
                parent = dir.parent();
                candidate = Some(dir);
            }
            if let Some(dir) = candidate {
                roots.insert(dir);
            }
        }
        roots
    }

    /// Remove the planned directories. Failures are logged and skipped.
    pub fn reap(&self, deleted: &[GamePath], surviving: &[DiskStateEntry]) -> Vec<GamePath> {
        let mut removed = Vec::new();
        for dir in Self::plan(deleted, surviving) {
            let Some(native) = self.locations.resolve(&dir) else {
                continue;
            };
            match contains_files(&native) {
                Ok(false) => {}
                Ok(true) => {
                    debug!(dir = %dir, "Directory still holds untracked files, keeping it");
                    continue;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(dir = %native.display(), error = %err, "Failed to inspect directory");
                    continue;
                }
            }
            match fs::remove_dir_all(&native) {
                Ok(()) => {
                    debug!(dir = %dir, "Removed empty directory");
                    removed.push(dir);
                }
                Err(err) => {
                    warn!(dir = %native.display(), error = %err, "Failed to remove empty directory");
                }
            }
        }
        removed
    }
}

fn contains_files(dir: &Path) -> io::Result<bool> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if !file_type.is_dir() || contains_files(&entry.path())? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use loadsync_core::{ContentHash, EntityId, LocationId};
    use tempfile::TempDir;

    fn game(path: &str) -> GamePath {
        GamePath::new(LocationId::game(), path)
    }

    fn entry(path: &str) -> DiskStateEntry {
        DiskStateEntry {
            id: EntityId(1),
            path: game(path),
            hash: ContentHash::of_bytes(path.as_bytes()),
            size: 0,
            last_modified: DateTime::<Utc>::UNIX_EPOCH,
            game: EntityId(1),
        }
    }

    #[test]
    fn test_plan_picks_highest_empty_ancestor() {
        let deleted = [game("mods/a/b/file.esp"), game("top.txt")];
        let plan = DirectoryReaper::plan(&deleted, &[]);
        assert_eq!(plan.into_iter().collect::<Vec<_>>(), vec![game("mods")]);
    }

    #[test]
    fn test_plan_stops_at_non_empty() {
        let deleted = [game("data/mods/x/file.esp")];
        let plan = DirectoryReaper::plan(&deleted, &[entry("data/base.pak")]);
        assert_eq!(plan.into_iter().collect::<Vec<_>>(), vec![game("data/mods")]);
    }

    #[test]
    fn test_plan_shared_directory_once() {
        let deleted = [game("mods/a/one.esp"), game("mods/a/two.esp")];
        let plan = DirectoryReaper::plan(&deleted, &[]);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_reap_keeps_untracked_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("empty/nested")).unwrap();
        fs::create_dir_all(dir.path().join("busy")).unwrap();
        fs::write(dir.path().join("busy/untracked.txt"), b"x").unwrap();

        let locations = LocationsRegister::new().with_location(LocationId::game(), dir.path());
        let reaper = DirectoryReaper::new(&locations);
        let removed = reaper.reap(
            &[game("empty/nested/gone.txt"), game("busy/gone.txt")],
            &[],
        );

        assert_eq!(removed, vec![game("empty")]);
        assert!(!dir.path().join("empty").exists());
        assert!(dir.path().join("busy/untracked.txt").exists());
    }
}
