//! Per-path signatures and the signature to action mapping.

use serde::Serialize;

use loadsync_core::ContentHash;

use crate::action::{Action, ActionSet};

/// How one side of a path changed relative to the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Delta {
    Unchanged,
    Added,
    Removed,
    Modified,
}

impl Delta {
    pub fn between(current: Option<ContentHash>, previous: Option<ContentHash>) -> Self {
        match (current, previous) {
            (None, None) => Delta::Unchanged,
            (Some(_), None) => Delta::Added,
            (None, Some(_)) => Delta::Removed,
            (Some(cur), Some(prev)) if cur == prev => Delta::Unchanged,
            (Some(_), Some(_)) => Delta::Modified,
        }
    }

    fn is_present_change(self) -> bool {
        matches!(self, Delta::Added | Delta::Modified)
    }
}

/// Everything the mapper needs to know about one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Signature {
    pub disk: Option<ContentHash>,
    pub previous: Option<ContentHash>,
    pub loadout: Option<ContentHash>,
    pub disk_archived: bool,
    pub previous_archived: bool,
    pub loadout_archived: bool,
    pub path_is_ignored: bool,
}

impl Signature {
    pub fn disk_delta(&self) -> Delta {
        Delta::between(self.disk, self.previous)
    }

    pub fn loadout_delta(&self) -> Delta {
        Delta::between(self.loadout, self.previous)
    }

    /// Actions for this signature. Never empty.
    pub fn actions(&self) -> ActionSet {
        map_actions(self)
    }
}

/// Map a signature to the actions that reconcile its path.
pub fn map_actions(sig: &Signature) -> ActionSet {
    let disk = sig.disk_delta();
    let loadout = sig.loadout_delta();
    let backup_disk = sig.disk.is_some() && !sig.disk_archived;

    let mut actions = match (disk, loadout) {
        (Delta::Unchanged, Delta::Unchanged) | (Delta::Removed, Delta::Removed) => {
            ActionSet::single(Action::DoNothing)
        }

        (Delta::Unchanged, l) if l.is_present_change() => restore_from_store(sig),

        (Delta::Unchanged, Delta::Removed) => {
            ActionSet::single(Action::DeleteFromDisk).with_if(Action::BackupFile, backup_disk)
        }

        (d, Delta::Unchanged) if d.is_present_change() => {
            ActionSet::single(Action::IngestFromDisk).with_if(Action::BackupFile, backup_disk)
        }

        (d, l) if d.is_present_change() && l.is_present_change() => {
            if sig.disk == sig.loadout {
                if backup_disk {
                    ActionSet::single(Action::BackupFile)
                } else {
                    ActionSet::single(Action::DoNothing)
                }
            } else {
                ActionSet::single(Action::WarnOfConflict)
            }
        }

        (Delta::Removed, Delta::Unchanged) => restore_from_store(sig),

        _ => ActionSet::single(Action::WarnOfConflict),
    };

    if sig.path_is_ignored {
        actions.remove(Action::BackupFile);
        actions.remove(Action::IngestFromDisk);
        if actions.is_empty() {
            actions.insert(Action::DoNothing);
        }
    }
    actions
}

/// Write the loadout's bytes to disk, replacing whatever is there.
fn restore_from_store(sig: &Signature) -> ActionSet {
    if !sig.loadout_archived {
        return ActionSet::single(Action::WarnOfUnableToExtract);
    }
    let on_disk = sig.disk.is_some();
    ActionSet::single(Action::ExtractToDisk)
        .with_if(Action::DeleteFromDisk, on_disk)
        .with_if(Action::BackupFile, on_disk && !sig.disk_archived)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> Option<ContentHash> {
        Some(ContentHash::new([n; 32]))
    }

    fn sig(
        disk: Option<ContentHash>,
        prev: Option<ContentHash>,
        loadout: Option<ContentHash>,
    ) -> Signature {
        Signature {
            disk,
            previous: prev,
            loadout,
            disk_archived: true,
            previous_archived: true,
            loadout_archived: true,
            path_is_ignored: false,
        }
    }

    fn actions(list: &[Action]) -> ActionSet {
        list.iter().copied().collect()
    }

    #[test]
    fn test_delta() {
        assert_eq!(Delta::between(None, None), Delta::Unchanged);
        assert_eq!(Delta::between(h(1), None), Delta::Added);
        assert_eq!(Delta::between(None, h(1)), Delta::Removed);
        assert_eq!(Delta::between(h(1), h(1)), Delta::Unchanged);
        assert_eq!(Delta::between(h(2), h(1)), Delta::Modified);
    }

    #[test]
    fn test_unchanged_everywhere() {
        assert_eq!(map_actions(&sig(h(1), h(1), h(1))), actions(&[Action::DoNothing]));
        assert_eq!(map_actions(&sig(None, None, None)), actions(&[Action::DoNothing]));
    }

    #[test]
    fn test_loadout_added_extracts() {
        assert_eq!(
            map_actions(&sig(None, None, h(1))),
            actions(&[Action::ExtractToDisk])
        );
    }

    #[test]
    fn test_loadout_modified_replaces_in_place() {
        let mut s = sig(h(1), h(1), h(2));
        assert_eq!(
            map_actions(&s),
            actions(&[Action::DeleteFromDisk, Action::ExtractToDisk])
        );

        s.disk_archived = false;
        assert_eq!(
            map_actions(&s),
            actions(&[
                Action::BackupFile,
                Action::DeleteFromDisk,
                Action::ExtractToDisk
            ])
        );
    }

    #[test]
    fn test_unarchived_loadout_warns() {
        let mut s = sig(None, None, h(1));
        s.loadout_archived = false;
        assert_eq!(map_actions(&s), actions(&[Action::WarnOfUnableToExtract]));
    }

    #[test]
    fn test_loadout_removed_deletes() {
        assert_eq!(
            map_actions(&sig(h(1), h(1), None)),
            actions(&[Action::DeleteFromDisk])
        );
        let mut s = sig(h(1), h(1), None);
        s.disk_archived = false;
        assert_eq!(
            map_actions(&s),
            actions(&[Action::BackupFile, Action::DeleteFromDisk])
        );
    }

    #[test]
    fn test_disk_changes_are_ingested() {
        let mut added = sig(h(1), None, None);
        added.disk_archived = false;
        assert_eq!(
            map_actions(&added),
            actions(&[Action::BackupFile, Action::IngestFromDisk])
        );
        assert_eq!(
            map_actions(&sig(h(2), h(1), h(1))),
            actions(&[Action::IngestFromDisk])
        );
    }

    #[test]
    fn test_both_changed() {
        assert_eq!(map_actions(&sig(h(2), h(1), h(2))), actions(&[Action::DoNothing]));
        let mut same = sig(h(2), None, h(2));
        same.disk_archived = false;
        assert_eq!(map_actions(&same), actions(&[Action::BackupFile]));
        assert_eq!(
            map_actions(&sig(h(2), h(1), h(3))),
            actions(&[Action::WarnOfConflict])
        );
        assert_eq!(
            map_actions(&sig(h(2), h(1), None)),
            actions(&[Action::WarnOfConflict])
        );
    }

    #[test]
    fn test_disk_removed() {
        assert_eq!(
            map_actions(&sig(None, h(1), h(1))),
            actions(&[Action::ExtractToDisk])
        );
        assert_eq!(map_actions(&sig(None, h(1), None)), actions(&[Action::DoNothing]));
        assert_eq!(
            map_actions(&sig(None, h(1), h(2))),
            actions(&[Action::WarnOfConflict])
        );
    }

    #[test]
    fn test_ignored_path_strips_backup_and_ingest() {
        let mut s = sig(h(1), None, None);
        s.disk_archived = false;
        s.path_is_ignored = true;
        assert_eq!(map_actions(&s), actions(&[Action::DoNothing]));

        let mut replace = sig(h(1), h(1), h(2));
        replace.disk_archived = false;
        replace.path_is_ignored = true;
        assert_eq!(
            map_actions(&replace),
            actions(&[Action::DeleteFromDisk, Action::ExtractToDisk])
        );
    }

    #[test]
    fn test_mapping_is_total() {
        let hashes = [None, h(1), h(2)];
        for disk in hashes {
            for prev in hashes {
                for loadout in hashes {
                    for bits in 0u8..16 {
                        let s = Signature {
                            disk,
                            previous: prev,
                            loadout,
                            disk_archived: bits & 1 != 0,
                            previous_archived: bits & 2 != 0,
                            loadout_archived: bits & 4 != 0,
                            path_is_ignored: bits & 8 != 0,
                        };
                        assert!(!map_actions(&s).is_empty(), "{s:?}");
                    }
                }
            }
        }
    }
}
