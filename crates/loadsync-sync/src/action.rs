//! Synchronization actions and action sets.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize, Serializer};
use strum::{Display, EnumIter};

/// Something the executor may do for one path.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum Action {
    DoNothing,
    /// Copy the on-disk bytes into the content store.
    BackupFile,
    /// Record a changed or new disk file in the loadout.
    IngestFromDisk,
    DeleteFromDisk,
    /// Write the loadout's bytes to disk from the content store.
    ExtractToDisk,
    /// Record a user deletion as a tombstone in the loadout.
    AddReifiedDelete,
    WarnOfUnableToExtract,
    WarnOfConflict,
}

/// Execution order. Backups run before anything destructive; warnings last.
pub const ACTIONS_IN_ORDER: [Action; 8] = [
    Action::DoNothing,
    Action::BackupFile,
    Action::IngestFromDisk,
    Action::DeleteFromDisk,
    Action::ExtractToDisk,
    Action::AddReifiedDelete,
    Action::WarnOfUnableToExtract,
    Action::WarnOfConflict,
];

impl Action {
    const fn bit(self) -> u16 {
        1 << self as u16
    }
}

/// A combinable set of [`Action`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ActionSet(u16);

impl ActionSet {
    pub const EMPTY: ActionSet = ActionSet(0);

    pub const fn single(action: Action) -> Self {
        Self(action.bit())
    }

    pub fn insert(&mut self, action: Action) {
        self.0 |= action.bit();
    }

    pub fn remove(&mut self, action: Action) {
        self.0 &= !action.bit();
    }

    pub const fn contains(self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Add `action` when `condition` holds.
    pub fn with_if(mut self, action: Action, condition: bool) -> Self {
        if condition {
            self.insert(action);
        }
        self
    }

    /// Remove every action of `other`.
    pub fn without(self, other: ActionSet) -> Self {
        Self(self.0 & !other.0)
    }

    /// Members in execution order.
    pub fn iter(self) -> impl Iterator<Item = Action> {
        ACTIONS_IN_ORDER
            .into_iter()
            .filter(move |action| self.contains(*action))
    }
}

impl From<Action> for ActionSet {
    fn from(action: Action) -> Self {
        Self::single(action)
    }
}

impl BitOr<Action> for ActionSet {
    type Output = ActionSet;

    fn bitor(mut self, rhs: Action) -> ActionSet {
        self.insert(rhs);
        self
    }
}

impl BitOr for ActionSet {
    type Output = ActionSet;

    fn bitor(self, rhs: ActionSet) -> ActionSet {
        ActionSet(self.0 | rhs.0)
    }
}

impl BitOr for Action {
    type Output = ActionSet;

    fn bitor(self, rhs: Action) -> ActionSet {
        ActionSet::single(self) | rhs
    }
}

impl BitOrAssign<Action> for ActionSet {
    fn bitor_assign(&mut self, rhs: Action) {
        self.insert(rhs);
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        iter.into_iter().fold(ActionSet::EMPTY, |set, a| set | a)
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for action in self.iter() {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{action}")?;
            first = false;
        }
        if first {
            f.write_str("(none)")?;
        }
        Ok(())
    }
}

impl Serialize for ActionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_order_covers_every_action_once() {
        let ordered: ActionSet = ACTIONS_IN_ORDER.into_iter().collect();
        assert_eq!(ordered.len(), Action::iter().count());
        for action in Action::iter() {
            assert!(ordered.contains(action));
        }
    }

    #[test]
    fn test_backup_precedes_destructive_actions() {
        let pos = |a| ACTIONS_IN_ORDER.iter().position(|x| *x == a).unwrap();
        assert!(pos(Action::BackupFile) < pos(Action::DeleteFromDisk));
        assert!(pos(Action::BackupFile) < pos(Action::ExtractToDisk));
        assert!(pos(Action::DeleteFromDisk) < pos(Action::ExtractToDisk));
    }

    #[test]
    fn test_set_operations() {
        let mut set = Action::DeleteFromDisk | Action::ExtractToDisk;
        set |= Action::BackupFile;
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![
                Action::BackupFile,
                Action::DeleteFromDisk,
                Action::ExtractToDisk
            ]
        );
        set.remove(Action::BackupFile);
        assert!(!set.contains(Action::BackupFile));
        assert_eq!(set.to_string(), "DeleteFromDisk | ExtractToDisk");
        assert!(set.without(set).is_empty());
    }
}
