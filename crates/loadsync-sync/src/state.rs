//! Loadout states and the in-process synchronization guard.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use strum::Display;

use loadsync_core::EntityId;

use crate::error::SyncError;

/// Where a loadout stands relative to the game folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum LoadoutState {
    /// Applied, but edited since.
    Unsynchronized,
    Synchronizing,
    Active,
    Inactive,
}

/// Loadouts currently being synchronized in this process.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    loadouts: Arc<Mutex<HashSet<EntityId>>>,
}

impl InFlight {
    /// Mark `loadout` as synchronizing until the guard is dropped.
    pub fn try_begin(&self, loadout: EntityId) -> Result<InFlightGuard, SyncError> {
        let mut loadouts = self.loadouts.lock().unwrap_or_else(PoisonError::into_inner);
        if !loadouts.insert(loadout) {
            return Err(SyncError::Busy { id: loadout });
        }
        Ok(InFlightGuard {
            loadouts: Arc::clone(&self.loadouts),
            loadout,
        })
    }

    pub fn contains(&self, loadout: EntityId) -> bool {
        self.loadouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&loadout)
    }
}

/// Clears the in-flight mark on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    loadouts: Arc<Mutex<HashSet<EntityId>>>,
    loadout: EntityId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.loadouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.loadout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_rejects_second_entry() {
        let in_flight = InFlight::default();
        let id = EntityId(7);
        let guard = in_flight.try_begin(id).unwrap();
        assert!(in_flight.contains(id));
        assert!(matches!(in_flight.try_begin(id), Err(SyncError::Busy { .. })));
        assert!(in_flight.try_begin(EntityId(8)).is_ok());

        drop(guard);
        assert!(!in_flight.contains(id));
        assert!(in_flight.try_begin(id).is_ok());
    }
}
