//! In-memory metadata log.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use loadsync_core::{CommitResult, Db, EntityId, MetadataLog, StoreError, Transaction, TxId};

/// A [`MetadataLog`] that keeps every committed snapshot in memory.
#[derive(Debug)]
pub struct MemoryLog {
    state: Mutex<LogState>,
}

#[derive(Debug)]
struct LogState {
    /// Snapshots in commit order, starting with the empty database.
    history: Vec<Db>,
    next_entity: u64,
    next_tx: u64,
    fail_next_commit: Option<String>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LogState {
                history: vec![Db::empty()],
                next_entity: 1,
                next_tx: 1,
                fail_next_commit: None,
            }),
        }
    }

    /// Make the next commit fail with [`StoreError::CommitFailed`].
    pub fn fail_next_commit(&self, message: impl Into<String>) {
        self.lock().fail_next_commit = Some(message.into());
    }

    /// Number of committed transactions.
    pub fn commit_count(&self) -> usize {
        self.lock().history.len() - 1
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataLog for MemoryLog {
    fn db(&self) -> Db {
        let state = self.lock();
        state.history.last().cloned().unwrap_or_default()
    }

    fn db_as_of(&self, tx: TxId) -> Db {
        let state = self.lock();
        state
            .history
            .iter()
            .rev()
            .find(|db| db.basis_tx() <= tx)
            .cloned()
            .unwrap_or_default()
    }

    fn commit(&self, tx: Transaction) -> Result<CommitResult, StoreError> {
        let mut state = self.lock();
        if let Some(message) = state.fail_next_commit.take() {
            warn!(%message, "Rejecting commit");
            return Err(StoreError::CommitFailed { message });
        }

        let tx_id = TxId(state.next_tx);
        state.next_tx += 1;

        let mut next_entity = state.next_entity;
        let (ops, remap) = tx.resolve(tx_id, || {
            let id = EntityId(next_entity);
            next_entity += 1;
            id
        });
        state.next_entity = next_entity;

        let db = state
            .history
            .last()
            .cloned()
            .unwrap_or_default()
            .apply(tx_id, &ops);
        state.history.push(db.clone());

        debug!(tx = %tx_id, ops = ops.len(), "Committed transaction");
        Ok(CommitResult::new(tx_id, db, remap))
    }
}
