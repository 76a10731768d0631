//! Channel-based wrappers running lifecycle operations off the async runtime.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use loadsync_core::{EntityId, GameInstallMetadata, GcRunMode, Loadout};

use crate::error::SyncError;
use crate::executor::ApplyReport;
use crate::synchronizer::LoadoutSynchronizer;

/// Default channel buffer size for operation events.
pub const OPERATION_CHANNEL_SIZE: usize = 100;

/// A lifecycle operation to run in the background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOperation {
    Rescan,
    Synchronize(EntityId),
    Activate(EntityId),
    Deactivate,
    ResetToOriginalGameState,
    CreateLoadout { name: Option<String> },
    CreateVanillaStateLoadout,
    CopyLoadout(EntityId),
    DeleteLoadout { loadout: EntityId, gc: GcRunMode },
    Unmanage { run_gc: bool },
}

/// Value produced by a finished operation.
#[derive(Debug)]
pub enum OperationOutcome {
    Metadata(GameInstallMetadata),
    Applied(ApplyReport),
    Loadout(Loadout),
    Done,
}

/// Event sent through the channel while an operation runs.
#[derive(Debug)]
pub enum OperationEvent {
    Started(LifecycleOperation),
    Complete(Result<OperationOutcome, SyncError>),
}

/// Start `operation` on the blocking pool.
///
/// Must be called from within a tokio runtime. The receiver gets exactly one
/// `Started` followed by one `Complete`.
pub fn start_operation(
    synchronizer: Arc<LoadoutSynchronizer>,
    operation: LifecycleOperation,
) -> mpsc::Receiver<OperationEvent> {
    let (tx, rx) = mpsc::channel(OPERATION_CHANNEL_SIZE);

    tokio::spawn(async move {
        let _ = tx.send(OperationEvent::Started(operation.clone())).await;

        let result = tokio::task::spawn_blocking(move || run_operation(&synchronizer, operation))
            .await
            .unwrap_or_else(|e| {
                Err(SyncError::Task {
                    message: e.to_string(),
                })
            });

        let _ = tx.send(OperationEvent::Complete(result)).await;
    });

    rx
}

/// Run `operation` on the current thread.
pub fn run_operation(
    synchronizer: &LoadoutSynchronizer,
    operation: LifecycleOperation,
) -> Result<OperationOutcome, SyncError> {
    debug!(?operation, "Running lifecycle operation");
    let outcome = match operation {
        LifecycleOperation::Rescan => OperationOutcome::Metadata(synchronizer.reindex_state()?),
        LifecycleOperation::Synchronize(id) => {
            OperationOutcome::Applied(synchronizer.synchronize(id)?)
        }
        LifecycleOperation::Activate(id) => {
            OperationOutcome::Applied(synchronizer.activate_loadout(id)?)
        }
        LifecycleOperation::Deactivate => match synchronizer.deactivate_current_loadout()? {
            Some(report) => OperationOutcome::Applied(report),
            None => OperationOutcome::Done,
        },
        LifecycleOperation::ResetToOriginalGameState => {
            OperationOutcome::Applied(synchronizer.reset_to_original_game_state()?)
        }
        LifecycleOperation::CreateLoadout { name } => {
            OperationOutcome::Loadout(synchronizer.create_loadout(name.as_deref())?)
        }
        LifecycleOperation::CreateVanillaStateLoadout => {
            OperationOutcome::Loadout(synchronizer.create_vanilla_state_loadout()?)
        }
        LifecycleOperation::CopyLoadout(id) => {
            OperationOutcome::Loadout(synchronizer.copy_loadout(id)?)
        }
        LifecycleOperation::DeleteLoadout { loadout, gc } => {
            synchronizer.delete_loadout(loadout, gc)?;
            OperationOutcome::Done
        }
        LifecycleOperation::Unmanage { run_gc } => {
            synchronizer.unmanage(run_gc)?;
            OperationOutcome::Done
        }
    };
    Ok(outcome)
}
