//! Garbage-collection trigger points.

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

/// How a garbage-collection pass should run after a destructive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum GcRunMode {
    DoNotRun,
    #[default]
    RunAsyncInBackground,
    RunSynchronously,
}

/// Reclaims content-store entries no longer referenced by any loadout.
pub trait GarbageCollector: Send + Sync {
    fn run(&self, mode: GcRunMode);
}

/// Collector that only records that it was asked to run.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGarbageCollector;

impl GarbageCollector for NoopGarbageCollector {
    fn run(&self, mode: GcRunMode) {
        debug!(%mode, "Garbage collection requested");
    }
}
