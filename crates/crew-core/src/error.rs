// ABOUTME: Error types for registry operations.
// ABOUTME: Only structural failures are synchronous; process failures live in worker state.

use thiserror::Error;

/// Errors returned synchronously by [`crate::WorkerRegistry`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Spawn was asked for an id that is already registered.
    #[error("worker {0} already exists")]
    DuplicateWorker(String),

    /// The id does not name a registered worker.
    #[error("worker {0} not found")]
    WorkerNotFound(String),
}
