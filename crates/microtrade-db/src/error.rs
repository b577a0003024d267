//! Error types for the snapshot store.
//!
//! All errors are propagated via [`DbError`], which wraps the underlying
//! I/O, persistence, and cycle errors.

use microtrade_core::{CycleError, PersistenceError};

/// Errors that can occur in the snapshot store.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot could not be encoded, decoded, or verified.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Resuming the orchestrator from a snapshot failed.
    #[error("Cycle error: {0}")]
    Cycle(#[from] CycleError),

    /// No snapshot exists for the requested cycle.
    #[error("Snapshot not found for cycle {0}")]
    NotFound(u64),
}
