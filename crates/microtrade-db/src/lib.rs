//! Snapshot storage for the Microtrade economy.
//!
//! Snapshots are plain JSON files, one per saved cycle, in a single
//! directory. The runner writes them through [`SnapshotCallback`]; a new
//! process picks the newest one up with [`resume_or_start`].
//!
//! # Modules
//!
//! - [`snapshot_store`] -- Save, list, and load snapshot files
//! - [`snapshot_callback`] -- Periodic saving from the runner, resume on start
//! - [`error`] -- Shared error types

pub mod error;
pub mod snapshot_callback;
pub mod snapshot_store;

pub use error::DbError;
pub use snapshot_callback::{SnapshotCallback, resume_or_start};
pub use snapshot_store::SnapshotStore;
