//! Periodic snapshotting from the simulation runner, and resume from disk.

use tracing::{info, warn};

use microtrade_core::config::SimulationConfig;
use microtrade_core::persistence;
use microtrade_core::runner::CycleCallback;
use microtrade_core::{CycleOrchestrator, EconomyConfig, EconomyState};
use microtrade_types::CycleReport;

use crate::error::DbError;
use crate::snapshot_store::SnapshotStore;

/// A [`CycleCallback`] that saves a snapshot every `interval` cycles.
///
/// A failed save is logged and the run continues; the next due cycle tries
/// again.
#[derive(Debug, Clone)]
pub struct SnapshotCallback {
    store: SnapshotStore,
    interval: u64,
    saved: u64,
}

impl SnapshotCallback {
    /// Save into `store` every `interval` cycles (0 = never).
    pub const fn new(store: SnapshotStore, interval: u64) -> Self {
        Self {
            store,
            interval,
            saved: 0,
        }
    }

    /// Build from the `simulation` config section.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(
            SnapshotStore::new(&config.snapshot_dir),
            config.snapshot_interval_cycles,
        )
    }

    /// The underlying store.
    pub const fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Number of snapshots written so far.
    pub const fn saved(&self) -> u64 {
        self.saved
    }
}

impl CycleCallback for SnapshotCallback {
    fn on_cycle(&mut self, report: &CycleReport, state: &EconomyState) {
        if report.cycle.checked_rem(self.interval) != Some(0) {
            return;
        }
        match self.store.save(&persistence::snapshot(state)) {
            Ok(_) => self.saved = self.saved.saturating_add(1),
            Err(e) => warn!(cycle = report.cycle, error = %e, "Snapshot save failed"),
        }
    }
}

/// Resume from the newest snapshot in the configured directory, or start a
/// fresh economy if there is none.
///
/// # Errors
///
/// Returns [`DbError`] if the directory cannot be read, the newest
/// snapshot is unreadable or corrupt, or the config is invalid.
pub fn resume_or_start(config: EconomyConfig) -> Result<CycleOrchestrator, DbError> {
    let store = SnapshotStore::new(&config.simulation.snapshot_dir);
    match store.load_latest()? {
        Some(snapshot) => Ok(CycleOrchestrator::resume(config, snapshot)?),
        None => {
            info!(dir = %store.dir().display(), "No snapshot found, starting fresh economy");
            Ok(CycleOrchestrator::new(config)?)
        }
    }
}
