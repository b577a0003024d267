//! Snapshot persistence on the local filesystem.
//!
//! Each snapshot is one pretty-printed JSON file named after its cycle,
//! `snapshot-0000000042.json`, so a directory listing sorts by cycle.
//! Writes go to a temporary file first and are renamed into place; a
//! crash mid-write leaves the previous snapshot intact.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use microtrade_core::persistence::{self, EconomySnapshot};

use crate::error::DbError;

const PREFIX: &str = "snapshot-";
const SUFFIX: &str = ".json";

/// Reads and writes economy snapshots in one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Create a store rooted at `dir`. The directory is created on the
    /// first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the store writes to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for `cycle`.
    pub fn path_for(&self, cycle: u64) -> PathBuf {
        self.dir.join(format!("{PREFIX}{cycle:010}{SUFFIX}"))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write `snapshot`, replacing any earlier snapshot of the same cycle.
    ///
    /// Returns the path written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the file cannot be written or
    /// [`DbError::Persistence`] if encoding fails.
    pub fn save(&self, snapshot: &EconomySnapshot) -> Result<PathBuf, DbError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(snapshot.cycle());
        let staging = path.with_extension("json.tmp");

        let json = persistence::to_json(snapshot)?;
        fs::write(&staging, json)?;
        fs::rename(&staging, &path)?;

        info!(cycle = snapshot.cycle(), path = %path.display(), "Snapshot saved");
        Ok(path)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Cycles that have a snapshot on disk, ascending.
    ///
    /// A missing directory is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the directory cannot be read.
    pub fn list(&self) -> Result<BTreeSet<u64>, DbError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut cycles = BTreeSet::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(cycle) = name.to_str().and_then(parse_cycle) {
                cycles.insert(cycle);
            }
        }
        Ok(cycles)
    }

    /// Load the snapshot for `cycle` without verifying it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no such snapshot exists, or an
    /// I/O or decoding error.
    pub fn load(&self, cycle: u64) -> Result<EconomySnapshot, DbError> {
        let path = self.path_for(cycle);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DbError::NotFound(cycle));
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot = persistence::from_json(&json)?;
        debug!(cycle, path = %path.display(), "Snapshot loaded");
        Ok(snapshot)
    }

    /// Load the snapshot with the highest cycle, if any.
    ///
    /// # Errors
    ///
    /// Returns an I/O or decoding error.
    pub fn load_latest(&self) -> Result<Option<EconomySnapshot>, DbError> {
        match self.list()?.last() {
            Some(&cycle) => self.load(cycle).map(Some),
            None => Ok(None),
        }
    }
}

fn parse_cycle(name: &str) -> Option<u64> {
    name.strip_prefix(PREFIX)?
        .strip_suffix(SUFFIX)?
        .parse()
        .ok()
}
