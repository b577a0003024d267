//! Cycle counter for the Microtrade economy.
//!
//! Cycle 0 is the initial state before any intent has been applied. Each
//! call to [`CycleClock::advance`] opens the next cycle. The counter uses
//! checked arithmetic and never wraps.

use serde::{Deserialize, Serialize};

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Cycle counter would overflow.
    #[error("cycle counter overflow: cannot advance beyond u64::MAX")]
    CycleOverflow,
}

/// The economy's cycle counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleClock {
    /// Number of the current (or last committed) cycle.
    cycle: u64,
}

impl CycleClock {
    /// A clock at cycle 0.
    pub const fn new() -> Self {
        Self { cycle: 0 }
    }

    /// A clock resumed at `cycle`.
    pub const fn at(cycle: u64) -> Self {
        Self { cycle }
    }

    /// Advance to the next cycle. Returns the new cycle number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::CycleOverflow`] if the counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.cycle = self.cycle.checked_add(1).ok_or(ClockError::CycleOverflow)?;
        Ok(self.cycle)
    }

    /// Return the current cycle number.
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }
}
