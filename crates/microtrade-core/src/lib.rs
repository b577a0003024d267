//! Cycle orchestration for the Microtrade economy.
//!
//! This crate owns the economy state and drives it one cycle at a time:
//! collect intents, apply them, match, update prices, run the health tick,
//! and commit with a conservation audit.
//!
//! # Modules
//!
//! - [`clock`] -- Cycle counter.
//! - [`config`] -- YAML configuration loading into strongly-typed structs.
//! - [`state`] -- [`EconomyState`], the aggregate every phase mutates.
//! - [`intents`] -- Validation and application of single intents.
//! - [`health`] -- End-of-cycle health tick and deactivation.
//! - [`cycle`] -- [`CycleOrchestrator`] and its phase machine.
//! - [`decision`] -- [`DecisionSource`] trait and built-in sources.
//! - [`runner`] -- Bounded async simulation loop.
//! - [`persistence`] -- Snapshot, restore, and integrity checks.
//!
//! [`EconomyState`]: state::EconomyState
//! [`CycleOrchestrator`]: cycle::CycleOrchestrator
//! [`DecisionSource`]: decision::DecisionSource

pub mod clock;
pub mod config;
pub mod cycle;
pub mod decision;
pub mod health;
pub mod intents;
pub mod persistence;
pub mod runner;
pub mod state;

pub use config::EconomyConfig;
pub use cycle::{CycleError, CycleOrchestrator, CyclePhase};
pub use decision::{AgentPolicy, DecisionError, DecisionSource};
pub use persistence::{EconomySnapshot, PersistenceError};
pub use runner::{CycleCallback, RunnerError, SimulationEndReason, SimulationResult};
pub use state::EconomyState;
