//! Simulation loop runner.
//!
//! [`run_simulation`] drives cycles until a termination condition holds:
//!
//! - **Bounded run**: stop once cycle `max_cycles` has committed
//!   (0 = unlimited)
//! - **Extinction**: stop when no agent subject to the health tick is
//!   still active, if `stop_on_extinction` is set
//!
//! Between cycles the runner asks the [`DecisionSource`] for intents,
//! hands the committed report to a [`CycleCallback`], and sleeps for
//! `cycle_interval_ms`.

use tracing::{info, warn};

use microtrade_types::CycleReport;

use crate::clock::ClockError;
use crate::cycle::{CycleError, CycleOrchestrator};
use crate::decision::{DecisionError, DecisionSource};
use crate::state::EconomyState;

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A cycle failed.
    #[error("cycle error: {source}")]
    Cycle {
        /// The underlying cycle error.
        #[from]
        source: CycleError,
    },

    /// The decision source failed.
    #[error("decision error: {source}")]
    Decision {
        /// The underlying decision error.
        #[from]
        source: DecisionError,
    },
}

/// Why the simulation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationEndReason {
    /// The configured cycle limit was reached.
    MaxCyclesReached,
    /// No agent subject to the health tick is active.
    Extinction,
}

/// Result of the simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The reason the simulation ended.
    pub end_reason: SimulationEndReason,
    /// Report of the last committed cycle, or the baseline if none ran.
    pub final_report: CycleReport,
    /// Number of cycles executed by this run.
    pub total_cycles: u64,
}

/// Callback invoked after each cycle commits.
pub trait CycleCallback: Send {
    /// Called with the committed report and the state after the cycle.
    fn on_cycle(&mut self, report: &CycleReport, state: &EconomyState);
}

/// A callback that does nothing.
pub struct NoOpCallback;

impl CycleCallback for NoOpCallback {
    fn on_cycle(&mut self, _report: &CycleReport, _state: &EconomyState) {}
}

/// Run cycles until a termination condition is met.
///
/// `max_cycles` is an absolute cycle number, so a run resumed from a
/// snapshot at cycle 4 with `max_cycles: 10` executes six cycles.
///
/// # Errors
///
/// Returns [`RunnerError`] if a cycle or the decision source fails.
pub async fn run_simulation(
    orchestrator: &mut CycleOrchestrator,
    decision_source: &mut dyn DecisionSource,
    callback: &mut dyn CycleCallback,
) -> Result<SimulationResult, RunnerError> {
    let bounds = orchestrator.config().simulation.clone();
    let mut last_report = orchestrator.baseline_report();
    let mut total_cycles: u64 = 0;

    info!(
        start_cycle = last_report.cycle,
        max_cycles = bounds.max_cycles,
        cycle_interval_ms = bounds.cycle_interval_ms,
        "Simulation starting"
    );

    let end_reason = loop {
        // --- Check extinction ---
        if bounds.stop_on_extinction && orchestrator.population() == 0 {
            info!(cycle = last_report.cycle, "No living agents -- extinction");
            break SimulationEndReason::Extinction;
        }

        // --- Check cycle limit ---
        if bounds.max_cycles > 0 && last_report.cycle >= bounds.max_cycles {
            info!(
                cycle = last_report.cycle,
                max_cycles = bounds.max_cycles,
                "Cycle limit reached"
            );
            break SimulationEndReason::MaxCyclesReached;
        }

        // --- Execute cycle ---
        let next = last_report
            .cycle
            .checked_add(1)
            .ok_or(CycleError::Clock {
                source: ClockError::CycleOverflow,
            })?;
        let intents = decision_source.decide(next, &last_report)?;
        let report = orchestrator.run_cycle(intents)?;
        total_cycles = total_cycles.saturating_add(1);

        // --- Notify callback ---
        callback.on_cycle(&report, orchestrator.state());
        last_report = report;

        // --- Sleep for cycle interval ---
        if bounds.cycle_interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(bounds.cycle_interval_ms))
                .await;
        }
    };

    Ok(SimulationResult {
        end_reason,
        final_report: last_report,
        total_cycles,
    })
}

/// Log the end of a simulation run.
pub fn log_simulation_end(result: &SimulationResult) {
    let report = &result.final_report;
    info!(
        reason = ?result.end_reason,
        total_cycles = result.total_cycles,
        final_cycle = report.cycle,
        active_agents = report.active_agents(),
        "Simulation ended"
    );

    if result.total_cycles == 0 {
        warn!("Simulation ended with no cycles executed");
    }
}
