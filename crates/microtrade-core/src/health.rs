//! End-of-cycle health tick.
//!
//! Runs once per cycle after pricing. For every active agent whose role is
//! not exempt:
//!
//! - An agent that consumed this cycle gains `consumption_gain`; unless
//!   `consumption_offsets_decay` is set, `decay_per_cycle` is still taken.
//! - An agent that did not consume loses `decay_per_cycle`.
//! - Health is clamped to `0..=max_health` by the ledger.
//! - An agent reaching 0 is marked inactive and every open order it holds,
//!   goods and labor, is cancelled with its reservation released.

use std::collections::BTreeSet;

use tracing::{debug, info};

use microtrade_types::{AgentId, OrderUpdate};

use crate::config::HealthConfig;
use crate::cycle::CycleError;
use crate::state::EconomyState;

/// Result of one health tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthOutcome {
    /// Agents whose health reached zero this tick.
    pub newly_inactive: Vec<AgentId>,
    /// Orders cancelled because their owner became inactive.
    pub cancelled: Vec<OrderUpdate>,
}

/// Health change for one agent.
pub fn health_delta(config: &HealthConfig, consumed: bool) -> i64 {
    let decay = i64::from(config.decay_per_cycle);
    let gain = i64::from(config.consumption_gain);
    match (consumed, config.consumption_offsets_decay) {
        (true, true) => gain,
        // u32-derived operands cannot overflow i64.
        (true, false) => gain.saturating_sub(decay),
        (false, _) => decay.saturating_neg(),
    }
}

/// Apply one health tick to every active, non-exempt agent.
///
/// # Errors
///
/// Returns a ledger or market error if an agent vanished or a
/// reservation could not be released, which indicates inconsistent state.
pub fn apply_health_tick(
    state: &mut EconomyState,
    config: &HealthConfig,
    consumers: &BTreeSet<AgentId>,
    cycle: u64,
) -> Result<HealthOutcome, CycleError> {
    let subjects: Vec<AgentId> = state
        .ledger
        .agents()
        .values()
        .filter(|a| a.active && !config.exempt_roles.iter().any(|r| r == a.role.as_str()))
        .map(|a| a.id.clone())
        .collect();

    let mut outcome = HealthOutcome::default();
    for agent in subjects {
        let consumed = consumers.contains(&agent);
        let delta = health_delta(config, consumed);
        let health = state.ledger.apply_health_delta(&agent, delta)?;
        debug!(cycle, agent = %agent, consumed, delta, health, "Health updated");

        if health == 0 {
            state.ledger.deactivate(&agent)?;
            let mut cancelled = state
                .order_book
                .cancel_all_for(&mut state.ledger, &agent)?;
            cancelled.extend(state.labor.cancel_all_for(&mut state.ledger, &agent)?);
            info!(
                cycle,
                agent = %agent,
                cancelled_orders = cancelled.len(),
                "Agent became inactive"
            );
            outcome.cancelled.extend(cancelled);
            outcome.newly_inactive.push(agent);
        }
    }
    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use microtrade_types::{GoodName, OrderStatus};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::config::EconomyConfig;

    fn id(name: &str) -> AgentId {
        AgentId::from(name)
    }

    fn state() -> EconomyState {
        EconomyState::from_config(&EconomyConfig::default()).unwrap()
    }

    fn health(state: &EconomyState, agent: &str) -> u32 {
        state.ledger.agent(&id(agent)).unwrap().health
    }

    #[test]
    fn delta_rules() {
        let mut config = HealthConfig::default();
        assert_eq!(health_delta(&config, true), 5);
        assert_eq!(health_delta(&config, false), -15);
        config.consumption_offsets_decay = false;
        assert_eq!(health_delta(&config, true), -10);
    }

    #[test]
    fn fed_agents_gain_and_hungry_agents_decay() {
        let mut state = state();
        state.ledger.apply_health_delta(&id("consumer"), -20).unwrap();
        let consumers: BTreeSet<AgentId> = [id("consumer")].into_iter().collect();
        let outcome =
            apply_health_tick(&mut state, &HealthConfig::default(), &consumers, 1).unwrap();
        assert!(outcome.newly_inactive.is_empty());
        assert_eq!(health(&state, "consumer"), 85);
        assert_eq!(health(&state, "producer"), 85);
        // Exempt role untouched.
        assert_eq!(health(&state, "market"), 100);
    }

    #[test]
    fn gain_is_capped_at_max() {
        let mut state = state();
        let consumers: BTreeSet<AgentId> = [id("trader")].into_iter().collect();
        apply_health_tick(&mut state, &HealthConfig::default(), &consumers, 1).unwrap();
        assert_eq!(health(&state, "trader"), 100);
    }

    #[test]
    fn zero_health_deactivates_and_cancels_orders() {
        let mut state = state();
        let food = GoodName::from("food");
        state
            .order_book
            .submit_offer(&mut state.ledger, 1, &id("worker"), &food, 2, dec!(3))
            .unwrap();
        state
            .labor
            .submit_labor_demand(&mut state.ledger, 1, &id("worker"), 1, dec!(1))
            .unwrap();
        state.ledger.apply_health_delta(&id("worker"), -90).unwrap();

        let outcome =
            apply_health_tick(&mut state, &HealthConfig::default(), &BTreeSet::new(), 1).unwrap();
        assert_eq!(outcome.newly_inactive, vec![id("worker")]);
        assert_eq!(outcome.cancelled.len(), 2);
        assert!(
            outcome
                .cancelled
                .iter()
                .all(|u| u.status == OrderStatus::Cancelled)
        );

        let worker = state.ledger.agent(&id("worker")).unwrap();
        assert!(!worker.active);
        assert_eq!(worker.health, 0);
        assert_eq!(worker.goods_reserved(&food), 0);
        assert_eq!(worker.reserved_currency, Decimal::ZERO);
        assert!(state.order_book.offers().is_empty());
        assert!(state.labor.demands().is_empty());

        // Inactive agents are skipped on later ticks.
        let outcome =
            apply_health_tick(&mut state, &HealthConfig::default(), &BTreeSet::new(), 2).unwrap();
        assert!(outcome.newly_inactive.is_empty());
    }
}
