//! The economy's aggregate root.
//!
//! [`EconomyState`] bundles every piece of mutable state: the cycle clock,
//! the ledger, the reference prices, and both order books. The cycle
//! orchestrator owns it exclusively and hands `&mut` borrows to each phase
//! in turn; nothing else keeps a copy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use microtrade_ledger::Ledger;
use microtrade_market::{LaborMarket, OrderBook, PriceBook};
use microtrade_types::{Agent, AgentId, AgentSnapshot, GoodName, Role};

use crate::clock::CycleClock;
use crate::config::{ConfigError, EconomyConfig};
use crate::cycle::CycleError;

/// Every piece of mutable economy state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyState {
    /// The cycle counter.
    pub clock: CycleClock,
    /// Agent accounts and the transaction log.
    pub ledger: Ledger,
    /// Reference prices and wage.
    pub prices: PriceBook,
    /// Open goods offers and requests.
    pub order_book: OrderBook,
    /// Open labor offers and demands plus this cycle's hires.
    pub labor: LaborMarket,
    /// Agent credited with market fees, if any.
    pub facilitator: Option<AgentId>,
}

impl EconomyState {
    /// Build the cycle-0 state described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Config`] if the configuration is invalid, or
    /// a ledger or market error if seeding fails.
    pub fn from_config(config: &EconomyConfig) -> Result<Self, CycleError> {
        config.validate()?;

        let mut ledger = Ledger::new(config.health.max_health);
        for seed in &config.agents {
            let role = config.role(&seed.role).ok_or_else(|| ConfigError::Invalid {
                reason: format!("agent {} has unknown role {}", seed.id, seed.role),
            })?;
            let currency = seed.starting_currency.unwrap_or(role.starting_currency);
            let goods = seed.starting_goods.as_ref().unwrap_or(&role.starting_goods);
            let health = seed.health.unwrap_or(config.health.starting_health);

            let agent = goods.iter().fold(
                Agent::new(
                    AgentId::new(seed.id.as_str()),
                    Role::new(seed.role.as_str()),
                    currency,
                    health,
                )
                .with_labor_capacity(config.labor_capacity_for(&seed.role)),
                |agent, (good, &quantity)| agent.with_goods(GoodName::new(good.as_str()), quantity),
            );
            ledger.open_account(agent)?;
        }

        let prices = PriceBook::seed(
            config
                .goods
                .iter()
                .map(|(name, price)| (GoodName::new(name.as_str()), *price)),
        )?;

        Ok(Self {
            clock: CycleClock::new(),
            ledger,
            prices,
            order_book: OrderBook::new(),
            labor: LaborMarket::new(),
            facilitator: config.facilitator_id(),
        })
    }

    /// Current cycle number.
    pub const fn cycle(&self) -> u64 {
        self.clock.cycle()
    }

    /// Snapshots of every agent, keyed by id.
    pub fn agent_snapshots(&self) -> BTreeMap<AgentId, AgentSnapshot> {
        self.ledger
            .agents()
            .iter()
            .map(|(id, agent)| (id.clone(), AgentSnapshot::from(agent)))
            .collect()
    }

    /// Number of active agents for which `counts` returns true.
    pub fn active_count(&self, counts: impl Fn(&Agent) -> bool) -> usize {
        self.ledger
            .agents()
            .values()
            .filter(|agent| agent.active && counts(agent))
            .count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn default_config_seeds_five_agents() {
        let state = EconomyState::from_config(&EconomyConfig::default()).unwrap();
        assert_eq!(state.cycle(), 0);
        assert_eq!(state.ledger.agents().len(), 5);
        assert_eq!(state.facilitator, Some(AgentId::from("market")));

        let producer = state.ledger.agent(&AgentId::from("producer")).unwrap();
        assert_eq!(producer.currency, dec!(10));
        assert_eq!(producer.goods_held(&GoodName::from("food")), 5);
        assert_eq!(producer.health, 100);
        assert_eq!(producer.labor_capacity_hours, 5);

        let market = state.ledger.agent(&AgentId::from("market")).unwrap();
        assert_eq!(market.currency, dec!(6));
        assert!(market.goods.is_empty());

        assert_eq!(state.prices.price(&GoodName::from("food")), Some(dec!(2.0)));
        assert!(state.order_book.offers().is_empty());
        assert!(state.labor.offers().is_empty());
    }

    #[test]
    fn seed_overrides_role_defaults() {
        let yaml = r"
agents:
  - id: rich
    role: trader
    starting_currency: 100
    starting_goods:
      food: 9
    health: 40
";
        let config = EconomyConfig::parse(yaml).unwrap();
        let state = EconomyState::from_config(&config).unwrap();
        let rich = state.ledger.agent(&AgentId::from("rich")).unwrap();
        assert_eq!(rich.currency, dec!(100));
        assert_eq!(rich.goods_held(&GoodName::from("food")), 9);
        assert_eq!(rich.health, 40);
        assert_eq!(state.facilitator, None);
    }

    #[test]
    fn active_count_filters_by_predicate() {
        let state = EconomyState::from_config(&EconomyConfig::default()).unwrap();
        assert_eq!(state.active_count(|_| true), 5);
        assert_eq!(state.active_count(|a| a.role.as_str() != "market"), 4);
    }
}
