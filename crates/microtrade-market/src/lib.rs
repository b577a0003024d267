//! Order book, labor market, and reference pricing for the Microtrade economy.
//!
//! Every operation here reads and writes agent balances only through the
//! [`microtrade_ledger::Ledger`]. Order placement reserves what the order
//! could consume; matching settles against those reservations.
//!
//! # Modules
//!
//! - [`clearing`] -- Clearing price rule, price increment, facilitator fee
//! - [`error`] -- Error types for market operations ([`MarketError`])
//! - [`labor`] -- Labor offers, demands, and cycle-scoped hires ([`LaborMarket`])
//! - [`order_book`] -- Goods offers and requests, matching, direct accepts ([`OrderBook`])
//! - [`pricing`] -- Reference prices and reference wage ([`PriceBook`])

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use microtrade_types::{AgentId, GoodName};

pub mod clearing;
pub mod error;
pub mod labor;
pub mod order_book;
pub mod pricing;

pub use clearing::{ClearingPolicy, order_value, round_to_increment};
pub use error::MarketError;
pub use labor::{LaborMarket, LaborOutcome};
pub use order_book::{MatchOutcome, OrderBook};
pub use pricing::PriceBook;

/// Totals that open orders hold in reserve, per agent.
///
/// Built by walking the books; compared against the ledger's reserved
/// balances when restoring a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservations {
    /// Goods reserved by open offers.
    pub goods: BTreeMap<AgentId, BTreeMap<GoodName, u64>>,
    /// Currency reserved by open requests and labor demands.
    pub funds: BTreeMap<AgentId, Decimal>,
}

impl Reservations {
    /// Add `quantity` reserved units of `good` for `agent`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ArithmeticOverflow`] on overflow.
    pub fn add_goods(
        &mut self,
        agent: &AgentId,
        good: &GoodName,
        quantity: u32,
    ) -> Result<(), MarketError> {
        let entry = self
            .goods
            .entry(agent.clone())
            .or_default()
            .entry(good.clone())
            .or_insert(0);
        *entry = entry
            .checked_add(u64::from(quantity))
            .ok_or_else(|| error::overflow("reserved goods total"))?;
        Ok(())
    }

    /// Add `amount` reserved currency for `agent`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ArithmeticOverflow`] on overflow.
    pub fn add_funds(&mut self, agent: &AgentId, amount: Decimal) -> Result<(), MarketError> {
        let entry = self.funds.entry(agent.clone()).or_insert(Decimal::ZERO);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| error::overflow("reserved funds total"))?;
        Ok(())
    }

    /// Reserved units of `good` held for `agent`.
    pub fn goods_for(&self, agent: &AgentId, good: &GoodName) -> u64 {
        self.goods
            .get(agent)
            .and_then(|goods| goods.get(good))
            .copied()
            .unwrap_or(0)
    }

    /// Reserved currency held for `agent`.
    pub fn funds_for(&self, agent: &AgentId) -> Decimal {
        self.funds.get(agent).copied().unwrap_or(Decimal::ZERO)
    }
}
