//! Intent validation and application.
//!
//! Each [`ActionIntent`] is checked against the current state and then
//! applied through the ledger or one of the books. A rejected intent
//! leaves the state untouched and is reported with a [`RejectionReason`];
//! it never aborts the cycle.
//!
//! Intents are applied in a fixed order by kind (see [`application_rank`]):
//! cancellations, labor orders, direct hires, then (after labor clearing)
//! production, consumption, sell offers, buy requests, direct buy-accepts,
//! and direct sell-accepts. Submission order is kept within a kind.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use microtrade_ledger::LedgerError;
use microtrade_market::{ClearingPolicy, LaborOutcome, MarketError, MatchOutcome};
use microtrade_types::{
    ActionIntent, AgentId, GoodName, IntentKind, IntentParameters, LaborHire, OrderUpdate,
    RejectionReason, Transaction,
};

use crate::config::EconomyConfig;
use crate::state::EconomyState;

/// Rank at which labor clearing runs, between direct hires and production.
pub const LABOR_CLEARING_RANK: u8 = 3;

/// Errors that reject a single intent.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    /// The acting agent does not exist.
    #[error("unknown agent: {agent}")]
    UnknownAgent {
        /// The unknown agent.
        agent: AgentId,
    },

    /// The acting agent's health reached zero.
    #[error("agent {agent} is inactive")]
    InactiveAgent {
        /// The inactive agent.
        agent: AgentId,
    },

    /// The good has never been seeded or traded.
    #[error("unknown good: {good}")]
    UnknownGood {
        /// The unknown good.
        good: GoodName,
    },

    /// The agent's production capacity for the good is used up.
    #[error("agent {agent} can produce {available} more {good} this cycle, asked for {requested}")]
    ProductionCapacity {
        /// The producing agent.
        agent: AgentId,
        /// The good.
        good: GoodName,
        /// Units requested.
        requested: u32,
        /// Units still producible this cycle.
        available: u32,
    },

    /// The parameters are malformed.
    #[error("invalid intent: {reason}")]
    Invalid {
        /// What is wrong with the intent.
        reason: String,
    },

    /// A market operation rejected the intent.
    #[error("{source}")]
    Market {
        /// The underlying market error.
        #[from]
        source: MarketError,
    },

    /// A ledger operation rejected the intent.
    #[error("{source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },

    /// Arithmetic overflow while tracking cycle activity.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Which computation overflowed.
        context: String,
    },
}

impl IntentError {
    /// Map this error to the rejection reason reported for the intent.
    pub const fn rejection_reason(&self) -> RejectionReason {
        match self {
            Self::UnknownAgent { .. } => RejectionReason::UnknownAgent,
            Self::InactiveAgent { .. } => RejectionReason::InactiveAgent,
            Self::UnknownGood { .. } => RejectionReason::UnknownGood,
            Self::ProductionCapacity { .. } => RejectionReason::CapacityExceeded,
            Self::Market { source } => source.rejection_reason(),
            Self::Ledger { source } => source.rejection_reason(),
            Self::Invalid { .. } | Self::ArithmeticOverflow { .. } => {
                RejectionReason::InvalidIntent
            }
        }
    }
}

/// Position of an intent kind in the fixed application order.
pub const fn application_rank(kind: IntentKind) -> u8 {
    match kind {
        IntentKind::CancelOffer | IntentKind::CancelRequest => 0,
        IntentKind::SubmitLaborOffer | IntentKind::SubmitLaborDemand => 1,
        IntentKind::HireAccept => 2,
        IntentKind::Produce => 4,
        IntentKind::Consume => 5,
        IntentKind::SubmitOffer => 6,
        IntentKind::SubmitRequest => 7,
        IntentKind::BuyAccept => 8,
        IntentKind::SellAccept => 9,
    }
}

/// Read-only settings an intent is applied under.
#[derive(Debug, Clone, Copy)]
pub struct IntentContext<'a> {
    /// Economy configuration (roles, labor boost).
    pub config: &'a EconomyConfig,
    /// Clearing and fee policy for direct buys.
    pub policy: &'a ClearingPolicy,
    /// The cycle being processed.
    pub cycle: u64,
}

/// Everything that happened during one cycle, accumulated across phases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleActivity {
    /// Transactions committed, in id order.
    pub transactions: Vec<Transaction>,
    /// Labor hires made.
    pub hires: Vec<LaborHire>,
    /// Order status changes.
    pub order_updates: Vec<OrderUpdate>,
    /// Units produced per good.
    pub produced: BTreeMap<GoodName, u64>,
    /// Units consumed per good.
    pub consumed: BTreeMap<GoodName, u64>,
    /// Agents that consumed at least once.
    pub consumers: BTreeSet<AgentId>,
    /// Units produced per agent and good, for the capacity check.
    pub(crate) produced_by: BTreeMap<(AgentId, GoodName), u32>,
}

impl CycleActivity {
    /// Units of `good` that `agent` has produced this cycle.
    pub fn produced_by(&self, agent: &AgentId, good: &GoodName) -> u32 {
        self.produced_by
            .get(&(agent.clone(), good.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Fold a goods matching or direct-buy outcome in.
    pub fn absorb_match(&mut self, outcome: MatchOutcome) {
        self.transactions.extend(outcome.transactions);
        self.order_updates.extend(outcome.updates);
    }

    /// Fold a labor clearing outcome in.
    pub fn absorb_labor(&mut self, outcome: LaborOutcome) {
        self.transactions.extend(outcome.transactions);
        self.hires.extend(outcome.hires);
        self.order_updates.extend(outcome.updates);
    }

    fn record_production(
        &mut self,
        agent: &AgentId,
        good: &GoodName,
        quantity: u32,
    ) -> Result<(), IntentError> {
        let per_agent = self
            .produced_by
            .entry((agent.clone(), good.clone()))
            .or_insert(0);
        *per_agent = per_agent
            .checked_add(quantity)
            .ok_or_else(|| overflow("per-agent production"))?;
        add_total(&mut self.produced, good, quantity, "production total")
    }

    fn record_consumption(
        &mut self,
        agent: &AgentId,
        good: &GoodName,
        quantity: u32,
    ) -> Result<(), IntentError> {
        self.consumers.insert(agent.clone());
        add_total(&mut self.consumed, good, quantity, "consumption total")
    }
}

fn add_total(
    totals: &mut BTreeMap<GoodName, u64>,
    good: &GoodName,
    quantity: u32,
    context: &str,
) -> Result<(), IntentError> {
    let entry = totals.entry(good.clone()).or_insert(0);
    *entry = entry
        .checked_add(u64::from(quantity))
        .ok_or_else(|| overflow(context))?;
    Ok(())
}

fn overflow(context: &str) -> IntentError {
    IntentError::ArithmeticOverflow {
        context: context.to_owned(),
    }
}

/// Validate and apply one intent.
///
/// # Errors
///
/// Returns an [`IntentError`] if the intent is rejected. State is left
/// unchanged in that case.
pub fn apply_intent(
    state: &mut EconomyState,
    ctx: &IntentContext<'_>,
    activity: &mut CycleActivity,
    intent: &ActionIntent,
) -> Result<(), IntentError> {
    let agent = &intent.agent_id;
    let account = state
        .ledger
        .agent(agent)
        .ok_or_else(|| IntentError::UnknownAgent {
            agent: agent.clone(),
        })?;
    if !account.active {
        return Err(IntentError::InactiveAgent {
            agent: agent.clone(),
        });
    }

    let cycle = ctx.cycle;
    match &intent.parameters {
        IntentParameters::Produce { good, quantity } => {
            produce(state, ctx, activity, agent, good, *quantity)?;
        }
        IntentParameters::Consume { good, quantity } => {
            require_known_good(state, good)?;
            require_positive(*quantity, "consume quantity")?;
            state.ledger.debit_goods(agent, good, *quantity)?;
            activity.record_consumption(agent, good, *quantity)?;
        }
        IntentParameters::SubmitOffer {
            good,
            quantity,
            price,
        } => {
            state
                .order_book
                .submit_offer(&mut state.ledger, cycle, agent, good, *quantity, *price)?;
            state.prices.ensure_good(good, *price)?;
        }
        IntentParameters::SubmitRequest {
            good,
            quantity,
            max_price,
        } => {
            state
                .order_book
                .submit_request(&mut state.ledger, cycle, agent, good, *quantity, *max_price)?;
            state.prices.ensure_good(good, *max_price)?;
        }
        IntentParameters::BuyAccept { offer_id, quantity } => {
            let outcome = state.order_book.accept_offer(
                &mut state.ledger,
                ctx.policy,
                cycle,
                agent,
                *offer_id,
                *quantity,
            )?;
            activity.absorb_match(outcome);
        }
        IntentParameters::SellAccept {
            request_id,
            quantity,
        } => {
            let outcome = state.order_book.accept_request(
                &mut state.ledger,
                ctx.policy,
                cycle,
                agent,
                *request_id,
                *quantity,
            )?;
            activity.absorb_match(outcome);
        }
        IntentParameters::SubmitLaborOffer { hours, wage } => {
            state
                .labor
                .submit_labor_offer(&state.ledger, cycle, agent, *hours, *wage)?;
        }
        IntentParameters::SubmitLaborDemand { hours, max_wage } => {
            state
                .labor
                .submit_labor_demand(&mut state.ledger, cycle, agent, *hours, *max_wage)?;
        }
        IntentParameters::HireAccept {
            labor_offer_id,
            hours,
        } => {
            let outcome =
                state
                    .labor
                    .accept_offer(&mut state.ledger, cycle, agent, *labor_offer_id, *hours)?;
            activity.absorb_labor(outcome);
        }
        IntentParameters::CancelOffer { offer_id } => {
            let update = state
                .order_book
                .cancel_offer(&mut state.ledger, agent, *offer_id)?;
            activity.order_updates.push(update);
        }
        IntentParameters::CancelRequest { request_id } => {
            let update = state
                .order_book
                .cancel_request(&mut state.ledger, agent, *request_id)?;
            activity.order_updates.push(update);
        }
    }

    debug!(cycle, agent = %agent, kind = ?intent.kind(), "Intent applied");
    Ok(())
}

/// Units of `good` that `agent` may still produce this cycle.
///
/// Capacity is the role's base production for the good plus one unit per
/// `hours_per_extra_unit` hours hired this cycle. Roles without base
/// production for a good cannot produce it at all.
pub fn production_available(
    state: &EconomyState,
    config: &EconomyConfig,
    activity: &CycleActivity,
    agent: &AgentId,
    good: &GoodName,
) -> u32 {
    let Some(account) = state.ledger.agent(agent) else {
        return 0;
    };
    let Some(base) = config
        .role(account.role.as_str())
        .and_then(|role| role.production.get(good.as_str()).copied())
    else {
        return 0;
    };
    let hired = state.labor.hired_hours_for(agent);
    let boost = hired
        .checked_div(config.labor.hours_per_extra_unit)
        .unwrap_or(0);
    base.saturating_add(boost)
        .saturating_sub(activity.produced_by(agent, good))
}

fn produce(
    state: &mut EconomyState,
    ctx: &IntentContext<'_>,
    activity: &mut CycleActivity,
    agent: &AgentId,
    good: &GoodName,
    quantity: u32,
) -> Result<(), IntentError> {
    require_known_good(state, good)?;
    require_positive(quantity, "produce quantity")?;
    let available = production_available(state, ctx.config, activity, agent, good);
    if quantity > available {
        return Err(IntentError::ProductionCapacity {
            agent: agent.clone(),
            good: good.clone(),
            requested: quantity,
            available,
        });
    }
    state.ledger.credit_goods(agent, good, quantity)?;
    activity.record_production(agent, good, quantity)
}

fn require_known_good(state: &EconomyState, good: &GoodName) -> Result<(), IntentError> {
    if state.prices.contains(good) {
        Ok(())
    } else {
        Err(IntentError::UnknownGood { good: good.clone() })
    }
}

fn require_positive(quantity: u32, context: &str) -> Result<(), IntentError> {
    if quantity == 0 {
        return Err(IntentError::Invalid {
            reason: format!("{context} must be positive"),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use microtrade_types::{ClearingRule, LaborOfferId, OfferId, RequestId};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    fn id(name: &str) -> AgentId {
        AgentId::from(name)
    }

    fn food() -> GoodName {
        GoodName::from("food")
    }

    fn setup() -> (EconomyState, EconomyConfig, ClearingPolicy) {
        let config = EconomyConfig::default();
        let state = EconomyState::from_config(&config).unwrap();
        let policy =
            ClearingPolicy::new(ClearingRule::Midpoint, dec!(0.01), dec!(0.05), Some(id("market")))
                .unwrap();
        (state, config, policy)
    }

    fn apply(
        state: &mut EconomyState,
        config: &EconomyConfig,
        policy: &ClearingPolicy,
        activity: &mut CycleActivity,
        agent: &str,
        parameters: IntentParameters,
    ) -> Result<(), IntentError> {
        let ctx = IntentContext {
            config,
            policy,
            cycle: 1,
        };
        apply_intent(state, &ctx, activity, &ActionIntent::new(id(agent), parameters))
    }

    #[test]
    fn rank_orders_kinds() {
        let kinds = [
            IntentKind::SellAccept,
            IntentKind::BuyAccept,
            IntentKind::SubmitRequest,
            IntentKind::SubmitOffer,
            IntentKind::Consume,
            IntentKind::Produce,
            IntentKind::HireAccept,
            IntentKind::SubmitLaborDemand,
            IntentKind::CancelRequest,
        ];
        let ranks: Vec<u8> = kinds.iter().map(|k| application_rank(*k)).collect();
        assert!(ranks.windows(2).all(|w| matches!(w, [a, b] if a > b)));
        assert!(application_rank(IntentKind::SubmitLaborOffer) < LABOR_CLEARING_RANK);
        assert!(application_rank(IntentKind::HireAccept) < LABOR_CLEARING_RANK);
        assert!(application_rank(IntentKind::Produce) > LABOR_CLEARING_RANK);
    }

    #[test]
    fn producer_produces_within_base_capacity() {
        let (mut state, config, policy) = setup();
        let mut activity = CycleActivity::default();
        let produce = IntentParameters::Produce {
            good: food(),
            quantity: 1,
        };
        apply(&mut state, &config, &policy, &mut activity, "producer", produce.clone()).unwrap();
        assert_eq!(
            state.ledger.agent(&id("producer")).unwrap().goods_held(&food()),
            6
        );
        assert_eq!(activity.produced.get(&food()), Some(&1));

        let second = apply(&mut state, &config, &policy, &mut activity, "producer", produce);
        assert_eq!(
            second.err().map(|e| e.rejection_reason()),
            Some(RejectionReason::CapacityExceeded)
        );
    }

    #[test]
    fn non_producers_cannot_produce() {
        let (mut state, config, policy) = setup();
        let mut activity = CycleActivity::default();
        let result = apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "consumer",
            IntentParameters::Produce {
                good: food(),
                quantity: 1,
            },
        );
        assert!(matches!(
            result,
            Err(IntentError::ProductionCapacity { available: 0, .. })
        ));
    }

    #[test]
    fn hired_hours_raise_capacity() {
        let (mut state, config, policy) = setup();
        state
            .labor
            .submit_labor_offer(&state.ledger, 1, &id("worker"), 4, dec!(1.0))
            .unwrap();
        state
            .labor
            .submit_labor_demand(&mut state.ledger, 1, &id("producer"), 4, dec!(1.0))
            .unwrap();
        state.labor.clear(&mut state.ledger, &policy, 1).unwrap();

        let activity = CycleActivity::default();
        // Base 1 plus 4 hours / 2 hours per unit.
        assert_eq!(
            production_available(&state, &config, &activity, &id("producer"), &food()),
            3
        );
    }

    #[test]
    fn consume_tracks_consumers() {
        let (mut state, config, policy) = setup();
        let mut activity = CycleActivity::default();
        apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "consumer",
            IntentParameters::Consume {
                good: food(),
                quantity: 1,
            },
        )
        .unwrap();
        assert!(activity.consumers.contains(&id("consumer")));
        assert_eq!(activity.consumed.get(&food()), Some(&1));
        assert_eq!(
            state.ledger.agent(&id("consumer")).unwrap().goods_held(&food()),
            1
        );

        let result = apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "consumer",
            IntentParameters::Consume {
                good: food(),
                quantity: 5,
            },
        );
        assert_eq!(
            result.err().map(|e| e.rejection_reason()),
            Some(RejectionReason::InsufficientGoods)
        );
    }

    #[test]
    fn unknown_and_inactive_agents_are_rejected() {
        let (mut state, config, policy) = setup();
        let mut activity = CycleActivity::default();
        let consume = IntentParameters::Consume {
            good: food(),
            quantity: 1,
        };
        let result = apply(&mut state, &config, &policy, &mut activity, "ghost", consume.clone());
        assert_eq!(
            result.err().map(|e| e.rejection_reason()),
            Some(RejectionReason::UnknownAgent)
        );

        state.ledger.deactivate(&id("consumer")).unwrap();
        let result = apply(&mut state, &config, &policy, &mut activity, "consumer", consume);
        assert_eq!(
            result.err().map(|e| e.rejection_reason()),
            Some(RejectionReason::InactiveAgent)
        );
    }

    #[test]
    fn unknown_goods_are_rejected_for_production_and_consumption() {
        let (mut state, config, policy) = setup();
        let mut activity = CycleActivity::default();
        let result = apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "producer",
            IntentParameters::Consume {
                good: GoodName::from("gold"),
                quantity: 1,
            },
        );
        assert_eq!(
            result.err().map(|e| e.rejection_reason()),
            Some(RejectionReason::UnknownGood)
        );
    }

    #[test]
    fn first_request_registers_a_good() {
        let (mut state, config, policy) = setup();
        let mut activity = CycleActivity::default();
        let wood = GoodName::from("wood");
        apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "trader",
            IntentParameters::SubmitRequest {
                good: wood.clone(),
                quantity: 1,
                max_price: dec!(3.5),
            },
        )
        .unwrap();
        assert_eq!(state.prices.price(&wood), Some(dec!(3.5)));
    }

    #[test]
    fn rejected_offer_registers_nothing() {
        let (mut state, config, policy) = setup();
        let mut activity = CycleActivity::default();
        let wood = GoodName::from("wood");
        let result = apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "trader",
            IntentParameters::SubmitOffer {
                good: wood.clone(),
                quantity: 1,
                price: dec!(3.5),
            },
        );
        assert_eq!(
            result.err().map(|e| e.rejection_reason()),
            Some(RejectionReason::InsufficientGoods)
        );
        assert!(!state.prices.contains(&wood));
    }

    #[test]
    fn buy_accept_and_cancel_flow_through_the_book() {
        let (mut state, config, policy) = setup();
        let mut activity = CycleActivity::default();
        apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "producer",
            IntentParameters::SubmitOffer {
                good: food(),
                quantity: 3,
                price: dec!(2.0),
            },
        )
        .unwrap();
        apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "consumer",
            IntentParameters::BuyAccept {
                offer_id: OfferId::FIRST,
                quantity: 1,
            },
        )
        .unwrap();
        assert_eq!(activity.transactions.len(), 1);

        let stolen = apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "trader",
            IntentParameters::CancelOffer {
                offer_id: OfferId::FIRST,
            },
        );
        assert_eq!(
            stolen.err().map(|e| e.rejection_reason()),
            Some(RejectionReason::NotOrderOwner)
        );

        apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "producer",
            IntentParameters::CancelOffer {
                offer_id: OfferId::FIRST,
            },
        )
        .unwrap();
        let producer = state.ledger.agent(&id("producer")).unwrap();
        assert_eq!(producer.goods_reserved(&food()), 0);
        assert_eq!(producer.goods_held(&food()), 4);
        assert_eq!(producer.currency, dec!(11.9));
        assert_eq!(
            state.ledger.agent(&id("market")).unwrap().currency,
            dec!(6.1)
        );
        assert_eq!(
            state.ledger.agent(&id("consumer")).unwrap().currency,
            Decimal::from(6)
        );
    }

    #[test]
    fn zero_quantities_are_invalid() {
        let (mut state, config, policy) = setup();
        let mut activity = CycleActivity::default();
        let result = apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "producer",
            IntentParameters::Produce {
                good: food(),
                quantity: 0,
            },
        );
        assert_eq!(
            result.err().map(|e| e.rejection_reason()),
            Some(RejectionReason::InvalidIntent)
        );
    }

    #[test]
    fn sell_accept_fills_a_request_at_its_max_price() {
        let (mut state, config, policy) = setup();
        let mut activity = CycleActivity::default();
        apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "consumer",
            IntentParameters::SubmitRequest {
                good: food(),
                quantity: 2,
                max_price: dec!(3.0),
            },
        )
        .unwrap();
        apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "producer",
            IntentParameters::SellAccept {
                request_id: RequestId::FIRST,
                quantity: 2,
            },
        )
        .unwrap();

        let tx = activity.transactions.first().unwrap();
        assert_eq!(tx.seller, id("producer"));
        assert_eq!(tx.unit_price, dec!(3.0));
        assert_eq!(tx.fee, dec!(0.3));
        assert!(state.order_book.requests().is_empty());
        let consumer = state.ledger.agent(&id("consumer")).unwrap();
        assert_eq!(consumer.currency, Decimal::from(2));
        assert_eq!(consumer.reserved_currency, Decimal::ZERO);
        assert_eq!(consumer.goods_held(&food()), 4);
    }

    #[test]
    fn hire_accept_raises_capacity_like_a_cleared_hire() {
        let (mut state, config, policy) = setup();
        let mut activity = CycleActivity::default();
        apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "worker",
            IntentParameters::SubmitLaborOffer {
                hours: 4,
                wage: dec!(1.0),
            },
        )
        .unwrap();
        apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "producer",
            IntentParameters::HireAccept {
                labor_offer_id: LaborOfferId::FIRST,
                hours: 4,
            },
        )
        .unwrap();

        assert_eq!(activity.hires.len(), 1);
        assert_eq!(activity.transactions.len(), 1);
        assert!(state.labor.offers().is_empty());
        assert_eq!(
            production_available(&state, &config, &activity, &id("producer"), &food()),
            3
        );

        let repeat = apply(
            &mut state,
            &config,
            &policy,
            &mut activity,
            "producer",
            IntentParameters::HireAccept {
                labor_offer_id: LaborOfferId::FIRST,
                hours: 1,
            },
        );
        assert_eq!(
            repeat.err().map(|e| e.rejection_reason()),
            Some(RejectionReason::UnknownOrder)
        );
    }
}
