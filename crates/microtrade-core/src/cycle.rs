//! Cycle orchestrator: drives one economy cycle through a fixed phase order.
//!
//! Each cycle runs through these phases:
//!
//! 1. **Collecting intents** -- [`CycleOrchestrator::open_cycle`] advances
//!    the clock, forgets the previous cycle's labor hires, and expires aged
//!    orders. Intents are accepted only in this phase.
//!
//! 2. **Validating** -- intents are applied one by one in the fixed kind
//!    order of [`application_rank`], labor clearing running between labor
//!    orders and production. A rejected intent is recorded and skipped.
//!
//! 3. **Matching** -- every good's offers and requests are matched.
//!
//! 4. **Pricing** -- reference prices and the reference wage absorb the
//!    cycle's transactions.
//!
//! 5. **Health tick** -- decay or gain per agent; agents reaching zero
//!    become inactive.
//!
//! 6. **Committed** -- the conservation audit runs and a [`CycleReport`] is
//!    returned.
//!
//! Given the same starting state and the same intents, a cycle always
//! produces the same report.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use microtrade_ledger::conservation::{balance_violations, verify_conservation};
use microtrade_ledger::{ConservationResult, EconomyTotals, LedgerError};
use microtrade_market::{ClearingPolicy, MarketError};
use microtrade_types::{
    ActionIntent, AuditVerdict, CycleReport, IntentOutcome, IntentStatus, OrderUpdate,
};

use crate::clock::ClockError;
use crate::config::{ConfigError, EconomyConfig};
use crate::health::apply_health_tick;
use crate::intents::{
    CycleActivity, IntentContext, LABOR_CLEARING_RANK, apply_intent, application_rank,
};
use crate::persistence::{self, EconomySnapshot, PersistenceError};
use crate::state::EconomyState;

/// Errors that abort a cycle.
///
/// Intent-level failures never surface here; they are reported per intent
/// inside the [`CycleReport`].
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// The cycle counter overflowed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The configuration is invalid.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// A ledger operation outside intent application failed.
    #[error("ledger error: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },

    /// A market operation outside intent application failed.
    #[error("market error: {source}")]
    Market {
        /// The underlying market error.
        #[from]
        source: MarketError,
    },

    /// Restoring a snapshot failed.
    #[error("persistence error: {source}")]
    Persistence {
        /// The underlying persistence error.
        #[from]
        source: PersistenceError,
    },

    /// An intent arrived outside the collecting phase.
    #[error("intent window closed for cycle {cycle} (phase {phase:?})")]
    IntentWindowClosed {
        /// The current cycle.
        cycle: u64,
        /// The phase the orchestrator is in.
        phase: CyclePhase,
    },

    /// An operation was called in the wrong phase.
    #[error("expected phase {expected:?}, found {found:?}")]
    PhaseViolation {
        /// Phase the operation requires.
        expected: CyclePhase,
        /// Phase the orchestrator is in.
        found: CyclePhase,
    },

    /// Arithmetic overflow while summarizing the cycle.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Which computation overflowed.
        context: String,
    },
}

/// Where the orchestrator is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// Accepting intents.
    CollectingIntents,
    /// Applying intents.
    Validating,
    /// Matching offers against requests.
    Matching,
    /// Updating reference prices.
    Pricing,
    /// Applying health decay and gain.
    HealthTick,
    /// The cycle is complete; the next one may open.
    Committed,
}

/// Owns the economy state and runs cycles over it.
#[derive(Debug)]
pub struct CycleOrchestrator {
    /// The economy state.
    state: EconomyState,
    /// Economy configuration.
    config: EconomyConfig,
    /// Clearing policy derived from the config and facilitator.
    policy: ClearingPolicy,
    /// Current phase.
    phase: CyclePhase,
    /// Intents collected for the open cycle, in submission order.
    pending: Vec<ActionIntent>,
    /// Order expirations performed when the cycle opened.
    opening_updates: Vec<OrderUpdate>,
}

impl CycleOrchestrator {
    /// Build the cycle-0 economy described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Config`] for an invalid configuration or a
    /// ledger/market error if seeding fails.
    pub fn new(config: EconomyConfig) -> Result<Self, CycleError> {
        let state = EconomyState::from_config(&config)?;
        Self::from_state(config, state)
    }

    /// Wrap an existing state, which must be at a committed cycle boundary.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Config`] or [`CycleError::Market`] if the
    /// market settings are invalid.
    pub fn from_state(config: EconomyConfig, state: EconomyState) -> Result<Self, CycleError> {
        config.validate()?;
        let policy = ClearingPolicy::new(
            config.market.clearing_rule,
            config.market.price_increment,
            config.market.fee_rate,
            state.facilitator.clone(),
        )?;
        Ok(Self {
            state,
            config,
            policy,
            phase: CyclePhase::Committed,
            pending: Vec::new(),
            opening_updates: Vec::new(),
        })
    }

    /// Resume from a snapshot after verifying its integrity.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Persistence`] if the snapshot is corrupt.
    pub fn resume(config: EconomyConfig, snapshot: EconomySnapshot) -> Result<Self, CycleError> {
        let state = persistence::restore(snapshot)?;
        info!(cycle = state.cycle(), "Economy resumed from snapshot");
        Self::from_state(config, state)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The economy state.
    pub const fn state(&self) -> &EconomyState {
        &self.state
    }

    /// The economy configuration.
    pub const fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// The clearing policy in force.
    pub const fn policy(&self) -> &ClearingPolicy {
        &self.policy
    }

    /// The current phase.
    pub const fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// The current cycle number.
    pub const fn cycle(&self) -> u64 {
        self.state.cycle()
    }

    /// Number of intents collected for the open cycle.
    pub const fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Active agents subject to the health tick.
    pub fn population(&self) -> usize {
        self.state
            .active_count(|agent| !self.config.is_health_exempt(agent.role.as_str()))
    }

    /// Snapshot the current state.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::PhaseViolation`] unless the last cycle has
    /// committed. A snapshot of a half-processed cycle would resume past it.
    pub fn snapshot(&self) -> Result<EconomySnapshot, CycleError> {
        self.require_phase(CyclePhase::Committed)?;
        Ok(persistence::snapshot(&self.state))
    }

    /// A report describing the current state with no activity.
    pub fn baseline_report(&self) -> CycleReport {
        CycleReport {
            cycle: self.state.cycle(),
            transactions: Vec::new(),
            hires: Vec::new(),
            order_updates: Vec::new(),
            agents: self.state.agent_snapshots(),
            prices: self.state.prices.prices(),
            reference_wage: self.state.prices.reference_wage(),
            intent_outcomes: Vec::new(),
            produced: BTreeMap::new(),
            consumed: BTreeMap::new(),
            newly_inactive: Vec::new(),
            fees_collected: Decimal::ZERO,
            audit: AuditVerdict::Balanced,
        }
    }

    // -----------------------------------------------------------------------
    // Cycle lifecycle
    // -----------------------------------------------------------------------

    /// Open the next cycle and start collecting intents.
    ///
    /// Returns the new cycle number.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::PhaseViolation`] unless the previous cycle was
    /// committed, or an error if expiry fails.
    pub fn open_cycle(&mut self) -> Result<u64, CycleError> {
        self.require_phase(CyclePhase::Committed)?;
        let cycle = self.state.clock.advance()?;
        let hires_cleared = self.state.labor.begin_cycle();

        let window = self.config.market.order_expiry_cycles;
        let mut expired = self
            .state
            .order_book
            .expire(&mut self.state.ledger, cycle, window)?;
        expired.extend(self.state.labor.expire(&mut self.state.ledger, cycle, window)?);

        info!(cycle, expired = expired.len(), hires_cleared, "Cycle opened");
        self.opening_updates = expired;
        self.phase = CyclePhase::CollectingIntents;
        Ok(cycle)
    }

    /// Queue an intent for the open cycle. Returns its sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::IntentWindowClosed`] outside the collecting
    /// phase.
    pub fn submit(&mut self, intent: ActionIntent) -> Result<usize, CycleError> {
        if self.phase != CyclePhase::CollectingIntents {
            return Err(CycleError::IntentWindowClosed {
                cycle: self.state.cycle(),
                phase: self.phase,
            });
        }
        let sequence = self.pending.len();
        self.pending.push(intent);
        Ok(sequence)
    }

    /// Apply the collected intents, match, price, run the health tick, and
    /// commit the cycle.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::PhaseViolation`] if no cycle is open, or an
    /// error if a phase hits inconsistent state.
    pub fn close_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.require_phase(CyclePhase::CollectingIntents)?;
        let cycle = self.state.cycle();
        let before = EconomyTotals::measure(&self.state.ledger)?;

        let mut activity = CycleActivity {
            order_updates: std::mem::take(&mut self.opening_updates),
            ..CycleActivity::default()
        };

        // --- Validating ---
        self.phase = CyclePhase::Validating;
        let mut ordered: Vec<(usize, ActionIntent)> =
            std::mem::take(&mut self.pending).into_iter().enumerate().collect();
        ordered.sort_by_key(|(_, intent)| application_rank(intent.kind()));

        let ctx = IntentContext {
            config: &self.config,
            policy: &self.policy,
            cycle,
        };
        let mut outcomes = Vec::with_capacity(ordered.len());
        let mut labor_cleared = false;
        for (sequence, intent) in ordered {
            if !labor_cleared && application_rank(intent.kind()) > LABOR_CLEARING_RANK {
                let labor = self
                    .state
                    .labor
                    .clear(&mut self.state.ledger, &self.policy, cycle)?;
                activity.absorb_labor(labor);
                labor_cleared = true;
            }
            let status = match apply_intent(&mut self.state, &ctx, &mut activity, &intent) {
                Ok(()) => IntentStatus::Applied,
                Err(e) => {
                    debug!(
                        cycle,
                        sequence,
                        agent = %intent.agent_id,
                        kind = ?intent.kind(),
                        error = %e,
                        "Intent rejected"
                    );
                    IntentStatus::Rejected {
                        reason: e.rejection_reason(),
                        message: e.to_string(),
                    }
                }
            };
            outcomes.push(IntentOutcome {
                sequence,
                agent_id: intent.agent_id,
                kind: intent.parameters.kind(),
                status,
            });
        }
        if !labor_cleared {
            let labor = self
                .state
                .labor
                .clear(&mut self.state.ledger, &self.policy, cycle)?;
            activity.absorb_labor(labor);
        }
        outcomes.sort_by_key(|o| o.sequence);

        // --- Matching ---
        self.phase = CyclePhase::Matching;
        let matched = self
            .state
            .order_book
            .match_all(&mut self.state.ledger, &self.policy, cycle)?;
        activity.absorb_match(matched);

        // --- Pricing ---
        self.phase = CyclePhase::Pricing;
        self.state.prices.update_from_transactions(
            &activity.transactions,
            self.config.market.ema_alpha,
            self.config.market.price_increment,
        )?;

        // --- Health tick ---
        self.phase = CyclePhase::HealthTick;
        let health = apply_health_tick(
            &mut self.state,
            &self.config.health,
            &activity.consumers,
            cycle,
        )?;
        activity.order_updates.extend(health.cancelled);

        // --- Audit and commit ---
        let after = EconomyTotals::measure(&self.state.ledger)?;
        let audit = self.audit(cycle, &before, &after, &activity);
        let fees_collected = activity
            .transactions
            .iter()
            .try_fold(Decimal::ZERO, |acc, tx| acc.checked_add(tx.fee))
            .ok_or_else(|| CycleError::ArithmeticOverflow {
                context: String::from("fees collected"),
            })?;

        let report = CycleReport {
            cycle,
            transactions: activity.transactions,
            hires: activity.hires,
            order_updates: activity.order_updates,
            agents: self.state.agent_snapshots(),
            prices: self.state.prices.prices(),
            reference_wage: self.state.prices.reference_wage(),
            intent_outcomes: outcomes,
            produced: activity.produced,
            consumed: activity.consumed,
            newly_inactive: health.newly_inactive,
            fees_collected,
            audit,
        };
        self.phase = CyclePhase::Committed;

        info!(
            cycle,
            transactions = report.transactions.len(),
            hires = report.hires.len(),
            rejected = report.rejected_count(),
            active_agents = report.active_agents(),
            "Cycle committed"
        );
        Ok(report)
    }

    /// Open a cycle, submit `intents`, and close it.
    ///
    /// # Errors
    ///
    /// Returns any error from [`open_cycle`](Self::open_cycle) or
    /// [`close_cycle`](Self::close_cycle).
    pub fn run_cycle(
        &mut self,
        intents: impl IntoIterator<Item = ActionIntent>,
    ) -> Result<CycleReport, CycleError> {
        self.open_cycle()?;
        for intent in intents {
            self.submit(intent)?;
        }
        self.close_cycle()
    }

    fn require_phase(&self, expected: CyclePhase) -> Result<(), CycleError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(CycleError::PhaseViolation {
                expected,
                found: self.phase,
            })
        }
    }

    fn audit(
        &self,
        cycle: u64,
        before: &EconomyTotals,
        after: &EconomyTotals,
        activity: &CycleActivity,
    ) -> AuditVerdict {
        let conservation =
            verify_conservation(cycle, before, after, &activity.produced, &activity.consumed);
        let violations = balance_violations(&self.state.ledger);

        let mut problems = Vec::new();
        if let ConservationResult::Anomaly(anomaly) = &conservation {
            error!(cycle, anomaly = %anomaly, "Conservation anomaly");
            problems.push(anomaly.message.clone());
        }
        for violation in violations {
            error!(cycle, violation = %violation, "Balance invariant violated");
            problems.push(violation);
        }

        if problems.is_empty() {
            conservation.verdict()
        } else {
            AuditVerdict::Anomaly {
                message: problems.join("; "),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use microtrade_types::{
        AgentId, GoodName, IntentKind, IntentParameters, LaborOfferId, OrderKind, OrderStatus,
        RejectionReason, RequestId, TransactionKind,
    };
    use rust_decimal_macros::dec;

    use super::*;

    fn id(name: &str) -> AgentId {
        AgentId::from(name)
    }

    fn food() -> GoodName {
        GoodName::from("food")
    }

    fn intent(agent: &str, parameters: IntentParameters) -> ActionIntent {
        ActionIntent::new(id(agent), parameters)
    }

    fn orchestrator() -> CycleOrchestrator {
        CycleOrchestrator::new(EconomyConfig::default()).unwrap()
    }

    fn consume(agent: &str) -> ActionIntent {
        intent(
            agent,
            IntentParameters::Consume {
                good: food(),
                quantity: 1,
            },
        )
    }

    #[test]
    fn reference_scenario_clears_three_at_midpoint() {
        let mut orch = orchestrator();
        let report = orch
            .run_cycle([
                intent(
                    "producer",
                    IntentParameters::SubmitOffer {
                        good: food(),
                        quantity: 5,
                        price: dec!(2.0),
                    },
                ),
                intent(
                    "consumer",
                    IntentParameters::SubmitRequest {
                        good: food(),
                        quantity: 3,
                        max_price: dec!(2.5),
                    },
                ),
            ])
            .unwrap();

        assert_eq!(report.cycle, 1);
        assert_eq!(report.transactions.len(), 1);
        let tx = report.transactions.first().unwrap();
        assert_eq!(tx.kind, TransactionKind::Matched);
        assert_eq!(tx.quantity, 3);
        assert_eq!(tx.unit_price, dec!(2.25));
        assert_eq!(tx.fee, dec!(0.3375));
        assert_eq!(report.fees_collected, dec!(0.3375));

        let consumer = report.agent(&id("consumer")).unwrap();
        assert_eq!(consumer.currency, dec!(1.25));
        assert_eq!(consumer.goods.get(&food()), Some(&5));
        assert_eq!(consumer.reserved_currency, Decimal::ZERO);

        let producer = report.agent(&id("producer")).unwrap();
        assert_eq!(producer.currency, dec!(16.4125));
        assert_eq!(producer.goods.get(&food()), Some(&2));
        assert_eq!(producer.reserved_goods.get(&food()), Some(&2));

        // 0.3 * 2.25 + 0.7 * 2.0 = 2.075 -> 2.08
        assert_eq!(report.prices.get(&food()), Some(&dec!(2.08)));
        assert_eq!(report.audit, AuditVerdict::Balanced);
    }

    #[test]
    fn intents_outside_window_are_refused() {
        let mut orch = orchestrator();
        let result = orch.submit(consume("consumer"));
        assert!(matches!(
            result,
            Err(CycleError::IntentWindowClosed { cycle: 0, .. })
        ));
        assert!(matches!(
            orch.close_cycle(),
            Err(CycleError::PhaseViolation { .. })
        ));

        orch.open_cycle().unwrap();
        assert!(matches!(
            orch.open_cycle(),
            Err(CycleError::PhaseViolation { .. })
        ));
        assert_eq!(orch.submit(consume("consumer")).unwrap(), 0);
        orch.close_cycle().unwrap();
        assert!(orch.submit(consume("consumer")).is_err());
    }

    #[test]
    fn application_order_is_by_kind_not_submission() {
        let mut orch = orchestrator();
        // Submitted before the production that makes it affordable.
        let report = orch
            .run_cycle([
                intent(
                    "producer",
                    IntentParameters::SubmitOffer {
                        good: food(),
                        quantity: 6,
                        price: dec!(2.0),
                    },
                ),
                intent(
                    "producer",
                    IntentParameters::Produce {
                        good: food(),
                        quantity: 1,
                    },
                ),
            ])
            .unwrap();

        assert!(report.intent_outcomes.iter().all(IntentOutcome::is_applied));
        let first = report.intent_outcomes.first().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.kind, IntentKind::SubmitOffer);
        assert_eq!(report.produced.get(&food()), Some(&1));
    }

    #[test]
    fn labor_clears_before_production() {
        let mut orch = orchestrator();
        let report = orch
            .run_cycle([
                intent(
                    "producer",
                    IntentParameters::Produce {
                        good: food(),
                        quantity: 3,
                    },
                ),
                intent(
                    "worker",
                    IntentParameters::SubmitLaborOffer {
                        hours: 4,
                        wage: dec!(1.0),
                    },
                ),
                intent(
                    "producer",
                    IntentParameters::SubmitLaborDemand {
                        hours: 4,
                        max_wage: dec!(1.5),
                    },
                ),
            ])
            .unwrap();

        assert_eq!(report.hires.len(), 1);
        assert!(report.intent_outcomes.iter().all(IntentOutcome::is_applied));
        assert_eq!(report.produced.get(&food()), Some(&3));
        assert_eq!(report.reference_wage, Some(dec!(1.25)));

        // Hires are scoped to the cycle.
        let next = orch
            .run_cycle([intent(
                "producer",
                IntentParameters::Produce {
                    good: food(),
                    quantity: 2,
                },
            )])
            .unwrap();
        assert_eq!(
            next.intent_outcomes.first().and_then(IntentOutcome::rejection),
            Some(RejectionReason::CapacityExceeded)
        );
    }

    #[test]
    fn direct_accepts_run_in_their_slots() {
        let mut orch = orchestrator();
        let report = orch
            .run_cycle([
                intent(
                    "trader",
                    IntentParameters::SellAccept {
                        request_id: RequestId::FIRST,
                        quantity: 1,
                    },
                ),
                intent(
                    "producer",
                    IntentParameters::Produce {
                        good: food(),
                        quantity: 3,
                    },
                ),
                intent(
                    "consumer",
                    IntentParameters::SubmitRequest {
                        good: food(),
                        quantity: 2,
                        max_price: dec!(2.5),
                    },
                ),
                intent(
                    "producer",
                    IntentParameters::HireAccept {
                        labor_offer_id: LaborOfferId::FIRST,
                        hours: 4,
                    },
                ),
                intent(
                    "worker",
                    IntentParameters::SubmitLaborOffer {
                        hours: 4,
                        wage: dec!(1.0),
                    },
                ),
            ])
            .unwrap();

        assert!(report.intent_outcomes.iter().all(IntentOutcome::is_applied));
        assert_eq!(report.hires.len(), 1);
        assert_eq!(report.produced.get(&food()), Some(&3));
        let kinds: Vec<TransactionKind> = report.transactions.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TransactionKind::Labor, TransactionKind::Accepted]);

        let sale = report.transactions.last().unwrap();
        assert_eq!(sale.seller, id("trader"));
        assert_eq!(sale.unit_price, dec!(2.5));
        let request = orch.state().order_book.request(RequestId::FIRST).unwrap();
        assert_eq!(request.remaining, 1);
        assert_eq!(report.audit, AuditVerdict::Balanced);
    }

    #[test]
    fn rejections_do_not_abort_the_cycle() {
        let mut orch = orchestrator();
        let report = orch
            .run_cycle([
                intent(
                    "ghost",
                    IntentParameters::Consume {
                        good: food(),
                        quantity: 1,
                    },
                ),
                intent(
                    "consumer",
                    IntentParameters::SubmitRequest {
                        good: food(),
                        quantity: 10,
                        max_price: dec!(2.0),
                    },
                ),
                consume("consumer"),
            ])
            .unwrap();

        assert_eq!(report.rejected_count(), 2);
        let reasons: Vec<Option<RejectionReason>> =
            report.intent_outcomes.iter().map(IntentOutcome::rejection).collect();
        assert_eq!(
            reasons,
            vec![
                Some(RejectionReason::UnknownAgent),
                Some(RejectionReason::InsufficientFunds),
                None
            ]
        );
        assert_eq!(report.consumed.get(&food()), Some(&1));
        assert_eq!(report.audit, AuditVerdict::Balanced);
    }

    #[test]
    fn health_follows_consumption() {
        let mut orch = orchestrator();
        let report = orch.run_cycle([consume("consumer")]).unwrap();
        assert_eq!(report.agent(&id("consumer")).unwrap().health, 100);
        assert_eq!(report.agent(&id("trader")).unwrap().health, 85);
        assert_eq!(report.agent(&id("market")).unwrap().health, 100);
    }

    #[test]
    fn starving_agents_become_inactive() {
        let mut orch = orchestrator();
        for _ in 0..6 {
            orch.run_cycle(Vec::new()).unwrap();
        }
        let last = orch.run_cycle(Vec::new()).unwrap();
        // 100 - 7 * 15 < 0
        assert_eq!(last.cycle, 7);
        assert_eq!(last.newly_inactive.len(), 4);
        assert_eq!(orch.population(), 0);
        assert_eq!(last.active_agents(), 1);

        let report = orch.run_cycle([consume("consumer")]).unwrap();
        assert_eq!(
            report.intent_outcomes.first().and_then(IntentOutcome::rejection),
            Some(RejectionReason::InactiveAgent)
        );
    }

    #[test]
    fn orders_expire_when_window_elapses() {
        let mut orch = orchestrator();
        orch.run_cycle([intent(
            "producer",
            IntentParameters::SubmitOffer {
                good: food(),
                quantity: 2,
                price: dec!(9.0),
            },
        )])
        .unwrap();
        let second = orch.run_cycle(Vec::new()).unwrap();
        assert!(second.order_updates.is_empty());
        let third = orch.run_cycle(Vec::new()).unwrap();
        assert!(third.order_updates.is_empty());

        // Created in cycle 1, window 3: expires as cycle 4 opens.
        let fourth = orch.run_cycle(Vec::new()).unwrap();
        let update = fourth.order_updates.first().unwrap();
        assert_eq!(update.kind, OrderKind::Offer);
        assert_eq!(update.status, OrderStatus::Expired);
        assert_eq!(
            fourth
                .agent(&id("producer"))
                .unwrap()
                .reserved_goods
                .get(&food()),
            None
        );
    }

    #[test]
    fn baseline_report_reflects_initial_state() {
        let orch = orchestrator();
        let report = orch.baseline_report();
        assert_eq!(report.cycle, 0);
        assert_eq!(report.agents.len(), 5);
        assert_eq!(report.prices.get(&food()), Some(&dec!(2.0)));
        assert!(report.transactions.is_empty());
    }

    #[test]
    fn resume_continues_transaction_ids() {
        let mut orch = orchestrator();
        let first = orch
            .run_cycle([
                intent(
                    "producer",
                    IntentParameters::SubmitOffer {
                        good: food(),
                        quantity: 4,
                        price: dec!(2.0),
                    },
                ),
                intent(
                    "consumer",
                    IntentParameters::SubmitRequest {
                        good: food(),
                        quantity: 1,
                        max_price: dec!(2.0),
                    },
                ),
            ])
            .unwrap();
        let last_id = first.transactions.last().unwrap().id;

        let snapshot = orch.snapshot().unwrap();
        let mut resumed =
            CycleOrchestrator::resume(EconomyConfig::default(), snapshot).unwrap();
        assert_eq!(resumed.state(), orch.state());

        let next = resumed
            .run_cycle([intent(
                "trader",
                IntentParameters::SubmitRequest {
                    good: food(),
                    quantity: 1,
                    max_price: dec!(2.0),
                },
            )])
            .unwrap();
        assert_eq!(next.cycle, 2);
        assert!(next.transactions.first().unwrap().id > last_id);
    }

    #[test]
    fn snapshot_is_refused_mid_cycle() {
        let mut orch = orchestrator();
        orch.open_cycle().unwrap();
        orch.submit(consume("consumer")).unwrap();

        let err = orch.snapshot().unwrap_err();
        assert!(matches!(
            err,
            CycleError::PhaseViolation {
                expected: CyclePhase::Committed,
                found: CyclePhase::CollectingIntents,
            }
        ));

        orch.close_cycle().unwrap();
        assert_eq!(orch.snapshot().unwrap().cycle(), 1);
    }
}
