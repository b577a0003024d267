//! Labor market: workers offer hours, employers demand them.
//!
//! Labor clears with the same price-time priority as goods, against the
//! single conceptual good `labor`. A hire pays the worker through the
//! ledger, records a [`LaborHire`], and raises the employer's production
//! capacity for the current cycle only. Hires are cleared when the next
//! cycle opens.
//!
//! An employer can also hire straight from a labor offer with
//! [`LaborMarket::accept_offer`], paying the asking wage without waiting
//! for clearing.
//!
//! A worker can never commit more hours than its per-cycle labor capacity:
//! hours still open on its labor offers plus hours already hired this
//! cycle count against it.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use microtrade_ledger::{Ledger, Settlement};
use microtrade_types::{
    AgentId, HireId, LaborDemand, LaborDemandId, LaborHire, LaborOffer, LaborOfferId, OrderKind,
    OrderStatus, OrderUpdate, Transaction,
};

use crate::Reservations;
use crate::clearing::{ClearingPolicy, order_value};
use crate::error::{MarketError, overflow};
use crate::order_book::{require_price, require_quantity};

/// Result of one labor clearing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaborOutcome {
    /// Wage transactions committed.
    pub transactions: Vec<Transaction>,
    /// Hires made.
    pub hires: Vec<LaborHire>,
    /// Labor order status changes.
    pub updates: Vec<OrderUpdate>,
}

/// Open labor offers and demands plus the current cycle's hires.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LaborMarket {
    /// Live labor offers keyed by id.
    offers: BTreeMap<LaborOfferId, LaborOffer>,
    /// Live labor demands keyed by id.
    demands: BTreeMap<LaborDemandId, LaborDemand>,
    /// Hires made during the current cycle.
    hires: Vec<LaborHire>,
    /// Id the next labor offer will receive.
    next_offer_id: LaborOfferId,
    /// Id the next labor demand will receive.
    next_demand_id: LaborDemandId,
    /// Id the next hire will receive.
    next_hire_id: HireId,
}

impl LaborMarket {
    /// Create an empty labor market.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassemble a labor market from its parts without validation.
    pub const fn from_parts(
        offers: BTreeMap<LaborOfferId, LaborOffer>,
        demands: BTreeMap<LaborDemandId, LaborDemand>,
        hires: Vec<LaborHire>,
        next_offer_id: LaborOfferId,
        next_demand_id: LaborDemandId,
        next_hire_id: HireId,
    ) -> Self {
        Self {
            offers,
            demands,
            hires,
            next_offer_id,
            next_demand_id,
            next_hire_id,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Live labor offers.
    pub const fn offers(&self) -> &BTreeMap<LaborOfferId, LaborOffer> {
        &self.offers
    }

    /// Live labor demands.
    pub const fn demands(&self) -> &BTreeMap<LaborDemandId, LaborDemand> {
        &self.demands
    }

    /// Hires made during the current cycle.
    pub fn hires(&self) -> &[LaborHire] {
        &self.hires
    }

    /// Id the next labor offer will receive.
    pub const fn next_offer_id(&self) -> LaborOfferId {
        self.next_offer_id
    }

    /// Id the next labor demand will receive.
    pub const fn next_demand_id(&self) -> LaborDemandId {
        self.next_demand_id
    }

    /// Id the next hire will receive.
    pub const fn next_hire_id(&self) -> HireId {
        self.next_hire_id
    }

    /// Hours `employer` has hired during the current cycle.
    pub fn hired_hours_for(&self, employer: &AgentId) -> u32 {
        self.hires
            .iter()
            .filter(|h| h.employer == *employer)
            .fold(0_u32, |acc, h| acc.saturating_add(h.hours))
    }

    /// Hours `worker` has committed this cycle: open offers plus hires.
    pub fn committed_hours_for(&self, worker: &AgentId) -> u32 {
        let offered = self
            .offers
            .values()
            .filter(|o| o.worker == *worker)
            .fold(0_u32, |acc, o| acc.saturating_add(o.remaining_hours));
        let hired = self
            .hires
            .iter()
            .filter(|h| h.worker == *worker)
            .fold(0_u32, |acc, h| acc.saturating_add(h.hours));
        offered.saturating_add(hired)
    }

    /// Add the currency reserved by every live demand to `totals`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ArithmeticOverflow`] on overflow.
    pub fn collect_reservations(&self, totals: &mut Reservations) -> Result<(), MarketError> {
        for demand in self.demands.values() {
            totals.add_funds(
                &demand.employer,
                order_value(demand.remaining_hours, demand.max_wage)?,
            )?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cycle boundary
    // -----------------------------------------------------------------------

    /// Forget the previous cycle's hires. Returns how many were cleared.
    pub fn begin_cycle(&mut self) -> usize {
        let cleared = self.hires.len();
        self.hires.clear();
        cleared
    }

    // -----------------------------------------------------------------------
    // Placing and withdrawing orders
    // -----------------------------------------------------------------------

    /// Offer `hours` of labor at `wage` per hour.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::CapacityExceeded`] if the worker's
    /// uncommitted capacity is smaller than `hours`, or an error for
    /// malformed parameters or an unknown worker.
    pub fn submit_labor_offer(
        &mut self,
        ledger: &Ledger,
        cycle: u64,
        worker: &AgentId,
        hours: u32,
        wage: Decimal,
    ) -> Result<LaborOfferId, MarketError> {
        require_quantity(hours, "labor hours")?;
        require_price(wage)?;
        let capacity = ledger.require(worker)?.labor_capacity_hours;
        let available = capacity.saturating_sub(self.committed_hours_for(worker));
        if hours > available {
            return Err(MarketError::CapacityExceeded {
                agent: worker.clone(),
                requested: hours,
                available,
            });
        }
        let id = self.next_offer_id;
        let next = id.next().ok_or_else(|| overflow("labor offer id sequence"))?;

        self.offers.insert(
            id,
            LaborOffer {
                id,
                worker: worker.clone(),
                hours,
                remaining_hours: hours,
                wage,
                created_cycle: cycle,
                status: OrderStatus::Open,
            },
        );
        self.next_offer_id = next;

        debug!(cycle, labor_offer_id = %id, worker = %worker, hours, wage = %wage, "Labor offered");
        Ok(id)
    }

    /// Demand `hours` of labor at up to `max_wage` per hour, reserving
    /// `hours * max_wage` currency.
    ///
    /// # Errors
    ///
    /// Returns a ledger error if the employer is unknown or cannot cover
    /// the reservation, or an error for malformed parameters.
    pub fn submit_labor_demand(
        &mut self,
        ledger: &mut Ledger,
        cycle: u64,
        employer: &AgentId,
        hours: u32,
        max_wage: Decimal,
    ) -> Result<LaborDemandId, MarketError> {
        require_quantity(hours, "labor hours")?;
        require_price(max_wage)?;
        let id = self.next_demand_id;
        let next = id
            .next()
            .ok_or_else(|| overflow("labor demand id sequence"))?;
        let reserve = order_value(hours, max_wage)?;

        ledger.reserve_funds(employer, reserve)?;

        self.demands.insert(
            id,
            LaborDemand {
                id,
                employer: employer.clone(),
                hours,
                remaining_hours: hours,
                max_wage,
                created_cycle: cycle,
                status: OrderStatus::Open,
            },
        );
        self.next_demand_id = next;

        debug!(
            cycle,
            labor_demand_id = %id,
            employer = %employer,
            hours,
            max_wage = %max_wage,
            "Labor demanded"
        );
        Ok(id)
    }

    /// Cancel every live labor order of `agent`.
    ///
    /// # Errors
    ///
    /// Returns a ledger error if a reservation cannot be released.
    pub fn cancel_all_for(
        &mut self,
        ledger: &mut Ledger,
        agent: &AgentId,
    ) -> Result<Vec<OrderUpdate>, MarketError> {
        let offer_ids: Vec<LaborOfferId> = self
            .offers
            .values()
            .filter(|o| o.worker == *agent)
            .map(|o| o.id)
            .collect();
        let demand_ids: Vec<LaborDemandId> = self
            .demands
            .values()
            .filter(|d| d.employer == *agent)
            .map(|d| d.id)
            .collect();
        self.close(ledger, &offer_ids, &demand_ids, OrderStatus::Cancelled)
    }

    /// Expire every live labor order placed at least `window` cycles
    /// before `cycle`.
    ///
    /// # Errors
    ///
    /// Returns a ledger error if a reservation cannot be released.
    pub fn expire(
        &mut self,
        ledger: &mut Ledger,
        cycle: u64,
        window: u64,
    ) -> Result<Vec<OrderUpdate>, MarketError> {
        let aged = |created: u64| created.saturating_add(window) <= cycle;
        let offer_ids: Vec<LaborOfferId> = self
            .offers
            .values()
            .filter(|o| aged(o.created_cycle))
            .map(|o| o.id)
            .collect();
        let demand_ids: Vec<LaborDemandId> = self
            .demands
            .values()
            .filter(|d| aged(d.created_cycle))
            .map(|d| d.id)
            .collect();
        self.close(ledger, &offer_ids, &demand_ids, OrderStatus::Expired)
    }

    // -----------------------------------------------------------------------
    // Clearing
    // -----------------------------------------------------------------------

    /// Match labor offers against demands and pay the hired workers.
    ///
    /// Offers sort ascending by wage, demands descending by max wage, both
    /// tie-broken by creation cycle, agent id, and id. No fee is charged
    /// on wages.
    ///
    /// # Errors
    ///
    /// Returns an error only if settlement of a reserved match fails,
    /// which indicates inconsistent state.
    pub fn clear(
        &mut self,
        ledger: &mut Ledger,
        policy: &ClearingPolicy,
        cycle: u64,
    ) -> Result<LaborOutcome, MarketError> {
        let mut offer_order: Vec<(Decimal, u64, AgentId, LaborOfferId)> = self
            .offers
            .values()
            .map(|o| (o.wage, o.created_cycle, o.worker.clone(), o.id))
            .collect();
        offer_order.sort();

        let mut demand_order: Vec<(Reverse<Decimal>, u64, AgentId, LaborDemandId)> = self
            .demands
            .values()
            .map(|d| (Reverse(d.max_wage), d.created_cycle, d.employer.clone(), d.id))
            .collect();
        demand_order.sort();

        let mut outcome = LaborOutcome::default();

        for &(_, _, _, demand_id) in &demand_order {
            for &(_, _, _, offer_id) in &offer_order {
                let Some(demand) = self.demands.get(&demand_id) else {
                    break;
                };
                let Some(offer) = self.offers.get(&offer_id) else {
                    continue;
                };
                if offer.wage > demand.max_wage {
                    break;
                }
                if offer.worker == demand.employer {
                    continue;
                }

                let hours = offer.remaining_hours.min(demand.remaining_hours);
                let wage = policy.clearing_price(offer.wage, demand.max_wage)?;
                let released = order_value(hours, demand.max_wage)?;
                let worker = offer.worker.clone();
                let employer = demand.employer.clone();
                let hire_id = self.next_hire_id;
                let next_hire = hire_id.next().ok_or_else(|| overflow("hire id sequence"))?;

                let settlement = Settlement::labor(cycle, worker.clone(), employer.clone(), hours, wage)
                    .from_reservations(0, released);
                let tx = ledger.settle(&settlement)?;

                self.record_hire(&mut outcome, hire_id, next_hire, tx, employer, worker);
                outcome.updates.push(self.fill_offer(offer_id, hours)?);
                outcome.updates.push(self.fill_demand(demand_id, hours)?);
            }
        }

        Ok(outcome)
    }

    /// Hire `hours` directly from a labor offer at its asking wage.
    ///
    /// The employer pays from unreserved currency; no demand is involved
    /// and no fee is charged. The hire counts toward the employer's
    /// production boost for the current cycle like a cleared one.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::UnknownOrder`] if the offer is not live,
    /// [`MarketError::SelfDealing`] if the employer is the worker,
    /// [`MarketError::CapacityExceeded`] if the offer has fewer hours
    /// left, or a ledger error if the employer cannot pay.
    pub fn accept_offer(
        &mut self,
        ledger: &mut Ledger,
        cycle: u64,
        employer: &AgentId,
        offer_id: LaborOfferId,
        hours: u32,
    ) -> Result<LaborOutcome, MarketError> {
        require_quantity(hours, "hired hours")?;
        let offer = self.offers.get(&offer_id).ok_or(MarketError::UnknownOrder {
            kind: OrderKind::LaborOffer,
            order_id: offer_id.value(),
        })?;
        if offer.worker == *employer {
            return Err(MarketError::SelfDealing {
                agent: employer.clone(),
            });
        }
        if hours > offer.remaining_hours {
            return Err(MarketError::CapacityExceeded {
                agent: offer.worker.clone(),
                requested: hours,
                available: offer.remaining_hours,
            });
        }
        let worker = offer.worker.clone();
        let hire_id = self.next_hire_id;
        let next_hire = hire_id.next().ok_or_else(|| overflow("hire id sequence"))?;

        let settlement = Settlement::labor(cycle, worker.clone(), employer.clone(), hours, offer.wage);
        let tx = ledger.settle(&settlement)?;

        let mut outcome = LaborOutcome::default();
        self.record_hire(&mut outcome, hire_id, next_hire, tx, employer.clone(), worker);
        outcome.updates.push(self.fill_offer(offer_id, hours)?);
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Internal bookkeeping
    // -----------------------------------------------------------------------

    fn record_hire(
        &mut self,
        outcome: &mut LaborOutcome,
        id: HireId,
        next: HireId,
        tx: Transaction,
        employer: AgentId,
        worker: AgentId,
    ) {
        let hire = LaborHire {
            id,
            employer,
            worker,
            hours: tx.quantity,
            wage: tx.unit_price,
            cycle: tx.cycle,
            transaction_id: tx.id,
        };
        info!(
            cycle = hire.cycle,
            hire_id = %hire.id,
            employer = %hire.employer,
            worker = %hire.worker,
            hours = hire.hours,
            wage = %hire.wage,
            "Labor hired"
        );
        self.next_hire_id = next;
        self.hires.push(hire.clone());
        outcome.hires.push(hire);
        outcome.transactions.push(tx);
    }

    fn fill_offer(&mut self, id: LaborOfferId, hours: u32) -> Result<OrderUpdate, MarketError> {
        let offer = self.offers.get_mut(&id).ok_or(MarketError::UnknownOrder {
            kind: OrderKind::LaborOffer,
            order_id: id.value(),
        })?;
        offer.remaining_hours = offer
            .remaining_hours
            .checked_sub(hours)
            .ok_or_else(|| overflow("labor offer fill"))?;
        offer.status = OrderStatus::after_fill(offer.remaining_hours);
        let update = offer_update(offer);
        if offer.status.is_terminal() {
            self.offers.remove(&id);
        }
        Ok(update)
    }

    fn fill_demand(&mut self, id: LaborDemandId, hours: u32) -> Result<OrderUpdate, MarketError> {
        let demand = self.demands.get_mut(&id).ok_or(MarketError::UnknownOrder {
            kind: OrderKind::LaborDemand,
            order_id: id.value(),
        })?;
        demand.remaining_hours = demand
            .remaining_hours
            .checked_sub(hours)
            .ok_or_else(|| overflow("labor demand fill"))?;
        demand.status = OrderStatus::after_fill(demand.remaining_hours);
        let update = demand_update(demand);
        if demand.status.is_terminal() {
            self.demands.remove(&id);
        }
        Ok(update)
    }

    fn close(
        &mut self,
        ledger: &mut Ledger,
        offer_ids: &[LaborOfferId],
        demand_ids: &[LaborDemandId],
        status: OrderStatus,
    ) -> Result<Vec<OrderUpdate>, MarketError> {
        let mut updates = Vec::with_capacity(offer_ids.len().saturating_add(demand_ids.len()));
        for id in offer_ids {
            if let Some(mut offer) = self.offers.remove(id) {
                offer.status = status;
                updates.push(offer_update(&offer));
            }
        }
        for id in demand_ids {
            let Some(demand) = self.demands.get(id) else {
                continue;
            };
            let reserved = order_value(demand.remaining_hours, demand.max_wage)?;
            ledger.release_funds(&demand.employer, reserved)?;
            if let Some(mut demand) = self.demands.remove(id) {
                demand.status = status;
                updates.push(demand_update(&demand));
            }
        }
        Ok(updates)
    }
}

fn offer_update(offer: &LaborOffer) -> OrderUpdate {
    OrderUpdate {
        kind: OrderKind::LaborOffer,
        order_id: offer.id.value(),
        agent: offer.worker.clone(),
        remaining: offer.remaining_hours,
        status: offer.status,
    }
}

fn demand_update(demand: &LaborDemand) -> OrderUpdate {
    OrderUpdate {
        kind: OrderKind::LaborDemand,
        order_id: demand.id.value(),
        agent: demand.employer.clone(),
        remaining: demand.remaining_hours,
        status: demand.status,
    }
}
