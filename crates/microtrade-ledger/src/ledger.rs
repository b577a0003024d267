//! The ledger: agent accounts plus an append-only transaction log.
//!
//! The [`Ledger`] is the only writer of [`Agent`] fields. Every public
//! mutation validates against the current balances first and only then
//! writes, so a failed call is never partially applied.
//!
//! # Design
//!
//! - **Append-only**: committed transactions are never modified or deleted.
//! - **Reservations**: goods and currency backing open orders are reserved;
//!   all spending checks run against *available* (held minus reserved)
//!   balances, which rules out double-commitment.
//! - **Atomic settlement**: [`Ledger::settle`] stages the buyer, seller,
//!   and facilitator records on copies and swaps them in only after every
//!   step has succeeded.
//! - **Precision**: all currency uses [`Decimal`] -- no floating point.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use microtrade_types::{
    Agent, AgentId, GoodName, LABOR_GOOD, Transaction, TransactionId, TransactionKind,
};

use crate::{LedgerError, TransactionBuilder, lookup};

// ---------------------------------------------------------------------------
// Settlement parameters
// ---------------------------------------------------------------------------

/// Everything needed to settle one exchange atomically.
///
/// Packs the many arguments of a settlement into a single struct to keep
/// call sites readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// The cycle number.
    pub cycle: u64,
    /// How the exchange came about.
    pub kind: TransactionKind,
    /// Agent delivering goods or labor and receiving payment.
    pub seller: AgentId,
    /// Agent paying and receiving goods.
    pub buyer: AgentId,
    /// Good exchanged.
    pub good: GoodName,
    /// Units (or hours) exchanged.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Decimal,
    /// Fee deducted from the seller's proceeds.
    pub fee: Decimal,
    /// Agent credited with the fee.
    pub facilitator: Option<AgentId>,
    /// Whether goods change hands (false for labor).
    pub delivers_goods: bool,
    /// Seller goods reserved for this exchange, released before delivery.
    pub seller_reserved_goods: u32,
    /// Buyer currency reserved for this exchange, released before payment.
    pub buyer_reserved_funds: Decimal,
}

impl Settlement {
    /// A goods exchange paid from unreserved balances, with no fee.
    pub const fn goods(
        cycle: u64,
        kind: TransactionKind,
        seller: AgentId,
        buyer: AgentId,
        good: GoodName,
        quantity: u32,
        unit_price: Decimal,
    ) -> Self {
        Self {
            cycle,
            kind,
            seller,
            buyer,
            good,
            quantity,
            unit_price,
            fee: Decimal::ZERO,
            facilitator: None,
            delivers_goods: true,
            seller_reserved_goods: 0,
            buyer_reserved_funds: Decimal::ZERO,
        }
    }

    /// A labor hire: the employer pays `hours * wage` to the worker.
    pub fn labor(cycle: u64, worker: AgentId, employer: AgentId, hours: u32, wage: Decimal) -> Self {
        Self {
            cycle,
            kind: TransactionKind::Labor,
            seller: worker,
            buyer: employer,
            good: GoodName::from(LABOR_GOOD),
            quantity: hours,
            unit_price: wage,
            fee: Decimal::ZERO,
            facilitator: None,
            delivers_goods: false,
            seller_reserved_goods: 0,
            buyer_reserved_funds: Decimal::ZERO,
        }
    }

    /// Charge `fee` to the seller's proceeds and credit it to `facilitator`.
    #[must_use]
    pub fn with_fee(mut self, fee: Decimal, facilitator: Option<AgentId>) -> Self {
        self.fee = fee;
        self.facilitator = facilitator;
        self
    }

    /// Consume reservations held against the orders being filled.
    #[must_use]
    pub const fn from_reservations(mut self, seller_goods: u32, buyer_funds: Decimal) -> Self {
        self.seller_reserved_goods = seller_goods;
        self.buyer_reserved_funds = buyer_funds;
        self
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Authoritative record of every agent and every committed transaction.
///
/// The ledger enforces four invariants:
/// 1. Currency and every goods quantity stay non-negative.
/// 2. Reserved amounts never exceed held amounts.
/// 3. Health stays within `0..=max_health`.
/// 4. Transaction ids strictly increase and are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// Agent accounts keyed by id.
    agents: BTreeMap<AgentId, Agent>,
    /// Committed transactions in id order.
    transactions: Vec<Transaction>,
    /// Id the next committed transaction will receive.
    next_transaction_id: TransactionId,
    /// Upper bound for agent health.
    max_health: u32,
}

impl Ledger {
    /// Create an empty ledger.
    pub const fn new(max_health: u32) -> Self {
        Self {
            agents: BTreeMap::new(),
            transactions: Vec::new(),
            next_transaction_id: TransactionId::FIRST,
            max_health,
        }
    }

    /// Reassemble a ledger from its parts without validation.
    ///
    /// Used when restoring persisted state; the caller is responsible for
    /// checking referential integrity.
    pub const fn from_parts(
        agents: BTreeMap<AgentId, Agent>,
        transactions: Vec<Transaction>,
        next_transaction_id: TransactionId,
        max_health: u32,
    ) -> Self {
        Self {
            agents,
            transactions,
            next_transaction_id,
            max_health,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Upper bound for agent health.
    pub const fn max_health(&self) -> u32 {
        self.max_health
    }

    /// All agent accounts.
    pub const fn agents(&self) -> &BTreeMap<AgentId, Agent> {
        &self.agents
    }

    /// Look up one agent.
    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Look up one agent, failing with [`LedgerError::UnknownAgent`].
    pub fn require(&self, id: &AgentId) -> Result<&Agent, LedgerError> {
        lookup(&self.agents, id)
    }

    /// Returns `true` if the agent exists and is active.
    pub fn is_active(&self, id: &AgentId) -> bool {
        self.agents.get(id).is_some_and(|a| a.active)
    }

    /// The full transaction log.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Transactions committed in `cycle`.
    pub fn transactions_for_cycle(&self, cycle: u64) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(move |t| t.cycle == cycle)
    }

    /// Transactions with an id at or after `from`.
    pub fn transactions_since(&self, from: TransactionId) -> &[Transaction] {
        let start = self.transactions.partition_point(|t| t.id < from);
        self.transactions.get(start..).unwrap_or(&[])
    }

    /// Id the next committed transaction will receive.
    pub const fn next_transaction_id(&self) -> TransactionId {
        self.next_transaction_id
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Open an account for a new agent.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateAgent`] if the id is taken, or
    /// [`LedgerError::InvalidAmount`] if the agent starts with negative
    /// currency, health above the maximum, or reservations.
    pub fn open_account(&mut self, agent: Agent) -> Result<(), LedgerError> {
        if self.agents.contains_key(&agent.id) {
            return Err(LedgerError::DuplicateAgent { agent: agent.id });
        }
        if agent.currency.is_sign_negative() {
            return Err(LedgerError::InvalidAmount {
                context: format!("agent {} starts with negative currency", agent.id),
            });
        }
        if agent.health > self.max_health {
            return Err(LedgerError::InvalidAmount {
                context: format!(
                    "agent {} starts with health {} above maximum {}",
                    agent.id, agent.health, self.max_health
                ),
            });
        }
        if !agent.reserved_currency.is_zero() || !agent.reserved_goods.is_empty() {
            return Err(LedgerError::InvalidAmount {
                context: format!("agent {} starts with reservations", agent.id),
            });
        }
        self.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// Move `quantity` of `good` from one agent to another.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientGoods`] unless `from` has at
    /// least `quantity` unreserved, [`LedgerError::UnknownAgent`] for a
    /// missing account, [`LedgerError::SelfTrade`] if `from == to`, or
    /// [`LedgerError::InvalidAmount`] for a zero quantity.
    pub fn transfer(
        &mut self,
        from: &AgentId,
        to: &AgentId,
        good: &GoodName,
        quantity: u32,
    ) -> Result<(), LedgerError> {
        require_distinct(from, to)?;
        require_positive_quantity(quantity, "transfer quantity")?;

        let mut staged = Staged::new(&self.agents);
        debit_goods(staged.get(from)?, good, quantity)?;
        credit_goods(staged.get(to)?, good, quantity)?;
        let changes = staged.into_changes();
        self.agents.extend(changes);
        Ok(())
    }

    /// Move `amount` of currency from one agent to another.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] unless `from` has at
    /// least `amount` unreserved, [`LedgerError::UnknownAgent`] for a
    /// missing account, [`LedgerError::SelfTrade`] if `from == to`, or
    /// [`LedgerError::InvalidAmount`] for a non-positive amount.
    pub fn pay(&mut self, from: &AgentId, to: &AgentId, amount: Decimal) -> Result<(), LedgerError> {
        require_distinct(from, to)?;
        require_positive_amount(amount, "payment amount")?;

        let mut staged = Staged::new(&self.agents);
        debit_currency(staged.get(from)?, amount)?;
        credit_currency(staged.get(to)?, amount)?;
        let changes = staged.into_changes();
        self.agents.extend(changes);
        Ok(())
    }

    /// Settle an exchange: goods (if any), payment, and fee move together
    /// and a [`Transaction`] is appended, or nothing changes at all.
    ///
    /// # Errors
    ///
    /// Returns the first [`LedgerError`] found while staging; the ledger
    /// is left untouched in that case.
    pub fn settle(&mut self, settlement: &Settlement) -> Result<Transaction, LedgerError> {
        let tx = TransactionBuilder::new(settlement.cycle, settlement.kind, settlement.good.clone())
            .seller(settlement.seller.clone())
            .buyer(settlement.buyer.clone())
            .quantity(settlement.quantity)
            .unit_price(settlement.unit_price)
            .fee(settlement.fee)
            .build(self.next_transaction_id)?;
        let next_id = self
            .next_transaction_id
            .next()
            .ok_or_else(|| overflow("transaction id sequence"))?;

        let gross = tx.gross().ok_or_else(|| overflow("settlement gross amount"))?;
        let net = tx
            .net_to_seller()
            .ok_or_else(|| overflow("settlement net amount"))?;

        let fee_recipient = if settlement.fee.is_zero() {
            None
        } else {
            Some(
                settlement
                    .facilitator
                    .as_ref()
                    .ok_or(LedgerError::MissingFacilitator {
                        fee: settlement.fee,
                    })?,
            )
        };

        let mut staged = Staged::new(&self.agents);

        let buyer = staged.get(&settlement.buyer)?;
        release_currency(buyer, settlement.buyer_reserved_funds)?;
        debit_currency(buyer, gross)?;
        if settlement.delivers_goods {
            credit_goods(buyer, &settlement.good, settlement.quantity)?;
        }

        let seller = staged.get(&settlement.seller)?;
        if settlement.delivers_goods {
            release_goods(seller, &settlement.good, settlement.seller_reserved_goods)?;
            debit_goods(seller, &settlement.good, settlement.quantity)?;
        }
        credit_currency(seller, net)?;

        if let Some(facilitator) = fee_recipient {
            credit_currency(staged.get(facilitator)?, settlement.fee)?;
        }

        let changes = staged.into_changes();
        self.agents.extend(changes);
        self.next_transaction_id = next_id;
        self.transactions.push(tx.clone());

        debug!(
            cycle = tx.cycle,
            transaction_id = %tx.id,
            kind = ?tx.kind,
            seller = %tx.seller,
            buyer = %tx.buyer,
            good = %tx.good,
            quantity = tx.quantity,
            unit_price = %tx.unit_price,
            fee = %tx.fee,
            "Transaction committed"
        );

        Ok(tx)
    }

    // -----------------------------------------------------------------------
    // Reservations
    // -----------------------------------------------------------------------

    /// Reserve `quantity` of the agent's unreserved `good`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientGoods`] if not enough is
    /// available, or [`LedgerError::InvalidAmount`] for a zero quantity.
    pub fn reserve_goods(
        &mut self,
        agent: &AgentId,
        good: &GoodName,
        quantity: u32,
    ) -> Result<(), LedgerError> {
        require_positive_quantity(quantity, "goods reservation")?;
        self.mutate(agent, |a| reserve_goods(a, good, quantity))
    }

    /// Release a previous goods reservation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ReservationUnderflow`] if less is reserved.
    pub fn release_goods(
        &mut self,
        agent: &AgentId,
        good: &GoodName,
        quantity: u32,
    ) -> Result<(), LedgerError> {
        self.mutate(agent, |a| release_goods(a, good, quantity))
    }

    /// Reserve `amount` of the agent's unreserved currency.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] if not enough is
    /// available, or [`LedgerError::InvalidAmount`] for a non-positive
    /// amount.
    pub fn reserve_funds(&mut self, agent: &AgentId, amount: Decimal) -> Result<(), LedgerError> {
        require_positive_amount(amount, "funds reservation")?;
        self.mutate(agent, |a| reserve_currency(a, amount))
    }

    /// Release a previous currency reservation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ReservationUnderflow`] if less is reserved.
    pub fn release_funds(&mut self, agent: &AgentId, amount: Decimal) -> Result<(), LedgerError> {
        self.mutate(agent, |a| release_currency(a, amount))
    }

    // -----------------------------------------------------------------------
    // Production and consumption
    // -----------------------------------------------------------------------

    /// Create goods in the agent's inventory (the only goods source).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] for a zero quantity.
    pub fn credit_goods(
        &mut self,
        agent: &AgentId,
        good: &GoodName,
        quantity: u32,
    ) -> Result<(), LedgerError> {
        require_positive_quantity(quantity, "production quantity")?;
        self.mutate(agent, |a| credit_goods(a, good, quantity))
    }

    /// Destroy goods from the agent's unreserved inventory (the only
    /// goods sink).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientGoods`] if not enough is
    /// available, or [`LedgerError::InvalidAmount`] for a zero quantity.
    pub fn debit_goods(
        &mut self,
        agent: &AgentId,
        good: &GoodName,
        quantity: u32,
    ) -> Result<(), LedgerError> {
        require_positive_quantity(quantity, "consumption quantity")?;
        self.mutate(agent, |a| debit_goods(a, good, quantity))
    }

    // -----------------------------------------------------------------------
    // Health
    // -----------------------------------------------------------------------

    /// Add `delta` to the agent's health, clamped to `0..=max_health`.
    ///
    /// Returns the new health.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownAgent`] for a missing account.
    pub fn apply_health_delta(&mut self, agent: &AgentId, delta: i64) -> Result<u32, LedgerError> {
        let max = i64::from(self.max_health);
        let account = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| LedgerError::UnknownAgent {
                agent: agent.clone(),
            })?;
        let raw = i64::from(account.health)
            .checked_add(delta)
            .ok_or_else(|| overflow("health delta"))?;
        let clamped = raw.clamp(0, max);
        account.health = u32::try_from(clamped).map_err(|e| LedgerError::ArithmeticOverflow {
            context: format!("health conversion: {e}"),
        })?;
        Ok(account.health)
    }

    /// Mark the agent inactive. Returns `true` if it was active before.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownAgent`] for a missing account.
    pub fn deactivate(&mut self, agent: &AgentId) -> Result<bool, LedgerError> {
        let account = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| LedgerError::UnknownAgent {
                agent: agent.clone(),
            })?;
        let was_active = account.active;
        account.active = false;
        Ok(was_active)
    }

    /// Apply a fallible edit to one agent, writing back only on success.
    fn mutate<F>(&mut self, agent: &AgentId, edit: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut Agent) -> Result<(), LedgerError>,
    {
        let mut staged = Staged::new(&self.agents);
        edit(staged.get(agent)?)?;
        let changes = staged.into_changes();
        self.agents.extend(changes);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// Copies of agent records being edited by one ledger operation.
struct Staged<'a> {
    source: &'a BTreeMap<AgentId, Agent>,
    changed: BTreeMap<AgentId, Agent>,
}

impl<'a> Staged<'a> {
    const fn new(source: &'a BTreeMap<AgentId, Agent>) -> Self {
        Self {
            source,
            changed: BTreeMap::new(),
        }
    }

    fn get(&mut self, id: &AgentId) -> Result<&mut Agent, LedgerError> {
        if !self.changed.contains_key(id) {
            let copy = lookup(self.source, id)?.clone();
            self.changed.insert(id.clone(), copy);
        }
        self.changed
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownAgent { agent: id.clone() })
    }

    fn into_changes(self) -> BTreeMap<AgentId, Agent> {
        self.changed
    }
}

// ---------------------------------------------------------------------------
// Record-level edits
// ---------------------------------------------------------------------------

fn overflow(context: &str) -> LedgerError {
    LedgerError::ArithmeticOverflow {
        context: context.to_owned(),
    }
}

fn require_distinct(from: &AgentId, to: &AgentId) -> Result<(), LedgerError> {
    if from == to {
        return Err(LedgerError::SelfTrade {
            agent: from.clone(),
        });
    }
    Ok(())
}

fn require_positive_quantity(quantity: u32, context: &str) -> Result<(), LedgerError> {
    if quantity == 0 {
        return Err(LedgerError::InvalidAmount {
            context: format!("{context} must be positive"),
        });
    }
    Ok(())
}

fn require_positive_amount(amount: Decimal, context: &str) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount {
            context: format!("{context} must be positive, got {amount}"),
        });
    }
    Ok(())
}

fn debit_currency(agent: &mut Agent, amount: Decimal) -> Result<(), LedgerError> {
    let available = agent.currency_available();
    if amount > available {
        return Err(LedgerError::InsufficientFunds {
            agent: agent.id.clone(),
            requested: amount,
            available,
        });
    }
    agent.currency = agent
        .currency
        .checked_sub(amount)
        .ok_or_else(|| overflow("currency debit"))?;
    Ok(())
}

fn credit_currency(agent: &mut Agent, amount: Decimal) -> Result<(), LedgerError> {
    agent.currency = agent
        .currency
        .checked_add(amount)
        .ok_or_else(|| overflow("currency credit"))?;
    Ok(())
}

fn reserve_currency(agent: &mut Agent, amount: Decimal) -> Result<(), LedgerError> {
    let available = agent.currency_available();
    if amount > available {
        return Err(LedgerError::InsufficientFunds {
            agent: agent.id.clone(),
            requested: amount,
            available,
        });
    }
    agent.reserved_currency = agent
        .reserved_currency
        .checked_add(amount)
        .ok_or_else(|| overflow("currency reservation"))?;
    Ok(())
}

fn release_currency(agent: &mut Agent, amount: Decimal) -> Result<(), LedgerError> {
    if amount.is_zero() {
        return Ok(());
    }
    if amount > agent.reserved_currency || amount.is_sign_negative() {
        return Err(LedgerError::ReservationUnderflow {
            agent: agent.id.clone(),
            context: format!(
                "releasing {amount} currency, {} reserved",
                agent.reserved_currency
            ),
        });
    }
    agent.reserved_currency = agent
        .reserved_currency
        .checked_sub(amount)
        .ok_or_else(|| overflow("currency release"))?;
    Ok(())
}

fn debit_goods(agent: &mut Agent, good: &GoodName, quantity: u32) -> Result<(), LedgerError> {
    let available = agent.goods_available(good);
    if quantity > available {
        return Err(LedgerError::InsufficientGoods {
            agent: agent.id.clone(),
            good: good.clone(),
            requested: quantity,
            available,
        });
    }
    let remaining = agent
        .goods_held(good)
        .checked_sub(quantity)
        .ok_or_else(|| overflow("goods debit"))?;
    set_count(&mut agent.goods, good, remaining);
    Ok(())
}

fn credit_goods(agent: &mut Agent, good: &GoodName, quantity: u32) -> Result<(), LedgerError> {
    let total = agent
        .goods_held(good)
        .checked_add(quantity)
        .ok_or_else(|| overflow("goods credit"))?;
    set_count(&mut agent.goods, good, total);
    Ok(())
}

fn reserve_goods(agent: &mut Agent, good: &GoodName, quantity: u32) -> Result<(), LedgerError> {
    let available = agent.goods_available(good);
    if quantity > available {
        return Err(LedgerError::InsufficientGoods {
            agent: agent.id.clone(),
            good: good.clone(),
            requested: quantity,
            available,
        });
    }
    let reserved = agent
        .goods_reserved(good)
        .checked_add(quantity)
        .ok_or_else(|| overflow("goods reservation"))?;
    set_count(&mut agent.reserved_goods, good, reserved);
    Ok(())
}

fn release_goods(agent: &mut Agent, good: &GoodName, quantity: u32) -> Result<(), LedgerError> {
    if quantity == 0 {
        return Ok(());
    }
    let reserved = agent.goods_reserved(good);
    let remaining = reserved
        .checked_sub(quantity)
        .ok_or_else(|| LedgerError::ReservationUnderflow {
            agent: agent.id.clone(),
            context: format!("releasing {quantity} {good}, {reserved} reserved"),
        })?;
    set_count(&mut agent.reserved_goods, good, remaining);
    Ok(())
}

/// Store a count, dropping the entry when it reaches zero.
fn set_count(map: &mut BTreeMap<GoodName, u32>, good: &GoodName, count: u32) {
    if count == 0 {
        map.remove(good);
    } else {
        map.insert(good.clone(), count);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use microtrade_types::Role;
    use rust_decimal_macros::dec;

    use super::*;

    fn id(name: &str) -> AgentId {
        AgentId::from(name)
    }

    fn food() -> GoodName {
        GoodName::from("food")
    }

    /// Producer with 5 food and 10 currency, consumer with 8 currency,
    /// market facilitator with 6 currency.
    fn make_ledger() -> Ledger {
        let mut ledger = Ledger::new(100);
        ledger
            .open_account(
                Agent::new(id("producer"), Role::from("producer"), dec!(10), 100)
                    .with_goods(food(), 5),
            )
            .unwrap();
        ledger
            .open_account(Agent::new(id("consumer"), Role::from("consumer"), dec!(8), 100))
            .unwrap();
        ledger
            .open_account(Agent::new(id("market"), Role::from("market"), dec!(6), 100))
            .unwrap();
        ledger
    }

    #[test]
    fn duplicate_account_rejected() {
        let mut ledger = make_ledger();
        let result = ledger.open_account(Agent::new(
            id("producer"),
            Role::from("producer"),
            dec!(1),
            100,
        ));
        assert!(matches!(result, Err(LedgerError::DuplicateAgent { .. })));
    }

    #[test]
    fn account_health_above_max_rejected() {
        let mut ledger = Ledger::new(50);
        let result = ledger.open_account(Agent::new(id("a"), Role::from("trader"), dec!(1), 51));
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn transfer_moves_goods() {
        let mut ledger = make_ledger();
        ledger
            .transfer(&id("producer"), &id("consumer"), &food(), 2)
            .unwrap();
        assert_eq!(ledger.agent(&id("producer")).unwrap().goods_held(&food()), 3);
        assert_eq!(ledger.agent(&id("consumer")).unwrap().goods_held(&food()), 2);
    }

    #[test]
    fn transfer_respects_reservations() {
        let mut ledger = make_ledger();
        ledger.reserve_goods(&id("producer"), &food(), 4).unwrap();
        let result = ledger.transfer(&id("producer"), &id("consumer"), &food(), 2);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientGoods { available: 1, .. })
        ));
        assert_eq!(ledger.agent(&id("producer")).unwrap().goods_held(&food()), 5);
    }

    #[test]
    fn pay_insufficient_funds() {
        let mut ledger = make_ledger();
        let result = ledger.pay(&id("consumer"), &id("producer"), dec!(8.01));
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(ledger.agent(&id("consumer")).unwrap().currency, dec!(8));
    }

    #[test]
    fn pay_to_unknown_agent_leaves_payer_untouched() {
        let mut ledger = make_ledger();
        let result = ledger.pay(&id("consumer"), &id("ghost"), dec!(1));
        assert!(matches!(result, Err(LedgerError::UnknownAgent { .. })));
        assert_eq!(ledger.agent(&id("consumer")).unwrap().currency, dec!(8));
    }

    #[test]
    fn settle_with_fee_and_reservations() {
        let mut ledger = make_ledger();
        ledger.reserve_goods(&id("producer"), &food(), 5).unwrap();
        ledger.reserve_funds(&id("consumer"), dec!(7.5)).unwrap();

        let settlement = Settlement::goods(
            1,
            TransactionKind::Matched,
            id("producer"),
            id("consumer"),
            food(),
            3,
            dec!(2.25),
        )
        .with_fee(dec!(0.3375), Some(id("market")))
        .from_reservations(3, dec!(7.5));

        let tx = ledger.settle(&settlement).unwrap();
        assert_eq!(tx.id, TransactionId::FIRST);
        assert_eq!(ledger.next_transaction_id(), TransactionId::new(2));

        let producer = ledger.agent(&id("producer")).unwrap();
        assert_eq!(producer.goods_held(&food()), 2);
        assert_eq!(producer.goods_reserved(&food()), 2);
        assert_eq!(producer.currency, dec!(16.4125));

        let consumer = ledger.agent(&id("consumer")).unwrap();
        assert_eq!(consumer.goods_held(&food()), 3);
        assert_eq!(consumer.currency, dec!(1.25));
        assert_eq!(consumer.reserved_currency, Decimal::ZERO);

        assert_eq!(ledger.agent(&id("market")).unwrap().currency, dec!(6.3375));
    }

    #[test]
    fn failed_settlement_changes_nothing() {
        let mut ledger = make_ledger();
        let before = ledger.clone();

        // Consumer cannot pay 5 * 2 = 10 with 8 currency.
        let settlement = Settlement::goods(
            1,
            TransactionKind::Accepted,
            id("producer"),
            id("consumer"),
            food(),
            5,
            dec!(2),
        );
        let result = ledger.settle(&settlement);
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(ledger, before);
    }

    #[test]
    fn fee_without_facilitator_rejected() {
        let mut ledger = make_ledger();
        let settlement = Settlement::goods(
            1,
            TransactionKind::Accepted,
            id("producer"),
            id("consumer"),
            food(),
            1,
            dec!(2),
        )
        .with_fee(dec!(0.1), None);
        let result = ledger.settle(&settlement);
        assert!(matches!(result, Err(LedgerError::MissingFacilitator { .. })));
        assert!(ledger.transactions().is_empty());
    }

    #[test]
    fn labor_settlement_moves_only_currency() {
        let mut ledger = make_ledger();
        let tx = ledger
            .settle(&Settlement::labor(2, id("consumer"), id("producer"), 4, dec!(1.5)))
            .unwrap();
        assert!(tx.is_labor());
        assert_eq!(tx.good.as_str(), LABOR_GOOD);
        assert_eq!(ledger.agent(&id("producer")).unwrap().currency, dec!(4));
        assert_eq!(ledger.agent(&id("producer")).unwrap().goods_held(&food()), 5);
        assert_eq!(ledger.agent(&id("consumer")).unwrap().currency, dec!(14));
    }

    #[test]
    fn transaction_ids_strictly_increase() {
        let mut ledger = make_ledger();
        for _ in 0..3 {
            ledger
                .settle(&Settlement::goods(
                    1,
                    TransactionKind::Accepted,
                    id("producer"),
                    id("consumer"),
                    food(),
                    1,
                    dec!(1),
                ))
                .unwrap();
        }
        let ids: Vec<u64> = ledger.transactions().iter().map(|t| t.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(crate::transaction_ids_monotonic(
            ledger.transactions(),
            ledger.next_transaction_id()
        ));
        assert_eq!(ledger.transactions_since(TransactionId::new(2)).len(), 2);
    }

    #[test]
    fn release_more_than_reserved_rejected() {
        let mut ledger = make_ledger();
        ledger.reserve_funds(&id("consumer"), dec!(2)).unwrap();
        let result = ledger.release_funds(&id("consumer"), dec!(3));
        assert!(matches!(result, Err(LedgerError::ReservationUnderflow { .. })));
        ledger.release_funds(&id("consumer"), dec!(2)).unwrap();
        assert_eq!(
            ledger.agent(&id("consumer")).unwrap().reserved_currency,
            Decimal::ZERO
        );
    }

    #[test]
    fn consumption_only_uses_unreserved_goods() {
        let mut ledger = make_ledger();
        ledger.reserve_goods(&id("producer"), &food(), 5).unwrap();
        let result = ledger.debit_goods(&id("producer"), &food(), 1);
        assert!(matches!(result, Err(LedgerError::InsufficientGoods { .. })));
        ledger.release_goods(&id("producer"), &food(), 5).unwrap();
        ledger.debit_goods(&id("producer"), &food(), 5).unwrap();
        assert!(ledger.agent(&id("producer")).unwrap().goods.is_empty());
    }

    #[test]
    fn health_delta_clamps() {
        let mut ledger = make_ledger();
        assert_eq!(ledger.apply_health_delta(&id("consumer"), 5).unwrap(), 100);
        assert_eq!(ledger.apply_health_delta(&id("consumer"), -150).unwrap(), 0);
        assert_eq!(ledger.apply_health_delta(&id("consumer"), 15).unwrap(), 15);
    }

    #[test]
    fn deactivate_is_idempotent() {
        let mut ledger = make_ledger();
        assert!(ledger.deactivate(&id("consumer")).unwrap());
        assert!(!ledger.deactivate(&id("consumer")).unwrap());
        assert!(!ledger.is_active(&id("consumer")));
    }

    #[test]
    fn ledger_round_trips_through_json() {
        let mut ledger = make_ledger();
        ledger.reserve_goods(&id("producer"), &food(), 2).unwrap();
        let json = serde_json::to_string(&ledger).unwrap();
        let back: Ledger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger);
    }
}
