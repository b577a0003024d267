//! The goods order book: sell offers, buy requests, and per-cycle matching.
//!
//! Placing an order reserves what backs it (goods for an offer,
//! `quantity * max_price` currency for a request), so nothing can be
//! promised twice. Orders leave the book as soon as they reach a terminal
//! status; the cycle report carries the final [`OrderUpdate`].
//!
//! # Matching
//!
//! Once per cycle, per good, in good-name order:
//!
//! 1. Offers sort ascending by price, then creation cycle, agent id, id.
//! 2. Requests sort descending by max price, then the same tie-breaks.
//! 3. Each request in priority order takes from the cheapest remaining
//!    offers while `offer.price <= request.max_price`, skipping offers
//!    from its own agent. Every fill settles through the ledger at the
//!    policy's clearing price and releases the consumed reservations.
//!
//! The walk restarts from the cheapest offer for every request instead of
//! keeping one offer cursor: an offer skipped as a self-match must stay
//! available to the next request.
//!
//! Outside matching, a buyer can take a specific offer at its asking price
//! ([`OrderBook::accept_offer`]) and a seller can fill a specific request at
//! its maximum price ([`OrderBook::accept_request`]).

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use microtrade_ledger::{Ledger, LedgerError, Settlement};
use microtrade_types::{
    AgentId, GoodName, Offer, OfferId, OrderKind, OrderStatus, OrderUpdate, Request, RequestId,
    Transaction, TransactionKind,
};

use crate::Reservations;
use crate::clearing::{ClearingPolicy, order_value};
use crate::error::{MarketError, overflow};

/// Transactions and order updates produced by a matching pass or a
/// direct buy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Transactions committed, in id order.
    pub transactions: Vec<Transaction>,
    /// Order status changes, in the order they happened.
    pub updates: Vec<OrderUpdate>,
}

impl MatchOutcome {
    /// Append another outcome to this one.
    pub fn absorb(&mut self, other: Self) {
        self.transactions.extend(other.transactions);
        self.updates.extend(other.updates);
    }
}

/// Open sell offers and buy requests for all goods.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderBook {
    /// Live offers keyed by id.
    offers: BTreeMap<OfferId, Offer>,
    /// Live requests keyed by id.
    requests: BTreeMap<RequestId, Request>,
    /// Id the next offer will receive.
    next_offer_id: OfferId,
    /// Id the next request will receive.
    next_request_id: RequestId,
}

impl OrderBook {
    /// Create an empty order book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassemble a book from its parts without validation.
    pub const fn from_parts(
        offers: BTreeMap<OfferId, Offer>,
        requests: BTreeMap<RequestId, Request>,
        next_offer_id: OfferId,
        next_request_id: RequestId,
    ) -> Self {
        Self {
            offers,
            requests,
            next_offer_id,
            next_request_id,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Live offers keyed by id.
    pub const fn offers(&self) -> &BTreeMap<OfferId, Offer> {
        &self.offers
    }

    /// Live requests keyed by id.
    pub const fn requests(&self) -> &BTreeMap<RequestId, Request> {
        &self.requests
    }

    /// Look up a live offer.
    pub fn offer(&self, id: OfferId) -> Option<&Offer> {
        self.offers.get(&id)
    }

    /// Look up a live request.
    pub fn request(&self, id: RequestId) -> Option<&Request> {
        self.requests.get(&id)
    }

    /// Id the next offer will receive.
    pub const fn next_offer_id(&self) -> OfferId {
        self.next_offer_id
    }

    /// Id the next request will receive.
    pub const fn next_request_id(&self) -> RequestId {
        self.next_request_id
    }

    /// Goods that currently have at least one live offer.
    pub fn offered_goods(&self) -> BTreeSet<GoodName> {
        self.offers.values().map(|o| o.good.clone()).collect()
    }

    /// Add the reservations backing every live order to `totals`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ArithmeticOverflow`] on overflow.
    pub fn collect_reservations(&self, totals: &mut Reservations) -> Result<(), MarketError> {
        for offer in self.offers.values() {
            totals.add_goods(&offer.agent, &offer.good, offer.remaining)?;
        }
        for request in self.requests.values() {
            totals.add_funds(&request.agent, order_value(request.remaining, request.max_price)?)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Placing and withdrawing orders
    // -----------------------------------------------------------------------

    /// Place a sell offer, reserving `quantity` of the agent's goods.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidQuantity`] or
    /// [`MarketError::InvalidPrice`] for malformed parameters, or a ledger
    /// error if the agent is unknown or lacks available goods.
    pub fn submit_offer(
        &mut self,
        ledger: &mut Ledger,
        cycle: u64,
        agent: &AgentId,
        good: &GoodName,
        quantity: u32,
        price: Decimal,
    ) -> Result<OfferId, MarketError> {
        require_quantity(quantity, "offer quantity")?;
        require_price(price)?;
        let id = self.next_offer_id;
        let next = id.next().ok_or_else(|| overflow("offer id sequence"))?;

        ledger.reserve_goods(agent, good, quantity)?;

        self.offers.insert(
            id,
            Offer {
                id,
                agent: agent.clone(),
                good: good.clone(),
                quantity,
                remaining: quantity,
                price,
                created_cycle: cycle,
                status: OrderStatus::Open,
            },
        );
        self.next_offer_id = next;

        debug!(
            cycle,
            offer_id = %id,
            agent = %agent,
            good = %good,
            quantity,
            price = %price,
            "Offer placed"
        );
        Ok(id)
    }

    /// Place a buy request, reserving `quantity * max_price` currency.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidQuantity`] or
    /// [`MarketError::InvalidPrice`] for malformed parameters, or a ledger
    /// error if the agent is unknown or lacks available currency.
    pub fn submit_request(
        &mut self,
        ledger: &mut Ledger,
        cycle: u64,
        agent: &AgentId,
        good: &GoodName,
        quantity: u32,
        max_price: Decimal,
    ) -> Result<RequestId, MarketError> {
        require_quantity(quantity, "request quantity")?;
        require_price(max_price)?;
        let id = self.next_request_id;
        let next = id.next().ok_or_else(|| overflow("request id sequence"))?;
        let reserve = order_value(quantity, max_price)?;

        ledger.reserve_funds(agent, reserve)?;

        self.requests.insert(
            id,
            Request {
                id,
                agent: agent.clone(),
                good: good.clone(),
                quantity,
                remaining: quantity,
                max_price,
                created_cycle: cycle,
                status: OrderStatus::Open,
            },
        );
        self.next_request_id = next;

        debug!(
            cycle,
            request_id = %id,
            agent = %agent,
            good = %good,
            quantity,
            max_price = %max_price,
            "Request placed"
        );
        Ok(id)
    }

    /// Withdraw an own offer and release its remaining reservation.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::UnknownOrder`] if the offer is not live or
    /// [`MarketError::NotOrderOwner`] if it belongs to someone else.
    pub fn cancel_offer(
        &mut self,
        ledger: &mut Ledger,
        agent: &AgentId,
        offer_id: OfferId,
    ) -> Result<OrderUpdate, MarketError> {
        let offer = self.offers.get(&offer_id).ok_or(MarketError::UnknownOrder {
            kind: OrderKind::Offer,
            order_id: offer_id.value(),
        })?;
        if offer.agent != *agent {
            return Err(MarketError::NotOrderOwner {
                agent: agent.clone(),
                kind: OrderKind::Offer,
                order_id: offer_id.value(),
            });
        }
        self.close_offer(ledger, offer_id, OrderStatus::Cancelled)
    }

    /// Withdraw an own request and release its remaining reservation.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::UnknownOrder`] if the request is not live or
    /// [`MarketError::NotOrderOwner`] if it belongs to someone else.
    pub fn cancel_request(
        &mut self,
        ledger: &mut Ledger,
        agent: &AgentId,
        request_id: RequestId,
    ) -> Result<OrderUpdate, MarketError> {
        let request = self
            .requests
            .get(&request_id)
            .ok_or(MarketError::UnknownOrder {
                kind: OrderKind::Request,
                order_id: request_id.value(),
            })?;
        if request.agent != *agent {
            return Err(MarketError::NotOrderOwner {
                agent: agent.clone(),
                kind: OrderKind::Request,
                order_id: request_id.value(),
            });
        }
        self.close_request(ledger, request_id, OrderStatus::Cancelled)
    }

    /// Cancel every live order of `agent` (used when it becomes inactive).
    ///
    /// # Errors
    ///
    /// Returns a ledger error if a reservation cannot be released.
    pub fn cancel_all_for(
        &mut self,
        ledger: &mut Ledger,
        agent: &AgentId,
    ) -> Result<Vec<OrderUpdate>, MarketError> {
        let offer_ids: Vec<OfferId> = self
            .offers
            .values()
            .filter(|o| o.agent == *agent)
            .map(|o| o.id)
            .collect();
        let request_ids: Vec<RequestId> = self
            .requests
            .values()
            .filter(|r| r.agent == *agent)
            .map(|r| r.id)
            .collect();

        let mut updates = Vec::with_capacity(offer_ids.len().saturating_add(request_ids.len()));
        for id in offer_ids {
            updates.push(self.close_offer(ledger, id, OrderStatus::Cancelled)?);
        }
        for id in request_ids {
            updates.push(self.close_request(ledger, id, OrderStatus::Cancelled)?);
        }
        Ok(updates)
    }

    /// Expire every live order placed at least `window` cycles before
    /// `cycle`, releasing its remaining reservation.
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
        let offer_ids: Vec<OfferId> = self
            .offers
            .values()
            .filter(|o| aged(o.created_cycle))
            .map(|o| o.id)
            .collect();
        let request_ids: Vec<RequestId> = self
            .requests
            .values()
            .filter(|r| aged(r.created_cycle))
            .map(|r| r.id)
            .collect();

        let mut updates = Vec::with_capacity(offer_ids.len().saturating_add(request_ids.len()));
        for id in offer_ids {
            updates.push(self.close_offer(ledger, id, OrderStatus::Expired)?);
        }
        for id in request_ids {
            updates.push(self.close_request(ledger, id, OrderStatus::Expired)?);
        }
        for update in &updates {
            debug!(
                cycle,
                kind = ?update.kind,
                order_id = update.order_id,
                agent = %update.agent,
                remaining = update.remaining,
                "Order expired"
            );
        }
        Ok(updates)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Buy `quantity` units directly from an offer at its asking price.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::UnknownOrder`] if the offer is not live,
    /// [`MarketError::SelfDealing`] if the buyer owns it,
    /// [`LedgerError::InsufficientGoods`] if it has fewer units left, or
    /// [`LedgerError::InsufficientFunds`] if the buyer cannot pay.
    pub fn accept_offer(
        &mut self,
        ledger: &mut Ledger,
        policy: &ClearingPolicy,
        cycle: u64,
        buyer: &AgentId,
        offer_id: OfferId,
        quantity: u32,
    ) -> Result<MatchOutcome, MarketError> {
        require_quantity(quantity, "accepted quantity")?;
        let offer = self.offers.get(&offer_id).ok_or(MarketError::UnknownOrder {
            kind: OrderKind::Offer,
            order_id: offer_id.value(),
        })?;
        if offer.agent == *buyer {
            return Err(MarketError::SelfDealing {
                agent: buyer.clone(),
            });
        }
        if quantity > offer.remaining {
            return Err(LedgerError::InsufficientGoods {
                agent: offer.agent.clone(),
                good: offer.good.clone(),
                requested: quantity,
                available: offer.remaining,
            }
            .into());
        }

        let gross = order_value(quantity, offer.price)?;
        let fee = policy.fee_for(gross)?;
        let settlement = Settlement::goods(
            cycle,
            TransactionKind::Accepted,
            offer.agent.clone(),
            buyer.clone(),
            offer.good.clone(),
            quantity,
            offer.price,
        )
        .with_fee(fee, policy.facilitator.clone())
        .from_reservations(quantity, Decimal::ZERO);

        let tx = ledger.settle(&settlement)?;
        let update = self.fill_offer(offer_id, quantity)?;
        Ok(MatchOutcome {
            transactions: vec![tx],
            updates: vec![update],
        })
    }

    /// Sell `quantity` units directly into a request at its maximum price.
    ///
    /// The seller delivers from unreserved inventory. The buyer pays out of
    /// the currency the request already reserved, and the usual fee comes
    /// out of the seller's proceeds.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::UnknownOrder`] if the request is not live,
    /// [`MarketError::SelfDealing`] if the seller owns it,
    /// [`MarketError::InvalidQuantity`] if it wants fewer units, or
    /// [`LedgerError::InsufficientGoods`] if the seller lacks them.
    pub fn accept_request(
        &mut self,
        ledger: &mut Ledger,
        policy: &ClearingPolicy,
        cycle: u64,
        seller: &AgentId,
        request_id: RequestId,
        quantity: u32,
    ) -> Result<MatchOutcome, MarketError> {
        require_quantity(quantity, "accepted quantity")?;
        let request = self
            .requests
            .get(&request_id)
            .ok_or(MarketError::UnknownOrder {
                kind: OrderKind::Request,
                order_id: request_id.value(),
            })?;
        if request.agent == *seller {
            return Err(MarketError::SelfDealing {
                agent: seller.clone(),
            });
        }
        if quantity > request.remaining {
            return Err(MarketError::InvalidQuantity {
                context: format!(
                    "request {} wants {} more, offered {quantity}",
                    request_id.value(),
                    request.remaining
                ),
            });
        }

        let gross = order_value(quantity, request.max_price)?;
        let fee = policy.fee_for(gross)?;
        let settlement = Settlement::goods(
            cycle,
            TransactionKind::Accepted,
            seller.clone(),
            request.agent.clone(),
            request.good.clone(),
            quantity,
            request.max_price,
        )
        .with_fee(fee, policy.facilitator.clone())
        .from_reservations(0, gross);

        let tx = ledger.settle(&settlement)?;
        let update = self.fill_request(request_id, quantity)?;
        Ok(MatchOutcome {
            transactions: vec![tx],
            updates: vec![update],
        })
    }

    /// Match every good that has live offers, in good-name order.
    ///
    /// # Errors
    ///
    /// Returns an error only if settlement of a reserved match fails,
    /// which indicates inconsistent state.
    pub fn match_all(
        &mut self,
        ledger: &mut Ledger,
        policy: &ClearingPolicy,
        cycle: u64,
    ) -> Result<MatchOutcome, MarketError> {
        let mut outcome = MatchOutcome::default();
        for good in self.offered_goods() {
            outcome.absorb(self.match_good(ledger, policy, cycle, &good)?);
        }
        Ok(outcome)
    }

    /// Match offers and requests for one good.
    ///
    /// # Errors
    ///
    /// Returns an error only if settlement of a reserved match fails,
    /// which indicates inconsistent state.
    pub fn match_good(
        &mut self,
        ledger: &mut Ledger,
        policy: &ClearingPolicy,
        cycle: u64,
        good: &GoodName,
    ) -> Result<MatchOutcome, MarketError> {
        let mut offer_order: Vec<(Decimal, u64, AgentId, OfferId)> = self
            .offers
            .values()
            .filter(|o| o.good == *good)
            .map(|o| (o.price, o.created_cycle, o.agent.clone(), o.id))
            .collect();
        offer_order.sort();

        let mut request_order: Vec<(Reverse<Decimal>, u64, AgentId, RequestId)> = self
            .requests
            .values()
            .filter(|r| r.good == *good)
            .map(|r| (Reverse(r.max_price), r.created_cycle, r.agent.clone(), r.id))
            .collect();
        request_order.sort();

        let mut outcome = MatchOutcome::default();

        for &(_, _, _, request_id) in &request_order {
            for &(_, _, _, offer_id) in &offer_order {
                let Some(request) = self.requests.get(&request_id) else {
                    break;
                };
                let Some(offer) = self.offers.get(&offer_id) else {
                    continue;
                };
                if offer.price > request.max_price {
                    break;
                }
                if offer.agent == request.agent {
                    continue;
                }

                let quantity = offer.remaining.min(request.remaining);
                let price = policy.clearing_price(offer.price, request.max_price)?;
                let gross = order_value(quantity, price)?;
                let fee = policy.fee_for(gross)?;
                let released = order_value(quantity, request.max_price)?;
                let settlement = Settlement::goods(
                    cycle,
                    TransactionKind::Matched,
                    offer.agent.clone(),
                    request.agent.clone(),
                    good.clone(),
                    quantity,
                    price,
                )
                .with_fee(fee, policy.facilitator.clone())
                .from_reservations(quantity, released);

                let tx = ledger.settle(&settlement)?;
                outcome.transactions.push(tx);
                outcome.updates.push(self.fill_offer(offer_id, quantity)?);
                outcome.updates.push(self.fill_request(request_id, quantity)?);
            }
        }

        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Internal bookkeeping
    // -----------------------------------------------------------------------

    fn fill_offer(&mut self, id: OfferId, quantity: u32) -> Result<OrderUpdate, MarketError> {
        let offer = self.offers.get_mut(&id).ok_or(MarketError::UnknownOrder {
            kind: OrderKind::Offer,
            order_id: id.value(),
        })?;
        offer.remaining = offer
            .remaining
            .checked_sub(quantity)
            .ok_or_else(|| overflow("offer fill"))?;
        offer.status = OrderStatus::after_fill(offer.remaining);
        let update = offer_update(offer);
        if offer.status.is_terminal() {
            self.offers.remove(&id);
        }
        Ok(update)
    }

    fn fill_request(&mut self, id: RequestId, quantity: u32) -> Result<OrderUpdate, MarketError> {
        let request = self.requests.get_mut(&id).ok_or(MarketError::UnknownOrder {
            kind: OrderKind::Request,
            order_id: id.value(),
        })?;
        request.remaining = request
            .remaining
            .checked_sub(quantity)
            .ok_or_else(|| overflow("request fill"))?;
        request.status = OrderStatus::after_fill(request.remaining);
        let update = request_update(request);
        if request.status.is_terminal() {
            self.requests.remove(&id);
        }
        Ok(update)
    }

    fn close_offer(
        &mut self,
        ledger: &mut Ledger,
        id: OfferId,
        status: OrderStatus,
    ) -> Result<OrderUpdate, MarketError> {
        let offer = self.offers.get(&id).ok_or(MarketError::UnknownOrder {
            kind: OrderKind::Offer,
            order_id: id.value(),
        })?;
        ledger.release_goods(&offer.agent, &offer.good, offer.remaining)?;
        let mut offer = self.offers.remove(&id).ok_or(MarketError::UnknownOrder {
            kind: OrderKind::Offer,
            order_id: id.value(),
        })?;
        offer.status = status;
        Ok(offer_update(&offer))
    }

    fn close_request(
        &mut self,
        ledger: &mut Ledger,
        id: RequestId,
        status: OrderStatus,
    ) -> Result<OrderUpdate, MarketError> {
        let request = self.requests.get(&id).ok_or(MarketError::UnknownOrder {
            kind: OrderKind::Request,
            order_id: id.value(),
        })?;
        let reserved = order_value(request.remaining, request.max_price)?;
        ledger.release_funds(&request.agent, reserved)?;
        let mut request = self.requests.remove(&id).ok_or(MarketError::UnknownOrder {
            kind: OrderKind::Request,
            order_id: id.value(),
        })?;
        request.status = status;
        Ok(request_update(&request))
    }
}

fn offer_update(offer: &Offer) -> OrderUpdate {
    OrderUpdate {
        kind: OrderKind::Offer,
        order_id: offer.id.value(),
        agent: offer.agent.clone(),
        remaining: offer.remaining,
        status: offer.status,
    }
}

fn request_update(request: &Request) -> OrderUpdate {
    OrderUpdate {
        kind: OrderKind::Request,
        order_id: request.id.value(),
        agent: request.agent.clone(),
        remaining: request.remaining,
        status: request.status,
    }
}

pub(crate) fn require_quantity(quantity: u32, context: &str) -> Result<(), MarketError> {
    if quantity == 0 {
        return Err(MarketError::InvalidQuantity {
            context: format!("{context} must be positive"),
        });
    }
    Ok(())
}

pub(crate) fn require_price(price: Decimal) -> Result<(), MarketError> {
    if price <= Decimal::ZERO {
        return Err(MarketError::InvalidPrice { price });
    }
    Ok(())
}
