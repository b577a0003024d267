//! Snapshot and restore of the full economy state.
//!
//! A snapshot is taken at a committed cycle boundary and holds everything
//! needed to resume: the ledger with its transaction log, both books with
//! their id counters, reference prices, and the cycle clock. Intents that
//! were collected but not yet applied are never part of a snapshot.
//!
//! Restoring runs [`verify_state`] first. A snapshot whose pieces disagree
//! (a reservation with no backing order, an order owned by an unknown
//! agent, an id counter behind an issued id) is refused rather than
//! resumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use microtrade_market::Reservations;
use microtrade_types::{AgentId, GoodName, LABOR_GOOD, OrderStatus};

use crate::state::EconomyState;

/// Snapshot format written by this version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Errors from snapshot encoding, decoding, and integrity checks.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The snapshot decoded but its contents are inconsistent.
    #[error("corrupt state: {reason}")]
    CorruptState {
        /// Every integrity problem found, joined.
        reason: String,
    },

    /// The snapshot was written by an incompatible format version.
    #[error("unsupported snapshot format version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the snapshot.
        found: u32,
        /// Version this build reads.
        supported: u32,
    },

    /// JSON encoding or decoding failed.
    #[error("snapshot JSON error: {source}")]
    Json {
        /// The underlying `serde_json` error.
        #[from]
        source: serde_json::Error,
    },
}

/// A persisted economy state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomySnapshot {
    /// Format version the snapshot was written with.
    pub format_version: u32,
    /// Wall-clock time the snapshot was taken.
    pub saved_at: DateTime<Utc>,
    /// The economy state at a committed cycle boundary.
    pub state: EconomyState,
}

impl EconomySnapshot {
    /// Cycle the snapshot was taken at.
    pub const fn cycle(&self) -> u64 {
        self.state.cycle()
    }
}

/// Capture `state` as a snapshot.
pub fn snapshot(state: &EconomyState) -> EconomySnapshot {
    EconomySnapshot {
        format_version: SNAPSHOT_FORMAT_VERSION,
        saved_at: Utc::now(),
        state: state.clone(),
    }
}

/// Verify a snapshot and return its state.
///
/// # Errors
///
/// Returns [`PersistenceError::UnsupportedVersion`] for a foreign format
/// or [`PersistenceError::CorruptState`] if [`verify_state`] fails.
pub fn restore(snapshot: EconomySnapshot) -> Result<EconomyState, PersistenceError> {
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: snapshot.format_version,
            supported: SNAPSHOT_FORMAT_VERSION,
        });
    }
    verify_state(&snapshot.state)?;
    debug!(cycle = snapshot.cycle(), saved_at = %snapshot.saved_at, "Snapshot restored");
    Ok(snapshot.state)
}

/// Encode a snapshot as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`PersistenceError::Json`] if encoding fails.
pub fn to_json(snapshot: &EconomySnapshot) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// Decode a snapshot from JSON. The contents are not verified until
/// [`restore`].
///
/// # Errors
///
/// Returns [`PersistenceError::Json`] if decoding fails.
pub fn from_json(json: &str) -> Result<EconomySnapshot, PersistenceError> {
    Ok(serde_json::from_str(json)?)
}

/// Check the referential integrity of a state.
///
/// # Errors
///
/// Returns [`PersistenceError::CorruptState`] listing every problem found.
pub fn verify_state(state: &EconomyState) -> Result<(), PersistenceError> {
    let mut problems = Vec::new();
    check_agents(state, &mut problems);
    check_transactions(state, &mut problems);
    check_orders(state, &mut problems);
    check_reservations(state, &mut problems);
    check_prices(state, &mut problems);

    if problems.is_empty() {
        return Ok(());
    }
    for problem in &problems {
        warn!(cycle = state.cycle(), problem = %problem, "Snapshot integrity check failed");
    }
    Err(PersistenceError::CorruptState {
        reason: problems.join("; "),
    })
}

// ---------------------------------------------------------------------------
// Integrity checks
// ---------------------------------------------------------------------------

fn knows_agent(state: &EconomyState, agent: &AgentId) -> bool {
    state.ledger.agent(agent).is_some()
}

fn knows_good(state: &EconomyState, good: &GoodName) -> bool {
    state.prices.contains(good)
}

fn check_agents(state: &EconomyState, problems: &mut Vec<String>) {
    let max_health = state.ledger.max_health();
    for (key, agent) in state.ledger.agents() {
        if *key != agent.id {
            problems.push(format!("agent keyed {key} has id {}", agent.id));
        }
        if agent.currency.is_sign_negative() {
            problems.push(format!("agent {key} has negative currency"));
        }
        if agent.reserved_currency.is_sign_negative() || agent.reserved_currency > agent.currency {
            problems.push(format!("agent {key} reserves more currency than it holds"));
        }
        if agent.health > max_health {
            problems.push(format!("agent {key} health {} exceeds {max_health}", agent.health));
        }
        for good in agent.goods.keys() {
            if !knows_good(state, good) {
                problems.push(format!("agent {key} holds unknown good {good}"));
            }
        }
        for (good, &reserved) in &agent.reserved_goods {
            if reserved > agent.goods_held(good) {
                problems.push(format!("agent {key} reserves more {good} than it holds"));
            }
        }
    }
}

fn check_transactions(state: &EconomyState, problems: &mut Vec<String>) {
    let next = state.ledger.next_transaction_id();
    let mut previous = None;
    for tx in state.ledger.transactions() {
        if previous.is_some_and(|prev| tx.id <= prev) {
            problems.push(format!("transaction {} is out of order", tx.id.value()));
        }
        previous = Some(tx.id);
        if tx.id >= next {
            problems.push(format!(
                "transaction {} not below next id {}",
                tx.id.value(),
                next.value()
            ));
        }
        if tx.cycle > state.cycle() {
            problems.push(format!("transaction {} is from a future cycle", tx.id.value()));
        }
        for party in [&tx.seller, &tx.buyer] {
            if !knows_agent(state, party) {
                problems.push(format!(
                    "transaction {} references unknown agent {party}",
                    tx.id.value()
                ));
            }
        }
        let good_known = if tx.is_labor() {
            tx.good.as_str() == LABOR_GOOD
        } else {
            knows_good(state, &tx.good)
        };
        if !good_known {
            problems.push(format!(
                "transaction {} references unknown good {}",
                tx.id.value(),
                tx.good
            ));
        }
    }
}

/// Fields shared by every order kind.
struct OrderFacts<'a> {
    label: String,
    key_matches: bool,
    below_next: bool,
    owner: &'a AgentId,
    good: Option<&'a GoodName>,
    quantity: u32,
    remaining: u32,
    status: OrderStatus,
    created_cycle: u64,
}

fn check_order(state: &EconomyState, order: &OrderFacts<'_>, problems: &mut Vec<String>) {
    let label = &order.label;
    if !order.key_matches {
        problems.push(format!("{label} is stored under another id"));
    }
    if !order.below_next {
        problems.push(format!("{label} is not below its book's next id"));
    }
    match state.ledger.agent(order.owner) {
        None => problems.push(format!("{label} owned by unknown agent {}", order.owner)),
        Some(owner) if !owner.active => {
            problems.push(format!("{label} owned by inactive agent {}", order.owner));
        }
        Some(_) => {}
    }
    if let Some(good) = order.good
        && !knows_good(state, good)
    {
        problems.push(format!("{label} references unknown good {good}"));
    }
    if order.status.is_terminal() {
        problems.push(format!("{label} is {:?} but still in its book", order.status));
    }
    if order.remaining == 0 || order.remaining > order.quantity {
        problems.push(format!(
            "{label} has remaining {} of {}",
            order.remaining, order.quantity
        ));
    }
    if order.created_cycle > state.cycle() {
        problems.push(format!("{label} is from a future cycle"));
    }
}

fn check_orders(state: &EconomyState, problems: &mut Vec<String>) {
    let book = &state.order_book;
    for (key, offer) in book.offers() {
        let facts = OrderFacts {
            label: format!("offer {}", offer.id.value()),
            key_matches: *key == offer.id,
            below_next: offer.id < book.next_offer_id(),
            owner: &offer.agent,
            good: Some(&offer.good),
            quantity: offer.quantity,
            remaining: offer.remaining,
            status: offer.status,
            created_cycle: offer.created_cycle,
        };
        check_order(state, &facts, problems);
    }
    for (key, request) in book.requests() {
        let facts = OrderFacts {
            label: format!("request {}", request.id.value()),
            key_matches: *key == request.id,
            below_next: request.id < book.next_request_id(),
            owner: &request.agent,
            good: Some(&request.good),
            quantity: request.quantity,
            remaining: request.remaining,
            status: request.status,
            created_cycle: request.created_cycle,
        };
        check_order(state, &facts, problems);
    }

    let labor = &state.labor;
    for (key, offer) in labor.offers() {
        let facts = OrderFacts {
            label: format!("labor offer {}", offer.id.value()),
            key_matches: *key == offer.id,
            below_next: offer.id < labor.next_offer_id(),
            owner: &offer.worker,
            good: None,
            quantity: offer.hours,
            remaining: offer.remaining_hours,
            status: offer.status,
            created_cycle: offer.created_cycle,
        };
        check_order(state, &facts, problems);
    }
    for (key, demand) in labor.demands() {
        let facts = OrderFacts {
            label: format!("labor demand {}", demand.id.value()),
            key_matches: *key == demand.id,
            below_next: demand.id < labor.next_demand_id(),
            owner: &demand.employer,
            good: None,
            quantity: demand.hours,
            remaining: demand.remaining_hours,
            status: demand.status,
            created_cycle: demand.created_cycle,
        };
        check_order(state, &facts, problems);
    }

    let transactions = state.ledger.transactions();
    for hire in labor.hires() {
        if hire.id >= labor.next_hire_id() {
            problems.push(format!("hire {} is not below the next hire id", hire.id.value()));
        }
        let recorded = transactions
            .binary_search_by_key(&hire.transaction_id, |tx| tx.id)
            .is_ok();
        if !recorded {
            problems.push(format!(
                "hire {} references missing transaction {}",
                hire.id.value(),
                hire.transaction_id.value()
            ));
        }
    }
}

fn check_reservations(state: &EconomyState, problems: &mut Vec<String>) {
    let mut expected = Reservations::default();
    let collected = state
        .order_book
        .collect_reservations(&mut expected)
        .and_then(|()| state.labor.collect_reservations(&mut expected));
    if let Err(e) = collected {
        problems.push(format!("reservation totals: {e}"));
        return;
    }

    for (id, agent) in state.ledger.agents() {
        let funds = expected.funds_for(id);
        if agent.reserved_currency != funds {
            problems.push(format!(
                "agent {id} reserves {} currency but its orders hold {funds}",
                agent.reserved_currency
            ));
        }
        for (good, &reserved) in &agent.reserved_goods {
            let held = expected.goods_for(id, good);
            if u64::from(reserved) != held {
                problems.push(format!(
                    "agent {id} reserves {reserved} {good} but its offers hold {held}"
                ));
            }
        }
    }
    for (id, goods) in &expected.goods {
        let Some(agent) = state.ledger.agent(id) else {
            continue;
        };
        for (good, &held) in goods {
            if held > 0 && !agent.reserved_goods.contains_key(good) {
                problems.push(format!("agent {id} has open offers of {good} with nothing reserved"));
            }
        }
    }
}

fn check_prices(state: &EconomyState, problems: &mut Vec<String>) {
    for (name, good) in state.prices.goods() {
        if *name != good.name {
            problems.push(format!("good keyed {name} is named {}", good.name));
        }
        if good.reference_price <= rust_decimal::Decimal::ZERO {
            problems.push(format!("good {name} has non-positive reference price"));
        }
    }
    if let Some(wage) = state.prices.reference_wage()
        && wage <= rust_decimal::Decimal::ZERO
    {
        problems.push(String::from("reference wage is not positive"));
    }
    if let Some(facilitator) = &state.facilitator
        && !knows_agent(state, facilitator)
    {
        problems.push(format!("facilitator {facilitator} is not an agent"));
    }
}
