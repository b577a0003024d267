//! Core record types: agents, goods, orders, hires, and transactions.
//!
//! These are plain data. Every mutation of an [`Agent`] goes through the
//! ledger; orders are owned by the order book and labor market.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{OrderStatus, TransactionKind};
use crate::ids::{
    AgentId, GoodName, HireId, LaborDemandId, LaborOfferId, OfferId, RequestId, Role,
    TransactionId,
};

/// Name of the conceptual good that labor transactions are recorded under.
pub const LABOR_GOOD: &str = "labor";

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// An economic actor.
///
/// Agents are never removed. An agent whose health reaches zero is marked
/// inactive so that historical transactions keep resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identifier.
    pub id: AgentId,
    /// Role tag.
    pub role: Role,
    /// Currency held, including any reserved portion.
    pub currency: Decimal,
    /// Currency held against open requests and labor demands.
    pub reserved_currency: Decimal,
    /// Goods held, including any reserved portion.
    pub goods: BTreeMap<GoodName, u32>,
    /// Goods held against open offers.
    pub reserved_goods: BTreeMap<GoodName, u32>,
    /// Health in `0..=max_health`.
    pub health: u32,
    /// Whether the agent still takes part in the economy.
    pub active: bool,
    /// Labor hours the agent may commit per cycle.
    pub labor_capacity_hours: u32,
}

impl Agent {
    /// Create an active agent with no goods and no reservations.
    pub fn new(id: AgentId, role: Role, currency: Decimal, health: u32) -> Self {
        Self {
            id,
            role,
            currency,
            reserved_currency: Decimal::ZERO,
            goods: BTreeMap::new(),
            reserved_goods: BTreeMap::new(),
            health,
            active: true,
            labor_capacity_hours: 0,
        }
    }

    /// Builder-style helper setting a starting inventory entry.
    #[must_use]
    pub fn with_goods(mut self, good: GoodName, quantity: u32) -> Self {
        if quantity > 0 {
            self.goods.insert(good, quantity);
        }
        self
    }

    /// Builder-style helper setting the per-cycle labor capacity.
    #[must_use]
    pub const fn with_labor_capacity(mut self, hours: u32) -> Self {
        self.labor_capacity_hours = hours;
        self
    }

    /// Quantity of `good` held, reserved or not.
    pub fn goods_held(&self, good: &GoodName) -> u32 {
        self.goods.get(good).copied().unwrap_or(0)
    }

    /// Quantity of `good` reserved against open offers.
    pub fn goods_reserved(&self, good: &GoodName) -> u32 {
        self.reserved_goods.get(good).copied().unwrap_or(0)
    }

    /// Quantity of `good` free to offer, transfer, or consume.
    pub fn goods_available(&self, good: &GoodName) -> u32 {
        self.goods_held(good).saturating_sub(self.goods_reserved(good))
    }

    /// Currency free to spend or reserve.
    pub fn currency_available(&self) -> Decimal {
        self.currency
            .checked_sub(self.reserved_currency)
            .filter(|v| !v.is_sign_negative())
            .unwrap_or(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Goods
// ---------------------------------------------------------------------------

/// A tradable good and its published reference price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Good {
    /// Name of the good.
    pub name: GoodName,
    /// Current reference price (always positive).
    pub reference_price: Decimal,
}

// ---------------------------------------------------------------------------
// Goods orders
// ---------------------------------------------------------------------------

/// A sell-side order for goods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Order id.
    pub id: OfferId,
    /// Selling agent.
    pub agent: AgentId,
    /// Good offered.
    pub good: GoodName,
    /// Quantity originally offered.
    pub quantity: u32,
    /// Quantity not yet filled.
    pub remaining: u32,
    /// Asking unit price.
    pub price: Decimal,
    /// Cycle the offer was placed in.
    pub created_cycle: u64,
    /// Lifecycle status.
    pub status: OrderStatus,
}

/// A buy-side order for goods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Order id.
    pub id: RequestId,
    /// Buying agent.
    pub agent: AgentId,
    /// Good requested.
    pub good: GoodName,
    /// Quantity originally requested.
    pub quantity: u32,
    /// Quantity not yet filled.
    pub remaining: u32,
    /// Maximum unit price the buyer will pay.
    pub max_price: Decimal,
    /// Cycle the request was placed in.
    pub created_cycle: u64,
    /// Lifecycle status.
    pub status: OrderStatus,
}

// ---------------------------------------------------------------------------
// Labor
// ---------------------------------------------------------------------------

/// A worker's offer to sell labor hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaborOffer {
    /// Order id.
    pub id: LaborOfferId,
    /// Offering worker.
    pub worker: AgentId,
    /// Hours originally offered.
    pub hours: u32,
    /// Hours not yet hired.
    pub remaining_hours: u32,
    /// Asking wage per hour.
    pub wage: Decimal,
    /// Cycle the offer was placed in.
    pub created_cycle: u64,
    /// Lifecycle status.
    pub status: OrderStatus,
}

/// An employer's demand for labor hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaborDemand {
    /// Order id.
    pub id: LaborDemandId,
    /// Hiring employer.
    pub employer: AgentId,
    /// Hours originally demanded.
    pub hours: u32,
    /// Hours not yet hired.
    pub remaining_hours: u32,
    /// Maximum wage per hour.
    pub max_wage: Decimal,
    /// Cycle the demand was placed in.
    pub created_cycle: u64,
    /// Lifecycle status.
    pub status: OrderStatus,
}

/// A cleared labor match. Hires only boost production in their own cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaborHire {
    /// Hire id.
    pub id: HireId,
    /// Paying employer.
    pub employer: AgentId,
    /// Paid worker.
    pub worker: AgentId,
    /// Hours hired.
    pub hours: u32,
    /// Wage per hour.
    pub wage: Decimal,
    /// Cycle of the hire.
    pub cycle: u64,
    /// Ledger transaction recording the wage payment.
    pub transaction_id: TransactionId,
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// An immutable, committed exchange recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sequential id assigned at commit.
    pub id: TransactionId,
    /// Cycle of the commit.
    pub cycle: u64,
    /// How the exchange came about.
    pub kind: TransactionKind,
    /// Agent delivering the goods (or labor).
    pub seller: AgentId,
    /// Agent paying for the goods (or labor).
    pub buyer: AgentId,
    /// Good exchanged; [`LABOR_GOOD`] for hires.
    pub good: GoodName,
    /// Units (or hours) exchanged.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Decimal,
    /// Fee taken from the seller's proceeds by the market facilitator.
    pub fee: Decimal,
}

impl Transaction {
    /// Total paid by the buyer, or `None` on overflow.
    pub fn gross(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }

    /// Amount received by the seller after the fee, or `None` on overflow.
    pub fn net_to_seller(&self) -> Option<Decimal> {
        self.gross()?.checked_sub(self.fee)
    }

    /// Returns `true` for labor hires.
    pub fn is_labor(&self) -> bool {
        self.kind == TransactionKind::Labor
    }
}
