//! Enumeration types shared across the economy crates.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Lifecycle status shared by offers, requests, labor offers, and labor
/// demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted into the book, nothing filled yet.
    Open,
    /// Some but not all of the quantity has been filled.
    PartiallyFilled,
    /// The full quantity has been filled.
    Filled,
    /// Withdrawn by its owner or cancelled on deactivation.
    Cancelled,
    /// Aged out of the book after the configured expiry window.
    Expired,
}

impl OrderStatus {
    /// Returns `true` for statuses that never change again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Expired)
    }

    /// Status after a fill that leaves `remaining` units unfilled.
    pub const fn after_fill(remaining: u32) -> Self {
        if remaining == 0 {
            Self::Filled
        } else {
            Self::PartiallyFilled
        }
    }
}

/// Which book an order lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// A sell offer for goods.
    Offer,
    /// A buy request for goods.
    Request,
    /// A worker's offer of labor hours.
    LaborOffer,
    /// An employer's demand for labor hours.
    LaborDemand,
}

/// Rule used to pick the execution price of a compatible offer/request pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearingRule {
    /// Split the surplus evenly: halfway between ask and bid.
    #[default]
    Midpoint,
    /// Execute at the seller's asking price.
    OfferPrice,
    /// Execute at the buyer's maximum price.
    RequestPrice,
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// How a transaction came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Produced by the per-cycle order book matching.
    Matched,
    /// A specific offer or request was taken directly at its posted price.
    Accepted,
    /// A labor hire, cleared or taken directly from a labor offer.
    Labor,
}

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

/// Kind tag of an action-intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// Create goods from the agent's production capacity.
    Produce,
    /// Place a sell offer.
    SubmitOffer,
    /// Place a buy request.
    SubmitRequest,
    /// Buy directly from a specific offer at its asking price.
    BuyAccept,
    /// Sell directly into a specific request at its maximum price.
    SellAccept,
    /// Offer labor hours at an asking wage.
    SubmitLaborOffer,
    /// Demand labor hours up to a maximum wage.
    SubmitLaborDemand,
    /// Hire directly from a specific labor offer at its asking wage.
    HireAccept,
    /// Consume goods from inventory.
    Consume,
    /// Withdraw one of the agent's own offers.
    CancelOffer,
    /// Withdraw one of the agent's own requests.
    CancelRequest,
}

/// Why an intent was rejected.
///
/// Carried in the cycle report so the decision layer can react without
/// parsing error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The agent's available currency does not cover the intent.
    InsufficientFunds,
    /// The agent's available goods do not cover the intent.
    InsufficientGoods,
    /// The acting or referenced agent does not exist.
    UnknownAgent,
    /// The referenced good has never been seeded or traded.
    UnknownGood,
    /// The referenced offer or request is not open.
    UnknownOrder,
    /// The referenced order belongs to another agent.
    NotOrderOwner,
    /// The acting agent has been marked inactive.
    InactiveAgent,
    /// Production or labor capacity for this cycle is exhausted.
    CapacityExceeded,
    /// Malformed parameters (non-positive quantity or price, self-trade).
    InvalidIntent,
}

/// Outcome of the end-of-cycle conservation audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum AuditVerdict {
    /// Currency was conserved and goods changed only through production
    /// and consumption.
    Balanced,
    /// Totals drifted; the message describes the imbalance.
    Anomaly {
        /// Human-readable description of the imbalance.
        message: String,
    },
}
