//! Authoritative ledger for the Microtrade economy.
//!
//! The ledger owns every [`Agent`] record (currency, goods, reservations,
//! health) and the append-only [`Transaction`] log. No other component
//! edits agent fields directly.
//!
//! # Architecture
//!
//! - [`ledger`] -- The [`Ledger`] struct: agent accounts, reservations,
//!   atomic settlement, and the transaction log.
//! - [`transaction`] -- The [`TransactionBuilder`] for validated records.
//! - [`conservation`] -- Economy-wide totals and the conservation audit.
//!
//! # Conservation Law
//!
//! Between two points in time:
//!
//! ```text
//! total_currency(after) == total_currency(before)
//! total_goods(g, after) == total_goods(g, before) + produced(g) - consumed(g)
//! ```
//!
//! Fees are transfers to the facilitator, not a sink, so currency is
//! conserved exactly. The ledger never panics; it returns errors.
//!
//! # Usage
//!
//! ```
//! use microtrade_ledger::{Ledger, Settlement};
//! use microtrade_types::{Agent, AgentId, GoodName, Role, TransactionKind};
//! use rust_decimal::Decimal;
//!
//! let food = GoodName::from("food");
//! let mut ledger = Ledger::new(100);
//! let seller = Agent::new(AgentId::from("a"), Role::from("producer"), Decimal::ZERO, 100)
//!     .with_goods(food.clone(), 5);
//! let buyer = Agent::new(AgentId::from("b"), Role::from("consumer"), Decimal::new(10, 0), 100);
//! ledger.open_account(seller).ok();
//! ledger.open_account(buyer).ok();
//!
//! let tx = ledger.settle(&Settlement::goods(
//!     1,
//!     TransactionKind::Accepted,
//!     AgentId::from("a"),
//!     AgentId::from("b"),
//!     food,
//!     2,
//!     Decimal::new(2, 0),
//! ));
//! assert!(tx.is_ok());
//! ```

pub mod conservation;
pub mod ledger;
pub mod transaction;

// Re-export primary types at crate root.
pub use conservation::{ConservationResult, EconomyTotals};
pub use ledger::{Ledger, Settlement};
pub use transaction::TransactionBuilder;

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use microtrade_types::{Agent, AgentId, GoodName, RejectionReason, Transaction};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when mutating the ledger.
///
/// Every error is raised before the first mutation of the failing
/// operation, so a returned error always leaves the ledger unchanged.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The referenced agent has no account.
    #[error("unknown agent: {agent}")]
    UnknownAgent {
        /// The missing agent id.
        agent: AgentId,
    },

    /// An account with this id already exists.
    #[error("agent {agent} already has an account")]
    DuplicateAgent {
        /// The duplicated agent id.
        agent: AgentId,
    },

    /// The agent's unreserved goods do not cover the operation.
    #[error("agent {agent} has {available} {good} available, needs {requested}")]
    InsufficientGoods {
        /// The agent lacking goods.
        agent: AgentId,
        /// The good in question.
        good: GoodName,
        /// Quantity the operation needs.
        requested: u32,
        /// Quantity available (held minus reserved).
        available: u32,
    },

    /// The agent's unreserved currency does not cover the operation.
    #[error("agent {agent} has {available} currency available, needs {requested}")]
    InsufficientFunds {
        /// The agent lacking currency.
        agent: AgentId,
        /// Amount the operation needs.
        requested: Decimal,
        /// Amount available (held minus reserved).
        available: Decimal,
    },

    /// A release exceeded what is currently reserved.
    #[error("agent {agent} reservation underflow: {context}")]
    ReservationUnderflow {
        /// The agent whose reservation would go negative.
        agent: AgentId,
        /// What was being released.
        context: String,
    },

    /// A quantity, price, or amount was zero or negative.
    #[error("invalid amount: {context}")]
    InvalidAmount {
        /// Which value was invalid.
        context: String,
    },

    /// Buyer and seller are the same agent.
    #[error("agent {agent} cannot trade with itself")]
    SelfTrade {
        /// The agent on both sides.
        agent: AgentId,
    },

    /// A fee was requested but no facilitator was named.
    #[error("fee of {fee} charged without a facilitator")]
    MissingFacilitator {
        /// The orphaned fee.
        fee: Decimal,
    },

    /// A required field was not set on the builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Arithmetic overflow in a balance computation.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Which computation overflowed.
        context: String,
    },
}

impl LedgerError {
    /// Map this error to the rejection reason reported for an intent.
    pub const fn rejection_reason(&self) -> RejectionReason {
        match self {
            Self::UnknownAgent { .. } => RejectionReason::UnknownAgent,
            Self::InsufficientGoods { .. } => RejectionReason::InsufficientGoods,
            Self::InsufficientFunds { .. } => RejectionReason::InsufficientFunds,
            Self::DuplicateAgent { .. }
            | Self::ReservationUnderflow { .. }
            | Self::InvalidAmount { .. }
            | Self::SelfTrade { .. }
            | Self::MissingFacilitator { .. }
            | Self::MissingField(_)
            | Self::ArithmeticOverflow { .. } => RejectionReason::InvalidIntent,
        }
    }
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A conservation law violation detected by the end-of-cycle audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAnomaly {
    /// The cycle where the anomaly was detected.
    pub cycle: u64,
    /// Total currency (before, after) if it drifted.
    pub currency: Option<(Decimal, Decimal)>,
    /// Per-good (expected, actual) totals for goods that drifted.
    pub goods: BTreeMap<GoodName, (i128, i128)>,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for LedgerAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Look up an agent in a map, mapping absence to [`LedgerError::UnknownAgent`].
pub(crate) fn lookup<'a>(
    agents: &'a BTreeMap<AgentId, Agent>,
    id: &AgentId,
) -> Result<&'a Agent, LedgerError> {
    agents
        .get(id)
        .ok_or_else(|| LedgerError::UnknownAgent { agent: id.clone() })
}

/// Returns `true` if every id in `transactions` is strictly increasing and
/// below `next`.
pub fn transaction_ids_monotonic(
    transactions: &[Transaction],
    next: microtrade_types::TransactionId,
) -> bool {
    let ordered = transactions
        .windows(2)
        .all(|pair| matches!(pair, [a, b] if a.id < b.id));
    let bounded = transactions.last().is_none_or(|last| last.id < next);
    ordered && bounded
}
