//! Error types for the order book, labor market, and pricing.

use rust_decimal::Decimal;

use microtrade_ledger::LedgerError;
use microtrade_types::{AgentId, GoodName, OrderKind, RejectionReason};

/// Errors raised by market operations.
///
/// Like the ledger, every market operation validates before it mutates, so
/// an error leaves both the book and the ledger unchanged.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// A ledger check or mutation failed.
    #[error("ledger error: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },

    /// The referenced order is not open in its book.
    #[error("unknown {kind:?} {order_id}")]
    UnknownOrder {
        /// Which book was searched.
        kind: OrderKind,
        /// The raw order id.
        order_id: u64,
    },

    /// The referenced order belongs to another agent.
    #[error("agent {agent} does not own {kind:?} {order_id}")]
    NotOrderOwner {
        /// The agent attempting the operation.
        agent: AgentId,
        /// Which book the order lives in.
        kind: OrderKind,
        /// The raw order id.
        order_id: u64,
    },

    /// The good has never been seeded or traded.
    #[error("unknown good: {good}")]
    UnknownGood {
        /// The unknown good.
        good: GoodName,
    },

    /// A quantity or number of hours was zero.
    #[error("invalid quantity: {context}")]
    InvalidQuantity {
        /// Which value was invalid.
        context: String,
    },

    /// A price or wage was zero or negative.
    #[error("price must be positive, got {price}")]
    InvalidPrice {
        /// The rejected price.
        price: Decimal,
    },

    /// A buyer tried to accept its own offer.
    #[error("agent {agent} cannot buy from its own offer")]
    SelfDealing {
        /// The agent on both sides.
        agent: AgentId,
    },

    /// The worker's labor capacity for the cycle is already committed.
    #[error("agent {agent} has {available} labor hours left, asked for {requested}")]
    CapacityExceeded {
        /// The worker.
        agent: AgentId,
        /// Hours requested.
        requested: u32,
        /// Hours still uncommitted this cycle.
        available: u32,
    },

    /// A policy parameter is out of range.
    #[error("invalid market policy: {reason}")]
    InvalidPolicy {
        /// What is wrong with the policy.
        reason: String,
    },

    /// Arithmetic overflow in a market computation.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Which computation overflowed.
        context: String,
    },
}

impl MarketError {
    /// Map this error to the rejection reason reported for an intent.
    pub const fn rejection_reason(&self) -> RejectionReason {
        match self {
            Self::Ledger { source } => source.rejection_reason(),
            Self::UnknownOrder { .. } => RejectionReason::UnknownOrder,
            Self::NotOrderOwner { .. } => RejectionReason::NotOrderOwner,
            Self::UnknownGood { .. } => RejectionReason::UnknownGood,
            Self::CapacityExceeded { .. } => RejectionReason::CapacityExceeded,
            Self::InvalidQuantity { .. }
            | Self::InvalidPrice { .. }
            | Self::SelfDealing { .. }
            | Self::InvalidPolicy { .. }
            | Self::ArithmeticOverflow { .. } => RejectionReason::InvalidIntent,
        }
    }
}

/// Shorthand for an overflow error.
pub(crate) fn overflow(context: &str) -> MarketError {
    MarketError::ArithmeticOverflow {
        context: context.to_owned(),
    }
}
