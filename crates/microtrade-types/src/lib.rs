//! Shared type definitions for the Microtrade economy simulation.
//!
//! This crate is the single source of truth for the records that flow
//! between the ledger, the markets, the cycle orchestrator, and the
//! decision layer.
//!
//! # Modules
//!
//! - [`ids`] -- Agent/good names and monotonically increasing sequence ids
//! - [`enums`] -- Order statuses, intent kinds, rejection reasons, audit verdicts
//! - [`structs`] -- Agents, goods, orders, labor hires, transactions
//! - [`intents`] -- Action-intents consumed from the decision layer
//! - [`report`] -- Cycle report returned to the decision layer

pub mod enums;
pub mod ids;
pub mod intents;
pub mod report;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    AuditVerdict, ClearingRule, IntentKind, OrderKind, OrderStatus, RejectionReason,
    TransactionKind,
};
pub use ids::{
    AgentId, GoodName, HireId, LaborDemandId, LaborOfferId, OfferId, RequestId, Role,
    TransactionId,
};
pub use intents::{ActionIntent, IntentParameters};
pub use report::{AgentSnapshot, CycleReport, IntentOutcome, IntentStatus, OrderUpdate};
pub use structs::{
    Agent, Good, LABOR_GOOD, LaborDemand, LaborHire, LaborOffer, Offer, Request, Transaction,
};
