//! Cycle report returned to the decision layer after every cycle.
//!
//! A [`CycleReport`] carries everything an agent needs to plan its next
//! intents without reading the full economy state: new transactions and
//! hires, order status changes, agent snapshots, prices, and the outcome
//! of every submitted intent.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{AuditVerdict, IntentKind, OrderKind, OrderStatus, RejectionReason};
use crate::ids::{AgentId, GoodName, Role};
use crate::structs::{Agent, LaborHire, Transaction};

/// Point-in-time view of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Agent id.
    pub id: AgentId,
    /// Role tag.
    pub role: Role,
    /// Currency held.
    pub currency: Decimal,
    /// Currency reserved against open requests and demands.
    pub reserved_currency: Decimal,
    /// Goods held.
    pub goods: BTreeMap<GoodName, u32>,
    /// Goods reserved against open offers.
    pub reserved_goods: BTreeMap<GoodName, u32>,
    /// Current health.
    pub health: u32,
    /// Whether the agent is still active.
    pub active: bool,
}

impl From<&Agent> for AgentSnapshot {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            role: agent.role.clone(),
            currency: agent.currency,
            reserved_currency: agent.reserved_currency,
            goods: agent.goods.clone(),
            reserved_goods: agent.reserved_goods.clone(),
            health: agent.health,
            active: agent.active,
        }
    }
}

/// A status change of an order during the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// Which book the order lives in.
    pub kind: OrderKind,
    /// Raw order id within its book.
    pub order_id: u64,
    /// Owner of the order.
    pub agent: AgentId,
    /// Quantity (or hours) still unfilled.
    pub remaining: u32,
    /// New status.
    pub status: OrderStatus,
}

/// What happened to one submitted intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentOutcome {
    /// Position of the intent in submission order.
    pub sequence: usize,
    /// Acting agent.
    pub agent_id: AgentId,
    /// Kind of the intent.
    pub kind: IntentKind,
    /// Applied or rejected.
    pub status: IntentStatus,
}

/// Whether an intent was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum IntentStatus {
    /// The intent changed state.
    Applied,
    /// The intent was rejected before touching state.
    Rejected {
        /// Machine-readable rejection reason.
        reason: RejectionReason,
        /// Human-readable detail.
        message: String,
    },
}

impl IntentOutcome {
    /// Returns `true` if the intent was applied.
    pub const fn is_applied(&self) -> bool {
        matches!(self.status, IntentStatus::Applied)
    }

    /// The rejection reason, if the intent was rejected.
    pub const fn rejection(&self) -> Option<RejectionReason> {
        match &self.status {
            IntentStatus::Applied => None,
            IntentStatus::Rejected { reason, .. } => Some(*reason),
        }
    }
}

/// Structured result of one committed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Cycle number (0 for the initial state).
    pub cycle: u64,
    /// Transactions committed this cycle, in id order.
    pub transactions: Vec<Transaction>,
    /// Labor hires cleared this cycle.
    pub hires: Vec<LaborHire>,
    /// Order status changes, in the order they happened.
    pub order_updates: Vec<OrderUpdate>,
    /// Every agent's state after the cycle.
    pub agents: BTreeMap<AgentId, AgentSnapshot>,
    /// Reference price of every known good after pricing.
    pub prices: BTreeMap<GoodName, Decimal>,
    /// Reference labor wage, once any hire has cleared.
    pub reference_wage: Option<Decimal>,
    /// Outcome of every submitted intent, in submission order.
    pub intent_outcomes: Vec<IntentOutcome>,
    /// Units produced per good this cycle.
    pub produced: BTreeMap<GoodName, u64>,
    /// Units consumed per good this cycle.
    pub consumed: BTreeMap<GoodName, u64>,
    /// Agents whose health reached zero this cycle.
    pub newly_inactive: Vec<AgentId>,
    /// Total fees collected by the facilitator this cycle.
    pub fees_collected: Decimal,
    /// Conservation audit verdict.
    pub audit: AuditVerdict,
}

impl CycleReport {
    /// Number of agents still active after the cycle.
    pub fn active_agents(&self) -> usize {
        self.agents.values().filter(|a| a.active).count()
    }

    /// Number of rejected intents.
    pub fn rejected_count(&self) -> usize {
        self.intent_outcomes
            .iter()
            .filter(|o| !o.is_applied())
            .count()
    }

    /// Snapshot of a single agent.
    pub fn agent(&self, id: &AgentId) -> Option<&AgentSnapshot> {
        self.agents.get(id)
    }
}
