//! Action-intent types consumed from the decision layer.
//!
//! An [`ActionIntent`] names the acting agent and carries kind-specific
//! [`IntentParameters`]. Intents are validated against the ledger before
//! they touch any state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::IntentKind;
use crate::ids::{AgentId, GoodName, LaborOfferId, OfferId, RequestId};

/// A structured request from an agent to perform one economic action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionIntent {
    /// The acting agent.
    pub agent_id: AgentId,
    /// What the agent wants to do.
    pub parameters: IntentParameters,
}

impl ActionIntent {
    /// Create an intent for `agent_id`.
    pub const fn new(agent_id: AgentId, parameters: IntentParameters) -> Self {
        Self {
            agent_id,
            parameters,
        }
    }

    /// The kind tag of this intent.
    pub const fn kind(&self) -> IntentKind {
        self.parameters.kind()
    }
}

/// Kind-specific parameters of an [`ActionIntent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentParameters {
    /// Create goods out of the agent's production capacity.
    Produce {
        /// Good to produce.
        good: GoodName,
        /// Units to produce.
        quantity: u32,
    },
    /// Place a sell offer, reserving the goods.
    SubmitOffer {
        /// Good to sell.
        good: GoodName,
        /// Units to sell.
        quantity: u32,
        /// Asking unit price.
        price: Decimal,
    },
    /// Place a buy request, reserving `quantity * max_price` currency.
    SubmitRequest {
        /// Good to buy.
        good: GoodName,
        /// Units to buy.
        quantity: u32,
        /// Maximum unit price.
        max_price: Decimal,
    },
    /// Buy directly from an open offer at its asking price.
    BuyAccept {
        /// Offer to buy from.
        offer_id: OfferId,
        /// Units to buy.
        quantity: u32,
    },
    /// Sell directly into an open request at its maximum price.
    SellAccept {
        /// Request to fill.
        request_id: RequestId,
        /// Units to deliver.
        quantity: u32,
    },
    /// Offer labor hours.
    SubmitLaborOffer {
        /// Hours offered.
        hours: u32,
        /// Asking wage per hour.
        wage: Decimal,
    },
    /// Demand labor hours, reserving `hours * max_wage` currency.
    SubmitLaborDemand {
        /// Hours demanded.
        hours: u32,
        /// Maximum wage per hour.
        max_wage: Decimal,
    },
    /// Hire directly from an open labor offer at its asking wage.
    HireAccept {
        /// Labor offer to hire from.
        labor_offer_id: LaborOfferId,
        /// Hours to hire.
        hours: u32,
    },
    /// Consume goods from inventory.
    Consume {
        /// Good to consume.
        good: GoodName,
        /// Units to consume.
        quantity: u32,
    },
    /// Withdraw an own offer and release its reservation.
    CancelOffer {
        /// Offer to withdraw.
        offer_id: OfferId,
    },
    /// Withdraw an own request and release its reservation.
    CancelRequest {
        /// Request to withdraw.
        request_id: RequestId,
    },
}

impl IntentParameters {
    /// The kind tag corresponding to these parameters.
    pub const fn kind(&self) -> IntentKind {
        match self {
            Self::Produce { .. } => IntentKind::Produce,
            Self::SubmitOffer { .. } => IntentKind::SubmitOffer,
            Self::SubmitRequest { .. } => IntentKind::SubmitRequest,
            Self::BuyAccept { .. } => IntentKind::BuyAccept,
            Self::SellAccept { .. } => IntentKind::SellAccept,
            Self::SubmitLaborOffer { .. } => IntentKind::SubmitLaborOffer,
            Self::SubmitLaborDemand { .. } => IntentKind::SubmitLaborDemand,
            Self::HireAccept { .. } => IntentKind::HireAccept,
            Self::Consume { .. } => IntentKind::Consume,
            Self::CancelOffer { .. } => IntentKind::CancelOffer,
            Self::CancelRequest { .. } => IntentKind::CancelRequest,
        }
    }
}
