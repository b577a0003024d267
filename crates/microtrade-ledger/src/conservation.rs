//! Conservation law verification for the ledger.
//!
//! Currency never enters or leaves the economy: trades, wages, and fees
//! all move it between accounts. Goods enter only through production and
//! leave only through consumption. For each cycle the orchestrator
//! measures [`EconomyTotals`] before and after and checks:
//!
//! ```text
//! currency(after) == currency(before)
//! goods(g, after) == goods(g, before) + produced(g) - consumed(g)
//! ```
//!
//! A violation produces a [`LedgerAnomaly`] -- the economy's most critical
//! integrity alert.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use microtrade_types::{AuditVerdict, GoodName};

use crate::{Ledger, LedgerAnomaly, LedgerError};

/// The result of a conservation check for a single cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConservationResult {
    /// Totals moved only through production and consumption.
    Balanced,
    /// Currency or goods totals drifted.
    Anomaly(LedgerAnomaly),
}

impl ConservationResult {
    /// Returns `true` if the check passed.
    pub const fn is_balanced(&self) -> bool {
        matches!(self, Self::Balanced)
    }

    /// Convert into the serializable verdict carried by cycle reports.
    pub fn verdict(&self) -> AuditVerdict {
        match self {
            Self::Balanced => AuditVerdict::Balanced,
            Self::Anomaly(anomaly) => AuditVerdict::Anomaly {
                message: anomaly.message.clone(),
            },
        }
    }
}

/// Economy-wide sums of currency and of every good.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EconomyTotals {
    /// Sum of currency held by all agents.
    pub currency: Decimal,
    /// Sum of each good held by all agents.
    pub goods: BTreeMap<GoodName, u64>,
}

impl EconomyTotals {
    /// Sum the balances of every account in the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ArithmeticOverflow`] if a sum overflows.
    pub fn measure(ledger: &Ledger) -> Result<Self, LedgerError> {
        let mut totals = Self::default();
        for agent in ledger.agents().values() {
            totals.currency = totals.currency.checked_add(agent.currency).ok_or_else(|| {
                LedgerError::ArithmeticOverflow {
                    context: String::from("total currency"),
                }
            })?;
            for (good, &quantity) in &agent.goods {
                let entry = totals.goods.entry(good.clone()).or_insert(0);
                *entry = entry.checked_add(u64::from(quantity)).ok_or_else(|| {
                    LedgerError::ArithmeticOverflow {
                        context: format!("total {good}"),
                    }
                })?;
            }
        }
        Ok(totals)
    }

    /// Total held of one good.
    pub fn goods_total(&self, good: &GoodName) -> u64 {
        self.goods.get(good).copied().unwrap_or(0)
    }
}

/// Verify the conservation law for one cycle.
///
/// `produced` and `consumed` are the per-good quantities created and
/// destroyed by successfully applied intents during the cycle.
pub fn verify_conservation(
    cycle: u64,
    before: &EconomyTotals,
    after: &EconomyTotals,
    produced: &BTreeMap<GoodName, u64>,
    consumed: &BTreeMap<GoodName, u64>,
) -> ConservationResult {
    let currency = (before.currency != after.currency).then_some((before.currency, after.currency));

    let all_goods: BTreeSet<&GoodName> = before
        .goods
        .keys()
        .chain(after.goods.keys())
        .chain(produced.keys())
        .chain(consumed.keys())
        .collect();

    let mut goods: BTreeMap<GoodName, (i128, i128)> = BTreeMap::new();
    for good in all_goods {
        let start = i128::from(before.goods_total(good));
        let made = i128::from(produced.get(good).copied().unwrap_or(0));
        let used = i128::from(consumed.get(good).copied().unwrap_or(0));
        let actual = i128::from(after.goods_total(good));
        // u64-derived operands cannot overflow i128.
        let expected = start.saturating_add(made).saturating_sub(used);
        if expected != actual {
            goods.insert(good.clone(), (expected, actual));
        }
    }

    if currency.is_none() && goods.is_empty() {
        return ConservationResult::Balanced;
    }

    let mut parts = Vec::new();
    if let Some((was, now)) = currency {
        parts.push(format!("currency {was} -> {now}"));
    }
    for (good, (expected, actual)) in &goods {
        parts.push(format!("{good} expected {expected}, found {actual}"));
    }

    ConservationResult::Anomaly(LedgerAnomaly {
        cycle,
        currency,
        goods,
        message: format!("LEDGER_ANOMALY at cycle {cycle}: {}", parts.join("; ")),
    })
}

/// List every balance invariant violation in the ledger.
///
/// Checks non-negative currency, reserved currency within held currency,
/// reserved goods within held goods, and health within bounds. An empty
/// result means the ledger is internally consistent.
pub fn balance_violations(ledger: &Ledger) -> Vec<String> {
    let mut violations = Vec::new();
    for agent in ledger.agents().values() {
        if agent.currency.is_sign_negative() {
            violations.push(format!("agent {} has negative currency", agent.id));
        }
        if agent.reserved_currency.is_sign_negative() || agent.reserved_currency > agent.currency
        {
            violations.push(format!(
                "agent {} reserves {} of {} currency",
                agent.id, agent.reserved_currency, agent.currency
            ));
        }
        for (good, &reserved) in &agent.reserved_goods {
            let held = agent.goods_held(good);
            if reserved > held {
                violations.push(format!(
                    "agent {} reserves {reserved} of {held} {good}",
                    agent.id
                ));
            }
        }
        if agent.health > ledger.max_health() {
            violations.push(format!(
                "agent {} health {} exceeds maximum {}",
                agent.id,
                agent.health,
                ledger.max_health()
            ));
        }
    }
    violations
}
