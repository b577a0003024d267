//! Clearing policy: execution price and facilitator fee for a match.
//!
//! The execution price of a compatible offer/request pair is chosen by the
//! configured [`ClearingRule`] (midpoint by default), rounded to the
//! minimum price increment and clamped into `[ask, bid]` so that rounding
//! can never push a trade outside either party's limit.

use rust_decimal::{Decimal, RoundingStrategy};

use microtrade_types::{AgentId, ClearingRule};

use crate::error::{MarketError, overflow};

/// Price and fee policy applied to every match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearingPolicy {
    /// Rule used to pick the execution price.
    pub rule: ClearingRule,
    /// Minimum price increment; every clearing price is a multiple of it.
    pub price_increment: Decimal,
    /// Fraction of the gross amount taken as a fee, in `[0, 1)`.
    pub fee_rate: Decimal,
    /// Agent that collects fees. No facilitator means no fees.
    pub facilitator: Option<AgentId>,
}

impl ClearingPolicy {
    /// Create a validated policy.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidPolicy`] if the increment is not
    /// positive or the fee rate is outside `[0, 1)`.
    pub fn new(
        rule: ClearingRule,
        price_increment: Decimal,
        fee_rate: Decimal,
        facilitator: Option<AgentId>,
    ) -> Result<Self, MarketError> {
        if price_increment <= Decimal::ZERO {
            return Err(MarketError::InvalidPolicy {
                reason: format!("price increment must be positive, got {price_increment}"),
            });
        }
        if fee_rate.is_sign_negative() || fee_rate >= Decimal::ONE {
            return Err(MarketError::InvalidPolicy {
                reason: format!("fee rate must be in [0, 1), got {fee_rate}"),
            });
        }
        Ok(Self {
            rule,
            price_increment,
            fee_rate,
            facilitator,
        })
    }

    /// Execution price for an offer asking `ask` and a request bidding up
    /// to `bid`. The caller guarantees `ask <= bid`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ArithmeticOverflow`] if the computation
    /// overflows.
    pub fn clearing_price(&self, ask: Decimal, bid: Decimal) -> Result<Decimal, MarketError> {
        let raw = match self.rule {
            ClearingRule::Midpoint => ask
                .checked_add(bid)
                .and_then(|sum| sum.checked_div(Decimal::TWO))
                .ok_or_else(|| overflow("midpoint price"))?,
            ClearingRule::OfferPrice => ask,
            ClearingRule::RequestPrice => bid,
        };
        let rounded = round_to_increment(raw, self.price_increment)?;
        Ok(rounded.clamp(ask, bid))
    }

    /// Fee charged on a gross amount: `gross * fee_rate` when a
    /// facilitator exists, zero otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ArithmeticOverflow`] on overflow.
    pub fn fee_for(&self, gross: Decimal) -> Result<Decimal, MarketError> {
        if self.facilitator.is_none() {
            return Ok(Decimal::ZERO);
        }
        gross
            .checked_mul(self.fee_rate)
            .ok_or_else(|| overflow("facilitator fee"))
    }
}

/// Round `value` to the nearest multiple of `increment`, halves away from
/// zero.
///
/// # Errors
///
/// Returns [`MarketError::InvalidPolicy`] for a non-positive increment or
/// [`MarketError::ArithmeticOverflow`] on overflow.
pub fn round_to_increment(value: Decimal, increment: Decimal) -> Result<Decimal, MarketError> {
    if increment <= Decimal::ZERO {
        return Err(MarketError::InvalidPolicy {
            reason: format!("price increment must be positive, got {increment}"),
        });
    }
    let steps = value
        .checked_div(increment)
        .ok_or_else(|| overflow("price rounding"))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    steps
        .checked_mul(increment)
        .map(|v| v.normalize())
        .ok_or_else(|| overflow("price rounding"))
}

/// Currency needed to back `quantity` units at `price`.
///
/// # Errors
///
/// Returns [`MarketError::ArithmeticOverflow`] on overflow.
pub fn order_value(quantity: u32, price: Decimal) -> Result<Decimal, MarketError> {
    price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| overflow("order value"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn policy(rule: ClearingRule) -> ClearingPolicy {
        ClearingPolicy::new(rule, dec!(0.01), dec!(0.05), Some(AgentId::from("market"))).unwrap()
    }

    #[test]
    fn midpoint_splits_the_surplus() {
        let price = policy(ClearingRule::Midpoint)
            .clearing_price(dec!(2.0), dec!(2.5))
            .unwrap();
        assert_eq!(price, dec!(2.25));
    }

    #[test]
    fn midpoint_rounds_to_increment() {
        // (2.00 + 2.05) / 2 = 2.025 rounds half away from zero to 2.03.
        let price = policy(ClearingRule::Midpoint)
            .clearing_price(dec!(2.00), dec!(2.05))
            .unwrap();
        assert_eq!(price, dec!(2.03));
    }

    #[test]
    fn rounding_never_leaves_the_limits() {
        let coarse =
            ClearingPolicy::new(ClearingRule::Midpoint, dec!(1), Decimal::ZERO, None).unwrap();
        // Midpoint 2.2 rounds to 2, below the ask of 2.1.
        let price = coarse.clearing_price(dec!(2.1), dec!(2.3)).unwrap();
        assert_eq!(price, dec!(2.1));
    }

    #[test]
    fn offer_and_request_price_rules() {
        assert_eq!(
            policy(ClearingRule::OfferPrice)
                .clearing_price(dec!(2), dec!(3))
                .unwrap(),
            dec!(2)
        );
        assert_eq!(
            policy(ClearingRule::RequestPrice)
                .clearing_price(dec!(2), dec!(3))
                .unwrap(),
            dec!(3)
        );
    }

    #[test]
    fn fee_requires_facilitator() {
        let with = policy(ClearingRule::Midpoint);
        assert_eq!(with.fee_for(dec!(6.75)).unwrap(), dec!(0.3375));

        let without = ClearingPolicy {
            facilitator: None,
            ..with
        };
        assert_eq!(without.fee_for(dec!(6.75)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn invalid_policies_rejected() {
        assert!(ClearingPolicy::new(ClearingRule::Midpoint, Decimal::ZERO, dec!(0.05), None).is_err());
        assert!(ClearingPolicy::new(ClearingRule::Midpoint, dec!(0.01), dec!(1), None).is_err());
        assert!(ClearingPolicy::new(ClearingRule::Midpoint, dec!(0.01), dec!(-0.1), None).is_err());
    }
}
