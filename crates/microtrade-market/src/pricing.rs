//! Reference prices for every good plus the reference labor wage.
//!
//! The [`PriceBook`] is the only writer of reference prices. After each
//! cycle's matching, every good that traded moves toward its
//! quantity-weighted average clearing price by an exponential moving
//! average:
//!
//! ```text
//! new = alpha * avg_clearing_price + (1 - alpha) * old
//! ```
//!
//! The result is rounded to the price increment and never drops below one
//! increment. Goods with no trades keep their price. Labor hires drive the
//! reference wage by the same rule; the first hire seeds it.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use microtrade_types::{Good, GoodName, Transaction};

use crate::clearing::round_to_increment;
use crate::error::{MarketError, overflow};

/// Per-good reference prices and the reference labor wage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceBook {
    /// Known goods keyed by name.
    goods: BTreeMap<GoodName, Good>,
    /// Reference wage per labor hour, once any hire has cleared.
    reference_wage: Option<Decimal>,
}

/// Running quantity-weighted sum for one good.
#[derive(Debug, Clone, Copy, Default)]
struct Volume {
    quantity: Decimal,
    value: Decimal,
}

impl Volume {
    fn add(&mut self, tx: &Transaction) -> Result<(), MarketError> {
        let quantity = Decimal::from(tx.quantity);
        let value = tx
            .unit_price
            .checked_mul(quantity)
            .ok_or_else(|| overflow("trade volume"))?;
        self.quantity = self
            .quantity
            .checked_add(quantity)
            .ok_or_else(|| overflow("trade volume"))?;
        self.value = self
            .value
            .checked_add(value)
            .ok_or_else(|| overflow("trade volume"))?;
        Ok(())
    }

    fn average(&self) -> Option<Decimal> {
        if self.quantity.is_zero() {
            return None;
        }
        self.value.checked_div(self.quantity)
    }
}

impl PriceBook {
    /// Create an empty price book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a price book from seed prices.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidPrice`] if any seed price is not
    /// positive.
    pub fn seed(
        prices: impl IntoIterator<Item = (GoodName, Decimal)>,
    ) -> Result<Self, MarketError> {
        let mut book = Self::new();
        for (name, price) in prices {
            if price <= Decimal::ZERO {
                return Err(MarketError::InvalidPrice { price });
            }
            book.goods.insert(
                name.clone(),
                Good {
                    name,
                    reference_price: price,
                },
            );
        }
        Ok(book)
    }

    /// Reassemble a price book from its parts without validation.
    pub const fn from_parts(
        goods: BTreeMap<GoodName, Good>,
        reference_wage: Option<Decimal>,
    ) -> Self {
        Self {
            goods,
            reference_wage,
        }
    }

    /// All known goods.
    pub const fn goods(&self) -> &BTreeMap<GoodName, Good> {
        &self.goods
    }

    /// Whether `good` has been seeded or referenced.
    pub fn contains(&self, good: &GoodName) -> bool {
        self.goods.contains_key(good)
    }

    /// Current reference price of `good`.
    pub fn price(&self, good: &GoodName) -> Option<Decimal> {
        self.goods.get(good).map(|g| g.reference_price)
    }

    /// Current reference wage, if any hire has cleared.
    pub const fn reference_wage(&self) -> Option<Decimal> {
        self.reference_wage
    }

    /// Reference prices keyed by good.
    pub fn prices(&self) -> BTreeMap<GoodName, Decimal> {
        self.goods
            .iter()
            .map(|(name, good)| (name.clone(), good.reference_price))
            .collect()
    }

    /// Register `good` on first reference, using `price_hint` as its
    /// initial reference price. Returns `true` if the good was new.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidPrice`] if a new good would get a
    /// non-positive price.
    pub fn ensure_good(&mut self, good: &GoodName, price_hint: Decimal) -> Result<bool, MarketError> {
        if self.goods.contains_key(good) {
            return Ok(false);
        }
        if price_hint <= Decimal::ZERO {
            return Err(MarketError::InvalidPrice { price: price_hint });
        }
        self.goods.insert(
            good.clone(),
            Good {
                name: good.clone(),
                reference_price: price_hint,
            },
        );
        debug!(good = %good, price = %price_hint, "Good registered");
        Ok(true)
    }

    /// Fold one cycle's transactions into the reference prices and wage.
    ///
    /// Returns the goods whose price changed.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidPolicy`] if `alpha` is outside
    /// `[0, 1]` or the increment is not positive, or
    /// [`MarketError::ArithmeticOverflow`] on overflow.
    pub fn update_from_transactions(
        &mut self,
        transactions: &[Transaction],
        alpha: Decimal,
        increment: Decimal,
    ) -> Result<Vec<GoodName>, MarketError> {
        if alpha.is_sign_negative() || alpha > Decimal::ONE {
            return Err(MarketError::InvalidPolicy {
                reason: format!("ema alpha must be in [0, 1], got {alpha}"),
            });
        }

        let mut volumes: BTreeMap<&GoodName, Volume> = BTreeMap::new();
        let mut labor = Volume::default();
        for tx in transactions {
            if tx.is_labor() {
                labor.add(tx)?;
            } else {
                volumes.entry(&tx.good).or_default().add(tx)?;
            }
        }

        let mut changed = Vec::new();
        for (name, volume) in volumes {
            let Some(average) = volume.average() else {
                continue;
            };
            let Some(good) = self.goods.get_mut(name) else {
                return Err(MarketError::UnknownGood { good: name.clone() });
            };
            let updated = ema(alpha, average, good.reference_price, increment)?;
            if updated != good.reference_price {
                debug!(
                    good = %name,
                    old = %good.reference_price,
                    new = %updated,
                    average = %average,
                    "Reference price updated"
                );
                good.reference_price = updated;
                changed.push(name.clone());
            }
        }

        if let Some(average) = labor.average() {
            let updated = match self.reference_wage {
                Some(old) => ema(alpha, average, old, increment)?,
                None => floor_at_increment(round_to_increment(average, increment)?, increment),
            };
            debug!(wage = %updated, average = %average, "Reference wage updated");
            self.reference_wage = Some(updated);
        }

        Ok(changed)
    }
}

fn ema(
    alpha: Decimal,
    sample: Decimal,
    old: Decimal,
    increment: Decimal,
) -> Result<Decimal, MarketError> {
    let keep = Decimal::ONE
        .checked_sub(alpha)
        .ok_or_else(|| overflow("ema weight"))?;
    let raw = alpha
        .checked_mul(sample)
        .zip(keep.checked_mul(old))
        .and_then(|(a, b)| a.checked_add(b))
        .ok_or_else(|| overflow("ema"))?;
    Ok(floor_at_increment(
        round_to_increment(raw, increment)?,
        increment,
    ))
}

fn floor_at_increment(price: Decimal, increment: Decimal) -> Decimal {
    price.max(increment)
}
