//! Transaction builder and validation for the ledger.
//!
//! Provides a [`TransactionBuilder`] that enforces the shape of every
//! committed exchange: distinct buyer and seller, positive quantity and
//! price, and a fee that never exceeds the gross amount. The id is only
//! supplied at commit time by the [`Ledger`](crate::Ledger).

use rust_decimal::Decimal;

use microtrade_types::{AgentId, GoodName, Transaction, TransactionId, TransactionKind};

use crate::LedgerError;

// ---------------------------------------------------------------------------
// Transaction builder
// ---------------------------------------------------------------------------

/// Builder for constructing validated [`Transaction`] values.
///
/// # Examples
///
/// ```
/// use microtrade_ledger::TransactionBuilder;
/// use microtrade_types::{AgentId, GoodName, TransactionId, TransactionKind};
/// use rust_decimal::Decimal;
///
/// let tx = TransactionBuilder::new(1, TransactionKind::Matched, GoodName::from("food"))
///     .seller(AgentId::from("producer"))
///     .buyer(AgentId::from("consumer"))
///     .quantity(3)
///     .unit_price(Decimal::new(225, 2))
///     .build(TransactionId::FIRST);
///
/// assert!(tx.is_ok());
/// ```
#[derive(Debug)]
pub struct TransactionBuilder {
    cycle: u64,
    kind: TransactionKind,
    good: GoodName,
    seller: Option<AgentId>,
    buyer: Option<AgentId>,
    quantity: Option<u32>,
    unit_price: Option<Decimal>,
    fee: Decimal,
}

impl TransactionBuilder {
    /// Start building a transaction for the given cycle, kind, and good.
    pub const fn new(cycle: u64, kind: TransactionKind, good: GoodName) -> Self {
        Self {
            cycle,
            kind,
            good,
            seller: None,
            buyer: None,
            quantity: None,
            unit_price: None,
            fee: Decimal::ZERO,
        }
    }

    /// Set the delivering agent.
    #[must_use]
    pub fn seller(mut self, agent: AgentId) -> Self {
        self.seller = Some(agent);
        self
    }

    /// Set the paying agent.
    #[must_use]
    pub fn buyer(mut self, agent: AgentId) -> Self {
        self.buyer = Some(agent);
        self
    }

    /// Set the quantity exchanged.
    #[must_use]
    pub const fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Set the unit price.
    #[must_use]
    pub const fn unit_price(mut self, price: Decimal) -> Self {
        self.unit_price = Some(price);
        self
    }

    /// Set the facilitator fee (defaults to zero).
    #[must_use]
    pub const fn fee(mut self, fee: Decimal) -> Self {
        self.fee = fee;
        self
    }

    /// Validate inputs and produce a [`Transaction`] with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MissingField`] if a required field is unset,
    /// [`LedgerError::InvalidAmount`] for a non-positive quantity or price,
    /// a negative fee, or a fee above the gross amount, and
    /// [`LedgerError::SelfTrade`] if buyer and seller coincide.
    pub fn build(self, id: TransactionId) -> Result<Transaction, LedgerError> {
        let seller = self.seller.ok_or(LedgerError::MissingField("seller"))?;
        let buyer = self.buyer.ok_or(LedgerError::MissingField("buyer"))?;
        let quantity = self.quantity.ok_or(LedgerError::MissingField("quantity"))?;
        let unit_price = self
            .unit_price
            .ok_or(LedgerError::MissingField("unit_price"))?;

        if seller == buyer {
            return Err(LedgerError::SelfTrade { agent: seller });
        }
        if quantity == 0 {
            return Err(LedgerError::InvalidAmount {
                context: String::from("transaction quantity must be positive"),
            });
        }
        if unit_price <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                context: format!("unit price must be positive, got {unit_price}"),
            });
        }
        if self.fee.is_sign_negative() {
            return Err(LedgerError::InvalidAmount {
                context: format!("fee must not be negative, got {}", self.fee),
            });
        }

        let gross = unit_price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| LedgerError::ArithmeticOverflow {
                context: String::from("transaction gross amount"),
            })?;
        if self.fee > gross {
            return Err(LedgerError::InvalidAmount {
                context: format!("fee {} exceeds gross amount {gross}", self.fee),
            });
        }

        Ok(Transaction {
            id,
            cycle: self.cycle,
            kind: self.kind,
            seller,
            buyer,
            good: self.good,
            quantity,
            unit_price,
            fee: self.fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn builder() -> TransactionBuilder {
        TransactionBuilder::new(1, TransactionKind::Matched, GoodName::from("food"))
            .seller(AgentId::from("producer"))
            .buyer(AgentId::from("consumer"))
    }

    #[test]
    fn builder_produces_valid_transaction() {
        let result = builder()
            .quantity(3)
            .unit_price(dec!(2.25))
            .fee(dec!(0.3375))
            .build(TransactionId::new(7));

        assert!(result.is_ok());
        if let Ok(tx) = result {
            assert_eq!(tx.id, TransactionId::new(7));
            assert_eq!(tx.cycle, 1);
            assert_eq!(tx.quantity, 3);
            assert_eq!(tx.unit_price, dec!(2.25));
            assert_eq!(tx.fee, dec!(0.3375));
        }
    }

    #[test]
    fn zero_quantity_rejected() {
        let result = builder()
            .quantity(0)
            .unit_price(dec!(2))
            .build(TransactionId::FIRST);
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn non_positive_price_rejected() {
        let result = builder()
            .quantity(1)
            .unit_price(Decimal::ZERO)
            .build(TransactionId::FIRST);
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn fee_above_gross_rejected() {
        let result = builder()
            .quantity(1)
            .unit_price(dec!(1))
            .fee(dec!(1.01))
            .build(TransactionId::FIRST);
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn self_trade_rejected() {
        let result = TransactionBuilder::new(1, TransactionKind::Accepted, GoodName::from("food"))
            .seller(AgentId::from("trader"))
            .buyer(AgentId::from("trader"))
            .quantity(1)
            .unit_price(dec!(2))
            .build(TransactionId::FIRST);
        assert!(matches!(result, Err(LedgerError::SelfTrade { .. })));
    }

    #[test]
    fn missing_buyer_rejected() {
        let result = TransactionBuilder::new(1, TransactionKind::Matched, GoodName::from("food"))
            .seller(AgentId::from("producer"))
            .quantity(1)
            .unit_price(dec!(2))
            .build(TransactionId::FIRST);
        assert!(matches!(result, Err(LedgerError::MissingField("buyer"))));
    }
}
