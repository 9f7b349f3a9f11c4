use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-scale-8, non-negative, currency-tagged decimal value.
///
/// Equality is modulo scale: two prices with the same numeric value but
/// different internal scale compare equal (`Decimal`'s `PartialEq` already
/// does this). All arithmetic re-applies the fixed scale with half-up
/// rounding so results never silently drift to a wider scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Price {
    amount: Decimal,
    currency: &'static str,
}

pub const SCALE: u32 = 8;

impl Price {
    /// Builds a price, clamping scale to 8 with half-up rounding.
    ///
    /// # Panics
    /// Panics if `amount` is negative — prices are never negative in this
    /// domain (§3: "non-negative").
    pub fn new(amount: Decimal, currency: &'static str) -> Self {
        assert!(amount >= Decimal::ZERO, "price must be non-negative");
        Self {
            amount: amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero),
            currency,
        }
    }

    pub fn zero(currency: &'static str) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &'static str {
        self.currency
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    fn check_currency(&self, other: &Price) {
        assert_eq!(
            self.currency, other.currency,
            "currency mismatch in price arithmetic"
        );
    }

    pub fn checked_sub(&self, other: &Price) -> Option<SignedAmount> {
        self.check_currency(other);
        Some(SignedAmount::new(self.amount - other.amount))
    }

    pub fn checked_add_signed(&self, delta: &SignedAmount) -> Option<Price> {
        let sum = self.amount + delta.value();
        if sum < Decimal::ZERO {
            None
        } else {
            Some(Price::new(sum, self.currency))
        }
    }
}

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.currency == other.currency && self.amount == other.amount
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// A signed, scale-8 amount — the result of subtracting two [`Price`]s
/// (e.g. `oc = open - close`). Unlike [`Price`] it may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignedAmount(Decimal);

impl SignedAmount {
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn to_f64(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn sub(&self, other: &SignedAmount) -> SignedAmount {
        SignedAmount::new(self.0 - other.0)
    }

    pub fn add(&self, other: &SignedAmount) -> SignedAmount {
        SignedAmount::new(self.0 + other.0)
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn equality_is_modulo_scale() {
        let a = Price::new(Decimal::new(100, 0), "USD"); // 100
        let b = Price::new(Decimal::new(10000000000, 8), "USD"); // 100.00000000
        assert_eq!(a, b);
    }

    #[test]
    fn subtraction_yields_signed_amount() {
        let open = Price::new(dec!(100.00000000), "USD");
        let close = Price::new(dec!(97.50000000), "USD");
        let oc = open.checked_sub(&close).unwrap();
        assert_eq!(oc.value(), dec!(2.50000000));
    }
}
