//! Type-safe price representation using decimal arithmetic.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative (got {0})")]
    Negative(Decimal),
}

/// A non-negative price with currency information.
///
/// Cart lines hold a snapshot of the unit price taken when the product was
/// added; it is not re-validated against the catalog afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPrice")]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    amount: Decimal,
    /// ISO 4217 currency code.
    currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] if `amount` is below zero.
    pub fn new(amount: Decimal, currency_code: CurrencyCode) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative(amount));
        }
        Ok(Self {
            amount,
            currency_code,
        })
    }

    /// Create a price in the default currency.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] if `amount` is below zero.
    pub fn from_amount(amount: Decimal) -> Result<Self, PriceError> {
        Self::new(amount, CurrencyCode::default())
    }

    /// A zero price in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency_code,
        }
    }

    /// The amount in the currency's standard unit.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    /// The ISO 4217 currency code.
    #[must_use]
    pub const fn currency_code(&self) -> CurrencyCode {
        self.currency_code
    }

    /// Price of `quantity` units.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        Self {
            amount: self.amount * Decimal::from(quantity),
            currency_code: self.currency_code,
        }
    }

    /// Sum of two prices in the same currency.
    ///
    /// Returns `None` when the currencies differ.
    #[must_use]
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        (self.currency_code == other.currency_code).then(|| Self {
            amount: self.amount + other.amount,
            currency_code: self.currency_code,
        })
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:.2}",
            self.currency_code.symbol(),
            self.amount.round_dp(2)
        )
    }
}

#[derive(Deserialize)]
struct RawPrice {
    amount: Decimal,
    #[serde(default)]
    currency_code: CurrencyCode,
}

impl TryFrom<RawPrice> for Price {
    type Error = PriceError;

    fn try_from(raw: RawPrice) -> Result<Self, Self::Error> {
        Self::new(raw.amount, raw.currency_code)
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_price_rejected() {
        let err = Price::from_amount(Decimal::new(-1, 0)).unwrap_err();
        assert_eq!(err, PriceError::Negative(Decimal::new(-1, 0)));
    }

    #[test]
    fn test_zero_price_allowed() {
        assert!(Price::from_amount(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_times_and_display() {
        let price = Price::from_amount(Decimal::new(249, 2)).unwrap();
        assert_eq!(price.times(3).to_string(), "$7.47");
    }

    #[test]
    fn test_checked_add_requires_same_currency() {
        let usd = Price::from_amount(Decimal::ONE).unwrap();
        let eur = Price::new(Decimal::ONE, CurrencyCode::EUR).unwrap();
        assert!(usd.checked_add(&eur).is_none());
        assert_eq!(
            usd.checked_add(&usd).unwrap().amount(),
            Decimal::new(2, 0)
        );
    }

    #[test]
    fn test_deserialize_validates_amount() {
        let json = r#"{"amount":"-5.00","currency_code":"USD"}"#;
        assert!(serde_json::from_str::<Price>(json).is_err());

        let json = r#"{"amount":"5.00"}"#;
        let price: Price = serde_json::from_str(json).unwrap();
        assert_eq!(price.currency_code(), CurrencyCode::USD);
    }
}
