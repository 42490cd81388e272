//! Positive monetary amounts in Tanzanian shillings.
//!
//! Balances themselves are plain [`Decimal`]s (zero is a valid balance), but
//! every ledger movement and every top-up is an [`Amount`], which cannot be
//! zero or negative.

use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when building an [`Amount`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// The input is not a decimal number.
    #[error("amount is not a number: {0}")]
    Unparseable(String),
    /// The amount is zero or negative.
    #[error("amount must be greater than zero")]
    NotPositive,
}

/// A strictly positive amount of money.
///
/// ```
/// use spoti_boost_core::Amount;
///
/// assert!(Amount::parse("1000").is_ok());
/// assert!(Amount::parse(" 2500.50 ").is_ok());
/// assert!(Amount::parse("0").is_err());
/// assert!(Amount::parse("NaN").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Wrap a decimal, rejecting zero and negative values.
    ///
    /// # Errors
    ///
    /// Returns `AmountError::NotPositive` if `value <= 0`.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive);
        }
        Ok(Self(value.normalize()))
    }

    /// Parse a decimal string such as `"1000"` or `"1000.00"`.
    ///
    /// Surrounding whitespace is ignored. `NaN`, infinities, exponent
    /// notation and digit-group underscores are rejected.
    ///
    /// # Errors
    ///
    /// Returns `AmountError::Unparseable` or `AmountError::NotPositive`.
    pub fn parse(raw: &str) -> Result<Self, AmountError> {
        let trimmed = raw.trim();
        if trimmed.contains('_') {
            return Err(AmountError::Unparseable(trimmed.to_owned()));
        }
        let value = Decimal::from_str(trimmed)
            .map_err(|_| AmountError::Unparseable(trimmed.to_owned()))?;
        Self::new(value)
    }

    /// Get the underlying decimal value.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
