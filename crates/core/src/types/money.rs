//! Rupee amounts using decimal arithmetic.
//!
//! Amounts are held in rupees with two decimal places. The payment gateway
//! works in paise (1/100 rupee), so conversions to and from integer paise are
//! exact or rejected.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing or converting [`Money`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount cannot be negative")]
    Negative,
    #[error("amount has more than two decimal places")]
    TooPrecise,
    #[error("amount is too large")]
    Overflow,
}

/// An INR amount.
///
/// Serialises as a decimal string (`"12999.00"`) so no precision is lost in
/// JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create an amount from a rupee value.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative or has sub-paise precision.
    pub fn new(rupees: Decimal) -> Result<Self, MoneyError> {
        if rupees.is_sign_negative() && !rupees.is_zero() {
            return Err(MoneyError::Negative);
        }
        if rupees.normalize().scale() > 2 {
            return Err(MoneyError::TooPrecise);
        }
        Ok(Self(rupees))
    }

    /// Create an amount from whole paise.
    ///
    /// # Errors
    ///
    /// Returns an error if `paise` is negative.
    pub fn from_paise(paise: i64) -> Result<Self, MoneyError> {
        if paise < 0 {
            return Err(MoneyError::Negative);
        }
        Ok(Self(Decimal::new(paise, 2)))
    }

    /// Convert to whole paise for the payment gateway.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the value does not fit in an `i64`.
    pub fn to_paise(self) -> Result<i64, MoneyError> {
        (self.0 * Decimal::ONE_HUNDRED)
            .round()
            .to_i64()
            .ok_or(MoneyError::Overflow)
    }

    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}
