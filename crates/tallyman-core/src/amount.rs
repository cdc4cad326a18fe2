//! Currency-tagged quantities.
//!
//! An [`Amount`] pairs an exact decimal with a currency code. Adding or
//! subtracting amounts of different currencies is an error rather than a
//! panic, since ledger input decides which currencies meet.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;

use crate::intern::InternedStr;
use crate::number::{self, NumberError, Quotient};

/// A number of units of one currency.
///
/// ```
/// use tallyman_core::Amount;
/// use rust_decimal_macros::dec;
///
/// let cash = Amount::new(dec!(100.00), "USD");
/// let fee = Amount::new(dec!(2.50), "USD");
/// assert_eq!(cash.checked_sub(&fee).unwrap().number, dec!(97.50));
///
/// let euros = Amount::new(dec!(1), "EUR");
/// assert!(cash.checked_add(&euros).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// The decimal quantity.
    pub number: Decimal,
    /// The currency code (e.g. "USD", "HOOL").
    pub currency: InternedStr,
}

impl Amount {
    /// Create a new amount.
    #[must_use]
    pub fn new(number: Decimal, currency: impl Into<InternedStr>) -> Self {
        Self {
            number,
            currency: currency.into(),
        }
    }

    /// A zero amount of `currency`.
    #[must_use]
    pub fn zero(currency: impl Into<InternedStr>) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// Whether the number is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.number.is_zero()
    }

    /// Whether the number is strictly positive.
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.number.is_sign_positive() && !self.number.is_zero()
    }

    /// Whether the number is strictly negative.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.number.is_sign_negative() && !self.number.is_zero()
    }

    /// Absolute value.
    #[must_use]
    pub fn abs(&self) -> Self {
        Self::new(self.number.abs(), self.currency.clone())
    }

    /// Number of fractional digits as written.
    #[must_use]
    pub const fn scale(&self) -> u32 {
        self.number.scale()
    }

    /// Sum of two amounts of the same currency.
    pub fn checked_add(&self, other: &Self) -> Result<Self, NumberError> {
        self.same_currency(other)?;
        let number = self
            .number
            .checked_add(other.number)
            .ok_or(NumberError::Overflow)?;
        Ok(Self::new(number, self.currency.clone()))
    }

    /// Difference of two amounts of the same currency.
    pub fn checked_sub(&self, other: &Self) -> Result<Self, NumberError> {
        self.same_currency(other)?;
        let number = self
            .number
            .checked_sub(other.number)
            .ok_or(NumberError::Overflow)?;
        Ok(Self::new(number, self.currency.clone()))
    }

    /// Multiply by a scalar.
    pub fn mul(&self, factor: Decimal) -> Result<Self, NumberError> {
        let number = self
            .number
            .checked_mul(factor)
            .ok_or(NumberError::Overflow)?;
        Ok(Self::new(number, self.currency.clone()))
    }

    /// Divide by a scalar; see [`number::divide`] for the meaning of `cap`.
    pub fn div(&self, divisor: Decimal, cap: Option<u32>) -> Result<(Self, bool), NumberError> {
        let Quotient { value, exact } = number::divide(self.number, divisor, cap)?;
        Ok((Self::new(value, self.currency.clone()), exact))
    }

    /// Whether both amounts share a currency and differ by at most `tolerance`.
    #[must_use]
    pub fn is_near(&self, other: &Self, tolerance: Decimal) -> bool {
        self.currency == other.currency
            && self
                .number
                .checked_sub(other.number)
                .is_some_and(|d| d.abs() <= tolerance)
    }

    /// Whether the number lies within `tolerance` of zero.
    #[must_use]
    pub fn is_near_zero(&self, tolerance: Decimal) -> bool {
        self.number.abs() <= tolerance
    }

    /// Tolerance implied by this amount's precision.
    #[must_use]
    pub fn inferred_tolerance(&self, multiplier: Decimal) -> Decimal {
        number::inferred_tolerance(self.number, multiplier)
    }

    fn same_currency(&self, other: &Self) -> Result<(), NumberError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(NumberError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            })
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.currency)
    }
}

impl Neg for &Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount::new(-self.number, self.currency.clone())
    }
}

impl Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            number: -self.number,
            currency: self.currency,
        }
    }
}

/// Units of a posting as written, before interpolation.
///
/// - `100.00 USD`: [`IncompleteAmount::Complete`]
/// - `100.00`: [`IncompleteAmount::NumberOnly`], currency inferred
/// - `USD`: [`IncompleteAmount::CurrencyOnly`], number interpolated
///
/// A posting with no units at all stores `None` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncompleteAmount {
    /// Number and currency.
    Complete(Amount),
    /// Number only.
    NumberOnly(Decimal),
    /// Currency only.
    CurrencyOnly(InternedStr),
}

impl IncompleteAmount {
    /// A complete amount.
    #[must_use]
    pub fn complete(number: Decimal, currency: impl Into<InternedStr>) -> Self {
        Self::Complete(Amount::new(number, currency))
    }

    /// A currency with its number elided.
    #[must_use]
    pub fn currency_only(currency: impl Into<InternedStr>) -> Self {
        Self::CurrencyOnly(currency.into())
    }

    /// The number, if written.
    #[must_use]
    pub const fn number(&self) -> Option<Decimal> {
        match self {
            Self::Complete(a) => Some(a.number),
            Self::NumberOnly(n) => Some(*n),
            Self::CurrencyOnly(_) => None,
        }
    }

    /// The currency, if written.
    #[must_use]
    pub fn currency(&self) -> Option<&InternedStr> {
        match self {
            Self::Complete(a) => Some(&a.currency),
            Self::NumberOnly(_) => None,
            Self::CurrencyOnly(c) => Some(c),
        }
    }

    /// The complete amount, if both parts are present.
    #[must_use]
    pub const fn as_amount(&self) -> Option<&Amount> {
        match self {
            Self::Complete(a) => Some(a),
            _ => None,
        }
    }
}

impl From<Amount> for IncompleteAmount {
    fn from(amount: Amount) -> Self {
        Self::Complete(amount)
    }
}

impl fmt::Display for IncompleteAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete(a) => write!(f, "{a}"),
            Self::NumberOnly(n) => write!(f, "{n}"),
            Self::CurrencyOnly(c) => write!(f, "{c}"),
        }
    }
}
