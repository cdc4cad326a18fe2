//! Exact decimal helpers.
//!
//! Every number in a ledger is a [`Decimal`]. Addition, subtraction and
//! multiplication of decimals are exact within the 28 significant digits
//! `rust_decimal` offers; division is the one operation that can produce a
//! non-terminating result. [`divide`] makes that case explicit: without a
//! precision cap it fails, with a cap it rounds and reports the result as
//! inexact.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intern::InternedStr;

/// The largest number of fractional digits a [`Decimal`] can carry.
pub const MAX_SCALE: u32 = 28;

/// Default multiplier applied to the smallest unit of a number to obtain its
/// inferred tolerance (`0.5` means "half the last digit").
pub const DEFAULT_TOLERANCE_MULTIPLIER: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Errors raised by numeric operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumberError {
    /// A division does not terminate and no precision cap was supplied.
    #[error("division {dividend} / {divisor} does not terminate")]
    Precision {
        /// Dividend.
        dividend: Decimal,
        /// Divisor.
        divisor: Decimal,
    },

    /// Division by zero.
    #[error("division of {dividend} by zero")]
    DivisionByZero {
        /// Dividend.
        dividend: Decimal,
    },

    /// Two amounts of different currencies were combined.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        /// Currency of the left operand.
        left: InternedStr,
        /// Currency of the right operand.
        right: InternedStr,
    },

    /// The result does not fit in a [`Decimal`].
    #[error("numeric overflow")]
    Overflow,
}

/// Result of a division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotient {
    /// The (possibly rounded) quotient.
    pub value: Decimal,
    /// Whether `value` is the exact quotient.
    pub exact: bool,
}

/// Divide `dividend` by `divisor`.
///
/// Terminating quotients are returned exactly. A non-terminating quotient
/// fails with [`NumberError::Precision`] when `cap` is `None`; otherwise it is
/// rounded half-to-even to `cap` fractional digits and flagged inexact.
///
/// ```
/// use tallyman_core::number::{divide, NumberError};
/// use rust_decimal_macros::dec;
///
/// assert_eq!(divide(dec!(100), dec!(8), None).unwrap().value, dec!(12.5));
/// assert!(matches!(divide(dec!(1), dec!(3), None), Err(NumberError::Precision { .. })));
///
/// let q = divide(dec!(1), dec!(3), Some(4)).unwrap();
/// assert_eq!(q.value, dec!(0.3333));
/// assert!(!q.exact);
/// ```
pub fn divide(dividend: Decimal, divisor: Decimal, cap: Option<u32>) -> Result<Quotient, NumberError> {
    if divisor.is_zero() {
        return Err(NumberError::DivisionByZero { dividend });
    }

    let raw = dividend
        .checked_div(divisor)
        .ok_or(NumberError::Overflow)?;

    if terminates(dividend, divisor) && raw.checked_mul(divisor) == Some(dividend) {
        return Ok(Quotient {
            value: raw.normalize(),
            exact: true,
        });
    }

    match cap {
        Some(digits) => Ok(Quotient {
            value: raw.round_dp_with_strategy(digits.min(MAX_SCALE), RoundingStrategy::MidpointNearestEven),
            exact: false,
        }),
        None => Err(NumberError::Precision { dividend, divisor }),
    }
}

/// Whether `dividend / divisor` has a finite decimal expansion.
///
/// With `a = A·10^-sa` and `b = B·10^-sb`, the quotient terminates iff
/// `B / gcd(A, B)` has no prime factors other than 2 and 5.
fn terminates(dividend: Decimal, divisor: Decimal) -> bool {
    let a = dividend.mantissa().unsigned_abs();
    let b = divisor.mantissa().unsigned_abs();
    if a == 0 {
        return true;
    }

    let mut denominator = b / gcd(a, b);
    while denominator % 2 == 0 {
        denominator /= 2;
    }
    while denominator % 5 == 0 {
        denominator /= 5;
    }
    denominator == 1
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Tolerance implied by the precision of `number`: `multiplier × 10^-scale`.
///
/// A number written with 2 fractional digits implies `0.005` with the
/// default multiplier; an integer implies `0.5`.
#[must_use]
pub fn inferred_tolerance(number: Decimal, multiplier: Decimal) -> Decimal {
    Decimal::new(1, number.scale()) * multiplier
}
