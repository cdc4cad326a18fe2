//! Interpolation and lot booking for tallyman.
//!
//! This crate provides:
//! - Posting weights and transaction residuals
//! - Tolerance inference per currency group
//! - Interpolation (filling in elided numbers)
//! - Booking (matching reductions against held lots)
//!
//! # Interpolation
//!
//! A transaction may leave one number per currency group unwritten; it is
//! solved so that the group's weights sum to zero.
//!
//! ```
//! use tallyman_booking::{interpolate, InterpolationContext};
//! use tallyman_core::{Amount, NaiveDate, Posting, Transaction};
//! use rust_decimal_macros::dec;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//! let txn = Transaction::new(date, "Groceries")
//!     .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(50.00), "USD")))
//!     .with_posting(Posting::auto("Assets:Cash"));
//!
//! let result = interpolate(&txn, &InterpolationContext::new(date)).unwrap();
//! let cash = result.transaction.postings[1].amount().unwrap();
//! assert_eq!(cash.number, dec!(-50.00));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod book;
mod interpolate;
mod stats;
mod tolerance;

pub use book::{book_transaction, AccountBook, BookedTransaction, BookingConfig, BookingError, BookingWarning};
pub use interpolate::{
    interpolate, Elided, InexactInterpolation, InterpolationContext, InterpolationError, InterpolationResult,
};
pub use stats::BookingStats;
pub use tolerance::{parse_tolerance_map, ToleranceOptions};

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tallyman_core::{Amount, InternedStr, NumberError, Posting, PriceAnnotation, Transaction};

/// The amount a posting contributes to its transaction's balance.
///
/// - With a cost: units times per-unit cost, plus the signed total cost, in
///   the cost currency. A price next to a cost does not count.
/// - With a price: units times the per-unit price, or the signed total
///   price, in the price currency.
/// - Otherwise the units themselves.
///
/// Returns `Ok(None)` while any number or currency it needs is unwritten,
/// and an error when the product does not fit a decimal.
pub fn weight(posting: &Posting) -> Result<Option<Amount>, NumberError> {
    let Some(units) = posting.amount() else {
        return Ok(None);
    };

    if let Some(cost) = &posting.cost {
        let Some(currency) = cost.currency.clone() else {
            return Ok(None);
        };
        if cost.has_no_number() {
            return Ok(None);
        }
        let per = cost.number_per.unwrap_or(Decimal::ZERO);
        let total = cost.number_total.unwrap_or(Decimal::ZERO);
        let number = units
            .number
            .checked_mul(per)
            .and_then(|n| n.checked_add(units.number.signum() * total))
            .ok_or(NumberError::Overflow)?;
        return Ok(Some(Amount::new(number, currency)));
    }

    if let Some(price) = &posting.price {
        let Some(price_amount) = price.amount() else {
            return Ok(None);
        };
        let number = match price {
            PriceAnnotation::Unit(_) => units
                .number
                .checked_mul(price_amount.number)
                .ok_or(NumberError::Overflow)?,
            _ => units.number.signum() * price_amount.number,
        };
        return Ok(Some(Amount::new(number, price_amount.currency.clone())));
    }

    Ok(Some(units.clone()))
}

/// Currency of a posting's weight, when it can be told without numbers.
#[must_use]
pub fn weight_currency(posting: &Posting) -> Option<&InternedStr> {
    if let Some(cost) = &posting.cost {
        return cost.currency.as_ref();
    }
    if let Some(price) = &posting.price {
        return price.currency();
    }
    posting.currency()
}

/// Sum of posting weights per currency.
///
/// Postings whose weight is not yet known are skipped. A balanced
/// transaction has every residual within tolerance of zero.
pub fn residuals(transaction: &Transaction) -> Result<BTreeMap<InternedStr, Decimal>, NumberError> {
    let mut residuals: BTreeMap<InternedStr, Decimal> = BTreeMap::new();
    for posting in &transaction.postings {
        let Some(w) = weight(posting)? else { continue };
        let sum = residuals.entry(w.currency).or_default();
        *sum = sum.checked_add(w.number).ok_or(NumberError::Overflow)?;
    }
    Ok(residuals)
}

/// Whether every residual of `transaction` lies within its tolerance.
///
/// Currencies missing from `tolerances` must balance exactly. A transaction
/// whose residuals overflow is not balanced.
#[must_use]
pub fn is_balanced(transaction: &Transaction, tolerances: &BTreeMap<InternedStr, Decimal>) -> bool {
    residuals(transaction).is_ok_and(|residuals| {
        residuals.iter().all(|(currency, residual)| {
            let tolerance = tolerances.get(currency).copied().unwrap_or(Decimal::ZERO);
            residual.abs() <= tolerance
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tallyman_core::{CostSpec, IncompleteAmount, NaiveDate};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_weight_plain_units() {
        let p = Posting::new("Assets:Cash", Amount::new(dec!(-100.00), "USD"));
        assert_eq!(weight(&p).unwrap(), Some(Amount::new(dec!(-100.00), "USD")));
    }

    #[test]
    fn test_weight_at_cost_ignores_price() {
        let p = Posting::new("Assets:Stock", Amount::new(dec!(10), "AAPL"))
            .with_cost(CostSpec::empty().with_number_per(dec!(150)).with_currency("USD"))
            .with_price(PriceAnnotation::unit(Amount::new(dec!(170), "USD")));
        assert_eq!(weight(&p).unwrap(), Some(Amount::new(dec!(1500), "USD")));
    }

    #[test]
    fn test_weight_total_cost_is_signed() {
        let p = Posting::new("Assets:Stock", Amount::new(dec!(-4), "AAPL")).with_cost(
            CostSpec::empty()
                .with_number_per(dec!(10))
                .with_number_total(dec!(2))
                .with_currency("USD"),
        );
        assert_eq!(weight(&p).unwrap().unwrap().number, dec!(-42));
    }

    #[test]
    fn test_weight_prices() {
        let unit = Posting::new("Assets:EUR", Amount::new(dec!(100), "EUR"))
            .with_price(PriceAnnotation::unit(Amount::new(dec!(1.10), "USD")));
        assert_eq!(weight(&unit).unwrap().unwrap().number, dec!(110.00));

        let total = Posting::new("Assets:EUR", Amount::new(dec!(-100), "EUR"))
            .with_price(PriceAnnotation::total(Amount::new(dec!(112), "USD")));
        assert_eq!(weight(&total).unwrap(), Some(Amount::new(dec!(-112), "USD")));
    }

    #[test]
    fn test_weight_unknown() {
        assert!(weight(&Posting::auto("Assets:Cash")).unwrap().is_none());

        let elided_cost = Posting::new("Assets:Stock", Amount::new(dec!(10), "AAPL"))
            .with_cost(CostSpec::empty().with_currency("USD"));
        assert!(weight(&elided_cost).unwrap().is_none());
        assert_eq!(weight_currency(&elided_cost).map(InternedStr::as_str), Some("USD"));

        let elided_units =
            Posting::with_incomplete("Assets:Cash", IncompleteAmount::currency_only("USD"));
        assert!(weight(&elided_units).unwrap().is_none());
        assert_eq!(weight_currency(&elided_units).map(InternedStr::as_str), Some("USD"));
    }

    #[test]
    fn test_residuals_and_balance() {
        let txn = Transaction::new(date(2024, 1, 15), "Coffee")
            .with_posting(Posting::new("Expenses:Coffee", Amount::new(dec!(5.00), "USD")))
            .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-4.996), "USD")));

        let res = residuals(&txn).unwrap();
        assert_eq!(res["USD"], dec!(0.004));

        let mut tolerances = BTreeMap::new();
        assert!(!is_balanced(&txn, &tolerances));
        tolerances.insert(InternedStr::from("USD"), dec!(0.005));
        assert!(is_balanced(&txn, &tolerances));
    }

    #[test]
    fn test_weight_overflow_is_an_error() {
        let p = Posting::new("Assets:Stock", Amount::new(Decimal::MAX, "AAPL"))
            .with_cost(CostSpec::empty().with_number_per(dec!(2)).with_currency("USD"));
        assert_eq!(weight(&p), Err(NumberError::Overflow));
    }

    #[test]
    fn test_residual_overflow_is_unbalanced() {
        let txn = Transaction::new(date(2024, 1, 15), "Huge")
            .with_posting(Posting::new("Assets:A", Amount::new(Decimal::MAX, "USD")))
            .with_posting(Posting::new("Assets:B", Amount::new(Decimal::MAX, "USD")));

        assert_eq!(residuals(&txn), Err(NumberError::Overflow));
        assert!(!is_balanced(&txn, &BTreeMap::new()));
    }
}
