//! Price database for tallyman.
//!
//! Stores currency quotes per (base, quote) pair in date order and answers
//! "what was the rate on or before this date" questions. A database lives for
//! one processing run; nothing here is global.
//!
//! # Example
//!
//! ```
//! use tallyman_prices::{PriceDatabase, PriceEntry};
//! use tallyman_core::NaiveDate;
//! use rust_decimal_macros::dec;
//!
//! let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
//! let mut db = PriceDatabase::new();
//! db.record(PriceEntry::new(d(1, 1), "HOOL", "USD", dec!(500))).unwrap();
//! db.record(PriceEntry::new(d(2, 1), "HOOL", "USD", dec!(520))).unwrap();
//!
//! assert_eq!(db.lookup("HOOL", "USD", d(1, 15)).unwrap().value, dec!(500));
//! assert_eq!(db.lookup("USD", "HOOL", d(3, 1)).unwrap().value.round_dp(4), dec!(0.0019));
//! assert!(db.lookup("HOOL", "USD", d(1, 1).pred_opt().unwrap()).is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tallyman_core::number::{self, MAX_SCALE};
use tallyman_core::{InternedStr, Price};
use thiserror::Error;
use tracing::trace;

/// One quote: on `date`, one unit of `base` is worth `rate` units of `quote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceEntry {
    /// Date of the quote.
    pub date: NaiveDate,
    /// Currency being priced.
    pub base: InternedStr,
    /// Currency the price is expressed in.
    pub quote: InternedStr,
    /// Units of `quote` per unit of `base`.
    pub rate: Decimal,
}

impl PriceEntry {
    /// Create a quote.
    #[must_use]
    pub fn new(
        date: NaiveDate,
        base: impl Into<InternedStr>,
        quote: impl Into<InternedStr>,
        rate: Decimal,
    ) -> Self {
        Self {
            date,
            base: base.into(),
            quote: quote.into(),
            rate,
        }
    }
}

impl From<&Price> for PriceEntry {
    fn from(price: &Price) -> Self {
        Self {
            date: price.date,
            base: price.currency.clone(),
            quote: price.amount.currency.clone(),
            rate: price.amount.number,
        }
    }
}

/// Errors raised by the price database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    /// A quote is dated before the latest quote already recorded for its pair.
    #[error("price of {base} in {quote} on {date} is earlier than the last recorded price on {last}")]
    OutOfOrderPrice {
        /// Base currency.
        base: InternedStr,
        /// Quote currency.
        quote: InternedStr,
        /// Date of the rejected quote.
        date: NaiveDate,
        /// Date of the latest recorded quote.
        last: NaiveDate,
    },

    /// No quote for the pair (or its inverse) exists on or before the date.
    #[error("no price of {base} in {quote} on or before {date}")]
    NoPriceAvailable {
        /// Base currency.
        base: InternedStr,
        /// Quote currency.
        quote: InternedStr,
        /// Lookup date.
        date: NaiveDate,
    },
}

/// Result of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    /// Units of the quote currency per unit of the base currency.
    pub value: Decimal,
    /// Date of the quote the rate comes from.
    pub date: NaiveDate,
    /// Whether the rate was derived from the inverse pair.
    pub inverted: bool,
    /// Whether `value` is exact (an inverse can require rounding).
    pub exact: bool,
}

/// Quotes per (base, quote) pair, each list in non-decreasing date order.
#[derive(Debug, Clone, Default)]
pub struct PriceDatabase {
    pairs: HashMap<(InternedStr, InternedStr), Vec<(NaiveDate, Decimal)>>,
}

impl PriceDatabase {
    /// An empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a quote.
    ///
    /// Quotes for one pair must arrive in non-decreasing date order; an
    /// earlier quote fails with [`PriceError::OutOfOrderPrice`] and is not
    /// recorded. Several quotes on one date are kept; the last one wins.
    pub fn record(&mut self, entry: PriceEntry) -> Result<(), PriceError> {
        let quotes = self
            .pairs
            .entry((entry.base.clone(), entry.quote.clone()))
            .or_default();

        if let Some(&(last, _)) = quotes.last() {
            if entry.date < last {
                return Err(PriceError::OutOfOrderPrice {
                    base: entry.base,
                    quote: entry.quote,
                    date: entry.date,
                    last,
                });
            }
        }

        trace!(base = %entry.base, quote = %entry.quote, date = %entry.date, rate = %entry.rate, "price recorded");
        quotes.push((entry.date, entry.rate));
        Ok(())
    }

    /// Record a price directive.
    pub fn record_directive(&mut self, price: &Price) -> Result<(), PriceError> {
        self.record(PriceEntry::from(price))
    }

    /// The latest rate of `base` in `quote` dated on or before `date`.
    ///
    /// Direct quotes are preferred; otherwise the reciprocal of the inverse
    /// pair is used, rounded to the full decimal precision when it does not
    /// terminate. A currency is always worth one of itself.
    pub fn lookup(&self, base: &str, quote: &str, date: NaiveDate) -> Result<Rate, PriceError> {
        if base == quote {
            return Ok(Rate {
                value: Decimal::ONE,
                date,
                inverted: false,
                exact: true,
            });
        }

        if let Some((on, value)) = self.latest(base, quote, date) {
            return Ok(Rate {
                value,
                date: on,
                inverted: false,
                exact: true,
            });
        }

        if let Some((on, inverse)) = self.latest(quote, base, date) {
            if let Ok(q) = number::divide(Decimal::ONE, inverse, Some(MAX_SCALE)) {
                return Ok(Rate {
                    value: q.value,
                    date: on,
                    inverted: true,
                    exact: q.exact,
                });
            }
        }

        Err(PriceError::NoPriceAvailable {
            base: base.into(),
            quote: quote.into(),
            date,
        })
    }

    fn latest(&self, base: &str, quote: &str, date: NaiveDate) -> Option<(NaiveDate, Decimal)> {
        let quotes = self.pairs.get(&(InternedStr::from(base), InternedStr::from(quote)))?;
        let upto = quotes.partition_point(|&(d, _)| d <= date);
        upto.checked_sub(1).map(|i| quotes[i])
    }

    /// Number of quotes recorded.
    pub fn len(&self) -> usize {
        self.pairs.values().map(Vec::len).sum()
    }

    /// Whether no quote has been recorded.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
