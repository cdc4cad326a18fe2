//! Units held at an optional cost.
//!
//! A [`Position`] is one entry of an [`Inventory`](crate::Inventory). With a
//! cost it is a lot: a distinct acquisition tracked for cost basis. Without a
//! cost it is a plain holding such as cash.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::number::NumberError;
use crate::{Amount, Cost, CostSpec};

/// Units of a currency, optionally held at a cost.
///
/// ```
/// use tallyman_core::{Amount, Cost, Position};
/// use rust_decimal_macros::dec;
///
/// let cash = Position::simple(Amount::new(dec!(1000.00), "USD"));
/// assert!(!cash.is_lot());
///
/// let shares = Position::with_cost(Amount::new(dec!(10), "HOOL"), Cost::new(dec!(500), "USD"));
/// assert_eq!(shares.book_value().unwrap().unwrap().number, dec!(5000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Units held.
    pub units: Amount,
    /// Cost basis, for lots.
    pub cost: Option<Cost>,
}

impl Position {
    /// A holding without cost.
    #[must_use]
    pub const fn simple(units: Amount) -> Self {
        Self { units, cost: None }
    }

    /// A lot held at `cost`.
    #[must_use]
    pub const fn with_cost(units: Amount, cost: Cost) -> Self {
        Self {
            units,
            cost: Some(cost),
        }
    }

    /// Whether no units are held.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.units.is_zero()
    }

    /// Whether this position carries a cost.
    #[must_use]
    pub const fn is_lot(&self) -> bool {
        self.cost.is_some()
    }

    /// Currency of the units.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.units.currency
    }

    /// Currency of the cost, for lots.
    #[must_use]
    pub fn cost_currency(&self) -> Option<&str> {
        self.cost.as_ref().map(|c| c.currency.as_str())
    }

    /// Total cost of the units held, for lots.
    pub fn book_value(&self) -> Result<Option<Amount>, NumberError> {
        self.cost
            .as_ref()
            .map(|c| c.total_cost(self.units.number))
            .transpose()
    }

    /// Whether `other` has the same currency and cost, so the two merge.
    #[must_use]
    pub fn same_lot(&self, other: &Self) -> bool {
        self.units.currency == other.units.currency && self.cost == other.cost
    }

    /// Whether this position is selected by `spec`.
    ///
    /// A holding without cost is only selected by an empty spec.
    #[must_use]
    pub fn matches_cost_spec(&self, spec: &CostSpec) -> bool {
        match &self.cost {
            Some(cost) => spec.matches(cost),
            None => spec.is_empty(),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.units)?;
        if let Some(cost) = &self.cost {
            write!(f, " {cost}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_lot_accessors() {
        let cost = Cost::new(dec!(150.00), "USD").with_date(date(2024, 1, 15));
        let pos = Position::with_cost(Amount::new(dec!(10), "AAPL"), cost);

        assert!(pos.is_lot());
        assert_eq!(pos.currency(), "AAPL");
        assert_eq!(pos.cost_currency(), Some("USD"));
        assert_eq!(pos.book_value().unwrap().unwrap().number, dec!(1500.00));
    }

    #[test]
    fn test_simple_has_no_book_value() {
        let pos = Position::simple(Amount::new(dec!(1000.00), "USD"));
        assert!(pos.book_value().unwrap().is_none());
        assert!(Position::simple(Amount::zero("USD")).is_empty());
    }

    #[test]
    fn test_same_lot() {
        let a = Position::with_cost(Amount::new(dec!(1), "AAPL"), Cost::new(dec!(5), "USD"));
        let b = Position::with_cost(Amount::new(dec!(3), "AAPL"), Cost::new(dec!(5), "USD"));
        let c = Position::with_cost(
            Amount::new(dec!(3), "AAPL"),
            Cost::new(dec!(5), "USD").with_label("x"),
        );
        assert!(a.same_lot(&b));
        assert!(!a.same_lot(&c));
        assert!(!a.same_lot(&Position::simple(Amount::new(dec!(1), "AAPL"))));
    }

    #[test]
    fn test_matches_cost_spec() {
        let lot = Position::with_cost(Amount::new(dec!(10), "AAPL"), Cost::new(dec!(150), "USD"));
        assert!(lot.matches_cost_spec(&CostSpec::empty()));
        assert!(lot.matches_cost_spec(&CostSpec::empty().with_currency("USD")));
        assert!(!lot.matches_cost_spec(&CostSpec::empty().with_number_per(dec!(160))));

        let cash = Position::simple(Amount::new(dec!(10), "USD"));
        assert!(cash.matches_cost_spec(&CostSpec::empty()));
        assert!(!cash.matches_cost_spec(&CostSpec::empty().with_currency("USD")));
    }

    #[test]
    fn test_display() {
        let pos = Position::with_cost(Amount::new(dec!(10), "AAPL"), Cost::new(dec!(150.00), "USD"));
        assert_eq!(pos.to_string(), "10 AAPL {150.00 USD}");
    }
}
