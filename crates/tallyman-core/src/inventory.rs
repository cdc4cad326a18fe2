//! Per-account holdings.
//!
//! An [`Inventory`] maps a lot signature (currency plus optional [`Cost`]) to
//! a held quantity. Positions with identical signatures are merged on
//! [`Inventory::add`], so every signature appears at most once. Positions keep
//! insertion order, which makes iteration and display deterministic.
//!
//! The inventory itself only knows how to reduce one fully identified lot or
//! a pattern that selects exactly one lot. Choosing among several candidate
//! lots is a booking policy and is decided by the caller via
//! [`BookingMethod`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::intern::InternedStr;
use crate::number::{self, NumberError};
use crate::{Amount, Cost, CostSpec, Position};

/// How reductions are matched against held lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingMethod {
    /// The reduction must identify a single lot.
    #[default]
    Strict,
    /// Like `Strict`, but an exact-size lot settles an ambiguity.
    StrictWithSize,
    /// Oldest lots first.
    Fifo,
    /// Newest lots first.
    Lifo,
    /// All lots merge into one at weighted-average cost.
    Average,
    /// No matching; quantities may go negative.
    None,
}

impl BookingMethod {
    /// Every method, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Strict,
        Self::StrictWithSize,
        Self::Fifo,
        Self::Lifo,
        Self::Average,
        Self::None,
    ];

    /// Whether held quantities must stay non-negative under this method.
    #[must_use]
    pub const fn requires_non_negative(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Error returned when a booking method name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown booking method: {0}")]
pub struct ParseBookingMethodError(pub String);

impl FromStr for BookingMethod {
    type Err = ParseBookingMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRICT" => Ok(Self::Strict),
            "STRICT_WITH_SIZE" => Ok(Self::StrictWithSize),
            "FIFO" => Ok(Self::Fifo),
            "LIFO" => Ok(Self::Lifo),
            "AVERAGE" => Ok(Self::Average),
            "NONE" => Ok(Self::None),
            _ => Err(ParseBookingMethodError(s.to_string())),
        }
    }
}

impl fmt::Display for BookingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "STRICT",
            Self::StrictWithSize => "STRICT_WITH_SIZE",
            Self::Fifo => "FIFO",
            Self::Lifo => "LIFO",
            Self::Average => "AVERAGE",
            Self::None => "NONE",
        })
    }
}

/// Errors raised by inventory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// Nothing held matches the reduction.
    #[error("no lot of {currency} matches {pattern}")]
    NoMatchingLot {
        /// Currency being reduced.
        currency: InternedStr,
        /// The pattern that selected nothing.
        pattern: CostSpec,
    },

    /// Several lots with different costs match.
    #[error("ambiguous reduction of {currency}: {candidates} lots match")]
    AmbiguousMatch {
        /// Currency being reduced.
        currency: InternedStr,
        /// Number of matching lots.
        candidates: usize,
    },

    /// The matched lot holds fewer units than requested.
    #[error("not enough {currency}: requested {requested}, held {available}")]
    InsufficientUnits {
        /// Currency being reduced.
        currency: InternedStr,
        /// Units requested (absolute).
        requested: Decimal,
        /// Units held (absolute).
        available: Decimal,
    },

    /// Arithmetic failed while averaging.
    #[error(transparent)]
    Number(#[from] NumberError),
}

/// Holdings of one account.
///
/// ```
/// use tallyman_core::{Amount, Cost, CostSpec, Inventory, Position};
/// use rust_decimal_macros::dec;
///
/// let mut inv = Inventory::new();
/// inv.add(Position::simple(Amount::new(dec!(100), "USD")));
/// inv.add(Position::with_cost(Amount::new(dec!(10), "HOOL"), Cost::new(dec!(5), "USD")));
///
/// let taken = inv.reduce(&Amount::new(dec!(-4), "HOOL"), &CostSpec::empty()).unwrap();
/// assert_eq!(taken.cost.unwrap().number, dec!(5));
/// assert_eq!(inv.units("HOOL").unwrap(), dec!(6));
/// assert_eq!(inv.balance().unwrap().get("USD"), Some(&dec!(100)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    positions: Vec<Position>,
}

impl Inventory {
    /// An empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.iter().all(Position::is_empty)
    }

    /// Number of distinct lot signatures held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Held positions, in insertion order.
    ///
    /// The returned iterator is lazy and cloning it restarts from the
    /// current position.
    pub fn lots(&self) -> std::slice::Iter<'_, Position> {
        self.positions.iter()
    }

    /// Net units of `currency`, regardless of cost.
    pub fn units(&self, currency: &str) -> Result<Decimal, NumberError> {
        self.positions
            .iter()
            .filter(|p| p.units.currency == currency)
            .try_fold(Decimal::ZERO, |sum, p| {
                sum.checked_add(p.units.number).ok_or(NumberError::Overflow)
            })
    }

    /// Net units per currency, ignoring cost. Currencies netting to zero are
    /// omitted.
    pub fn balance(&self) -> Result<BTreeMap<InternedStr, Decimal>, NumberError> {
        let mut totals: BTreeMap<InternedStr, Decimal> = BTreeMap::new();
        for pos in &self.positions {
            let total = totals.entry(pos.units.currency.clone()).or_default();
            *total = total.checked_add(pos.units.number).ok_or(NumberError::Overflow)?;
        }
        totals.retain(|_, n| !n.is_zero());
        Ok(totals)
    }

    /// Currencies held, sorted.
    #[must_use]
    pub fn currencies(&self) -> Vec<&str> {
        let mut currencies: Vec<&str> = self
            .positions
            .iter()
            .map(|p| p.units.currency.as_str())
            .collect();
        currencies.sort_unstable();
        currencies.dedup();
        currencies
    }

    /// Total cost of the lots of `currency`, per cost currency.
    pub fn book_value(&self, currency: &str) -> Result<BTreeMap<InternedStr, Decimal>, NumberError> {
        let mut totals: BTreeMap<InternedStr, Decimal> = BTreeMap::new();
        for pos in self.positions.iter().filter(|p| p.units.currency == currency) {
            let Some(book) = pos.book_value()? else { continue };
            let total = totals.entry(book.currency).or_default();
            *total = total.checked_add(book.number).ok_or(NumberError::Overflow)?;
        }
        Ok(totals)
    }

    /// Add `position`, merging it into a held lot with the same signature.
    ///
    /// A lot whose quantity reaches zero is dropped.
    ///
    /// # Panics
    ///
    /// When the merged quantity overflows; use [`Inventory::try_add`] for
    /// amounts that come from input.
    pub fn add(&mut self, position: Position) {
        if position.is_empty() {
            return;
        }
        match self.positions.iter().position(|p| p.same_lot(&position)) {
            Some(idx) => {
                let held = &mut self.positions[idx].units.number;
                *held += position.units.number;
                if held.is_zero() {
                    self.positions.remove(idx);
                }
            }
            None => self.positions.push(position),
        }
    }

    /// Add `position` like [`Inventory::add`], failing instead of
    /// overflowing. On failure the inventory is unchanged.
    pub fn try_add(&mut self, position: Position) -> Result<(), NumberError> {
        if position.is_empty() {
            return Ok(());
        }
        match self.positions.iter().position(|p| p.same_lot(&position)) {
            Some(idx) => {
                let held = &mut self.positions[idx].units.number;
                *held = held
                    .checked_add(position.units.number)
                    .ok_or(NumberError::Overflow)?;
                if held.is_zero() {
                    self.positions.remove(idx);
                }
            }
            None => self.positions.push(position),
        }
        Ok(())
    }

    /// Add every position of `other`.
    ///
    /// Stops at the first overflow, leaving the positions added so far.
    pub fn merge(&mut self, other: &Self) -> Result<(), NumberError> {
        for pos in &other.positions {
            self.try_add(pos.clone())?;
        }
        Ok(())
    }

    /// Held positions that a reduction of `units` selected by `pattern` could
    /// draw from: same currency, opposite sign.
    #[must_use]
    pub fn matching_lots(&self, units: &Amount, pattern: &CostSpec) -> Vec<&Position> {
        self.positions
            .iter()
            .filter(|p| is_opposite(p, units) && p.matches_cost_spec(pattern))
            .collect()
    }

    /// Reduce the single lot selected by `pattern` by `units`.
    ///
    /// Returns the portion removed: `units` at the lot's cost. Fails with
    /// [`InventoryError::NoMatchingLot`] when nothing matches and
    /// [`InventoryError::AmbiguousMatch`] when several lots with different
    /// signatures match. The inventory is unchanged on error.
    pub fn reduce(&mut self, units: &Amount, pattern: &CostSpec) -> Result<Position, InventoryError> {
        let cost = {
            let candidates = self.matching_lots(units, pattern);
            match candidates.as_slice() {
                [] => {
                    return Err(InventoryError::NoMatchingLot {
                        currency: units.currency.clone(),
                        pattern: pattern.clone(),
                    })
                }
                [lot] => lot.cost.clone(),
                many => {
                    return Err(InventoryError::AmbiguousMatch {
                        currency: units.currency.clone(),
                        candidates: many.len(),
                    })
                }
            }
        };
        self.reduce_lot(units, cost.as_ref())
    }

    /// Reduce the lot with exactly this signature by `units`.
    pub fn reduce_lot(&mut self, units: &Amount, cost: Option<&Cost>) -> Result<Position, InventoryError> {
        let idx = self
            .positions
            .iter()
            .position(|p| p.units.currency == units.currency && p.cost.as_ref() == cost && is_opposite(p, units))
            .ok_or_else(|| InventoryError::NoMatchingLot {
                currency: units.currency.clone(),
                pattern: cost.map(CostSpec::from_cost).unwrap_or_default(),
            })?;

        let held = self.positions[idx].units.number;
        if units.number.abs() > held.abs() {
            return Err(InventoryError::InsufficientUnits {
                currency: units.currency.clone(),
                requested: units.number.abs(),
                available: held.abs(),
            });
        }

        let remaining = held + units.number;
        if remaining.is_zero() {
            self.positions.remove(idx);
        } else {
            self.positions[idx].units.number = remaining;
        }

        Ok(Position {
            units: units.clone(),
            cost: cost.cloned(),
        })
    }

    /// Collapse every lot of `currency` into one lot at weighted-average cost.
    ///
    /// The merged lot takes the earliest acquisition date and no label. The
    /// average is computed with [`number::divide`] under `cap`. Lots in
    /// different cost currencies cannot be averaged and fail with
    /// [`InventoryError::AmbiguousMatch`]. Returns the merged lot, or `None`
    /// when there are no lots or they net to zero units.
    pub fn merge_average(&mut self, currency: &str, cap: Option<u32>) -> Result<Option<Position>, InventoryError> {
        let lots: Vec<usize> = self
            .positions
            .iter()
            .enumerate()
            .filter(|(_, p)| p.units.currency == currency && p.is_lot())
            .map(|(i, _)| i)
            .collect();

        let Some(&first) = lots.first() else {
            return Ok(None);
        };
        if lots.len() == 1 {
            return Ok(Some(self.positions[first].clone()));
        }

        let mut cost_currency: Option<&InternedStr> = None;
        let mut total_units = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;
        let mut earliest = None;
        for &i in &lots {
            let pos = &self.positions[i];
            let Some(cost) = &pos.cost else { continue };
            match cost_currency {
                Some(c) if *c != cost.currency => {
                    return Err(InventoryError::AmbiguousMatch {
                        currency: pos.units.currency.clone(),
                        candidates: lots.len(),
                    })
                }
                _ => cost_currency = Some(&cost.currency),
            }
            total_units = total_units
                .checked_add(pos.units.number)
                .ok_or(NumberError::Overflow)?;
            total_cost = pos
                .units
                .number
                .checked_mul(cost.number)
                .and_then(|c| total_cost.checked_add(c))
                .ok_or(NumberError::Overflow)?;
            earliest = match (earliest, cost.date) {
                (Some(a), Some(b)) => Some(std::cmp::min(a, b)),
                (a, b) => a.or(b),
            };
        }
        if total_units.is_zero() {
            return Ok(None);
        }

        let average = number::divide(total_cost, total_units, cap)?.value;
        let mut cost = Cost::new(average, cost_currency.cloned().unwrap_or_default());
        cost.date = earliest;
        let merged = Position::with_cost(
            Amount::new(total_units, self.positions[first].units.currency.clone()),
            cost,
        );

        for &i in lots.iter().rev() {
            self.positions.remove(i);
        }
        self.positions.insert(first, merged.clone());
        Ok(Some(merged))
    }
}

fn is_opposite(position: &Position, units: &Amount) -> bool {
    position.units.currency == units.currency
        && !position.is_empty()
        && position.units.number.is_sign_negative() != units.number.is_sign_negative()
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, pos) in self.positions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{pos}")?;
        }
        write!(f, ")")
    }
}

impl FromIterator<Position> for Inventory {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        let mut inv = Self::new();
        for pos in iter {
            inv.add(pos);
        }
        inv
    }
}
