//! Acquisition costs and cost specifications.
//!
//! A [`Cost`] is the fully known cost basis of a lot. A [`CostSpec`] is what a
//! posting writes between braces: any of its fields may be missing, and it
//! serves both to describe a new lot and to select existing ones.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::intern::InternedStr;
use crate::number::{self, NumberError, Quotient};
use crate::Amount;

/// Per-unit cost of a lot, with its acquisition date and optional label.
///
/// ```
/// use tallyman_core::Cost;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let cost = Cost::new(dec!(518.73), "USD")
///     .with_date(NaiveDate::from_ymd_opt(2015, 2, 1).unwrap())
///     .with_label("ref-001");
/// assert_eq!(cost.total_cost(dec!(10)).unwrap().number, dec!(5187.30));
/// assert_eq!(cost.to_string(), "{518.73 USD, 2015-02-01, \"ref-001\"}");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cost {
    /// Cost per unit.
    pub number: Decimal,
    /// Cost currency.
    pub currency: InternedStr,
    /// Acquisition date.
    pub date: Option<NaiveDate>,
    /// Label distinguishing otherwise identical lots.
    pub label: Option<String>,
}

impl Cost {
    /// Create a cost without date or label.
    #[must_use]
    pub fn new(number: Decimal, currency: impl Into<InternedStr>) -> Self {
        Self {
            number,
            currency: currency.into(),
            date: None,
            label: None,
        }
    }

    /// Set the acquisition date.
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Per-unit cost as an amount.
    #[must_use]
    pub fn as_amount(&self) -> Amount {
        Amount::new(self.number, self.currency.clone())
    }

    /// Cost of `units` units, signed like `units`.
    pub fn total_cost(&self, units: Decimal) -> Result<Amount, NumberError> {
        Amount::new(units, self.currency.clone()).mul(self.number)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} {}", self.number, self.currency)?;
        if let Some(date) = self.date {
            write!(f, ", {date}")?;
        }
        if let Some(label) = &self.label {
            write!(f, ", \"{label}\"")?;
        }
        write!(f, "}}")
    }
}

/// A cost as written on a posting, possibly partial.
///
/// `{502.12 USD}` sets `number_per`, `{{5021.20 USD}}` sets `number_total`,
/// `{502 # 9.95 USD}` sets both (per-unit plus a total added over all units),
/// and `{}` leaves every number to be inferred or matched.
///
/// When used to select lots, every field that is present must agree with the
/// lot's [`Cost`]:
///
/// ```
/// use tallyman_core::{Cost, CostSpec};
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let d = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
/// let cost = Cost::new(dec!(150), "USD").with_date(d);
///
/// assert!(CostSpec::empty().matches(&cost));
/// assert!(CostSpec::empty().with_date(d).matches(&cost));
/// assert!(!CostSpec::empty().with_number_per(dec!(151)).matches(&cost));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CostSpec {
    /// Cost per unit.
    pub number_per: Option<Decimal>,
    /// Total cost over all units.
    pub number_total: Option<Decimal>,
    /// Cost currency.
    pub currency: Option<InternedStr>,
    /// Acquisition date.
    pub date: Option<NaiveDate>,
    /// Lot label.
    pub label: Option<String>,
    /// `{*}`: merge all lots at average cost.
    pub merge: bool,
}

impl CostSpec {
    /// A spec with nothing filled in.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the per-unit number.
    #[must_use]
    pub const fn with_number_per(mut self, number: Decimal) -> Self {
        self.number_per = Some(number);
        self
    }

    /// Set the total number.
    #[must_use]
    pub const fn with_number_total(mut self, number: Decimal) -> Self {
        self.number_total = Some(number);
        self
    }

    /// Set the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<InternedStr>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Set the date.
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the merge marker.
    #[must_use]
    pub const fn with_merge(mut self) -> Self {
        self.merge = true;
        self
    }

    /// A spec describing exactly `cost`.
    #[must_use]
    pub fn from_cost(cost: &Cost) -> Self {
        Self {
            number_per: Some(cost.number),
            number_total: None,
            currency: Some(cost.currency.clone()),
            date: cost.date,
            label: cost.label.clone(),
            merge: false,
        }
    }

    /// Whether nothing at all is specified.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.number_per.is_none()
            && self.number_total.is_none()
            && self.currency.is_none()
            && self.date.is_none()
            && self.label.is_none()
            && !self.merge
    }

    /// Whether neither a per-unit nor a total number is given.
    #[must_use]
    pub const fn has_no_number(&self) -> bool {
        self.number_per.is_none() && self.number_total.is_none()
    }

    /// Per-unit cost for a posting of `units` units.
    ///
    /// Returns `Ok(None)` when no number is written. A total is spread over
    /// `|units|`, which fails with [`NumberError::DivisionByZero`] for zero
    /// units.
    pub fn per_unit(&self, units: Decimal, cap: Option<u32>) -> Result<Option<Quotient>, NumberError> {
        let per = self.number_per.unwrap_or(Decimal::ZERO);
        match self.number_total {
            None => Ok(self.number_per.map(|value| Quotient { value, exact: true })),
            Some(total) => {
                let share = number::divide(total, units.abs(), cap)?;
                let value = per.checked_add(share.value).ok_or(NumberError::Overflow)?;
                Ok(Some(Quotient {
                    value,
                    exact: share.exact,
                }))
            }
        }
    }

    /// Build the cost of a new lot from a solved per-unit number.
    ///
    /// The spec's own date and label win; `date` is used when none is written.
    #[must_use]
    pub fn to_cost(&self, number: Decimal, currency: InternedStr, date: NaiveDate) -> Cost {
        Cost {
            number,
            currency,
            date: self.date.or(Some(date)),
            label: self.label.clone(),
        }
    }

    /// Whether every written field agrees with `cost`.
    ///
    /// Only the per-unit number takes part in matching; a total depends on
    /// the posting's units and is compared after [`CostSpec::per_unit`].
    #[must_use]
    pub fn matches(&self, cost: &Cost) -> bool {
        self.number_per.map_or(true, |n| n == cost.number)
            && self.currency.as_ref().map_or(true, |c| *c == cost.currency)
            && self.date.map_or(true, |d| cost.date == Some(d))
            && self
                .label
                .as_ref()
                .map_or(true, |l| cost.label.as_ref() == Some(l))
    }
}

impl fmt::Display for CostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        match (self.number_per, self.number_total) {
            (Some(per), Some(total)) => parts.push(format!("{per} # {total}")),
            (Some(per), None) => parts.push(per.to_string()),
            (None, Some(total)) => parts.push(format!("# {total}")),
            (None, None) => {}
        }
        if let Some(c) = &self.currency {
            match parts.last_mut() {
                Some(number) => {
                    number.push(' ');
                    number.push_str(c);
                }
                None => parts.push(c.to_string()),
            }
        }
        if let Some(d) = self.date {
            parts.push(d.to_string());
        }
        if let Some(l) = &self.label {
            parts.push(format!("\"{l}\""));
        }
        if self.merge {
            parts.push("*".to_string());
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}
