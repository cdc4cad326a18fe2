//! Filling in elided numbers.
//!
//! Postings are grouped by the currency of their weight. Within a group the
//! written weights are summed and at most one unwritten number is solved so
//! that the group sums to zero. A posting with nothing but an account (an
//! auto posting) absorbs whatever groups are left over.

use chrono::NaiveDate;
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tallyman_core::number::{self, NumberError};
use tallyman_core::{Amount, IncompleteAmount, InternedStr, Posting, PriceAnnotation, Transaction};
use tallyman_prices::{PriceDatabase, PriceError};
use thiserror::Error;
use tracing::trace;

use crate::{weight, weight_currency};

/// Errors that prevent a transaction from being interpolated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolationError {
    /// More than one posting has no units, cost or price.
    #[error("{count} postings without amounts; at most one can be inferred")]
    TooManyAutoPostings {
        /// Number of auto postings.
        count: usize,
    },

    /// A currency group has more than one unwritten number.
    #[error("cannot solve {unknowns} missing numbers in the {currency} group")]
    UnderConstrained {
        /// The group's currency.
        currency: InternedStr,
        /// Unwritten numbers in the group.
        unknowns: usize,
        /// Why the price database could not supply a missing price.
        missing_price: Option<PriceError>,
    },

    /// A number or currency cannot be determined.
    #[error("cannot interpolate posting to {account}: {reason}")]
    CannotInterpolate {
        /// Account of the offending posting.
        account: InternedStr,
        /// What is missing.
        reason: String,
    },

    /// Arithmetic failed while solving.
    #[error("cannot interpolate posting to {account}: {source}")]
    Number {
        /// Account of the offending posting.
        account: InternedStr,
        /// Underlying failure.
        source: NumberError,
    },
}

/// Which number of a posting was unwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Elided {
    /// The units number.
    Units,
    /// The per-unit cost.
    Cost,
    /// The price number.
    Price,
}

impl fmt::Display for Elided {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Units => "units",
            Self::Cost => "cost",
            Self::Price => "price",
        })
    }
}

/// A solved number that had to be rounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InexactInterpolation {
    /// Account of the posting.
    pub account: InternedStr,
    /// Which number was rounded.
    pub elided: Elided,
    /// The rounded value.
    pub value: Decimal,
}

impl fmt::Display for InexactInterpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interpolated {} of posting to {} rounded to {}",
            self.elided, self.account, self.value
        )
    }
}

/// Inputs interpolation needs besides the transaction.
#[derive(Debug, Clone, Copy)]
pub struct InterpolationContext<'a> {
    /// Date for price lookups.
    pub date: NaiveDate,
    /// Prices to fall back on when a group has too many unknowns.
    pub prices: Option<&'a PriceDatabase>,
    /// Fractional digits to round non-terminating divisions to; `None`
    /// makes them fail.
    pub precision: Option<u32>,
}

impl<'a> InterpolationContext<'a> {
    /// A context without prices or rounding.
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self {
            date,
            prices: None,
            precision: None,
        }
    }

    /// Use `prices` for the price fallback.
    #[must_use]
    pub const fn with_prices(mut self, prices: &'a PriceDatabase) -> Self {
        self.prices = Some(prices);
        self
    }

    /// Round non-terminating divisions to `precision` digits.
    #[must_use]
    pub const fn with_precision(mut self, precision: Option<u32>) -> Self {
        self.precision = precision;
        self
    }
}

/// Result of interpolation.
#[derive(Debug, Clone)]
pub struct InterpolationResult {
    /// The transaction with every solvable number filled in.
    pub transaction: Transaction,
    /// Postings that received a number, by index in `transaction`.
    pub filled: Vec<(usize, Elided)>,
    /// Solutions that had to be rounded.
    pub inexact: Vec<InexactInterpolation>,
    /// Prices taken from the price database.
    pub price_lookups: usize,
}

impl InterpolationResult {
    /// Number of filled numbers of the given kind.
    #[must_use]
    pub fn count(&self, elided: Elided) -> usize {
        self.filled.iter().filter(|(_, e)| *e == elided).count()
    }
}

#[derive(Debug, Default)]
struct Group {
    sum: Decimal,
    unknowns: Vec<(usize, Elided)>,
}

enum Term {
    Known(Amount),
    Unknown(InternedStr, Elided),
}

/// Fill in the elided numbers of `transaction`.
///
/// Returns the completed transaction. Groups that have no unknown and no
/// auto posting to absorb them are left as they are; whether they balance
/// is for the caller to check.
pub fn interpolate(
    transaction: &Transaction,
    ctx: &InterpolationContext<'_>,
) -> Result<InterpolationResult, InterpolationError> {
    let mut postings = transaction.postings.clone();

    let autos: Vec<usize> = postings
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_auto() && !p.resolved)
        .map(|(i, _)| i)
        .collect();
    if autos.len() > 1 {
        return Err(InterpolationError::TooManyAutoPostings { count: autos.len() });
    }
    let auto = autos.first().copied();

    infer_currencies(&mut postings, auto)?;

    let mut groups: BTreeMap<InternedStr, Group> = BTreeMap::new();
    for (i, posting) in postings.iter().enumerate() {
        if Some(i) == auto {
            continue;
        }
        match classify(posting)? {
            Term::Known(w) => {
                let group = groups.entry(w.currency).or_default();
                group.sum = group.sum.checked_add(w.number).ok_or_else(|| overflow(posting))?;
            }
            Term::Unknown(currency, elided) => {
                if posting.resolved {
                    return Err(cannot(posting, "posting is marked resolved but a number is missing"));
                }
                groups.entry(currency).or_default().unknowns.push((i, elided));
            }
        }
    }

    let mut filled = Vec::new();
    let mut inexact = Vec::new();
    let mut price_lookups = 0;

    // An auto posting spreads over every group, so it is one more unknown
    // in each of them.
    let auto_unknowns = usize::from(auto.is_some());
    for (currency, group) in &mut groups {
        if group.unknowns.len() + auto_unknowns < 2 {
            continue;
        }
        let missing_price = fill_prices_from_database(
            &mut postings,
            currency,
            group,
            ctx,
            &mut filled,
            &mut inexact,
            &mut price_lookups,
        )?;
        let unknowns = group.unknowns.len() + auto_unknowns;
        if unknowns > 1 {
            return Err(InterpolationError::UnderConstrained {
                currency: currency.clone(),
                unknowns,
                missing_price,
            });
        }
    }

    for group in groups.values() {
        if let [(i, elided)] = group.unknowns[..] {
            if let Some(rounded) = solve(&mut postings[i], elided, -group.sum, ctx.precision)? {
                inexact.push(rounded);
            }
            filled.push((i, elided));
        }
    }

    if let Some(a) = auto {
        let mut fills: Vec<Amount> = groups
            .iter()
            .filter(|(_, g)| g.unknowns.is_empty() && !g.sum.is_zero())
            .map(|(currency, g)| Amount::new(-g.sum, currency.clone()))
            .collect();
        if fills.is_empty() {
            match groups.keys().collect::<Vec<_>>().as_slice() {
                [only] => fills.push(Amount::zero((*only).clone())),
                _ => return Err(cannot(&postings[a], "no currency to infer the amount in")),
            }
        }

        let extra = fills.len() - 1;
        for (i, _) in &mut filled {
            if *i > a {
                *i += extra;
            }
        }
        let template = postings[a].clone();
        let expanded = fills.into_iter().map(|amount| {
            let mut p = template.clone();
            p.units = Some(IncompleteAmount::Complete(amount));
            p.resolved = true;
            p
        });
        postings.splice(a..=a, expanded);
        filled.extend((a..=a + extra).map(|i| (i, Elided::Units)));
    }

    filled.sort_by_key(|(i, _)| *i);
    trace!(date = %transaction.date, filled = filled.len(), "interpolated");

    let mut transaction = transaction.clone();
    transaction.postings = postings;
    Ok(InterpolationResult {
        transaction,
        filled,
        inexact,
        price_lookups,
    })
}

fn cannot(posting: &Posting, reason: &str) -> InterpolationError {
    InterpolationError::CannotInterpolate {
        account: posting.account.clone(),
        reason: reason.to_string(),
    }
}

fn overflow(posting: &Posting) -> InterpolationError {
    InterpolationError::Number {
        account: posting.account.clone(),
        source: NumberError::Overflow,
    }
}

fn needs_currency(posting: &Posting) -> bool {
    if let Some(cost) = &posting.cost {
        return cost.currency.is_none();
    }
    if let Some(price) = &posting.price {
        return price.currency().is_none();
    }
    matches!(posting.units, Some(IncompleteAmount::NumberOnly(_)))
}

/// Give every cost, price or bare number without a currency the currency of
/// the single other group in the transaction.
fn infer_currencies(postings: &mut [Posting], auto: Option<usize>) -> Result<(), InterpolationError> {
    let known: Vec<Option<InternedStr>> = postings.iter().map(|p| weight_currency(p).cloned()).collect();

    for i in 0..postings.len() {
        if Some(i) == auto || !needs_currency(&postings[i]) {
            continue;
        }
        let others: BTreeSet<&InternedStr> = known
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i && Some(*j) != auto)
            .filter_map(|(_, c)| c.as_ref())
            .collect();
        let currency = match others.into_iter().collect::<Vec<_>>().as_slice() {
            [only] => (*only).clone(),
            _ => return Err(cannot(&postings[i], "cannot infer currency")),
        };

        let posting = &mut postings[i];
        if let Some(cost) = &mut posting.cost {
            cost.currency = Some(currency);
        } else if let Some(price) = &posting.price {
            posting.price = Some(price_with(price, price.number(), currency));
        } else if let Some(IncompleteAmount::NumberOnly(n)) = posting.units {
            posting.units = Some(IncompleteAmount::complete(n, currency));
        }
    }
    Ok(())
}

fn classify(posting: &Posting) -> Result<Term, InterpolationError> {
    let Some(units) = &posting.units else {
        return Err(cannot(posting, "units are missing"));
    };
    if matches!(units, IncompleteAmount::NumberOnly(_)) {
        return Err(cannot(posting, "units currency is unknown"));
    }
    let u = units.number();
    let known = || match weight(posting) {
        Ok(Some(w)) => Ok(Term::Known(w)),
        Ok(None) => Err(cannot(posting, "weight is unknown")),
        Err(source) => Err(InterpolationError::Number {
            account: posting.account.clone(),
            source,
        }),
    };
    let both = |currency: &InternedStr| InterpolationError::UnderConstrained {
        currency: currency.clone(),
        unknowns: 2,
        missing_price: None,
    };

    if let Some(cost) = &posting.cost {
        let Some(currency) = &cost.currency else {
            return Err(cannot(posting, "cost currency is unknown"));
        };
        return match (u, cost.has_no_number()) {
            (Some(_), false) => known(),
            (None, false) if cost.number_total.is_some() => {
                Err(cannot(posting, "units cannot be solved from a total cost"))
            }
            (None, false) => Ok(Term::Unknown(currency.clone(), Elided::Units)),
            (Some(n), true) if n.is_zero() => Err(cannot(posting, "zero units with an unspecified cost")),
            (Some(_), true) => Ok(Term::Unknown(currency.clone(), Elided::Cost)),
            (None, true) => Err(both(currency)),
        };
    }

    if let Some(price) = &posting.price {
        let Some(currency) = price.currency() else {
            return Err(cannot(posting, "price currency is unknown"));
        };
        return match (u, price.number()) {
            (Some(_), Some(_)) => known(),
            (None, Some(_)) if !price.is_unit() => {
                Err(cannot(posting, "units cannot be solved from a total price"))
            }
            (None, Some(_)) => Ok(Term::Unknown(currency.clone(), Elided::Units)),
            (Some(n), None) if n.is_zero() => Err(cannot(posting, "zero units with an unspecified price")),
            (Some(_), None) => Ok(Term::Unknown(currency.clone(), Elided::Price)),
            (None, None) => Err(both(currency)),
        };
    }

    match (u, units.currency()) {
        (Some(_), _) => known(),
        (None, Some(currency)) => Ok(Term::Unknown(currency.clone(), Elided::Units)),
        (None, None) => Err(cannot(posting, "units are missing")),
    }
}

/// Fill per-unit prices of `group` from the price database. Returns the
/// last lookup failure, or an error when a filled weight overflows the sum.
fn fill_prices_from_database(
    postings: &mut [Posting],
    currency: &InternedStr,
    group: &mut Group,
    ctx: &InterpolationContext<'_>,
    filled: &mut Vec<(usize, Elided)>,
    inexact: &mut Vec<InexactInterpolation>,
    lookups: &mut usize,
) -> Result<Option<PriceError>, InterpolationError> {
    let Some(prices) = ctx.prices else {
        return Ok(None);
    };
    let mut missing = None;
    let mut overflowed = None;

    group.unknowns.retain(|&(i, elided)| {
        if elided != Elided::Price {
            return true;
        }
        let posting = &mut postings[i];
        let (Some(price), Some(units)) = (posting.price.clone(), posting.amount().cloned()) else {
            return true;
        };
        if !price.is_unit() {
            return true;
        }
        match prices.lookup(&units.currency, currency, ctx.date) {
            Ok(rate) => {
                let Some(sum) = units
                    .number
                    .checked_mul(rate.value)
                    .and_then(|w| group.sum.checked_add(w))
                else {
                    overflowed = Some(overflow(posting));
                    return true;
                };
                group.sum = sum;
                posting.price = Some(price_with(&price, Some(rate.value), currency.clone()));
                posting.resolved = true;
                if !rate.exact {
                    inexact.push(InexactInterpolation {
                        account: posting.account.clone(),
                        elided: Elided::Price,
                        value: rate.value,
                    });
                }
                filled.push((i, Elided::Price));
                *lookups += 1;
                false
            }
            Err(e) => {
                missing = Some(e);
                true
            }
        }
    });
    match overflowed {
        Some(err) => Err(err),
        None => Ok(missing),
    }
}

/// Rebuild `price` with `number` and `currency`.
fn price_with(price: &PriceAnnotation, number: Option<Decimal>, currency: InternedStr) -> PriceAnnotation {
    let amount = match number {
        Some(n) => IncompleteAmount::complete(n, currency),
        None => IncompleteAmount::CurrencyOnly(currency),
    };
    if price.is_unit() {
        PriceAnnotation::Unit(amount)
    } else {
        PriceAnnotation::Total(amount)
    }
}

/// Give `posting` the number that makes its weight equal `target`.
fn solve(
    posting: &mut Posting,
    elided: Elided,
    target: Decimal,
    cap: Option<u32>,
) -> Result<Option<InexactInterpolation>, InterpolationError> {
    let account = posting.account.clone();
    let divide = |divisor: Decimal| {
        number::divide(target, divisor, cap).map_err(|source| InterpolationError::Number {
            account: account.clone(),
            source,
        })
    };

    let (value, exact) = match elided {
        Elided::Units => {
            let divisor = match (&posting.cost, &posting.price) {
                (Some(cost), _) => cost.number_per,
                (None, Some(price)) => price.number(),
                (None, None) => None,
            };
            let q = match divisor {
                Some(d) => divide(d)?,
                None => number::Quotient { value: target, exact: true },
            };
            let currency = posting
                .currency()
                .cloned()
                .ok_or_else(|| cannot(posting, "units currency is unknown"))?;
            posting.units = Some(IncompleteAmount::complete(q.value, currency));
            (q.value, q.exact)
        }
        Elided::Cost => {
            let units = posting.amount().map_or(Decimal::ZERO, |a| a.number);
            let q = divide(units)?;
            if q.value.is_sign_negative() && !q.value.is_zero() {
                return Err(cannot(posting, "interpolated cost is negative"));
            }
            if let Some(cost) = &mut posting.cost {
                cost.number_per = Some(q.value);
            }
            (q.value, q.exact)
        }
        Elided::Price => {
            let units = posting.amount().map_or(Decimal::ZERO, |a| a.number);
            let Some(price) = posting.price.clone() else {
                return Err(cannot(posting, "price is missing"));
            };
            let q = if price.is_unit() {
                divide(units)?
            } else {
                number::Quotient {
                    value: target * units.signum(),
                    exact: true,
                }
            };
            if q.value.is_sign_negative() && !q.value.is_zero() {
                return Err(cannot(posting, "interpolated price is negative"));
            }
            let currency = price
                .currency()
                .cloned()
                .ok_or_else(|| cannot(posting, "price currency is unknown"))?;
            posting.price = Some(price_with(&price, Some(q.value), currency));
            (q.value, q.exact)
        }
    };

    posting.resolved = true;
    Ok((!exact).then(|| InexactInterpolation {
        account: posting.account.clone(),
        elided,
        value,
    }))
}
