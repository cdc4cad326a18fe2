//! Matching postings against held lots.
//!
//! A transaction is booked in three steps:
//!
//! 1. Reductions whose units are written are matched against lots first.
//!    Matching fixes their cost, which interpolation may need.
//! 2. The transaction is interpolated.
//! 3. Everything else (augmentations, plain holdings, postings whose units
//!    were just inferred) is applied.
//!
//! All of it happens on copies of the affected inventories. The caller
//! commits [`BookedTransaction::inventories`] only on success, so a failed
//! transaction leaves no trace.

use chrono::NaiveDate;
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use tallyman_core::number::{self, NumberError, MAX_SCALE};
use tallyman_core::{
    Amount, BookingMethod, Cost, CostSpec, IncompleteAmount, InternedStr, Inventory, InventoryError,
    Position, Posting, PriceAnnotation, Transaction,
};
use tallyman_prices::PriceDatabase;
use thiserror::Error;
use tracing::debug;

use crate::interpolate::{interpolate, Elided, InexactInterpolation, InterpolationContext, InterpolationError};
use crate::BookingStats;

/// Read access to the ledger state booking needs.
pub trait AccountBook {
    /// Holdings of `account` before the transaction; `None` when nothing
    /// has been held yet.
    fn inventory(&self, account: &str) -> Option<&Inventory>;

    /// Booking method in force for `account`.
    fn booking_method(&self, account: &str) -> BookingMethod;
}

/// Booking settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookingConfig {
    /// Fractional digits for non-terminating divisions; `None` makes an
    /// inexact interpolation fail.
    pub precision: Option<u32>,
    /// Book an over-reduction as a negative lot with a warning instead of
    /// failing.
    pub lenient_insufficient_lots: bool,
}

impl BookingConfig {
    /// Digits used where rounding cannot be avoided, such as averaging.
    const fn rounding_cap(self) -> u32 {
        match self.precision {
            Some(p) => p,
            None => MAX_SCALE,
        }
    }
}

/// Errors that prevent a transaction from being booked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    /// No held lot matches the reduction.
    #[error("no lot of {currency} in {account} matches {pattern}")]
    NoMatchingLot {
        /// Account being reduced.
        account: InternedStr,
        /// Currency being reduced.
        currency: InternedStr,
        /// Cost specification of the reduction.
        pattern: CostSpec,
    },

    /// Several lots match and the method cannot choose.
    #[error("ambiguous reduction of {currency} in {account}: {candidates} lots match {pattern}")]
    AmbiguousMatch {
        /// Account being reduced.
        account: InternedStr,
        /// Currency being reduced.
        currency: InternedStr,
        /// Number of matching lots.
        candidates: usize,
        /// Cost specification of the reduction.
        pattern: CostSpec,
    },

    /// The single matching lot is smaller than the reduction.
    #[error("lot of {currency} in {account} is too small: requested {requested}, lot holds {available}")]
    InsufficientLotSize {
        /// Account being reduced.
        account: InternedStr,
        /// Currency being reduced.
        currency: InternedStr,
        /// Units requested.
        requested: Decimal,
        /// Units in the lot.
        available: Decimal,
    },

    /// The matching lots together hold fewer units than the reduction.
    #[error("not enough {currency} in {account}: requested {requested}, matching lots hold {available}")]
    InsufficientLots {
        /// Account being reduced.
        account: InternedStr,
        /// Currency being reduced.
        currency: InternedStr,
        /// Units requested.
        requested: Decimal,
        /// Units held by matching lots.
        available: Decimal,
    },

    /// Interpolation failed.
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    /// Arithmetic failed while booking.
    #[error("cannot book posting to {account}: {source}")]
    Number {
        /// Account of the offending posting.
        account: InternedStr,
        /// Underlying failure.
        source: NumberError,
    },
}

/// Something booking did that the caller should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingWarning {
    /// An interpolated number was rounded.
    InexactInterpolation(InexactInterpolation),

    /// A reduction exceeded the matching lots; the rest was booked as a
    /// negative lot.
    InsufficientLots {
        /// Account reduced.
        account: InternedStr,
        /// Currency reduced.
        currency: InternedStr,
        /// Units requested.
        requested: Decimal,
        /// Units the matching lots held.
        available: Decimal,
    },
}

impl fmt::Display for BookingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InexactInterpolation(inexact) => write!(f, "{inexact}"),
            Self::InsufficientLots {
                account,
                currency,
                requested,
                available,
            } => write!(
                f,
                "not enough {currency} in {account}: requested {requested}, matching lots hold {available}; remainder booked as a negative lot"
            ),
        }
    }
}

/// A transaction after successful booking.
#[derive(Debug, Clone)]
pub struct BookedTransaction {
    /// The resolved transaction.
    pub transaction: Transaction,
    /// New holdings of every account the transaction touched.
    pub inventories: BTreeMap<InternedStr, Inventory>,
    /// Warnings raised along the way.
    pub warnings: Vec<BookingWarning>,
    /// Counters for this transaction.
    pub stats: BookingStats,
}

struct Staging<'a, B: ?Sized> {
    book: &'a B,
    staged: BTreeMap<InternedStr, Inventory>,
}

impl<'a, B: AccountBook + ?Sized> Staging<'a, B> {
    const fn new(book: &'a B) -> Self {
        Self {
            book,
            staged: BTreeMap::new(),
        }
    }

    fn inventory(&mut self, account: &InternedStr) -> &mut Inventory {
        let book = self.book;
        self.staged
            .entry(account.clone())
            .or_insert_with(|| book.inventory(account).cloned().unwrap_or_default())
    }
}

/// Interpolate and book `transaction` against the holdings in `book`.
pub fn book_transaction<B: AccountBook + ?Sized>(
    transaction: &Transaction,
    book: &B,
    prices: Option<&PriceDatabase>,
    config: &BookingConfig,
) -> Result<BookedTransaction, BookingError> {
    let mut stage = Staging::new(book);
    let mut warnings = Vec::new();
    let mut stats = BookingStats {
        transactions: 1,
        ..BookingStats::default()
    };

    // Written reductions first.
    let mut postings = Vec::with_capacity(transaction.postings.len());
    let mut booked = Vec::with_capacity(transaction.postings.len());
    for posting in &transaction.postings {
        let method = book.booking_method(&posting.account);
        let reduction = match (posting.amount(), &posting.cost) {
            (Some(units), Some(_)) if method != BookingMethod::None => {
                is_reduction(stage.inventory(&posting.account), units)
            }
            _ => false,
        };
        if reduction {
            let legs = reduce(stage.inventory(&posting.account), posting, method, config, &mut warnings)?;
            stats.lots_reduced += legs.len();
            booked.extend(legs.iter().map(|_| true));
            postings.extend(legs);
        } else {
            booked.push(false);
            postings.push(posting.clone());
        }
    }

    let mut partial = transaction.clone();
    partial.postings = postings;
    let auto = partial.postings.iter().position(|p| p.is_auto() && !p.resolved);

    let mut ctx = InterpolationContext::new(transaction.date).with_precision(config.precision);
    if let Some(db) = prices {
        ctx = ctx.with_prices(db);
    }
    let mut interpolated = interpolate(&partial, &ctx)?;
    stats.interpolated_units += interpolated.count(Elided::Units);
    stats.interpolated_costs += interpolated.count(Elided::Cost);
    stats.interpolated_prices += interpolated.count(Elided::Price);
    warnings.extend(
        interpolated
            .inexact
            .iter()
            .cloned()
            .map(BookingWarning::InexactInterpolation),
    );

    if let Some(a) = auto {
        let extra = interpolated.transaction.postings.len() - partial.postings.len();
        for _ in 0..extra {
            booked.insert(a + 1, false);
        }
    }

    // Everything else.
    let mut resolved = Vec::with_capacity(interpolated.transaction.postings.len());
    for (mut posting, done) in std::mem::take(&mut interpolated.transaction.postings).into_iter().zip(booked) {
        if done {
            resolved.push(posting);
            continue;
        }
        let Some(units) = posting.amount().cloned() else {
            return Err(InterpolationError::CannotInterpolate {
                account: posting.account.clone(),
                reason: "units are missing".to_string(),
            }
            .into());
        };
        let method = book.booking_method(&posting.account);
        let inventory = stage.inventory(&posting.account);

        if posting.cost.is_none() {
            inventory
                .try_add(Position::simple(units))
                .map_err(|source| BookingError::Number {
                    account: posting.account.clone(),
                    source,
                })?;
            resolved.push(posting);
        } else if method != BookingMethod::None && is_reduction(inventory, &units) {
            let legs = reduce(inventory, &posting, method, config, &mut warnings)?;
            stats.lots_reduced += legs.len();
            resolved.extend(legs);
        } else {
            augment(inventory, &mut posting, &units, transaction.date, config)?;
            stats.lots_created += 1;
            resolved.push(posting);
        }
    }

    stats.postings = resolved.len();
    let mut transaction = interpolated.transaction;
    transaction.postings = resolved;
    Ok(BookedTransaction {
        transaction,
        inventories: stage.staged,
        warnings,
        stats,
    })
}

/// Whether booking `units` at cost must reduce: opposite-signed lots exist,
/// or the units are negative and there is nothing to add them to.
fn is_reduction(inventory: &Inventory, units: &Amount) -> bool {
    let opposite = inventory.lots().any(|p| {
        p.is_lot()
            && !p.is_empty()
            && p.units.currency == units.currency
            && p.units.number.is_sign_negative() != units.number.is_sign_negative()
    });
    opposite || units.is_negative()
}

/// Add a lot for `posting`, completing its cost specification with the
/// currency and acquisition date the lot received.
fn augment(
    inventory: &mut Inventory,
    posting: &mut Posting,
    units: &Amount,
    date: NaiveDate,
    config: &BookingConfig,
) -> Result<(), BookingError> {
    let number_error = |account: &InternedStr, source| BookingError::Number {
        account: account.clone(),
        source,
    };
    let Some(spec) = posting.cost.as_mut() else {
        return inventory
            .try_add(Position::simple(units.clone()))
            .map_err(|source| number_error(&posting.account, source));
    };
    let missing = |reason: &str| InterpolationError::CannotInterpolate {
        account: posting.account.clone(),
        reason: reason.to_string(),
    };
    let currency = spec.currency.clone().ok_or_else(|| missing("cost currency is unknown"))?;
    let per = spec
        .per_unit(units.number, Some(config.rounding_cap()))
        .map_err(|source| number_error(&posting.account, source))?
        .ok_or_else(|| missing("cost is unknown"))?;

    let cost = spec.to_cost(per.value, currency, date);
    spec.currency = Some(cost.currency.clone());
    spec.date = cost.date;
    inventory
        .try_add(Position::with_cost(units.clone(), cost))
        .map_err(|source| number_error(&posting.account, source))
}

/// The lot pattern a reduction selects by: its written cost with any total
/// spread over the units.
fn reduction_pattern(spec: &CostSpec, units: Decimal, cap: u32) -> Result<CostSpec, NumberError> {
    let number_per = match spec.number_total {
        Some(_) => spec.per_unit(units, Some(cap))?.map(|q| q.value),
        None => spec.number_per,
    };
    Ok(CostSpec {
        number_per,
        number_total: None,
        currency: spec.currency.clone(),
        date: spec.date,
        label: spec.label.clone(),
        merge: false,
    })
}

fn from_inventory(account: &InternedStr, pattern: &CostSpec, err: InventoryError) -> BookingError {
    match err {
        InventoryError::NoMatchingLot { currency, pattern } => BookingError::NoMatchingLot {
            account: account.clone(),
            currency,
            pattern,
        },
        InventoryError::AmbiguousMatch { currency, candidates } => BookingError::AmbiguousMatch {
            account: account.clone(),
            currency,
            candidates,
            pattern: pattern.clone(),
        },
        InventoryError::InsufficientUnits {
            currency,
            requested,
            available,
        } => BookingError::InsufficientLots {
            account: account.clone(),
            currency,
            requested,
            available,
        },
        InventoryError::Number(source) => BookingError::Number {
            account: account.clone(),
            source,
        },
    }
}

/// Lots in acquisition order; undated lots count as oldest.
fn by_date(mut lots: Vec<Position>) -> Vec<Position> {
    lots.sort_by_key(|p| p.cost.as_ref().and_then(|c| c.date));
    lots
}

fn held(lots: &[Position]) -> Result<Decimal, NumberError> {
    lots.iter().try_fold(Decimal::ZERO, |total, p| {
        total.checked_add(p.units.number.abs()).ok_or(NumberError::Overflow)
    })
}

/// Reduce `inventory` by `posting`, one leg per lot drawn from.
fn reduce(
    inventory: &mut Inventory,
    posting: &Posting,
    method: BookingMethod,
    config: &BookingConfig,
    warnings: &mut Vec<BookingWarning>,
) -> Result<Vec<Posting>, BookingError> {
    let account = &posting.account;
    let Some(units) = posting.amount().cloned() else {
        return Ok(vec![posting.clone()]);
    };
    let spec = posting.cost.clone().unwrap_or_default();
    let method = if spec.merge { BookingMethod::Average } else { method };
    let cap = config.rounding_cap();
    let number_error = |source| BookingError::Number {
        account: account.clone(),
        source,
    };

    let pattern = reduction_pattern(&spec, units.number, cap).map_err(number_error)?;
    if method == BookingMethod::Average {
        inventory
            .merge_average(&units.currency, Some(cap))
            .map_err(|e| from_inventory(account, &pattern, e))?;
    }

    let candidates: Vec<Position> = inventory
        .matching_lots(&units, &pattern)
        .into_iter()
        .filter(|p| p.is_lot())
        .cloned()
        .collect();
    if candidates.is_empty() {
        return Err(BookingError::NoMatchingLot {
            account: account.clone(),
            currency: units.currency.clone(),
            pattern,
        });
    }

    let requested = units.number.abs();
    let total = held(&candidates).map_err(number_error)?;
    let ambiguous = |count: usize| BookingError::AmbiguousMatch {
        account: account.clone(),
        currency: units.currency.clone(),
        candidates: count,
        pattern: pattern.clone(),
    };

    let chosen = match method {
        BookingMethod::Strict => match candidates.len() {
            1 => candidates,
            _ if total == requested => by_date(candidates),
            n => return Err(ambiguous(n)),
        },
        BookingMethod::StrictWithSize => match candidates.len() {
            1 => {
                if requested > total {
                    return Err(BookingError::InsufficientLotSize {
                        account: account.clone(),
                        currency: units.currency.clone(),
                        requested,
                        available: total,
                    });
                }
                candidates
            }
            n => {
                let ordered = by_date(candidates);
                match ordered.iter().find(|p| p.units.number.abs() == requested) {
                    Some(exact) => vec![exact.clone()],
                    None if total == requested => ordered,
                    None => return Err(ambiguous(n)),
                }
            }
        },
        BookingMethod::Lifo => {
            let mut ordered = by_date(candidates);
            ordered.reverse();
            ordered
        }
        // Accounts booked with NONE never reach lot matching.
        BookingMethod::Fifo | BookingMethod::Average | BookingMethod::None => by_date(candidates),
    };

    let mut remaining = requested;
    let mut plan: Vec<(Cost, Decimal)> = Vec::new();
    for lot in chosen {
        if remaining.is_zero() {
            break;
        }
        let Some(cost) = lot.cost else { continue };
        let take = remaining.min(lot.units.number.abs());
        remaining -= take;
        plan.push((cost, take));
    }

    let sign = units.number.signum();
    let mut legs: Vec<Posting> = Vec::with_capacity(plan.len());
    for (cost, take) in &plan {
        let amount = Amount::new(*take * sign, units.currency.clone());
        inventory
            .reduce_lot(&amount, Some(cost))
            .map_err(|e| from_inventory(account, &pattern, e))?;

        let mut leg = posting.clone();
        leg.units = Some(IncompleteAmount::Complete(amount));
        leg.cost = Some(CostSpec::from_cost(cost));
        legs.push(leg);
    }

    if !remaining.is_zero() {
        let available = requested - remaining;
        if !config.lenient_insufficient_lots {
            return Err(BookingError::InsufficientLots {
                account: account.clone(),
                currency: units.currency.clone(),
                requested,
                available,
            });
        }
        if let (Some((cost, _)), Some(last)) = (plan.last(), legs.last_mut()) {
            let short = Amount::new(remaining * sign, units.currency.clone());
            inventory
                .try_add(Position::with_cost(short, cost.clone()))
                .map_err(number_error)?;
            if let Some(IncompleteAmount::Complete(amount)) = &mut last.units {
                amount.number += remaining * sign;
            }
        }
        warnings.push(BookingWarning::InsufficientLots {
            account: account.clone(),
            currency: units.currency.clone(),
            requested,
            available,
        });
    }

    if legs.len() > 1 {
        if let Some(PriceAnnotation::Total(IncompleteAmount::Complete(total))) = &posting.price {
            let per_unit = number::divide(total.number, requested, Some(cap)).map_err(number_error)?;
            let unit = PriceAnnotation::unit(Amount::new(per_unit.value, total.currency.clone()));
            for leg in &mut legs {
                leg.price = Some(unit.clone());
            }
        }
    }

    debug!(account = %account, method = %method, legs = legs.len(), units = %units, "reduced lots");
    Ok(legs)
}
