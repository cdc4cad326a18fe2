//! Tolerances for "sums to zero" checks.
//!
//! Each currency group of a transaction gets its own tolerance. It is
//! inferred from the most precise number written in the group (half of its
//! last digit by default), replaced by a configured override, or taken from
//! the configured defaults when the group has nothing to infer from. An
//! explicit tolerance on a posting raises its group's tolerance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tallyman_core::number::{self, DEFAULT_TOLERANCE_MULTIPLIER};
use tallyman_core::{Amount, InternedStr, Transaction};

use crate::weight_currency;

/// Key of the wildcard entry in [`ToleranceOptions::defaults`].
const WILDCARD: &str = "*";

/// Tolerance configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceOptions {
    /// Tolerance for a group without any written number, per currency;
    /// `"*"` applies to every currency not listed.
    pub defaults: HashMap<String, Decimal>,
    /// Tolerance that replaces inference, per currency.
    pub overrides: HashMap<String, Decimal>,
    /// Fraction of the last written digit used as inferred tolerance.
    pub multiplier: Decimal,
}

impl Default for ToleranceOptions {
    fn default() -> Self {
        Self {
            defaults: HashMap::new(),
            overrides: HashMap::new(),
            multiplier: DEFAULT_TOLERANCE_MULTIPLIER,
        }
    }
}

impl ToleranceOptions {
    /// Configured default for `currency`, falling back to the wildcard.
    #[must_use]
    pub fn default_for(&self, currency: &str) -> Option<Decimal> {
        self.defaults
            .get(currency)
            .or_else(|| self.defaults.get(WILDCARD))
            .copied()
    }

    /// Tolerance for comparing against `amount`, as balance assertions do:
    /// the override for its currency, else inferred from its precision.
    #[must_use]
    pub fn for_amount(&self, amount: &Amount) -> Decimal {
        self.overrides
            .get(amount.currency.as_str())
            .copied()
            .unwrap_or_else(|| amount.inferred_tolerance(self.multiplier))
    }

    /// Tolerance per currency group of `transaction`.
    ///
    /// Only units written on postings that interpolation did not fill in
    /// count for inference, and only in their own currency.
    #[must_use]
    pub fn transaction_tolerances(&self, transaction: &Transaction) -> BTreeMap<InternedStr, Decimal> {
        let mut inferred: BTreeMap<InternedStr, Option<Decimal>> = BTreeMap::new();
        let mut explicit: BTreeMap<InternedStr, Decimal> = BTreeMap::new();

        for posting in &transaction.postings {
            if let Some(group) = weight_currency(posting) {
                inferred.entry(group.clone()).or_default();
                if let Some(tol) = posting.tolerance {
                    let entry = explicit.entry(group.clone()).or_default();
                    *entry = (*entry).max(tol);
                }
            }

            if posting.resolved {
                continue;
            }
            if let Some(units) = posting.amount() {
                let tol = number::inferred_tolerance(units.number, self.multiplier);
                let slot = inferred.entry(units.currency.clone()).or_default();
                *slot = Some(slot.map_or(tol, |t| t.min(tol)));
            }
        }

        inferred
            .into_iter()
            .map(|(currency, tol)| {
                let base = self
                    .overrides
                    .get(currency.as_str())
                    .copied()
                    .or(tol)
                    .or_else(|| self.default_for(&currency))
                    .unwrap_or(Decimal::ZERO);
                let tol = explicit.get(&currency).map_or(base, |e| base.max(*e));
                (currency, tol)
            })
            .collect()
    }
}

/// Parse a tolerance map written as `USD:0.005,*:0.01`.
pub fn parse_tolerance_map(s: &str) -> Result<HashMap<String, Decimal>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (currency, value) = entry
                .split_once(':')
                .ok_or_else(|| format!("expected CURRENCY:TOLERANCE, got '{entry}'"))?;
            let value = Decimal::from_str(value.trim())
                .map_err(|e| format!("invalid tolerance '{}': {e}", value.trim()))?;
            if value.is_sign_negative() {
                return Err(format!("negative tolerance for {currency}"));
            }
            Ok((currency.trim().to_string(), value))
        })
        .collect()
}
