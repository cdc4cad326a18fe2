//! Transaction balancing and balance assertions.

use rust_decimal::Decimal;
use tallyman_booking::{residuals, ToleranceOptions};
use tallyman_core::intern::is_within;
use tallyman_core::{Amount, Balance, DirectiveId, Inventory, NumberError, Transaction};

use crate::{Diagnostic, ErrorCode};

/// Check that a booked transaction sums to zero in every currency.
///
/// Each residual is compared against the tolerance inferred for its
/// currency group. A transaction without postings is reported as such.
pub fn check_transaction(
    transaction: &Transaction,
    tolerances: &ToleranceOptions,
    directive: DirectiveId,
) -> Vec<Diagnostic> {
    if transaction.postings.is_empty() {
        return vec![Diagnostic::new(
            ErrorCode::NoPostings,
            "Transaction must have at least one posting",
            directive,
            transaction.date,
        )];
    }

    let residuals = match residuals(transaction) {
        Ok(residuals) => residuals,
        Err(err) => {
            return vec![Diagnostic::from_number_error(&err, directive, transaction.date)
                .with_context("summing posting weights")]
        }
    };
    let allowed = tolerances.transaction_tolerances(transaction);
    residuals
        .into_iter()
        .filter_map(|(currency, residual)| {
            let tolerance = allowed.get(&currency).copied().unwrap_or(Decimal::ZERO);
            (residual.abs() > tolerance).then(|| {
                Diagnostic::new(
                    ErrorCode::TransactionDoesNotBalance,
                    format!("Transaction does not balance: ({residual} {currency})"),
                    directive,
                    transaction.date,
                )
                .with_context(format!("tolerance: {tolerance}"))
            })
        })
        .collect()
}

/// Units of `currency` held by `account` and every account below it.
pub fn subtree_units<'a, I>(inventories: I, account: &str, currency: &str) -> Result<Decimal, NumberError>
where
    I: IntoIterator<Item = (&'a str, &'a Inventory)>,
{
    inventories
        .into_iter()
        .filter(|(name, _)| is_within(name, account))
        .try_fold(Decimal::ZERO, |total, (_, inv)| {
            total.checked_add(inv.units(currency)?).ok_or(NumberError::Overflow)
        })
}

/// Check a balance assertion against the accumulated units.
///
/// On failure the difference (accumulated minus expected) is stored in
/// `balance.diff` and a diagnostic is returned.
pub fn assert_balance(
    balance: &mut Balance,
    accumulated: Decimal,
    tolerances: &ToleranceOptions,
    directive: DirectiveId,
) -> Option<Diagnostic> {
    let expected = &balance.amount;
    let tolerance = balance
        .tolerance
        .unwrap_or_else(|| tolerances.for_amount(expected));
    let Some(diff) = accumulated.checked_sub(expected.number) else {
        balance.diff = None;
        return Some(
            Diagnostic::from_number_error(&NumberError::Overflow, directive, balance.date)
                .with_context(format!("balance of {} {}", balance.account, expected)),
        );
    };
    if diff.abs() <= tolerance {
        balance.diff = None;
        return None;
    }

    let direction = if diff > Decimal::ZERO { "too much" } else { "too little" };
    let actual = Amount::new(accumulated, expected.currency.clone());
    let diagnostic = Diagnostic::new(
        ErrorCode::BalanceAssertionFailed,
        format!(
            "Balance failed for '{}': expected {} != accumulated {} ({} {} {})",
            balance.account,
            expected,
            actual,
            diff.abs(),
            expected.currency,
            direction
        ),
        directive,
        balance.date,
    )
    .with_context(format!("tolerance: {tolerance}"));
    balance.diff = Some(Amount::new(diff, expected.currency.clone()));
    Some(diagnostic)
}
