//! The sequential ledger processor.
//!
//! Walks the directive stream once, in the order given, threading account
//! state, inventories and the price database forward. Every directive comes
//! out again, resolved where possible, and every problem becomes a
//! [`Diagnostic`]; a bad directive never stops the run.

use serde::Serialize;
use std::collections::HashMap;
use tallyman_booking::{book_transaction, AccountBook, BookingStats};
use tallyman_core::{
    Balance, BookingMethod, Directive, DirectiveId, InternedStr, Inventory, Price, Sourced, Transaction,
};
use tallyman_prices::PriceDatabase;
use tallyman_validate::{
    assert_balance, check_transaction, subtree_units, Accounts, Diagnostic, ErrorCode, Severity,
};
use tracing::{debug, warn};

use crate::Options;

/// How a run went, as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    /// No errors or warnings.
    Clean,
    /// Warnings but no errors.
    Warnings,
    /// At least one directive has an error.
    Errors,
}

/// Result of a processing run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutput {
    /// Every input directive, in input order, with elided numbers filled in
    /// where booking succeeded. Directives with structural errors are
    /// missing only when dropping them was requested.
    pub directives: Vec<Sourced<Directive>>,
    /// Diagnostics ordered by directive.
    pub diagnostics: Vec<Diagnostic>,
    /// Booking counters.
    pub stats: BookingStats,
}

impl ProcessOutput {
    /// Whether the run was clean, had warnings, or had errors.
    ///
    /// Informational diagnostics do not count.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        if self.diagnostics.iter().any(Diagnostic::is_error) {
            Outcome::Errors
        } else if self.diagnostics.iter().any(|d| d.severity == Severity::Warning) {
            Outcome::Warnings
        } else {
            Outcome::Clean
        }
    }

    /// Diagnostics of severity error.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

enum Prices<'a> {
    /// Built up while walking the stream.
    Owned(PriceDatabase),
    /// Loaded in full beforehand.
    Shared(&'a PriceDatabase),
}

impl Prices<'_> {
    const fn db(&self) -> &PriceDatabase {
        match self {
            Self::Owned(db) => db,
            Self::Shared(db) => *db,
        }
    }
}

/// Directive ids paired with the directives they name.
pub(crate) type Entries<'d> = [(DirectiveId, &'d Sourced<Directive>)];

/// Ledger state for one run.
pub struct Processor<'a> {
    options: &'a Options,
    accounts: Accounts,
    inventories: HashMap<InternedStr, Inventory>,
    prices: Prices<'a>,
    diagnostics: Vec<Diagnostic>,
    stats: BookingStats,
}

impl<'a> Processor<'a> {
    /// A processor with no accounts and no prices.
    #[must_use]
    pub fn new(options: &'a Options) -> Self {
        Self::with_prices(options, Prices::Owned(PriceDatabase::new()))
    }

    /// A processor reading from prices loaded beforehand; price directives
    /// are not recorded again.
    pub(crate) fn shared(options: &'a Options, prices: &'a PriceDatabase) -> Self {
        Self::with_prices(options, Prices::Shared(prices))
    }

    fn with_prices(options: &'a Options, prices: Prices<'a>) -> Self {
        Self {
            options,
            accounts: Accounts::new(),
            inventories: HashMap::new(),
            prices,
            diagnostics: Vec::new(),
            stats: BookingStats::default(),
        }
    }

    /// Holdings of `account` at this point of the run.
    #[must_use]
    pub fn inventory(&self, account: &str) -> Option<&Inventory> {
        self.inventories.get(account)
    }

    /// Every account's holdings at this point of the run.
    pub fn inventories(&self) -> impl Iterator<Item = (&str, &Inventory)> {
        self.inventories.iter().map(|(a, inv)| (a.as_str(), inv))
    }

    /// Account lifecycle state.
    #[must_use]
    pub const fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    /// Prices recorded so far.
    #[must_use]
    pub const fn prices(&self) -> &PriceDatabase {
        self.prices.db()
    }

    /// Process `directives`.
    #[must_use]
    pub fn run(self, directives: &[Sourced<Directive>]) -> ProcessOutput {
        self.run_with(directives, |_, _| {})
    }

    /// Process `directives`, calling `inspect` with the state left by each
    /// one.
    ///
    /// Price directives are recorded before anything else dated the same
    /// day, so `inspect` sees them first within their date.
    pub fn run_with<F>(mut self, directives: &[Sourced<Directive>], mut inspect: F) -> ProcessOutput
    where
        F: FnMut(DirectiveId, &Self),
    {
        let entries: Vec<_> = directives
            .iter()
            .enumerate()
            .map(|(i, d)| (DirectiveId(i), d))
            .collect();
        let processed = self.process_entries(&entries, &mut inspect);

        let mut diagnostics = date_order_diagnostics(directives);
        diagnostics.append(&mut self.diagnostics);
        diagnostics.sort_by_key(|d| d.directive);

        ProcessOutput {
            directives: processed.into_iter().filter_map(|(_, d)| d).collect(),
            diagnostics,
            stats: self.stats,
        }
    }

    /// Hand back what was collected.
    pub(crate) fn finish(self) -> (Vec<Diagnostic>, BookingStats) {
        (self.diagnostics, self.stats)
    }

    /// Process `entries`, a date-ordered run of directives, and return each
    /// one's output in the same order.
    pub(crate) fn process_entries(
        &mut self,
        entries: &Entries<'_>,
        inspect: &mut dyn FnMut(DirectiveId, &Self),
    ) -> Vec<(DirectiveId, Option<Sourced<Directive>>)> {
        let mut outputs: Vec<Option<Sourced<Directive>>> = vec![None; entries.len()];

        let mut start = 0;
        while start < entries.len() {
            let date = entries[start].1.value.date();
            let len = entries[start..]
                .iter()
                .take_while(|(_, d)| d.value.date() == date)
                .count();
            let day = start..start + len;

            for i in day.clone() {
                let (id, sourced) = entries[i];
                if let Directive::Price(price) = &sourced.value {
                    self.record_price(id, price);
                    outputs[i] = Some(sourced.clone());
                    inspect(id, self);
                }
            }
            for i in day {
                let (id, sourced) = entries[i];
                if matches!(sourced.value, Directive::Price(_)) {
                    continue;
                }
                outputs[i] = self.apply(id, sourced);
                inspect(id, self);
            }
            start += len;
        }

        entries.iter().map(|(id, _)| *id).zip(outputs).collect()
    }

    fn record_price(&mut self, id: DirectiveId, price: &Price) {
        if let Prices::Owned(db) = &mut self.prices {
            if let Err(err) = db.record_directive(price) {
                let diagnostic = Diagnostic::from_price_error(&err, id, price.date);
                self.emit(vec![diagnostic]);
            }
        }
    }

    fn apply(&mut self, id: DirectiveId, sourced: &Sourced<Directive>) -> Option<Sourced<Directive>> {
        let directive = &sourced.value;
        debug!(directive = %id, kind = directive.type_name(), date = %directive.date(), "processing directive");

        let (resolved, structural) = match directive {
            Directive::Open(open) => {
                let diagnostics = self.accounts.open(open, id);
                self.inventories.entry(open.account.clone()).or_default();
                (directive.clone(), self.emit(diagnostics))
            }
            Directive::Close(close) => {
                let diagnostics = self
                    .accounts
                    .close(close, self.inventories.get(&close.account), id);
                (directive.clone(), self.emit(diagnostics))
            }
            Directive::Balance(balance) => self.check_balance(id, balance),
            Directive::Transaction(txn) => self.book(id, txn),
            Directive::Price(_) | Directive::Other(_) => (directive.clone(), false),
        };

        if structural && self.options.drop_invalid_directives {
            debug!(directive = %id, "dropping invalid directive");
            return None;
        }
        Some(Sourced::new(resolved, sourced.origin.clone()))
    }

    fn check_balance(&mut self, id: DirectiveId, balance: &Balance) -> (Directive, bool) {
        if !self.accounts.covers(&balance.account) {
            let diagnostic = Diagnostic::new(
                ErrorCode::AccountNotOpen,
                format!("Account {} was never opened", balance.account),
                id,
                balance.date,
            );
            let structural = self.emit(vec![diagnostic]);
            return (Directive::Balance(balance.clone()), structural);
        }

        let accumulated = match subtree_units(self.inventories(), &balance.account, &balance.amount.currency) {
            Ok(accumulated) => accumulated,
            Err(err) => {
                self.emit(vec![Diagnostic::from_number_error(&err, id, balance.date)]);
                return (Directive::Balance(balance.clone()), false);
            }
        };
        let mut checked = balance.clone();
        if let Some(diagnostic) = assert_balance(&mut checked, accumulated, &self.options.tolerance, id) {
            self.emit(vec![diagnostic]);
        }
        (Directive::Balance(checked), false)
    }

    fn book(&mut self, id: DirectiveId, txn: &Transaction) -> (Directive, bool) {
        let lifecycle = self.accounts.check_postings(txn, id);
        if self.emit(lifecycle) {
            return (Directive::Transaction(txn.clone()), true);
        }

        let config = self.options.booking_config();
        match book_transaction(txn, &*self, Some(self.prices.db()), &config) {
            Ok(booked) => {
                self.inventories.extend(booked.inventories);
                self.stats += booked.stats;

                let mut diagnostics: Vec<_> = booked
                    .warnings
                    .iter()
                    .map(|w| Diagnostic::from_booking_warning(w, id, txn.date))
                    .collect();
                diagnostics.extend(check_transaction(&booked.transaction, &self.options.tolerance, id));
                diagnostics.extend(self.accounts.check_currencies(&booked.transaction, id));
                self.emit(diagnostics);
                (Directive::Transaction(booked.transaction), false)
            }
            Err(err) => {
                let mut diagnostics = Diagnostic::from_booking_error(&err, id, txn.date);
                diagnostics.extend(self.accounts.check_currencies(txn, id));
                self.emit(diagnostics);
                (Directive::Transaction(txn.clone()), false)
            }
        }
    }

    /// Record diagnostics; returns whether any of them is structural.
    fn emit(&mut self, diagnostics: Vec<Diagnostic>) -> bool {
        let mut structural = false;
        for diagnostic in diagnostics {
            if diagnostic.is_error() {
                warn!(code = %diagnostic.code, directive = %diagnostic.directive, "{}", diagnostic.message);
            }
            structural |= diagnostic.code.is_structural();
            self.diagnostics.push(diagnostic);
        }
        structural
    }
}

impl AccountBook for Processor<'_> {
    fn inventory(&self, account: &str) -> Option<&Inventory> {
        self.inventories.get(account)
    }

    fn booking_method(&self, account: &str) -> BookingMethod {
        let declared = self.accounts.get(account).and_then(|s| s.booking);
        self.options.booking_method_for(account, declared)
    }
}

/// Informational diagnostics for directives dated before their predecessor.
pub(crate) fn date_order_diagnostics(directives: &[Sourced<Directive>]) -> Vec<Diagnostic> {
    directives
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            let (previous, date) = (pair[0].value.date(), pair[1].value.date());
            (date < previous).then(|| {
                Diagnostic::new(
                    ErrorCode::DateOutOfOrder,
                    format!("Directive date {date} is before previous directive {previous}"),
                    DirectiveId(i + 1),
                    date,
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tallyman_core::{Amount, Close, CostSpec, IncompleteAmount, Open, Posting};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn stream(directives: Vec<Directive>) -> Vec<Sourced<Directive>> {
        directives.into_iter().map(Sourced::bare).collect()
    }

    fn opens(accounts: &[&str]) -> Vec<Directive> {
        accounts
            .iter()
            .map(|a| Directive::Open(Open::new(date(2024, 1, 1), *a)))
            .collect()
    }

    fn transaction(out: &Sourced<Directive>) -> &Transaction {
        out.value.as_transaction().unwrap()
    }

    #[test]
    fn test_interpolates_and_commits() {
        let mut directives = opens(&["Assets:Cash", "Expenses:Food"]);
        directives.push(Directive::Transaction(
            Transaction::new(date(2024, 1, 5), "Lunch")
                .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-100), "USD")))
                .with_posting(Posting::auto("Expenses:Food")),
        ));
        let options = Options::default();
        let output = Processor::new(&options).run(&stream(directives));

        assert_eq!(output.outcome(), Outcome::Clean, "{:?}", output.diagnostics);
        let food = &transaction(&output.directives[2]).postings[1];
        assert_eq!(food.amount(), Some(&Amount::new(dec!(100), "USD")));
        assert!(food.resolved);
        assert_eq!(output.stats.interpolated_units, 1);
    }

    #[test]
    fn test_unopened_account_skips_booking() {
        let mut directives = opens(&["Assets:Cash"]);
        directives.push(Directive::Transaction(
            Transaction::new(date(2024, 1, 5), "Lunch")
                .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-100), "USD")))
                .with_posting(Posting::auto("Expenses:Food")),
        ));
        let options = Options::default();
        let mut cash_after = None;
        let output = Processor::new(&options).run_with(&stream(directives.clone()), |id, state| {
            if id == DirectiveId(1) {
                cash_after = state.inventory("Assets:Cash").cloned();
            }
        });

        assert_eq!(output.outcome(), Outcome::Errors);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].code, ErrorCode::AccountNotOpen);
        assert_eq!(output.diagnostics[0].directive, DirectiveId(1));
        // Emitted unchanged.
        assert_eq!(output.directives[1].value, directives[1]);
        assert!(cash_after.unwrap().is_empty());

        let dropping = Options::default().with_drop_invalid_directives(true);
        let output = Processor::new(&dropping).run(&stream(directives));
        assert_eq!(output.directives.len(), 1);
    }

    #[test]
    fn test_booking_error_continues() {
        let mut directives = opens(&["Assets:Stock", "Assets:Cash"]);
        directives.push(Directive::Transaction(
            Transaction::new(date(2024, 1, 5), "Sell nothing")
                .with_posting(
                    Posting::new("Assets:Stock", Amount::new(dec!(-5), "HOOL")).with_cost(CostSpec::empty()),
                )
                .with_posting(Posting::auto("Assets:Cash")),
        ));
        directives.push(Directive::Transaction(
            Transaction::new(date(2024, 1, 6), "Deposit")
                .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(10), "USD")))
                .with_posting(Posting::new("Assets:Stock", Amount::new(dec!(-10), "USD"))),
        ));
        let options = Options::default();
        let output = Processor::new(&options).run(&stream(directives.clone()));

        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].code, ErrorCode::NoMatchingLot);
        assert_eq!(output.directives[2].value, directives[2]);
        assert_eq!(output.stats.transactions, 1);
    }

    #[test]
    fn test_prices_apply_before_same_day_transactions() {
        let mut directives = opens(&["Assets:EUR", "Assets:USD"]);
        directives.push(Directive::Transaction(
            Transaction::new(date(2024, 2, 1), "Exchange")
                .with_posting(
                    Posting::new("Assets:EUR", Amount::new(dec!(100), "EUR"))
                        .with_price(tallyman_core::PriceAnnotation::UnitEmpty),
                )
                .with_posting(Posting::with_incomplete("Assets:USD", IncompleteAmount::currency_only("USD"))),
        ));
        directives.push(Directive::Price(Price::new(
            date(2024, 2, 1),
            "EUR",
            Amount::new(dec!(1.10), "USD"),
        )));
        let options = Options::default();
        let output = Processor::new(&options).run(&stream(directives));

        assert_eq!(output.outcome(), Outcome::Clean, "{:?}", output.diagnostics);
        let usd = &transaction(&output.directives[2]).postings[1];
        assert_eq!(usd.amount(), Some(&Amount::new(dec!(-110.00), "USD")));
        assert_eq!(output.stats.interpolated_prices, 1);
    }

    #[test]
    fn test_balance_assertion_fills_diff() {
        let mut directives = opens(&["Assets:Bank:Checking", "Assets:Bank:Savings", "Income:Salary"]);
        directives.push(Directive::Transaction(
            Transaction::new(date(2024, 1, 5), "Salary")
                .with_posting(Posting::new("Assets:Bank:Checking", Amount::new(dec!(700.00), "USD")))
                .with_posting(Posting::new("Assets:Bank:Savings", Amount::new(dec!(300.00), "USD")))
                .with_posting(Posting::auto("Income:Salary")),
        ));
        directives.push(Directive::Balance(Balance::new(
            date(2024, 1, 6),
            "Assets:Bank",
            Amount::new(dec!(1000.00), "USD"),
        )));
        directives.push(Directive::Balance(Balance::new(
            date(2024, 1, 6),
            "Assets:Bank:Savings",
            Amount::new(dec!(350.00), "USD"),
        )));
        directives.push(Directive::Balance(Balance::new(
            date(2024, 1, 6),
            "Liabilities:Card",
            Amount::new(dec!(0), "USD"),
        )));
        let options = Options::default();
        let output = Processor::new(&options).run(&stream(directives));

        let codes: Vec<_> = output.diagnostics.iter().map(|d| (d.directive, d.code)).collect();
        assert_eq!(
            codes,
            vec![
                (DirectiveId(5), ErrorCode::BalanceAssertionFailed),
                (DirectiveId(6), ErrorCode::AccountNotOpen),
            ]
        );
        assert!(output.diagnostics[0].message.contains("(50.00 USD too little)"));
        let Directive::Balance(savings) = &output.directives[5].value else {
            panic!("expected a balance");
        };
        assert_eq!(savings.diff, Some(Amount::new(dec!(-50.00), "USD")));
    }

    #[test]
    fn test_close_and_date_order() {
        let mut directives = opens(&["Assets:Cash", "Expenses:Food"]);
        directives.push(Directive::Transaction(
            Transaction::new(date(2024, 1, 5), "Lunch")
                .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-10), "USD")))
                .with_posting(Posting::auto("Expenses:Food")),
        ));
        directives.push(Directive::Close(Close::new(date(2024, 1, 10), "Assets:Cash")));
        directives.push(Directive::Open(Open::new(date(2024, 1, 2), "Equity:Opening")));
        let options = Options::default();
        let output = Processor::new(&options).run(&stream(directives));

        let codes: Vec<_> = output.diagnostics.iter().map(|d| (d.directive, d.code)).collect();
        assert_eq!(
            codes,
            vec![
                (DirectiveId(3), ErrorCode::AccountCloseNotEmpty),
                (DirectiveId(4), ErrorCode::DateOutOfOrder),
            ]
        );
        assert_eq!(output.outcome(), Outcome::Warnings);
    }

    #[test]
    fn test_booking_method_from_open_and_override() {
        let buy = |day, cost| {
            Directive::Transaction(
                Transaction::new(date(2024, 1, day), "Buy")
                    .with_posting(
                        Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL"))
                            .with_cost(CostSpec::empty().with_number_per(cost).with_currency("USD")),
                    )
                    .with_posting(Posting::auto("Assets:Cash")),
            )
        };
        let directives = stream(vec![
            Directive::Open(Open::new(date(2024, 1, 1), "Assets:Stock").with_booking(BookingMethod::Fifo)),
            Directive::Open(Open::new(date(2024, 1, 1), "Assets:Cash")),
            buy(2, dec!(5)),
            buy(3, dec!(7)),
            Directive::Transaction(
                Transaction::new(date(2024, 1, 4), "Sell")
                    .with_posting(
                        Posting::new("Assets:Stock", Amount::new(dec!(-10), "HOOL")).with_cost(CostSpec::empty()),
                    )
                    .with_posting(Posting::auto("Assets:Cash")),
            ),
        ]);

        let options = Options::default();
        let output = Processor::new(&options).run(&directives);
        assert_eq!(output.outcome(), Outcome::Clean, "{:?}", output.diagnostics);
        let cash = transaction(&output.directives[4]).postings[1].amount().unwrap().clone();
        assert_eq!(cash, Amount::new(dec!(50), "USD"));

        let lifo = Options::default().with_booking_override("Assets:Stock", BookingMethod::Lifo);
        let output = Processor::new(&lifo).run(&directives);
        let cash = transaction(&output.directives[4]).postings[1].amount().unwrap().clone();
        assert_eq!(cash, Amount::new(dec!(70), "USD"));

        let strict = Options::default().with_booking_override("Assets:Stock", BookingMethod::Strict);
        let output = Processor::new(&strict).run(&directives);
        assert_eq!(output.diagnostics[0].code, ErrorCode::AmbiguousMatch);
    }
}
