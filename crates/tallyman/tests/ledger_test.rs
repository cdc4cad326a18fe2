//! End-to-end processing of small ledgers.

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use tallyman::{process, ErrorCode, Options, Outcome, ProcessOutput, Processor, Severity};
use tallyman_core::{
    Amount, Balance, BookingMethod, Cost, CostSpec, Directive, DirectiveId, IncompleteAmount, Inventory, Open,
    Posting, Price, Sourced, Transaction,
};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn ledger(directives: Vec<Directive>) -> Vec<Sourced<Directive>> {
    directives.into_iter().map(Sourced::bare).collect()
}

fn open(account: &str) -> Directive {
    Directive::Open(Open::new(date(2024, 1, 1), account))
}

fn open_with(account: &str, method: BookingMethod) -> Directive {
    Directive::Open(Open::new(date(2024, 1, 1), account).with_booking(method))
}

fn buy(day: u32, units: rust_decimal::Decimal, cost: rust_decimal::Decimal) -> Directive {
    Directive::Transaction(
        Transaction::new(date(2024, 1, day), "Buy")
            .with_posting(
                Posting::new("Assets:Stock", Amount::new(units, "HOOL"))
                    .with_cost(CostSpec::empty().with_number_per(cost).with_currency("USD")),
            )
            .with_posting(Posting::auto("Assets:Cash")),
    )
}

fn sell(day: u32, units: rust_decimal::Decimal) -> Directive {
    Directive::Transaction(
        Transaction::new(date(2024, 1, day), "Sell")
            .with_posting(Posting::new("Assets:Stock", Amount::new(-units, "HOOL")).with_cost(CostSpec::empty()))
            .with_posting(Posting::auto("Assets:Cash")),
    )
}

fn transaction(output: &ProcessOutput, index: usize) -> &Transaction {
    output.directives[index].value.as_transaction().unwrap()
}

/// Stock holdings after the directive at `index`.
fn stock_after(directives: &[Sourced<Directive>], options: &Options, index: usize) -> (ProcessOutput, Inventory) {
    let mut snapshot = None;
    let output = Processor::new(options).run_with(directives, |id, state| {
        if id == DirectiveId(index) {
            snapshot = state.inventory("Assets:Stock").cloned();
        }
    });
    (output, snapshot.unwrap_or_default())
}

#[test]
fn test_interpolation_examples() {
    let directives = ledger(vec![
        open("Assets:Cash"),
        open("Expenses:Food"),
        open("Assets:Stock"),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 2), "Dinner")
                .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-100), "USD")))
                .with_posting(Posting::auto("Expenses:Food")),
        ),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 3), "Buy")
                .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-100), "USD")))
                .with_posting(
                    Posting::new("Assets:Stock", Amount::new(dec!(10), "AAPL"))
                        .with_cost(CostSpec::empty().with_currency("USD")),
                ),
        ),
    ]);
    let output = process(&directives, &Options::default());
    assert_eq!(output.outcome(), Outcome::Clean, "{:?}", output.diagnostics);

    let food = &transaction(&output, 3).postings[1];
    assert_eq!(food.amount(), Some(&Amount::new(dec!(100), "USD")));

    let stock = &transaction(&output, 4).postings[1];
    let cost = stock.cost.as_ref().unwrap();
    assert_eq!(cost.number_per, Some(dec!(10)));
    assert_eq!(cost.date, Some(date(2024, 1, 3)));
    assert_eq!(output.stats.interpolated_units, 1);
    assert_eq!(output.stats.interpolated_costs, 1);
}

#[test]
fn test_average_cost_merges_before_reduction() {
    let directives = ledger(vec![
        open_with("Assets:Stock", BookingMethod::Average),
        open("Assets:Cash"),
        buy(2, dec!(10), dec!(5)),
        buy(3, dec!(10), dec!(7)),
        sell(4, dec!(5)),
    ]);
    let (output, stock) = stock_after(&directives, &Options::default(), 4);
    assert_eq!(output.outcome(), Outcome::Clean, "{:?}", output.diagnostics);

    let lots: Vec<_> = stock.lots().cloned().collect();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].units, Amount::new(dec!(15), "HOOL"));
    assert_eq!(lots[0].cost.as_ref().unwrap().number, dec!(6));

    let cash = transaction(&output, 4).postings[1].amount().unwrap();
    assert_eq!(cash.number, dec!(30));
}

#[test]
fn test_strict_ambiguity_leaves_inventory() {
    let directives = ledger(vec![
        open("Assets:Stock"),
        open("Assets:Cash"),
        buy(2, dec!(10), dec!(5)),
        buy(3, dec!(10), dec!(7)),
        sell(4, dec!(5)),
    ]);
    let (_, before) = stock_after(&directives, &Options::default(), 3);
    let (output, after) = stock_after(&directives, &Options::default(), 4);

    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].code, ErrorCode::AmbiguousMatch);
    assert_eq!(output.diagnostics[0].directive, DirectiveId(4));
    assert_eq!(before, after);
    assert_eq!(after.len(), 2);
    // The failed sale is passed through as written.
    assert_eq!(output.directives[4], directives[4]);
}

#[test]
fn test_fifo_exact_first_lot() {
    let directives = ledger(vec![
        open_with("Assets:Stock", BookingMethod::Fifo),
        open("Assets:Cash"),
        buy(2, dec!(10), dec!(1)),
        buy(3, dec!(10), dec!(2)),
        buy(4, dec!(10), dec!(3)),
        sell(5, dec!(10)),
    ]);
    let (output, stock) = stock_after(&directives, &Options::default(), 5);
    assert_eq!(output.outcome(), Outcome::Clean, "{:?}", output.diagnostics);

    let remaining: Vec<_> = stock
        .lots()
        .map(|p| (p.units.number, p.cost.as_ref().unwrap().date))
        .collect();
    assert_eq!(
        remaining,
        vec![(dec!(10), Some(date(2024, 1, 3))), (dec!(10), Some(date(2024, 1, 4)))]
    );
    let sale = transaction(&output, 5);
    assert_eq!(sale.postings.len(), 2);
    assert_eq!(sale.postings[0].cost.as_ref().unwrap().date, Some(date(2024, 1, 2)));
}

#[test]
fn test_fifo_split_reduction() {
    let directives = ledger(vec![
        open_with("Assets:Stock", BookingMethod::Fifo),
        open("Assets:Cash"),
        buy(2, dec!(10), dec!(1)),
        buy(3, dec!(10), dec!(2)),
        sell(4, dec!(15)),
    ]);
    let output = process(&directives, &Options::default());
    assert_eq!(output.outcome(), Outcome::Clean, "{:?}", output.diagnostics);

    let sale = transaction(&output, 4);
    let legs: Vec<_> = sale
        .postings
        .iter()
        .filter(|p| p.account == "Assets:Stock")
        .map(|p| (p.amount().unwrap().number, p.cost.as_ref().unwrap().number_per))
        .collect();
    assert_eq!(legs, vec![(dec!(-10), Some(dec!(1))), (dec!(-5), Some(dec!(2)))]);
    let cash = sale.postings.iter().find(|p| p.account == "Assets:Cash").unwrap();
    assert_eq!(cash.amount().unwrap().number, dec!(20));
    assert_eq!(output.stats.lots_reduced, 2);
}

#[test]
fn test_insufficient_lots_strict_and_lenient() {
    let directives = ledger(vec![
        open_with("Assets:Stock", BookingMethod::Fifo),
        open("Assets:Cash"),
        buy(2, dec!(10), dec!(4)),
        sell(3, dec!(15)),
    ]);

    let output = process(&directives, &Options::default());
    assert_eq!(output.outcome(), Outcome::Errors);
    assert_eq!(output.diagnostics[0].code.code(), "E4004");

    let lenient = Options::default().with_lenient_insufficient_lots(true);
    let (output, stock) = stock_after(&directives, &lenient, 3);
    assert_eq!(output.outcome(), Outcome::Warnings);
    assert_eq!(output.diagnostics[0].code, ErrorCode::InsufficientLots);
    assert_eq!(output.diagnostics[0].severity, Severity::Warning);
    assert_eq!(stock.units("HOOL").unwrap(), dec!(-5));
    let cash = transaction(&output, 3).postings.last().unwrap().amount().unwrap().clone();
    assert_eq!(cash, Amount::new(dec!(60), "USD"));
}

#[test]
fn test_none_allows_short_position() {
    let directives = ledger(vec![
        open_with("Assets:Stock", BookingMethod::None),
        open("Assets:Cash"),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 2), "Short")
                .with_posting(
                    Posting::new("Assets:Stock", Amount::new(dec!(-5), "HOOL"))
                        .with_cost(CostSpec::empty().with_number_per(dec!(100)).with_currency("USD")),
                )
                .with_posting(Posting::auto("Assets:Cash")),
        ),
    ]);
    let (output, stock) = stock_after(&directives, &Options::default(), 2);
    assert_eq!(output.outcome(), Outcome::Clean, "{:?}", output.diagnostics);
    assert_eq!(stock.units("HOOL").unwrap(), dec!(-5));
    assert_eq!(
        stock.lots().next().unwrap().cost,
        Some(Cost::new(dec!(100), "USD").with_date(date(2024, 1, 2)))
    );
}

#[test]
fn test_precision_cap() {
    let directives = ledger(vec![
        open("Assets:Stock"),
        open("Assets:Cash"),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 2), "Buy a third")
                .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-10.00), "USD")))
                .with_posting(
                    Posting::new("Assets:Stock", Amount::new(dec!(3), "HOOL"))
                        .with_cost(CostSpec::empty().with_currency("USD")),
                ),
        ),
    ]);

    let exact = process(&directives, &Options::default());
    assert_eq!(exact.diagnostics.len(), 1);
    assert_eq!(exact.diagnostics[0].code, ErrorCode::PrecisionError);

    let capped = process(&directives, &Options::default().with_precision(Some(4)));
    assert_eq!(capped.outcome(), Outcome::Warnings, "{:?}", capped.diagnostics);
    assert_eq!(capped.diagnostics[0].code, ErrorCode::InexactInterpolation);
    let cost = transaction(&capped, 2).postings[1].cost.as_ref().unwrap();
    assert_eq!(cost.number_per, Some(dec!(3.3333)));
}

#[test]
fn test_two_auto_postings_under_constrained() {
    let directives = ledger(vec![
        open("Assets:Cash"),
        open("Expenses:Food"),
        open("Expenses:Drink"),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 2), "Guess")
                .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-20), "USD")))
                .with_posting(Posting::auto("Expenses:Food"))
                .with_posting(Posting::auto("Expenses:Drink")),
        ),
    ]);
    let output = process(&directives, &Options::default());
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].code.code(), "E3101");
    assert_eq!(output.directives[3], directives[3]);
}

#[test]
fn test_currency_constraint_still_books() {
    let directives = ledger(vec![
        Directive::Open(Open::new(date(2024, 1, 1), "Assets:Bank").with_currencies(["USD"])),
        open("Income:Salary"),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 2), "Pay in euros")
                .with_posting(Posting::new("Assets:Bank", Amount::new(dec!(100), "EUR")))
                .with_posting(Posting::auto("Income:Salary")),
        ),
    ]);
    let output = process(&directives, &Options::default());
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].code, ErrorCode::CurrencyNotAllowed);
    let income = &transaction(&output, 2).postings[1];
    assert_eq!(income.amount(), Some(&Amount::new(dec!(-100), "EUR")));
}

#[test]
fn test_price_fallback_and_out_of_order_price() {
    let directives = ledger(vec![
        open("Assets:EUR"),
        open("Assets:USD"),
        Directive::Price(Price::new(date(2024, 1, 10), "EUR", Amount::new(dec!(1.08), "USD"))),
        Directive::Price(Price::new(date(2024, 1, 5), "EUR", Amount::new(dec!(1.05), "USD"))),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 12), "Convert")
                .with_posting(
                    Posting::new("Assets:EUR", Amount::new(dec!(-100), "EUR"))
                        .with_price(tallyman_core::PriceAnnotation::Unit(IncompleteAmount::currency_only("USD"))),
                )
                .with_posting(Posting::with_incomplete("Assets:USD", IncompleteAmount::currency_only("USD"))),
        ),
    ]);
    let output = process(&directives, &Options::default());
    let codes: Vec<_> = output.diagnostics.iter().map(|d| (d.directive, d.code)).collect();
    assert_eq!(
        codes,
        vec![
            (DirectiveId(3), ErrorCode::DateOutOfOrder),
            (DirectiveId(3), ErrorCode::OutOfOrderPrice),
        ]
    );
    let usd = &transaction(&output, 4).postings[1];
    assert_eq!(usd.amount().unwrap().number, dec!(108.00));
}

#[test]
fn test_missing_price_reports_info() {
    let directives = ledger(vec![
        open("Assets:EUR"),
        open("Assets:USD"),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 12), "Convert")
                .with_posting(
                    Posting::new("Assets:EUR", Amount::new(dec!(-100), "EUR"))
                        .with_price(tallyman_core::PriceAnnotation::Unit(IncompleteAmount::currency_only("USD"))),
                )
                .with_posting(Posting::with_incomplete("Assets:USD", IncompleteAmount::currency_only("USD"))),
        ),
    ]);
    let output = process(&directives, &Options::default());
    let codes: Vec<_> = output.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::UnderConstrained, ErrorCode::NoPriceAvailable]);
}

#[test]
fn test_resolved_output_is_stable() {
    let directives = ledger(vec![
        open_with("Assets:Stock", BookingMethod::Fifo),
        open("Assets:Cash"),
        open("Expenses:Food"),
        buy(2, dec!(10), dec!(1)),
        buy(3, dec!(10), dec!(2)),
        sell(4, dec!(15)),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 5), "Lunch")
                .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(12.50), "USD")))
                .with_posting(Posting::auto("Assets:Cash")),
        ),
    ]);
    let options = Options::default();
    let first = process(&directives, &options);
    assert_eq!(first.outcome(), Outcome::Clean, "{:?}", first.diagnostics);

    let second = process(&first.directives, &options);
    assert_eq!(second.directives, first.directives);
    assert!(second.diagnostics.is_empty(), "{:?}", second.diagnostics);
    assert_eq!(second.stats.interpolated_units, 0);

    let parallel = process(&directives, &options.clone().with_parallel(true));
    assert_eq!(parallel.directives, first.directives);
    assert_eq!(parallel.diagnostics, first.diagnostics);
    assert_eq!(parallel.stats, first.stats);
}

#[test]
fn test_auto_posting_with_elided_cost_is_under_constrained() {
    let directives = ledger(vec![
        open("Assets:Stock"),
        open("Assets:Cash"),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 2), "Buy at some cost")
                .with_posting(
                    Posting::new("Assets:Stock", Amount::new(dec!(10), "AAPL"))
                        .with_cost(CostSpec::empty().with_currency("USD")),
                )
                .with_posting(Posting::auto("Assets:Cash")),
        ),
    ]);
    let (output, stock) = stock_after(&directives, &Options::default(), 2);
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].code.code(), "E3101");
    assert_eq!(output.directives[2], directives[2]);
    assert!(stock.is_empty());
}

#[test]
fn test_overflowing_transaction_fails_alone() {
    let directives = ledger(vec![
        open("Assets:A"),
        open("Assets:B"),
        open("Assets:C"),
        open("Expenses:Food"),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 2), "Too much")
                .with_posting(Posting::new("Assets:A", Amount::new(rust_decimal::Decimal::MAX, "USD")))
                .with_posting(Posting::new("Assets:B", Amount::new(rust_decimal::Decimal::MAX, "USD")))
                .with_posting(Posting::auto("Assets:C")),
        ),
        Directive::Transaction(
            Transaction::new(date(2024, 1, 3), "Lunch")
                .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(5), "USD")))
                .with_posting(Posting::auto("Assets:C")),
        ),
    ]);
    let output = process(&directives, &Options::default());
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].code, ErrorCode::PrecisionError);
    assert_eq!(output.diagnostics[0].directive, DirectiveId(4));
    assert_eq!(output.directives[4], directives[4]);

    let lunch = &transaction(&output, 5).postings[1];
    assert_eq!(lunch.amount(), Some(&Amount::new(dec!(-5), "USD")));
}

#[test]
fn test_balance_over_overflowing_subtree() {
    let fill = |day: u32, account: &str, equity: &str| {
        Directive::Transaction(
            Transaction::new(date(2024, 1, day), "Fill")
                .with_posting(Posting::new(account, Amount::new(rust_decimal::Decimal::MAX, "USD")))
                .with_posting(Posting::auto(equity)),
        )
    };
    let directives = ledger(vec![
        open("Assets:Bank:One"),
        open("Assets:Bank:Two"),
        open("Equity:One"),
        open("Equity:Two"),
        fill(2, "Assets:Bank:One", "Equity:One"),
        fill(3, "Assets:Bank:Two", "Equity:Two"),
        Directive::Balance(Balance::new(
            date(2024, 1, 4),
            "Assets:Bank",
            Amount::new(rust_decimal::Decimal::MAX, "USD"),
        )),
    ]);
    let output = process(&directives, &Options::default());
    assert_eq!(output.diagnostics.len(), 1, "{:?}", output.diagnostics);
    assert_eq!(output.diagnostics[0].code.code(), "E5001");
    assert_eq!(output.diagnostics[0].directive, DirectiveId(6));
}
