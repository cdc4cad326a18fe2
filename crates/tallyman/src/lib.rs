//! Tallyman: a double-entry ledger processor.
//!
//! Takes a date-ordered stream of parsed directives and returns it resolved:
//! elided numbers interpolated, reductions matched against held lots,
//! transactions and balance assertions checked. Problems are collected as
//! diagnostics; processing never stops at a bad directive.
//!
//! # Example
//!
//! ```
//! use tallyman::{process, Options, Outcome};
//! use tallyman_core::{Amount, CostSpec, Directive, NaiveDate, Open, Posting, Sourced, Transaction};
//! use rust_decimal_macros::dec;
//!
//! let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
//! let directives: Vec<_> = vec![
//!     Directive::Open(Open::new(d(1, 1), "Assets:Cash")),
//!     Directive::Open(Open::new(d(1, 1), "Assets:Stock")),
//!     Directive::Transaction(
//!         Transaction::new(d(1, 2), "Buy")
//!             .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-100), "USD")))
//!             .with_posting(
//!                 Posting::new("Assets:Stock", Amount::new(dec!(10), "AAPL"))
//!                     .with_cost(CostSpec::empty().with_currency("USD")),
//!             ),
//!     ),
//! ]
//! .into_iter()
//! .map(Sourced::bare)
//! .collect();
//!
//! let output = process(&directives, &Options::default());
//! assert_eq!(output.outcome(), Outcome::Clean);
//!
//! let buy = output.directives[2].value.as_transaction().unwrap();
//! let cost = buy.postings[1].cost.as_ref().unwrap();
//! assert_eq!(cost.number_per, Some(dec!(10)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
mod options;
mod parallel;
mod processor;

pub use options::{Options, OptionsError};
pub use processor::{Outcome, ProcessOutput, Processor};
pub use tallyman_booking::BookingStats;
pub use tallyman_validate::{Diagnostic, ErrorCode, Severity};

use tallyman_core::{Directive, Sourced};
use tallyman_validate::tally;
use tracing::{info, info_span};

/// Process a directive stream.
///
/// The stream must already be in date order; it is processed as given.
/// With [`Options::parallel`] set, independent groups of accounts are
/// processed concurrently; the output is the same either way.
#[must_use]
pub fn process(directives: &[Sourced<Directive>], options: &Options) -> ProcessOutput {
    let span = info_span!("process", directives = directives.len(), parallel = options.parallel);
    let _enter = span.enter();

    let output = if options.parallel {
        parallel::process(directives, options)
    } else {
        Processor::new(options).run(directives)
    };

    let (errors, warnings, infos) = tally(&output.diagnostics);
    info!(stats = %output.stats, errors, warnings, infos, "processing finished");
    output
}
