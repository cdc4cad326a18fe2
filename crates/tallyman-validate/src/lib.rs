//! Diagnostics and validation rules for tallyman.
//!
//! This crate implements the checks the ledger processor runs around
//! booking:
//!
//! - Account lifecycle (opened before use, not used after close)
//! - Account names and currency constraints
//! - Transaction balancing
//! - Balance assertions over an account and its sub-accounts
//!
//! and the diagnostic type every problem is reported as.
//!
//! # Error Codes
//!
//! | Code | Description |
//! |------|-------------|
//! | E1001 | Account not opened |
//! | E1002 | Account already open |
//! | E1003 | Account already closed |
//! | E1004 | Account closed with non-zero balance (warning) |
//! | E1005 | Invalid account name |
//! | E2001 | Balance assertion failed |
//! | E3001 | Transaction does not balance |
//! | E3003 | Transaction has no postings |
//! | E3101 | Too many unknowns to interpolate |
//! | E3102 | Cannot interpolate |
//! | E3103 | Interpolated number rounded (warning) |
//! | E4001 | No matching lot for reduction |
//! | E4002 | Matched lot too small |
//! | E4003 | Ambiguous lot match |
//! | E4004 | Not enough units in matching lots |
//! | E4101 | Price out of order |
//! | E4102 | No price available (info) |
//! | E5001 | Division does not terminate |
//! | E5002 | Currency mismatch |
//! | E5003 | Currency not allowed in account |
//! | E10001 | Date out of order (info) |
//!
//! # Example
//!
//! ```
//! use tallyman_booking::ToleranceOptions;
//! use tallyman_core::{Amount, DirectiveId, NaiveDate, Posting, Transaction};
//! use tallyman_validate::{check_transaction, ErrorCode};
//! use rust_decimal_macros::dec;
//!
//! let txn = Transaction::new(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), "Lunch")
//!     .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(12.50), "USD")))
//!     .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-12.00), "USD")));
//!
//! let diags = check_transaction(&txn, &ToleranceOptions::default(), DirectiveId(0));
//! assert_eq!(diags[0].code, ErrorCode::TransactionDoesNotBalance);
//! assert_eq!(diags[0].to_string(), "[E3001] Transaction does not balance: (0.50 USD)");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod accounts;
mod balance;
mod diagnostic;

pub use accounts::{validate_account_name, AccountState, Accounts, VALID_ACCOUNT_ROOTS};
pub use balance::{assert_balance, check_transaction, subtree_units};
pub use diagnostic::{tally, Diagnostic, ErrorCode, Severity};
