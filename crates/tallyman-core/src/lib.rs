//! Core types for tallyman
//!
//! This crate provides the value types every other tallyman crate builds on:
//!
//! - [`Amount`] - An exact decimal number with a currency
//! - [`Cost`] / [`CostSpec`] - Lot cost basis, complete or as written
//! - [`Position`] - Units held at an optional cost
//! - [`Inventory`] - The holdings of one account
//! - [`BookingMethod`] - How reductions are matched against lots
//! - [`Directive`] - Transactions, balance assertions, prices, open/close
//! - [`number`] - Exact division with explicit precision loss
//!
//! # Example
//!
//! ```
//! use tallyman_core::{Amount, Cost, CostSpec, Inventory, Position, NaiveDate};
//! use rust_decimal_macros::dec;
//!
//! let mut inv = Inventory::new();
//! let cost = Cost::new(dec!(150.00), "USD")
//!     .with_date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
//! inv.add(Position::with_cost(Amount::new(dec!(10), "AAPL"), cost));
//!
//! let sold = inv.reduce(&Amount::new(dec!(-5), "AAPL"), &CostSpec::empty()).unwrap();
//! assert_eq!(sold.book_value().unwrap().unwrap().number, dec!(-750.00));
//! assert_eq!(inv.units("AAPL").unwrap(), dec!(5));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod cost;
pub mod directive;
pub mod intern;
pub mod inventory;
pub mod number;
pub mod position;

pub use amount::{Amount, IncompleteAmount};
pub use cost::{Cost, CostSpec};
pub use directive::{
    sort_directives, Balance, Close, Directive, DirectiveId, DirectivePriority, MetaValue,
    Metadata, Open, Origin, Other, Posting, Price, PriceAnnotation, Sourced, Transaction,
};
pub use intern::InternedStr;
pub use inventory::{BookingMethod, Inventory, InventoryError, ParseBookingMethodError};
pub use number::{NumberError, Quotient};
pub use position::Position;

// Re-export commonly used external types
pub use chrono::NaiveDate;
pub use rust_decimal::Decimal;
