//! Processing options.
//!
//! Options deserialize from JSON with every field optional:
//!
//! ```
//! use tallyman::Options;
//! use tallyman_core::BookingMethod;
//!
//! let options = Options::from_json(r#"{
//!     "booking_method": "FIFO",
//!     "booking_overrides": { "Assets:Legacy": "AVERAGE" },
//!     "tolerance": { "defaults": { "*": "0.01" } },
//!     "precision": 8
//! }"#).unwrap();
//!
//! assert_eq!(options.booking_method_for("Assets:Broker", None), BookingMethod::Fifo);
//! assert_eq!(options.booking_method_for("Assets:Legacy", Some(BookingMethod::Lifo)), BookingMethod::Average);
//! assert!(!options.parallel);
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tallyman_booking::{parse_tolerance_map, BookingConfig, ToleranceOptions};
use tallyman_core::number::MAX_SCALE;
use tallyman_core::BookingMethod;
use thiserror::Error;

/// Errors raised while loading options.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// The options file could not be read.
    #[error("cannot read options from {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },

    /// The options are not valid JSON for [`Options`].
    #[error("invalid options: {0}")]
    Json(#[from] serde_json::Error),

    /// A tolerance map could not be parsed.
    #[error("invalid tolerance map: {0}")]
    Tolerance(String),

    /// The precision cap exceeds what a decimal can hold.
    #[error("precision {0} exceeds the maximum of {max} digits", max = MAX_SCALE)]
    Precision(u32),
}

/// Options for one processing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Booking method for accounts whose open directive names none.
    pub booking_method: BookingMethod,

    /// Booking method per account, overriding the open directive.
    pub booking_overrides: HashMap<String, BookingMethod>,

    /// Tolerances for balancing and balance assertions.
    pub tolerance: ToleranceOptions,

    /// Book an over-reduction as a negative lot with a warning instead of
    /// failing the transaction.
    pub lenient_insufficient_lots: bool,

    /// Fractional digits to round non-terminating divisions to. Without it
    /// such a division is an error.
    pub precision: Option<u32>,

    /// Leave directives with structural errors out of the output.
    pub drop_invalid_directives: bool,

    /// Process independent groups of accounts in parallel.
    pub parallel: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            booking_method: BookingMethod::Strict,
            booking_overrides: HashMap::new(),
            tolerance: ToleranceOptions::default(),
            lenient_insufficient_lots: false,
            precision: None,
            drop_invalid_directives: false,
            parallel: false,
        }
    }
}

impl Options {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON.
    pub fn from_json(json: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Parse a tolerance map written as `USD:0.005,*:0.01`.
    pub fn parse_tolerance_map(s: &str) -> Result<HashMap<String, Decimal>, OptionsError> {
        parse_tolerance_map(s).map_err(OptionsError::Tolerance)
    }

    fn validate(&self) -> Result<(), OptionsError> {
        match self.precision {
            Some(p) if p > MAX_SCALE => Err(OptionsError::Precision(p)),
            _ => Ok(()),
        }
    }

    /// Set the default booking method.
    #[must_use]
    pub const fn with_booking_method(mut self, method: BookingMethod) -> Self {
        self.booking_method = method;
        self
    }

    /// Force `method` for `account`.
    #[must_use]
    pub fn with_booking_override(mut self, account: impl Into<String>, method: BookingMethod) -> Self {
        self.booking_overrides.insert(account.into(), method);
        self
    }

    /// Set the tolerance defaults from a `USD:0.005,*:0.01` string.
    pub fn with_tolerance_defaults(mut self, s: &str) -> Result<Self, OptionsError> {
        self.tolerance.defaults = Self::parse_tolerance_map(s)?;
        Ok(self)
    }

    /// Allow over-reductions.
    #[must_use]
    pub const fn with_lenient_insufficient_lots(mut self, lenient: bool) -> Self {
        self.lenient_insufficient_lots = lenient;
        self
    }

    /// Set the division precision cap.
    #[must_use]
    pub const fn with_precision(mut self, precision: Option<u32>) -> Self {
        self.precision = precision;
        self
    }

    /// Drop directives with structural errors.
    #[must_use]
    pub const fn with_drop_invalid_directives(mut self, drop: bool) -> Self {
        self.drop_invalid_directives = drop;
        self
    }

    /// Enable parallel processing.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Booking method in force for `account`: the override, else the one
    /// `declared` by its open directive, else the default.
    #[must_use]
    pub fn booking_method_for(&self, account: &str, declared: Option<BookingMethod>) -> BookingMethod {
        self.booking_overrides
            .get(account)
            .copied()
            .or(declared)
            .unwrap_or(self.booking_method)
    }

    /// Settings handed to the booking engine.
    #[must_use]
    pub const fn booking_config(&self) -> BookingConfig {
        BookingConfig {
            precision: self.precision,
            lenient_insufficient_lots: self.lenient_insufficient_lots,
        }
    }
}
