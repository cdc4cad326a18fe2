//! Error codes, severities and the diagnostics built from them.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tallyman_booking::{BookingError, BookingWarning, InterpolationError};
use tallyman_core::{DirectiveId, InventoryError, NumberError};
use tallyman_prices::PriceError;
use thiserror::Error;

/// Diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ErrorCode {
    // === Structural (E1xxx) ===
    /// E1001: Account used before it was opened.
    AccountNotOpen,
    /// E1002: Account opened twice.
    AccountAlreadyOpen,
    /// E1003: Account used after it was closed.
    AccountClosed,
    /// E1004: Account closed while still holding something.
    AccountCloseNotEmpty,
    /// E1005: Malformed account name.
    InvalidAccountName,

    // === Validation (E2xxx, E30xx) ===
    /// E2001: Balance assertion failed.
    BalanceAssertionFailed,
    /// E3001: Transaction does not balance.
    TransactionDoesNotBalance,
    /// E3003: Transaction has no postings.
    NoPostings,

    // === Interpolation (E31xx) ===
    /// E3101: Too many unknowns to solve.
    UnderConstrained,
    /// E3102: An unknown cannot be determined.
    CannotInterpolate,
    /// E3103: An interpolated number was rounded.
    InexactInterpolation,

    // === Booking (E4xxx) ===
    /// E4001: No lot matches a reduction.
    NoMatchingLot,
    /// E4002: The matched lot is smaller than the reduction.
    InsufficientLotSize,
    /// E4003: Several lots match and the method cannot choose.
    AmbiguousMatch,
    /// E4004: The matching lots hold fewer units than the reduction.
    InsufficientLots,
    /// E4101: Price quote earlier than the last one of its pair.
    OutOfOrderPrice,
    /// E4102: No price available for the price fallback.
    NoPriceAvailable,

    // === Numeric (E5xxx) ===
    /// E5001: Division does not terminate, or overflows.
    PrecisionError,
    /// E5002: Amounts of different currencies combined.
    CurrencyMismatch,
    /// E5003: Currency not allowed by the account's open directive.
    CurrencyNotAllowed,

    // === Ordering (E10xxx) ===
    /// E10001: Directive dated before its predecessor.
    DateOutOfOrder,
}

impl ErrorCode {
    /// Every code, in numeric order.
    pub const ALL: [Self; 21] = [
        Self::AccountNotOpen,
        Self::AccountAlreadyOpen,
        Self::AccountClosed,
        Self::AccountCloseNotEmpty,
        Self::InvalidAccountName,
        Self::BalanceAssertionFailed,
        Self::TransactionDoesNotBalance,
        Self::NoPostings,
        Self::UnderConstrained,
        Self::CannotInterpolate,
        Self::InexactInterpolation,
        Self::NoMatchingLot,
        Self::InsufficientLotSize,
        Self::AmbiguousMatch,
        Self::InsufficientLots,
        Self::OutOfOrderPrice,
        Self::NoPriceAvailable,
        Self::PrecisionError,
        Self::CurrencyMismatch,
        Self::CurrencyNotAllowed,
        Self::DateOutOfOrder,
    ];

    /// Get the error code string (e.g., "E1001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AccountNotOpen => "E1001",
            Self::AccountAlreadyOpen => "E1002",
            Self::AccountClosed => "E1003",
            Self::AccountCloseNotEmpty => "E1004",
            Self::InvalidAccountName => "E1005",
            Self::BalanceAssertionFailed => "E2001",
            Self::TransactionDoesNotBalance => "E3001",
            Self::NoPostings => "E3003",
            Self::UnderConstrained => "E3101",
            Self::CannotInterpolate => "E3102",
            Self::InexactInterpolation => "E3103",
            Self::NoMatchingLot => "E4001",
            Self::InsufficientLotSize => "E4002",
            Self::AmbiguousMatch => "E4003",
            Self::InsufficientLots => "E4004",
            Self::OutOfOrderPrice => "E4101",
            Self::NoPriceAvailable => "E4102",
            Self::PrecisionError => "E5001",
            Self::CurrencyMismatch => "E5002",
            Self::CurrencyNotAllowed => "E5003",
            Self::DateOutOfOrder => "E10001",
        }
    }

    /// Check if this is a warning (not an error).
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::AccountCloseNotEmpty | Self::InexactInterpolation)
    }

    /// Check if this is just informational.
    #[must_use]
    pub const fn is_info(&self) -> bool {
        matches!(self, Self::NoPriceAvailable | Self::DateOutOfOrder)
    }

    /// Whether the code leaves the directive unprocessed.
    ///
    /// Structural problems stop a directive from touching any inventory.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::AccountNotOpen | Self::AccountClosed)
    }

    /// Default severity level.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        if self.is_info() {
            Severity::Info
        } else if self.is_warning() {
            Severity::Warning
        } else {
            Severity::Error
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Severity {
    /// The directive could not be processed correctly.
    Error,
    /// Processed, but suspicious.
    Warning,
    /// Informational only.
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        })
    }
}

impl From<&NumberError> for ErrorCode {
    fn from(err: &NumberError) -> Self {
        match err {
            NumberError::Precision { .. } | NumberError::Overflow => Self::PrecisionError,
            NumberError::CurrencyMismatch { .. } => Self::CurrencyMismatch,
            NumberError::DivisionByZero { .. } => Self::CannotInterpolate,
        }
    }
}

impl From<&PriceError> for ErrorCode {
    fn from(err: &PriceError) -> Self {
        match err {
            PriceError::OutOfOrderPrice { .. } => Self::OutOfOrderPrice,
            PriceError::NoPriceAvailable { .. } => Self::NoPriceAvailable,
        }
    }
}

impl From<&InventoryError> for ErrorCode {
    fn from(err: &InventoryError) -> Self {
        match err {
            InventoryError::NoMatchingLot { .. } => Self::NoMatchingLot,
            InventoryError::AmbiguousMatch { .. } => Self::AmbiguousMatch,
            InventoryError::InsufficientUnits { .. } => Self::InsufficientLots,
            InventoryError::Number(source) => source.into(),
        }
    }
}

impl From<&InterpolationError> for ErrorCode {
    fn from(err: &InterpolationError) -> Self {
        match err {
            InterpolationError::TooManyAutoPostings { .. } | InterpolationError::UnderConstrained { .. } => {
                Self::UnderConstrained
            }
            InterpolationError::CannotInterpolate { .. } => Self::CannotInterpolate,
            InterpolationError::Number { source, .. } => source.into(),
        }
    }
}

impl From<&BookingError> for ErrorCode {
    fn from(err: &BookingError) -> Self {
        match err {
            BookingError::NoMatchingLot { .. } => Self::NoMatchingLot,
            BookingError::AmbiguousMatch { .. } => Self::AmbiguousMatch,
            BookingError::InsufficientLotSize { .. } => Self::InsufficientLotSize,
            BookingError::InsufficientLots { .. } => Self::InsufficientLots,
            BookingError::Interpolation(inner) => inner.into(),
            BookingError::Number { source, .. } => source.into(),
        }
    }
}

impl From<&BookingWarning> for ErrorCode {
    fn from(warning: &BookingWarning) -> Self {
        match warning {
            BookingWarning::InexactInterpolation(_) => Self::InexactInterpolation,
            BookingWarning::InsufficientLots { .. } => Self::InsufficientLots,
        }
    }
}

/// One problem found while processing, tied to the directive it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("[{code}] {message}")]
pub struct Diagnostic {
    /// Error code.
    pub code: ErrorCode,
    /// How serious it is; usually the code's default.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Position of the directive in the input stream.
    pub directive: DirectiveId,
    /// Date of the directive.
    pub date: NaiveDate,
    /// Additional context.
    pub context: Option<String>,
}

impl Diagnostic {
    /// Create a diagnostic with the code's default severity.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>, directive: DirectiveId, date: NaiveDate) -> Self {
        Self {
            code,
            severity: code.severity(),
            message: message.into(),
            directive,
            date,
            context: None,
        }
    }

    /// Add context to this diagnostic.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Override the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Whether this diagnostic is an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Diagnostics for a transaction that failed to book.
    ///
    /// A missing price that made a group unsolvable is reported as an extra
    /// informational diagnostic after the error.
    #[must_use]
    pub fn from_booking_error(err: &BookingError, directive: DirectiveId, date: NaiveDate) -> Vec<Self> {
        let mut diagnostics = vec![Self::new(err.into(), err.to_string(), directive, date)];
        if let BookingError::Interpolation(InterpolationError::UnderConstrained {
            missing_price: Some(price_err),
            ..
        }) = err
        {
            diagnostics.push(Self::new(price_err.into(), price_err.to_string(), directive, date));
        }
        diagnostics
    }

    /// A warning raised by a transaction that booked.
    #[must_use]
    pub fn from_booking_warning(warning: &BookingWarning, directive: DirectiveId, date: NaiveDate) -> Self {
        Self::new(warning.into(), warning.to_string(), directive, date).with_severity(Severity::Warning)
    }

    /// Arithmetic that failed while checking a directive.
    #[must_use]
    pub fn from_number_error(err: &NumberError, directive: DirectiveId, date: NaiveDate) -> Self {
        Self::new(err.into(), err.to_string(), directive, date)
    }

    /// A price directive the database rejected.
    #[must_use]
    pub fn from_price_error(err: &PriceError, directive: DirectiveId, date: NaiveDate) -> Self {
        Self::new(err.into(), err.to_string(), directive, date)
    }
}

/// Count diagnostics per severity as `(errors, warnings, infos)`.
#[must_use]
pub fn tally(diagnostics: &[Diagnostic]) -> (usize, usize, usize) {
    diagnostics.iter().fold((0, 0, 0), |(e, w, i), d| match d.severity {
        Severity::Error => (e + 1, w, i),
        Severity::Warning => (e, w + 1, i),
        Severity::Info => (e, w, i + 1),
    })
}
