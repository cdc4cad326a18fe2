//! Account lifecycle: names, open and close, and what an open account accepts.

use chrono::NaiveDate;
use std::collections::HashMap;
use tallyman_core::intern::is_within;
use tallyman_core::{
    BookingMethod, Close, DirectiveId, InternedStr, Inventory, Open, Transaction,
};

use crate::{Diagnostic, ErrorCode};

/// Valid account root types.
pub const VALID_ACCOUNT_ROOTS: &[&str] = &["Assets", "Liabilities", "Equity", "Income", "Expenses"];

/// Check an account name.
///
/// Returns `None` if valid, or `Some(reason)` if invalid.
///
/// ```
/// use tallyman_validate::validate_account_name;
///
/// assert!(validate_account_name("Assets:Bank:Checking").is_none());
/// assert!(validate_account_name("Assets:bank").is_some());
/// assert!(validate_account_name("Cash").is_some());
/// ```
#[must_use]
pub fn validate_account_name(account: &str) -> Option<String> {
    if account.is_empty() {
        return Some("account name is empty".to_string());
    }

    let mut parts = account.split(':');
    let root = parts.next().unwrap_or_default();
    if !VALID_ACCOUNT_ROOTS.contains(&root) {
        return Some(format!(
            "account must start with one of: {}",
            VALID_ACCOUNT_ROOTS.join(", ")
        ));
    }

    for (i, part) in parts.enumerate() {
        let mut chars = part.chars();
        let Some(first) = chars.next() else {
            return Some(format!("component {} is empty", i + 2));
        };
        if !first.is_ascii_uppercase() && !first.is_ascii_digit() {
            return Some(format!(
                "component '{part}' must start with uppercase letter or digit"
            ));
        }
        if let Some(c) = chars.find(|c| !c.is_ascii_alphanumeric() && *c != '-') {
            return Some(format!(
                "component '{part}' contains invalid character '{c}'"
            ));
        }
    }

    None
}

/// What is known about one opened account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    /// Date opened.
    pub opened: NaiveDate,
    /// Date closed, once a close directive has been seen.
    pub closed: Option<NaiveDate>,
    /// Allowed currencies; empty allows any.
    pub currencies: Vec<InternedStr>,
    /// Booking method given by the open directive.
    pub booking: Option<BookingMethod>,
}

impl AccountState {
    /// Whether the account may hold `currency`.
    #[must_use]
    pub fn allows(&self, currency: &str) -> bool {
        self.currencies.is_empty() || self.currencies.iter().any(|c| c == currency)
    }
}

/// Lifecycle of every account seen so far.
#[derive(Debug, Clone, Default)]
pub struct Accounts {
    states: HashMap<InternedStr, AccountState>,
}

impl Accounts {
    /// No accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `account`, if it was ever opened.
    #[must_use]
    pub fn get(&self, account: &str) -> Option<&AccountState> {
        self.states.get(account)
    }

    /// Number of accounts opened.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no account was opened.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Whether `account` was opened, or is the parent of an opened account.
    #[must_use]
    pub fn covers(&self, account: &str) -> bool {
        self.states.contains_key(account) || self.states.keys().any(|a| is_within(a, account))
    }

    /// Apply an open directive.
    ///
    /// A malformed name is reported but the account is opened anyway; a
    /// duplicate open leaves the first one in place.
    pub fn open(&mut self, open: &Open, directive: DirectiveId) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if let Some(reason) = validate_account_name(&open.account) {
            diagnostics.push(
                Diagnostic::new(
                    ErrorCode::InvalidAccountName,
                    format!("Invalid account name \"{}\": {}", open.account, reason),
                    directive,
                    open.date,
                )
                .with_context(open.account.to_string()),
            );
        }

        if let Some(existing) = self.states.get(&open.account) {
            diagnostics.push(Diagnostic::new(
                ErrorCode::AccountAlreadyOpen,
                format!(
                    "Account {} is already open (opened on {})",
                    open.account, existing.opened
                ),
                directive,
                open.date,
            ));
            return diagnostics;
        }

        self.states.insert(
            open.account.clone(),
            AccountState {
                opened: open.date,
                closed: None,
                currencies: open.currencies.clone(),
                booking: open.booking,
            },
        );
        diagnostics
    }

    /// Apply a close directive, given what the account holds.
    pub fn close(&mut self, close: &Close, holdings: Option<&Inventory>, directive: DirectiveId) -> Vec<Diagnostic> {
        let Some(state) = self.states.get_mut(&close.account) else {
            return vec![Diagnostic::new(
                ErrorCode::AccountNotOpen,
                format!("Account {} was never opened", close.account),
                directive,
                close.date,
            )];
        };

        if let Some(closed) = state.closed {
            return vec![Diagnostic::new(
                ErrorCode::AccountClosed,
                format!("Account {} already closed on {closed}", close.account),
                directive,
                close.date,
            )];
        }

        let mut diagnostics = Vec::new();
        if let Some(inv) = holdings.filter(|inv| !inv.is_empty()) {
            let positions: Vec<String> = inv.lots().map(|p| p.units.to_string()).collect();
            diagnostics.push(
                Diagnostic::new(
                    ErrorCode::AccountCloseNotEmpty,
                    format!("Closing account {} with non-zero balance", close.account),
                    directive,
                    close.date,
                )
                .with_context(format!("balance: {}", positions.join(", "))),
            );
        }
        state.closed = Some(close.date);
        diagnostics
    }

    /// Check that every account a transaction posts to is open.
    ///
    /// Each account is reported once, however many postings it has.
    pub fn check_postings(&self, transaction: &Transaction, directive: DirectiveId) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut seen: Vec<&str> = Vec::new();

        for posting in &transaction.postings {
            let account = posting.account.as_str();
            if seen.contains(&account) {
                continue;
            }
            seen.push(account);

            let diagnostic = match self.states.get(account) {
                None => Some(Diagnostic::new(
                    ErrorCode::AccountNotOpen,
                    format!("Account {account} was never opened"),
                    directive,
                    transaction.date,
                )),
                Some(state) if transaction.date < state.opened => Some(Diagnostic::new(
                    ErrorCode::AccountNotOpen,
                    format!(
                        "Account {account} used on {} but not opened until {}",
                        transaction.date, state.opened
                    ),
                    directive,
                    transaction.date,
                )),
                Some(AccountState {
                    closed: Some(closed), ..
                }) => Some(Diagnostic::new(
                    ErrorCode::AccountClosed,
                    format!(
                        "Account {account} used on {} but was closed on {closed}",
                        transaction.date
                    ),
                    directive,
                    transaction.date,
                )),
                Some(_) => None,
            };
            diagnostics.extend(diagnostic);
        }
        diagnostics
    }

    /// Check posting currencies against the accounts' constraints.
    ///
    /// Postings whose currency is still unknown are skipped.
    pub fn check_currencies(&self, transaction: &Transaction, directive: DirectiveId) -> Vec<Diagnostic> {
        transaction
            .postings
            .iter()
            .filter_map(|posting| {
                let currency = posting.currency()?;
                let state = self.states.get(&posting.account)?;
                (!state.allows(currency)).then(|| {
                    Diagnostic::new(
                        ErrorCode::CurrencyNotAllowed,
                        format!(
                            "Currency {currency} not allowed in account {}",
                            posting.account
                        ),
                        directive,
                        transaction.date,
                    )
                    .with_context(format!(
                        "allowed: {}",
                        state
                            .currencies
                            .iter()
                            .map(InternedStr::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))
                })
            })
            .collect()
    }
}
