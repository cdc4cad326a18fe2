//! Directives: the parsed statements a ledger is made of.
//!
//! The engine understands five kinds:
//!
//! - [`Transaction`]: moves value between accounts
//! - [`Open`] / [`Close`]: account lifecycle
//! - [`Balance`]: asserts an account's holdings on a date
//! - [`Price`]: quotes one currency in another
//!
//! Anything else is carried as [`Other`] and passed through untouched.
//! Every directive travels inside a [`Sourced`] wrapper that records where
//! it came from.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::intern::InternedStr;
use crate::{Amount, BookingMethod, CostSpec, IncompleteAmount};

/// A metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaValue {
    /// Quoted string.
    String(String),
    /// Account name.
    Account(String),
    /// Currency code.
    Currency(String),
    /// Date.
    Date(NaiveDate),
    /// Number.
    Number(Decimal),
    /// Boolean.
    Bool(bool),
    /// Amount.
    Amount(Amount),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Account(s) | Self::Currency(s) => write!(f, "{s}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::Amount(a) => write!(f, "{a}"),
        }
    }
}

/// Key-value metadata attached to directives and postings.
pub type Metadata = HashMap<String, MetaValue>;

/// Price annotation on a posting: `@` per unit or `@@` in total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceAnnotation {
    /// `@ amount`, possibly missing its number or currency.
    Unit(IncompleteAmount),
    /// `@@ amount`, possibly missing its number or currency.
    Total(IncompleteAmount),
    /// A bare `@`.
    UnitEmpty,
    /// A bare `@@`.
    TotalEmpty,
}

impl PriceAnnotation {
    /// A complete per-unit price.
    #[must_use]
    pub fn unit(amount: Amount) -> Self {
        Self::Unit(IncompleteAmount::Complete(amount))
    }

    /// A complete total price.
    #[must_use]
    pub fn total(amount: Amount) -> Self {
        Self::Total(IncompleteAmount::Complete(amount))
    }

    /// Whether this is a per-unit (`@`) annotation.
    #[must_use]
    pub const fn is_unit(&self) -> bool {
        matches!(self, Self::Unit(_) | Self::UnitEmpty)
    }

    /// The written number, if any.
    #[must_use]
    pub const fn number(&self) -> Option<Decimal> {
        match self {
            Self::Unit(a) | Self::Total(a) => a.number(),
            Self::UnitEmpty | Self::TotalEmpty => None,
        }
    }

    /// The written currency, if any.
    #[must_use]
    pub fn currency(&self) -> Option<&InternedStr> {
        match self {
            Self::Unit(a) | Self::Total(a) => a.currency(),
            Self::UnitEmpty | Self::TotalEmpty => None,
        }
    }

    /// The complete amount, if both parts are written.
    #[must_use]
    pub const fn amount(&self) -> Option<&Amount> {
        match self {
            Self::Unit(a) | Self::Total(a) => a.as_amount(),
            Self::UnitEmpty | Self::TotalEmpty => None,
        }
    }
}

impl fmt::Display for PriceAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit(a) => write!(f, "@ {a}"),
            Self::Total(a) => write!(f, "@@ {a}"),
            Self::UnitEmpty => write!(f, "@"),
            Self::TotalEmpty => write!(f, "@@"),
        }
    }
}

/// One leg of a transaction.
///
/// `units == None` marks an auto posting whose whole amount is inferred.
/// Postings refer to accounts by name only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Account name.
    pub account: InternedStr,
    /// Units, possibly incomplete.
    pub units: Option<IncompleteAmount>,
    /// Cost specification.
    pub cost: Option<CostSpec>,
    /// Price annotation.
    pub price: Option<PriceAnnotation>,
    /// Explicit tolerance for balancing this posting's currency group.
    pub tolerance: Option<Decimal>,
    /// Posting flag.
    pub flag: Option<char>,
    /// Posting metadata.
    pub meta: Metadata,
    /// Whether every number is known and interpolation must leave it alone.
    pub resolved: bool,
}

impl Posting {
    /// A posting with complete units.
    #[must_use]
    pub fn new(account: impl Into<InternedStr>, units: Amount) -> Self {
        Self::with_incomplete(account, IncompleteAmount::Complete(units))
    }

    /// A posting with possibly incomplete units.
    #[must_use]
    pub fn with_incomplete(account: impl Into<InternedStr>, units: IncompleteAmount) -> Self {
        Self {
            units: Some(units),
            ..Self::auto(account)
        }
    }

    /// A posting with no units at all.
    #[must_use]
    pub fn auto(account: impl Into<InternedStr>) -> Self {
        Self {
            account: account.into(),
            units: None,
            cost: None,
            price: None,
            tolerance: None,
            flag: None,
            meta: Metadata::new(),
            resolved: false,
        }
    }

    /// Set the cost specification.
    #[must_use]
    pub fn with_cost(mut self, cost: CostSpec) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Set the price annotation.
    #[must_use]
    pub fn with_price(mut self, price: PriceAnnotation) -> Self {
        self.price = Some(price);
        self
    }

    /// Set an explicit tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: Decimal) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Set the flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: char) -> Self {
        self.flag = Some(flag);
        self
    }

    /// The complete units, if known.
    #[must_use]
    pub fn amount(&self) -> Option<&Amount> {
        self.units.as_ref().and_then(IncompleteAmount::as_amount)
    }

    /// Currency of the units, if written.
    #[must_use]
    pub fn currency(&self) -> Option<&InternedStr> {
        self.units.as_ref().and_then(IncompleteAmount::currency)
    }

    /// Whether nothing but the account is written.
    #[must_use]
    pub const fn is_auto(&self) -> bool {
        self.units.is_none() && self.cost.is_none() && self.price.is_none()
    }
}

impl fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  ")?;
        if let Some(flag) = self.flag {
            write!(f, "{flag} ")?;
        }
        write!(f, "{}", self.account)?;
        if let Some(units) = &self.units {
            write!(f, "  {units}")?;
        }
        if let Some(cost) = &self.cost {
            write!(f, " {cost}")?;
        }
        if let Some(price) = &self.price {
            write!(f, " {price}")?;
        }
        Ok(())
    }
}

/// A transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Date.
    pub date: NaiveDate,
    /// Flag (`*` complete, `!` pending).
    pub flag: char,
    /// Payee.
    pub payee: Option<String>,
    /// Narration.
    pub narration: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Links.
    pub links: Vec<String>,
    /// Metadata.
    pub meta: Metadata,
    /// Postings, in written order.
    pub postings: Vec<Posting>,
}

impl Transaction {
    /// A transaction without postings.
    #[must_use]
    pub fn new(date: NaiveDate, narration: impl Into<String>) -> Self {
        Self {
            date,
            flag: '*',
            payee: None,
            narration: narration.into(),
            tags: Vec::new(),
            links: Vec::new(),
            meta: Metadata::new(),
            postings: Vec::new(),
        }
    }

    /// Set the flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: char) -> Self {
        self.flag = flag;
        self
    }

    /// Set the payee.
    #[must_use]
    pub fn with_payee(mut self, payee: impl Into<String>) -> Self {
        self.payee = Some(payee.into());
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Append a posting.
    #[must_use]
    pub fn with_posting(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.date, self.flag)?;
        if let Some(payee) = &self.payee {
            write!(f, "\"{payee}\" ")?;
        }
        write!(f, "\"{}\"", self.narration)?;
        for tag in &self.tags {
            write!(f, " #{tag}")?;
        }
        for link in &self.links {
            write!(f, " ^{link}")?;
        }
        for posting in &self.postings {
            write!(f, "\n{posting}")?;
        }
        Ok(())
    }
}

/// Opens an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Open {
    /// Date.
    pub date: NaiveDate,
    /// Account name.
    pub account: InternedStr,
    /// Currencies the account may hold; empty allows any.
    pub currencies: Vec<InternedStr>,
    /// Booking method for reductions.
    pub booking: Option<BookingMethod>,
    /// Metadata.
    pub meta: Metadata,
}

impl Open {
    /// Open `account` on `date` with no constraints.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<InternedStr>) -> Self {
        Self {
            date,
            account: account.into(),
            currencies: Vec::new(),
            booking: None,
            meta: Metadata::new(),
        }
    }

    /// Restrict the account to `currencies`.
    #[must_use]
    pub fn with_currencies<I, S>(mut self, currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<InternedStr>,
    {
        self.currencies = currencies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the booking method.
    #[must_use]
    pub const fn with_booking(mut self, booking: BookingMethod) -> Self {
        self.booking = Some(booking);
        self
    }
}

impl fmt::Display for Open {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} open {}", self.date, self.account)?;
        for (i, c) in self.currencies.iter().enumerate() {
            write!(f, "{}{c}", if i == 0 { " " } else { "," })?;
        }
        if let Some(booking) = self.booking {
            write!(f, " \"{booking}\"")?;
        }
        Ok(())
    }
}

/// Closes an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Close {
    /// Date.
    pub date: NaiveDate,
    /// Account name.
    pub account: InternedStr,
    /// Metadata.
    pub meta: Metadata,
}

impl Close {
    /// Close `account` on `date`.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<InternedStr>) -> Self {
        Self {
            date,
            account: account.into(),
            meta: Metadata::new(),
        }
    }
}

impl fmt::Display for Close {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} close {}", self.date, self.account)
    }
}

/// Asserts the holdings of an account (and its sub-accounts) in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Date.
    pub date: NaiveDate,
    /// Account name.
    pub account: InternedStr,
    /// Expected amount.
    pub amount: Amount,
    /// Explicit tolerance.
    pub tolerance: Option<Decimal>,
    /// Actual minus expected, filled in when the assertion fails.
    pub diff: Option<Amount>,
    /// Metadata.
    pub meta: Metadata,
}

impl Balance {
    /// Assert that `account` holds `amount` on `date`.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<InternedStr>, amount: Amount) -> Self {
        Self {
            date,
            account: account.into(),
            amount,
            tolerance: None,
            diff: None,
            meta: Metadata::new(),
        }
    }

    /// Set an explicit tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: Decimal) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} balance {} {}", self.date, self.account, self.amount)?;
        if let Some(tol) = self.tolerance {
            write!(f, " ~ {tol}")?;
        }
        Ok(())
    }
}

/// Quotes one unit of `currency` as `amount` on `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Date.
    pub date: NaiveDate,
    /// Base currency.
    pub currency: InternedStr,
    /// Rate, in the quote currency.
    pub amount: Amount,
    /// Metadata.
    pub meta: Metadata,
}

impl Price {
    /// `1 currency = amount` on `date`.
    #[must_use]
    pub fn new(date: NaiveDate, currency: impl Into<InternedStr>, amount: Amount) -> Self {
        Self {
            date,
            currency: currency.into(),
            amount,
            meta: Metadata::new(),
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} price {} {}", self.date, self.currency, self.amount)
    }
}

/// A directive the engine does not interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Other {
    /// Date.
    pub date: NaiveDate,
    /// Directive type name, e.g. `note` or `event`.
    pub kind: String,
    /// Positional values.
    pub values: Vec<MetaValue>,
    /// Metadata.
    pub meta: Metadata,
}

impl Other {
    /// An uninterpreted directive of type `kind`.
    #[must_use]
    pub fn new(date: NaiveDate, kind: impl Into<String>) -> Self {
        Self {
            date,
            kind: kind.into(),
            values: Vec::new(),
            meta: Metadata::new(),
        }
    }

    /// Append a value.
    #[must_use]
    pub fn with_value(mut self, value: MetaValue) -> Self {
        self.values.push(value);
        self
    }
}

impl fmt::Display for Other {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.kind)?;
        for value in &self.values {
            write!(f, " {value}")?;
        }
        Ok(())
    }
}

/// Order of directive kinds sharing a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirectivePriority {
    /// Accounts open before use.
    Open = 0,
    /// Assertions hold at the start of the day.
    Balance = 1,
    /// Quotes are known before the day's transactions.
    Price = 2,
    /// Transactions.
    Transaction = 3,
    /// Uninterpreted directives.
    Other = 4,
    /// Accounts close after the day's activity.
    Close = 5,
}

/// Any directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
    /// Transaction.
    Transaction(Transaction),
    /// Account opening.
    Open(Open),
    /// Account closing.
    Close(Close),
    /// Balance assertion.
    Balance(Balance),
    /// Price quote.
    Price(Price),
    /// Passed through untouched.
    Other(Other),
}

impl Directive {
    /// Date of the directive.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        match self {
            Self::Transaction(t) => t.date,
            Self::Open(o) => o.date,
            Self::Close(c) => c.date,
            Self::Balance(b) => b.date,
            Self::Price(p) => p.date,
            Self::Other(o) => o.date,
        }
    }

    /// Metadata of the directive.
    #[must_use]
    pub const fn meta(&self) -> &Metadata {
        match self {
            Self::Transaction(t) => &t.meta,
            Self::Open(o) => &o.meta,
            Self::Close(c) => &c.meta,
            Self::Balance(b) => &b.meta,
            Self::Price(p) => &p.meta,
            Self::Other(o) => &o.meta,
        }
    }

    /// Lower-case type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Transaction(_) => "transaction",
            Self::Open(_) => "open",
            Self::Close(_) => "close",
            Self::Balance(_) => "balance",
            Self::Price(_) => "price",
            Self::Other(o) => &o.kind,
        }
    }

    /// Same-date ordering priority.
    #[must_use]
    pub const fn priority(&self) -> DirectivePriority {
        match self {
            Self::Open(_) => DirectivePriority::Open,
            Self::Balance(_) => DirectivePriority::Balance,
            Self::Price(_) => DirectivePriority::Price,
            Self::Transaction(_) => DirectivePriority::Transaction,
            Self::Other(_) => DirectivePriority::Other,
            Self::Close(_) => DirectivePriority::Close,
        }
    }

    /// The transaction, if this is one.
    #[must_use]
    pub const fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Transaction(t) => Some(t),
            _ => None,
        }
    }

    /// Accounts this directive refers to, in written order.
    #[must_use]
    pub fn accounts(&self) -> Vec<&InternedStr> {
        match self {
            Self::Transaction(t) => t.postings.iter().map(|p| &p.account).collect(),
            Self::Open(o) => vec![&o.account],
            Self::Close(c) => vec![&c.account],
            Self::Balance(b) => vec![&b.account],
            Self::Price(_) | Self::Other(_) => Vec::new(),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction(t) => t.fmt(f),
            Self::Open(o) => o.fmt(f),
            Self::Close(c) => c.fmt(f),
            Self::Balance(b) => b.fmt(f),
            Self::Price(p) => p.fmt(f),
            Self::Other(o) => o.fmt(f),
        }
    }
}

/// Where a directive was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Origin {
    /// Source file, when known.
    pub file: Option<String>,
    /// One-based line number; zero when unknown.
    pub line: usize,
}

impl Origin {
    /// A location in `file`.
    #[must_use]
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: Some(file.into()),
            line,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}", self.line),
            None => write!(f, "<input>:{}", self.line),
        }
    }
}

/// A value together with its [`Origin`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sourced<T> {
    /// The value.
    pub value: T,
    /// Where it was written.
    pub origin: Origin,
}

impl<T> Sourced<T> {
    /// Attach an origin.
    pub const fn new(value: T, origin: Origin) -> Self {
        Self { value, origin }
    }

    /// Attach an unknown origin.
    pub fn bare(value: T) -> Self {
        Self::new(value, Origin::default())
    }

    /// Replace the value, keeping the origin.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            origin: self.origin,
        }
    }
}

/// Position of a directive in the processed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DirectiveId(pub usize);

impl fmt::Display for DirectiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable sort by date, then same-date priority, then origin.
pub fn sort_directives(directives: &mut [Sourced<Directive>]) {
    directives.sort_by(|a, b| {
        a.value
            .date()
            .cmp(&b.value.date())
            .then_with(|| a.value.priority().cmp(&b.value.priority()))
            .then_with(|| a.origin.cmp(&b.origin))
    });
}
