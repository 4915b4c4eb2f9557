//! Core types and data structures for the ledger and reconciliation engine

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Number of fractional digits used when no currency configuration is at hand
pub const DEFAULT_MINOR_UNIT_SCALE: u32 = 2;

/// Exact monetary amount expressed as a signed count of minor currency units (cents, fen, ...)
///
/// The operators saturate at the `i64` bounds. Report totals go through
/// [`Money::try_sum`] so an out-of-range total is an error instead.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Build an amount from a raw minor-unit count
    pub const fn from_minor(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Raw minor-unit count
    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Convert an exact decimal into minor units.
    ///
    /// Values carrying more fractional digits than `scale` are rejected rather
    /// than rounded, so that imported figures never silently lose a cent.
    pub fn from_decimal(value: &BigDecimal, scale: u32) -> LedgerResult<Self> {
        let factor = BigDecimal::from(minor_factor(scale)?);
        let scaled = value * &factor;
        let whole = scaled.with_scale(0);
        if whole != scaled {
            return Err(LedgerError::Validation(format!(
                "Amount {} has more than {} fractional digits",
                value, scale
            )));
        }
        whole.to_i64().map(Self).ok_or_else(|| {
            LedgerError::Validation(format!("Amount {} is out of range", value))
        })
    }

    /// Parse decimal text such as `"1234.50"` or `"-12"` into minor units
    pub fn parse(text: &str, scale: u32) -> LedgerResult<Self> {
        let value = BigDecimal::from_str(text.trim()).map_err(|e| {
            LedgerError::Validation(format!("Invalid amount '{}': {}", text, e))
        })?;
        Self::from_decimal(&value, scale)
    }

    /// Convert back into a decimal value in major units
    pub fn to_decimal(self, scale: u32) -> BigDecimal {
        let factor = 10i64.checked_pow(scale).unwrap_or(1);
        BigDecimal::from(self.0) / BigDecimal::from(factor)
    }

    /// Render with `scale` fractional digits, e.g. `-12.05`
    pub fn format(self, scale: u32) -> String {
        let factor = 10u64.checked_pow(scale).unwrap_or(1);
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        if scale == 0 {
            return format!("{}{}", sign, magnitude);
        }
        format!(
            "{}{}.{:0width$}",
            sign,
            magnitude / factor,
            magnitude % factor,
            width = scale as usize
        )
    }

    pub fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Sum amounts, failing instead of saturating when the total leaves the `i64` range
    pub fn try_sum<I: IntoIterator<Item = Money>>(amounts: I) -> LedgerResult<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, Money::checked_add)
            .ok_or_else(|| LedgerError::Validation("Amount total is out of range".to_string()))
    }

    /// Absolute distance between two amounts in minor units
    pub fn distance(self, other: Money) -> u64 {
        self.0.abs_diff(other.0)
    }
}

fn minor_factor(scale: u32) -> LedgerResult<i64> {
    10i64
        .checked_pow(scale)
        .ok_or_else(|| LedgerError::Validation(format!("Unsupported minor unit scale {}", scale)))
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(DEFAULT_MINOR_UNIT_SCALE))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(self.0.saturating_neg())
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_sub(rhs.0);
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

/// Subject types following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubjectType {
    /// What the business owns (cash, bank deposits, receivables, inventory, ...)
    Asset,
    /// What the business owes (loans, payables, payroll, ...)
    Liability,
    /// Owner's interest in the business (paid-in capital, retained earnings, ...)
    Equity,
    /// Income earned by the business
    Revenue,
    /// Costs incurred by the business
    Expense,
}

impl SubjectType {
    /// Side on which a subject of this type normally carries its balance.
    /// Assets and expenses are debit-normal; liabilities, equity and revenue are credit-normal.
    pub fn normal_balance(&self) -> Side {
        match self {
            SubjectType::Asset | SubjectType::Expense => Side::Debit,
            SubjectType::Liability | SubjectType::Equity | SubjectType::Revenue => Side::Credit,
        }
    }

    /// Whether balances of this type appear on the balance sheet
    pub fn is_balance_sheet(&self) -> bool {
        matches!(
            self,
            SubjectType::Asset | SubjectType::Liability | SubjectType::Equity
        )
    }
}

/// Sides of a double-entry line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Debit,
    Credit,
}

/// Cash-flow statement section a subject's movements are reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CashFlowCategory {
    Operating,
    Investing,
    Financing,
}

/// An account subject in the chart of accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSubject {
    /// Unique identifier for the subject
    pub id: String,
    /// Unique subject code, e.g. `1002`
    pub code: String,
    /// Human-readable subject name
    pub name: String,
    /// Type of subject (Asset, Liability, ...). Frozen once a posted entry references it.
    pub subject_type: SubjectType,
    /// Optional parent subject for a hierarchical chart
    pub parent_id: Option<String>,
    /// Disabled subjects cannot be used by new entries
    pub enabled: bool,
    /// Cash or bank-equivalent subject, tracked by the cash-flow statement
    pub cash_equivalent: bool,
    /// Section under which cash movements against this subject are reported
    pub cash_flow_category: Option<CashFlowCategory>,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl AccountSubject {
    /// Create a new, enabled subject
    pub fn new(
        id: String,
        code: String,
        name: String,
        subject_type: SubjectType,
        parent_id: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            code,
            name,
            subject_type,
            parent_id,
            enabled: true,
            cash_equivalent: false,
            cash_flow_category: None,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the subject as a cash or bank-equivalent subject
    pub fn cash_equivalent(mut self) -> Self {
        self.cash_equivalent = true;
        self
    }

    /// Tag the subject with a cash-flow section
    pub fn with_cash_flow_category(mut self, category: CashFlowCategory) -> Self {
        self.cash_flow_category = Some(category);
        self
    }

    /// Balance in this subject's normal orientation for the given debit and credit totals
    pub fn oriented_balance(&self, debits: Money, credits: Money) -> Money {
        match self.subject_type.normal_balance() {
            Side::Debit => debits - credits,
            Side::Credit => credits - debits,
        }
    }
}

/// Lifecycle state of a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryStatus {
    Draft,
    Posted,
}

/// A single line of a journal entry. Exactly one of `debit` and `credit` is non-zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub subject_id: String,
    pub debit: Money,
    pub credit: Money,
    /// Optional counterparty tag (customer, supplier, employee, ...)
    pub counterparty: Option<String>,
}

impl JournalLine {
    pub fn debit(subject_id: String, amount: Money, counterparty: Option<String>) -> Self {
        Self {
            subject_id,
            debit: amount,
            credit: Money::ZERO,
            counterparty,
        }
    }

    pub fn credit(subject_id: String, amount: Money, counterparty: Option<String>) -> Self {
        Self {
            subject_id,
            debit: Money::ZERO,
            credit: amount,
            counterparty,
        }
    }

    /// Debit-positive signed amount; for a bank subject this has the same sign as the statement
    pub fn signed_amount(&self) -> Money {
        self.debit - self.credit
    }

    pub fn side(&self) -> Side {
        if self.debit.is_zero() {
            Side::Credit
        } else {
            Side::Debit
        }
    }

    /// The same line with debit and credit swapped
    pub fn reversed(&self) -> Self {
        Self {
            subject_id: self.subject_id.clone(),
            debit: self.credit,
            credit: self.debit,
            counterparty: self.counterparty.clone(),
        }
    }
}

/// Stable reference to one line of one journal entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JournalLineRef {
    pub entry_id: String,
    /// Zero-based position of the line inside its entry
    pub line_no: usize,
}

impl JournalLineRef {
    pub fn new(entry_id: impl Into<String>, line_no: usize) -> Self {
        Self {
            entry_id: entry_id.into(),
            line_no,
        }
    }
}

impl fmt::Display for JournalLineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entry_id, self.line_no)
    }
}

/// A journal entry made of balanced debit and credit lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique identifier for the entry
    pub id: String,
    /// Voucher number, assigned on first save when absent
    pub voucher_no: Option<String>,
    /// Accounting date of the entry
    pub date: NaiveDate,
    pub memo: String,
    pub created_by: String,
    pub status: EntryStatus,
    pub lines: Vec<JournalLine>,
    /// Entry id this entry reverses, for correction entries
    pub reverses: Option<String>,
    pub posted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl JournalEntry {
    /// Create a new, empty draft entry
    pub fn new(id: String, date: NaiveDate, memo: String, created_by: String) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            voucher_no: None,
            date,
            memo,
            created_by,
            status: EntryStatus::Draft,
            lines: Vec::new(),
            reverses: None,
            posted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a line to the entry
    pub fn add_line(&mut self, line: JournalLine) {
        self.lines.push(line);
        self.updated_at = chrono::Utc::now().naive_utc();
    }

    pub fn total_debits(&self) -> Money {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credits(&self) -> Money {
        self.lines.iter().map(|l| l.credit).sum()
    }

    /// Debits equal credits, to the minor unit
    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }

    pub fn is_posted(&self) -> bool {
        self.status == EntryStatus::Posted
    }

    /// Reference to the line at `line_no`
    pub fn line_ref(&self, line_no: usize) -> JournalLineRef {
        JournalLineRef::new(self.id.clone(), line_no)
    }

    /// Whether any line of the entry books against `subject_id`
    pub fn touches(&self, subject_id: &str) -> bool {
        self.lines.iter().any(|l| l.subject_id == subject_id)
    }

    /// Structural double-entry validation, independent of the chart of accounts
    pub fn validate(&self) -> LedgerResult<()> {
        if self.lines.len() < 2 {
            return Err(LedgerError::Validation(
                "Entry must have at least two lines for double-entry bookkeeping".to_string(),
            ));
        }

        for (index, line) in self.lines.iter().enumerate() {
            if line.debit.is_negative() || line.credit.is_negative() {
                return Err(LedgerError::Validation(format!(
                    "Line {}: amounts cannot be negative",
                    index + 1
                )));
            }
            if line.debit.is_zero() == line.credit.is_zero() {
                return Err(LedgerError::Validation(format!(
                    "Line {}: exactly one of debit or credit must be non-zero",
                    index + 1
                )));
            }
        }

        let debits = self
            .lines
            .iter()
            .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.debit));
        let credits = self
            .lines
            .iter()
            .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.credit));
        match (debits, credits) {
            (Some(debits), Some(credits)) if debits == credits => Ok(()),
            (Some(debits), Some(credits)) => Err(LedgerError::Validation(format!(
                "Entry is not balanced: debits = {}, credits = {}",
                debits, credits
            ))),
            _ => Err(LedgerError::Validation(
                "Entry totals overflow".to_string(),
            )),
        }
    }
}

/// A bank account and the cash-equivalent subject its movements are booked against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    /// Account number as printed on statements
    pub number: String,
    pub bank_name: String,
    pub subject_id: String,
}

/// Input for importing a bank statement line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStatementLine {
    pub bank_account: String,
    pub transaction_date: NaiveDate,
    /// Positive for money received, negative for money paid out
    pub amount: Money,
    pub description: String,
    pub transaction_no: Option<String>,
    pub counterparty: Option<String>,
    /// Running balance reported by the bank, if any
    pub balance: Option<Money>,
}

impl NewStatementLine {
    pub fn new(
        bank_account: impl Into<String>,
        transaction_date: NaiveDate,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        Self {
            bank_account: bank_account.into(),
            transaction_date,
            amount,
            description: description.into(),
            transaction_no: None,
            counterparty: None,
            balance: None,
        }
    }
}

/// An imported bank statement line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankStatementLine {
    pub id: String,
    pub bank_account: String,
    pub transaction_date: NaiveDate,
    pub amount: Money,
    pub description: String,
    pub transaction_no: Option<String>,
    pub counterparty: Option<String>,
    pub balance: Option<Money>,
    /// Journal lines this statement line is currently matched to; empty when unmatched
    pub matched_lines: Vec<JournalLineRef>,
    pub matched_on: Option<NaiveDate>,
    /// Id of the claim currently holding this line
    pub match_id: Option<String>,
    pub created_at: NaiveDateTime,
}

impl BankStatementLine {
    pub fn from_import(id: String, line: NewStatementLine) -> Self {
        Self {
            id,
            bank_account: line.bank_account,
            transaction_date: line.transaction_date,
            amount: line.amount,
            description: line.description,
            transaction_no: line.transaction_no,
            counterparty: line.counterparty,
            balance: line.balance,
            matched_lines: Vec::new(),
            matched_on: None,
            match_id: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn is_matched(&self) -> bool {
        !self.matched_lines.is_empty()
    }
}

/// How a match was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchKind {
    /// One statement line against one journal line of equal amount
    Exact,
    /// One statement line against several journal lines summing to its amount
    Aggregate,
    /// Linked explicitly by a user
    Manual,
}

/// A statement line linked to the journal line(s) it reconciles with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub statement_line_id: String,
    pub journal_lines: Vec<JournalLineRef>,
    pub amount: Money,
    pub kind: MatchKind,
    pub matched_on: NaiveDate,
}

/// Which side of the reconciliation an outstanding item was recorded on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemSide {
    /// Recorded by the bank, not yet in the books
    BankOnly,
    /// Recorded in the books, not yet cleared by the bank
    BookOnly,
}

/// A timing difference between book and bank records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilingItem {
    pub side: ItemSide,
    /// Statement line id for bank-only items, `entry#line` for book-only items
    pub reference: String,
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationStatus {
    Balanced,
    Unbalanced,
}

/// A persisted bank reconciliation. Never mutated after generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub id: String,
    pub bank_account: String,
    pub reconciliation_date: NaiveDate,
    /// Balance reported by the bank, supplied by the caller
    pub bank_balance: Money,
    /// Balance of the bank subject in the books
    pub book_balance: Money,
    pub bank_only_items: Vec<ReconcilingItem>,
    pub book_only_items: Vec<ReconcilingItem>,
    pub bank_only_receipts: Money,
    pub bank_only_payments: Money,
    pub book_only_receipts: Money,
    pub book_only_payments: Money,
    pub adjusted_bank_balance: Money,
    pub adjusted_book_balance: Money,
    pub matched_count: usize,
    pub status: ReconciliationStatus,
    pub warnings: Vec<ConsistencyWarning>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

impl ReconciliationReport {
    pub fn is_balanced(&self) -> bool {
        self.status == ReconciliationStatus::Balanced
    }

    /// Adjusted bank balance minus adjusted book balance
    pub fn difference(&self) -> Money {
        self.adjusted_bank_balance - self.adjusted_book_balance
    }
}

/// Category of a non-fatal consistency finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    /// Assets differ from liabilities plus equity
    BalanceSheetIdentity,
    /// Adjusted bank and book balances disagree
    UnbalancedReconciliation,
    /// Trial balance debits differ from credits
    TrialBalanceImbalance,
}

/// A data anomaly surfaced alongside a result instead of failing the operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl ConsistencyWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Balance of one subject, in the subject's normal orientation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectBalance {
    pub subject: AccountSubject,
    pub balance: Money,
}

impl SubjectBalance {
    /// Balance presented in the debit column of a trial balance
    pub fn debit_balance(&self) -> Option<Money> {
        match (self.subject.subject_type.normal_balance(), self.balance.is_negative()) {
            (Side::Debit, false) => Some(self.balance),
            (Side::Credit, true) => Some(self.balance.abs()),
            _ => None,
        }
    }

    /// Balance presented in the credit column of a trial balance
    pub fn credit_balance(&self) -> Option<Money> {
        match (self.subject.subject_type.normal_balance(), self.balance.is_negative()) {
            (Side::Credit, false) => Some(self.balance),
            (Side::Debit, true) => Some(self.balance.abs()),
            _ => None,
        }
    }
}

/// Snapshot of all subject balances at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub as_of_date: NaiveDate,
    /// Rows ordered by subject code
    pub balances: Vec<SubjectBalance>,
    pub total_debits: Money,
    pub total_credits: Money,
    pub is_balanced: bool,
}

/// Coarse classification of [`LedgerError`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or imbalanced input, unknown or disabled subject
    Validation,
    /// Illegal state transition
    State,
    /// Unknown id, or no active match where one was required
    NotFound,
    Storage,
    Config,
}

/// Errors that can occur in the ledger system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Subject not found: {0}")]
    SubjectNotFound(String),
    #[error("Journal entry not found: {0}")]
    EntryNotFound(String),
    #[error("Bank account not found: {0}")]
    BankAccountNotFound(String),
    #[error("Statement line not found: {0}")]
    StatementLineNotFound(String),
    #[error("Statement line is not matched: {0}")]
    LineNotMatched(String),
    #[error("Reconciliation report not found: {0}")]
    ReportNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Storage(_) => ErrorKind::Storage,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::InvalidState(_) => ErrorKind::State,
            LedgerError::SubjectNotFound(_)
            | LedgerError::EntryNotFound(_)
            | LedgerError::BankAccountNotFound(_)
            | LedgerError::StatementLineNotFound(_)
            | LedgerError::LineNotMatched(_)
            | LedgerError::ReportNotFound(_) => ErrorKind::NotFound,
            LedgerError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_money_parse_and_format() {
        assert_eq!(Money::parse("100.00", 2).unwrap(), Money::from_minor(10000));
        assert_eq!(Money::parse("-12.5", 2).unwrap(), Money::from_minor(-1250));
        assert_eq!(Money::parse(" 7 ", 2).unwrap(), Money::from_minor(700));
        assert_eq!(Money::from_minor(-1205).to_string(), "-12.05");
        assert_eq!(Money::from_minor(5).format(3), "0.005");
        assert_eq!(Money::from_minor(42).format(0), "42");
    }

    #[test]
    fn test_money_totals_do_not_wrap() {
        let near_max = Money::from_minor(i64::MAX - 10);
        assert_eq!(near_max + Money::from_minor(100), Money::from_minor(i64::MAX));
        assert_eq!(-near_max - Money::from_minor(100), Money::from_minor(i64::MIN));

        let err = Money::try_sum([near_max, Money::from_minor(11)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            Money::try_sum([near_max, Money::from_minor(10)]).unwrap(),
            Money::from_minor(i64::MAX)
        );
    }

    #[test]
    fn test_money_rejects_sub_minor_precision() {
        let err = Money::parse("1.005", 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(Money::parse("abc", 2).is_err());
    }

    #[test]
    fn test_money_decimal_conversion() {
        let decimal = Money::from_minor(123456).to_decimal(2);
        assert_eq!(decimal, BigDecimal::from_str("1234.56").unwrap());
        assert_eq!(Money::from_decimal(&decimal, 2).unwrap(), Money::from_minor(123456));
    }

    #[test]
    fn test_entry_validation() {
        let mut entry = JournalEntry::new(
            "je1".to_string(),
            date(2024, 1, 5),
            "Sale".to_string(),
            "alice".to_string(),
        );
        entry.add_line(JournalLine::debit("cash".to_string(), Money::from_minor(10000), None));
        assert!(entry.validate().is_err());

        entry.add_line(JournalLine::credit("revenue".to_string(), Money::from_minor(9999), None));
        let err = entry.validate().unwrap_err();
        assert!(err.to_string().contains("not balanced"));

        entry.lines[1].credit = Money::from_minor(10000);
        assert!(entry.validate().is_ok());
        assert!(entry.is_balanced());
    }

    #[test]
    fn test_entry_rejects_two_sided_lines() {
        let mut entry = JournalEntry::new(
            "je2".to_string(),
            date(2024, 1, 5),
            "Odd".to_string(),
            "alice".to_string(),
        );
        entry.add_line(JournalLine {
            subject_id: "cash".to_string(),
            debit: Money::from_minor(100),
            credit: Money::from_minor(100),
            counterparty: None,
        });
        entry.add_line(JournalLine::credit("revenue".to_string(), Money::ZERO, None));
        assert_eq!(entry.validate().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_subject_balance_columns() {
        let cash = AccountSubject::new(
            "1001".to_string(),
            "1001".to_string(),
            "Cash".to_string(),
            SubjectType::Asset,
            None,
        );
        let overdrawn = SubjectBalance {
            subject: cash,
            balance: Money::from_minor(-500),
        };
        assert_eq!(overdrawn.debit_balance(), None);
        assert_eq!(overdrawn.credit_balance(), Some(Money::from_minor(500)));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            LedgerError::LineNotMatched("s1".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LedgerError::InvalidState("posted".to_string()).kind(),
            ErrorKind::State
        );
    }
}
