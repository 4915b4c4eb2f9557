//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::*;

/// Filter for listing bank statement lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementFilter {
    pub bank_account: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub unmatched_only: bool,
}

impl StatementFilter {
    pub fn for_account(bank_account: impl Into<String>) -> Self {
        Self {
            bank_account: Some(bank_account.into()),
            ..Self::default()
        }
    }

    pub fn between(mut self, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        self.start_date = Some(start_date);
        self.end_date = Some(end_date);
        self
    }

    pub fn unmatched(mut self) -> Self {
        self.unmatched_only = true;
        self
    }

    pub fn accepts(&self, line: &BankStatementLine) -> bool {
        if let Some(ref account) = self.bank_account {
            if &line.bank_account != account {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if line.transaction_date < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if line.transaction_date > end {
                return false;
            }
        }
        !(self.unmatched_only && line.is_matched())
    }
}

/// Consistent point-in-time view of everything reports are derived from.
///
/// Only posted entries are included; drafts are invisible to reporting.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub subjects: HashMap<String, AccountSubject>,
    pub bank_accounts: HashMap<String, BankAccount>,
    pub posted_entries: Vec<JournalEntry>,
    pub statement_lines: Vec<BankStatementLine>,
}

/// Match relation of a snapshot resolved against entry and statement dates.
///
/// A match is cleared at a date when its statement line and every journal line it
/// pairs with are dated on or before it. Until then both sides stay outstanding,
/// so a deposit booked at month end and credited by the bank next month shows up
/// as a reconciling item in the earlier period.
pub struct MatchIndex<'a> {
    entry_dates: HashMap<&'a str, NaiveDate>,
    statements: HashMap<&'a str, &'a BankStatementLine>,
    journal_to_statement: HashMap<&'a JournalLineRef, &'a str>,
}

impl<'a> MatchIndex<'a> {
    pub fn new(snapshot: &'a LedgerSnapshot) -> Self {
        let entry_dates = snapshot
            .posted_entries
            .iter()
            .map(|e| (e.id.as_str(), e.date))
            .collect();
        let statements = snapshot
            .statement_lines
            .iter()
            .map(|s| (s.id.as_str(), s))
            .collect();
        let journal_to_statement = snapshot
            .statement_lines
            .iter()
            .flat_map(|s| s.matched_lines.iter().map(move |l| (l, s.id.as_str())))
            .collect();
        Self {
            entry_dates,
            statements,
            journal_to_statement,
        }
    }

    /// Whether the statement line's match is complete on both sides at `as_of`
    pub fn statement_line_cleared(&self, line: &BankStatementLine, as_of: NaiveDate) -> bool {
        line.is_matched()
            && line.transaction_date <= as_of
            && line.matched_lines.iter().all(|l| {
                self.entry_dates
                    .get(l.entry_id.as_str())
                    .is_some_and(|date| *date <= as_of)
            })
    }

    /// Whether the journal line belongs to a match that is cleared at `as_of`
    pub fn journal_line_cleared(&self, line: &JournalLineRef, as_of: NaiveDate) -> bool {
        self.journal_to_statement
            .get(line)
            .and_then(|id| self.statements.get(id))
            .is_some_and(|statement| self.statement_line_cleared(statement, as_of))
    }
}

impl LedgerSnapshot {
    /// Posted lines booked against `subject_id`, with their entry date
    pub fn lines_for_subject<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> impl Iterator<Item = (&'a JournalEntry, usize, &'a JournalLine)> + 'a {
        self.posted_entries.iter().flat_map(move |entry| {
            entry
                .lines
                .iter()
                .enumerate()
                .filter(move |(_, line)| line.subject_id == subject_id)
                .map(move |(line_no, line)| (entry, line_no, line))
        })
    }

    pub fn match_index(&self) -> MatchIndex<'_> {
        MatchIndex::new(self)
    }

    /// Subject mapped to `bank_account`
    pub fn bank_subject(&self, bank_account: &str) -> LedgerResult<&AccountSubject> {
        let account = self
            .bank_accounts
            .get(bank_account)
            .ok_or_else(|| LedgerError::BankAccountNotFound(bank_account.to_string()))?;
        self.subjects
            .get(&account.subject_id)
            .ok_or_else(|| LedgerError::SubjectNotFound(account.subject_id.clone()))
    }
}

/// Storage abstraction for the ledger system
///
/// Implementations must make the conditional operations (`mark_entry_posted`,
/// `delete_draft_entry`, `claim_*`, `release_*`, `delete_subject`,
/// `delete_statement_line`) atomic per entity, and `snapshot` must not observe
/// a half-applied write.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Insert a new subject
    async fn save_subject(&self, subject: &AccountSubject) -> LedgerResult<()>;

    async fn get_subject(&self, subject_id: &str) -> LedgerResult<Option<AccountSubject>>;

    async fn find_subject_by_code(&self, code: &str) -> LedgerResult<Option<AccountSubject>>;

    /// List subjects ordered by code, optionally filtered by type
    async fn list_subjects(
        &self,
        subject_type: Option<SubjectType>,
    ) -> LedgerResult<Vec<AccountSubject>>;

    async fn update_subject(&self, subject: &AccountSubject) -> LedgerResult<()>;

    /// Delete a subject; fails with a state error while any entry references it
    async fn delete_subject(&self, subject_id: &str) -> LedgerResult<()>;

    /// Whether any posted entry books against the subject
    async fn subject_has_postings(&self, subject_id: &str) -> LedgerResult<bool>;

    async fn save_bank_account(&self, account: &BankAccount) -> LedgerResult<()>;

    async fn get_bank_account(&self, number: &str) -> LedgerResult<Option<BankAccount>>;

    async fn list_bank_accounts(&self) -> LedgerResult<Vec<BankAccount>>;

    /// Insert a draft entry or replace an existing draft; never overwrites a posted entry
    async fn save_entry(&self, entry: &JournalEntry) -> LedgerResult<()>;

    async fn get_entry(&self, entry_id: &str) -> LedgerResult<Option<JournalEntry>>;

    /// List entries ordered by date then id
    async fn list_entries(
        &self,
        status: Option<EntryStatus>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>>;

    /// Compare-and-swap the entry from draft to posted and return the posted entry
    async fn mark_entry_posted(
        &self,
        entry_id: &str,
        posted_at: NaiveDateTime,
    ) -> LedgerResult<JournalEntry>;

    /// Delete the entry only if it is still a draft
    async fn delete_draft_entry(&self, entry_id: &str) -> LedgerResult<()>;

    /// Allocate the next voucher sequence number for the given day, starting at 1
    async fn next_voucher_sequence(&self, date: NaiveDate) -> LedgerResult<u32>;

    async fn insert_statement_lines(&self, lines: &[BankStatementLine]) -> LedgerResult<()>;

    async fn get_statement_line(&self, line_id: &str) -> LedgerResult<Option<BankStatementLine>>;

    /// List statement lines ordered by transaction date then id
    async fn list_statement_lines(
        &self,
        filter: &StatementFilter,
    ) -> LedgerResult<Vec<BankStatementLine>>;

    /// Delete a statement line; fails with a state error while it is matched
    async fn delete_statement_line(&self, line_id: &str) -> LedgerResult<()>;

    /// Link the statement line to `journal_lines` under claim `match_id`, only if it is
    /// currently unmatched. Returns `false` when another writer holds the line.
    async fn claim_statement_line(
        &self,
        line_id: &str,
        match_id: &str,
        journal_lines: &[JournalLineRef],
        matched_on: NaiveDate,
    ) -> LedgerResult<bool>;

    /// Clear the statement line's match together with the journal lines it holds,
    /// and return those journal lines
    async fn release_statement_line(&self, line_id: &str) -> LedgerResult<Vec<JournalLineRef>>;

    /// Link a posted journal line to a statement line. Succeeds only while the statement
    /// line is still held by claim `match_id` and lists the journal line, and the journal
    /// line is unmatched.
    async fn claim_journal_line(
        &self,
        line: &JournalLineRef,
        statement_line_id: &str,
        match_id: &str,
    ) -> LedgerResult<bool>;

    /// Undo claim `match_id` on the statement line and its journal lines.
    /// Does nothing when the line is no longer held by that claim.
    async fn release_claim(&self, line_id: &str, match_id: &str) -> LedgerResult<()>;

    /// Statement line the journal line is matched to, if any
    async fn journal_line_match(&self, line: &JournalLineRef) -> LedgerResult<Option<String>>;

    async fn save_report(&self, report: &ReconciliationReport) -> LedgerResult<()>;

    async fn get_report(&self, report_id: &str) -> LedgerResult<Option<ReconciliationReport>>;

    /// List reports, newest reconciliation date first
    async fn list_reports(
        &self,
        bank_account: Option<&str>,
    ) -> LedgerResult<Vec<ReconciliationReport>>;

    async fn delete_report(&self, report_id: &str) -> LedgerResult<()>;

    /// Consistent read of subjects, bank accounts, posted entries, statement lines and matches
    async fn snapshot(&self) -> LedgerResult<LedgerSnapshot>;
}

/// Trait for implementing custom subject validation rules
pub trait SubjectValidator: Send + Sync {
    /// Validate a subject before saving
    fn validate_subject(&self, subject: &AccountSubject) -> LedgerResult<()>;
}

/// Trait for implementing custom journal entry validation rules
pub trait EntryValidator: Send + Sync {
    /// Validate an entry before saving
    fn validate_entry(&self, entry: &JournalEntry) -> LedgerResult<()>;
}

/// Default subject validator with basic rules
pub struct DefaultSubjectValidator;

impl SubjectValidator for DefaultSubjectValidator {
    fn validate_subject(&self, subject: &AccountSubject) -> LedgerResult<()> {
        if subject.id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Subject ID cannot be empty".to_string(),
            ));
        }

        if subject.code.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Subject code cannot be empty".to_string(),
            ));
        }

        if subject.name.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Subject name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Default entry validator with the basic double-entry rules
pub struct DefaultEntryValidator;

impl EntryValidator for DefaultEntryValidator {
    fn validate_entry(&self, entry: &JournalEntry) -> LedgerResult<()> {
        entry.validate()
    }
}

/// Trait for financial statement generation
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Generate a balance sheet as of a specific date
    async fn generate_balance_sheet(&self, end_date: NaiveDate) -> LedgerResult<BalanceSheet>;

    /// Generate an income statement for a date range
    async fn generate_income_statement(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<IncomeStatement>;

    /// Generate a cash flow statement for a date range
    async fn generate_cash_flow(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<CashFlowStatement>;
}

/// Balance Sheet structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub end_date: NaiveDate,
    pub assets: Vec<SubjectBalance>,
    pub liabilities: Vec<SubjectBalance>,
    pub equity: Vec<SubjectBalance>,
    /// Revenue minus expense accumulated up to `end_date`, presented within equity
    pub current_earnings: Money,
    pub total_assets: Money,
    pub total_liabilities: Money,
    /// Includes `current_earnings`
    pub total_equity: Money,
    pub is_balanced: bool,
    pub warnings: Vec<ConsistencyWarning>,
}

/// Income Statement structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub revenue: Vec<SubjectBalance>,
    pub expenses: Vec<SubjectBalance>,
    pub total_revenue: Money,
    pub total_expenses: Money,
    pub net_income: Money,
}

/// Cash Flow Statement structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub operating_activities: Vec<CashFlowItem>,
    pub investing_activities: Vec<CashFlowItem>,
    pub financing_activities: Vec<CashFlowItem>,
    pub net_operating_cash_flow: Money,
    pub net_investing_cash_flow: Money,
    pub net_financing_cash_flow: Money,
    pub net_cash_flow: Money,
    /// Cash-equivalent balance at the close of the day before `start_date`
    pub opening_cash: Money,
    pub closing_cash: Money,
}

/// Net cash movement of one posted entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowItem {
    pub entry_id: String,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
}
