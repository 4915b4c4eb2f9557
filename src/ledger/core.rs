//! Main ledger orchestrator that coordinates subjects, entries, statements and reports

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::bank::{StatementBook, StatementStatistics};
use crate::config::EngineConfig;
use crate::ledger::{JournalEngine, SubjectRegistry};
use crate::reconciliation::{
    AutoMatchResult, ReconciliationDetail, ReconciliationMatcher, ReconciliationReportBuilder,
};
use crate::reporting::FinancialStatementBuilder;
use crate::traits::*;
use crate::types::*;

/// Main ledger system that orchestrates all accounting and reconciliation operations.
///
/// Every operation takes `&self`; share one ledger between tasks with `Arc`.
pub struct Ledger<S: LedgerStorage> {
    config: EngineConfig,
    subjects: SubjectRegistry<S>,
    journal: JournalEngine<S>,
    statements: StatementBook<S>,
    matcher: ReconciliationMatcher<S>,
    reconciliation: ReconciliationReportBuilder<S>,
    financial: FinancialStatementBuilder<S>,
}

impl<S: LedgerStorage + Clone> Ledger<S> {
    /// Create a new ledger with the given storage backend and default configuration
    pub fn new(storage: S) -> Self {
        let config = EngineConfig::default();
        Self {
            subjects: SubjectRegistry::new(storage.clone()),
            journal: JournalEngine::new(storage.clone()),
            statements: StatementBook::with_scale(
                storage.clone(),
                config.currency.minor_unit_scale,
            ),
            matcher: ReconciliationMatcher::new(storage.clone()),
            reconciliation: ReconciliationReportBuilder::new(storage.clone()),
            financial: FinancialStatementBuilder::new(storage),
            config,
        }
    }

    /// Create a ledger with an explicit configuration
    pub fn with_config(storage: S, config: EngineConfig) -> LedgerResult<Self> {
        config.validate()?;
        Ok(Self {
            subjects: SubjectRegistry::new(storage.clone()),
            journal: JournalEngine::new(storage.clone()),
            statements: StatementBook::with_scale(
                storage.clone(),
                config.currency.minor_unit_scale,
            ),
            matcher: ReconciliationMatcher::with_config(storage.clone(), config.matching.clone())?,
            reconciliation: ReconciliationReportBuilder::new(storage.clone()),
            financial: FinancialStatementBuilder::new(storage),
            config,
        })
    }

    /// Create a new ledger with custom validators
    pub fn with_validators(
        storage: S,
        config: EngineConfig,
        subject_validator: Box<dyn SubjectValidator>,
        entry_validator: Box<dyn EntryValidator>,
    ) -> LedgerResult<Self> {
        let mut ledger = Self::with_config(storage.clone(), config)?;
        ledger.subjects = SubjectRegistry::with_validator(storage.clone(), subject_validator);
        ledger.journal = JournalEngine::with_validator(storage, entry_validator);
        Ok(ledger)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subjects(&self) -> &SubjectRegistry<S> {
        &self.subjects
    }

    pub fn journal(&self) -> &JournalEngine<S> {
        &self.journal
    }

    pub fn statements(&self) -> &StatementBook<S> {
        &self.statements
    }

    pub fn matcher(&self) -> &ReconciliationMatcher<S> {
        &self.matcher
    }

    pub fn reconciliation(&self) -> &ReconciliationReportBuilder<S> {
        &self.reconciliation
    }

    pub fn financial(&self) -> &FinancialStatementBuilder<S> {
        &self.financial
    }

    // Subject operations
    /// Create a new subject
    pub async fn create_subject(&self, subject: AccountSubject) -> LedgerResult<AccountSubject> {
        self.subjects.create_subject(subject).await
    }

    /// Get a subject by ID
    pub async fn get_subject(&self, subject_id: &str) -> LedgerResult<Option<AccountSubject>> {
        self.subjects.get_subject(subject_id).await
    }

    /// List all subjects
    pub async fn list_subjects(&self) -> LedgerResult<Vec<AccountSubject>> {
        self.subjects.list_subjects().await
    }

    /// List subjects by type
    pub async fn list_subjects_by_type(
        &self,
        subject_type: SubjectType,
    ) -> LedgerResult<Vec<AccountSubject>> {
        self.subjects.list_subjects_by_type(subject_type).await
    }

    /// Update a subject
    pub async fn update_subject(&self, subject: &AccountSubject) -> LedgerResult<AccountSubject> {
        self.subjects.update_subject(subject).await
    }

    /// Enable or disable a subject
    pub async fn set_subject_enabled(
        &self,
        subject_id: &str,
        enabled: bool,
    ) -> LedgerResult<AccountSubject> {
        self.subjects.set_enabled(subject_id, enabled).await
    }

    /// Delete a subject
    pub async fn delete_subject(&self, subject_id: &str) -> LedgerResult<()> {
        self.subjects.delete_subject(subject_id).await
    }

    /// Map a bank account number onto a cash-equivalent subject
    pub async fn register_bank_account(
        &self,
        number: &str,
        bank_name: &str,
        subject_id: &str,
    ) -> LedgerResult<BankAccount> {
        self.subjects
            .register_bank_account(
                number.to_string(),
                bank_name.to_string(),
                subject_id.to_string(),
            )
            .await
    }

    // Journal operations
    /// Save a journal entry as a draft
    pub async fn save_entry(&self, entry: JournalEntry) -> LedgerResult<JournalEntry> {
        self.journal.save_entry(entry).await
    }

    /// Post a draft journal entry
    pub async fn post_entry(&self, entry_id: &str) -> LedgerResult<JournalEntry> {
        self.journal.post_entry(entry_id).await
    }

    /// Delete a draft journal entry
    pub async fn delete_entry(&self, entry_id: &str) -> LedgerResult<()> {
        self.journal.delete_entry(entry_id).await
    }

    /// Get a journal entry by ID
    pub async fn get_entry(&self, entry_id: &str) -> LedgerResult<Option<JournalEntry>> {
        self.journal.get_entry(entry_id).await
    }

    /// List journal entries by status and date range
    pub async fn list_entries(
        &self,
        status: Option<EntryStatus>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>> {
        self.journal.list_entries(status, start_date, end_date).await
    }

    /// Save a draft reversing a posted entry
    pub async fn reverse_entry(
        &self,
        entry_id: &str,
        reversal_id: &str,
        date: NaiveDate,
        created_by: &str,
    ) -> LedgerResult<JournalEntry> {
        self.journal
            .reverse_entry(entry_id, reversal_id.to_string(), date, created_by.to_string())
            .await
    }

    // Statement operations
    /// Import bank statement lines
    pub async fn import_statement_lines(
        &self,
        lines: Vec<NewStatementLine>,
    ) -> LedgerResult<Vec<BankStatementLine>> {
        self.statements.import_lines(lines).await
    }

    /// List bank statement lines
    pub async fn list_statement_lines(
        &self,
        filter: &StatementFilter,
    ) -> LedgerResult<Vec<BankStatementLine>> {
        self.statements.list_lines(filter).await
    }

    /// Get a bank statement line by ID
    pub async fn get_statement_line(
        &self,
        line_id: &str,
    ) -> LedgerResult<Option<BankStatementLine>> {
        self.statements.get_line(line_id).await
    }

    /// Delete an unmatched bank statement line
    pub async fn delete_statement_line(&self, line_id: &str) -> LedgerResult<()> {
        self.statements.delete_line(line_id).await
    }

    /// Statement line counts for a bank account
    pub async fn statement_statistics(
        &self,
        bank_account: &str,
    ) -> LedgerResult<StatementStatistics> {
        self.statements.statistics(bank_account).await
    }

    // Matching operations
    /// Auto-match statement lines of a bank account within a date range
    pub async fn auto_match(
        &self,
        bank_account: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<AutoMatchResult> {
        self.matcher
            .auto_match(bank_account, start_date, end_date)
            .await
    }

    /// Clear the match of a statement line
    pub async fn unmatch(&self, statement_line_id: &str) -> LedgerResult<Vec<JournalLineRef>> {
        self.matcher.unmatch(statement_line_id).await
    }

    /// Match a statement line to specific journal lines
    pub async fn manual_match(
        &self,
        statement_line_id: &str,
        journal_lines: &[JournalLineRef],
    ) -> LedgerResult<MatchRecord> {
        self.matcher
            .manual_match(statement_line_id, journal_lines)
            .await
    }

    // Reconciliation report operations
    /// Generate and store a reconciliation report
    pub async fn generate_reconciliation_report(
        &self,
        bank_account: &str,
        as_of: NaiveDate,
        bank_balance: Money,
        created_by: &str,
    ) -> LedgerResult<ReconciliationReport> {
        self.reconciliation
            .generate_report(bank_account, as_of, bank_balance, created_by)
            .await
    }

    /// Get a reconciliation report by ID
    pub async fn get_reconciliation_report(
        &self,
        report_id: &str,
    ) -> LedgerResult<Option<ReconciliationReport>> {
        self.reconciliation.get_report(report_id).await
    }

    /// List reconciliation reports, newest first
    pub async fn list_reconciliation_reports(
        &self,
        bank_account: Option<&str>,
    ) -> LedgerResult<Vec<ReconciliationReport>> {
        self.reconciliation.list_reports(bank_account).await
    }

    /// Reconciliation report with current outstanding items
    pub async fn reconciliation_detail(&self, report_id: &str) -> LedgerResult<ReconciliationDetail> {
        self.reconciliation.report_detail(report_id).await
    }

    /// Delete a reconciliation report
    pub async fn delete_reconciliation_report(&self, report_id: &str) -> LedgerResult<()> {
        self.reconciliation.delete_report(report_id).await
    }

    // Balance and reporting operations
    /// Get subject balance as of a specific date
    pub async fn get_subject_balance(
        &self,
        subject_id: &str,
        as_of_date: NaiveDate,
    ) -> LedgerResult<Money> {
        self.financial.subject_balance(subject_id, as_of_date).await
    }

    /// Get trial balance as of a specific date
    pub async fn get_trial_balance(&self, as_of_date: NaiveDate) -> LedgerResult<TrialBalance> {
        self.financial.trial_balance(as_of_date).await
    }

    /// Generate a balance sheet as of a specific date
    pub async fn generate_balance_sheet(&self, end_date: NaiveDate) -> LedgerResult<BalanceSheet> {
        self.financial.generate_balance_sheet(end_date).await
    }

    /// Generate an income statement for a date range
    pub async fn generate_income_statement(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<IncomeStatement> {
        self.financial
            .generate_income_statement(start_date, end_date)
            .await
    }

    /// Generate a cash flow statement for a date range
    pub async fn generate_cash_flow(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<CashFlowStatement> {
        self.financial.generate_cash_flow(start_date, end_date).await
    }

    /// Setup a standard chart of accounts for small business
    pub async fn setup_standard_chart_of_accounts(
        &self,
    ) -> LedgerResult<HashMap<String, AccountSubject>> {
        crate::ledger::subject::utils::create_standard_chart(&self.subjects).await
    }

    /// Validate the integrity of the ledger
    pub async fn validate_integrity(
        &self,
        as_of_date: NaiveDate,
    ) -> LedgerResult<LedgerIntegrityReport> {
        let (trial_balance, balance_sheet) = self
            .financial
            .trial_balance_and_balance_sheet(as_of_date)
            .await?;

        let mut warnings = balance_sheet.warnings.clone();

        if !trial_balance.is_balanced {
            warnings.push(ConsistencyWarning::new(
                WarningKind::TrialBalanceImbalance,
                format!(
                    "Trial balance is not balanced: debits = {}, credits = {}",
                    trial_balance.total_debits, trial_balance.total_credits
                ),
            ));
        }

        let total_liabilities_equity =
            Money::try_sum([balance_sheet.total_liabilities, balance_sheet.total_equity])?;

        Ok(LedgerIntegrityReport {
            as_of_date,
            is_valid: warnings.is_empty(),
            warnings,
            trial_balance_total_debits: trial_balance.total_debits,
            trial_balance_total_credits: trial_balance.total_credits,
            balance_sheet_total_assets: balance_sheet.total_assets,
            balance_sheet_total_liabilities_equity: total_liabilities_equity,
        })
    }
}

/// Report on ledger integrity and validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerIntegrityReport {
    pub as_of_date: NaiveDate,
    pub is_valid: bool,
    pub warnings: Vec<ConsistencyWarning>,
    pub trial_balance_total_debits: Money,
    pub trial_balance_total_credits: Money,
    pub balance_sheet_total_assets: Money,
    pub balance_sheet_total_liabilities_equity: Money,
}
