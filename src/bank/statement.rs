//! Statement store: imported bank statement lines per bank account

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_statement_line;

/// Match counts and totals for one bank account's statement lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementStatistics {
    pub bank_account: String,
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub total_receipts: Money,
    pub total_payments: Money,
}

/// Statement store for importing, listing and deleting bank statement lines
pub struct StatementBook<S: LedgerStorage> {
    storage: S,
    minor_unit_scale: u32,
}

impl<S: LedgerStorage> StatementBook<S> {
    /// Create a new statement store
    pub fn new(storage: S) -> Self {
        Self::with_scale(storage, DEFAULT_MINOR_UNIT_SCALE)
    }

    /// Create a statement store that parses decimal amounts with `minor_unit_scale` digits
    pub fn with_scale(storage: S, minor_unit_scale: u32) -> Self {
        Self {
            storage,
            minor_unit_scale,
        }
    }

    /// Import a batch of statement lines. Either every line is stored or none is.
    pub async fn import_lines(
        &self,
        lines: Vec<NewStatementLine>,
    ) -> LedgerResult<Vec<BankStatementLine>> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let mut known_accounts: Vec<String> = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            validate_statement_line(line).map_err(|e| match e {
                LedgerError::Validation(msg) => {
                    LedgerError::Validation(format!("Row {}: {}", index + 1, msg))
                }
                other => other,
            })?;
            if !known_accounts.contains(&line.bank_account) {
                if self.storage.get_bank_account(&line.bank_account).await?.is_none() {
                    return Err(LedgerError::BankAccountNotFound(line.bank_account.clone()));
                }
                known_accounts.push(line.bank_account.clone());
            }
        }

        let imported: Vec<BankStatementLine> = lines
            .into_iter()
            .map(|line| BankStatementLine::from_import(uuid::Uuid::new_v4().to_string(), line))
            .collect();
        self.storage.insert_statement_lines(&imported).await?;
        info!(
            lines = imported.len(),
            accounts = known_accounts.len(),
            "bank statement lines imported"
        );

        Ok(imported)
    }

    /// Import a single line whose amount is given as decimal text, e.g. `"-120.50"`
    pub async fn import_decimal_line(
        &self,
        bank_account: &str,
        transaction_date: NaiveDate,
        amount: &str,
        description: &str,
    ) -> LedgerResult<BankStatementLine> {
        let amount = self.parse_amount(amount)?;
        let line = NewStatementLine::new(bank_account, transaction_date, amount, description);
        let mut imported = self.import_lines(vec![line]).await?;
        imported
            .pop()
            .ok_or_else(|| LedgerError::Storage("Import returned no line".to_string()))
    }

    /// Convert decimal text into minor units with the configured scale
    pub fn parse_amount(&self, amount: &str) -> LedgerResult<Money> {
        Money::parse(amount, self.minor_unit_scale)
    }

    pub async fn get_line(&self, line_id: &str) -> LedgerResult<Option<BankStatementLine>> {
        self.storage.get_statement_line(line_id).await
    }

    /// Get a statement line by ID, returning an error if not found
    pub async fn get_line_required(&self, line_id: &str) -> LedgerResult<BankStatementLine> {
        self.storage
            .get_statement_line(line_id)
            .await?
            .ok_or_else(|| LedgerError::StatementLineNotFound(line_id.to_string()))
    }

    /// List statement lines ordered by transaction date
    pub async fn list_lines(&self, filter: &StatementFilter) -> LedgerResult<Vec<BankStatementLine>> {
        self.storage.list_statement_lines(filter).await
    }

    /// Unmatched lines of one account within an optional date range
    pub async fn list_unmatched(
        &self,
        bank_account: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<BankStatementLine>> {
        let filter = StatementFilter {
            bank_account: Some(bank_account.to_string()),
            start_date,
            end_date,
            unmatched_only: true,
        };
        self.storage.list_statement_lines(&filter).await
    }

    /// Delete an unmatched statement line
    pub async fn delete_line(&self, line_id: &str) -> LedgerResult<()> {
        self.storage.delete_statement_line(line_id).await?;
        info!(statement_line = %line_id, "statement line deleted");
        Ok(())
    }

    pub async fn statistics(&self, bank_account: &str) -> LedgerResult<StatementStatistics> {
        let lines = self
            .storage
            .list_statement_lines(&StatementFilter::for_account(bank_account))
            .await?;

        let matched = lines.iter().filter(|l| l.is_matched()).count();
        let total_receipts = lines
            .iter()
            .filter(|l| l.amount.is_positive())
            .map(|l| l.amount)
            .sum();
        let total_payments = lines
            .iter()
            .filter(|l| l.amount.is_negative())
            .map(|l| l.amount.abs())
            .sum();
        debug!(bank_account, total = lines.len(), matched, "statement statistics");

        Ok(StatementStatistics {
            bank_account: bank_account.to_string(),
            total: lines.len(),
            matched,
            unmatched: lines.len() - matched,
            total_receipts,
            total_payments,
        })
    }
}
