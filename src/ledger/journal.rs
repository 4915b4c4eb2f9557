//! Journal entry processing: validation, draft storage, posting and reversal

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::traits::*;
use crate::types::*;

/// Creator recorded by [`JournalEntryBuilder`] when none is given
pub const SYSTEM_USER: &str = "system";

/// Journal engine for saving, posting and deleting entries
pub struct JournalEngine<S: LedgerStorage> {
    storage: S,
    validator: Box<dyn EntryValidator>,
}

impl<S: LedgerStorage> JournalEngine<S> {
    /// Create a new journal engine
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultEntryValidator),
        }
    }

    /// Create a new journal engine with custom validator
    pub fn with_validator(storage: S, validator: Box<dyn EntryValidator>) -> Self {
        Self { storage, validator }
    }

    /// Validate an entry and store it as a draft.
    ///
    /// Saving an existing draft replaces it. Posted entries are immutable.
    pub async fn save_entry(&self, mut entry: JournalEntry) -> LedgerResult<JournalEntry> {
        if entry.status != EntryStatus::Draft {
            return Err(LedgerError::Validation(format!(
                "Entry '{}' must be saved as a draft and posted separately",
                entry.id
            )));
        }

        let existing = self.storage.get_entry(&entry.id).await?;
        if let Some(ref existing) = existing {
            if existing.is_posted() {
                return Err(LedgerError::InvalidState(format!(
                    "Entry '{}' is posted; record a reversing entry instead",
                    entry.id
                )));
            }
        }

        self.validator.validate_entry(&entry)?;
        self.validate_subject_references(&entry).await?;

        let now = chrono::Utc::now().naive_utc();
        match existing {
            Some(existing) => {
                entry.created_at = existing.created_at;
                if entry.voucher_no.is_none() {
                    entry.voucher_no = existing.voucher_no;
                }
            }
            None => entry.created_at = now,
        }
        if entry.voucher_no.is_none() {
            let sequence = self.storage.next_voucher_sequence(entry.date).await?;
            entry.voucher_no = Some(voucher_number(entry.date, sequence));
        }
        entry.posted_at = None;
        entry.updated_at = now;

        self.storage.save_entry(&entry).await?;
        info!(
            entry = %entry.id,
            voucher = entry.voucher_no.as_deref().unwrap_or_default(),
            amount = %entry.total_debits(),
            "journal entry saved as draft"
        );

        Ok(entry)
    }

    /// Transition a draft to posted. This is the only irreversible transition in the ledger.
    pub async fn post_entry(&self, entry_id: &str) -> LedgerResult<JournalEntry> {
        let entry = self.get_entry_required(entry_id).await?;
        if entry.is_posted() {
            return Err(LedgerError::InvalidState(format!(
                "Entry '{}' is already posted",
                entry_id
            )));
        }

        // Subjects may have been disabled since the draft was saved
        self.validator.validate_entry(&entry)?;
        self.validate_subject_references(&entry).await?;

        let posted = self
            .storage
            .mark_entry_posted(entry_id, chrono::Utc::now().naive_utc())
            .await?;
        info!(entry = %entry_id, amount = %posted.total_debits(), "journal entry posted");

        Ok(posted)
    }

    /// Delete a draft entry
    pub async fn delete_entry(&self, entry_id: &str) -> LedgerResult<()> {
        self.storage.delete_draft_entry(entry_id).await?;
        info!(entry = %entry_id, "draft journal entry deleted");
        Ok(())
    }

    /// Get an entry by ID
    pub async fn get_entry(&self, entry_id: &str) -> LedgerResult<Option<JournalEntry>> {
        self.storage.get_entry(entry_id).await
    }

    /// Get an entry by ID, returning an error if not found
    pub async fn get_entry_required(&self, entry_id: &str) -> LedgerResult<JournalEntry> {
        self.storage
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| LedgerError::EntryNotFound(entry_id.to_string()))
    }

    /// List entries, optionally filtered by status and date range
    pub async fn list_entries(
        &self,
        status: Option<EntryStatus>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>> {
        self.storage.list_entries(status, start_date, end_date).await
    }

    /// Save a draft that undoes a posted entry by swapping every debit and credit
    pub async fn reverse_entry(
        &self,
        entry_id: &str,
        reversal_id: String,
        date: NaiveDate,
        created_by: String,
    ) -> LedgerResult<JournalEntry> {
        let original = self.get_entry_required(entry_id).await?;
        if !original.is_posted() {
            return Err(LedgerError::InvalidState(format!(
                "Entry '{}' is a draft; edit or delete it instead of reversing",
                entry_id
            )));
        }
        if date < original.date {
            return Err(LedgerError::Validation(format!(
                "Reversal of '{}' cannot be dated before {}",
                entry_id, original.date
            )));
        }

        let already_reversed = self
            .storage
            .list_entries(None, Some(original.date), None)
            .await?
            .into_iter()
            .any(|e| e.reverses.as_deref() == Some(entry_id));
        if already_reversed {
            return Err(LedgerError::InvalidState(format!(
                "Entry '{}' already has a reversing entry",
                entry_id
            )));
        }

        let reference = original.voucher_no.as_deref().unwrap_or(&original.id);
        let mut reversal = JournalEntry::new(
            reversal_id,
            date,
            format!("Reversal of {}: {}", reference, original.memo),
            created_by,
        );
        reversal.reverses = Some(original.id.clone());
        for line in &original.lines {
            reversal.add_line(line.reversed());
        }

        debug!(entry = %entry_id, reversal = %reversal.id, "building reversing entry");
        self.save_entry(reversal).await
    }

    async fn validate_subject_references(&self, entry: &JournalEntry) -> LedgerResult<()> {
        for (index, line) in entry.lines.iter().enumerate() {
            let subject = self.storage.get_subject(&line.subject_id).await?.ok_or_else(|| {
                LedgerError::Validation(format!(
                    "Line {}: subject '{}' does not exist",
                    index + 1,
                    line.subject_id
                ))
            })?;
            if !subject.enabled {
                return Err(LedgerError::Validation(format!(
                    "Line {}: subject '{}' is disabled",
                    index + 1,
                    subject.code
                )));
            }
        }
        Ok(())
    }
}

/// Voucher number in the `PZ-YYYYMMDD-NNNN` format
pub fn voucher_number(date: NaiveDate, sequence: u32) -> String {
    format!("PZ-{}-{:04}", date.format("%Y%m%d"), sequence)
}

/// Builder for multi-line journal entries
#[derive(Debug)]
pub struct JournalEntryBuilder {
    entry: JournalEntry,
}

impl JournalEntryBuilder {
    /// Create a new entry builder
    pub fn new(id: String, date: NaiveDate, memo: String) -> Self {
        Self {
            entry: JournalEntry::new(id, date, memo, SYSTEM_USER.to_string()),
        }
    }

    /// Record who prepared the entry
    pub fn created_by(mut self, user: String) -> Self {
        self.entry.created_by = user;
        self
    }

    /// Use a pre-assigned voucher number
    pub fn voucher_no(mut self, voucher_no: String) -> Self {
        self.entry.voucher_no = Some(voucher_no);
        self
    }

    /// Add a debit line
    pub fn debit(mut self, subject_id: String, amount: Money, counterparty: Option<String>) -> Self {
        self.entry
            .add_line(JournalLine::debit(subject_id, amount, counterparty));
        self
    }

    /// Add a credit line
    pub fn credit(
        mut self,
        subject_id: String,
        amount: Money,
        counterparty: Option<String>,
    ) -> Self {
        self.entry
            .add_line(JournalLine::credit(subject_id, amount, counterparty));
        self
    }

    /// Add a custom line
    pub fn line(mut self, line: JournalLine) -> Self {
        self.entry.add_line(line);
        self
    }

    /// Build the entry
    pub fn build(self) -> LedgerResult<JournalEntry> {
        self.entry.validate()?;
        Ok(self.entry)
    }
}

/// Common entry patterns
pub mod patterns {
    use super::*;

    /// Customer payment received into a bank or cash subject (debit bank, credit revenue)
    pub fn create_sales_receipt(
        id: String,
        date: NaiveDate,
        memo: String,
        bank_subject_id: String,
        revenue_subject_id: String,
        amount: Money,
    ) -> LedgerResult<JournalEntry> {
        JournalEntryBuilder::new(id, date, memo)
            .debit(bank_subject_id, amount, None)
            .credit(revenue_subject_id, amount, None)
            .build()
    }

    /// Expense paid from a bank or cash subject (debit expense, credit bank)
    pub fn create_expense_payment(
        id: String,
        date: NaiveDate,
        memo: String,
        expense_subject_id: String,
        bank_subject_id: String,
        amount: Money,
    ) -> LedgerResult<JournalEntry> {
        JournalEntryBuilder::new(id, date, memo)
            .debit(expense_subject_id, amount, None)
            .credit(bank_subject_id, amount, None)
            .build()
    }

    /// Supplier invoice settled from the bank (debit payables, credit bank)
    pub fn create_supplier_payment(
        id: String,
        date: NaiveDate,
        memo: String,
        payable_subject_id: String,
        bank_subject_id: String,
        supplier: String,
        amount: Money,
    ) -> LedgerResult<JournalEntry> {
        JournalEntryBuilder::new(id, date, memo)
            .debit(payable_subject_id, amount, Some(supplier))
            .credit(bank_subject_id, amount, None)
            .build()
    }

    /// Loan proceeds received (debit bank, credit loan payable)
    pub fn create_loan_received(
        id: String,
        date: NaiveDate,
        memo: String,
        bank_subject_id: String,
        loan_subject_id: String,
        amount: Money,
    ) -> LedgerResult<JournalEntry> {
        JournalEntryBuilder::new(id, date, memo)
            .debit(bank_subject_id, amount, None)
            .credit(loan_subject_id, amount, None)
            .build()
    }

    /// Capital contributed by the owner (debit bank, credit equity)
    pub fn create_owner_investment(
        id: String,
        date: NaiveDate,
        memo: String,
        bank_subject_id: String,
        equity_subject_id: String,
        amount: Money,
    ) -> LedgerResult<JournalEntry> {
        JournalEntryBuilder::new(id, date, memo)
            .debit(bank_subject_id, amount, None)
            .credit(equity_subject_id, amount, None)
            .build()
    }
}
