//! Chart of accounts management

use std::collections::HashMap;
use tracing::info;

use crate::traits::*;
use crate::types::*;

/// Registry of account subjects and the bank accounts mapped onto them
pub struct SubjectRegistry<S: LedgerStorage> {
    storage: S,
    validator: Box<dyn SubjectValidator>,
}

impl<S: LedgerStorage> SubjectRegistry<S> {
    /// Create a new subject registry
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultSubjectValidator),
        }
    }

    /// Create a new subject registry with custom validator
    pub fn with_validator(storage: S, validator: Box<dyn SubjectValidator>) -> Self {
        Self { storage, validator }
    }

    /// Add a subject to the chart
    pub async fn create_subject(&self, subject: AccountSubject) -> LedgerResult<AccountSubject> {
        self.validator.validate_subject(&subject)?;

        // Children share their parent's type
        if let Some(ref parent_id) = subject.parent_id {
            let parent = self.storage.get_subject(parent_id).await?.ok_or_else(|| {
                LedgerError::Validation(format!("Parent subject '{}' does not exist", parent_id))
            })?;
            if parent.subject_type != subject.subject_type {
                return Err(LedgerError::Validation(format!(
                    "Subject '{}' must have the same type as its parent '{}'",
                    subject.code, parent.code
                )));
            }
        }

        // Uniqueness of id and code is enforced atomically by storage
        self.storage.save_subject(&subject).await?;
        info!(subject = %subject.id, code = %subject.code, "subject created");

        Ok(subject)
    }

    /// Get a subject by ID
    pub async fn get_subject(&self, subject_id: &str) -> LedgerResult<Option<AccountSubject>> {
        self.storage.get_subject(subject_id).await
    }

    /// Get a subject by ID, returning an error if not found
    pub async fn get_subject_required(&self, subject_id: &str) -> LedgerResult<AccountSubject> {
        self.storage
            .get_subject(subject_id)
            .await?
            .ok_or_else(|| LedgerError::SubjectNotFound(subject_id.to_string()))
    }

    pub async fn find_by_code(&self, code: &str) -> LedgerResult<Option<AccountSubject>> {
        self.storage.find_subject_by_code(code).await
    }

    /// List all subjects
    pub async fn list_subjects(&self) -> LedgerResult<Vec<AccountSubject>> {
        self.storage.list_subjects(None).await
    }

    /// List subjects by type
    pub async fn list_subjects_by_type(
        &self,
        subject_type: SubjectType,
    ) -> LedgerResult<Vec<AccountSubject>> {
        self.storage.list_subjects(Some(subject_type)).await
    }

    /// List enabled subjects only
    pub async fn list_enabled(&self) -> LedgerResult<Vec<AccountSubject>> {
        Ok(self
            .storage
            .list_subjects(None)
            .await?
            .into_iter()
            .filter(|s| s.enabled)
            .collect())
    }

    /// Get all direct children of a subject
    pub async fn child_subjects(&self, parent_id: &str) -> LedgerResult<Vec<AccountSubject>> {
        Ok(self
            .storage
            .list_subjects(None)
            .await?
            .into_iter()
            .filter(|s| s.parent_id.as_deref() == Some(parent_id))
            .collect())
    }

    /// Path from the root of the hierarchy down to the subject
    pub async fn subject_path(&self, subject_id: &str) -> LedgerResult<Vec<AccountSubject>> {
        let mut path: Vec<AccountSubject> = Vec::new();
        let mut current = Some(subject_id.to_string());

        while let Some(id) = current {
            if path.iter().any(|s| s.id == id) {
                return Err(LedgerError::Validation(format!(
                    "Subject hierarchy contains a cycle at '{}'",
                    id
                )));
            }
            let subject = self.get_subject_required(&id).await?;
            current = subject.parent_id.clone();
            path.insert(0, subject);
        }

        Ok(path)
    }

    /// Update a subject's descriptive attributes.
    ///
    /// The subject type cannot change once a posted entry references the subject.
    pub async fn update_subject(&self, subject: &AccountSubject) -> LedgerResult<AccountSubject> {
        self.validator.validate_subject(subject)?;

        let existing = self.get_subject_required(&subject.id).await?;
        if existing.subject_type != subject.subject_type
            && self.storage.subject_has_postings(&subject.id).await?
        {
            return Err(LedgerError::InvalidState(format!(
                "Subject '{}' has posted entries; its type cannot change",
                subject.id
            )));
        }

        let mut updated = subject.clone();
        updated.created_at = existing.created_at;
        updated.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_subject(&updated).await?;

        Ok(updated)
    }

    /// Enable or disable a subject. Disabled subjects stay in history but reject new entries.
    pub async fn set_enabled(&self, subject_id: &str, enabled: bool) -> LedgerResult<AccountSubject> {
        let mut subject = self.get_subject_required(subject_id).await?;
        if subject.enabled == enabled {
            return Ok(subject);
        }
        subject.enabled = enabled;
        subject.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_subject(&subject).await?;
        info!(subject = %subject_id, enabled, "subject state changed");

        Ok(subject)
    }

    /// Delete a subject that nothing references
    pub async fn delete_subject(&self, subject_id: &str) -> LedgerResult<()> {
        self.storage.delete_subject(subject_id).await?;
        info!(subject = %subject_id, "subject deleted");
        Ok(())
    }

    /// Map a bank account number onto a cash-equivalent asset subject
    pub async fn register_bank_account(
        &self,
        number: String,
        bank_name: String,
        subject_id: String,
    ) -> LedgerResult<BankAccount> {
        if number.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Bank account number cannot be empty".to_string(),
            ));
        }

        let subject = self.get_subject_required(&subject_id).await?;
        if subject.subject_type != SubjectType::Asset || !subject.cash_equivalent {
            return Err(LedgerError::Validation(format!(
                "Bank account '{}' must map to a cash-equivalent asset subject, '{}' is not",
                number, subject.code
            )));
        }

        let account = BankAccount {
            number,
            bank_name,
            subject_id,
        };
        self.storage.save_bank_account(&account).await?;
        info!(bank_account = %account.number, subject = %account.subject_id, "bank account registered");

        Ok(account)
    }

    pub async fn get_bank_account_required(&self, number: &str) -> LedgerResult<BankAccount> {
        self.storage
            .get_bank_account(number)
            .await?
            .ok_or_else(|| LedgerError::BankAccountNotFound(number.to_string()))
    }

    pub async fn list_bank_accounts(&self) -> LedgerResult<Vec<BankAccount>> {
        self.storage.list_bank_accounts().await
    }
}

/// Utility functions for working with subjects
pub mod utils {
    use super::*;

    /// Key, code, name, type, cash equivalent, cash-flow section
    type ChartRow = (
        &'static str,
        &'static str,
        &'static str,
        SubjectType,
        bool,
        Option<CashFlowCategory>,
    );

    const STANDARD_CHART: &[ChartRow] = &[
        ("cash", "1001", "Cash on Hand", SubjectType::Asset, true, None),
        ("bank", "1002", "Bank Deposits", SubjectType::Asset, true, None),
        ("accounts_receivable", "1122", "Accounts Receivable", SubjectType::Asset, false, None),
        ("inventory", "1405", "Inventory", SubjectType::Asset, false, None),
        (
            "fixed_assets",
            "1601",
            "Fixed Assets",
            SubjectType::Asset,
            false,
            Some(CashFlowCategory::Investing),
        ),
        (
            "short_term_loans",
            "2001",
            "Short-term Loans",
            SubjectType::Liability,
            false,
            Some(CashFlowCategory::Financing),
        ),
        ("accounts_payable", "2201", "Accounts Payable", SubjectType::Liability, false, None),
        ("payroll_payable", "2211", "Payroll Payable", SubjectType::Liability, false, None),
        (
            "paid_in_capital",
            "4001",
            "Paid-in Capital",
            SubjectType::Equity,
            false,
            Some(CashFlowCategory::Financing),
        ),
        ("retained_earnings", "4104", "Retained Earnings", SubjectType::Equity, false, None),
        ("sales_revenue", "6001", "Main Business Revenue", SubjectType::Revenue, false, None),
        ("other_revenue", "6051", "Other Business Revenue", SubjectType::Revenue, false, None),
        ("cost_of_sales", "6401", "Cost of Sales", SubjectType::Expense, false, None),
        ("selling_expense", "6601", "Selling Expenses", SubjectType::Expense, false, None),
        ("admin_expense", "6602", "Administrative Expenses", SubjectType::Expense, false, None),
        ("finance_expense", "6603", "Finance Expenses", SubjectType::Expense, false, None),
    ];

    /// Create a standard chart of accounts for a small business, keyed by a readable name
    pub async fn create_standard_chart<S: LedgerStorage>(
        registry: &SubjectRegistry<S>,
    ) -> LedgerResult<HashMap<String, AccountSubject>> {
        let mut subjects = HashMap::new();

        for (key, code, name, subject_type, cash_equivalent, category) in STANDARD_CHART {
            let mut subject = AccountSubject::new(
                code.to_string(),
                code.to_string(),
                name.to_string(),
                *subject_type,
                None,
            );
            subject.cash_equivalent = *cash_equivalent;
            subject.cash_flow_category = *category;

            let created = registry.create_subject(subject).await?;
            subjects.insert(key.to_string(), created);
        }

        Ok(subjects)
    }
}
