//! Validation utilities

use crate::traits::*;
use crate::types::*;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: Money) -> LedgerResult<()> {
    if !amount.is_positive() {
        Err(LedgerError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that a subject code is valid
pub fn validate_subject_code(code: &str) -> LedgerResult<()> {
    if code.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Subject code cannot be empty".to_string(),
        ));
    }

    if code.len() > 50 {
        return Err(LedgerError::Validation(
            "Subject code cannot exceed 50 characters".to_string(),
        ));
    }

    // Check for valid characters (alphanumeric, dashes, underscores, dots)
    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(LedgerError::Validation(
            "Subject code can only contain alphanumeric characters, dashes, underscores, and dots"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate that a subject name is valid
pub fn validate_subject_name(name: &str) -> LedgerResult<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Subject name cannot be empty".to_string(),
        ));
    }

    if name.chars().count() > 100 {
        return Err(LedgerError::Validation(
            "Subject name cannot exceed 100 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate that an entry memo is valid
pub fn validate_entry_memo(memo: &str) -> LedgerResult<()> {
    if memo.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Entry memo cannot be empty".to_string(),
        ));
    }

    if memo.chars().count() > 500 {
        return Err(LedgerError::Validation(
            "Entry memo cannot exceed 500 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate an imported statement line before it reaches storage
pub fn validate_statement_line(line: &NewStatementLine) -> LedgerResult<()> {
    if line.bank_account.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Statement line must name a bank account".to_string(),
        ));
    }

    if line.amount.is_zero() {
        return Err(LedgerError::Validation(format!(
            "Statement line on {} has a zero amount",
            line.transaction_date
        )));
    }

    if line.description.chars().count() > 500 {
        return Err(LedgerError::Validation(
            "Statement description cannot exceed 500 characters".to_string(),
        ));
    }

    Ok(())
}

/// Enhanced entry validator with detailed checks
pub struct EnhancedEntryValidator;

impl EntryValidator for EnhancedEntryValidator {
    fn validate_entry(&self, entry: &JournalEntry) -> LedgerResult<()> {
        // Basic validation
        entry.validate()?;

        validate_entry_memo(&entry.memo)?;

        if entry.created_by.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Entry must record its creator".to_string(),
            ));
        }

        for line in &entry.lines {
            validate_subject_code(&line.subject_id)?;
        }

        // The same subject cannot appear twice on the same side of one entry
        let mut subject_sides = std::collections::HashSet::new();
        for line in &entry.lines {
            if !subject_sides.insert((&line.subject_id, line.side())) {
                return Err(LedgerError::Validation(format!(
                    "Subject '{}' appears multiple times on the same side of the entry",
                    line.subject_id
                )));
            }
        }

        Ok(())
    }
}

/// Enhanced subject validator with detailed checks
pub struct EnhancedSubjectValidator;

impl SubjectValidator for EnhancedSubjectValidator {
    fn validate_subject(&self, subject: &AccountSubject) -> LedgerResult<()> {
        validate_subject_code(&subject.id)?;
        validate_subject_code(&subject.code)?;
        validate_subject_name(&subject.name)?;

        if subject.cash_equivalent && subject.subject_type != SubjectType::Asset {
            return Err(LedgerError::Validation(format!(
                "Cash-equivalent subject '{}' must be an asset",
                subject.code
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_subject_code_rules() {
        assert!(validate_subject_code("1002.01").is_ok());
        assert!(validate_subject_code("").is_err());
        assert!(validate_subject_code("bank account").is_err());
    }

    #[test]
    fn test_enhanced_entry_validator_rejects_duplicate_sides() {
        let mut entry = JournalEntry::new(
            "je1".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            "Split receipt".to_string(),
            "alice".to_string(),
        );
        entry.add_line(JournalLine::debit("1002".to_string(), Money::from_minor(100), None));
        entry.add_line(JournalLine::debit("1002".to_string(), Money::from_minor(100), None));
        entry.add_line(JournalLine::credit("6001".to_string(), Money::from_minor(200), None));

        let err = EnhancedEntryValidator.validate_entry(&entry).unwrap_err();
        assert!(err.to_string().contains("multiple times"));
    }

    #[test]
    fn test_enhanced_subject_validator_requires_asset_for_cash() {
        let subject = AccountSubject::new(
            "2001".to_string(),
            "2001".to_string(),
            "Short-term loan".to_string(),
            SubjectType::Liability,
            None,
        )
        .cash_equivalent();
        assert!(EnhancedSubjectValidator.validate_subject(&subject).is_err());
    }

    #[test]
    fn test_statement_line_rules() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let zero = NewStatementLine::new("6222", date, Money::ZERO, "Nothing");
        assert!(validate_statement_line(&zero).is_err());
        let ok = NewStatementLine::new("6222", date, Money::from_minor(-300), "Fee");
        assert!(validate_statement_line(&ok).is_ok());
    }
}
