//! In-memory storage implementation for testing and development
//!
//! Each table sits behind its own lock. Operations touching several tables
//! always acquire them in declaration order (subjects, bank accounts, entries,
//! statement lines, journal matches, reports).

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::traits::*;
use crate::types::*;

type Table<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// In-memory storage implementation for testing and development
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    subjects: Table<String, AccountSubject>,
    bank_accounts: Table<String, BankAccount>,
    entries: Table<String, JournalEntry>,
    voucher_sequences: Arc<Mutex<HashMap<NaiveDate, u32>>>,
    statement_lines: Table<String, BankStatementLine>,
    journal_matches: Table<JournalLineRef, String>,
    reports: Table<String, ReconciliationReport>,
}

fn read<T>(lock: &RwLock<T>) -> LedgerResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> LedgerResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> LedgerResult<()> {
        write(&self.subjects)?.clear();
        write(&self.bank_accounts)?.clear();
        write(&self.entries)?.clear();
        self.voucher_sequences
            .lock()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))?
            .clear();
        write(&self.statement_lines)?.clear();
        write(&self.journal_matches)?.clear();
        write(&self.reports)?.clear();
        Ok(())
    }
}

/// Clear a statement line's match and drop the journal links that point back at it
fn clear_match(
    line: &mut BankStatementLine,
    matches: &mut HashMap<JournalLineRef, String>,
) -> Vec<JournalLineRef> {
    let released = std::mem::take(&mut line.matched_lines);
    for journal_line in &released {
        if matches.get(journal_line) == Some(&line.id) {
            matches.remove(journal_line);
        }
    }
    line.matched_on = None;
    line.match_id = None;
    released
}

fn in_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn save_subject(&self, subject: &AccountSubject) -> LedgerResult<()> {
        let mut subjects = write(&self.subjects)?;
        if subjects.contains_key(&subject.id) {
            return Err(LedgerError::Validation(format!(
                "Subject with ID '{}' already exists",
                subject.id
            )));
        }
        if subjects.values().any(|s| s.code == subject.code) {
            return Err(LedgerError::Validation(format!(
                "Subject code '{}' is already in use",
                subject.code
            )));
        }
        subjects.insert(subject.id.clone(), subject.clone());
        Ok(())
    }

    async fn get_subject(&self, subject_id: &str) -> LedgerResult<Option<AccountSubject>> {
        Ok(read(&self.subjects)?.get(subject_id).cloned())
    }

    async fn find_subject_by_code(&self, code: &str) -> LedgerResult<Option<AccountSubject>> {
        Ok(read(&self.subjects)?
            .values()
            .find(|s| s.code == code)
            .cloned())
    }

    async fn list_subjects(
        &self,
        subject_type: Option<SubjectType>,
    ) -> LedgerResult<Vec<AccountSubject>> {
        let subjects = read(&self.subjects)?;
        let mut filtered: Vec<AccountSubject> = subjects
            .values()
            .filter(|s| subject_type.is_none_or(|t| s.subject_type == t))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(filtered)
    }

    async fn update_subject(&self, subject: &AccountSubject) -> LedgerResult<()> {
        let mut subjects = write(&self.subjects)?;
        if !subjects.contains_key(&subject.id) {
            return Err(LedgerError::SubjectNotFound(subject.id.clone()));
        }
        if subjects
            .values()
            .any(|s| s.id != subject.id && s.code == subject.code)
        {
            return Err(LedgerError::Validation(format!(
                "Subject code '{}' is already in use",
                subject.code
            )));
        }
        subjects.insert(subject.id.clone(), subject.clone());
        Ok(())
    }

    async fn delete_subject(&self, subject_id: &str) -> LedgerResult<()> {
        let mut subjects = write(&self.subjects)?;
        let bank_accounts = read(&self.bank_accounts)?;
        let entries = read(&self.entries)?;

        if !subjects.contains_key(subject_id) {
            return Err(LedgerError::SubjectNotFound(subject_id.to_string()));
        }
        if entries.values().any(|e| e.touches(subject_id)) {
            return Err(LedgerError::InvalidState(format!(
                "Subject '{}' is referenced by journal entries; disable it instead",
                subject_id
            )));
        }
        if subjects
            .values()
            .any(|s| s.parent_id.as_deref() == Some(subject_id))
        {
            return Err(LedgerError::InvalidState(format!(
                "Subject '{}' has child subjects",
                subject_id
            )));
        }
        if bank_accounts.values().any(|b| b.subject_id == subject_id) {
            return Err(LedgerError::InvalidState(format!(
                "Subject '{}' is mapped to a bank account",
                subject_id
            )));
        }
        subjects.remove(subject_id);
        Ok(())
    }

    async fn subject_has_postings(&self, subject_id: &str) -> LedgerResult<bool> {
        Ok(read(&self.entries)?
            .values()
            .any(|e| e.is_posted() && e.touches(subject_id)))
    }

    async fn save_bank_account(&self, account: &BankAccount) -> LedgerResult<()> {
        write(&self.bank_accounts)?.insert(account.number.clone(), account.clone());
        Ok(())
    }

    async fn get_bank_account(&self, number: &str) -> LedgerResult<Option<BankAccount>> {
        Ok(read(&self.bank_accounts)?.get(number).cloned())
    }

    async fn list_bank_accounts(&self) -> LedgerResult<Vec<BankAccount>> {
        let mut accounts: Vec<BankAccount> =
            read(&self.bank_accounts)?.values().cloned().collect();
        accounts.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(accounts)
    }

    async fn save_entry(&self, entry: &JournalEntry) -> LedgerResult<()> {
        let mut entries = write(&self.entries)?;
        if let Some(existing) = entries.get(&entry.id) {
            if existing.is_posted() {
                return Err(LedgerError::InvalidState(format!(
                    "Entry '{}' is posted and cannot be modified",
                    entry.id
                )));
            }
        }
        entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get_entry(&self, entry_id: &str) -> LedgerResult<Option<JournalEntry>> {
        Ok(read(&self.entries)?.get(entry_id).cloned())
    }

    async fn list_entries(
        &self,
        status: Option<EntryStatus>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>> {
        let entries = read(&self.entries)?;
        let mut filtered: Vec<JournalEntry> = entries
            .values()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .filter(|e| in_range(e.date, start_date, end_date))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(filtered)
    }

    async fn mark_entry_posted(
        &self,
        entry_id: &str,
        posted_at: NaiveDateTime,
    ) -> LedgerResult<JournalEntry> {
        let mut entries = write(&self.entries)?;
        let entry = entries
            .get_mut(entry_id)
            .ok_or_else(|| LedgerError::EntryNotFound(entry_id.to_string()))?;
        if entry.is_posted() {
            return Err(LedgerError::InvalidState(format!(
                "Entry '{}' is already posted",
                entry_id
            )));
        }
        entry.status = EntryStatus::Posted;
        entry.posted_at = Some(posted_at);
        entry.updated_at = posted_at;
        Ok(entry.clone())
    }

    async fn delete_draft_entry(&self, entry_id: &str) -> LedgerResult<()> {
        let mut entries = write(&self.entries)?;
        match entries.get(entry_id) {
            None => Err(LedgerError::EntryNotFound(entry_id.to_string())),
            Some(entry) if entry.is_posted() => Err(LedgerError::InvalidState(format!(
                "Entry '{}' is posted; record a reversing entry instead",
                entry_id
            ))),
            Some(_) => {
                entries.remove(entry_id);
                Ok(())
            }
        }
    }

    async fn next_voucher_sequence(&self, date: NaiveDate) -> LedgerResult<u32> {
        let mut sequences = self
            .voucher_sequences
            .lock()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))?;
        let next = sequences.entry(date).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    async fn insert_statement_lines(&self, lines: &[BankStatementLine]) -> LedgerResult<()> {
        let mut stored = write(&self.statement_lines)?;
        if let Some(duplicate) = lines.iter().find(|l| stored.contains_key(&l.id)) {
            return Err(LedgerError::Validation(format!(
                "Statement line '{}' already exists",
                duplicate.id
            )));
        }
        for line in lines {
            stored.insert(line.id.clone(), line.clone());
        }
        Ok(())
    }

    async fn get_statement_line(&self, line_id: &str) -> LedgerResult<Option<BankStatementLine>> {
        Ok(read(&self.statement_lines)?.get(line_id).cloned())
    }

    async fn list_statement_lines(
        &self,
        filter: &StatementFilter,
    ) -> LedgerResult<Vec<BankStatementLine>> {
        let lines = read(&self.statement_lines)?;
        let mut filtered: Vec<BankStatementLine> =
            lines.values().filter(|l| filter.accepts(l)).cloned().collect();
        filtered.sort_by(|a, b| {
            a.transaction_date
                .cmp(&b.transaction_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(filtered)
    }

    async fn delete_statement_line(&self, line_id: &str) -> LedgerResult<()> {
        let mut lines = write(&self.statement_lines)?;
        match lines.get(line_id) {
            None => Err(LedgerError::StatementLineNotFound(line_id.to_string())),
            Some(line) if line.is_matched() => Err(LedgerError::InvalidState(format!(
                "Statement line '{}' is matched; unmatch it first",
                line_id
            ))),
            Some(_) => {
                lines.remove(line_id);
                Ok(())
            }
        }
    }

    async fn claim_statement_line(
        &self,
        line_id: &str,
        match_id: &str,
        journal_lines: &[JournalLineRef],
        matched_on: NaiveDate,
    ) -> LedgerResult<bool> {
        if journal_lines.is_empty() {
            return Err(LedgerError::Validation(
                "A match needs at least one journal line".to_string(),
            ));
        }
        let mut lines = write(&self.statement_lines)?;
        let line = lines
            .get_mut(line_id)
            .ok_or_else(|| LedgerError::StatementLineNotFound(line_id.to_string()))?;
        if line.is_matched() {
            return Ok(false);
        }
        line.matched_lines = journal_lines.to_vec();
        line.matched_on = Some(matched_on);
        line.match_id = Some(match_id.to_string());
        Ok(true)
    }

    async fn release_statement_line(&self, line_id: &str) -> LedgerResult<Vec<JournalLineRef>> {
        let mut lines = write(&self.statement_lines)?;
        let mut matches = write(&self.journal_matches)?;
        let line = lines
            .get_mut(line_id)
            .ok_or_else(|| LedgerError::StatementLineNotFound(line_id.to_string()))?;
        if !line.is_matched() {
            return Err(LedgerError::LineNotMatched(line_id.to_string()));
        }
        Ok(clear_match(line, &mut matches))
    }

    async fn claim_journal_line(
        &self,
        line: &JournalLineRef,
        statement_line_id: &str,
        match_id: &str,
    ) -> LedgerResult<bool> {
        let entries = read(&self.entries)?;
        let statement_lines = read(&self.statement_lines)?;
        let mut matches = write(&self.journal_matches)?;

        let entry = entries
            .get(&line.entry_id)
            .ok_or_else(|| LedgerError::EntryNotFound(line.entry_id.clone()))?;
        if !entry.is_posted() {
            return Err(LedgerError::InvalidState(format!(
                "Entry '{}' is not posted and cannot be matched",
                line.entry_id
            )));
        }
        if line.line_no >= entry.lines.len() {
            return Err(LedgerError::Validation(format!(
                "Entry '{}' has no line {}",
                line.entry_id, line.line_no
            )));
        }
        let claim_held = statement_lines.get(statement_line_id).is_some_and(|s| {
            s.match_id.as_deref() == Some(match_id) && s.matched_lines.contains(line)
        });
        if !claim_held || matches.contains_key(line) {
            return Ok(false);
        }
        matches.insert(line.clone(), statement_line_id.to_string());
        Ok(true)
    }

    async fn release_claim(&self, line_id: &str, match_id: &str) -> LedgerResult<()> {
        let mut lines = write(&self.statement_lines)?;
        let mut matches = write(&self.journal_matches)?;
        if let Some(line) = lines.get_mut(line_id) {
            if line.match_id.as_deref() == Some(match_id) {
                clear_match(line, &mut matches);
            }
        }
        Ok(())
    }

    async fn journal_line_match(&self, line: &JournalLineRef) -> LedgerResult<Option<String>> {
        Ok(read(&self.journal_matches)?.get(line).cloned())
    }

    async fn save_report(&self, report: &ReconciliationReport) -> LedgerResult<()> {
        let mut reports = write(&self.reports)?;
        if reports.contains_key(&report.id) {
            return Err(LedgerError::InvalidState(format!(
                "Reconciliation report '{}' already exists and is immutable",
                report.id
            )));
        }
        reports.insert(report.id.clone(), report.clone());
        Ok(())
    }

    async fn get_report(&self, report_id: &str) -> LedgerResult<Option<ReconciliationReport>> {
        Ok(read(&self.reports)?.get(report_id).cloned())
    }

    async fn list_reports(
        &self,
        bank_account: Option<&str>,
    ) -> LedgerResult<Vec<ReconciliationReport>> {
        let reports = read(&self.reports)?;
        let mut filtered: Vec<ReconciliationReport> = reports
            .values()
            .filter(|r| bank_account.is_none_or(|b| r.bank_account == b))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| {
            b.reconciliation_date
                .cmp(&a.reconciliation_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(filtered)
    }

    async fn delete_report(&self, report_id: &str) -> LedgerResult<()> {
        if write(&self.reports)?.remove(report_id).is_some() {
            Ok(())
        } else {
            Err(LedgerError::ReportNotFound(report_id.to_string()))
        }
    }

    async fn snapshot(&self) -> LedgerResult<LedgerSnapshot> {
        let subjects = read(&self.subjects)?;
        let bank_accounts = read(&self.bank_accounts)?;
        let entries = read(&self.entries)?;
        let statement_lines = read(&self.statement_lines)?;

        let mut posted_entries: Vec<JournalEntry> =
            entries.values().filter(|e| e.is_posted()).cloned().collect();
        posted_entries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

        let mut lines: Vec<BankStatementLine> = statement_lines.values().cloned().collect();
        lines.sort_by(|a, b| {
            a.transaction_date
                .cmp(&b.transaction_date)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(LedgerSnapshot {
            subjects: subjects.clone(),
            bank_accounts: bank_accounts.clone(),
            posted_entries,
            statement_lines: lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    async fn posted_entry(storage: &MemoryStorage) -> JournalEntry {
        let mut entry = JournalEntry::new(
            "je1".to_string(),
            date(2),
            "Customer receipt".to_string(),
            "tester".to_string(),
        );
        entry.add_line(JournalLine::debit("bank".to_string(), Money::from_minor(50000), None));
        entry.add_line(JournalLine::credit("ar".to_string(), Money::from_minor(50000), None));
        storage.save_entry(&entry).await.unwrap();
        storage
            .mark_entry_posted("je1", chrono::Utc::now().naive_utc())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_post_is_compare_and_swap() {
        let storage = MemoryStorage::new();
        let mut entry = JournalEntry::new(
            "je1".to_string(),
            date(1),
            "Test".to_string(),
            "tester".to_string(),
        );
        entry.add_line(JournalLine::debit("a".to_string(), Money::from_minor(1), None));
        entry.add_line(JournalLine::credit("b".to_string(), Money::from_minor(1), None));
        storage.save_entry(&entry).await.unwrap();

        let now = chrono::Utc::now().naive_utc();
        assert!(storage.mark_entry_posted("je1", now).await.unwrap().is_posted());
        let second = storage.mark_entry_posted("je1", now).await.unwrap_err();
        assert_eq!(second.kind(), ErrorKind::State);

        let overwrite = storage.save_entry(&entry).await.unwrap_err();
        assert_eq!(overwrite.kind(), ErrorKind::State);
        assert_eq!(
            storage.delete_draft_entry("je1").await.unwrap_err().kind(),
            ErrorKind::State
        );
        assert_eq!(
            storage.mark_entry_posted("nope", now).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    async fn insert_statement(storage: &MemoryStorage, id: &str) {
        let statement = BankStatementLine::from_import(
            id.to_string(),
            NewStatementLine::new("acct", date(1), Money::from_minor(50000), "Deposit"),
        );
        storage.insert_statement_lines(&[statement]).await.unwrap();
    }

    #[tokio::test]
    async fn test_claims_are_exclusive() {
        let storage = MemoryStorage::new();
        let entry = posted_entry(&storage).await;
        let line = entry.line_ref(0);
        insert_statement(&storage, "s1").await;
        insert_statement(&storage, "s2").await;

        assert!(storage
            .claim_statement_line("s1", "m1", &[line.clone()], date(5))
            .await
            .unwrap());
        assert!(!storage
            .claim_statement_line("s1", "m2", &[line.clone()], date(5))
            .await
            .unwrap());
        assert!(storage
            .claim_statement_line("s2", "m3", &[line.clone()], date(5))
            .await
            .unwrap());

        assert!(storage.claim_journal_line(&line, "s1", "m1").await.unwrap());
        assert!(!storage.claim_journal_line(&line, "s2", "m3").await.unwrap());

        // another claim's rollback leaves the holder alone
        storage.release_claim("s1", "m3").await.unwrap();
        assert_eq!(
            storage.journal_line_match(&line).await.unwrap().as_deref(),
            Some("s1")
        );
        storage.release_claim("s2", "m3").await.unwrap();
        assert!(!storage.get_statement_line("s2").await.unwrap().unwrap().is_matched());

        assert_eq!(
            storage.delete_statement_line("s1").await.unwrap_err().kind(),
            ErrorKind::State
        );

        let released = storage.release_statement_line("s1").await.unwrap();
        assert_eq!(released, vec![line.clone()]);
        assert!(storage.journal_line_match(&line).await.unwrap().is_none());
        let statement = storage.get_statement_line("s1").await.unwrap().unwrap();
        assert!(statement.match_id.is_none());

        let again = storage.release_statement_line("s1").await.unwrap_err();
        assert!(matches!(again, LedgerError::LineNotMatched(_)));
    }

    #[tokio::test]
    async fn test_journal_claim_fails_after_statement_released() {
        let storage = MemoryStorage::new();
        let entry = posted_entry(&storage).await;
        let line = entry.line_ref(0);
        insert_statement(&storage, "s1").await;

        assert!(storage
            .claim_statement_line("s1", "m1", &[line.clone()], date(5))
            .await
            .unwrap());
        // an unmatch lands between the two halves of the claim
        assert!(storage.release_statement_line("s1").await.unwrap().contains(&line));
        assert!(!storage.claim_journal_line(&line, "s1", "m1").await.unwrap());
        assert!(storage.journal_line_match(&line).await.unwrap().is_none());

        // the same statement line claimed again by a newer match
        assert!(storage
            .claim_statement_line("s1", "m2", &[line.clone()], date(6))
            .await
            .unwrap());
        assert!(!storage.claim_journal_line(&line, "s1", "m1").await.unwrap());
        assert!(storage.claim_journal_line(&line, "s1", "m2").await.unwrap());

        // the stale claim's rollback must not undo the newer one
        storage.release_claim("s1", "m1").await.unwrap();
        assert_eq!(
            storage.journal_line_match(&line).await.unwrap().as_deref(),
            Some("s1")
        );
        assert!(storage.get_statement_line("s1").await.unwrap().unwrap().is_matched());
    }

    #[tokio::test]
    async fn test_subject_code_is_unique() {
        let storage = MemoryStorage::new();
        let cash = AccountSubject::new(
            "cash".to_string(),
            "1001".to_string(),
            "Cash".to_string(),
            SubjectType::Asset,
            None,
        );
        storage.save_subject(&cash).await.unwrap();

        let clash = AccountSubject::new(
            "cash2".to_string(),
            "1001".to_string(),
            "Petty cash".to_string(),
            SubjectType::Asset,
            None,
        );
        assert!(storage.save_subject(&clash).await.is_err());
        assert_eq!(storage.list_subjects(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_hides_drafts() {
        let storage = MemoryStorage::new();
        let mut draft = JournalEntry::new(
            "draft".to_string(),
            date(3),
            "Pending".to_string(),
            "tester".to_string(),
        );
        draft.add_line(JournalLine::debit("a".to_string(), Money::from_minor(5), None));
        draft.add_line(JournalLine::credit("b".to_string(), Money::from_minor(5), None));
        storage.save_entry(&draft).await.unwrap();

        let snapshot = storage.snapshot().await.unwrap();
        assert!(snapshot.posted_entries.is_empty());

        assert_eq!(storage.next_voucher_sequence(date(3)).await.unwrap(), 1);
        assert_eq!(storage.next_voucher_sequence(date(3)).await.unwrap(), 2);
        assert_eq!(storage.next_voucher_sequence(date(4)).await.unwrap(), 1);

        storage.clear().unwrap();
        assert!(storage.get_entry("draft").await.unwrap().is_none());
        assert_eq!(storage.next_voucher_sequence(date(3)).await.unwrap(), 1);
    }
}
