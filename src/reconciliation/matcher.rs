//! Matching of bank statement lines against posted journal lines on the bank subject

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::MatchingConfig;
use crate::traits::*;
use crate::types::*;

/// Outcome of one auto-match run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoMatchResult {
    /// Matches established by this run, in the order they were committed
    pub matches: Vec<MatchRecord>,
    pub matched_count: usize,
    /// Unmatched statement lines that were in range when the run started
    pub statements_considered: usize,
}

/// A posted, unmatched journal line on the bank subject
#[derive(Debug, Clone)]
struct Candidate {
    reference: JournalLineRef,
    date: NaiveDate,
    /// Debit minus credit, so receipts are positive like statement amounts
    amount: Money,
}

enum ClaimOutcome {
    Matched(MatchRecord),
    /// The statement line was matched by someone else in the meantime
    StatementTaken,
    /// A journal line could not be claimed, because it was matched elsewhere or the
    /// statement claim was undone in the meantime
    JournalTaken(JournalLineRef),
}

fn day_distance(a: NaiveDate, b: NaiveDate) -> i64 {
    a.signed_duration_since(b).num_days().abs()
}

/// Reconciliation matcher. Every link is made through conditional claims in storage,
/// so several matchers may run against the same storage at once.
pub struct ReconciliationMatcher<S: LedgerStorage> {
    storage: S,
    config: MatchingConfig,
}

impl<S: LedgerStorage> ReconciliationMatcher<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            config: MatchingConfig::default(),
        }
    }

    pub fn with_config(storage: S, config: MatchingConfig) -> LedgerResult<Self> {
        config.validate()?;
        Ok(Self { storage, config })
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Match unmatched statement lines dated within `[start_date, end_date]`.
    ///
    /// Runs an exact pass and then, if enabled, an aggregate pass. Matches from
    /// batches that completed before an error stay committed.
    pub async fn auto_match(
        &self,
        bank_account: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<AutoMatchResult> {
        if start_date > end_date {
            return Err(LedgerError::Validation(format!(
                "Start date {} is after end date {}",
                start_date, end_date
            )));
        }

        let subject_id = self.bank_subject_id(bank_account).await?;
        let statements = self
            .storage
            .list_statement_lines(
                &StatementFilter::for_account(bank_account)
                    .between(start_date, end_date)
                    .unmatched(),
            )
            .await?;
        let mut result = AutoMatchResult {
            statements_considered: statements.len(),
            ..AutoMatchResult::default()
        };
        if statements.is_empty() {
            debug!(bank_account, "no unmatched statement lines in range");
            return Ok(result);
        }

        let tolerance = Duration::days(self.config.date_tolerance_days);
        let window_start = start_date.checked_sub_signed(tolerance).unwrap_or(NaiveDate::MIN);
        let window_end = end_date.checked_add_signed(tolerance).unwrap_or(NaiveDate::MAX);
        let mut pool = self
            .load_candidates(&subject_id, window_start, window_end)
            .await?;
        debug!(
            bank_account,
            statements = statements.len(),
            candidates = pool.len(),
            "auto-match started"
        );

        let matched_on = chrono::Utc::now().date_naive();
        let mut matched_statements: HashSet<String> = HashSet::new();

        for (batch_no, batch) in statements.chunks(self.config.batch_size).enumerate() {
            for statement in batch {
                if let Some(record) = self.match_exact(statement, &mut pool, matched_on).await? {
                    matched_statements.insert(record.statement_line_id.clone());
                    result.matches.push(record);
                }
            }
            debug!(batch = batch_no, matched = result.matches.len(), "exact pass batch done");
        }

        if self.config.aggregate_pass {
            for (batch_no, batch) in statements.chunks(self.config.batch_size).enumerate() {
                for statement in batch {
                    if matched_statements.contains(&statement.id) {
                        continue;
                    }
                    if let Some(record) =
                        self.match_aggregate(statement, &mut pool, matched_on).await?
                    {
                        matched_statements.insert(record.statement_line_id.clone());
                        result.matches.push(record);
                    }
                }
                debug!(
                    batch = batch_no,
                    matched = result.matches.len(),
                    "aggregate pass batch done"
                );
            }
        }

        result.matched_count = result.matches.len();
        info!(
            bank_account,
            considered = result.statements_considered,
            matched = result.matched_count,
            "auto-match finished"
        );
        Ok(result)
    }

    /// Clear a statement line's match and the journal lines paired with it.
    /// Returns the journal lines that were released.
    pub async fn unmatch(&self, statement_line_id: &str) -> LedgerResult<Vec<JournalLineRef>> {
        let released = self.storage.release_statement_line(statement_line_id).await?;
        info!(
            statement_line = %statement_line_id,
            journal_lines = released.len(),
            "statement line unmatched"
        );
        Ok(released)
    }

    /// Link a statement line to journal lines chosen by the user.
    ///
    /// The journal lines must be posted lines on the bank subject whose amounts sum
    /// to the statement amount within the configured epsilon.
    pub async fn manual_match(
        &self,
        statement_line_id: &str,
        journal_lines: &[JournalLineRef],
    ) -> LedgerResult<MatchRecord> {
        if journal_lines.is_empty() {
            return Err(LedgerError::Validation(
                "A manual match needs at least one journal line".to_string(),
            ));
        }
        let unique: HashSet<&JournalLineRef> = journal_lines.iter().collect();
        if unique.len() != journal_lines.len() {
            return Err(LedgerError::Validation(
                "A journal line is listed more than once".to_string(),
            ));
        }

        let statement = self
            .storage
            .get_statement_line(statement_line_id)
            .await?
            .ok_or_else(|| LedgerError::StatementLineNotFound(statement_line_id.to_string()))?;
        if statement.is_matched() {
            return Err(LedgerError::InvalidState(format!(
                "Statement line '{}' is already matched",
                statement_line_id
            )));
        }
        let subject_id = self.bank_subject_id(&statement.bank_account).await?;

        let mut total = Money::ZERO;
        for reference in journal_lines {
            let entry = self
                .storage
                .get_entry(&reference.entry_id)
                .await?
                .ok_or_else(|| LedgerError::EntryNotFound(reference.entry_id.clone()))?;
            if !entry.is_posted() {
                return Err(LedgerError::InvalidState(format!(
                    "Entry '{}' is not posted",
                    entry.id
                )));
            }
            let line = entry.lines.get(reference.line_no).ok_or_else(|| {
                LedgerError::Validation(format!("Journal line {} does not exist", reference))
            })?;
            if line.subject_id != subject_id {
                return Err(LedgerError::Validation(format!(
                    "Journal line {} is not booked on bank subject '{}'",
                    reference, subject_id
                )));
            }
            total += line.signed_amount();
        }
        if total.distance(statement.amount) > self.epsilon() {
            return Err(LedgerError::Validation(format!(
                "Journal lines total {} but the statement line is {}",
                total, statement.amount
            )));
        }

        let matched_on = chrono::Utc::now().date_naive();
        match self
            .claim(&statement, journal_lines, MatchKind::Manual, matched_on)
            .await?
        {
            ClaimOutcome::Matched(record) => Ok(record),
            ClaimOutcome::StatementTaken => Err(LedgerError::InvalidState(format!(
                "Statement line '{}' is already matched",
                statement_line_id
            ))),
            ClaimOutcome::JournalTaken(line) => Err(LedgerError::InvalidState(format!(
                "Journal line {} is already matched",
                line
            ))),
        }
    }

    async fn bank_subject_id(&self, bank_account: &str) -> LedgerResult<String> {
        self.storage
            .get_bank_account(bank_account)
            .await?
            .map(|account| account.subject_id)
            .ok_or_else(|| LedgerError::BankAccountNotFound(bank_account.to_string()))
    }

    fn epsilon(&self) -> u64 {
        self.config.amount_epsilon.unsigned_abs()
    }

    fn within_tolerance(&self, a: NaiveDate, b: NaiveDate) -> bool {
        day_distance(a, b) <= self.config.date_tolerance_days
    }

    async fn load_candidates(
        &self,
        subject_id: &str,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> LedgerResult<Vec<Candidate>> {
        let entries = self
            .storage
            .list_entries(Some(EntryStatus::Posted), Some(window_start), Some(window_end))
            .await?;

        let mut candidates = Vec::new();
        for entry in &entries {
            for (line_no, line) in entry.lines.iter().enumerate() {
                if line.subject_id != subject_id {
                    continue;
                }
                let reference = entry.line_ref(line_no);
                if self.storage.journal_line_match(&reference).await?.is_some() {
                    continue;
                }
                candidates.push(Candidate {
                    reference,
                    date: entry.date,
                    amount: line.signed_amount(),
                });
            }
        }
        candidates.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(candidates)
    }

    /// Closest-date candidate of equal amount; ties go to the lowest entry id and line number
    async fn match_exact(
        &self,
        statement: &BankStatementLine,
        pool: &mut Vec<Candidate>,
        matched_on: NaiveDate,
    ) -> LedgerResult<Option<MatchRecord>> {
        loop {
            let best = pool
                .iter()
                .enumerate()
                .filter(|(_, c)| {
                    c.amount.distance(statement.amount) <= self.epsilon()
                        && self.within_tolerance(c.date, statement.transaction_date)
                })
                .min_by(|(_, a), (_, b)| {
                    day_distance(a.date, statement.transaction_date)
                        .cmp(&day_distance(b.date, statement.transaction_date))
                        .then_with(|| a.reference.cmp(&b.reference))
                })
                .map(|(index, _)| index);
            let Some(index) = best else {
                return Ok(None);
            };

            let reference = pool[index].reference.clone();
            match self
                .claim(statement, &[reference], MatchKind::Exact, matched_on)
                .await?
            {
                ClaimOutcome::Matched(record) => {
                    pool.remove(index);
                    return Ok(Some(record));
                }
                ClaimOutcome::StatementTaken => return Ok(None),
                ClaimOutcome::JournalTaken(taken) => {
                    pool.retain(|c| c.reference != taken);
                }
            }
        }
    }

    /// First combination, by size and then index order over the closest candidates,
    /// whose amounts sum to the statement amount
    async fn match_aggregate(
        &self,
        statement: &BankStatementLine,
        pool: &mut Vec<Candidate>,
        matched_on: NaiveDate,
    ) -> LedgerResult<Option<MatchRecord>> {
        loop {
            let mut nearby: Vec<&Candidate> = pool
                .iter()
                .filter(|c| {
                    c.amount.is_positive() == statement.amount.is_positive()
                        && !c.amount.is_zero()
                        && self.within_tolerance(c.date, statement.transaction_date)
                })
                .collect();
            nearby.sort_by(|a, b| {
                day_distance(a.date, statement.transaction_date)
                    .cmp(&day_distance(b.date, statement.transaction_date))
                    .then_with(|| a.reference.cmp(&b.reference))
            });
            nearby.truncate(self.config.max_aggregate_candidates);

            let amounts: Vec<Money> = nearby.iter().map(|c| c.amount).collect();
            let Some(indices) = find_combination(
                &amounts,
                statement.amount,
                self.epsilon(),
                self.config.max_combination_size,
            ) else {
                return Ok(None);
            };
            let references: Vec<JournalLineRef> = indices
                .iter()
                .map(|&i| nearby[i].reference.clone())
                .collect();

            match self
                .claim(statement, &references, MatchKind::Aggregate, matched_on)
                .await?
            {
                ClaimOutcome::Matched(record) => {
                    pool.retain(|c| !references.contains(&c.reference));
                    return Ok(Some(record));
                }
                ClaimOutcome::StatementTaken => return Ok(None),
                ClaimOutcome::JournalTaken(taken) => {
                    pool.retain(|c| c.reference != taken);
                }
            }
        }
    }

    /// Claim the statement line, then each journal line; on a lost race undo what was claimed.
    ///
    /// Every claim carries its own id, so an unmatch or a newer claim landing in between
    /// makes the journal claims fail and the rollback leaves the newer state alone.
    async fn claim(
        &self,
        statement: &BankStatementLine,
        journal_lines: &[JournalLineRef],
        kind: MatchKind,
        matched_on: NaiveDate,
    ) -> LedgerResult<ClaimOutcome> {
        let match_id = uuid::Uuid::new_v4().to_string();
        if !self
            .storage
            .claim_statement_line(&statement.id, &match_id, journal_lines, matched_on)
            .await?
        {
            warn!(statement_line = %statement.id, "statement line was matched concurrently");
            return Ok(ClaimOutcome::StatementTaken);
        }

        for line in journal_lines {
            match self
                .storage
                .claim_journal_line(line, &statement.id, &match_id)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        statement_line = %statement.id,
                        journal_line = %line,
                        "journal line claim lost to a concurrent writer"
                    );
                    self.storage.release_claim(&statement.id, &match_id).await?;
                    return Ok(ClaimOutcome::JournalTaken(line.clone()));
                }
                Err(e) => {
                    self.storage.release_claim(&statement.id, &match_id).await?;
                    return Err(e);
                }
            }
        }

        let amount = statement.amount;
        info!(
            statement_line = %statement.id,
            journal_lines = journal_lines.len(),
            amount = %amount,
            kind = ?kind,
            "statement line matched"
        );
        Ok(ClaimOutcome::Matched(MatchRecord {
            statement_line_id: statement.id.clone(),
            journal_lines: journal_lines.to_vec(),
            amount,
            kind,
            matched_on,
        }))
    }
}

/// Indices of the first combination of 2..=`max_size` amounts summing to `target`
/// within `epsilon`. Sizes are tried in increasing order and, within a size,
/// combinations in lexicographic index order.
fn find_combination(
    amounts: &[Money],
    target: Money,
    epsilon: u64,
    max_size: usize,
) -> Option<Vec<usize>> {
    let max_size = max_size.min(amounts.len());
    let mut chosen = Vec::with_capacity(max_size);
    (2..=max_size).find_map(|size| {
        chosen.clear();
        search(amounts, target, epsilon, size, 0, Money::ZERO, &mut chosen).then(|| chosen.clone())
    })
}

fn search(
    amounts: &[Money],
    target: Money,
    epsilon: u64,
    size: usize,
    from: usize,
    sum: Money,
    chosen: &mut Vec<usize>,
) -> bool {
    if chosen.len() == size {
        return sum.distance(target) <= epsilon;
    }
    let remaining = size - chosen.len();
    for index in from..=amounts.len().saturating_sub(remaining) {
        let Some(next) = sum.checked_add(amounts[index]) else {
            continue;
        };
        // All amounts share the target's sign, so overshooting cannot be undone
        if next.abs() > target.abs() && next.distance(target) > epsilon {
            continue;
        }
        chosen.push(index);
        if search(amounts, target, epsilon, size, index + 1, next, chosen) {
            return true;
        }
        chosen.pop();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(values: &[i64]) -> Vec<Money> {
        values.iter().map(|&v| Money::from_minor(v)).collect()
    }

    #[test]
    fn test_find_combination_prefers_smallest_then_first() {
        let amounts = money(&[300, 100, 200, 50, 250]);
        assert_eq!(
            find_combination(&amounts, Money::from_minor(300), 0, 4),
            Some(vec![1, 2])
        );
        assert_eq!(
            find_combination(&amounts, Money::from_minor(650), 0, 4),
            Some(vec![0, 1, 4])
        );
        assert_eq!(find_combination(&amounts, Money::from_minor(7), 0, 4), None);
    }

    #[test]
    fn test_find_combination_respects_size_and_epsilon() {
        let amounts = money(&[100, 100, 100, 100]);
        assert_eq!(find_combination(&amounts, Money::from_minor(400), 0, 3), None);
        assert_eq!(
            find_combination(&amounts, Money::from_minor(401), 1, 4),
            Some(vec![0, 1, 2, 3])
        );
    }

    #[test]
    fn test_find_combination_negative_amounts() {
        let amounts = money(&[-120, -80, -30]);
        assert_eq!(
            find_combination(&amounts, Money::from_minor(-200), 0, 4),
            Some(vec![0, 1])
        );
    }

    #[test]
    fn test_find_combination_needs_two_lines() {
        assert_eq!(find_combination(&money(&[100]), Money::from_minor(100), 0, 4), None);
    }
}
