//! Balance sheet, income statement, cash flow and trial balance over posted entries

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::traits::*;
use crate::types::*;

/// Debit and credit totals of one subject
#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    debits: Money,
    credits: Money,
}

impl Totals {
    fn add_line(&mut self, line: &JournalLine) -> LedgerResult<()> {
        match (
            self.debits.checked_add(line.debit),
            self.credits.checked_add(line.credit),
        ) {
            (Some(debits), Some(credits)) => {
                self.debits = debits;
                self.credits = credits;
                Ok(())
            }
            _ => Err(LedgerError::Validation(format!(
                "Totals of subject '{}' are out of range",
                line.subject_id
            ))),
        }
    }
}

/// Per-subject totals of posted lines whose entry date falls in `[start, end]`
fn subject_totals(
    snapshot: &LedgerSnapshot,
    start: Option<NaiveDate>,
    end: NaiveDate,
) -> LedgerResult<HashMap<&str, Totals>> {
    let mut totals: HashMap<&str, Totals> = HashMap::new();
    for entry in &snapshot.posted_entries {
        if entry.date > end || start.is_some_and(|s| entry.date < s) {
            continue;
        }
        for line in &entry.lines {
            totals
                .entry(line.subject_id.as_str())
                .or_default()
                .add_line(line)?;
        }
    }
    Ok(totals)
}

/// Non-zero balances of the subjects of `subject_type`, ordered by code
fn balances_of_type(
    snapshot: &LedgerSnapshot,
    totals: &HashMap<&str, Totals>,
    subject_type: SubjectType,
) -> Vec<SubjectBalance> {
    let mut balances: Vec<SubjectBalance> = snapshot
        .subjects
        .values()
        .filter(|s| s.subject_type == subject_type)
        .filter_map(|subject| {
            let t = totals.get(subject.id.as_str())?;
            let balance = subject.oriented_balance(t.debits, t.credits);
            (!balance.is_zero()).then(|| SubjectBalance {
                subject: subject.clone(),
                balance,
            })
        })
        .collect();
    balances.sort_by(|a, b| a.subject.code.cmp(&b.subject.code));
    balances
}

fn total(balances: &[SubjectBalance]) -> LedgerResult<Money> {
    Money::try_sum(balances.iter().map(|b| b.balance))
}

fn total_of(items: &[CashFlowItem]) -> LedgerResult<Money> {
    Money::try_sum(items.iter().map(|i| i.amount))
}

/// Net cash-equivalent movement of posted lines dated on or before `end`
fn cash_balance(snapshot: &LedgerSnapshot, end: Option<NaiveDate>) -> LedgerResult<Money> {
    Money::try_sum(
        snapshot
            .posted_entries
            .iter()
            .filter(|e| end.is_none_or(|end| e.date <= end))
            .flat_map(|e| e.lines.iter())
            .filter(|l| is_cash(snapshot, &l.subject_id))
            .map(JournalLine::signed_amount),
    )
}

fn trial_balance_of(
    snapshot: &LedgerSnapshot,
    as_of_date: NaiveDate,
) -> LedgerResult<TrialBalance> {
    let totals = subject_totals(snapshot, None, as_of_date)?;

    let mut balances = Vec::new();
    for subject_type in [
        SubjectType::Asset,
        SubjectType::Liability,
        SubjectType::Equity,
        SubjectType::Revenue,
        SubjectType::Expense,
    ] {
        balances.extend(balances_of_type(snapshot, &totals, subject_type));
    }
    balances.sort_by(|a, b| a.subject.code.cmp(&b.subject.code));

    let total_debits = Money::try_sum(balances.iter().filter_map(|b| b.debit_balance()))?;
    let total_credits = Money::try_sum(balances.iter().filter_map(|b| b.credit_balance()))?;
    let is_balanced = total_debits == total_credits;
    if !is_balanced {
        warn!(
            %as_of_date,
            debits = %total_debits,
            credits = %total_credits,
            "trial balance does not balance"
        );
    }

    Ok(TrialBalance {
        as_of_date,
        balances,
        total_debits,
        total_credits,
        is_balanced,
    })
}

fn balance_sheet_of(
    snapshot: &LedgerSnapshot,
    end_date: NaiveDate,
) -> LedgerResult<BalanceSheet> {
    let totals = subject_totals(snapshot, None, end_date)?;

    let assets = balances_of_type(snapshot, &totals, SubjectType::Asset);
    let liabilities = balances_of_type(snapshot, &totals, SubjectType::Liability);
    let equity = balances_of_type(snapshot, &totals, SubjectType::Equity);
    let revenue = total(&balances_of_type(snapshot, &totals, SubjectType::Revenue))?;
    let expenses = total(&balances_of_type(snapshot, &totals, SubjectType::Expense))?;
    let current_earnings = revenue.checked_sub(expenses).ok_or_else(out_of_range)?;

    let total_assets = total(&assets)?;
    let total_liabilities = total(&liabilities)?;
    let total_equity = Money::try_sum([total(&equity)?, current_earnings])?;
    let is_balanced =
        Money::try_sum([total_liabilities, total_equity]).is_ok_and(|sum| sum == total_assets);

    let mut warnings = Vec::new();
    if !is_balanced {
        let message = format!(
            "Assets {} do not equal liabilities {} plus equity {}",
            total_assets, total_liabilities, total_equity
        );
        warn!(%end_date, "{}", message);
        warnings.push(ConsistencyWarning::new(
            WarningKind::BalanceSheetIdentity,
            message,
        ));
    }
    debug!(%end_date, subjects = assets.len() + liabilities.len() + equity.len(), "balance sheet built");

    Ok(BalanceSheet {
        end_date,
        assets,
        liabilities,
        equity,
        current_earnings,
        total_assets,
        total_liabilities,
        total_equity,
        is_balanced,
        warnings,
    })
}

fn out_of_range() -> LedgerError {
    LedgerError::Validation("Amount total is out of range".to_string())
}

fn is_cash(snapshot: &LedgerSnapshot, subject_id: &str) -> bool {
    snapshot
        .subjects
        .get(subject_id)
        .is_some_and(|s| s.cash_equivalent)
}

/// Category of the largest tagged non-cash line; untagged movement is operating
fn categorize(snapshot: &LedgerSnapshot, entry: &JournalEntry) -> CashFlowCategory {
    let mut best: Option<(Money, CashFlowCategory)> = None;
    for line in &entry.lines {
        let Some(subject) = snapshot.subjects.get(&line.subject_id) else {
            continue;
        };
        if subject.cash_equivalent {
            continue;
        }
        let Some(category) = subject.cash_flow_category else {
            continue;
        };
        let size = line.signed_amount().abs();
        if best.is_none_or(|(largest, _)| size > largest) {
            best = Some((size, category));
        }
    }
    best.map(|(_, category)| category)
        .unwrap_or(CashFlowCategory::Operating)
}

/// Financial statement builder. Every statement is computed from one storage snapshot.
pub struct FinancialStatementBuilder<S: LedgerStorage> {
    storage: S,
}

impl<S: LedgerStorage> FinancialStatementBuilder<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Trial balance of every subject with a non-zero balance at `as_of_date`
    pub async fn trial_balance(&self, as_of_date: NaiveDate) -> LedgerResult<TrialBalance> {
        let snapshot = self.storage.snapshot().await?;
        trial_balance_of(&snapshot, as_of_date)
    }

    /// Trial balance and balance sheet at `as_of_date`, both taken from one snapshot
    pub async fn trial_balance_and_balance_sheet(
        &self,
        as_of_date: NaiveDate,
    ) -> LedgerResult<(TrialBalance, BalanceSheet)> {
        let snapshot = self.storage.snapshot().await?;
        Ok((
            trial_balance_of(&snapshot, as_of_date)?,
            balance_sheet_of(&snapshot, as_of_date)?,
        ))
    }

    /// Balance of one subject in its normal orientation at `as_of_date`
    pub async fn subject_balance(
        &self,
        subject_id: &str,
        as_of_date: NaiveDate,
    ) -> LedgerResult<Money> {
        let snapshot = self.storage.snapshot().await?;
        let subject = snapshot
            .subjects
            .get(subject_id)
            .ok_or_else(|| LedgerError::SubjectNotFound(subject_id.to_string()))?;
        let totals = snapshot
            .lines_for_subject(subject_id)
            .filter(|(entry, _, _)| entry.date <= as_of_date)
            .try_fold(Totals::default(), |mut t, (_, _, line)| {
                t.add_line(line)?;
                Ok::<_, LedgerError>(t)
            })?;
        Ok(subject.oriented_balance(totals.debits, totals.credits))
    }
}

#[async_trait]
impl<S: LedgerStorage> ReportGenerator for FinancialStatementBuilder<S> {
    async fn generate_balance_sheet(&self, end_date: NaiveDate) -> LedgerResult<BalanceSheet> {
        let snapshot = self.storage.snapshot().await?;
        balance_sheet_of(&snapshot, end_date)
    }

    async fn generate_income_statement(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<IncomeStatement> {
        if start_date > end_date {
            return Err(LedgerError::Validation(format!(
                "Start date {} is after end date {}",
                start_date, end_date
            )));
        }

        let snapshot = self.storage.snapshot().await?;
        let totals = subject_totals(&snapshot, Some(start_date), end_date)?;
        let revenue = balances_of_type(&snapshot, &totals, SubjectType::Revenue);
        let expenses = balances_of_type(&snapshot, &totals, SubjectType::Expense);

        let total_revenue = total(&revenue)?;
        let total_expenses = total(&expenses)?;
        let net_income = total_revenue
            .checked_sub(total_expenses)
            .ok_or_else(out_of_range)?;

        Ok(IncomeStatement {
            start_date,
            end_date,
            revenue,
            expenses,
            total_revenue,
            total_expenses,
            net_income,
        })
    }

    async fn generate_cash_flow(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<CashFlowStatement> {
        if start_date > end_date {
            return Err(LedgerError::Validation(format!(
                "Start date {} is after end date {}",
                start_date, end_date
            )));
        }

        let snapshot = self.storage.snapshot().await?;
        let mut operating_activities = Vec::new();
        let mut investing_activities = Vec::new();
        let mut financing_activities = Vec::new();

        for entry in snapshot
            .posted_entries
            .iter()
            .filter(|e| e.date >= start_date && e.date <= end_date)
        {
            let cash_movement = Money::try_sum(
                entry
                    .lines
                    .iter()
                    .filter(|l| is_cash(&snapshot, &l.subject_id))
                    .map(JournalLine::signed_amount),
            )?;
            // Transfers between cash subjects net to zero
            if cash_movement.is_zero() {
                continue;
            }

            let item = CashFlowItem {
                entry_id: entry.id.clone(),
                date: entry.date,
                description: entry.memo.clone(),
                amount: cash_movement,
            };
            match categorize(&snapshot, entry) {
                CashFlowCategory::Operating => operating_activities.push(item),
                CashFlowCategory::Investing => investing_activities.push(item),
                CashFlowCategory::Financing => financing_activities.push(item),
            }
        }

        let net_operating_cash_flow = total_of(&operating_activities)?;
        let net_investing_cash_flow = total_of(&investing_activities)?;
        let net_financing_cash_flow = total_of(&financing_activities)?;
        let net_cash_flow = Money::try_sum([
            net_operating_cash_flow,
            net_investing_cash_flow,
            net_financing_cash_flow,
        ])?;

        let opening_cash = cash_balance(&snapshot, start_date.pred_opt())?;
        let closing_cash = cash_balance(&snapshot, Some(end_date))?;

        Ok(CashFlowStatement {
            start_date,
            end_date,
            operating_activities,
            investing_activities,
            financing_activities,
            net_operating_cash_flow,
            net_investing_cash_flow,
            net_financing_cash_flow,
            net_cash_flow,
            opening_cash,
            closing_cash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str, subject_type: SubjectType) -> AccountSubject {
        AccountSubject::new(
            id.to_string(),
            id.to_string(),
            id.to_string(),
            subject_type,
            None,
        )
    }

    fn entry(id: &str, lines: Vec<JournalLine>) -> JournalEntry {
        let mut entry = JournalEntry::new(
            id.to_string(),
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            id.to_string(),
            "alice".to_string(),
        );
        entry.status = EntryStatus::Posted;
        for line in lines {
            entry.add_line(line);
        }
        entry
    }

    fn snapshot() -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::default();
        for s in [
            subject("1002", SubjectType::Asset).cash_equivalent(),
            subject("1601", SubjectType::Asset)
                .with_cash_flow_category(CashFlowCategory::Investing),
            subject("2001", SubjectType::Liability)
                .with_cash_flow_category(CashFlowCategory::Financing),
            subject("6602", SubjectType::Expense),
        ] {
            snapshot.subjects.insert(s.id.clone(), s);
        }
        snapshot
    }

    #[test]
    fn test_categorize_uses_largest_tagged_line() {
        let snapshot = snapshot();
        // equipment bought partly on credit: investing line is the largest tagged one
        let purchase = entry(
            "je1",
            vec![
                JournalLine::debit("1601".to_string(), Money::from_minor(9000), None),
                JournalLine::credit("1002".to_string(), Money::from_minor(6000), None),
                JournalLine::credit("2001".to_string(), Money::from_minor(3000), None),
            ],
        );
        assert_eq!(categorize(&snapshot, &purchase), CashFlowCategory::Investing);

        let fee = entry(
            "je2",
            vec![
                JournalLine::debit("6602".to_string(), Money::from_minor(100), None),
                JournalLine::credit("1002".to_string(), Money::from_minor(100), None),
            ],
        );
        assert_eq!(categorize(&snapshot, &fee), CashFlowCategory::Operating);
    }

    #[test]
    fn test_cash_balance_counts_only_cash_subjects() {
        let mut snapshot = snapshot();
        snapshot.posted_entries.push(entry(
            "je1",
            vec![
                JournalLine::debit("1002".to_string(), Money::from_minor(5000), None),
                JournalLine::credit("2001".to_string(), Money::from_minor(5000), None),
            ],
        ));
        assert_eq!(cash_balance(&snapshot, None).unwrap(), Money::from_minor(5000));
        assert_eq!(
            cash_balance(&snapshot, NaiveDate::from_ymd_opt(2024, 3, 31)).unwrap(),
            Money::ZERO
        );
    }

    #[test]
    fn test_totals_out_of_range_are_errors() {
        let mut snapshot = snapshot();
        for id in ["je1", "je2"] {
            let half = Money::from_minor(i64::MAX / 2 + 1);
            snapshot.posted_entries.push(entry(
                id,
                vec![
                    JournalLine::debit("1002".to_string(), half, None),
                    JournalLine::credit("2001".to_string(), half, None),
                ],
            ));
        }
        let as_of = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap();
        let err = trial_balance_of(&snapshot, as_of).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(balance_sheet_of(&snapshot, as_of).is_err());
        assert!(cash_balance(&snapshot, None).is_err());
    }

    #[test]
    fn test_balance_sheet_flags_broken_identity() {
        let mut snapshot = snapshot();
        // one-sided posting that bypassed entry validation
        snapshot.posted_entries.push(entry(
            "je1",
            vec![JournalLine::debit("1002".to_string(), Money::from_minor(700), None)],
        ));
        let as_of = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap();
        let sheet = balance_sheet_of(&snapshot, as_of).unwrap();
        assert!(!sheet.is_balanced);
        assert_eq!(sheet.total_assets, Money::from_minor(700));
        assert_eq!(sheet.warnings.len(), 1);
        assert_eq!(sheet.warnings[0].kind, WarningKind::BalanceSheetIdentity);
    }
}
