//! Bank reconciliation reports: book balance against bank balance with reconciling items

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::traits::*;
use crate::types::*;

/// A stored report together with the items that are outstanding now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationDetail {
    pub report: ReconciliationReport,
    /// Bank-only items at the report date, recomputed from current matches
    pub current_bank_only_items: Vec<ReconcilingItem>,
    /// Book-only items at the report date, recomputed from current matches
    pub current_book_only_items: Vec<ReconcilingItem>,
}

/// Outstanding items of one bank account at a date
struct Outstanding {
    bank_only: Vec<ReconcilingItem>,
    book_only: Vec<ReconcilingItem>,
    /// Statement lines whose match is cleared at the date
    cleared: usize,
}

/// Items not cleared at `as_of`. A match counts only once both of its sides are
/// dated on or before `as_of`, so reports for past dates stay reproducible after
/// later periods are matched.
fn outstanding_items(
    snapshot: &LedgerSnapshot,
    bank_account: &str,
    subject_id: &str,
    as_of: NaiveDate,
) -> Outstanding {
    let index = snapshot.match_index();
    let statements: Vec<&BankStatementLine> = snapshot
        .statement_lines
        .iter()
        .filter(|l| l.bank_account == bank_account && l.transaction_date <= as_of)
        .collect();
    let cleared = statements
        .iter()
        .filter(|l| index.statement_line_cleared(l, as_of))
        .count();

    let bank_only = statements
        .iter()
        .filter(|l| !index.statement_line_cleared(l, as_of))
        .map(|l| ReconcilingItem {
            side: ItemSide::BankOnly,
            reference: l.id.clone(),
            date: l.transaction_date,
            amount: l.amount,
            description: l.description.clone(),
        })
        .collect();

    let book_only = snapshot
        .lines_for_subject(subject_id)
        .filter(|(entry, _, _)| entry.date <= as_of)
        .filter(|(entry, line_no, _)| !index.journal_line_cleared(&entry.line_ref(*line_no), as_of))
        .map(|(entry, line_no, line)| ReconcilingItem {
            side: ItemSide::BookOnly,
            reference: entry.line_ref(line_no).to_string(),
            date: entry.date,
            amount: line.signed_amount(),
            description: entry.memo.clone(),
        })
        .collect();

    Outstanding {
        bank_only,
        book_only,
        cleared,
    }
}

fn split_receipts_payments(items: &[ReconcilingItem]) -> LedgerResult<(Money, Money)> {
    let receipts = Money::try_sum(
        items
            .iter()
            .filter(|i| i.amount.is_positive())
            .map(|i| i.amount),
    )?;
    let payments = Money::try_sum(
        items
            .iter()
            .filter(|i| i.amount.is_negative())
            .map(|i| i.amount.abs()),
    )?;
    Ok((receipts, payments))
}

/// Builds and stores reconciliation reports
pub struct ReconciliationReportBuilder<S: LedgerStorage> {
    storage: S,
}

impl<S: LedgerStorage> ReconciliationReportBuilder<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Compute and persist a reconciliation of `bank_account` as of `as_of`.
    ///
    /// An imbalance does not fail the call; the report is stored as unbalanced
    /// and carries a warning.
    pub async fn generate_report(
        &self,
        bank_account: &str,
        as_of: NaiveDate,
        bank_balance: Money,
        created_by: &str,
    ) -> LedgerResult<ReconciliationReport> {
        if created_by.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Report must record its creator".to_string(),
            ));
        }

        let snapshot = self.storage.snapshot().await?;
        let subject = snapshot.bank_subject(bank_account)?;

        let book_balance = Money::try_sum(
            snapshot
                .lines_for_subject(&subject.id)
                .filter(|(entry, _, _)| entry.date <= as_of)
                .map(|(_, _, line)| line.signed_amount()),
        )?;

        let outstanding = outstanding_items(&snapshot, bank_account, &subject.id, as_of);
        let matched_count = outstanding.cleared;
        let (bank_only_receipts, bank_only_payments) =
            split_receipts_payments(&outstanding.bank_only)?;
        let (book_only_receipts, book_only_payments) =
            split_receipts_payments(&outstanding.book_only)?;

        let adjusted_book_balance =
            Money::try_sum([book_balance, bank_only_receipts, -bank_only_payments])?;
        let adjusted_bank_balance =
            Money::try_sum([bank_balance, book_only_receipts, -book_only_payments])?;

        let mut warnings = Vec::new();
        let status = if adjusted_bank_balance == adjusted_book_balance {
            ReconciliationStatus::Balanced
        } else {
            warnings.push(ConsistencyWarning::new(
                WarningKind::UnbalancedReconciliation,
                format!(
                    "Adjusted bank balance {} differs from adjusted book balance {} by {}",
                    adjusted_bank_balance,
                    adjusted_book_balance,
                    adjusted_bank_balance - adjusted_book_balance
                ),
            ));
            ReconciliationStatus::Unbalanced
        };

        let report = ReconciliationReport {
            id: uuid::Uuid::new_v4().to_string(),
            bank_account: bank_account.to_string(),
            reconciliation_date: as_of,
            bank_balance,
            book_balance,
            bank_only_items: outstanding.bank_only,
            book_only_items: outstanding.book_only,
            bank_only_receipts,
            bank_only_payments,
            book_only_receipts,
            book_only_payments,
            adjusted_bank_balance,
            adjusted_book_balance,
            matched_count,
            status,
            warnings,
            created_by: created_by.to_string(),
            created_at: chrono::Utc::now().naive_utc(),
        };
        self.storage.save_report(&report).await?;

        if report.is_balanced() {
            info!(
                report = %report.id,
                bank_account,
                %as_of,
                "reconciliation report generated"
            );
        } else {
            warn!(
                report = %report.id,
                bank_account,
                %as_of,
                difference = %report.difference(),
                "reconciliation report is unbalanced"
            );
        }
        Ok(report)
    }

    pub async fn get_report(&self, report_id: &str) -> LedgerResult<Option<ReconciliationReport>> {
        self.storage.get_report(report_id).await
    }

    pub async fn get_report_required(&self, report_id: &str) -> LedgerResult<ReconciliationReport> {
        self.storage
            .get_report(report_id)
            .await?
            .ok_or_else(|| LedgerError::ReportNotFound(report_id.to_string()))
    }

    /// Reports for one bank account, or all reports, newest first
    pub async fn list_reports(
        &self,
        bank_account: Option<&str>,
    ) -> LedgerResult<Vec<ReconciliationReport>> {
        self.storage.list_reports(bank_account).await
    }

    pub async fn delete_report(&self, report_id: &str) -> LedgerResult<()> {
        self.storage.delete_report(report_id).await?;
        info!(report = %report_id, "reconciliation report deleted");
        Ok(())
    }

    /// The stored report plus what is still outstanding at its date
    pub async fn report_detail(&self, report_id: &str) -> LedgerResult<ReconciliationDetail> {
        let report = self.get_report_required(report_id).await?;
        let snapshot = self.storage.snapshot().await?;
        let subject = snapshot.bank_subject(&report.bank_account)?;
        let outstanding = outstanding_items(
            &snapshot,
            &report.bank_account,
            &subject.id,
            report.reconciliation_date,
        );

        Ok(ReconciliationDetail {
            report,
            current_bank_only_items: outstanding.bank_only,
            current_book_only_items: outstanding.book_only,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(amount: i64) -> ReconcilingItem {
        ReconcilingItem {
            side: ItemSide::BankOnly,
            reference: "s".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            amount: Money::from_minor(amount),
            description: String::new(),
        }
    }

    #[test]
    fn test_split_receipts_payments() {
        let items = vec![item(5000), item(-1200), item(300), item(-800)];
        let (receipts, payments) = split_receipts_payments(&items).unwrap();
        assert_eq!(receipts, Money::from_minor(5300));
        assert_eq!(payments, Money::from_minor(2000));
    }
}
