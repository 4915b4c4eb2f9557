//! Month-end bank reconciliation example

use chrono::NaiveDate;
use ledger_recon::utils::{init_tracing, MemoryStorage};
use ledger_recon::{patterns, JournalEntryBuilder, Ledger, Money, NewStatementLine};

const BANK_ACCOUNT: &str = "6222-0001";

fn date(day: u32) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    NaiveDate::from_ymd_opt(2024, 3, day).ok_or_else(|| format!("invalid day {}", day).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    println!("🏦 Ledger Recon - Month-end Reconciliation Example\n");

    let ledger = Ledger::new(MemoryStorage::new());
    let scale = ledger.config().currency.minor_unit_scale;

    // 1. Chart of accounts and bank account mapping
    println!("📊 Setting up Chart of Accounts...");
    let subjects = ledger.setup_standard_chart_of_accounts().await?;
    let mut codes: Vec<_> = subjects.values().collect();
    codes.sort_by(|a, b| a.code.cmp(&b.code));
    for subject in codes {
        println!(
            "  ✓ {} {} ({:?})",
            subject.code, subject.name, subject.subject_type
        );
    }
    ledger
        .register_bank_account(BANK_ACCOUNT, "Industrial Bank", &subjects["bank"].id)
        .await?;
    println!();

    // 2. Book the month
    println!("🧾 Posting Journal Entries...");
    let entries = vec![
        patterns::create_owner_investment(
            "je001".to_string(),
            date(1)?,
            "Owner capital".to_string(),
            subjects["bank"].id.clone(),
            subjects["paid_in_capital"].id.clone(),
            Money::parse("50000.00", scale)?,
        )?,
        patterns::create_sales_receipt(
            "je002".to_string(),
            date(8)?,
            "Invoice 1001 settled".to_string(),
            subjects["bank"].id.clone(),
            subjects["sales_revenue"].id.clone(),
            Money::parse("1200.00", scale)?,
        )?,
        patterns::create_sales_receipt(
            "je003".to_string(),
            date(9)?,
            "Invoice 1002 settled".to_string(),
            subjects["bank"].id.clone(),
            subjects["sales_revenue"].id.clone(),
            Money::parse("800.00", scale)?,
        )?,
        JournalEntryBuilder::new("je004".to_string(), date(28)?, "Office rent".to_string())
            .created_by("demo".to_string())
            .debit(subjects["admin_expense"].id.clone(), Money::parse("3000.00", scale)?, None)
            .credit(subjects["bank"].id.clone(), Money::parse("3000.00", scale)?, None)
            .build()?,
    ];
    for entry in entries {
        let id = entry.id.clone();
        let saved = ledger.save_entry(entry).await?;
        ledger.post_entry(&id).await?;
        println!(
            "  ✓ {} {} {}",
            saved.voucher_no.clone().unwrap_or_default(),
            saved.memo,
            saved.total_debits().format(scale)
        );
    }
    println!();

    // 3. Import the bank statement
    println!("📥 Importing Bank Statement...");
    let imported = ledger
        .import_statement_lines(vec![
            NewStatementLine::new(BANK_ACCOUNT, date(1)?, Money::parse("50000.00", scale)?, "Capital injection"),
            NewStatementLine::new(BANK_ACCOUNT, date(10)?, Money::parse("2000.00", scale)?, "Customer remittances"),
            NewStatementLine::new(BANK_ACCOUNT, date(31)?, Money::parse("-15.00", scale)?, "Service fee"),
        ])
        .await?;
    println!("  ✓ {} statement lines imported\n", imported.len());

    // 4. Auto-match
    println!("🔗 Matching...");
    let result = ledger.auto_match(BANK_ACCOUNT, date(1)?, date(31)?).await?;
    for record in &result.matches {
        let lines: Vec<String> = record.journal_lines.iter().map(|l| l.to_string()).collect();
        println!(
            "  ✓ {:?} match {} -> {}",
            record.kind,
            record.amount.format(scale),
            lines.join(", ")
        );
    }
    println!(
        "  {} of {} statement lines matched\n",
        result.matched_count, result.statements_considered
    );

    // 5. Reconciliation report
    println!("📋 Reconciliation Report (2024-03-31)...");
    let report = ledger
        .generate_reconciliation_report(
            BANK_ACCOUNT,
            date(31)?,
            Money::parse("51985.00", scale)?,
            "demo",
        )
        .await?;
    println!("  Bank balance:          {}", report.bank_balance.format(scale));
    println!("  Book balance:          {}", report.book_balance.format(scale));
    for item in report.bank_only_items.iter().chain(&report.book_only_items) {
        println!(
            "    {:?} {} {} {}",
            item.side,
            item.date,
            item.amount.format(scale),
            item.description
        );
    }
    println!("  Adjusted bank balance: {}", report.adjusted_bank_balance.format(scale));
    println!("  Adjusted book balance: {}", report.adjusted_book_balance.format(scale));
    println!("  Status:                {:?}\n", report.status);

    // 6. Financial statements
    println!("📈 Financial Statements...");
    let balance_sheet = ledger.generate_balance_sheet(date(31)?).await?;
    println!(
        "  Assets {} = Liabilities {} + Equity {} ({})",
        balance_sheet.total_assets.format(scale),
        balance_sheet.total_liabilities.format(scale),
        balance_sheet.total_equity.format(scale),
        if balance_sheet.is_balanced { "balanced" } else { "NOT balanced" }
    );

    let income = ledger.generate_income_statement(date(1)?, date(31)?).await?;
    println!("  Net income: {}", income.net_income.format(scale));

    let cash_flow = ledger.generate_cash_flow(date(1)?, date(31)?).await?;
    println!(
        "  Cash flow: operating {}, investing {}, financing {}",
        cash_flow.net_operating_cash_flow.format(scale),
        cash_flow.net_investing_cash_flow.format(scale),
        cash_flow.net_financing_cash_flow.format(scale)
    );

    Ok(())
}
