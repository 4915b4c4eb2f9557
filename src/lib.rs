//! # Ledger Recon
//!
//! A double-entry ledger with bank reconciliation, built on an async storage trait.
//!
//! ## Features
//!
//! - **Double-entry bookkeeping**: draft and posted journal entries, debit = credit enforced in minor units
//! - **Chart of accounts**: asset, liability, equity, revenue and expense subjects with enable/disable
//! - **Bank statements**: batch import, statistics and listing per bank account
//! - **Reconciliation**: two-pass auto-matching, manual matching and persisted reconciliation reports
//! - **Financial reporting**: balance sheet, income statement, cash flow and trial balance
//! - **Storage abstraction**: conditional writes and snapshot reads behind `LedgerStorage`
//!
//! ## Quick Start
//!
//! ```rust
//! use ledger_recon::{Money, DEFAULT_MINOR_UNIT_SCALE};
//!
//! let amount = Money::parse("100.00", DEFAULT_MINOR_UNIT_SCALE).unwrap();
//! assert_eq!(amount.minor_units(), 10_000);
//!
//! // Engine services are async and share one storage handle:
//! // let ledger = Ledger::new(MemoryStorage::new());
//! // ledger.save_entry(entry).await?;
//! // ledger.post_entry("je1").await?;
//! ```

pub mod bank;
pub mod config;
pub mod ledger;
pub mod reconciliation;
pub mod reporting;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use bank::*;
pub use config::*;
pub use ledger::*;
pub use reconciliation::*;
pub use reporting::*;
pub use traits::*;
pub use types::*;

// Re-export entry patterns for convenience
pub use ledger::journal::patterns;
