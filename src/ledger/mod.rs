//! Ledger module containing subject management and journal entry processing

pub mod core;
pub mod journal;
pub mod subject;

pub use core::*;
pub use journal::*;
pub use subject::*;
