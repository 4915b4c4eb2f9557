//! Bank reconciliation: statement matching and reconciliation reports

pub mod matcher;
pub mod report;

pub use matcher::*;
pub use report::*;
