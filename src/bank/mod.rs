//! Bank statement ingestion and lookup

pub mod statement;

pub use statement::*;
