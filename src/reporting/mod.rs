//! Financial statements derived from posted journal entries

pub mod financial;

pub use financial::*;
