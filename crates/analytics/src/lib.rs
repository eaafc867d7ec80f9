// In crates/analytics/src/lib.rs

pub mod reporter;
pub mod types;

pub use reporter::CycleReporter;
pub use types::{BudgetSnapshot, CycleRecord, CycleStatus, SymbolOutcome};
