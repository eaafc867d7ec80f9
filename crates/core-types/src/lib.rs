// In crates/core-types/src/lib.rs

pub mod error;
pub mod state;
pub mod types;

// Re-export the most important types for easy access from other crates.
pub use error::{Error, Result};
pub use state::{
    BudgetLedger, CycleId, OpenPosition, PositionStatus, SymbolState, TradingState,
};
pub use types::{
    Decision, FillStatus, HoldReason, Kline, OrderAmount, OrderFill, OrderRequest, Side, Symbol,
};
