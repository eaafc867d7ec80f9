// In crates/strategies/src/lib.rs

use core_types::{Decision, HoldReason, SymbolState};
use rust_decimal::Decimal;

pub mod error;
pub mod rsi;
pub mod rsi_reversal;
pub mod types;

pub use error::{Error, Result};
pub use rsi::relative_strength_index;
pub use rsi_reversal::RsiReversal;
pub use types::RsiReversalSettings;

/// Everything a strategy may look at when deciding for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct MarketSnapshot<'a> {
    pub state: &'a SymbolState,
    /// `None` when the indicator could not be computed this cycle.
    pub rsi: Option<f64>,
    pub price: Decimal,
    /// Capital the budget allocator would allow this symbol to commit.
    pub available: Decimal,
    /// Set when entries are ruled out regardless of the signal.
    pub entry_block: Option<HoldReason>,
}

/// The universal interface for a trading strategy.
///
/// A strategy turns a symbol's persisted state plus this cycle's market snapshot into exactly one
/// `Decision`. Strategies hold no state of their own between cycles; everything they need is in
/// the snapshot.
pub trait Strategy: Send + Sync {
    /// The name of the strategy.
    fn name(&self) -> &'static str;

    fn decide(&self, snapshot: &MarketSnapshot<'_>) -> Decision;
}
