// In crates/risk/src/lib.rs

use core_types::Symbol;
use rust_decimal::Decimal;

pub mod error;
pub mod ledger;

// Re-export public types
pub use error::{Error, Result};

/// The universal interface for budget allocation.
///
/// A `BudgetAllocator` tracks capital at risk against a global budget and a per-symbol cap.
/// Released capital is always the amount originally committed, never the proceeds, so the
/// allocator reflects exposure rather than running profit.
pub trait BudgetAllocator {
    /// Capital `symbol` may commit right now:
    /// `min(per_trade_cap, total_budget - committed by every other symbol)`, never negative.
    fn available_for(&self, symbol: &Symbol) -> Decimal;

    /// Adds `amount` to the symbol's commitment.
    ///
    /// # Returns
    ///
    /// * `Err(Error::BudgetExceeded)` if the total budget or the per-trade cap would be exceeded;
    ///   the ledger is left untouched in that case.
    fn commit(&mut self, symbol: &Symbol, amount: Decimal) -> Result<()>;

    /// Returns up to `amount` of the symbol's commitment to the pool and reports how much was
    /// actually released.
    fn release(&mut self, symbol: &Symbol, amount: Decimal) -> Decimal;

    /// Adopts new limits if they still cover everything already committed.
    fn rebase(&mut self, total_budget: Decimal, per_trade_cap: Decimal) -> Result<()>;
}
