// In crates/execution/src/types.rs

use core_types::{FillStatus, OrderAmount, Side, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters the coordinator applies to every fill.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    /// Deadline for a single order submission.
    pub order_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSettings {
    /// The taker fee for the exchange (e.g., 0.001 for 0.1%).
    pub taker_fee: Decimal,

    /// The simulated slippage percentage for market orders (e.g., 0.0005 for 0.05%).
    pub slippage_percent: Decimal,

    /// Fraction of each order that fills; below 1 every fill is partial.
    pub fill_ratio: Decimal,
}

/// What one executed order did to the state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillReport {
    pub symbol: Symbol,
    pub side: Side,
    pub order_id: Option<String>,
    pub status: FillStatus,
    pub requested: OrderAmount,
    pub filled_quantity: Decimal,
    pub avg_price: Decimal,
    /// Quote currency actually spent (buys) or received (sells).
    pub quote_value: Decimal,
    /// Capital added to the symbol's commitment.
    pub committed: Decimal,
    /// Capital returned to the pool.
    pub released: Decimal,
    /// Set on exits: `(exit - entry) * sold quantity`.
    pub realized_pnl: Option<Decimal>,
    /// Quantity still held after the order.
    pub remaining_quantity: Decimal,
}
