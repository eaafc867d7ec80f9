// In crates/strategies/src/types.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RsiReversalSettings {
    /// RSI lookback (N). The indicator needs N + 1 candles.
    pub rsi_period: usize,
    /// Enter when RSI falls below this level.
    pub buy_threshold: f64,
    /// Exit an open position when RSI rises above this level.
    pub sell_threshold: f64,
    /// Largest quote amount committed to a single symbol.
    pub per_trade_cap: Decimal,
    /// Smallest quote amount worth sending to the exchange.
    pub min_order_quote: Decimal,
}

impl RsiReversalSettings {
    /// Closed candles the indicator needs before it yields a value.
    pub fn required_candles(&self) -> usize {
        self.rsi_period + 1
    }
}
