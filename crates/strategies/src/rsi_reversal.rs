// In crates/strategies/src/rsi_reversal.rs

use crate::types::RsiReversalSettings;
use crate::{Error, MarketSnapshot, Result, Strategy};
use core_types::{Decision, HoldReason, Kline};
use rust_decimal::Decimal;

/// RSI momentum-reversal: buy oversold, sell overbought, with take-profit and stop-loss guards.
///
/// Exit precedence is fixed: stop-loss, then take-profit, then the RSI signal. A symbol that is
/// already open is never entered again.
#[derive(Debug, Clone)]
pub struct RsiReversal {
    settings: RsiReversalSettings,
}

impl RsiReversal {
    pub fn new(settings: RsiReversalSettings) -> Result<Self> {
        if settings.rsi_period == 0 {
            return Err(Error::InvalidParameters("rsi_period must be greater than 0".into()));
        }
        if !(0.0..=100.0).contains(&settings.buy_threshold)
            || !(0.0..=100.0).contains(&settings.sell_threshold)
            || settings.buy_threshold >= settings.sell_threshold
        {
            return Err(Error::InvalidParameters(format!(
                "thresholds must satisfy 0 <= buy ({}) < sell ({}) <= 100",
                settings.buy_threshold, settings.sell_threshold
            )));
        }
        if settings.per_trade_cap <= Decimal::ZERO {
            return Err(Error::InvalidParameters("per_trade_cap must be positive".into()));
        }
        Ok(Self { settings })
    }

    /// Computes this strategy's indicator over `klines`.
    pub fn signal(&self, klines: &[Kline]) -> Result<f64> {
        crate::relative_strength_index(klines, self.settings.rsi_period)
    }

    fn decide_entry(&self, snapshot: &MarketSnapshot<'_>) -> Decision {
        let Some(rsi) = snapshot.rsi else {
            return Decision::hold(HoldReason::InsufficientData);
        };
        if rsi >= self.settings.buy_threshold {
            return Decision::hold(HoldReason::NoSignal);
        }
        if let Some(reason) = snapshot.entry_block {
            return Decision::hold(reason);
        }
        if snapshot.available <= Decimal::ZERO {
            return Decision::hold(HoldReason::BudgetExhausted);
        }
        let quote_amount = snapshot.available.min(self.settings.per_trade_cap);
        if quote_amount < self.settings.min_order_quote {
            return Decision::hold(HoldReason::BelowMinimumOrder);
        }
        Decision::Enter { quote_amount }
    }
}

impl Strategy for RsiReversal {
    fn name(&self) -> &'static str {
        "RsiReversal"
    }

    fn decide(&self, snapshot: &MarketSnapshot<'_>) -> Decision {
        let Some(position) = snapshot.state.open_position() else {
            return self.decide_entry(snapshot);
        };

        // Price guards do not depend on the indicator, so they fire even without candles.
        if snapshot.price <= position.stop_loss_price {
            return Decision::ExitStopLoss;
        }
        if snapshot.price >= position.take_profit_price {
            return Decision::ExitTakeProfit;
        }
        match snapshot.rsi {
            Some(rsi) if rsi > self.settings.sell_threshold => Decision::ExitSignal,
            Some(_) => Decision::hold(HoldReason::NoSignal),
            None => Decision::hold(HoldReason::InsufficientData),
        }
    }
}
