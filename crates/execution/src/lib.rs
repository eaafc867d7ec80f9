// In crates/execution/src/lib.rs

use api_client::{Exchange, with_timeout};
use chrono::{DateTime, Utc};
use core_types::{
    CycleId, Decision, OpenPosition, OrderFill, OrderRequest, PositionStatus, Side, Symbol, SymbolState,
    TradingState,
};
use risk::BudgetAllocator;
use rust_decimal::Decimal;

pub mod error;
pub mod simulated;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use simulated::PaperExchange;
pub use types::{ExecutionSettings, FillReport, SimulationSettings};

/// Turns decisions into orders and orders into state transitions.
///
/// This is the only place `SymbolState` and the budget ledger change. Every transition is built on
/// a copy of the state and swapped in once complete, so a failed or timed-out order leaves the
/// caller's state exactly as it was.
pub struct ExecutionCoordinator<'a> {
    exchange: &'a dyn Exchange,
    settings: ExecutionSettings,
}

impl<'a> ExecutionCoordinator<'a> {
    pub fn new(exchange: &'a dyn Exchange, settings: ExecutionSettings) -> Self {
        Self { exchange, settings }
    }

    /// Executes `decision` for `symbol`, mutating `state` only on a fill.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` for `Hold`.
    /// * `Ok(Some(report))` when an order traded, fully or partially.
    /// * `Err(_)` when nothing traded; `state` is untouched.
    pub async fn execute(
        &self,
        decision: &Decision,
        state: &mut TradingState,
        symbol: &Symbol,
        cycle_id: CycleId,
        now: DateTime<Utc>,
    ) -> Result<Option<FillReport>> {
        match decision {
            Decision::Hold { .. } => Ok(None),
            Decision::Enter { quote_amount } => {
                self.enter(*quote_amount, state, symbol, cycle_id, now).await.map(Some)
            }
            Decision::ExitTakeProfit | Decision::ExitStopLoss | Decision::ExitSignal => {
                self.exit(state, symbol, cycle_id).await.map(Some)
            }
        }
    }

    async fn submit(&self, order: &OrderRequest) -> Result<OrderFill> {
        tracing::info!(symbol = %order.symbol, side = %order.side, amount = %order.amount.value(), "Placing order.");
        let fill = with_timeout(self.settings.order_timeout, self.exchange.place_order(order))
            .await
            .map_err(|e| match e {
                api_client::Error::Timeout(after) => Error::OrderTimeout { symbol: order.symbol.clone(), after },
                other => Error::Exchange(other),
            })?;

        if !fill.has_traded() {
            return Err(Error::OrderFailed {
                symbol: order.symbol.clone(),
                reason: format!("nothing filled (order id {:?})", fill.order_id),
            });
        }
        tracing::info!(
            symbol = %order.symbol,
            status = ?fill.status,
            quantity = %fill.filled_quantity,
            avg_price = %fill.avg_price,
            "Order filled."
        );
        Ok(fill)
    }

    async fn enter(
        &self,
        quote_amount: Decimal,
        state: &mut TradingState,
        symbol: &Symbol,
        cycle_id: CycleId,
        now: DateTime<Utc>,
    ) -> Result<FillReport> {
        if state.symbol(symbol).is_open() {
            return Err(Error::InvalidDecision(format!("{symbol} already holds a position")));
        }
        let available = state.ledger.available_for(symbol);
        if quote_amount <= Decimal::ZERO || quote_amount > available {
            return Err(risk::Error::BudgetExceeded {
                symbol: symbol.clone(),
                requested: quote_amount,
                available,
            }
            .into());
        }

        let order = OrderRequest::market_buy(symbol.clone(), quote_amount);
        let fill = self.submit(&order).await?;

        // Commit what was actually spent. Fees or rounding may push it past the request by a
        // hair; the ledger never exceeds what was available.
        let spent = fill.quote_value();
        let committed = spent.min(available);
        let entry_price = fill.avg_price;
        let position = OpenPosition {
            entry_price,
            quantity: fill.filled_quantity,
            entry_timestamp: now,
            take_profit_price: entry_price * (Decimal::ONE + self.settings.take_profit_pct),
            stop_loss_price: entry_price * (Decimal::ONE - self.settings.stop_loss_pct),
        };

        let mut next = state.clone();
        let committed = match next.ledger.commit(symbol, committed) {
            Ok(()) => committed,
            Err(e) => {
                // The order traded, so the position is tracked whatever the ledger still allows.
                let headroom = (next.ledger.per_trade_cap - next.ledger.committed(symbol))
                    .min(next.ledger.total_budget - next.ledger.total_committed())
                    .min(committed)
                    .max(Decimal::ZERO);
                tracing::error!(
                    %symbol,
                    error = %e,
                    %spent,
                    %headroom,
                    "Filled entry does not fit the ledger; committing the remaining headroom."
                );
                if headroom > Decimal::ZERO && next.ledger.commit(symbol, headroom).is_ok() {
                    headroom
                } else {
                    Decimal::ZERO
                }
            }
        };
        next.symbols.insert(
            symbol.clone(),
            SymbolState {
                symbol: symbol.clone(),
                position: PositionStatus::Open(position.clone()),
                last_cycle_id: Some(cycle_id),
            },
        );
        *state = next;

        tracing::info!(
            %symbol,
            entry_price = %position.entry_price,
            quantity = %position.quantity,
            take_profit = %position.take_profit_price,
            stop_loss = %position.stop_loss_price,
            %committed,
            "Position opened."
        );
        Ok(FillReport {
            symbol: symbol.clone(),
            side: Side::Buy,
            order_id: fill.order_id.clone(),
            status: fill.status,
            requested: order.amount,
            filled_quantity: fill.filled_quantity,
            avg_price: fill.avg_price,
            quote_value: spent,
            committed,
            released: Decimal::ZERO,
            realized_pnl: None,
            remaining_quantity: position.quantity,
        })
    }

    async fn exit(&self, state: &mut TradingState, symbol: &Symbol, cycle_id: CycleId) -> Result<FillReport> {
        let position = state
            .symbol(symbol)
            .open_position()
            .cloned()
            .ok_or_else(|| Error::InvalidDecision(format!("{symbol} has no position to exit")))?;

        let order = OrderRequest::market_sell(symbol.clone(), position.quantity);
        let fill = self.submit(&order).await?;

        let sold = fill.filled_quantity.min(position.quantity);
        let remaining = position.quantity - sold;
        let realized_pnl = (fill.avg_price - position.entry_price) * sold;
        let committed = state.ledger.committed(symbol);
        let to_release = if remaining.is_zero() {
            committed
        } else {
            committed * sold / position.quantity
        };

        let mut next = state.clone();
        let released = next.ledger.release(symbol, to_release);
        let status = if remaining.is_zero() {
            PositionStatus::Flat
        } else {
            PositionStatus::Open(OpenPosition { quantity: remaining, ..position.clone() })
        };
        next.symbols.insert(
            symbol.clone(),
            SymbolState { symbol: symbol.clone(), position: status, last_cycle_id: Some(cycle_id) },
        );
        *state = next;

        if remaining.is_zero() {
            tracing::info!(%symbol, exit_price = %fill.avg_price, %realized_pnl, %released, "Position closed.");
        } else {
            tracing::warn!(%symbol, %sold, %remaining, %realized_pnl, %released, "Position partially closed.");
        }
        Ok(FillReport {
            symbol: symbol.clone(),
            side: Side::Sell,
            order_id: fill.order_id.clone(),
            status: fill.status,
            requested: order.amount,
            filled_quantity: sold,
            avg_price: fill.avg_price,
            quote_value: sold * fill.avg_price,
            committed: Decimal::ZERO,
            released,
            realized_pnl: Some(realized_pnl),
            remaining_quantity: remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::{ScriptedExchange, ScriptedFill};
    use core_types::FillStatus;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn settings() -> ExecutionSettings {
        ExecutionSettings {
            take_profit_pct: dec!(0.05),
            stop_loss_pct: dec!(0.02),
            order_timeout: Duration::from_millis(200),
        }
    }

    fn sym() -> Symbol {
        Symbol::new("BTCUSDT")
    }

    fn fresh() -> TradingState {
        TradingState::new(dec!(40), dec!(10))
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    async fn open_at_100(exchange: &ScriptedExchange, state: &mut TradingState) {
        exchange.set_price(&sym(), dec!(100));
        let coordinator = ExecutionCoordinator::new(exchange, settings());
        coordinator
            .execute(&Decision::Enter { quote_amount: dec!(10) }, state, &sym(), CycleId(1), now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_enter_opens_position_and_commits() {
        let exchange = ScriptedExchange::new();
        let mut state = fresh();
        open_at_100(&exchange, &mut state).await;

        let pos = state.symbol(&sym()).open_position().cloned().unwrap();
        assert_eq!(pos.entry_price, dec!(100));
        assert_eq!(pos.quantity, dec!(0.1));
        assert_eq!(pos.take_profit_price, dec!(105));
        assert_eq!(pos.stop_loss_price, dec!(98));
        assert_eq!(state.ledger.committed(&sym()), dec!(10));
        assert_eq!(state.symbol(&sym()).last_cycle_id, Some(CycleId(1)));
    }

    #[tokio::test]
    async fn test_partial_entry_commits_only_what_filled() {
        let exchange = ScriptedExchange::new();
        exchange.set_price(&sym(), dec!(100));
        exchange.push_fill(&sym(), ScriptedFill::Ratio(dec!(0.6)));
        let mut state = fresh();

        let report = ExecutionCoordinator::new(&exchange, settings())
            .execute(&Decision::Enter { quote_amount: dec!(10) }, &mut state, &sym(), CycleId(1), now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.status, FillStatus::Partial);
        assert_eq!(report.committed, dec!(6));
        assert_eq!(state.ledger.committed(&sym()), dec!(6));
        assert_eq!(state.symbol(&sym()).open_position().unwrap().quantity, dec!(0.06));
    }

    #[tokio::test]
    async fn test_fill_beyond_ledger_is_still_tracked() {
        let exchange = ScriptedExchange::new();
        exchange.set_price(&sym(), dec!(100));
        let mut state = fresh();
        // Flat but carrying a stale commitment: the ledger can only take 5 more.
        state.ledger.committed_per_symbol.insert(sym(), dec!(5));

        let report = ExecutionCoordinator::new(&exchange, settings())
            .execute(&Decision::Enter { quote_amount: dec!(10) }, &mut state, &sym(), CycleId(1), now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.quote_value, dec!(10));
        assert_eq!(report.committed, dec!(5));
        assert_eq!(state.ledger.committed(&sym()), dec!(10));
        assert_eq!(state.symbol(&sym()).open_position().unwrap().quantity, dec!(0.1));
        assert!(state.validate().is_ok());
    }

    #[tokio::test]
    async fn test_rejected_order_leaves_state_untouched() {
        let exchange = ScriptedExchange::new();
        exchange.set_price(&sym(), dec!(100));
        exchange.push_fill(&sym(), ScriptedFill::Reject);
        let mut state = fresh();
        let before = state.clone();

        let err = ExecutionCoordinator::new(&exchange, settings())
            .execute(&Decision::Enter { quote_amount: dec!(10) }, &mut state, &sym(), CycleId(1), now())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::OrderFailed { .. }));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_hung_order_times_out_without_mutation() {
        let exchange = ScriptedExchange::new();
        exchange.set_price(&sym(), dec!(100));
        exchange.push_fill(&sym(), ScriptedFill::Hang);
        let mut state = fresh();
        let before = state.clone();

        let err = ExecutionCoordinator::new(&exchange, settings())
            .execute(&Decision::Enter { quote_amount: dec!(10) }, &mut state, &sym(), CycleId(1), now())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::OrderTimeout { .. }));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_enter_beyond_available_is_refused_before_ordering() {
        let exchange = ScriptedExchange::new();
        exchange.set_price(&sym(), dec!(100));
        let mut state = TradingState::new(dec!(5), dec!(5));

        let err = ExecutionCoordinator::new(&exchange, settings())
            .execute(&Decision::Enter { quote_amount: dec!(10) }, &mut state, &sym(), CycleId(1), now())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Budget(risk::Error::BudgetExceeded { .. })));
        assert!(exchange.orders().is_empty());
    }

    #[tokio::test]
    async fn test_full_exit_goes_flat_and_releases_commitment() {
        let exchange = ScriptedExchange::new();
        let mut state = fresh();
        open_at_100(&exchange, &mut state).await;
        exchange.set_price(&sym(), dec!(105));

        let report = ExecutionCoordinator::new(&exchange, settings())
            .execute(&Decision::ExitTakeProfit, &mut state, &sym(), CycleId(2), now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.realized_pnl, Some(dec!(0.5)));
        assert_eq!(report.released, dec!(10));
        assert!(!state.symbol(&sym()).is_open());
        assert_eq!(state.ledger.total_committed(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_partial_exit_keeps_residual_open() {
        let exchange = ScriptedExchange::new();
        let mut state = fresh();
        open_at_100(&exchange, &mut state).await;
        exchange.set_price(&sym(), dec!(98));
        exchange.push_fill(&sym(), ScriptedFill::Ratio(dec!(0.4)));

        let report = ExecutionCoordinator::new(&exchange, settings())
            .execute(&Decision::ExitStopLoss, &mut state, &sym(), CycleId(2), now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.filled_quantity, dec!(0.04));
        assert_eq!(report.realized_pnl, Some(dec!(-0.08)));
        assert_eq!(report.released, dec!(4));
        let pos = state.symbol(&sym()).open_position().cloned().unwrap();
        assert_eq!(pos.quantity, dec!(0.06));
        assert_eq!(pos.entry_price, dec!(100));
        assert_eq!(state.ledger.committed(&sym()), dec!(6));
    }

    #[tokio::test]
    async fn test_exit_without_position_is_invalid() {
        let exchange = ScriptedExchange::new();
        let mut state = fresh();
        let err = ExecutionCoordinator::new(&exchange, settings())
            .execute(&Decision::ExitSignal, &mut state, &sym(), CycleId(1), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDecision(_)));
        assert!(exchange.orders().is_empty());
    }

    #[tokio::test]
    async fn test_open_symbol_is_never_reentered() {
        let exchange = ScriptedExchange::new();
        let mut state = fresh();
        open_at_100(&exchange, &mut state).await;

        let err = ExecutionCoordinator::new(&exchange, settings())
            .execute(&Decision::Enter { quote_amount: dec!(10) }, &mut state, &sym(), CycleId(2), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDecision(_)));
        assert_eq!(exchange.orders().len(), 1);
    }
}
