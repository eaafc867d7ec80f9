// In crates/execution/src/simulated.rs

use crate::types::SimulationSettings;
use api_client::{Error, Exchange, Result};
use async_trait::async_trait;
use core_types::{FillStatus, Kline, OrderAmount, OrderFill, OrderRequest, Side, Symbol};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};

/// Paper trading: market data comes from a real exchange, orders are filled locally.
///
/// Fills happen at the live price moved against the order by the slippage, with the taker fee
/// folded into the average price so that `filled_quantity * avg_price` is the quote amount that
/// actually left (or reached) the account.
pub struct PaperExchange {
    market: Box<dyn Exchange>,
    settings: SimulationSettings,
    next_order_id: AtomicU64,
}

impl PaperExchange {
    pub fn new(market: Box<dyn Exchange>, settings: SimulationSettings) -> Self {
        Self { market, settings, next_order_id: AtomicU64::new(1) }
    }

    fn simulate(&self, order: &OrderRequest, market_price: Decimal, order_id: String) -> OrderFill {
        let ratio = self.settings.fill_ratio.clamp(Decimal::ZERO, Decimal::ONE);
        if ratio.is_zero() || market_price <= Decimal::ZERO {
            return OrderFill::failed(Some(order_id));
        }
        let slippage = self.settings.slippage_percent;
        let fee = self.settings.taker_fee;

        let (filled_quantity, avg_price) = match (order.side, order.amount) {
            // Slippage makes a buy more expensive; the fee is paid out of the quote spent.
            (Side::Buy, OrderAmount::Quote(quote)) => {
                let execution_price = market_price * (Decimal::ONE + slippage);
                let spent = quote * ratio;
                let quantity = spent * (Decimal::ONE - fee) / execution_price;
                (quantity, execution_price / (Decimal::ONE - fee))
            }
            (Side::Buy, OrderAmount::Base(quantity)) => {
                let execution_price = market_price * (Decimal::ONE + slippage);
                (quantity * ratio, execution_price * (Decimal::ONE + fee))
            }
            // Slippage makes a sell cheaper; the fee is taken from the proceeds.
            (Side::Sell, amount) => {
                let execution_price = market_price * (Decimal::ONE - slippage);
                let quantity = match amount {
                    OrderAmount::Base(q) => q * ratio,
                    OrderAmount::Quote(q) => q * ratio / execution_price,
                };
                (quantity, execution_price * (Decimal::ONE - fee))
            }
        };

        OrderFill {
            order_id: Some(order_id),
            status: if ratio == Decimal::ONE { FillStatus::Filled } else { FillStatus::Partial },
            filled_quantity,
            avg_price,
        }
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn name(&self) -> &'static str {
        "PaperExchange"
    }

    async fn get_candles(&self, symbol: &Symbol, interval: &str, count: u16) -> Result<Vec<Kline>> {
        self.market.get_candles(symbol, interval, count).await
    }

    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal> {
        self.market.get_price(symbol).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderFill> {
        if self.settings.taker_fee >= Decimal::ONE {
            return Err(Error::Unavailable("paper taker fee must be below 100%".into()));
        }
        let price = self.market.get_price(&order.symbol).await?;
        let order_id = format!("paper-{}", self.next_order_id.fetch_add(1, Ordering::Relaxed));
        let fill = self.simulate(order, price, order_id);
        tracing::info!(
            symbol = %order.symbol,
            side = %order.side,
            market_price = %price,
            quantity = %fill.filled_quantity,
            avg_price = %fill.avg_price,
            "Simulated fill."
        );
        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::ScriptedExchange;
    use rust_decimal_macros::dec;

    fn paper(fee: Decimal, slippage: Decimal, ratio: Decimal) -> PaperExchange {
        let market = ScriptedExchange::new();
        market.set_price(&Symbol::new("BTCUSDT"), dec!(100));
        PaperExchange::new(
            Box::new(market),
            SimulationSettings { taker_fee: fee, slippage_percent: slippage, fill_ratio: ratio },
        )
    }

    #[tokio::test]
    async fn test_frictionless_buy_fills_at_market() {
        let exchange = paper(Decimal::ZERO, Decimal::ZERO, Decimal::ONE);
        let fill = exchange
            .place_order(&OrderRequest::market_buy(Symbol::new("BTCUSDT"), dec!(10)))
            .await
            .unwrap();
        assert_eq!(fill.status, FillStatus::Filled);
        assert_eq!(fill.filled_quantity, dec!(0.1));
        assert_eq!(fill.avg_price, dec!(100));
        assert_eq!(fill.order_id.as_deref(), Some("paper-1"));
    }

    #[tokio::test]
    async fn test_buy_spends_requested_quote_including_costs() {
        let exchange = paper(dec!(0.001), dec!(0.01), Decimal::ONE);
        let fill = exchange
            .place_order(&OrderRequest::market_buy(Symbol::new("BTCUSDT"), dec!(10)))
            .await
            .unwrap();
        assert!(fill.avg_price > dec!(101));
        assert_eq!(fill.quote_value().round_dp(10), dec!(10));
    }

    #[tokio::test]
    async fn test_sell_receives_less_than_market() {
        let exchange = paper(dec!(0.001), dec!(0.01), Decimal::ONE);
        let fill = exchange
            .place_order(&OrderRequest::market_sell(Symbol::new("BTCUSDT"), dec!(0.1)))
            .await
            .unwrap();
        assert_eq!(fill.filled_quantity, dec!(0.1));
        assert_eq!(fill.avg_price, dec!(98.901));
    }

    #[tokio::test]
    async fn test_fill_ratio_produces_partials() {
        let exchange = paper(Decimal::ZERO, Decimal::ZERO, dec!(0.6));
        let fill = exchange
            .place_order(&OrderRequest::market_buy(Symbol::new("BTCUSDT"), dec!(10)))
            .await
            .unwrap();
        assert_eq!(fill.status, FillStatus::Partial);
        assert_eq!(fill.quote_value(), dec!(6));
    }

    #[tokio::test]
    async fn test_zero_ratio_fails() {
        let exchange = paper(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        let fill = exchange
            .place_order(&OrderRequest::market_buy(Symbol::new("BTCUSDT"), dec!(10)))
            .await
            .unwrap();
        assert!(!fill.has_traded());
    }
}
