// In crates/api-client/src/scripted.rs

//! A deterministic in-memory exchange.
//!
//! Candles, prices and the outcome of each order are scripted up front, which makes whole trading
//! cycles reproducible without a network. Orders with no scripted outcome fill completely at the
//! current price.

use crate::{Error, Exchange, Result};
use async_trait::async_trait;
use core_types::{FillStatus, Kline, OrderAmount, OrderFill, OrderRequest, Symbol};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const CANDLE_MS: i64 = 15 * 60 * 1000;

/// The scripted outcome of the next order for a symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedFill {
    /// Fill this fraction of the requested size at the current price.
    Ratio(Decimal),
    /// Fill an explicit quantity at an explicit average price.
    Exact { quantity: Decimal, avg_price: Decimal },
    /// The exchange refuses the order.
    Reject,
    /// The exchange never answers.
    Hang,
    /// The exchange cannot be reached.
    Unreachable,
}

#[derive(Debug, Default)]
struct Book {
    candles: HashMap<Symbol, Vec<Kline>>,
    prices: HashMap<Symbol, Decimal>,
    fills: HashMap<Symbol, VecDeque<ScriptedFill>>,
    unreachable: HashSet<Symbol>,
    orders: Vec<OrderRequest>,
    next_order_id: u64,
}

#[derive(Debug, Default)]
pub struct ScriptedExchange {
    book: Mutex<Book>,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scripts candles with the given closes, 15 minutes apart, and sets the price to the last close.
    pub fn set_closes(&self, symbol: &Symbol, closes: &[Decimal]) {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, close)| Kline {
                open_time: i as i64 * CANDLE_MS,
                open: *close,
                high: *close,
                low: *close,
                close: *close,
                volume: Decimal::ONE,
                close_time: (i as i64 + 1) * CANDLE_MS - 1,
            })
            .collect();
        let mut book = self.book();
        book.candles.insert(symbol.clone(), candles);
        if let Some(last) = closes.last() {
            book.prices.insert(symbol.clone(), *last);
        }
    }

    pub fn set_price(&self, symbol: &Symbol, price: Decimal) {
        self.book().prices.insert(symbol.clone(), price);
    }

    /// Queues the outcome of the next order placed for `symbol`.
    pub fn push_fill(&self, symbol: &Symbol, fill: ScriptedFill) {
        self.book().fills.entry(symbol.clone()).or_default().push_back(fill);
    }

    /// Makes every call for `symbol` fail as if the exchange were down.
    pub fn set_unreachable(&self, symbol: &Symbol) {
        self.book().unreachable.insert(symbol.clone());
    }

    /// Every order submitted so far, in order.
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.book().orders.clone()
    }

    fn check_reachable(&self, symbol: &Symbol) -> Result<()> {
        if self.book().unreachable.contains(symbol) {
            return Err(Error::Unavailable(format!("{symbol} is unreachable")));
        }
        Ok(())
    }
}

fn fill_at(order: &OrderRequest, ratio: Decimal, price: Decimal, order_id: String) -> OrderFill {
    let ratio = ratio.clamp(Decimal::ZERO, Decimal::ONE);
    if ratio.is_zero() || price <= Decimal::ZERO {
        return OrderFill::failed(Some(order_id));
    }
    let filled_quantity = match order.amount {
        OrderAmount::Quote(quote) => quote * ratio / price,
        OrderAmount::Base(quantity) => quantity * ratio,
    };
    OrderFill {
        order_id: Some(order_id),
        status: if ratio == Decimal::ONE { FillStatus::Filled } else { FillStatus::Partial },
        filled_quantity,
        avg_price: price,
    }
}

#[async_trait]
impl Exchange for ScriptedExchange {
    fn name(&self) -> &'static str {
        "ScriptedExchange"
    }

    async fn get_candles(&self, symbol: &Symbol, _interval: &str, count: u16) -> Result<Vec<Kline>> {
        self.check_reachable(symbol)?;
        let book = self.book();
        let candles = book.candles.get(symbol).cloned().unwrap_or_default();
        let skip = candles.len().saturating_sub(count as usize);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal> {
        self.check_reachable(symbol)?;
        self.book()
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::ApiError { code: -1121, msg: format!("no price for {symbol}") })
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderFill> {
        self.check_reachable(&order.symbol)?;
        let (script, price, order_id) = {
            let mut book = self.book();
            book.orders.push(order.clone());
            book.next_order_id += 1;
            let order_id = book.next_order_id.to_string();
            let script = book
                .fills
                .get_mut(&order.symbol)
                .and_then(VecDeque::pop_front)
                .unwrap_or(ScriptedFill::Ratio(Decimal::ONE));
            let price = book.prices.get(&order.symbol).copied().unwrap_or_default();
            (script, price, order_id)
        };

        match script {
            ScriptedFill::Ratio(ratio) => Ok(fill_at(order, ratio, price, order_id)),
            ScriptedFill::Exact { quantity, avg_price } => Ok(OrderFill {
                order_id: Some(order_id),
                status: FillStatus::Partial,
                filled_quantity: quantity,
                avg_price,
            }),
            ScriptedFill::Reject => Ok(OrderFill::failed(Some(order_id))),
            ScriptedFill::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Unavailable("scripted hang ended".into()))
            }
            ScriptedFill::Unreachable => Err(Error::Unavailable("connection refused".into())),
        }
    }
}
