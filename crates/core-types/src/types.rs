// In crates/core-types/src/types.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trading pair as configured, e.g. `BTC/USDT` or `BTCUSDT`.
///
/// Identity is the exchange pair: `BTC/USDT`, `btc/usdt` and `BTCUSDT` compare, order and hash
/// as the same symbol. The configured spelling is kept for display and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// The concatenated form exchanges expect on the wire (`BTC/USDT` -> `BTCUSDT`).
    pub fn exchange_code(&self) -> String {
        self.canonical_chars().collect()
    }

    fn canonical_chars(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars().filter(|c| *c != '/').flat_map(char::to_uppercase)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_chars().eq(other.canonical_chars())
    }
}

impl Eq for Symbol {}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical_chars().cmp(other.canonical_chars())
    }
}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.exchange_code().hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single candlestick. Sequences are ordered oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

/// How much to trade: buys are sized in quote currency, sells in base quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum OrderAmount {
    Quote(Decimal),
    Base(Decimal),
}

impl OrderAmount {
    pub fn value(&self) -> Decimal {
        match self {
            OrderAmount::Quote(v) | OrderAmount::Base(v) => *v,
        }
    }
}

/// An immediate (market) order to submit to the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub amount: OrderAmount,
}

impl OrderRequest {
    pub fn market_buy(symbol: Symbol, quote_amount: Decimal) -> Self {
        Self { symbol, side: Side::Buy, amount: OrderAmount::Quote(quote_amount) }
    }

    pub fn market_sell(symbol: Symbol, quantity: Decimal) -> Self {
        Self { symbol, side: Side::Sell, amount: OrderAmount::Base(quantity) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FillStatus {
    Filled,
    Partial,
    Failed,
}

/// The exchange's answer to an order: what actually traded, and at what average price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub order_id: Option<String>,
    pub status: FillStatus,
    /// Base-asset quantity that actually traded.
    pub filled_quantity: Decimal,
    /// Volume-weighted average fill price in quote currency.
    pub avg_price: Decimal,
}

impl OrderFill {
    pub fn failed(order_id: Option<String>) -> Self {
        Self {
            order_id,
            status: FillStatus::Failed,
            filled_quantity: Decimal::ZERO,
            avg_price: Decimal::ZERO,
        }
    }

    /// Quote currency that changed hands.
    pub fn quote_value(&self) -> Decimal {
        self.filled_quantity * self.avg_price
    }

    /// A fill is usable when something traded at a positive price, whatever the reported status.
    pub fn has_traded(&self) -> bool {
        self.status != FillStatus::Failed
            && self.filled_quantity > Decimal::ZERO
            && self.avg_price > Decimal::ZERO
    }
}

/// Why a symbol was left alone this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// The indicator gave no reason to act.
    NoSignal,
    /// Not enough candles (or no candles) to compute the indicator.
    InsufficientData,
    /// No capacity left in the budget for this symbol.
    BudgetExhausted,
    /// Allocated size is below the exchange's minimum order value.
    BelowMinimumOrder,
    /// The configured cap on simultaneously open positions is reached.
    MaxOpenPositions,
    /// The symbol is no longer configured; only exits are managed.
    EntriesDisabled,
    /// The current price could not be fetched.
    MarketDataUnavailable,
}

/// The action chosen for one symbol in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Enter { quote_amount: Decimal },
    #[serde(rename = "EXIT_TP")]
    ExitTakeProfit,
    #[serde(rename = "EXIT_SL")]
    ExitStopLoss,
    ExitSignal,
    Hold { reason: HoldReason },
}

impl Decision {
    pub fn hold(reason: HoldReason) -> Self {
        Decision::Hold { reason }
    }

    /// True when the decision requires an order.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Decision::Hold { .. })
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Enter { quote_amount } => write!(f, "ENTER({quote_amount})"),
            Decision::ExitTakeProfit => f.write_str("EXIT_TP"),
            Decision::ExitStopLoss => f.write_str("EXIT_SL"),
            Decision::ExitSignal => f.write_str("EXIT_SIGNAL"),
            Decision::Hold { reason } => write!(f, "HOLD({reason:?})"),
        }
    }
}
