// In crates/core-types/src/state.rs

use crate::{Error, Result, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of one cycle: wall-clock milliseconds, bumped past the previous id when the clock
/// has not advanced (or went backwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(pub i64);

impl CycleId {
    pub fn next(now_ms: i64, previous: Option<CycleId>) -> Self {
        match previous {
            Some(prev) if prev.0 >= now_ms => CycleId(prev.0 + 1),
            _ => CycleId(now_ms),
        }
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fields that only exist while a position is held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub entry_price: Decimal,
    /// Base-asset quantity currently held.
    pub quantity: Decimal,
    pub entry_timestamp: DateTime<Utc>,
    pub take_profit_price: Decimal,
    pub stop_loss_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "position_status", rename_all = "UPPERCASE")]
pub enum PositionStatus {
    #[default]
    Flat,
    Open(OpenPosition),
}

/// Position state of one tracked symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolState {
    pub symbol: Symbol,
    #[serde(flatten)]
    pub position: PositionStatus,
    pub last_cycle_id: Option<CycleId>,
}

impl SymbolState {
    pub fn flat(symbol: Symbol) -> Self {
        Self { symbol, position: PositionStatus::Flat, last_cycle_id: None }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.position, PositionStatus::Open(_))
    }

    pub fn open_position(&self) -> Option<&OpenPosition> {
        match &self.position {
            PositionStatus::Open(pos) => Some(pos),
            PositionStatus::Flat => None,
        }
    }
}

/// Capital at risk per symbol, bounded by the total budget and the per-trade cap.
///
/// The allocation rules (`available_for`, `commit`, `release`) live in the `risk` crate; this is
/// only the persisted shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLedger {
    pub total_budget: Decimal,
    pub per_trade_cap: Decimal,
    #[serde(default)]
    pub committed_per_symbol: BTreeMap<Symbol, Decimal>,
}

impl BudgetLedger {
    pub fn new(total_budget: Decimal, per_trade_cap: Decimal) -> Self {
        Self { total_budget, per_trade_cap, committed_per_symbol: BTreeMap::new() }
    }

    pub fn committed(&self, symbol: &Symbol) -> Decimal {
        self.committed_per_symbol.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total_committed(&self) -> Decimal {
        self.committed_per_symbol.values().copied().sum()
    }
}

/// Everything the agent remembers between invocations. Loaded and saved as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingState {
    pub ledger: BudgetLedger,
    #[serde(default)]
    pub symbols: BTreeMap<Symbol, SymbolState>,
    #[serde(default)]
    pub last_cycle_id: Option<CycleId>,
}

impl TradingState {
    /// First-run state: nothing open, nothing committed.
    pub fn new(total_budget: Decimal, per_trade_cap: Decimal) -> Self {
        Self {
            ledger: BudgetLedger::new(total_budget, per_trade_cap),
            symbols: BTreeMap::new(),
            last_cycle_id: None,
        }
    }

    /// The state of `symbol`; unseen symbols are flat.
    pub fn symbol(&self, symbol: &Symbol) -> SymbolState {
        self.symbols
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| SymbolState::flat(symbol.clone()))
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &SymbolState> {
        self.symbols.values().filter(|s| s.is_open())
    }

    pub fn open_position_count(&self) -> usize {
        self.open_positions().count()
    }

    /// Checks the invariants a freshly loaded state must satisfy.
    pub fn validate(&self) -> Result<()> {
        let ledger = &self.ledger;
        if ledger.total_budget < Decimal::ZERO || ledger.per_trade_cap < Decimal::ZERO {
            return Err(Error::InvalidState("budget and cap must be non-negative".into()));
        }
        for (symbol, amount) in &ledger.committed_per_symbol {
            if *amount < Decimal::ZERO {
                return Err(Error::InvalidState(format!("negative commitment for {symbol}")));
            }
            if *amount > ledger.per_trade_cap {
                return Err(Error::InvalidState(format!(
                    "commitment {amount} for {symbol} exceeds per-trade cap {}",
                    ledger.per_trade_cap
                )));
            }
        }
        if ledger.total_committed() > ledger.total_budget {
            return Err(Error::InvalidState(format!(
                "total commitment {} exceeds budget {}",
                ledger.total_committed(),
                ledger.total_budget
            )));
        }
        for (key, state) in &self.symbols {
            if key != &state.symbol {
                return Err(Error::InvalidState(format!(
                    "state keyed {key} describes {}",
                    state.symbol
                )));
            }
            if let Some(pos) = state.open_position() {
                if pos.quantity <= Decimal::ZERO {
                    return Err(Error::InvalidState(format!("open {key} with quantity {}", pos.quantity)));
                }
                if pos.entry_price <= Decimal::ZERO {
                    return Err(Error::InvalidState(format!("open {key} without an entry price")));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open(symbol: &str, quantity: Decimal) -> SymbolState {
        SymbolState {
            symbol: Symbol::new(symbol),
            position: PositionStatus::Open(OpenPosition {
                entry_price: dec!(100),
                quantity,
                entry_timestamp: Utc::now(),
                take_profit_price: dec!(105),
                stop_loss_price: dec!(98),
            }),
            last_cycle_id: Some(CycleId(1)),
        }
    }

    #[test]
    fn test_cycle_id_follows_clock() {
        assert_eq!(CycleId::next(1_000, None), CycleId(1_000));
        assert_eq!(CycleId::next(1_000, Some(CycleId(500))), CycleId(1_000));
    }

    #[test]
    fn test_cycle_id_stays_monotonic_when_clock_lags() {
        assert_eq!(CycleId::next(1_000, Some(CycleId(1_000))), CycleId(1_001));
        assert_eq!(CycleId::next(900, Some(CycleId(1_000))), CycleId(1_001));
    }

    #[test]
    fn test_unseen_symbol_is_flat() {
        let state = TradingState::new(dec!(40), dec!(10));
        let s = state.symbol(&Symbol::new("BTCUSDT"));
        assert!(!s.is_open());
        assert_eq!(s.symbol, Symbol::new("BTCUSDT"));
    }

    #[test]
    fn test_symbol_state_json_shape() {
        let json = serde_json::to_value(open("ETHUSDT", dec!(0.1))).unwrap();
        assert_eq!(json["position_status"], "OPEN");
        assert_eq!(json["entry_price"], "100");
        assert_eq!(json["quantity"], "0.1");

        let flat = serde_json::to_value(SymbolState::flat(Symbol::new("ETHUSDT"))).unwrap();
        assert_eq!(flat["position_status"], "FLAT");
        assert!(flat.get("entry_price").is_none());
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut state = TradingState::new(dec!(40), dec!(10));
        state.symbols.insert(Symbol::new("ETHUSDT"), open("ETHUSDT", dec!(0.1)));
        state.ledger.committed_per_symbol.insert(Symbol::new("ETHUSDT"), dec!(10));
        state.last_cycle_id = Some(CycleId(42));

        let text = serde_json::to_string(&state).unwrap();
        let back: TradingState = serde_json::from_str(&text).unwrap();
        assert_eq!(back, state);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_overcommitted_ledger() {
        let mut state = TradingState::new(dec!(15), dec!(10));
        state.ledger.committed_per_symbol.insert(Symbol::new("A"), dec!(10));
        state.ledger.committed_per_symbol.insert(Symbol::new("B"), dec!(10));
        assert!(matches!(state.validate(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_validate_rejects_empty_open_position() {
        let mut state = TradingState::new(dec!(40), dec!(10));
        state.symbols.insert(Symbol::new("A"), open("A", Decimal::ZERO));
        assert!(state.validate().is_err());
    }
}
