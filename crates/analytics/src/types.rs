// In crates/analytics/src/types.rs

use chrono::{DateTime, Utc};
use core_types::{BudgetLedger, CycleId, Decision, Symbol};
use execution::FillReport;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Every symbol was evaluated and the state was saved.
    Completed,
    /// Another run wrote the state first; remaining symbols were skipped.
    Conflict,
    /// The state could not be loaded or saved.
    Failed,
}

/// What happened to one symbol during the cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolOutcome {
    pub symbol: Symbol,
    pub price: Option<Decimal>,
    pub rsi: Option<f64>,
    pub decision: Option<Decision>,
    pub fill: Option<FillReport>,
    /// Set when the symbol's action failed (order rejected, timeout, unreachable exchange).
    pub error: Option<String>,
}

impl SymbolOutcome {
    pub(crate) fn new(symbol: Symbol) -> Self {
        Self { symbol, price: None, rsi: None, decision: None, fill: None, error: None }
    }
}

/// The ledger as it stood when the cycle ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSnapshot {
    pub total_budget: Decimal,
    pub per_trade_cap: Decimal,
    pub committed_per_symbol: BTreeMap<Symbol, Decimal>,
    pub total_committed: Decimal,
    pub uncommitted: Decimal,
}

impl From<&BudgetLedger> for BudgetSnapshot {
    fn from(ledger: &BudgetLedger) -> Self {
        let total_committed = ledger.total_committed();
        Self {
            total_budget: ledger.total_budget,
            per_trade_cap: ledger.per_trade_cap,
            committed_per_symbol: ledger.committed_per_symbol.clone(),
            total_committed,
            uncommitted: ledger.total_budget - total_committed,
        }
    }
}

/// Append-only summary of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub cycle_id: CycleId,
    /// Distinguishes overlapping runs that derived the same cycle id.
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: CycleStatus,
    pub symbols: Vec<SymbolOutcome>,
    pub realized_pnl: Decimal,
    pub budget: Option<BudgetSnapshot>,
    pub open_positions: usize,
    pub failure: Option<String>,
}

impl CycleRecord {
    /// Unique name the record is stored under, e.g. `cycle_1700000000000_3f2a9c1e`.
    pub fn name(&self) -> String {
        let run = self.run_id.simple().to_string();
        format!("cycle_{}_{}", self.cycle_id, &run[..8])
    }

    pub fn fills(&self) -> impl Iterator<Item = &FillReport> {
        self.symbols.iter().filter_map(|s| s.fill.as_ref())
    }

    pub fn outcome(&self, symbol: &Symbol) -> Option<&SymbolOutcome> {
        self.symbols.iter().find(|s| &s.symbol == symbol)
    }
}
