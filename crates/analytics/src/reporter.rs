// In crates/analytics/src/reporter.rs

use crate::types::{BudgetSnapshot, CycleRecord, CycleStatus, SymbolOutcome};
use chrono::{DateTime, Utc};
use core_types::{BudgetLedger, CycleId, Decision, Symbol};
use execution::FillReport;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Collects decisions and fills as the cycle runs and folds them into a `CycleRecord`.
///
/// Pure aggregation: it never touches the trading state and never fails.
#[derive(Debug)]
pub struct CycleReporter {
    cycle_id: CycleId,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    symbols: Vec<SymbolOutcome>,
    realized_pnl: Decimal,
}

impl CycleReporter {
    pub fn new(cycle_id: CycleId, started_at: DateTime<Utc>) -> Self {
        Self { cycle_id, run_id: Uuid::new_v4(), started_at, symbols: Vec::new(), realized_pnl: Decimal::ZERO }
    }

    fn outcome_mut(&mut self, symbol: &Symbol) -> &mut SymbolOutcome {
        match self.symbols.iter().position(|s| &s.symbol == symbol) {
            Some(i) => &mut self.symbols[i],
            None => {
                self.symbols.push(SymbolOutcome::new(symbol.clone()));
                let last = self.symbols.len() - 1;
                &mut self.symbols[last]
            }
        }
    }

    /// Records the market view that produced a decision.
    pub fn record_decision(&mut self, symbol: &Symbol, price: Option<Decimal>, rsi: Option<f64>, decision: Decision) {
        let outcome = self.outcome_mut(symbol);
        outcome.price = price;
        outcome.rsi = rsi;
        outcome.decision = Some(decision);
    }

    pub fn record_fill(&mut self, fill: &FillReport) {
        if let Some(pnl) = fill.realized_pnl {
            self.realized_pnl += pnl;
        }
        self.outcome_mut(&fill.symbol).fill = Some(fill.clone());
    }

    pub fn record_error(&mut self, symbol: &Symbol, error: impl ToString) {
        self.outcome_mut(symbol).error = Some(error.to_string());
    }

    /// Closes the record. `ledger` is the last state known to be consistent; `None` when the state
    /// never loaded.
    pub fn finish(
        self,
        status: CycleStatus,
        ledger: Option<&BudgetLedger>,
        open_positions: usize,
        failure: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> CycleRecord {
        let record = CycleRecord {
            cycle_id: self.cycle_id,
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at,
            status,
            symbols: self.symbols,
            realized_pnl: self.realized_pnl,
            budget: ledger.map(BudgetSnapshot::from),
            open_positions,
            failure,
        };
        tracing::info!(
            cycle_id = %record.cycle_id,
            status = ?record.status,
            fills = record.fills().count(),
            realized_pnl = %record.realized_pnl,
            "Cycle finished."
        );
        record
    }
}
