// In crates/risk/src/ledger.rs

use crate::{BudgetAllocator, Error, Result};
use core_types::{BudgetLedger, Symbol};
use rust_decimal::Decimal;

impl BudgetAllocator for BudgetLedger {
    fn available_for(&self, symbol: &Symbol) -> Decimal {
        let committed_elsewhere: Decimal = self
            .committed_per_symbol
            .iter()
            .filter(|(s, _)| *s != symbol)
            .map(|(_, amount)| *amount)
            .sum();
        let remaining = (self.total_budget - committed_elsewhere).max(Decimal::ZERO);
        self.per_trade_cap.min(remaining)
    }

    fn commit(&mut self, symbol: &Symbol, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidParameters(format!(
                "commitment for {symbol} must be positive, got {amount}"
            )));
        }
        let current = self.committed(symbol);
        let new_symbol_total = current + amount;
        let new_total = self.total_committed() + amount;

        if new_symbol_total > self.per_trade_cap || new_total > self.total_budget {
            let available = (self.available_for(symbol) - current).max(Decimal::ZERO);
            return Err(Error::BudgetExceeded {
                symbol: symbol.clone(),
                requested: amount,
                available,
            });
        }

        self.committed_per_symbol.insert(symbol.clone(), new_symbol_total);
        tracing::debug!(%symbol, %amount, committed = %new_symbol_total, "Capital committed.");
        Ok(())
    }

    fn release(&mut self, symbol: &Symbol, amount: Decimal) -> Decimal {
        let current = self.committed(symbol);
        let released = amount.max(Decimal::ZERO).min(current);
        let remaining = current - released;

        if remaining.is_zero() {
            self.committed_per_symbol.remove(symbol);
        } else {
            self.committed_per_symbol.insert(symbol.clone(), remaining);
        }
        if released < amount {
            tracing::warn!(%symbol, requested = %amount, %released, "Release exceeded the committed amount.");
        }
        released
    }

    fn rebase(&mut self, total_budget: Decimal, per_trade_cap: Decimal) -> Result<()> {
        if total_budget <= Decimal::ZERO || per_trade_cap <= Decimal::ZERO {
            return Err(Error::InvalidParameters("budget and cap must be positive".into()));
        }
        if self.total_committed() > total_budget {
            return Err(Error::InvalidParameters(format!(
                "total budget {total_budget} is below committed capital {}",
                self.total_committed()
            )));
        }
        if let Some((symbol, amount)) =
            self.committed_per_symbol.iter().find(|(_, amount)| **amount > per_trade_cap)
        {
            return Err(Error::InvalidParameters(format!(
                "per-trade cap {per_trade_cap} is below the {amount} committed to {symbol}"
            )));
        }
        self.total_budget = total_budget;
        self.per_trade_cap = per_trade_cap;
        Ok(())
    }
}
