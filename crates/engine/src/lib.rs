// In crates/engine/src/lib.rs

pub mod error;

use analytics::{CycleRecord, CycleReporter, CycleStatus};
use api_client::{Exchange, with_timeout};
use app_config::TradingConfig;
use chrono::{DateTime, Utc};
use core_types::{CycleId, Decision, HoldReason, Symbol, TradingState};
use database::{LoadedState, StateStore};
use execution::{ExecutionCoordinator, ExecutionSettings};
use risk::BudgetAllocator;
use rust_decimal::Decimal;
use std::time::Duration;
use strategies::{MarketSnapshot, RsiReversal, Strategy};

pub use error::{Error, Result};

/// Runs exactly one trading cycle per call.
///
/// A cycle loads the persisted state, evaluates every configured symbol in order, executes what
/// the strategy decides, checkpoints the state after every fill and writes one `CycleRecord`.
/// Nothing is kept in memory between cycles.
pub struct Engine {
    config: TradingConfig,
    exchange: Box<dyn Exchange>,
    store: StateStore,
    strategy: RsiReversal,
    request_timeout: Duration,
}

/// Where a symbol comes from in this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Configured,
    /// Still held in the state but no longer configured: exits only.
    ExitOnly,
}

impl Engine {
    pub fn new(
        config: TradingConfig,
        exchange: Box<dyn Exchange>,
        store: StateStore,
        request_timeout: Duration,
    ) -> Result<Self> {
        let strategy = RsiReversal::new(config.rsi_settings())?;
        Ok(Self { config, exchange, store, strategy, request_timeout })
    }

    fn initial_state(&self) -> TradingState {
        TradingState::new(self.config.total_budget, self.config.per_trade_cap)
    }

    /// The persisted state, without trading.
    pub async fn status(&self) -> Result<LoadedState> {
        self.store.load(|| self.initial_state()).await.map_err(Error::StateLoad)
    }

    pub async fn run_cycle(&self) -> Result<CycleRecord> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Runs one cycle as if the wall clock read `now`.
    ///
    /// # Returns
    ///
    /// * `Ok(record)` when the cycle ran to the end or stopped on a concurrent modification.
    /// * `Err(_)` only when the state could not be loaded or saved.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleRecord> {
        let LoadedState { mut state, mut version } = match self.store.load(|| self.initial_state()).await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!(error = %e, "Could not load trading state.");
                let reporter = CycleReporter::new(CycleId::next(now.timestamp_millis(), None), now);
                self.finish(reporter, CycleStatus::Failed, None, Some(e.to_string())).await;
                return Err(Error::StateLoad(e));
            }
        };

        let cycle_id = CycleId::next(now.timestamp_millis(), state.last_cycle_id);
        let mut reporter = CycleReporter::new(cycle_id, now);
        tracing::info!(
            %cycle_id,
            strategy = self.strategy.name(),
            exchange = self.exchange.name(),
            storage = self.store.backend_name(),
            "Starting cycle."
        );

        self.adopt_budget_limits(&mut state);
        state.last_cycle_id = Some(cycle_id);

        // Claim the cycle before any order: a concurrent run shows up here, not after a fill.
        match self.store.save(&state, &version).await {
            Ok(v) => version = v,
            Err(e) if e.is_conflict() => {
                tracing::warn!(%cycle_id, error = %e, "Another run owns the state; skipping this cycle.");
                return Ok(self.finish(reporter, CycleStatus::Conflict, Some(&state), Some(e.to_string())).await);
            }
            Err(e) => {
                tracing::error!(%cycle_id, error = %e, "Could not claim the cycle.");
                self.finish(reporter, CycleStatus::Failed, Some(&state), Some(e.to_string())).await;
                return Err(Error::StateSave(e));
            }
        }

        let coordinator = ExecutionCoordinator::new(
            self.exchange.as_ref(),
            ExecutionSettings {
                take_profit_pct: self.config.take_profit_pct,
                stop_loss_pct: self.config.stop_loss_pct,
                order_timeout: self.request_timeout,
            },
        );

        let mut status = CycleStatus::Completed;
        let mut failure = None;
        for (symbol, scope) in self.symbols_for(&state) {
            let decision = self.evaluate(&state, &symbol, scope, &mut reporter).await;
            if !decision.is_actionable() {
                continue;
            }

            match coordinator.execute(&decision, &mut state, &symbol, cycle_id, now).await {
                Ok(Some(fill)) => reporter.record_fill(&fill),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(%symbol, %decision, error = %e, "Order not executed.");
                    reporter.record_error(&symbol, &e);
                    continue;
                }
            }

            match self.store.save(&state, &version).await {
                Ok(v) => version = v,
                Err(e) if e.is_conflict() => {
                    tracing::warn!(%cycle_id, %symbol, error = %e, "State changed underneath the cycle; stopping.");
                    status = CycleStatus::Conflict;
                    failure = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    tracing::error!(%cycle_id, %symbol, error = %e, "Could not persist fill.");
                    self.finish(reporter, CycleStatus::Failed, Some(&state), Some(e.to_string())).await;
                    return Err(Error::StateSave(e));
                }
            }
        }

        Ok(self.finish(reporter, status, Some(&state), failure).await)
    }

    /// Configured symbols in order, then held symbols that were dropped from the configuration.
    fn symbols_for(&self, state: &TradingState) -> Vec<(Symbol, Scope)> {
        let mut symbols: Vec<(Symbol, Scope)> =
            self.config.symbols.iter().map(|s| (s.clone(), Scope::Configured)).collect();
        for held in state.open_positions() {
            if !self.config.symbols.contains(&held.symbol) {
                tracing::info!(symbol = %held.symbol, "Managing exits for a symbol no longer configured.");
                symbols.push((held.symbol.clone(), Scope::ExitOnly));
            }
        }
        symbols
    }

    /// Gathers market data for one symbol and asks the strategy for a decision.
    async fn evaluate(
        &self,
        state: &TradingState,
        symbol: &Symbol,
        scope: Scope,
        reporter: &mut CycleReporter,
    ) -> Decision {
        let price = match with_timeout(self.request_timeout, self.exchange.get_price(symbol)).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(%symbol, error = %e, "Price unavailable.");
                let decision = Decision::hold(HoldReason::MarketDataUnavailable);
                reporter.record_decision(symbol, None, None, decision);
                reporter.record_error(symbol, &e);
                return decision;
            }
        };

        let candles = with_timeout(
            self.request_timeout,
            self.exchange.get_candles(symbol, &self.config.candle_interval, self.config.candle_limit),
        )
        .await;
        let rsi = match candles {
            Ok(klines) => match self.strategy.signal(&klines) {
                Ok(rsi) => Some(rsi),
                Err(e) => {
                    tracing::warn!(%symbol, error = %e, "RSI not computable.");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(%symbol, error = %e, "Candles unavailable.");
                None
            }
        };

        let symbol_state = state.symbol(symbol);
        let entry_block = match scope {
            Scope::ExitOnly => Some(HoldReason::EntriesDisabled),
            Scope::Configured => self
                .config
                .max_open_positions
                .filter(|max| state.open_position_count() >= *max)
                .map(|_| HoldReason::MaxOpenPositions),
        };
        let snapshot = MarketSnapshot {
            state: &symbol_state,
            rsi,
            price,
            available: state.ledger.available_for(symbol),
            entry_block,
        };
        let decision = self.strategy.decide(&snapshot);

        tracing::info!(%symbol, %price, rsi = ?rsi, %decision, "Decision.");
        reporter.record_decision(symbol, Some(price), rsi, decision);
        decision
    }

    /// Follows the configured budget limits when the committed capital still fits under them.
    fn adopt_budget_limits(&self, state: &mut TradingState) {
        let (total, cap) = (self.config.total_budget, self.config.per_trade_cap);
        if state.ledger.total_budget == total && state.ledger.per_trade_cap == cap {
            return;
        }
        match state.ledger.rebase(total, cap) {
            Ok(()) => tracing::info!(%total, %cap, "Adopted new budget limits."),
            Err(e) => tracing::warn!(
                error = %e,
                persisted_total = %state.ledger.total_budget,
                persisted_cap = %state.ledger.per_trade_cap,
                "Configured budget does not cover committed capital; keeping persisted limits."
            ),
        }
    }

    /// Closes and stores the cycle record. A failed write is logged and otherwise ignored.
    async fn finish(
        &self,
        reporter: CycleReporter,
        status: CycleStatus,
        state: Option<&TradingState>,
        failure: Option<String>,
    ) -> CycleRecord {
        let open_positions = state.map_or(0, TradingState::open_position_count);
        let record = reporter.finish(status, state.map(|s| &s.ledger), open_positions, failure, Utc::now());
        if let Err(e) = self.store.append_record(&record.name(), &record).await {
            tracing::error!(cycle_id = %record.cycle_id, error = %e, "Failed to write cycle record.");
        }
        record
    }
}

/// Quote capital not committed to any position.
pub fn uncommitted(state: &TradingState) -> Decimal {
    (state.ledger.total_budget - state.ledger.total_committed()).max(Decimal::ZERO)
}

