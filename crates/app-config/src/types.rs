// In crates/app-config/src/types.rs

use core_types::Symbol;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use strategies::RsiReversalSettings;

use crate::{Error, Result};

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// Settings for the exchange REST API.
    pub exchange: ExchangeSettings,
    /// The trading parameters handed to every cycle.
    pub trading: TradingConfig,
    /// Where state and cycle records are persisted.
    pub storage: StorageSettings,
    /// Fill simulation used when live trading is disabled.
    #[serde(default)]
    pub paper: PaperSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Real orders are only sent when this is true; otherwise the paper exchange fills them.
    #[serde(default)]
    pub live_trading_enabled: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExchangeSettings {
    /// The API key for the exchange.
    #[serde(default)]
    pub api_key: String,
    /// The secret key for the exchange.
    #[serde(default)]
    pub secret_key: String,
    /// The REST API base URL.
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,
    /// Deadline for every exchange call; an elapsed call counts as failed.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
}

/// The immutable trading configuration a cycle runs with.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TradingConfig {
    /// Symbols in processing order.
    pub symbols: Vec<Symbol>,
    #[serde(default = "default_candle_interval")]
    pub candle_interval: String,
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u16,
    pub total_budget: Decimal,
    pub per_trade_cap: Decimal,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_buy_threshold")]
    pub rsi_buy_threshold: f64,
    #[serde(default = "default_rsi_sell_threshold")]
    pub rsi_sell_threshold: f64,
    #[serde(default = "default_min_order_quote")]
    pub min_order_quote: Decimal,
    /// Upper bound on simultaneously open positions; unlimited when absent.
    #[serde(default)]
    pub max_open_positions: Option<usize>,
}

impl TradingConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::Invalid(msg));

        if self.symbols.is_empty() {
            return invalid("trading.symbols must list at least one symbol".into());
        }
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if symbol.0.trim().is_empty() {
                return invalid("trading.symbols contains an empty symbol".into());
            }
            if !seen.insert(symbol.exchange_code()) {
                return invalid(format!("trading.symbols lists {symbol} more than once"));
            }
        }
        if self.total_budget <= Decimal::ZERO || self.per_trade_cap <= Decimal::ZERO {
            return invalid("total_budget and per_trade_cap must be positive".into());
        }
        if self.per_trade_cap > self.total_budget {
            return invalid(format!(
                "per_trade_cap {} exceeds total_budget {}",
                self.per_trade_cap, self.total_budget
            ));
        }
        for (name, pct) in [("take_profit_pct", self.take_profit_pct), ("stop_loss_pct", self.stop_loss_pct)] {
            if pct <= Decimal::ZERO || pct >= Decimal::ONE {
                return invalid(format!("{name} must be between 0 and 1, got {pct}"));
            }
        }
        if self.rsi_period == 0 {
            return invalid("rsi_period must be greater than 0".into());
        }
        // The exchange returns the still-forming candle as the last one and it is dropped.
        let required = self.rsi_settings().required_candles() + 1;
        if usize::from(self.candle_limit) < required {
            return invalid(format!(
                "candle_limit {} is too small for rsi_period {}; at least {required} are needed",
                self.candle_limit, self.rsi_period
            ));
        }
        if !(0.0..=100.0).contains(&self.rsi_buy_threshold)
            || !(0.0..=100.0).contains(&self.rsi_sell_threshold)
            || self.rsi_buy_threshold >= self.rsi_sell_threshold
        {
            return invalid("RSI thresholds must satisfy 0 <= buy < sell <= 100".into());
        }
        if self.min_order_quote < Decimal::ZERO {
            return invalid("min_order_quote must not be negative".into());
        }
        if self.max_open_positions == Some(0) {
            return invalid("max_open_positions must be at least 1 when set".into());
        }
        Ok(())
    }

    /// The decision-engine view of this configuration.
    pub fn rsi_settings(&self) -> RsiReversalSettings {
        RsiReversalSettings {
            rsi_period: self.rsi_period,
            buy_threshold: self.rsi_buy_threshold,
            sell_threshold: self.rsi_sell_threshold,
            per_trade_cap: self.per_trade_cap,
            min_order_quote: self.min_order_quote,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Postgres,
    Github,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Key (file name, row key or repository path stem) of the trading state.
    #[serde(default = "default_state_key")]
    pub state_key: String,
    pub file: Option<FileStorageSettings>,
    pub postgres: Option<PostgresSettings>,
    pub github: Option<GithubSettings>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FileStorageSettings {
    pub dir: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PostgresSettings {
    /// The connection URL for the PostgreSQL database.
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GithubSettings {
    pub token: String,
    /// `owner/name` of the results repository.
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PaperSettings {
    /// Adverse price move applied to every simulated fill (e.g. 0.0005 for 0.05%).
    #[serde(default)]
    pub slippage_pct: Decimal,
    /// Fee charged on every simulated fill (e.g. 0.001 for 0.1%).
    #[serde(default)]
    pub taker_fee_pct: Decimal,
    /// Fraction of every order that fills.
    #[serde(default = "default_fill_ratio")]
    pub fill_ratio: Decimal,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            slippage_pct: Decimal::ZERO,
            taker_fee_pct: Decimal::ZERO,
            fill_ratio: Decimal::ONE,
        }
    }
}

/// Helper functions for serde defaults
fn default_log_level() -> String { "info".into() }
fn default_rest_base_url() -> String { "https://api.binance.com".into() }
fn default_request_timeout_secs() -> u64 { 10 }
fn default_recv_window_ms() -> u64 { 5_000 }
fn default_candle_interval() -> String { "15m".into() }
fn default_candle_limit() -> u16 { 100 }
fn default_rsi_period() -> usize { 14 }
fn default_rsi_buy_threshold() -> f64 { 30.0 }
fn default_rsi_sell_threshold() -> f64 { 70.0 }
fn default_min_order_quote() -> Decimal { Decimal::new(1, 1) }
fn default_state_key() -> String { "trading_state".into() }
fn default_max_connections() -> u32 { 5 }
fn default_branch() -> String { "main".into() }
fn default_github_api_url() -> String { "https://api.github.com".into() }
fn default_fill_ratio() -> Decimal { Decimal::ONE }
