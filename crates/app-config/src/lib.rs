// In crates/app-config/src/lib.rs

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};

pub mod error;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::{Settings, StorageBackend, TradingConfig};

/// Loads the application settings from various sources.
///
/// This function orchestrates the layered configuration loading:
/// 1. Reads from a default `base.toml` file.
/// 2. Merges settings from an environment-specific file (e.g., `development.toml`).
/// 3. Merges settings from environment variables.
///
/// This is the only place the process environment is consulted; everything downstream receives
/// the resulting `Settings`.
pub fn load_settings() -> Result<Settings> {
    // Get the current environment. Default to "development" if not set.
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());
    load_settings_from("config", &environment)
}

/// Same as [`load_settings`], reading `base.toml` and `{environment}.toml` from `config_dir`.
pub fn load_settings_from(config_dir: &str, environment: &str) -> Result<Settings> {
    let builder = Config::builder()
        // 1. Load the base configuration file.
        .add_source(File::with_name(&format!("{}/base", config_dir)))
        // 2. Load the environment-specific configuration file.
        .add_source(File::with_name(&format!("{}/{}", config_dir, environment)).required(false))
        // 3. Load settings from environment variables (e.g., `APP_EXCHANGE__API_KEY=...`).
        // The prefix is `APP`, separator is `__`; `APP_TRADING__SYMBOLS` is a comma-separated list.
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("trading.symbols")
                .try_parsing(true),
        );
    build(builder)
}

/// Deserializes and validates the merged configuration.
fn build(builder: ConfigBuilder<DefaultState>) -> Result<Settings> {
    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.trading.validate()?;
    validate_storage(&settings)?;
    Ok(settings)
}

fn validate_storage(settings: &Settings) -> Result<()> {
    let storage = &settings.storage;
    let missing = match storage.backend {
        StorageBackend::File if storage.file.is_none() => Some("storage.file"),
        StorageBackend::Postgres if storage.postgres.is_none() => Some("storage.postgres"),
        StorageBackend::Github if storage.github.is_none() => Some("storage.github"),
        _ => None,
    };
    match missing {
        Some(section) => Err(Error::Invalid(format!(
            "storage backend {:?} selected but [{}] is missing",
            storage.backend, section
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use core_types::Symbol;
    use rust_decimal_macros::dec;

    const BASE: &str = r#"
        [app]
        environment = "test"

        [exchange]
        api_key = "k"
        secret_key = "s"

        [trading]
        symbols = ["SHIB/USDT", "DOGE/USDT", "BTC/USDT"]
        total_budget = 40.0
        per_trade_cap = 10.0
        take_profit_pct = 0.05
        stop_loss_pct = 0.02

        [storage]
        backend = "file"

        [storage.file]
        dir = "state"
    "#;

    fn parse(toml: &str) -> Result<Settings> {
        build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn test_defaults_are_applied() {
        let settings = parse(BASE).unwrap();
        let trading = &settings.trading;
        assert_eq!(trading.symbols[0], Symbol::new("SHIB/USDT"));
        assert_eq!(trading.candle_interval, "15m");
        assert_eq!(trading.rsi_period, 14);
        assert_eq!(trading.rsi_buy_threshold, 30.0);
        assert_eq!(trading.rsi_sell_threshold, 70.0);
        assert_eq!(trading.total_budget, dec!(40));
        assert_eq!(trading.take_profit_pct, dec!(0.05));
        assert_eq!(trading.max_open_positions, None);
        assert!(!settings.app.live_trading_enabled);
        assert_eq!(settings.storage.state_key, "trading_state");
        assert_eq!(settings.paper.fill_ratio, dec!(1));
        assert_eq!(settings.exchange.request_timeout_secs, 10);
    }

    #[test]
    fn test_rsi_settings_mirror_trading_config() {
        let settings = parse(BASE).unwrap();
        let rsi = settings.trading.rsi_settings();
        assert_eq!(rsi.rsi_period, 14);
        assert_eq!(rsi.per_trade_cap, dec!(10));
        assert_eq!(rsi.min_order_quote, dec!(0.1));
    }

    #[test]
    fn test_cap_above_budget_rejected() {
        let toml = BASE.replace("per_trade_cap = 10.0", "per_trade_cap = 50.0");
        assert!(matches!(parse(&toml), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_duplicate_symbols_rejected() {
        let toml = BASE.replace(r#""BTC/USDT"]"#, r#""BTCUSDT", "BTC/USDT"]"#);
        assert!(matches!(parse(&toml), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_percentages_must_be_fractions() {
        let toml = BASE.replace("stop_loss_pct = 0.02", "stop_loss_pct = 2.0");
        assert!(matches!(parse(&toml), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_selected_backend_requires_its_section() {
        let toml = BASE.replace(r#"backend = "file""#, r#"backend = "postgres""#);
        assert!(matches!(parse(&toml), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_candle_limit_leaves_room_for_forming_candle() {
        let just_enough = BASE.replace("stop_loss_pct = 0.02", "stop_loss_pct = 0.02\n        candle_limit = 16");
        assert_eq!(parse(&just_enough).unwrap().trading.candle_limit, 16);

        let one_short = BASE.replace("stop_loss_pct = 0.02", "stop_loss_pct = 0.02\n        candle_limit = 15");
        assert!(matches!(parse(&one_short), Err(Error::Invalid(_))));
    }
}
