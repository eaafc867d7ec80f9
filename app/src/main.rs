// In app/src/main.rs

use analytics::{CycleRecord, CycleStatus};
use anyhow::{Context, Result};
use api_client::{ApiClient, Exchange};
use app_config::Settings;
use clap::{Parser, Subcommand};
use database::StateStore;
use engine::Engine;
use execution::{PaperExchange, SimulationSettings};
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::prelude::*;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "A periodic RSI spot trading agent. Each invocation runs one cycle.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs one trading cycle in live or paper mode.
    Run,

    /// Prints the persisted positions and budget without trading.
    Status,
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let cli = Cli::parse();

    let settings = app_config::load_settings();
    init_tracing(settings.as_ref().map_or("info", |s| s.app.log_level.as_str()));
    let settings = settings.context("Failed to load application settings")?;
    tracing::info!(environment = %settings.app.environment, "Application settings loaded successfully.");

    let engine = build_engine(&settings).await?;

    // Match on the parsed command and call the appropriate handler.
    match cli.command {
        Commands::Run => {
            let record = engine.run_cycle().await?;
            report(&record);
        }
        Commands::Status => {
            handle_status(&engine).await?;
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let default_level = tracing::Level::from_str(level).unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new()
            .with_target("sqlx::query", tracing::Level::WARN) // Disable sqlx query debug logs
            .with_target("hyper", tracing::Level::WARN)
            .with_default(default_level),
    );
    tracing_subscriber::registry().with(fmt_layer).init();
}

/// Wires the exchange, the storage backend and the strategy into an `Engine`.
async fn build_engine(settings: &Settings) -> Result<Engine> {
    let api_client = ApiClient::new(&settings.exchange)?;

    // Conditionally instantiate the exchange based on the config flag
    let exchange: Box<dyn Exchange> = if settings.app.live_trading_enabled {
        tracing::warn!("LIVE TRADING IS ENABLED. REAL ORDERS WILL BE PLACED.");
        Box::new(api_client)
    } else {
        tracing::info!("Paper trading: orders are simulated against live prices.");
        Box::new(PaperExchange::new(
            Box::new(api_client),
            SimulationSettings {
                taker_fee: settings.paper.taker_fee_pct,
                slippage_percent: settings.paper.slippage_pct,
                fill_ratio: settings.paper.fill_ratio,
            },
        ))
    };

    let backend = database::connect(&settings.storage)
        .await
        .context("Failed to initialise the storage backend")?;
    let store = StateStore::new(backend, settings.storage.state_key.clone());

    let engine = Engine::new(
        settings.trading.clone(),
        exchange,
        store,
        Duration::from_secs(settings.exchange.request_timeout_secs),
    )?;
    Ok(engine)
}

fn report(record: &CycleRecord) {
    match record.status {
        CycleStatus::Completed => tracing::info!(
            cycle_id = %record.cycle_id,
            fills = record.fills().count(),
            realized_pnl = %record.realized_pnl,
            open_positions = record.open_positions,
            "Cycle completed."
        ),
        CycleStatus::Conflict => tracing::warn!(
            cycle_id = %record.cycle_id,
            failure = ?record.failure,
            "Cycle stopped by a concurrent run; state left to the other writer."
        ),
        CycleStatus::Failed => tracing::error!(cycle_id = %record.cycle_id, failure = ?record.failure, "Cycle failed."),
    }
}

// --- "Status" Subcommand Logic ---

async fn handle_status(engine: &Engine) -> Result<()> {
    let loaded = engine.status().await?;
    let state = &loaded.state;

    println!("\n--- Trading State (version {}) ---", loaded.version);
    println!(
        "Budget: total {} | per-trade cap {} | committed {} | uncommitted {}",
        state.ledger.total_budget,
        state.ledger.per_trade_cap,
        state.ledger.total_committed(),
        engine::uncommitted(state)
    );
    match state.last_cycle_id {
        Some(id) => println!("Last cycle: {id}"),
        None => println!("Last cycle: none"),
    }
    println!("---------------------------------");
    if state.open_position_count() == 0 {
        println!("No open positions.");
    }
    for symbol_state in state.open_positions() {
        if let Some(pos) = symbol_state.open_position() {
            println!(
                "{:<12} qty {} @ {} | TP {} | SL {} | committed {} | since {}",
                symbol_state.symbol,
                pos.quantity,
                pos.entry_price,
                pos.take_profit_price,
                pos.stop_loss_price,
                state.ledger.committed(&symbol_state.symbol),
                pos.entry_timestamp.to_rfc3339()
            );
        }
    }
    tracing::debug!(state = %serde_json::to_string(state)?, "Full persisted state.");
    Ok(())
}
