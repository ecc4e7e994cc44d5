/// cli.rs — interactive entry point: prompt for log level, run a canned
/// multi-symbol backtest, print the report.
///
/// Trades are ingested starting from id 0 for each symbol (the gap-aware
/// fetch discovers the live upper bound itself via `recent_trades`), built
/// into tick bars, and replayed through the RSI reference strategy. This is
/// a demo path, not a tuned research configuration — its only job is to
/// exercise the full ingestion → bars → backtest → metrics pipeline end to
/// end against a real exchange.
use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::bars::{build_tick_bars, BarParams};
use crate::backtest::BacktestDriver;
use crate::config::AppConfig;
use crate::exchange::BinanceFuturesClient;
use crate::ingestion::IngestionManager;
use crate::metrics::compute_metrics;
use crate::portfolio::Portfolio;
use crate::store::memory::InMemoryTradeStore;
use crate::strategy::RsiStrategy;

/// Canned universe for the demo run — overridable via `TRADING_PAIRS`.
const DEMO_SYMBOLS: &[&str] = &["BTCUSDT", "ETHUSDT"];

/// Prompt for a Python-logging-style level (10/20/30/40) on stdin, falling
/// back to `default` on empty input or a parse failure.
fn prompt_log_level(default: i32) -> i32 {
    print!("Log level [10=DEBUG 20=INFO 30=WARN 40=ERROR, default {default}]: ");
    let _ = io::stdout().flush();

    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return default;
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return default;
    }
    trimmed.parse::<i32>().unwrap_or(default)
}

fn level_filter(log_level: i32) -> &'static str {
    match log_level {
        l if l <= 10 => "debug",
        l if l <= 20 => "info",
        l if l <= 30 => "warn",
        _ => "error",
    }
}

pub async fn run() -> Result<()> {
    let mut cfg = AppConfig::from_env()?;
    cfg.log_level = prompt_log_level(cfg.log_level);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level_filter(cfg.log_level))),
        )
        .init();

    info!("╔══════════════════════════════════════════════╗");
    info!("║        BARFORGE  —  BACKTEST MODE             ║");
    info!("║  Information-Driven Bars + Gap-Aware Ingest   ║");
    info!("╚══════════════════════════════════════════════╝");
    info!(
        "Config: pairs={:?} balance={} leverage={} testnet={}",
        cfg.trading_pairs, cfg.initial_balance, cfg.leverage, cfg.use_testnet
    );

    let symbols: Vec<String> = if cfg.trading_pairs.len() > 1 || cfg.trading_pairs[0] != cfg.symbol
    {
        cfg.trading_pairs.clone()
    } else {
        DEMO_SYMBOLS.iter().map(|s| s.to_string()).collect()
    };

    let client = BinanceFuturesClient::new(&cfg.rest_url, cfg.max_retries, cfg.retry_delay_secs);
    let ingestion = IngestionManager::new(&client, cfg.api_limit);
    let bar_params = BarParams::default();

    let portfolio = Portfolio::new(cfg.initial_balance, cfg.leverage, cfg.maker_fee, cfg.taker_fee);
    let mut driver = BacktestDriver::new(portfolio, RsiStrategy::default());

    // Tick bars close on trade-count boundaries, so two symbols' bars never
    // land on a shared timestamp axis — each symbol is replayed through the
    // driver on its own single-key map rather than interleaved, same ledger
    // throughout.
    for symbol in &symbols {
        let mut store = InMemoryTradeStore::new();
        info!("Fetching trades for {symbol}...");
        let trades = ingestion.get_trades(&mut store, symbol, 0).await?;
        if trades.is_empty() {
            anyhow::bail!("{symbol}: no trades received — check symbol and connectivity");
        }
        let (bars, _residual) = build_tick_bars(&trades, &bar_params)?;
        info!("{symbol}: {} trades -> {} bars", trades.len(), bars.len());

        let mut data = BTreeMap::new();
        data.insert(symbol.clone(), bars);
        driver.run(&data)?;
    }

    let report = compute_metrics(driver.portfolio(), cfg.risk_free_rate);
    println!("\n{report}");

    Ok(())
}
