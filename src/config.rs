/// config.rs — Centralised configuration loaded from .env
///
/// All parameters consumed by the toolchain are defined here. Loading
/// happens once at startup; every module borrows `&AppConfig`.
use anyhow::Result;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Binance USDT-M Futures pagination ceiling — also used as the ingestion
/// window size for both klines and trade-id runs.
pub const API_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Bucket width in milliseconds — the grid step for kline gap-filling.
    pub fn step_ms(self) -> i64 {
        match self {
            Timeframe::M1 => 60_000,
            Timeframe::M5 => 5 * 60_000,
            Timeframe::M15 => 15 * 60_000,
            Timeframe::M30 => 30 * 60_000,
            Timeframe::H1 => 60 * 60_000,
            Timeframe::H4 => 4 * 60 * 60_000,
            Timeframe::D1 => 24 * 60 * 60_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1D",
        }
    }

    /// Bar count per year, for metrics annualisation.
    pub fn bars_per_year(self) -> f64 {
        match self {
            Timeframe::M1 => 525_600.0,
            Timeframe::M5 => 105_120.0,
            Timeframe::M15 => 35_040.0,
            Timeframe::M30 => 17_520.0,
            Timeframe::H1 => 8_760.0,
            Timeframe::H4 => 2_190.0,
            Timeframe::D1 => 365.0,
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1D" | "1d" => Ok(Timeframe::D1),
            other => Err(format!("unsupported timeframe: {other}")),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // ── Exchange endpoints ───────────────────────────────────────────
    pub rest_url: String,
    pub use_testnet: bool,

    // ── Trading universe ─────────────────────────────────────────────
    pub symbol: String,
    pub trading_pairs: Vec<String>,
    pub timeframe: Timeframe,

    // ── Capital & risk ───────────────────────────────────────────────
    pub initial_balance: f64,
    pub leverage: u32,

    // ── Fee model ─────────────────────────────────────────────────────
    pub maker_fee: f64,
    pub taker_fee: f64,

    // ── Ingestion ─────────────────────────────────────────────────────
    pub api_limit: usize,
    pub max_retries: u32,
    pub retry_delay_secs: u64,

    // ── Metrics ───────────────────────────────────────────────────────
    /// Monthly risk-free rate used as the excess-return baseline in
    /// Sharpe/Sortino (Open Question 3: defaults to 0.0).
    pub risk_free_rate: f64,

    // ── Logging ───────────────────────────────────────────────────────
    pub log_level: i32,
}

impl AppConfig {
    /// Load configuration from environment variables (after dotenv).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // ignore missing .env

        let use_testnet = env::var("EXCHANGE_USE_TESTNET")
            .unwrap_or_else(|_| "true".into())
            .to_lowercase()
            == "true";

        let rest_url = env::var("EXCHANGE_REST_URL").unwrap_or_else(|_| {
            if use_testnet {
                "https://testnet.binancefuture.com".into()
            } else {
                "https://fapi.binance.com".into()
            }
        });

        let symbol = env::var("SYMBOL").unwrap_or_else(|_| "BTCUSDT".into());
        let trading_pairs: Vec<String> = env::var("TRADING_PAIRS")
            .unwrap_or_else(|_| symbol.clone())
            .split(',')
            .map(|s| s.trim().to_owned())
            .collect();

        let timeframe_str = env::var("TIMEFRAME").unwrap_or_else(|_| "1h".into());
        let timeframe = timeframe_str
            .parse::<Timeframe>()
            .map_err(|e| anyhow::anyhow!("Config key TIMEFRAME: {e}"))?;

        Ok(Self {
            rest_url,
            use_testnet,
            symbol,
            trading_pairs,
            timeframe,

            initial_balance: parse_env("INITIAL_BALANCE", 10_000.0)?,
            leverage: parse_env::<u32>("LEVERAGE", 1)?,

            maker_fee: parse_env("MAKER_FEE", 0.0002)?,
            taker_fee: parse_env("TAKER_FEE", 0.0005)?,

            api_limit: parse_env::<usize>("API_LIMIT", API_LIMIT)?,
            max_retries: parse_env::<u32>("MAX_RETRIES", 3)?,
            retry_delay_secs: parse_env::<u64>("RETRY_DELAY_SECS", 2)?,

            risk_free_rate: parse_env("RISK_FREE_RATE", 0.0)?,

            log_level: parse_env::<i32>("LOG_LEVEL", 20)?,
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Copy,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Config key {key}: {e}")),
        Err(_) => Ok(default),
    }
}
