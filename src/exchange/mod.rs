pub mod client;
pub mod types;

pub use client::{BinanceFuturesClient, ExchangeClient};
pub use types::{Kline, Trade};
