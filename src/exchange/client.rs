/// exchange/client.rs — REST data fetcher with bounded retry.
///
/// Wraps every remote call in a fixed-backoff retry loop: on a transient
/// network/timeout error, sleep `retry_delay` and try again, up to
/// `max_retries` attempts total. Exhausting retries surfaces
/// `BarforgeError::FetchFailed`; a non-transient error (bad status, bad
/// body) propagates immediately without retrying.
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::error::BarforgeError;

use super::types::{klines_from_raw, Kline, RawKline, RawTrade, Trade};

/// The three exchange operations this toolchain consumes. Kept as a trait so
/// tests can substitute a fixture client without touching the network.
/// `IngestionManager` is generic over this trait rather than holding a
/// trait object, since only a single concrete client is ever live at once.
pub trait ExchangeClient: Send + Sync {
    fn recent_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Trade>, BarforgeError>> + Send;

    fn historical_trades(
        &self,
        symbol: &str,
        from_id: u64,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Trade>, BarforgeError>> + Send;

    fn klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time_ms: i64,
        end_time_ms: i64,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Kline>, BarforgeError>> + Send;
}

pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl BinanceFuturesClient {
    pub fn new(base_url: &str, max_retries: u32, retry_delay_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.to_owned(),
            max_retries,
            retry_delay: Duration::from_secs(retry_delay_secs),
        }
    }

    /// Retry a fallible async operation with fixed backoff. Non-transient
    /// errors (anything other than a network/timeout failure) propagate on
    /// the first attempt.
    async fn with_retry<T, F, Fut>(&self, op_name: &str, mut f: F) -> Result<T, BarforgeError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, reqwest::Error>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!("{op_name}: transient error (attempt {attempt}/{}): {e}", self.max_retries);
                    if attempt >= self.max_retries {
                        return Err(BarforgeError::FetchFailed(format!(
                            "{op_name}: exhausted {} retries: {e}",
                            self.max_retries
                        )));
                    }
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    return Err(BarforgeError::FetchFailed(format!("{op_name}: {e}")));
                }
            }
        }
    }
}

impl ExchangeClient for BinanceFuturesClient {
    async fn recent_trades(&self, symbol: &str, limit: usize) -> Result<Vec<Trade>, BarforgeError> {
        let url = format!(
            "{}/fapi/v1/trades?symbol={}&limit={}",
            self.base_url, symbol, limit
        );
        debug!("recent_trades: {url}");
        let raw: Vec<RawTrade> = self
            .with_retry("recent_trades", || async {
                self.client.get(&url).send().await?.json().await
            })
            .await?;
        raw.into_iter().map(Trade::try_from).collect()
    }

    async fn historical_trades(
        &self,
        symbol: &str,
        from_id: u64,
        limit: usize,
    ) -> Result<Vec<Trade>, BarforgeError> {
        let url = format!(
            "{}/fapi/v1/historicalTrades?symbol={}&fromId={}&limit={}",
            self.base_url, symbol, from_id, limit
        );
        debug!("historical_trades: {url}");
        let raw: Vec<RawTrade> = self
            .with_retry("historical_trades", || async {
                self.client.get(&url).send().await?.json().await
            })
            .await?;
        raw.into_iter().map(Trade::try_from).collect()
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time_ms: i64,
        end_time_ms: i64,
        limit: usize,
    ) -> Result<Vec<Kline>, BarforgeError> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&startTime={}&endTime={}&limit={}",
            self.base_url, symbol, interval, start_time_ms, end_time_ms, limit
        );
        debug!("klines: {url}");
        let raw: Vec<RawKline> = self
            .with_retry("klines", || async {
                self.client.get(&url).send().await?.json().await
            })
            .await?;
        Ok(klines_from_raw(raw))
    }
}
