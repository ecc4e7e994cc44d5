/// error.rs — error taxonomy shared by ingestion, bar construction and the
/// backtest driver.
///
/// Only the fetch retry loop recovers automatically (see
/// `exchange::client::with_retry`); every other variant propagates to the
/// caller's boundary. `InsufficientEquity` is the one variant that a caller
/// may legitimately observe without aborting a backtest — the driver logs it
/// and marks the offending order `REJECTED`.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BarforgeError {
    #[error("malformed input: {0}")]
    BadInput(String),

    #[error("fetch failed after retries: {0}")]
    FetchFailed(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("range out of bounds: {0}")]
    RangeOutOfBounds(String),

    #[error("insufficient equity: {0}")]
    InsufficientEquity(String),

    #[error("strategy error: {0}")]
    StrategyError(String),
}
