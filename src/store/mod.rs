/// store/mod.rs — abstract row-keyed tables.
///
/// The real store is an external collaborator (a columnar database); these
/// traits model a row-keyed table contract (`trades_{symbol}` keyed by `id`,
/// `klines_{symbol}_{tf}` keyed by `open_time`) without committing to any
/// particular backend. `memory`
/// provides a `BTreeMap`-backed implementation used by tests and by running
/// the toolchain without a real database attached.
pub mod memory;

use crate::error::BarforgeError;
use crate::exchange::{Kline, Trade};

/// Row-keyed table of trades for one symbol, keyed by trade id.
pub trait TradeStore {
    /// Trade ids already present in the store, within `[from_id, to_id]`.
    fn present_ids(&self, from_id: u64, to_id: u64) -> Vec<u64>;

    /// Highest trade id currently stored, if any.
    fn max_id(&self) -> Option<u64>;

    /// Idempotent insert: rows whose id already exists and match byte-for-byte
    /// are left untouched. A row whose id already exists with a *different*
    /// payload is an `IntegrityViolation` — surfaced, never silently
    /// overwritten.
    fn insert_batch(&mut self, trades: &[Trade]) -> Result<(), BarforgeError>;

    /// Read back a range, sorted by id.
    fn range(&self, from_id: u64, to_id: u64) -> Vec<Trade>;
}

/// Row-keyed table of klines for one (symbol, timeframe) pair, keyed by
/// `open_time_ms`.
pub trait KlineStore {
    /// Open-times already present in the store, within `[start_ms, end_ms]`.
    fn present_times(&self, start_ms: i64, end_ms: i64) -> Vec<i64>;

    /// Idempotent insert: rows whose `open_time_ms` already exists and match
    /// byte-for-byte are left untouched. A row whose `open_time_ms` already
    /// exists with a *different* payload is an `IntegrityViolation` —
    /// surfaced, never silently overwritten.
    fn insert_batch(&mut self, klines: &[Kline]) -> Result<(), BarforgeError>;

    /// Read back a range, sorted by `open_time_ms`.
    fn range(&self, start_ms: i64, end_ms: i64) -> Vec<Kline>;
}
