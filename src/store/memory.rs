/// store/memory.rs — in-memory, key-ordered implementation of the store
/// traits, for tests and standalone runs.
use std::collections::BTreeMap;

use crate::error::BarforgeError;
use crate::exchange::{Kline, Trade};

use super::{KlineStore, TradeStore};

#[derive(Debug, Default)]
pub struct InMemoryTradeStore {
    rows: BTreeMap<u64, Trade>,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TradeStore for InMemoryTradeStore {
    fn present_ids(&self, from_id: u64, to_id: u64) -> Vec<u64> {
        self.rows.range(from_id..=to_id).map(|(id, _)| *id).collect()
    }

    fn max_id(&self) -> Option<u64> {
        self.rows.keys().next_back().copied()
    }

    fn insert_batch(&mut self, trades: &[Trade]) -> Result<(), BarforgeError> {
        for t in trades {
            match self.rows.get(&t.id) {
                Some(existing) if existing != t => {
                    return Err(BarforgeError::IntegrityViolation(format!(
                        "trade {} reappeared with a different payload", t.id
                    )));
                }
                Some(_) => {}
                None => {
                    self.rows.insert(t.id, t.clone());
                }
            }
        }
        Ok(())
    }

    fn range(&self, from_id: u64, to_id: u64) -> Vec<Trade> {
        self.rows.range(from_id..=to_id).map(|(_, t)| t.clone()).collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryKlineStore {
    rows: BTreeMap<i64, Kline>,
}

impl InMemoryKlineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KlineStore for InMemoryKlineStore {
    fn present_times(&self, start_ms: i64, end_ms: i64) -> Vec<i64> {
        self.rows
            .range(start_ms..=end_ms)
            .map(|(t, _)| *t)
            .collect()
    }

    fn insert_batch(&mut self, klines: &[Kline]) -> Result<(), BarforgeError> {
        for k in klines {
            match self.rows.get(&k.open_time_ms) {
                Some(existing) if existing != k => {
                    return Err(BarforgeError::IntegrityViolation(format!(
                        "kline open_time {} reappeared with a different payload", k.open_time_ms
                    )));
                }
                Some(_) => {}
                None => {
                    self.rows.insert(k.open_time_ms, k.clone());
                }
            }
        }
        Ok(())
    }

    fn range(&self, start_ms: i64, end_ms: i64) -> Vec<Kline> {
        self.rows
            .range(start_ms..=end_ms)
            .map(|(_, k)| k.clone())
            .collect()
    }
}
