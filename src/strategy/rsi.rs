/// strategy/rsi.rs — mean-reversion RSI, the one reference Strategy.
///
/// ─────────────────────────────────────────────────────────────────────────
/// MATHEMATICAL SPECIFICATION
/// ─────────────────────────────────────────────────────────────────────────
///
/// Wilder's RSI over bar closes, smoothed with period `period`:
///
///   gain_t = max(close_t − close_{t-1}, 0)
///   loss_t = max(close_{t-1} − close_t, 0)
///   avg_gain_t = ((period−1)·avg_gain_{t-1} + gain_t) / period
///   avg_loss_t = ((period−1)·avg_loss_{t-1} + loss_t) / period
///   RSI_t = 100 − 100 / (1 + avg_gain_t / avg_loss_t)     (100 if avg_loss_t = 0)
///
/// Signal: RSI crossing below `oversold` opens a BUY; RSI crossing above
/// `overbought` opens a SELL. Both carry a symmetric `±move_pct` TP/SL
/// bracket around the triggering bar's close. Each crossing fires once; the
/// strategy re-arms once RSI returns inside the neutral band, so a
/// persistently oversold tape does not emit an order on every bar.
/// ─────────────────────────────────────────────────────────────────────────
use std::collections::HashMap;

use crate::bars::Bar;

use super::{OrderSignal, Strategy};

use crate::portfolio::Direction;

#[derive(Debug, Clone, Copy)]
struct SymbolState {
    prev_close: f64,
    avg_gain: f64,
    avg_loss: f64,
    n_seen: u32,
    armed: bool,
}

pub struct RsiStrategy {
    period: u32,
    oversold: f64,
    overbought: f64,
    move_pct: f64,
    volume: f64,
    state: HashMap<String, SymbolState>,
}

impl RsiStrategy {
    pub fn new(period: u32, oversold: f64, overbought: f64, move_pct: f64, volume: f64) -> Self {
        Self {
            period,
            oversold,
            overbought,
            move_pct,
            volume,
            state: HashMap::new(),
        }
    }

    fn rsi(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_loss <= 0.0 {
            return 100.0;
        }
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

impl Default for RsiStrategy {
    fn default() -> Self {
        Self::new(14, 30.0, 70.0, 0.05, 1_000.0)
    }
}

impl Strategy for RsiStrategy {
    fn on_bar(&mut self, symbol: &str, bar: &Bar) -> Option<OrderSignal> {
        let entry = self.state.entry(symbol.to_owned()).or_insert(SymbolState {
            prev_close: bar.close,
            avg_gain: 0.0,
            avg_loss: 0.0,
            n_seen: 0,
            armed: true,
        });

        if entry.n_seen == 0 {
            entry.n_seen = 1;
            entry.prev_close = bar.close;
            return None;
        }

        let delta = bar.close - entry.prev_close;
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        let period = self.period as f64;

        entry.avg_gain = ((period - 1.0) * entry.avg_gain + gain) / period;
        entry.avg_loss = ((period - 1.0) * entry.avg_loss + loss) / period;
        entry.prev_close = bar.close;
        entry.n_seen += 1;

        if entry.n_seen <= self.period {
            return None;
        }

        let rsi = Self::rsi(entry.avg_gain, entry.avg_loss);

        let signal = if rsi < self.oversold && entry.armed {
            entry.armed = false;
            Some(Direction::Buy)
        } else if rsi > self.overbought && entry.armed {
            entry.armed = false;
            Some(Direction::Sell)
        } else {
            if rsi >= self.oversold && rsi <= self.overbought {
                entry.armed = true;
            }
            None
        };

        signal.map(|direction| {
            let close = bar.close;
            let (take_profit, stop_loss) = match direction {
                Direction::Buy => (close * (1.0 + self.move_pct), close * (1.0 - self.move_pct)),
                Direction::Sell => (close * (1.0 - self.move_pct), close * (1.0 + self.move_pct)),
            };
            OrderSignal {
                volume: self.volume,
                direction,
                strategy_name: "rsi_mean_reversion",
                take_profit,
                stop_loss,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64, t: i64) -> Bar {
        Bar {
            start_time: t,
            end_time: t,
            open: close,
            high: close,
            low: close,
            close,
            n_ticks: 1,
            base_volume: 1.0,
            quote_volume: 1.0,
            buy_ticks: 1,
            buy_volume: 1.0,
            sell_ticks: 0,
            sell_volume: 0.0,
            signed_tick_sum: 1,
            signed_volume_sum: 1.0,
            first_trade_id: 1,
            last_trade_id: 1,
        }
    }

    #[test]
    fn flat_series_never_signals() {
        let mut strat = RsiStrategy::default();
        for t in 0..50 {
            let sig = strat.on_bar("BTCUSDT", &bar(100.0, t));
            assert!(sig.is_none());
        }
    }

    #[test]
    fn steady_decline_eventually_triggers_one_buy() {
        let mut strat = RsiStrategy::new(14, 30.0, 70.0, 0.05, 1_000.0);
        let mut fired = 0;
        for t in 0..30 {
            let close = 100.0 - t as f64 * 0.8;
            if let Some(sig) = strat.on_bar("BTCUSDT", &bar(close, t)) {
                fired += 1;
                assert_eq!(sig.direction, Direction::Buy);
            }
        }
        assert_eq!(fired, 1, "a sustained decline should arm-and-fire exactly once");
    }

    #[test]
    fn independent_state_per_symbol() {
        let mut strat = RsiStrategy::new(14, 30.0, 70.0, 0.05, 1_000.0);
        for t in 0..30 {
            strat.on_bar("BTCUSDT", &bar(100.0 - t as f64 * 0.8, t));
            let sig = strat.on_bar("ETHUSDT", &bar(100.0, t));
            assert!(sig.is_none(), "ETHUSDT is flat and must never signal");
        }
    }
}
