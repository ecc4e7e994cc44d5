/// backtest.rs — the synchronous, timestamp-locked multi-symbol loop.
///
/// All symbols share one timestamp axis: bar `i` of every symbol must carry
/// the same `start_time`/`end_time`. The loop visits `(timestamp, symbol)`
/// pairs in lexicographic order — index-major, symbol-name-minor — so a
/// rerun over the same bars is bit-for-bit reproducible.
use std::collections::BTreeMap;

use crate::bars::Bar;
use crate::error::BarforgeError;
use crate::execution::ExecutionHandler;
use crate::portfolio::Portfolio;
use crate::strategy::Strategy;

pub struct BacktestDriver<S: Strategy> {
    handler: ExecutionHandler<S>,
}

impl<S: Strategy> BacktestDriver<S> {
    pub fn new(portfolio: Portfolio, strategy: S) -> Self {
        Self {
            handler: ExecutionHandler::new(portfolio, strategy),
        }
    }

    /// Run the full loop over `data`, a symbol-keyed map of equal-length,
    /// timestamp-aligned bar sequences.
    pub fn run(&mut self, data: &BTreeMap<String, Vec<Bar>>) -> Result<(), BarforgeError> {
        let n_bars = match data.values().next() {
            Some(bars) => bars.len(),
            None => return Ok(()),
        };

        for bars in data.values() {
            if bars.len() != n_bars {
                return Err(BarforgeError::BadInput(
                    "all symbols must share the same number of bars".into(),
                ));
            }
        }
        for i in 0..n_bars {
            let reference_time = data.values().next().unwrap()[i].start_time;
            for bars in data.values() {
                if bars[i].start_time != reference_time {
                    return Err(BarforgeError::BadInput(format!(
                        "bar {i}: timestamp axis diverges across symbols"
                    )));
                }
            }
        }

        for i in 0..n_bars {
            for (symbol, bars) in data.iter() {
                self.handler.process(symbol, &bars[i])?;
            }
        }

        Ok(())
    }

    pub fn into_portfolio(self) -> Portfolio {
        self.handler.into_portfolio()
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.handler.portfolio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::ClosedBy;
    use crate::strategy::RsiStrategy;

    fn bar(open: f64, high: f64, low: f64, close: f64, t: i64) -> Bar {
        Bar {
            start_time: t,
            end_time: t,
            open,
            high,
            low,
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

    /// Flat at 100 for 30 bars (arms and saturates RSI's oversold read once
    /// the decline starts), a sharp decline into deep oversold territory,
    /// then a rally clearing a tight +5% take-profit.
    fn flat_then_rally(n: u64) -> Vec<Bar> {
        let mut bars = Vec::new();
        for t in 0..n {
            let close = if t < 15 {
                100.0
            } else if t < 30 {
                100.0 - (t - 14) as f64 * 3.0
            } else if t < 45 {
                55.0 + (t - 29) as f64 * 5.0
            } else {
                130.0
            };
            let (high, low) = (close * 1.001, close * 0.999);
            bars.push(bar(close, high, low, close, t as i64 * 60_000));
        }
        bars
    }

    #[test]
    fn rsi_reference_backtest_opens_and_tp_closes() {
        let bars = flat_then_rally(100);
        let mut data = BTreeMap::new();
        data.insert("BTCUSDT".to_owned(), bars.clone());
        data.insert("ETHUSDT".to_owned(), bars);

        let portfolio = Portfolio::new(10_000.0, 1, 0.0002, 0.0005);
        let strategy = RsiStrategy::new(14, 30.0, 70.0, 0.05, 500.0);
        let mut driver = BacktestDriver::new(portfolio, strategy);
        driver.run(&data).unwrap();

        let portfolio = driver.into_portfolio();
        assert!(!portfolio.trade_history.is_empty(), "expected at least one closed trade");
        for trade in &portfolio.trade_history {
            if trade.closed_by == ClosedBy::Tp {
                assert!(trade.pnl > 0.0);
                assert_eq!(trade.commissions, trade.volume * (0.0002 + 0.0005));
            }
        }

        let general = &portfolio.equity_history["General"];
        let last_trade_exit = portfolio.trade_history.iter().map(|t| t.exit_time).max().unwrap();
        let tail: Vec<f64> = general
            .iter()
            .filter(|s| s.timestamp_ms >= last_trade_exit)
            .map(|s| s.equity)
            .collect();
        for w in tail.windows(2) {
            assert!(w[1] >= w[0] - 1e-9, "equity should not drop after the last close");
        }
    }

    #[test]
    fn accounting_identity_holds_after_a_full_run() {
        let bars = flat_then_rally(100);
        let mut data = BTreeMap::new();
        data.insert("BTCUSDT".to_owned(), bars.clone());
        data.insert("ETHUSDT".to_owned(), bars);

        let portfolio = Portfolio::new(10_000.0, 1, 0.0002, 0.0005);
        let mut driver = BacktestDriver::new(portfolio, RsiStrategy::new(14, 30.0, 70.0, 0.05, 500.0));
        driver.run(&data).unwrap();

        assert!(driver.portfolio().accounting_identity_holds(1e-6));
    }

    #[test]
    fn same_inputs_produce_identical_histories() {
        let bars = flat_then_rally(100);
        let mut data = BTreeMap::new();
        data.insert("BTCUSDT".to_owned(), bars.clone());
        data.insert("ETHUSDT".to_owned(), bars);

        let run_once = || {
            let portfolio = Portfolio::new(10_000.0, 1, 0.0002, 0.0005);
            let mut driver =
                BacktestDriver::new(portfolio, RsiStrategy::new(14, 30.0, 70.0, 0.05, 500.0));
            driver.run(&data).unwrap();
            driver.into_portfolio()
        };

        let a = run_once();
        let b = run_once();

        assert_eq!(a.trade_history, b.trade_history);
        assert_eq!(a.equity_history, b.equity_history);
    }

    #[test]
    fn mismatched_bar_counts_reject() {
        let mut data = BTreeMap::new();
        data.insert("BTCUSDT".to_owned(), flat_then_rally(10));
        data.insert("ETHUSDT".to_owned(), flat_then_rally(20));

        let portfolio = Portfolio::new(10_000.0, 1, 0.0002, 0.0005);
        let mut driver = BacktestDriver::new(portfolio, RsiStrategy::default());
        assert!(driver.run(&data).is_err());
    }

    #[test]
    fn empty_data_is_a_no_op() {
        let data: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
        let portfolio = Portfolio::new(10_000.0, 1, 0.0002, 0.0005);
        let mut driver = BacktestDriver::new(portfolio, RsiStrategy::default());
        driver.run(&data).unwrap();
    }
}
