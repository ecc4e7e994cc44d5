/// bars/deterministic.rs — tick, volume and dollar bars.
///
/// All three close on a simple running-total crossing: tick bars on trade
/// count, volume bars on cumulative `qty`, dollar bars on cumulative
/// `quote_qty`. The crossing trade is included in the closing bar (ties
/// favor the closing bar, never a new one).
use crate::error::BarforgeError;
use crate::exchange::Trade;

use super::{aggregate_slice, Bar, BarParams};

fn validate(trades: &[Trade]) -> Result<(), BarforgeError> {
    for t in trades {
        if !t.price.is_finite() || t.price <= 0.0 {
            return Err(BarforgeError::BadInput(format!(
                "trade {}: non-finite or non-positive price",
                t.id
            )));
        }
        if !t.qty.is_finite() || t.qty < 0.0 {
            return Err(BarforgeError::BadInput(format!("trade {}: bad qty", t.id)));
        }
    }
    Ok(())
}

/// Emit a bar every `bar_size` trades (simple index-based grouping).
pub fn build_tick_bars(
    trades: &[Trade],
    params: &BarParams,
) -> Result<(Vec<Bar>, Vec<Trade>), BarforgeError> {
    validate(trades)?;
    let bar_size = params.bar_size.max(1.0) as usize;
    if trades.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut bars = Vec::with_capacity(trades.len() / bar_size + 1);
    let mut i0 = 0usize;
    while i0 + bar_size <= trades.len() {
        let i1 = i0 + bar_size - 1;
        bars.push(aggregate_slice(trades, i0, i1));
        i0 = i1 + 1;
    }
    let residual = trades[i0..].to_vec();
    Ok((bars, residual))
}

/// Close a bar on the trade whose cumulative `qty` first reaches or exceeds
/// an integer multiple of `bar_size`.
pub fn build_volume_bars(
    trades: &[Trade],
    params: &BarParams,
) -> Result<(Vec<Bar>, Vec<Trade>), BarforgeError> {
    validate(trades)?;
    build_running_sum_bars(trades, params.bar_size.max(1e-12), |t| t.qty)
}

/// Identical rule on `quote_qty` rather than `qty`.
pub fn build_dollar_bars(
    trades: &[Trade],
    params: &BarParams,
) -> Result<(Vec<Bar>, Vec<Trade>), BarforgeError> {
    validate(trades)?;
    build_running_sum_bars(trades, params.bar_size.max(1e-12), |t| t.quote_qty)
}

fn build_running_sum_bars(
    trades: &[Trade],
    bar_size: f64,
    unit: impl Fn(&Trade) -> f64,
) -> Result<(Vec<Bar>, Vec<Trade>), BarforgeError> {
    if trades.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut bars = Vec::new();
    let mut i0 = 0usize;
    let mut cum = 0.0;
    let mut next_threshold = bar_size;

    for (idx, t) in trades.iter().enumerate() {
        cum += unit(t);
        if cum >= next_threshold {
            bars.push(aggregate_slice(trades, i0, idx));
            i0 = idx + 1;
            // Re-anchor to the next integer multiple above the running sum,
            // so a single very large trade can't stall the threshold.
            let multiples = (cum / bar_size).floor();
            next_threshold = (multiples + 1.0) * bar_size;
        }
    }

    let residual = trades[i0..].to_vec();
    Ok((bars, residual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::test_fixtures::trade;

    #[test]
    fn tick_bars_basic() {
        let trades = vec![
            trade(1, 100.0, 1.0, 100.0, 10, false),
            trade(2, 101.0, 2.0, 202.0, 20, false),
            trade(3, 99.0, 1.0, 99.0, 30, true),
            trade(4, 102.0, 3.0, 306.0, 40, false),
            trade(5, 100.0, 1.0, 100.0, 50, true),
        ];
        let params = BarParams {
            bar_size: 2.0,
            ..Default::default()
        };
        let (bars, residual) = build_tick_bars(&trades, &params).unwrap();
        assert_eq!(bars.len(), 2);

        let b1 = &bars[0];
        assert_eq!(b1.first_trade_id, 1);
        assert_eq!(b1.last_trade_id, 2);
        assert_eq!(b1.open, 100.0);
        assert_eq!(b1.high, 101.0);
        assert_eq!(b1.low, 100.0);
        assert_eq!(b1.close, 101.0);
        assert_eq!(b1.n_ticks, 2);
        assert_eq!(b1.base_volume, 3.0);
        assert_eq!(b1.buy_ticks, 2);
        assert_eq!(b1.sell_ticks, 0);
        assert_eq!(b1.signed_tick_sum, 2);

        let b2 = &bars[1];
        assert_eq!(b2.first_trade_id, 3);
        assert_eq!(b2.last_trade_id, 4);
        assert_eq!(b2.open, 99.0);
        assert_eq!(b2.high, 102.0);
        assert_eq!(b2.low, 99.0);
        assert_eq!(b2.close, 102.0);
        assert_eq!(b2.buy_ticks, 1);
        assert_eq!(b2.sell_ticks, 1);
        assert_eq!(b2.signed_tick_sum, 0);

        // Residual of 1 trade must not be emitted as a bar.
        assert_eq!(residual.len(), 1);
        assert_eq!(residual[0].id, 5);
    }

    #[test]
    fn dollar_bars_close_on_cumulative_threshold() {
        let trades = vec![
            trade(1, 100.0, 1.0, 40.0, 10, false),
            trade(2, 100.0, 1.0, 40.0, 20, false),
            trade(3, 100.0, 1.0, 30.0, 30, false),
            trade(4, 100.0, 1.0, 50.0, 40, false),
        ];
        let params = BarParams {
            bar_size: 100.0,
            ..Default::default()
        };
        let (bars, residual) = build_dollar_bars(&trades, &params).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].first_trade_id, 1);
        assert_eq!(bars[0].last_trade_id, 3); // cum 110 >= 100 at id 3

        assert_eq!(residual.len(), 1);
        assert_eq!(residual[0].id, 4);
    }

    #[test]
    fn empty_input_is_empty_output() {
        let (bars, residual) = build_tick_bars(&[], &BarParams::default()).unwrap();
        assert!(bars.is_empty());
        assert!(residual.is_empty());
    }

    #[test]
    fn bar_trade_id_monotonicity() {
        let trades: Vec<Trade> = (1..=20)
            .map(|i| trade(i, 100.0 + i as f64, 1.0, 100.0, i as i64 * 10, i % 2 == 0))
            .collect();
        let (bars, _) = build_tick_bars(&trades, &BarParams { bar_size: 3.0, ..Default::default() }).unwrap();
        for w in bars.windows(2) {
            assert!(w[0].last_trade_id < w[1].first_trade_id);
        }
    }

    #[test]
    fn volume_conservation() {
        let trades: Vec<Trade> = (1..=50)
            .map(|i| trade(i, 100.0, (i % 5) as f64 + 1.0, 100.0, i as i64, i % 3 == 0))
            .collect();
        let total_qty: f64 = trades.iter().map(|t| t.qty).sum();
        let (bars, residual) =
            build_volume_bars(&trades, &BarParams { bar_size: 7.0, ..Default::default() }).unwrap();
        let bars_qty: f64 = bars.iter().map(|b| b.base_volume).sum();
        let residual_qty: f64 = residual.iter().map(|t| t.qty).sum();
        assert!((bars_qty + residual_qty - total_qty).abs() < 1e-9);
        for b in &bars {
            assert!((b.buy_volume + b.sell_volume - b.base_volume).abs() < 1e-9);
        }
    }

    #[test]
    fn ohlc_sanity_holds_across_random_ish_prices() {
        let trades: Vec<Trade> = (1..=60)
            .map(|i| {
                let price = 100.0 + ((i * 37) % 23) as f64 - 11.0;
                trade(i, price, 1.0, price, i as i64, i % 2 == 0)
            })
            .collect();
        let (bars, _) =
            build_tick_bars(&trades, &BarParams { bar_size: 4.0, ..Default::default() }).unwrap();
        for (b, chunk) in bars.iter().zip(trades.chunks(4)) {
            let max_price = chunk.iter().map(|t| t.price).fold(f64::MIN, f64::max);
            let min_price = chunk.iter().map(|t| t.price).fold(f64::MAX, f64::min);
            assert_eq!(b.high, max_price);
            assert_eq!(b.low, min_price);
            assert!(b.low <= b.open.min(b.close));
            assert!(b.open.max(b.close) <= b.high);
        }
    }
}
