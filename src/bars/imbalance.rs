/// bars/imbalance.rs — tick, volume and dollar imbalance bars.
///
/// A bar closes when the running signed sum over the current bar,
/// `theta = sum(sign_i * unit_i)`, crosses a threshold `tau = alpha * E[T] *
/// E|flow|` that itself adapts via EMA after every closed bar. `E[T]` and
/// `E|flow|` are seeded from the first `warmup_ticks` trades so the very
/// first bar has a sane stopping rule.
use crate::error::BarforgeError;
use crate::exchange::Trade;

use super::{aggregate_slice, Bar, BarParams, MIN_BAR_THETA, MIN_EXPECTED_FLOW};

fn build_imbalance_bars(
    trades: &[Trade],
    params: &BarParams,
    unit: impl Fn(&Trade) -> f64,
) -> Result<(Vec<Bar>, Vec<Trade>), BarforgeError> {
    for t in trades {
        if !t.price.is_finite() || t.price <= 0.0 {
            return Err(BarforgeError::BadInput(format!(
                "trade {}: non-finite or non-positive price",
                t.id
            )));
        }
    }
    let n = trades.len();
    if n == 0 {
        return Ok((Vec::new(), Vec::new()));
    }

    let w_end = params.warmup_ticks.min(n);
    let signed_units: Vec<f64> = trades[..w_end]
        .iter()
        .map(|t| t.sign() as f64 * unit(t))
        .collect();
    let mut e_flow = (signed_units.iter().map(|v| v.abs()).sum::<f64>() / w_end as f64)
        .max(MIN_EXPECTED_FLOW);
    let mut e_t = (w_end as f64 / 5.0).max(10.0);
    let lambda = params.exponential_smoothing();

    let mut bars = Vec::new();
    let mut i0 = 0usize;
    let mut theta = 0.0;
    let mut idx = 0usize;

    while idx < n {
        if idx == i0 {
            theta = 0.0;
        }
        theta += trades[idx].sign() as f64 * unit(&trades[idx]);
        let threshold = (params.alpha * e_t * e_flow).max(1.0);

        if theta.abs() >= threshold {
            let i1 = idx;
            let bar = aggregate_slice(trades, i0, i1);
            let n_ticks = bar.n_ticks as f64;
            e_t = (1.0 - lambda) * e_t + lambda * n_ticks;
            let bar_theta = (theta.abs() / n_ticks).max(MIN_BAR_THETA);
            e_flow = (1.0 - lambda) * e_flow + lambda * bar_theta;
            bars.push(bar);
            i0 = i1 + 1;
        }
        idx += 1;
    }

    let residual = trades[i0..].to_vec();
    Ok((bars, residual))
}

pub fn build_tick_imbalance_bars(
    trades: &[Trade],
    params: &BarParams,
) -> Result<(Vec<Bar>, Vec<Trade>), BarforgeError> {
    build_imbalance_bars(trades, params, |_| 1.0)
}

pub fn build_volume_imbalance_bars(
    trades: &[Trade],
    params: &BarParams,
) -> Result<(Vec<Bar>, Vec<Trade>), BarforgeError> {
    build_imbalance_bars(trades, params, |t| t.qty)
}

pub fn build_dollar_imbalance_bars(
    trades: &[Trade],
    params: &BarParams,
) -> Result<(Vec<Bar>, Vec<Trade>), BarforgeError> {
    build_imbalance_bars(trades, params, |t| t.quote_qty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::test_fixtures::trade;

    fn alternating_trades(n: usize) -> Vec<Trade> {
        (0..n)
            .map(|i| {
                let maker = i % 2 == 0; // alternate buy/sell initiation
                trade(i as u64 + 1, 100.0 + (i % 3) as f64, 1.0, 100.0, i as i64 * 10, maker)
            })
            .collect()
    }

    #[test]
    fn empty_input_is_empty_output() {
        let (bars, residual) =
            build_tick_imbalance_bars(&[], &BarParams::default()).unwrap();
        assert!(bars.is_empty());
        assert!(residual.is_empty());
    }

    #[test]
    fn no_bar_emitted_with_zero_ticks() {
        // Strictly alternating signs keep theta near zero; no bar should close
        // before the residual is exhausted for a short, balanced tape.
        let trades = alternating_trades(20);
        let params = BarParams {
            alpha: 1.0,
            ema_span: 50,
            warmup_ticks: 10,
            ..Default::default()
        };
        let (bars, residual) = build_tick_imbalance_bars(&trades, &params).unwrap();
        for b in &bars {
            assert!(b.n_ticks > 0);
        }
        let covered: usize = bars.iter().map(|b| b.n_ticks as usize).sum::<usize>() + residual.len();
        assert_eq!(covered, trades.len());
    }

    #[test]
    fn one_sided_flow_closes_bars_and_conserves_trades() {
        // All buys: theta grows by 1 every tick, so bars close steadily once
        // past warmup once threshold is met.
        let trades: Vec<Trade> = (0..100)
            .map(|i| trade(i as u64 + 1, 100.0, 1.0, 100.0, i as i64 * 10, false))
            .collect();
        let params = BarParams {
            alpha: 1.0,
            ema_span: 20,
            warmup_ticks: 10,
            ..Default::default()
        };
        let (bars, residual) = build_tick_imbalance_bars(&trades, &params).unwrap();
        assert!(!bars.is_empty());
        let covered: usize = bars.iter().map(|b| b.n_ticks as usize).sum::<usize>() + residual.len();
        assert_eq!(covered, trades.len());
        for w in bars.windows(2) {
            assert!(w[0].last_trade_id < w[1].first_trade_id);
        }
    }
}
