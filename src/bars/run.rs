/// bars/run.rs — tick, volume and dollar run bars.
///
/// Tracks the running length of the current same-sign streak: for tick-run
/// this is a tick count, for volume-run/dollar-run it is the cumulative
/// |qty| or |quote_qty| since the streak's last sign flip. A sign flip
/// resets the accumulator to the flipping trade's own unit (the streak
/// restarts there, it doesn't vanish). A bar closes at the first trade whose
/// running value meets or exceeds `alpha * EMA`; the EMA is seeded from the
/// arithmetic mean of the running series over the first `warmup_ticks`
/// trades and updated once per trade thereafter (resolution per spec: reset
/// the run accumulator after every closed bar, for all three variants).
use crate::error::BarforgeError;
use crate::exchange::Trade;

use super::{aggregate_slice, Bar, BarParams};

fn build_run_bars(
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

    // Running-value series used purely to seed the warmup EMA: a fresh
    // same-sign-streak accumulator computed independent of bar boundaries.
    let mut seed_values = Vec::with_capacity(params.warmup_ticks.min(n));
    let mut run_val = 0.0;
    let mut run_sign = 0i64;
    for t in trades.iter().take(params.warmup_ticks.min(n)) {
        let s = t.sign();
        if s != run_sign {
            run_val = unit(t);
            run_sign = s;
        } else {
            run_val += unit(t);
        }
        seed_values.push(run_val);
    }
    let mut ema = seed_values.iter().sum::<f64>() / seed_values.len().max(1) as f64;
    let lambda = params.exponential_smoothing();

    let mut bars = Vec::new();
    let mut i0 = 0usize;
    let mut run_val = 0.0;
    let mut run_sign = 0i64;

    for idx in 0..n {
        let s = trades[idx].sign();
        if idx == i0 {
            run_val = unit(&trades[idx]);
            run_sign = s;
        } else if s != run_sign {
            run_val = unit(&trades[idx]);
            run_sign = s;
        } else {
            run_val += unit(&trades[idx]);
        }

        ema = (1.0 - lambda) * ema + lambda * run_val;
        let threshold = params.alpha * ema;

        if run_val >= threshold && threshold > 0.0 {
            bars.push(aggregate_slice(trades, i0, idx));
            i0 = idx + 1;
            run_val = 0.0;
            run_sign = 0;
        }
    }

    let residual = trades[i0..].to_vec();
    Ok((bars, residual))
}

pub fn build_tick_run_bars(
    trades: &[Trade],
    params: &BarParams,
) -> Result<(Vec<Bar>, Vec<Trade>), BarforgeError> {
    build_run_bars(trades, params, |_| 1.0)
}

pub fn build_volume_run_bars(
    trades: &[Trade],
    params: &BarParams,
) -> Result<(Vec<Bar>, Vec<Trade>), BarforgeError> {
    build_run_bars(trades, params, |t| t.qty)
}

pub fn build_dollar_run_bars(
    trades: &[Trade],
    params: &BarParams,
) -> Result<(Vec<Bar>, Vec<Trade>), BarforgeError> {
    build_run_bars(trades, params, |t| t.quote_qty)
}
