/// metrics.rs — post-run performance metrics.
///
/// ─────────────────────────────────────────────────────────────────────────
/// MATHEMATICAL SPECIFICATION
/// ─────────────────────────────────────────────────────────────────────────
///
/// CAGR
///   years = (t_end − t_start) / ms_per_year
///   CAGR  = ((final_equity / initial_equity)^(1/years) − 1) × 100
///
/// SHARPE / SORTINO (monthly sampling of General equity, annualised ×√12)
///   monthly_return_k = equity_month_k / equity_month_{k-1} − 1
///   Sharpe  = mean(monthly_return) / std(monthly_return)
///   excess  = monthly_return − risk_free_rate / 12
///   Sortino = mean(excess) / std(excess | excess < 0, ddof=1)
///
/// MAX DRAWDOWN
///   peak_t = running max of equity up to t
///   DD_t   = (equity_t − peak_t) / peak_t
///   MaxDD% = min_t(DD_t) × 100; MaxDD$ = min_t(equity_t − peak_t)
///
/// CALMAR = CAGR / |MaxDD%|
///
/// HISTORICAL VaR 95% = 5th percentile of the daily-bucketed General equity
/// series (last sample of each UTC day).
///
/// EQUITY CURVE STABILITY = R² of an OLS fit of General equity against its
/// integer bar index (Open Question 4: index, not raw timestamp-ms).
///
/// PORTFOLIO TURNOVER = (Σ trade volume / mean(trade volume)) × 100.
/// ─────────────────────────────────────────────────────────────────────────
use std::collections::BTreeMap;

use chrono::{Datelike, TimeZone, Utc};

use crate::portfolio::{ClosedBy, EquitySample, Portfolio, GENERAL};

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample standard deviation (`ddof = 1`).
fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let var = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    var.sqrt()
}

const MS_PER_YEAR: f64 = 365.0 * 24.0 * 3_600_000.0;

#[derive(Debug, Clone)]
pub struct SymbolReport {
    pub symbol: String,
    pub total_trades: usize,
    pub win_rate_pct: f64,
    pub total_pnl: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub max_drawdown_dollar: f64,
    pub avg_trade_return_pct: f64,
    pub commissions: f64,
}

#[derive(Debug, Clone)]
pub struct PerfReport {
    pub initial_balance: f64,
    pub final_equity: f64,
    pub net_profit_dollar: f64,
    pub net_profit_pct: f64,
    pub cagr_pct: f64,
    pub volatility_per_trade: f64,
    pub volatility_annualized: f64,
    pub sharpe_monthly: f64,
    pub sharpe_annual: f64,
    pub sortino_monthly: f64,
    pub sortino_annual: f64,
    pub max_drawdown_pct: f64,
    pub max_drawdown_dollar: f64,
    pub calmar: f64,
    pub var_95_pct: f64,
    pub equity_curve_r2: f64,
    pub portfolio_turnover_pct: f64,
    pub total_commissions: f64,
    pub per_symbol: Vec<SymbolReport>,
}

impl std::fmt::Display for PerfReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "  BARFORGE — BACKTEST PERFORMANCE REPORT")?;
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "  Net Profit        : ${:.2} ({:.2}%)", self.net_profit_dollar, self.net_profit_pct)?;
        writeln!(f, "  CAGR              : {:.2}%", self.cagr_pct)?;
        writeln!(f, "  Sharpe (1M / 1Y)  : {:.3} / {:.3}", self.sharpe_monthly, self.sharpe_annual)?;
        writeln!(f, "  Sortino (1M / 1Y) : {:.3} / {:.3}", self.sortino_monthly, self.sortino_annual)?;
        writeln!(f, "  Max Drawdown      : {:.2}% (${:.2})", self.max_drawdown_pct, self.max_drawdown_dollar)?;
        writeln!(f, "  Calmar Ratio      : {:.3}", self.calmar)?;
        writeln!(f, "  VaR 95%           : {:.2}%", self.var_95_pct)?;
        writeln!(f, "  Equity R²         : {:.4}", self.equity_curve_r2)?;
        writeln!(f, "  Portfolio Turnover: {:.2}%", self.portfolio_turnover_pct)?;
        writeln!(f, "  Commissions       : ${:.2}", self.total_commissions)?;
        writeln!(f, "════════════════════════════════════════════")?;
        for s in &self.per_symbol {
            writeln!(
                f,
                "  {:<10} trades={:<4} win%={:<6.2} pnl=${:<10.2} pf={:.2} mdd%={:.2}",
                s.symbol, s.total_trades, s.win_rate_pct, s.total_pnl, s.profit_factor, s.max_drawdown_pct
            )?;
        }
        writeln!(f, "════════════════════════════════════════════")
    }
}

pub fn compute_metrics(portfolio: &Portfolio, risk_free_rate: f64) -> PerfReport {
    let general = portfolio.equity_history.get(GENERAL).cloned().unwrap_or_default();
    let initial_balance = portfolio.initial_capital();
    let final_equity = general.last().map(|s| s.equity).unwrap_or(initial_balance);

    let net_profit_dollar = final_equity - initial_balance;
    let net_profit_pct = net_profit_dollar / initial_balance * 100.0;

    let cagr_pct = cagr(&general, initial_balance, final_equity);

    let trade_pnls: Vec<f64> = portfolio.trade_history.iter().map(|t| t.pnl).collect();
    let volatility_per_trade = if trade_pnls.len() >= 2 { std_dev(&trade_pnls) } else { 0.0 };
    let volatility_annualized = volatility_per_trade * 365f64.sqrt();

    let monthly_returns = periodic_returns(&general, MonthlyBucket);
    let (sharpe_monthly, sharpe_annual) = sharpe(&monthly_returns, 12.0);
    let (sortino_monthly, sortino_annual) = sortino(&monthly_returns, risk_free_rate, 12.0);

    let (max_drawdown_pct, max_drawdown_dollar) = drawdown(&general);
    let calmar = if max_drawdown_pct.abs() > 1e-12 { cagr_pct / max_drawdown_pct.abs() } else { f64::INFINITY };

    let daily_equity = bucketed_last(&general, DailyBucket);
    let var_95_pct = percentile(&daily_equity, 5.0);

    let equity_curve_r2 = r_squared_vs_index(&general);

    let total_volume: f64 = portfolio.trade_history.iter().map(|t| t.volume).sum();
    let mean_volume = if portfolio.trade_history.is_empty() {
        0.0
    } else {
        total_volume / portfolio.trade_history.len() as f64
    };
    let portfolio_turnover_pct = if mean_volume > 0.0 { total_volume / mean_volume * 100.0 } else { 0.0 };

    let total_commissions = portfolio.total_commissions();

    let symbols: Vec<String> = {
        let mut s: Vec<String> = portfolio
            .equity_history
            .keys()
            .filter(|k| k.as_str() != GENERAL)
            .cloned()
            .collect();
        s.sort();
        s
    };
    let per_symbol = symbols.iter().map(|sym| symbol_report(portfolio, sym)).collect();

    PerfReport {
        initial_balance,
        final_equity,
        net_profit_dollar,
        net_profit_pct,
        cagr_pct,
        volatility_per_trade,
        volatility_annualized,
        sharpe_monthly,
        sharpe_annual,
        sortino_monthly,
        sortino_annual,
        max_drawdown_pct,
        max_drawdown_dollar,
        calmar,
        var_95_pct,
        equity_curve_r2,
        portfolio_turnover_pct,
        total_commissions,
        per_symbol,
    }
}

fn symbol_report(portfolio: &Portfolio, symbol: &str) -> SymbolReport {
    let closed: Vec<_> = portfolio.trade_history.iter().filter(|t| t.symbol == symbol).collect();
    let open_positions: Vec<_> = portfolio.positions.iter().filter(|p| p.symbol == symbol).collect();

    let total_trades = closed.len() + open_positions.len();
    let wins = closed.iter().filter(|t| t.closed_by == ClosedBy::Tp).count();
    let win_rate_pct = if total_trades > 0 { wins as f64 / total_trades as f64 * 100.0 } else { 0.0 };

    let closed_pnl: f64 = closed.iter().map(|t| t.pnl).sum();
    let open_realized: f64 = open_positions.iter().map(|p| p.realized_pnl).sum();
    let open_unrealized: f64 = open_positions.iter().map(|p| p.unrealized_pnl).sum();
    let commissions: f64 = closed.iter().map(|t| t.commissions).sum();
    let total_pnl = closed_pnl + open_realized + open_unrealized - commissions;

    let gross_profit = closed.iter().map(|t| t.pnl).filter(|p| *p > 0.0).sum::<f64>()
        + open_positions.iter().map(|p| p.realized_pnl).filter(|p| *p > 0.0).sum::<f64>();
    let gross_loss = closed.iter().map(|t| t.pnl).filter(|p| *p < 0.0).sum::<f64>()
        + open_positions.iter().map(|p| p.realized_pnl).filter(|p| *p < 0.0).sum::<f64>();
    let profit_factor = if gross_loss == 0.0 { 0.0 } else { (gross_profit / gross_loss).abs() };

    let symbol_equity = portfolio.equity_history.get(symbol).cloned().unwrap_or_default();
    let (max_drawdown_pct, max_drawdown_dollar) = drawdown(&symbol_equity);

    let avg_trade_return_pct = if closed.is_empty() {
        0.0
    } else {
        let returns: Vec<f64> = closed
            .iter()
            .map(|t| {
                let exit_price = match t.closed_by {
                    ClosedBy::Tp => t.take_profit,
                    ClosedBy::Sl => t.stop_loss,
                };
                (exit_price - t.entry_price) / t.entry_price * 100.0
            })
            .collect();
        returns.iter().sum::<f64>() / returns.len() as f64
    };

    SymbolReport {
        symbol: symbol.to_owned(),
        total_trades,
        win_rate_pct,
        total_pnl,
        gross_profit,
        gross_loss,
        profit_factor,
        max_drawdown_pct,
        max_drawdown_dollar,
        avg_trade_return_pct,
        commissions,
    }
}

fn cagr(general: &[EquitySample], initial_balance: f64, final_equity: f64) -> f64 {
    if general.len() < 2 || initial_balance <= 0.0 {
        return 0.0;
    }
    let t_start = general.first().unwrap().timestamp_ms;
    let t_end = general.last().unwrap().timestamp_ms;
    let years = (t_end - t_start) as f64 / MS_PER_YEAR;
    if years <= 0.0 {
        return 0.0;
    }
    ((final_equity / initial_balance).powf(1.0 / years) - 1.0) * 100.0
}

fn drawdown(series: &[EquitySample]) -> (f64, f64) {
    if series.is_empty() {
        return (0.0, 0.0);
    }
    let mut peak = series[0].equity;
    let mut max_dd_pct = 0.0f64;
    let mut max_dd_dollar = 0.0f64;
    for s in series {
        if s.equity > peak {
            peak = s.equity;
        }
        if peak != 0.0 {
            let dd_pct = (s.equity - peak) / peak * 100.0;
            if dd_pct < max_dd_pct {
                max_dd_pct = dd_pct;
            }
        }
        let dd_dollar = s.equity - peak;
        if dd_dollar < max_dd_dollar {
            max_dd_dollar = dd_dollar;
        }
    }
    (max_dd_pct, max_dd_dollar)
}

trait Bucket {
    fn key(&self, timestamp_ms: i64) -> (i32, u32, u32);
}
struct DailyBucket;
struct MonthlyBucket;

impl Bucket for DailyBucket {
    fn key(&self, timestamp_ms: i64) -> (i32, u32, u32) {
        let dt = Utc.timestamp_millis_opt(timestamp_ms).single().unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap());
        (dt.year(), dt.month(), dt.day())
    }
}
impl Bucket for MonthlyBucket {
    fn key(&self, timestamp_ms: i64) -> (i32, u32, u32) {
        let dt = Utc.timestamp_millis_opt(timestamp_ms).single().unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap());
        (dt.year(), dt.month(), 0)
    }
}

/// Last equity sample per bucket, in chronological bucket order.
fn bucketed_last(series: &[EquitySample], bucket: impl Bucket) -> Vec<f64> {
    let mut buckets: BTreeMap<(i32, u32, u32), f64> = BTreeMap::new();
    for s in series {
        buckets.insert(bucket.key(s.timestamp_ms), s.equity);
    }
    buckets.into_values().collect()
}

fn periodic_returns(series: &[EquitySample], bucket: impl Bucket) -> Vec<f64> {
    let levels = bucketed_last(series, bucket);
    levels
        .windows(2)
        .filter_map(|w| if w[0] != 0.0 { Some(w[1] / w[0] - 1.0) } else { None })
        .collect()
}

fn sharpe(returns: &[f64], periods_per_year: f64) -> (f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0);
    }
    let m = mean(returns);
    let std = std_dev(returns);
    let monthly = if std > 1e-12 { m / std } else { 0.0 };
    (monthly, monthly * periods_per_year.sqrt())
}

fn sortino(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let excess: Vec<f64> = returns.iter().map(|r| r - risk_free_rate / periods_per_year).collect();
    let downside: Vec<f64> = excess.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.len() < 2 {
        return (0.0, 0.0);
    }
    let downside_std = std_dev(&downside);
    let mean_excess = mean(&excess);
    let monthly = if downside_std > 1e-12 { mean_excess / downside_std } else { 0.0 };
    (monthly, monthly * periods_per_year.sqrt())
}

fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let rank = (pct / 100.0) * (sorted.len() as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// OLS R² of `equity` against its integer bar index `0..n`.
fn r_squared_vs_index(series: &[EquitySample]) -> f64 {
    let n = series.len();
    if n < 2 {
        return 0.0;
    }
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let ys: Vec<f64> = series.iter().map(|s| s.equity).collect();

    let x_mean = mean(&xs);
    let y_mean = mean(&ys);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for i in 0..n {
        cov += (xs[i] - x_mean) * (ys[i] - y_mean);
        var_x += (xs[i] - x_mean).powi(2);
    }
    if var_x < 1e-12 {
        return 0.0;
    }
    let slope = cov / var_x;
    let intercept = y_mean - slope * x_mean;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for i in 0..n {
        let pred = slope * xs[i] + intercept;
        ss_res += (ys[i] - pred).powi(2);
        ss_tot += (ys[i] - y_mean).powi(2);
    }
    if ss_tot < 1e-12 {
        return 1.0;
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: i64, e: f64) -> EquitySample {
        EquitySample { timestamp_ms: t, equity: e }
    }

    #[test]
    fn drawdown_flat_is_zero() {
        let series = vec![sample(0, 100.0), sample(1, 100.0), sample(2, 100.0)];
        let (pct, dollar) = drawdown(&series);
        assert_eq!(pct, 0.0);
        assert_eq!(dollar, 0.0);
    }

    #[test]
    fn drawdown_50_pct() {
        let series = vec![sample(0, 100.0), sample(1, 120.0), sample(2, 60.0), sample(3, 80.0)];
        let (pct, _) = drawdown(&series);
        assert!((pct + 50.0).abs() < 1e-9, "pct = {pct}");
    }

    #[test]
    fn r_squared_of_a_perfect_line_is_one() {
        let series: Vec<EquitySample> = (0..10).map(|i| sample(i as i64, 100.0 + i as f64 * 5.0)).collect();
        let r2 = r_squared_vs_index(&series);
        assert!((r2 - 1.0).abs() < 1e-9, "r2 = {r2}");
    }

    #[test]
    fn percentile_of_sorted_values() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
        assert!((percentile(&values, 50.0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_equity_gives_zeroed_report() {
        let portfolio = Portfolio::new(10_000.0, 1, 0.0002, 0.0005);
        let report = compute_metrics(&portfolio, 0.0);
        assert_eq!(report.final_equity, 10_000.0);
        assert_eq!(report.net_profit_dollar, 0.0);
    }
}
