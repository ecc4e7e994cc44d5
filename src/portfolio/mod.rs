/// portfolio/mod.rs — orders, positions, the ledger and equity sampling.
///
/// `Portfolio` owns every mutable accounting table. Orders are queued
/// `Pending` by `submit`; `update(symbol, bar)` is the only place state
/// changes thereafter, and always runs its four steps in order: fill
/// pending orders, resolve TP/SL, realize closed trades, sample equity.
/// Commissions are charged once, against cash, at the moment a trade
/// closes (Step 3) — `portfolio_equity` at Step 4 never re-subtracts them.
use std::collections::HashMap;

use tracing::warn;

use crate::bars::Bar;
use crate::error::BarforgeError;

pub const GENERAL: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Filled,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedBy {
    Tp,
    Sl,
}

/// How a same-bar TP/SL double-hit is resolved. Klines carry no intrabar
/// path, so either choice is an approximation; `TpFirst` is the documented
/// default (Open Question 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TpSlPolicy {
    #[default]
    TpFirst,
    SlFirst,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub order_id: u64,
    pub symbol: String,
    /// Quote-currency notional, pre-leverage.
    pub volume: f64,
    pub direction: Direction,
    pub order_time: i64,
    pub strategy_name: String,
    pub status: OrderStatus,
    pub entry_price_hint: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
}

#[derive(Debug, Clone)]
pub struct Position {
    pub order_id: u64,
    pub symbol: String,
    /// Notional after leverage: `order.volume * leverage`.
    pub volume: f64,
    pub direction: Direction,
    pub entry_time: i64,
    pub entry_price: f64,
    pub leverage: u32,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub order_id: u64,
    pub symbol: String,
    pub pnl: f64,
    pub volume: f64,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: i64,
    pub exit_time: i64,
    pub stop_loss: f64,
    pub break_even: f64,
    pub take_profit: f64,
    pub closed_by: ClosedBy,
    pub commissions: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquitySample {
    pub timestamp_ms: i64,
    pub equity: f64,
}

pub struct Portfolio {
    pub order_history: Vec<Order>,
    pub positions: Vec<Position>,
    pub trade_history: Vec<TradeRecord>,
    pub equity_history: HashMap<String, Vec<EquitySample>>,

    cash: f64,
    initial_capital: f64,
    leverage: u32,
    maker_fee: f64,
    taker_fee: f64,
    tp_sl_policy: TpSlPolicy,
    next_order_id: u64,
}

impl Portfolio {
    pub fn new(initial_balance: f64, leverage: u32, maker_fee: f64, taker_fee: f64) -> Self {
        Self {
            order_history: Vec::new(),
            positions: Vec::new(),
            trade_history: Vec::new(),
            equity_history: HashMap::new(),
            cash: initial_balance,
            initial_capital: initial_balance,
            leverage,
            maker_fee,
            taker_fee,
            tp_sl_policy: TpSlPolicy::default(),
            next_order_id: 0,
        }
    }

    pub fn with_tp_sl_policy(mut self, policy: TpSlPolicy) -> Self {
        self.tp_sl_policy = policy;
        self
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Queue a strategy-issued order as `Pending`; it is not filled until a
    /// later call to `update` for the same symbol.
    pub fn submit(
        &mut self,
        symbol: &str,
        volume: f64,
        direction: Direction,
        order_time: i64,
        strategy_name: &str,
        entry_price_hint: f64,
        take_profit: f64,
        stop_loss: f64,
    ) -> u64 {
        let order_id = self.next_order_id;
        self.next_order_id += 1;
        self.order_history.push(Order {
            order_id,
            symbol: symbol.to_owned(),
            volume,
            direction,
            order_time,
            strategy_name: strategy_name.to_owned(),
            status: OrderStatus::Pending,
            entry_price_hint,
            take_profit,
            stop_loss,
        });
        order_id
    }

    /// Steps 1-4 of the per-bar ledger update for one symbol.
    pub fn update(&mut self, symbol: &str, bar: &Bar) -> Result<(), BarforgeError> {
        self.fill_pending(symbol, bar);
        self.resolve_tp_sl(symbol, bar);
        self.sample_equity(symbol, bar.start_time);
        Ok(())
    }

    // Step 1.
    fn fill_pending(&mut self, symbol: &str, bar: &Bar) {
        let pending_ids: Vec<u64> = self
            .order_history
            .iter()
            .filter(|o| o.symbol == symbol && o.status == OrderStatus::Pending)
            .map(|o| o.order_id)
            .collect();

        for order_id in pending_ids {
            let idx = self
                .order_history
                .iter()
                .position(|o| o.order_id == order_id)
                .expect("order just listed above");
            let notional = self.order_history[idx].volume * self.leverage as f64;

            if notional > self.cash {
                self.order_history[idx].status = OrderStatus::Rejected;
                warn!(
                    "{symbol}: order {order_id} rejected, insufficient equity (notional {notional:.2} > cash {:.2})",
                    self.cash
                );
                continue;
            }

            self.cash -= notional / self.leverage as f64;
            let order = &mut self.order_history[idx];
            order.status = OrderStatus::Filled;
            self.positions.push(Position {
                order_id,
                symbol: symbol.to_owned(),
                volume: notional,
                direction: order.direction,
                entry_time: bar.start_time,
                entry_price: bar.close,
                leverage: self.leverage,
                unrealized_pnl: 0.0,
                realized_pnl: 0.0,
                take_profit: order.take_profit,
                stop_loss: order.stop_loss,
            });
        }
    }

    // Step 2 + Step 3 (close path happens inline when TP/SL fires).
    fn resolve_tp_sl(&mut self, symbol: &str, bar: &Bar) {
        let open_ids: Vec<u64> = self
            .positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .map(|p| p.order_id)
            .collect();

        for order_id in open_ids {
            let idx = match self.positions.iter().position(|p| p.order_id == order_id) {
                Some(i) => i,
                None => continue,
            };
            let pos = self.positions[idx].clone_for_check();

            let hit = match pos.direction {
                Direction::Buy => {
                    let tp_hit = bar.high >= pos.take_profit;
                    let sl_hit = bar.low <= pos.stop_loss;
                    resolve_hit(tp_hit, sl_hit, self.tp_sl_policy)
                }
                Direction::Sell => {
                    let tp_hit = bar.low <= pos.take_profit;
                    let sl_hit = bar.high >= pos.stop_loss;
                    resolve_hit(tp_hit, sl_hit, self.tp_sl_policy)
                }
            };

            match hit {
                Some(closed_by) => {
                    let exit_price = match closed_by {
                        ClosedBy::Tp => pos.take_profit,
                        ClosedBy::Sl => pos.stop_loss,
                    };
                    self.close_position(idx, exit_price, closed_by, bar.start_time);
                }
                None => {
                    let unrealized = calculate_pnl(pos.entry_price, bar.close, pos.volume, pos.direction);
                    self.positions[idx].unrealized_pnl = unrealized;
                }
            }
        }
    }

    // Step 3: realize pnl, charge commissions, return margin + pnl to cash.
    fn close_position(&mut self, idx: usize, exit_price: f64, closed_by: ClosedBy, exit_time: i64) {
        let pos = self.positions.remove(idx);
        let pnl = calculate_pnl(pos.entry_price, exit_price, pos.volume, pos.direction);
        let commissions = pos.volume * (self.maker_fee + self.taker_fee);

        self.cash += pos.volume / pos.leverage as f64 + pnl - commissions;

        self.trade_history.push(TradeRecord {
            order_id: pos.order_id,
            symbol: pos.symbol,
            pnl,
            volume: pos.volume,
            direction: pos.direction,
            entry_price: pos.entry_price,
            entry_time: pos.entry_time,
            exit_time,
            stop_loss: pos.stop_loss,
            break_even: 0.0,
            take_profit: pos.take_profit,
            closed_by,
            commissions,
        });
    }

    // Step 4.
    fn sample_equity(&mut self, symbol: &str, timestamp_ms: i64) {
        let symbol_pnl = self.symbol_pnl(symbol);
        self.equity_history
            .entry(symbol.to_owned())
            .or_default()
            .push(EquitySample { timestamp_ms, equity: symbol_pnl });

        let portfolio_equity = self.portfolio_equity();
        self.equity_history
            .entry(GENERAL.to_owned())
            .or_default()
            .push(EquitySample { timestamp_ms, equity: portfolio_equity });
    }

    fn symbol_pnl(&self, symbol: &str) -> f64 {
        let realized_closed: f64 = self
            .trade_history
            .iter()
            .filter(|t| t.symbol == symbol)
            .map(|t| t.pnl)
            .sum();
        let open_realized: f64 = self
            .positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .map(|p| p.realized_pnl)
            .sum();
        let open_unrealized: f64 = self
            .positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .map(|p| p.unrealized_pnl)
            .sum();
        realized_closed + open_realized + open_unrealized
    }

    /// `cash + Σopen.unrealized + Σopen.notional/leverage`. Commissions are
    /// not re-subtracted here: they were already deducted from `cash` when
    /// each trade closed (Step 3), so subtracting them again would
    /// double-count — the accounting identity below holds with a single
    /// commission term on the right-hand side.
    pub fn portfolio_equity(&self) -> f64 {
        let unrealized: f64 = self.positions.iter().map(|p| p.unrealized_pnl).sum();
        let open_notional: f64 = self.positions.iter().map(|p| p.volume / p.leverage as f64).sum();
        self.cash + unrealized + open_notional
    }

    pub fn total_commissions(&self) -> f64 {
        self.trade_history.iter().map(|t| t.commissions).sum()
    }

    pub fn total_realized_pnl(&self) -> f64 {
        self.trade_history.iter().map(|t| t.pnl).sum()
    }

    /// `portfolio_equity == initial_balance + Σrealized − Σcommissions`,
    /// within floating-point tolerance. Exposed for tests and for a
    /// continuous sanity check a caller may run after every bar.
    pub fn accounting_identity_holds(&self, tol: f64) -> bool {
        let lhs = self.portfolio_equity();
        let rhs = self.initial_capital + self.total_realized_pnl() - self.total_commissions();
        (lhs - rhs).abs() <= tol
    }
}

impl Position {
    fn clone_for_check(&self) -> Position {
        self.clone()
    }
}

fn resolve_hit(tp_hit: bool, sl_hit: bool, policy: TpSlPolicy) -> Option<ClosedBy> {
    match (tp_hit, sl_hit, policy) {
        (true, true, TpSlPolicy::TpFirst) => Some(ClosedBy::Tp),
        (true, true, TpSlPolicy::SlFirst) => Some(ClosedBy::Sl),
        (true, false, _) => Some(ClosedBy::Tp),
        (false, true, _) => Some(ClosedBy::Sl),
        (false, false, _) => None,
    }
}

fn calculate_pnl(entry_price: f64, current_price: f64, volume: f64, direction: Direction) -> f64 {
    let asset_volume = volume / entry_price;
    match direction {
        Direction::Buy => (current_price - entry_price) * asset_volume,
        Direction::Sell => (entry_price - current_price) * asset_volume,
    }
}
