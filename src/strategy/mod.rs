/// strategy/mod.rs — the pluggable signal interface.
///
/// A Strategy is polymorphic over one operation: given a symbol and its
/// latest bar, return either no signal or a fully-specified order. Per-symbol
/// rolling state lives inside the implementor; the driver never inspects it.
pub mod rsi;

pub use rsi::RsiStrategy;

use crate::bars::Bar;
use crate::portfolio::Direction;

/// A strategy's output for one bar: a market order with a TP/SL bracket.
/// `volume` is quote-currency notional, pre-leverage.
#[derive(Debug, Clone)]
pub struct OrderSignal {
    pub volume: f64,
    pub direction: Direction,
    pub strategy_name: &'static str,
    pub take_profit: f64,
    pub stop_loss: f64,
}

pub trait Strategy {
    fn on_bar(&mut self, symbol: &str, bar: &Bar) -> Option<OrderSignal>;
}
