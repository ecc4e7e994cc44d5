/// execution.rs — wires a Strategy's signal into the Portfolio ledger.
///
/// `process` always runs the ledger update before asking the strategy for a
/// new signal, so an order generated from bar N is not visible to
/// `Portfolio::update` until the next call — i.e. it fills at bar N+1's
/// close, never the bar it was generated on.
use crate::bars::Bar;
use crate::error::BarforgeError;
use crate::portfolio::Portfolio;
use crate::strategy::Strategy;

pub struct ExecutionHandler<S: Strategy> {
    pub portfolio: Portfolio,
    strategy: S,
}

impl<S: Strategy> ExecutionHandler<S> {
    pub fn new(portfolio: Portfolio, strategy: S) -> Self {
        Self { portfolio, strategy }
    }

    pub fn process(&mut self, symbol: &str, bar: &Bar) -> Result<(), BarforgeError> {
        self.portfolio.update(symbol, bar)?;

        if let Some(signal) = self.strategy.on_bar(symbol, bar) {
            self.portfolio.submit(
                symbol,
                signal.volume,
                signal.direction,
                bar.start_time,
                signal.strategy_name,
                bar.close,
                signal.take_profit,
                signal.stop_loss,
            );
        }

        Ok(())
    }

    pub fn into_portfolio(self) -> Portfolio {
        self.portfolio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::Direction;
    use crate::strategy::{OrderSignal, Strategy};

    struct OneShotBuy {
        fired: bool,
    }

    impl Strategy for OneShotBuy {
        fn on_bar(&mut self, _symbol: &str, bar: &Bar) -> Option<OrderSignal> {
            if self.fired {
                return None;
            }
            self.fired = true;
            Some(OrderSignal {
                volume: 100.0,
                direction: Direction::Buy,
                strategy_name: "one_shot",
                take_profit: bar.close * 1.05,
                stop_loss: bar.close * 0.95,
            })
        }
    }

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
    fn order_fills_on_the_bar_after_submission() {
        let portfolio = Portfolio::new(10_000.0, 1, 0.0, 0.0);
        let mut handler = ExecutionHandler::new(portfolio, OneShotBuy { fired: false });

        handler.process("BTCUSDT", &bar(100.0, 0)).unwrap();
        assert!(handler.portfolio.positions.is_empty(), "no fill on the submission bar");

        handler.process("BTCUSDT", &bar(101.0, 60_000)).unwrap();
        assert_eq!(handler.portfolio.positions.len(), 1);
        assert_eq!(handler.portfolio.positions[0].entry_price, 101.0);
    }
}
