/// exchange/types.rs — wire types for the exchange's REST responses.
///
/// A kline arrives as a 12-element JSON array in the canonical exchange
/// order; a trade arrives as a JSON object. Both tolerate fields encoded as
/// either a JSON string or a JSON number, which real exchange payloads mix
/// depending on endpoint and precision settings.
use crate::error::BarforgeError;
use serde::Deserialize;

/// One matched execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: u64,
    pub price: f64,
    pub qty: f64,
    pub quote_qty: f64,
    pub time_ms: i64,
    /// True if the resting order was the buy side — i.e. the aggressor was
    /// a seller, so the trade is sell-initiated.
    pub is_buyer_maker: bool,
    pub is_best_match: bool,
}

impl Trade {
    /// +1 if the buyer was the aggressor, -1 otherwise.
    pub fn sign(&self) -> i64 {
        if self.is_buyer_maker {
            -1
        } else {
            1
        }
    }
}

/// Time-bucketed OHLCV summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time_ms: i64,
    pub quote_asset_volume: f64,
    pub num_trades: i64,
    pub taker_buy_base_vol: f64,
    pub taker_buy_quote_vol: f64,
    /// Binance's unused 12th array element, carried through unparsed.
    pub ignore: String,
}

// ── Raw exchange response shapes ──────────────────────────────────────────

/// Raw 12-element kline array. Index layout: [open_time, open, high, low,
/// close, volume, close_time, quote_vol, n_trades, taker_buy_base,
/// taker_buy_quote, ignore].
#[derive(Deserialize)]
pub(crate) struct RawKline(
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
);

fn parse_f64(v: &serde_json::Value) -> f64 {
    match v {
        serde_json::Value::String(s) => s.parse().unwrap_or(0.0),
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn parse_i64(v: &serde_json::Value) -> i64 {
    v.as_i64().unwrap_or(0)
}

fn parse_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<RawKline> for Kline {
    fn from(r: RawKline) -> Self {
        Kline {
            open_time_ms: parse_i64(&r.0),
            open: parse_f64(&r.1),
            high: parse_f64(&r.2),
            low: parse_f64(&r.3),
            close: parse_f64(&r.4),
            volume: parse_f64(&r.5),
            close_time_ms: parse_i64(&r.6),
            quote_asset_volume: parse_f64(&r.7),
            num_trades: parse_i64(&r.8),
            taker_buy_base_vol: parse_f64(&r.9),
            taker_buy_quote_vol: parse_f64(&r.10),
            ignore: parse_string(&r.11),
        }
    }
}

pub(crate) fn klines_from_raw(raw: Vec<RawKline>) -> Vec<Kline> {
    raw.into_iter().map(Kline::from).collect()
}

/// Raw trade object, covering both `recentTrades`/`historicalTrades` shapes.
#[derive(Deserialize, Debug)]
pub(crate) struct RawTrade {
    pub id: u64,
    pub price: String,
    pub qty: String,
    #[serde(rename = "quoteQty")]
    pub quote_qty: String,
    pub time: i64,
    #[serde(rename = "isBuyerMaker")]
    pub is_buyer_maker: bool,
    #[serde(rename = "isBestMatch", default)]
    pub is_best_match: bool,
}

impl TryFrom<RawTrade> for Trade {
    type Error = BarforgeError;

    fn try_from(r: RawTrade) -> Result<Self, Self::Error> {
        let price: f64 = r
            .price
            .parse()
            .map_err(|_| BarforgeError::BadInput(format!("trade {}: bad price", r.id)))?;
        let qty: f64 = r
            .qty
            .parse()
            .map_err(|_| BarforgeError::BadInput(format!("trade {}: bad qty", r.id)))?;
        let quote_qty: f64 = r
            .quote_qty
            .parse()
            .map_err(|_| BarforgeError::BadInput(format!("trade {}: bad quoteQty", r.id)))?;
        Ok(Trade {
            id: r.id,
            price,
            qty,
            quote_qty,
            time_ms: r.time,
            is_buyer_maker: r.is_buyer_maker,
            is_best_match: r.is_best_match,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_sign_buyer_maker_is_sell_initiated() {
        let t = Trade {
            id: 1,
            price: 100.0,
            qty: 1.0,
            quote_qty: 100.0,
            time_ms: 0,
            is_buyer_maker: true,
            is_best_match: true,
        };
        assert_eq!(t.sign(), -1);
    }

    #[test]
    fn trade_sign_buyer_taker_is_buy_initiated() {
        let t = Trade {
            id: 1,
            price: 100.0,
            qty: 1.0,
            quote_qty: 100.0,
            time_ms: 0,
            is_buyer_maker: false,
            is_best_match: true,
        };
        assert_eq!(t.sign(), 1);
    }
}
