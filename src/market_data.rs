//! Per-symbol market data derived from the trade stream: a running OHLCV
//! candle and a bounded recent-trade history.
//!
//! Fed by the API layer after each successful match; reads return copies so
//! no caller ever holds the lock across I/O.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use crate::types::{now_millis, Trade};

/// Recent trades kept per symbol.
const RECENT_TRADE_CAP: usize = 1000;
/// Hard cap on a single recent-trades query.
const MAX_TRADE_QUERY: usize = 10_000;
const DEFAULT_TRADE_QUERY: usize = 100;

/// Running candle over the process lifetime of a symbol.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Ohlcv {
    pub symbol: String,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: i64,
    pub timestamp: i64,
}

struct SymbolData {
    candle: Ohlcv,
    trades: VecDeque<Trade>,
}

#[derive(Default)]
pub struct MarketData {
    inner: RwLock<HashMap<String, SymbolData>>,
}

impl MarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one executed trade into the symbol's candle and history.
    pub fn record_trade(&self, symbol: &str, trade: &Trade) {
        let mut inner = self.inner.write();
        let data = inner.entry(symbol.to_string()).or_insert_with(|| SymbolData {
            candle: Ohlcv {
                symbol: symbol.to_string(),
                open: trade.price,
                high: trade.price,
                low: trade.price,
                close: trade.price,
                volume: 0,
                timestamp: now_millis(),
            },
            trades: VecDeque::with_capacity(64),
        });

        let candle = &mut data.candle;
        candle.high = candle.high.max(trade.price);
        candle.low = candle.low.min(trade.price);
        candle.close = trade.price;
        candle.volume += trade.quantity;

        data.trades.push_back(trade.clone());
        if data.trades.len() > RECENT_TRADE_CAP {
            data.trades.pop_front();
        }
    }

    /// The symbol's candle, or None before its first trade.
    pub fn ohlcv(&self, symbol: &str) -> Option<Ohlcv> {
        self.inner.read().get(symbol).map(|d| d.candle.clone())
    }

    /// Up to `limit` most recent trades, oldest first. A zero limit falls back
    /// to the default; oversized limits are clamped.
    pub fn recent_trades(&self, symbol: &str, limit: usize) -> Vec<Trade> {
        let limit = match limit {
            0 => DEFAULT_TRADE_QUERY,
            n => n.min(MAX_TRADE_QUERY),
        };
        let inner = self.inner.read();
        let Some(data) = inner.get(symbol) else {
            return Vec::new();
        };
        let skip = data.trades.len().saturating_sub(limit);
        data.trades.iter().skip(skip).cloned().collect()
    }
}
