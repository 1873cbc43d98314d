//! Per-symbol trade fan-out for WebSocket clients.
//!
//! Each symbol gets a tokio broadcast channel; subscribers that fall behind
//! miss messages rather than applying backpressure to the matching path.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::types::Trade;

const CHANNEL_CAPACITY: usize = 64;

/// Message pushed to every subscriber of a symbol.
#[derive(Clone, Debug, serde::Serialize)]
pub struct TradeEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub symbol: String,
    pub payload: Trade,
}

#[derive(Default)]
pub struct WsHub {
    channels: RwLock<HashMap<String, broadcast::Sender<TradeEvent>>>,
}

impl WsHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a symbol's trade stream, creating the channel on first
    /// use.
    pub fn subscribe(&self, symbol: &str) -> broadcast::Receiver<TradeEvent> {
        let mut channels = self.channels.write();
        channels
            .entry(symbol.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Pushes one trade to current subscribers. Dropped silently when nobody
    /// is listening.
    pub fn broadcast_trade(&self, symbol: &str, trade: &Trade) {
        let channels = self.channels.read();
        if let Some(tx) = channels.get(symbol) {
            let _ = tx.send(TradeEvent {
                kind: "trade",
                symbol: symbol.to_string(),
                payload: trade.clone(),
            });
        }
    }
}
