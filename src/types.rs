//! Core data model: ids, sides, order types, the order lifecycle, and trades.
//!
//! Prices are integers in minor currency units (cents); quantities are whole
//! units. Identifiers are newtype wrappers around server-assigned UUIDs.

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unique order identifier, assigned by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for OrderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique trade identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TradeId(pub Uuid);

impl TradeId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Order type: limit (with price) or market (take best available).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

/// Order lifecycle status.
///
/// Accepted and PartialFill orders rest in the book; Filled and Cancelled are
/// terminal and never re-enter it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Accepted,
    PartialFill,
    Filled,
    Cancelled,
}

impl OrderStatus {
    /// Whether the order can take no further fills or cancels.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }

    /// Legal lifecycle transitions. A repeated PartialFill is legal: a resting
    /// order can be hit by several successive aggressors.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Accepted, PartialFill | Filled | Cancelled) | (PartialFill, PartialFill | Filled | Cancelled)
        )
    }
}

/// An order request as submitted by a client. The engine assigns identity and
/// timestamps; any client-supplied id is ignored.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Limit price in minor units. Required for LIMIT; ignored for MARKET.
    #[serde(default)]
    pub price: i64,
    pub quantity: i64,
}

/// A live order, owned by the engine's registry. Price levels reference it by
/// id only.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Order {
    #[serde(rename = "order_id")]
    pub id: OrderId,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub price: i64,
    pub quantity: i64,
    #[serde(rename = "filled_quantity")]
    pub filled_qty: i64,
    pub status: OrderStatus,
    /// Unix ms, assigned when the engine accepted the order.
    pub timestamp: i64,
}

impl Order {
    /// Quantity still open. Zero once fully filled.
    pub fn remaining(&self) -> i64 {
        self.quantity - self.filled_qty
    }
}

/// An executed trade between one buy and one sell order. Immutable once
/// emitted; the price is always the resting order's price.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub buy_order: OrderId,
    pub sell_order: OrderId,
    pub price: i64,
    pub quantity: i64,
    /// Unix ms at emission. Non-decreasing within one aggressor, not unique.
    pub timestamp: i64,
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
