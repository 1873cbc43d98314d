//! # CLOB Engine
//!
//! Single-venue, in-memory order matching engine for a price-time-priority
//! continuous limit order book, with a REST/WebSocket surface around it.
//!
//! ## Entry point
//!
//! Use [`MatchingEngine`] as the single entry point: create with
//! [`MatchingEngine::new`], then [`MatchingEngine::place_order`] and
//! [`MatchingEngine::cancel_order`]. The engine is `Sync`; share it behind an
//! `Arc` and call it from as many threads or tasks as you like.
//!
//! ## Example
//!
//! ```rust
//! use clob_engine::{MatchingEngine, OrderRequest, OrderStatus, OrderType, Side};
//!
//! let engine = MatchingEngine::new();
//! let (order, trades) = engine
//!     .place_order(&OrderRequest {
//!         symbol: "AAPL".into(),
//!         side: Side::Buy,
//!         order_type: OrderType::Limit,
//!         price: 15000,
//!         quantity: 100,
//!     })
//!     .unwrap();
//! assert_eq!(order.status, OrderStatus::Accepted);
//! assert!(trades.is_empty());
//! ```
//!
//! ## Serving
//!
//! [`api::create_router`] wires the engine into an axum router exposing
//! order entry, book depth, market data, metrics, and a per-symbol trade
//! WebSocket; see the binary for the full service.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod metrics;
pub mod order_book;
pub mod order_gen;
pub mod types;
pub mod ws;

pub use config::Config;
pub use engine::{BookDepth, DepthLevel, MatchingEngine};
pub use error::EngineError;
pub use market_data::{MarketData, Ohlcv};
pub use order_book::{OrderBook, PriceLevel, SideBook};
pub use types::{Order, OrderId, OrderRequest, OrderStatus, OrderType, Side, Trade, TradeId};
