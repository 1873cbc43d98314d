//! Multi-symbol matching engine: validation, price-time-priority matching,
//! cancellation, and read-only snapshots.
//!
//! One engine-wide RwLock guards the symbol→book map, the id→order registry,
//! and all book state; `place_order` and `cancel_order` hold it exclusively
//! for the whole operation, reads take it shared. The append-only trade log
//! has its own mutex so appends under the write lock cannot invert lock
//! order. Matching runs to completion inline on the calling thread.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use crate::error::EngineError;
use crate::metrics::Metrics;
use crate::order_book::{OrderBook, SideBook};
use crate::types::{now_millis, Order, OrderId, OrderRequest, OrderStatus, OrderType, Side, Trade, TradeId};

/// One aggregated depth level: price plus summed remaining quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DepthLevel {
    pub price: i64,
    pub quantity: i64,
}

/// Aggregated top-of-book view, best levels first on both sides.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BookDepth {
    pub symbol: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

#[derive(Default)]
struct EngineState {
    books: HashMap<String, OrderBook>,
    orders: HashMap<OrderId, Order>,
}

/// The matching engine. Cheap to share behind an `Arc`; all methods take
/// `&self`.
pub struct MatchingEngine {
    state: RwLock<EngineState>,
    trades: Mutex<Vec<Trade>>,
    metrics: Metrics,
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EngineState::default()),
            trades: Mutex::new(Vec::with_capacity(1024)),
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Validates, matches, and registers one incoming order. Returns the
    /// order's final state and the trades it produced, in execution order.
    ///
    /// LIMIT orders walk the opposite side while prices cross and rest any
    /// remainder in their own side. MARKET orders are admitted only when the
    /// opposite side displays enough quantity to fill them completely;
    /// otherwise the book is left untouched and `InsufficientLiquidity` is
    /// returned.
    pub fn place_order(&self, req: &OrderRequest) -> Result<(Order, Vec<Trade>), EngineError> {
        validate_order_request(req)?;
        self.metrics.record_order_received();

        // Identity and timestamp are assigned before taking the lock.
        let mut incoming = Order {
            id: OrderId::generate(),
            symbol: req.symbol.clone(),
            side: req.side,
            order_type: req.order_type,
            price: req.price,
            quantity: req.quantity,
            filled_qty: 0,
            status: OrderStatus::Accepted,
            timestamp: now_millis(),
        };

        let mut guard = self.state.write();
        let state = &mut *guard;
        let book = state
            .books
            .entry(incoming.symbol.clone())
            .or_insert_with(|| OrderBook::new(incoming.symbol.clone()));

        let opposite = match incoming.side {
            Side::Buy => &mut book.asks,
            Side::Sell => &mut book.bids,
        };

        if incoming.order_type == OrderType::Market && opposite.total_quantity() < incoming.quantity {
            return Err(EngineError::InsufficientLiquidity);
        }

        let trades = self.walk_book(opposite, &mut state.orders, &mut incoming)?;

        match incoming.order_type {
            OrderType::Limit => {
                if incoming.remaining() > 0 {
                    if incoming.filled_qty > 0 {
                        transition(&mut incoming, OrderStatus::PartialFill);
                    }
                    let own = match incoming.side {
                        Side::Buy => &mut book.bids,
                        Side::Sell => &mut book.asks,
                    };
                    own.add_order(&incoming);
                } else {
                    transition(&mut incoming, OrderStatus::Filled);
                }
            }
            // The liquidity check above guarantees a full fill.
            OrderType::Market => transition(&mut incoming, OrderStatus::Filled),
        }

        if !trades.is_empty() {
            self.metrics.record_order_matched();
            self.metrics.record_trades(trades.len() as u64);
        }

        state.orders.insert(incoming.id, incoming.clone());
        Ok((incoming, trades))
    }

    /// Consumes the opposite side while the incoming order has quantity left
    /// and (for LIMIT) the best level still crosses. Fills are FIFO within a
    /// level; each fill trades at the resting order's price.
    fn walk_book(
        &self,
        opposite: &mut SideBook,
        orders: &mut HashMap<OrderId, Order>,
        incoming: &mut Order,
    ) -> Result<Vec<Trade>, EngineError> {
        let mut trades = Vec::with_capacity(4);

        while incoming.remaining() > 0 {
            let Some(price) = opposite.best_price() else {
                break;
            };

            if incoming.order_type == OrderType::Limit {
                let crosses = match incoming.side {
                    Side::Buy => price <= incoming.price,
                    Side::Sell => price >= incoming.price,
                };
                if !crosses {
                    break;
                }
            }

            let mut consumed = 0;
            let level = opposite
                .level_mut(price)
                .ok_or(EngineError::Internal("best price has no level"))?;

            while incoming.remaining() > 0 {
                let Some(resting_id) = level.front() else {
                    break;
                };
                let resting = orders
                    .get_mut(&resting_id)
                    .ok_or(EngineError::Internal("resting order missing from registry"))?;

                let resting_remaining = resting.remaining();
                if resting_remaining <= 0 {
                    // Fully filled orders are dequeued at fill time; drop any
                    // stale entry rather than trading against it.
                    level.dequeue();
                    continue;
                }

                let fill = incoming.remaining().min(resting_remaining);
                incoming.filled_qty += fill;
                resting.filled_qty += fill;
                consumed += fill;

                let fully_filled = resting.filled_qty == resting.quantity;
                transition(
                    resting,
                    if fully_filled { OrderStatus::Filled } else { OrderStatus::PartialFill },
                );

                let (buy_order, sell_order) = match incoming.side {
                    Side::Buy => (incoming.id, resting.id),
                    Side::Sell => (resting.id, incoming.id),
                };
                let trade = Trade {
                    trade_id: TradeId::generate(),
                    buy_order,
                    sell_order,
                    price,
                    quantity: fill,
                    timestamp: now_millis(),
                };
                self.trades.lock().push(trade.clone());
                trades.push(trade);

                if fully_filled {
                    level.dequeue();
                }
            }

            let level_drained = level.is_empty();
            opposite.reduce_total_quantity(consumed);
            if level_drained {
                opposite.remove_price(price);
            }
        }

        Ok(trades)
    }

    /// Cancels a resting order. Synchronous and all-or-nothing: once this
    /// returns Ok, the order will not participate in any future match.
    pub fn cancel_order(&self, id: OrderId) -> Result<(), EngineError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let order = state.orders.get_mut(&id).ok_or(EngineError::OrderNotFound)?;
        if order.status.is_terminal() {
            return Err(EngineError::OrderAlreadyFinalized);
        }

        let book = state.books.get_mut(&order.symbol).ok_or(EngineError::OrderNotFound)?;
        let side_book = match order.side {
            Side::Buy => &mut book.bids,
            Side::Sell => &mut book.asks,
        };

        let remaining = order.remaining();
        if remaining <= 0 {
            return Err(EngineError::OrderAlreadyFinalized);
        }

        // A missing level or queue entry means the order was consumed while
        // its status lagged; treat it the same as an already-final order.
        let Some(level) = side_book.level_mut(order.price) else {
            return Err(EngineError::OrderAlreadyFinalized);
        };
        if !level.remove_by_id(id) {
            return Err(EngineError::OrderAlreadyFinalized);
        }
        let level_drained = level.is_empty();

        side_book.reduce_total_quantity(remaining);
        if level_drained {
            side_book.remove_price(order.price);
        }

        transition(order, OrderStatus::Cancelled);
        self.metrics.record_order_cancelled();
        Ok(())
    }

    /// Looks up any order ever accepted, resting or terminal.
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.state.read().orders.get(&id).cloned()
    }

    /// Aggregated depth for a symbol, up to `levels` levels per side. None if
    /// the symbol has never traded or rested an order.
    pub fn depth(&self, symbol: &str, levels: usize) -> Option<BookDepth> {
        let state = self.state.read();
        let book = state.books.get(symbol)?;
        Some(BookDepth {
            symbol: book.symbol.clone(),
            bids: side_depth(&book.bids, &state.orders, levels),
            asks: side_depth(&book.asks, &state.orders, levels),
        })
    }

    pub fn best_bid(&self, symbol: &str) -> Option<i64> {
        self.state.read().books.get(symbol)?.bids.best_price()
    }

    pub fn best_ask(&self, symbol: &str) -> Option<i64> {
        self.state.read().books.get(symbol)?.asks.best_price()
    }

    /// Displayed (bid, ask) liquidity for a symbol: the two sides' aggregate
    /// remaining quantities.
    pub fn displayed_liquidity(&self, symbol: &str) -> Option<(i64, i64)> {
        let state = self.state.read();
        let book = state.books.get(symbol)?;
        Some((book.bids.total_quantity(), book.asks.total_quantity()))
    }

    /// Count of orders currently resting across all books.
    pub fn orders_in_book(&self) -> usize {
        let state = self.state.read();
        state
            .books
            .values()
            .map(|b| b.bids.order_count() + b.asks.order_count())
            .sum()
    }

    /// Snapshot of the process-lifetime trade log, in execution order.
    pub fn trade_log(&self) -> Vec<Trade> {
        self.trades.lock().clone()
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_order_request(req: &OrderRequest) -> Result<(), EngineError> {
    if req.symbol.is_empty() {
        return Err(EngineError::InvalidOrderData);
    }
    if req.quantity <= 0 {
        return Err(EngineError::InvalidOrderData);
    }
    if req.order_type == OrderType::Limit && req.price <= 0 {
        return Err(EngineError::InvalidOrderData);
    }
    Ok(())
}

fn transition(order: &mut Order, next: OrderStatus) {
    debug_assert!(
        order.status.can_transition_to(next),
        "illegal status transition {:?} -> {:?} for order {}",
        order.status,
        next,
        order.id
    );
    order.status = next;
}

fn side_depth(side: &SideBook, orders: &HashMap<OrderId, Order>, levels: usize) -> Vec<DepthLevel> {
    side.prices()
        .iter()
        .take(levels)
        .map(|&price| {
            let quantity = side
                .level(price)
                .map(|lvl| lvl.iter().filter_map(|id| orders.get(id)).map(Order::remaining).sum())
                .unwrap_or(0);
            DepthLevel { price, quantity }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(symbol: &str, side: Side, price: i64, quantity: i64) -> OrderRequest {
        OrderRequest {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            price,
            quantity,
        }
    }

    fn market(symbol: &str, side: Side, quantity: i64) -> OrderRequest {
        OrderRequest {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            price: 0,
            quantity,
        }
    }

    #[test]
    fn full_match_empties_the_book() {
        let engine = MatchingEngine::new();
        let (sell, _) = engine.place_order(&limit("AAPL", Side::Sell, 15000, 100)).unwrap();
        let (buy, trades) = engine.place_order(&limit("AAPL", Side::Buy, 15000, 100)).unwrap();

        assert_eq!(buy.status, OrderStatus::Filled);
        assert_eq!(engine.order(sell.id).unwrap().status, OrderStatus::Filled);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 100);
        assert_eq!(trades[0].price, 15000);
        assert!(engine.best_bid("AAPL").is_none());
        assert!(engine.best_ask("AAPL").is_none());
    }

    #[test]
    fn partial_fill_rests_the_remainder() {
        let engine = MatchingEngine::new();
        engine.place_order(&limit("AAPL", Side::Sell, 15000, 100)).unwrap();
        let (buy, trades) = engine.place_order(&limit("AAPL", Side::Buy, 15000, 150)).unwrap();

        assert_eq!(buy.status, OrderStatus::PartialFill);
        assert_eq!(buy.filled_qty, 100);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 100);
        let depth = engine.depth("AAPL", 10).unwrap();
        assert_eq!(depth.bids, vec![DepthLevel { price: 15000, quantity: 50 }]);
        assert!(depth.asks.is_empty());
    }

    #[test]
    fn walks_consecutive_levels() {
        let engine = MatchingEngine::new();
        engine.place_order(&limit("AAPL", Side::Sell, 15000, 100)).unwrap();
        engine.place_order(&limit("AAPL", Side::Sell, 15100, 200)).unwrap();

        let (buy, trades) = engine.place_order(&limit("AAPL", Side::Buy, 15100, 250)).unwrap();

        assert_eq!(buy.status, OrderStatus::Filled);
        assert_eq!(buy.filled_qty, 250);
        assert_eq!(trades.len(), 2);
        assert_eq!((trades[0].price, trades[0].quantity), (15000, 100));
        assert_eq!((trades[1].price, trades[1].quantity), (15100, 150));
        let depth = engine.depth("AAPL", 10).unwrap();
        assert_eq!(depth.asks, vec![DepthLevel { price: 15100, quantity: 50 }]);
    }

    #[test]
    fn crossing_limit_buy_gets_price_improvement() {
        let engine = MatchingEngine::new();
        engine.place_order(&limit("AAPL", Side::Sell, 10000, 100)).unwrap();
        let (_, trades) = engine.place_order(&limit("AAPL", Side::Buy, 10500, 50)).unwrap();
        assert_eq!(trades.len(), 1);
        // Execution happens at the resting price, never the aggressor's.
        assert_eq!(trades[0].price, 10000);
    }

    #[test]
    fn market_order_fills_across_levels() {
        let engine = MatchingEngine::new();
        engine.place_order(&limit("AAPL", Side::Sell, 10000, 100)).unwrap();
        engine.place_order(&limit("AAPL", Side::Sell, 10100, 50)).unwrap();

        let (mkt, trades) = engine.place_order(&market("AAPL", Side::Buy, 150)).unwrap();

        assert_eq!(mkt.status, OrderStatus::Filled);
        assert_eq!(trades.len(), 2);
        assert_eq!((trades[0].price, trades[0].quantity), (10000, 100));
        assert_eq!((trades[1].price, trades[1].quantity), (10100, 50));
        assert!(engine.best_ask("AAPL").is_none());
    }

    #[test]
    fn market_order_rejected_without_enough_liquidity() {
        let engine = MatchingEngine::new();
        engine.place_order(&limit("AAPL", Side::Sell, 10000, 50)).unwrap();

        let err = engine.place_order(&market("AAPL", Side::Buy, 100)).unwrap_err();
        assert_eq!(err, EngineError::InsufficientLiquidity);

        // Atomic reject: the book is untouched.
        let depth = engine.depth("AAPL", 10).unwrap();
        assert_eq!(depth.asks, vec![DepthLevel { price: 10000, quantity: 50 }]);
        assert_eq!(engine.displayed_liquidity("AAPL"), Some((0, 50)));
    }

    #[test]
    fn fifo_within_a_price_level() {
        let engine = MatchingEngine::new();
        let (s1, _) = engine.place_order(&limit("AAPL", Side::Sell, 10000, 100)).unwrap();
        let (s2, _) = engine.place_order(&limit("AAPL", Side::Sell, 10000, 100)).unwrap();

        let (buy, trades) = engine.place_order(&limit("AAPL", Side::Buy, 10000, 150)).unwrap();

        assert_eq!(buy.status, OrderStatus::Filled);
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].sell_order, s1.id);
        assert_eq!(trades[0].quantity, 100);
        assert_eq!(trades[1].sell_order, s2.id);
        assert_eq!(trades[1].quantity, 50);
        assert_eq!(engine.order(s1.id).unwrap().status, OrderStatus::Filled);
        assert_eq!(engine.order(s2.id).unwrap().status, OrderStatus::PartialFill);
    }

    #[test]
    fn cancelled_order_never_matches() {
        let engine = MatchingEngine::new();
        let (sell, _) = engine.place_order(&limit("AAPL", Side::Sell, 10000, 100)).unwrap();
        engine.cancel_order(sell.id).unwrap();

        let (buy, trades) = engine.place_order(&limit("AAPL", Side::Buy, 10000, 100)).unwrap();
        assert_eq!(buy.status, OrderStatus::Accepted);
        assert!(trades.is_empty());
        assert_eq!(engine.best_bid("AAPL"), Some(10000));
        assert_eq!(engine.order(sell.id).unwrap().status, OrderStatus::Cancelled);
    }

    #[test]
    fn cancel_unknown_id_is_not_found() {
        let engine = MatchingEngine::new();
        assert_eq!(engine.cancel_order(OrderId::generate()).unwrap_err(), EngineError::OrderNotFound);
    }

    #[test]
    fn cancel_twice_reports_already_finalized() {
        let engine = MatchingEngine::new();
        let (sell, _) = engine.place_order(&limit("AAPL", Side::Sell, 10000, 100)).unwrap();
        engine.cancel_order(sell.id).unwrap();
        assert_eq!(engine.cancel_order(sell.id).unwrap_err(), EngineError::OrderAlreadyFinalized);
    }

    #[test]
    fn cancel_filled_order_reports_already_finalized() {
        let engine = MatchingEngine::new();
        let (sell, _) = engine.place_order(&limit("AAPL", Side::Sell, 10000, 100)).unwrap();
        engine.place_order(&limit("AAPL", Side::Buy, 10000, 100)).unwrap();
        assert_eq!(engine.cancel_order(sell.id).unwrap_err(), EngineError::OrderAlreadyFinalized);
    }

    #[test]
    fn place_then_cancel_restores_depth() {
        let engine = MatchingEngine::new();
        engine.place_order(&limit("AAPL", Side::Buy, 9900, 30)).unwrap();
        let before = engine.depth("AAPL", 10).unwrap();

        let (order, trades) = engine.place_order(&limit("AAPL", Side::Buy, 9800, 25)).unwrap();
        assert!(trades.is_empty());
        engine.cancel_order(order.id).unwrap();

        let after = engine.depth("AAPL", 10).unwrap();
        assert_eq!(before.bids, after.bids);
        assert_eq!(before.asks, after.asks);
        assert_eq!(engine.displayed_liquidity("AAPL"), Some((30, 0)));
    }

    #[test]
    fn validation_rejects_bad_requests() {
        let engine = MatchingEngine::new();
        for req in [
            limit("", Side::Buy, 100, 10),
            limit("AAPL", Side::Buy, 100, 0),
            limit("AAPL", Side::Buy, 100, -5),
            limit("AAPL", Side::Buy, 0, 10),
            limit("AAPL", Side::Sell, -1, 10),
            market("", Side::Buy, 10),
            market("AAPL", Side::Sell, 0),
        ] {
            assert_eq!(engine.place_order(&req).unwrap_err(), EngineError::InvalidOrderData, "req: {req:?}");
        }
        assert!(engine.depth("AAPL", 10).is_none());
    }

    #[test]
    fn trade_quantities_sum_to_fill_increment() {
        let engine = MatchingEngine::new();
        engine.place_order(&limit("AAPL", Side::Sell, 10000, 40)).unwrap();
        engine.place_order(&limit("AAPL", Side::Sell, 10100, 40)).unwrap();
        let (buy, trades) = engine.place_order(&limit("AAPL", Side::Buy, 10100, 60)).unwrap();
        let traded: i64 = trades.iter().map(|t| t.quantity).sum();
        assert_eq!(traded, buy.filled_qty);
    }

    #[test]
    fn resting_book_never_crosses() {
        let engine = MatchingEngine::new();
        engine.place_order(&limit("AAPL", Side::Sell, 10100, 10)).unwrap();
        engine.place_order(&limit("AAPL", Side::Buy, 9900, 10)).unwrap();
        engine.place_order(&limit("AAPL", Side::Sell, 10000, 10)).unwrap();
        engine.place_order(&limit("AAPL", Side::Buy, 10000, 10)).unwrap();

        if let (Some(bid), Some(ask)) = (engine.best_bid("AAPL"), engine.best_ask("AAPL")) {
            assert!(bid < ask, "crossed book: bid {bid} >= ask {ask}");
        }
    }

    #[test]
    fn symbols_are_independent() {
        let engine = MatchingEngine::new();
        engine.place_order(&limit("AAPL", Side::Sell, 10000, 100)).unwrap();
        let (buy, trades) = engine.place_order(&limit("MSFT", Side::Buy, 10000, 100)).unwrap();
        assert_eq!(buy.status, OrderStatus::Accepted);
        assert!(trades.is_empty());
        assert_eq!(engine.best_ask("AAPL"), Some(10000));
        assert_eq!(engine.best_bid("MSFT"), Some(10000));
    }

    #[test]
    fn trade_log_accumulates_across_calls() {
        let engine = MatchingEngine::new();
        engine.place_order(&limit("AAPL", Side::Sell, 10000, 100)).unwrap();
        engine.place_order(&limit("AAPL", Side::Buy, 10000, 60)).unwrap();
        engine.place_order(&limit("AAPL", Side::Buy, 10000, 40)).unwrap();
        assert_eq!(engine.trade_log().len(), 2);
    }

    #[test]
    fn orders_in_book_counts_resting_orders_only() {
        let engine = MatchingEngine::new();
        engine.place_order(&limit("AAPL", Side::Sell, 10000, 100)).unwrap();
        engine.place_order(&limit("AAPL", Side::Sell, 10100, 100)).unwrap();
        engine.place_order(&limit("MSFT", Side::Buy, 5000, 10)).unwrap();
        assert_eq!(engine.orders_in_book(), 3);
        engine.place_order(&limit("AAPL", Side::Buy, 10000, 100)).unwrap();
        assert_eq!(engine.orders_in_book(), 2);
    }

    #[test]
    fn concurrent_placements_keep_aggregates_consistent() {
        use std::sync::Arc;

        let engine = Arc::new(MatchingEngine::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(std::thread::spawn(move || {
                let symbol = if t % 2 == 0 { "AAPL" } else { "MSFT" };
                for i in 0..50i64 {
                    let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                    let price = 10000 + (i % 5);
                    engine.place_order(&limit(symbol, side, price, 10)).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        for symbol in ["AAPL", "MSFT"] {
            let (bid_total, ask_total) = engine.displayed_liquidity(symbol).unwrap();
            let depth = engine.depth(symbol, usize::MAX).unwrap();
            let bid_sum: i64 = depth.bids.iter().map(|l| l.quantity).sum();
            let ask_sum: i64 = depth.asks.iter().map(|l| l.quantity).sum();
            assert_eq!(bid_total, bid_sum);
            assert_eq!(ask_total, ask_sum);
            if let (Some(bid), Some(ask)) = (engine.best_bid(symbol), engine.best_ask(symbol)) {
                assert!(bid < ask);
            }
        }
    }
}
