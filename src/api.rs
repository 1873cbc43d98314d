//! REST/WebSocket surface over the engine.
//!
//! Used by the binary and by integration tests. Build state with
//! [`create_app_state`] and a router with [`create_router_with_state`]; state
//! rides in an `Extension` layer so the router is `Router<()>` and works with
//! `into_make_service()`.
//!
//! Everything here is a thin adapter: handlers translate HTTP to the engine's
//! typed surface, fan trades out to market data and WebSocket subscribers,
//! and map [`EngineError`] kinds to status codes. No matching decision is
//! made in this module.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::Config;
use crate::engine::MatchingEngine;
use crate::error::EngineError;
use crate::market_data::MarketData;
use crate::types::{OrderId, OrderRequest, OrderStatus, Trade};
use crate::ws::WsHub;

/// Shared app state: the engine plus the adapters fed from its trade output.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchingEngine>,
    pub market_data: Arc<MarketData>,
    pub ws_hub: Arc<WsHub>,
    started_at: Instant,
}

/// Builds shared app state. Use this when a test needs direct access to the
/// engine or hub behind the router.
pub fn create_app_state() -> AppState {
    AppState {
        engine: Arc::new(MatchingEngine::new()),
        market_data: Arc::new(MarketData::new()),
        ws_hub: Arc::new(WsHub::new()),
        started_at: Instant::now(),
    }
}

/// Builds the router over existing state. Metrics and WebSocket routes are
/// mounted only when the config enables them.
pub fn create_router_with_state(state: AppState, config: &Config) -> Router<()> {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/api/v1/orders", post(place_order))
        .route("/api/v1/orders/{id}", get(get_order).delete(cancel_order))
        .route("/api/v1/orderbook/{symbol}", get(get_order_book))
        .route("/api/v1/market/ohlcv/{symbol}", get(get_ohlcv))
        .route("/api/v1/market/trades/{symbol}", get(get_trades))
        .route("/api/v1/market/depth/{symbol}", get(get_depth));

    if config.metrics_enabled {
        router = router
            .route("/metrics", get(metrics_json))
            .route("/metrics/prometheus", get(metrics_prometheus));
    }
    if config.ws_enabled {
        router = router.route("/ws/{symbol}", get(ws_stream));
    }

    router.layer(Extension(state))
}

/// Convenience for the binary and tests: fresh state + router.
pub fn create_router(config: &Config) -> Router<()> {
    create_router_with_state(create_app_state(), config)
}

async fn health(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
}

async fn health_live() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "live" }))
}

async fn health_ready() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ready" }))
}

async fn metrics_prometheus(Extension(state): Extension<AppState>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.engine.metrics().prometheus_format(),
    )
        .into_response()
}

async fn metrics_json(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let metrics = state.engine.metrics();
    let (p50, p99, p999) = metrics.latency_percentiles();
    Json(serde_json::json!({
        "orders_received": metrics.orders_received(),
        "orders_matched": metrics.orders_matched(),
        "orders_cancelled": metrics.orders_cancelled(),
        "trades_executed": metrics.trades_executed(),
        "orders_in_book": state.engine.orders_in_book(),
        "latency_p50_ms": p50,
        "latency_p99_ms": p99,
        "latency_p999_ms": p999,
        "throughput_orders": metrics.throughput(),
    }))
}

#[derive(serde::Serialize)]
struct PlaceOrderResponse {
    order_id: OrderId,
    status: OrderStatus,
    filled_quantity: i64,
    remaining_quantity: i64,
    trades: Vec<Trade>,
}

/// POST /api/v1/orders
///
/// 201 when the order rested unmatched, 202 on a partial fill, 200 when fully
/// filled; 400 for invalid requests and insufficient market-order liquidity.
async fn place_order(Extension(state): Extension<AppState>, Json(req): Json<OrderRequest>) -> Response {
    let started = Instant::now();
    let (order, trades) = match state.engine.place_order(&req) {
        Ok(result) => result,
        Err(err) => return error_response(err),
    };
    state
        .engine
        .metrics()
        .record_latency_ms(started.elapsed().as_secs_f64() * 1000.0);

    for trade in &trades {
        state.market_data.record_trade(&order.symbol, trade);
        state.ws_hub.broadcast_trade(&order.symbol, trade);
    }

    let code = match order.status {
        OrderStatus::Accepted => StatusCode::CREATED,
        OrderStatus::PartialFill => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    let body = PlaceOrderResponse {
        order_id: order.id,
        status: order.status,
        filled_quantity: order.filled_qty,
        remaining_quantity: order.remaining(),
        trades,
    };
    (code, Json(body)).into_response()
}

/// DELETE /api/v1/orders/{id}
async fn cancel_order(Extension(state): Extension<AppState>, Path(id): Path<String>) -> Response {
    let Ok(order_id) = id.parse::<OrderId>() else {
        return error_response(EngineError::OrderNotFound);
    };
    match state.engine.cancel_order(order_id) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "order_id": order_id, "status": "CANCELLED" })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /api/v1/orders/{id}
async fn get_order(Extension(state): Extension<AppState>, Path(id): Path<String>) -> Response {
    let Ok(order_id) = id.parse::<OrderId>() else {
        return error_response(EngineError::OrderNotFound);
    };
    match state.engine.order(order_id) {
        Some(order) => Json(order).into_response(),
        None => error_response(EngineError::OrderNotFound),
    }
}

#[derive(serde::Deserialize)]
struct DepthQuery {
    depth: Option<usize>,
}

/// GET /api/v1/orderbook/{symbol}?depth=10
async fn get_order_book(
    Extension(state): Extension<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Response {
    match state.engine.depth(&symbol, query.depth.unwrap_or(10)) {
        Some(depth) => Json(depth).into_response(),
        None => symbol_not_found(),
    }
}

#[derive(serde::Deserialize)]
struct LevelsQuery {
    levels: Option<usize>,
}

/// GET /api/v1/market/depth/{symbol}?levels=10
async fn get_depth(
    Extension(state): Extension<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<LevelsQuery>,
) -> Response {
    match state.engine.depth(&symbol, query.levels.unwrap_or(10)) {
        Some(depth) => Json(depth).into_response(),
        None => symbol_not_found(),
    }
}

/// GET /api/v1/market/ohlcv/{symbol}
async fn get_ohlcv(Extension(state): Extension<AppState>, Path(symbol): Path<String>) -> Response {
    match state.market_data.ohlcv(&symbol) {
        Some(candle) => Json(candle).into_response(),
        None => Json(serde_json::json!({ "symbol": symbol, "data": null })).into_response(),
    }
}

#[derive(serde::Deserialize)]
struct TradesQuery {
    limit: Option<usize>,
}

/// GET /api/v1/market/trades/{symbol}?limit=100
async fn get_trades(
    Extension(state): Extension<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<TradesQuery>,
) -> Response {
    let trades = state.market_data.recent_trades(&symbol, query.limit.unwrap_or(0));
    Json(serde_json::json!({ "symbol": symbol, "trades": trades })).into_response()
}

/// GET /ws/{symbol}: upgrade, then stream every trade on the symbol.
async fn ws_stream(
    Extension(state): Extension<AppState>,
    Path(symbol): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_trade_socket(state, symbol, socket))
}

async fn handle_trade_socket(state: AppState, symbol: String, mut socket: WebSocket) {
    debug!(%symbol, "websocket subscriber connected");
    let mut rx = state.ws_hub.subscribe(&symbol);
    loop {
        tokio::select! {
            res = rx.recv() => {
                match res {
                    Ok(event) => {
                        let Ok(json) = serde_json::to_string(&event) else { continue };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    // Slow subscribers skip missed trades rather than stall the hub.
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => match msg {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
    debug!(%symbol, "websocket subscriber disconnected");
}

fn symbol_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "symbol not found" }))).into_response()
}

fn error_response(err: EngineError) -> Response {
    let code = match err {
        EngineError::InvalidOrderData
        | EngineError::InsufficientLiquidity
        | EngineError::OrderAlreadyFinalized => StatusCode::BAD_REQUEST,
        EngineError::OrderNotFound => StatusCode::NOT_FOUND,
        EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}
