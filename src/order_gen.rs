//! Deterministic synthetic order stream for property tests, benchmarks, and
//! demos. Same seed ⇒ same sequence of requests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::MatchingEngine;
use crate::error::EngineError;
use crate::types::{OrderRequest, OrderType, Side};

/// Configuration for the synthetic request generator. All ranges are
/// inclusive.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// RNG seed. Same seed ⇒ same request stream.
    pub seed: u64,
    /// Symbols to spread requests over, chosen uniformly.
    pub symbols: Vec<String>,
    /// Number of requests produced by [`Generator::all_requests`].
    pub num_orders: usize,
    /// Probability of BUY (0.0..=1.0). SELL otherwise.
    pub buy_ratio: f64,
    /// Probability of LIMIT (0.0..=1.0). MARKET otherwise.
    pub limit_ratio: f64,
    /// Limit price range in minor units.
    pub price_min: i64,
    pub price_max: i64,
    /// Quantity range, whole units.
    pub quantity_min: i64,
    pub quantity_max: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            symbols: vec!["AAPL".into()],
            num_orders: 1000,
            buy_ratio: 0.5,
            limit_ratio: 0.9,
            price_min: 9500,
            price_max: 10500,
            quantity_min: 1,
            quantity_max: 100,
        }
    }
}

/// Deterministic request stream.
pub struct Generator {
    rng: StdRng,
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { rng, config }
    }

    /// Produces the next request, advancing the RNG.
    pub fn next_request(&mut self) -> OrderRequest {
        let symbol = if self.config.symbols.len() == 1 {
            self.config.symbols[0].clone()
        } else {
            let idx = self.rng.gen_range(0..self.config.symbols.len());
            self.config.symbols[idx].clone()
        };
        let side = if self.rng.gen::<f64>() < self.config.buy_ratio {
            Side::Buy
        } else {
            Side::Sell
        };
        let is_limit = self.rng.gen::<f64>() < self.config.limit_ratio;
        let price = if is_limit {
            self.rng.gen_range(self.config.price_min..=self.config.price_max)
        } else {
            0
        };
        OrderRequest {
            symbol,
            side,
            order_type: if is_limit { OrderType::Limit } else { OrderType::Market },
            price,
            quantity: self.rng.gen_range(self.config.quantity_min..=self.config.quantity_max),
        }
    }

    pub fn take_requests(&mut self, n: usize) -> Vec<OrderRequest> {
        (0..n).map(|_| self.next_request()).collect()
    }

    /// The full stream as sized by `config.num_orders`.
    pub fn all_requests(&mut self) -> Vec<OrderRequest> {
        let n = self.config.num_orders;
        self.take_requests(n)
    }
}

/// Totals from replaying a request stream into an engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Orders the engine accepted (any final status).
    pub accepted: usize,
    /// MARKET orders rejected for insufficient liquidity.
    pub rejected: usize,
    /// Trades produced across all accepted orders.
    pub trades: usize,
}

/// Replays requests into the engine. Insufficient-liquidity rejects are
/// counted, any other error is returned.
pub fn replay_into_engine(
    engine: &MatchingEngine,
    requests: impl IntoIterator<Item = OrderRequest>,
) -> Result<ReplaySummary, EngineError> {
    let mut summary = ReplaySummary::default();
    for request in requests {
        match engine.place_order(&request) {
            Ok((_, trades)) => {
                summary.accepted += 1;
                summary.trades += trades.len();
            }
            Err(EngineError::InsufficientLiquidity) => summary.rejected += 1,
            Err(err) => return Err(err),
        }
    }
    Ok(summary)
}
