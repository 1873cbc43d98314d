//! Engine counters, a coarse latency histogram, and Prometheus text
//! exposition.
//!
//! Counters are atomics so the hot path never takes a lock for them; only the
//! histogram sits behind a mutex. Latency is recorded by the API layer,
//! outside the engine lock.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// Upper bounds (ms) of the latency buckets. The last bound stands in for the
/// open-ended overflow bucket when reporting percentiles.
const BUCKET_BOUNDS_MS: [f64; 9] = [1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 300.0];

pub struct Metrics {
    orders_received: AtomicU64,
    orders_matched: AtomicU64,
    orders_cancelled: AtomicU64,
    trades_executed: AtomicU64,
    started_at: Instant,
    latency_buckets: Mutex<[u64; 9]>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            orders_received: AtomicU64::new(0),
            orders_matched: AtomicU64::new(0),
            orders_cancelled: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            started_at: Instant::now(),
            latency_buckets: Mutex::new([0; 9]),
        }
    }

    pub fn record_order_received(&self) {
        self.orders_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order_matched(&self) {
        self.orders_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order_cancelled(&self) {
        self.orders_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trades(&self, count: u64) {
        self.trades_executed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn orders_received(&self) -> u64 {
        self.orders_received.load(Ordering::Relaxed)
    }

    pub fn orders_matched(&self) -> u64 {
        self.orders_matched.load(Ordering::Relaxed)
    }

    pub fn orders_cancelled(&self) -> u64 {
        self.orders_cancelled.load(Ordering::Relaxed)
    }

    pub fn trades_executed(&self) -> u64 {
        self.trades_executed.load(Ordering::Relaxed)
    }

    /// Buckets one order-processing latency sample.
    pub fn record_latency_ms(&self, ms: f64) {
        let idx = BUCKET_BOUNDS_MS[..8].iter().position(|&bound| ms <= bound).unwrap_or(8);
        self.latency_buckets.lock()[idx] += 1;
    }

    /// (p50, p99, p999) latency estimates in ms, resolved to bucket upper
    /// bounds. All zeros before the first sample.
    pub fn latency_percentiles(&self) -> (f64, f64, f64) {
        let buckets = self.latency_buckets.lock();
        let total: u64 = buckets.iter().sum();
        if total == 0 {
            return (0.0, 0.0, 0.0);
        }

        let thresholds = [0.50, 0.99, 0.999];
        let mut results = [0.0; 3];
        let mut running = 0u64;
        let mut idx = 0;
        for (i, &count) in buckets.iter().enumerate() {
            running += count;
            while idx < thresholds.len() && running as f64 >= thresholds[idx] * total as f64 {
                results[idx] = BUCKET_BOUNDS_MS[i];
                idx += 1;
            }
        }
        (results[0], results[1], results[2])
    }

    /// Orders per second over the process lifetime.
    pub fn throughput(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.orders_received() as f64 / elapsed
    }

    /// Prometheus text format (version 0.0.4).
    pub fn prometheus_format(&self) -> String {
        let mut out = String::with_capacity(1024);

        let counters = [
            ("orders_received_total", "Total number of orders received", self.orders_received()),
            ("orders_matched_total", "Total number of orders matched", self.orders_matched()),
            ("orders_cancelled_total", "Total number of orders cancelled", self.orders_cancelled()),
            ("trades_executed_total", "Total number of trades executed", self.trades_executed()),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}\n");
        }

        let _ = writeln!(out, "# HELP throughput_orders_per_sec Current throughput in orders per second");
        let _ = writeln!(out, "# TYPE throughput_orders_per_sec gauge");
        let _ = writeln!(out, "throughput_orders_per_sec {:.2}\n", self.throughput());

        let (p50, p99, p999) = self.latency_percentiles();
        let _ = writeln!(out, "# HELP http_request_duration_ms HTTP request latencies in milliseconds");
        let _ = writeln!(out, "# TYPE http_request_duration_ms summary");
        let _ = writeln!(out, "http_request_duration_ms{{quantile=\"0.5\"}} {p50:.3}");
        let _ = writeln!(out, "http_request_duration_ms{{quantile=\"0.99\"}} {p99:.3}");
        let _ = writeln!(out, "http_request_duration_ms{{quantile=\"0.999\"}} {p999:.3}");

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
