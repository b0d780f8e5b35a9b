//! In-process serving metrics for the prediction service.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept for percentile estimates
const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector for the prediction endpoint
pub struct ServingMetrics {
    /// Prediction requests received
    requests: AtomicU64,
    /// Requests answered with a prediction
    predictions: AtomicU64,
    /// Requests rejected as invalid input
    rejected: AtomicU64,
    /// Requests answered while no model was loaded
    unavailable: AtomicU64,
    /// Successful reloads since start
    reloads: AtomicU64,
    /// Prediction latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Distribution of probability_success
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServingMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record an answered prediction
    pub fn record_prediction(&self, latency: Duration, probability_success: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.predictions.fetch_add(1, Ordering::Relaxed);

        {
            let mut latencies = self.latencies.write().unwrap_or_else(PoisonError::into_inner);
            latencies.push(latency.as_micros() as u64);
            if latencies.len() > LATENCY_WINDOW {
                latencies.drain(0..LATENCY_WINDOW / 2);
            }
        }

        let bucket = (probability_success.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        self.probability_buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)[bucket] += 1;
    }

    /// Record a request refused for invalid input
    pub fn record_rejected(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request refused because no model is loaded
    pub fn record_unavailable(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Latency statistics over the retained window
    pub fn latency_stats(&self) -> LatencyStats {
        let mut sorted = self
            .latencies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];
        LatencyStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Predictions per second since start
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn probability_distribution(&self) -> [u64; 10] {
        *self
            .probability_buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            throughput_per_sec: self.throughput(),
            latency: self.latency_stats(),
            probability_buckets: self.probability_distribution(),
        }
    }

    /// Log summary statistics
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        let latency = &snapshot.latency;

        info!(
            requests = snapshot.requests,
            predictions = snapshot.predictions,
            rejected = snapshot.rejected,
            unavailable = snapshot.unavailable,
            reloads = snapshot.reloads,
            throughput = format!("{:.1} req/s", snapshot.throughput_per_sec),
            "Serving metrics"
        );
        info!(
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Prediction latency"
        );

        let total: u64 = snapshot.probability_buckets.iter().sum();
        if total > 0 {
            let distribution: Vec<String> = snapshot
                .probability_buckets
                .iter()
                .enumerate()
                .map(|(i, &count)| {
                    format!(
                        "{:.1}-{:.1}:{:.1}%",
                        i as f64 / 10.0,
                        (i + 1) as f64 / 10.0,
                        count as f64 / total as f64 * 100.0
                    )
                })
                .collect();
            info!(distribution = %distribution.join(" "), "Success probability distribution");
        }
    }
}

impl Default for ServingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Serializable view returned by `GET /metrics`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub predictions: u64,
    pub rejected: u64,
    pub unavailable: u64,
    pub reloads: u64,
    pub throughput_per_sec: f64,
    pub latency: LatencyStats,
    pub probability_buckets: [u64; 10],
}

/// Periodic summary logger
pub struct MetricsReporter {
    metrics: Arc<ServingMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServingMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.log_summary();
        }
    }
}
