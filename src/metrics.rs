//! Prometheus metrics for the cache and refresh layers
//!
//! Counters for cache traffic per partition, fetch failures per partition,
//! refresh timings per view and the current size of each derived list.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Counter: cache operations by partition (hit/miss/coalesced/unavailable)
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec!(
        "trendspotter_cache_operations_total",
        "Cache operations by partition and outcome",
        &["partition", "operation"]
    )
    .expect("Failed to create cache_operations metric");

    /// Counter: failed fetches by partition
    pub static ref FETCH_ERRORS: CounterVec = register_counter_vec!(
        "trendspotter_fetch_errors_total",
        "Failed fetches against the evaluation service",
        &["partition"]
    )
    .expect("Failed to create fetch_errors metric");

    /// Histogram: refresh duration per view (seconds)
    pub static ref REFRESH_DURATION: HistogramVec = register_histogram_vec!(
        "trendspotter_refresh_duration_seconds",
        "Duration of view refresh passes",
        &["view"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to create refresh_duration metric");

    /// Gauge: items in each derived list
    pub static ref DERIVED_ITEMS: GaugeVec = register_gauge_vec!(
        "trendspotter_derived_items",
        "Number of items in each derived list",
        &["view"]
    )
    .expect("Failed to create derived_items metric");

    /// Gauge: scheduler running (1 = running, 0 = stopped)
    pub static ref SCHEDULER_RUNNING: Gauge = register_gauge!(
        "trendspotter_scheduler_running",
        "Refresh scheduler status (1 = running, 0 = stopped)"
    )
    .expect("Failed to create scheduler_running metric");
}

/// Record a cache operation for a partition
pub fn record_cache_operation(partition: &str, operation: &str) {
    CACHE_OPERATIONS
        .with_label_values(&[partition, operation])
        .inc();
}

/// Increment fetch error counter
pub fn record_fetch_error(partition: &str) {
    FETCH_ERRORS.with_label_values(&[partition]).inc();
}

/// Record a refresh pass duration
pub fn record_refresh_duration(view: &str, duration_secs: f64) {
    REFRESH_DURATION
        .with_label_values(&[view])
        .observe(duration_secs);
}

/// Set the size of a derived list
pub fn set_derived_items(view: &str, count: usize) {
    DERIVED_ITEMS.with_label_values(&[view]).set(count as f64);
}

pub fn set_scheduler_running(running: bool) {
    SCHEDULER_RUNNING.set(if running { 1.0 } else { 0.0 });
}

/// Encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        record_cache_operation("posts", "hit");
        record_cache_operation("posts", "miss");
        record_fetch_error("comments");
        record_refresh_duration("trending", 0.2);
        set_derived_items("top_users", 5);
        set_scheduler_running(false);

        let output = gather_metrics();
        assert!(output.contains("trendspotter_cache_operations_total"));
        assert!(output.contains("trendspotter_fetch_errors_total{partition=\"comments\"}"));
        assert!(output.contains("trendspotter_derived_items"));
    }
}
