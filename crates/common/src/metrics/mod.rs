//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all Paperwire metrics
pub const METRICS_PREFIX: &str = "paperwire";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_papers_fetched_total", METRICS_PREFIX),
        Unit::Count,
        "Total entries fetched from upstream feeds"
    );

    describe_counter!(
        format!("{}_papers_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Total entries given full pipeline processing"
    );

    describe_counter!(
        format!("{}_tick_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total errors collected across ingestion ticks"
    );

    describe_histogram!(
        format!("{}_tick_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Ingestion tick latency in seconds"
    );

    describe_counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total generative backend calls by operation and status"
    );

    describe_counter!(
        format!("{}_breaker_open_total", METRICS_PREFIX),
        Unit::Count,
        "Times the generation circuit breaker tripped open"
    );

    describe_counter!(
        format!("{}_rate_limit_rejections_total", METRICS_PREFIX),
        Unit::Count,
        "Requests rejected by the sliding-window rate limiter"
    );

    tracing::info!("Metrics registered");
}

/// Record the outcome of one ingestion tick
pub fn record_tick(duration_secs: f64, fetched: usize, processed: usize, errors: usize) {
    counter!(format!("{}_papers_fetched_total", METRICS_PREFIX)).increment(fetched as u64);
    counter!(format!("{}_papers_processed_total", METRICS_PREFIX)).increment(processed as u64);
    counter!(format!("{}_tick_errors_total", METRICS_PREFIX)).increment(errors as u64);
    histogram!(format!("{}_tick_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record a generative backend call
pub fn record_generation(op: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        "op" => op,
        "status" => status
    )
    .increment(1);
}

/// Record a circuit-breaker trip
pub fn record_breaker_open() {
    counter!(format!("{}_breaker_open_total", METRICS_PREFIX)).increment(1);
}

/// Record a rate-limit rejection
pub fn record_rate_limit_rejection(endpoint: &str) {
    counter!(
        format!("{}_rate_limit_rejections_total", METRICS_PREFIX),
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}
