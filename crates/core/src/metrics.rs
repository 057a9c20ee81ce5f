//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Validation requests (cache hits, fresh validations, failures)
//! - Remote fetches by profile
//! - Validation engine calls
//! - Proxy requests

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Validation Metrics
// =============================================================================

/// Validation requests by outcome.
pub static VALIDATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("idswidget_validations_total", "Total validation requests"),
        &["outcome"], // "cache_hit", "validated", "failed"
    )
    .unwrap()
});

/// End-to-end duration of validations that missed the cache.
pub static VALIDATION_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "idswidget_validation_duration_seconds",
            "Duration of uncached validations (fetch + engine + persist)",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )
    .unwrap()
});

/// Validations currently holding a per-key lock.
pub static VALIDATIONS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "idswidget_validations_in_flight",
        "Number of cache keys with a validation in progress",
    )
    .unwrap()
});

// =============================================================================
// Fetch Metrics
// =============================================================================

/// Remote fetches by profile and result.
pub static FETCH_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("idswidget_fetch_requests_total", "Total remote fetches"),
        &["profile", "result"],
    )
    .unwrap()
});

/// Remote fetch duration in seconds.
pub static FETCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "idswidget_fetch_duration_seconds",
            "Duration of remote fetches",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0]),
        &["profile"],
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics
// =============================================================================

/// Engine calls by result.
pub static ENGINE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "idswidget_engine_requests_total",
            "Total validation engine calls",
        ),
        &["result"],
    )
    .unwrap()
});

/// Engine call duration in seconds.
pub static ENGINE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "idswidget_engine_duration_seconds",
            "Duration of validation engine calls",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )
    .unwrap()
});

// =============================================================================
// Proxy Metrics
// =============================================================================

/// Proxy requests by kind and result.
pub static PROXY_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("idswidget_proxy_requests_total", "Total proxy requests"),
        &["kind", "result"], // kind: "download", "package", "local_package"
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Validation
        Box::new(VALIDATIONS_TOTAL.clone()),
        Box::new(VALIDATION_DURATION.clone()),
        Box::new(VALIDATIONS_IN_FLIGHT.clone()),
        // Fetch
        Box::new(FETCH_REQUESTS.clone()),
        Box::new(FETCH_DURATION.clone()),
        // Engine
        Box::new(ENGINE_REQUESTS.clone()),
        Box::new(ENGINE_DURATION.clone()),
        // Proxy
        Box::new(PROXY_REQUESTS.clone()),
    ]
}
