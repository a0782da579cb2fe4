//! Prometheus metrics for the gemvault server.
//!
//! Counters cover the gem lifecycle (push, yank, unyank), downloads,
//! authorization refusals and index builds.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no gem names or keys, only aggregate counts. Restrict the
//! endpoint to scraper addresses at the network level anyway.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Lifecycle metrics
pub static GEMS_PUSHED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("gemvault_gems_pushed_total", "Total number of gem versions pushed")
        .expect("metric creation failed")
});

pub static GEMS_YANKED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("gemvault_gems_yanked_total", "Total number of gem versions yanked")
        .expect("metric creation failed")
});

pub static GEMS_UNYANKED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gemvault_gems_unyanked_total",
        "Total number of gem versions restored by unyank",
    )
    .expect("metric creation failed")
});

pub static LIFECYCLE_REJECTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gemvault_lifecycle_rejections_total",
            "Push/yank/unyank requests refused because of the version's state",
        ),
        &["operation"],
    )
    .expect("metric creation failed")
});

// Download metrics
pub static DOWNLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gemvault_downloads_total",
            "Total number of served gem archives and specifications",
        ),
        &["content"],
    )
    .expect("metric creation failed")
});

pub static BYTES_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gemvault_bytes_served_total",
        "Total bytes of gem archives and specifications served",
    )
    .expect("metric creation failed")
});

// Authorization metrics
pub static AUTHORIZATION_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gemvault_authorization_failures_total",
            "Total refused authorization checks by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

// Index metrics
pub static INDEX_BUILDS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gemvault_index_builds_total",
            "Total number of spec index builds (cache misses)",
        ),
        &["index"],
    )
    .expect("metric creation failed")
});

pub static INDEX_BUILD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "gemvault_index_build_duration_seconds",
            "Time taken to build a spec index",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent: calls after the first are no-ops, so tests may build as many
/// routers as they like.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(GEMS_PUSHED.clone()),
            Box::new(GEMS_YANKED.clone()),
            Box::new(GEMS_UNYANKED.clone()),
            Box::new(LIFECYCLE_REJECTIONS.clone()),
            Box::new(DOWNLOADS.clone()),
            Box::new(BYTES_SERVED.clone()),
            Box::new(AUTHORIZATION_FAILURES.clone()),
            Box::new(INDEX_BUILDS.clone()),
            Box::new(INDEX_BUILD_DURATION.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::error!(error = %e, "metric registration failed");
            }
        }
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a push/yank/unyank refused because of the version's current state.
pub fn record_rejection(operation: &str) {
    LIFECYCLE_REJECTIONS.with_label_values(&[operation]).inc();
}

/// Record a served archive or specification.
pub fn record_download(content: &str, bytes: usize) {
    DOWNLOADS.with_label_values(&[content]).inc();
    BYTES_SERVED.inc_by(bytes as u64);
}
