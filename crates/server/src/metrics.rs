//! Prometheus metrics for the vault server.
//!
//! Covers the upload session lifecycle, part traffic, quota admission and the
//! expiry reaper. No metric carries owner ids or file names.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it;
//! restrict it at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Upload session metrics
pub static UPLOAD_SESSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_upload_sessions_created_total",
        "Total number of upload sessions created",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_upload_sessions_completed_total",
        "Total number of upload sessions completed into a file",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_ABORTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_upload_sessions_aborted_total",
        "Total number of upload sessions aborted (by owner or reaper)",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_EXPIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_upload_sessions_expired_total",
        "Total number of upload sessions aborted by the expiry reaper",
    )
    .expect("metric creation failed")
});

// Part metrics
pub static PARTS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_parts_uploaded_total",
        "Total number of parts persisted",
    )
    .expect("metric creation failed")
});

pub static PARTS_REPLAYED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_parts_replayed_total",
        "Total number of part uploads answered from an already persisted part",
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_bytes_uploaded_total",
        "Total bytes persisted as parts",
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static UPLOAD_COMPLETE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "vault_upload_complete_duration_seconds",
            "Time taken to complete an upload session",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

pub static PART_UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "vault_part_upload_duration_seconds",
            "Time taken to upload a single part",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .expect("metric creation failed")
});

// Error metrics
pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("vault_upload_errors_total", "Total upload errors by error type"),
        &["error_type"],
    )
    .expect("metric creation failed")
});

// Quota metrics
pub static QUOTA_REJECTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_quota_rejections_total",
        "Total number of uploads rejected at admission",
    )
    .expect("metric creation failed")
});

pub static RESERVED_BYTES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "vault_reserved_bytes",
        "Bytes currently reserved by in-flight uploads across all owners",
    )
    .expect("metric creation failed")
});

// Reaper metrics
pub static REAPER_RUNS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("vault_reaper_runs_total", "Total number of expiry sweeps")
        .expect("metric creation failed")
});

pub static REAPER_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_reaper_failures_total",
        "Total number of sessions the expiry sweep failed to abort",
    )
    .expect("metric creation failed")
});

pub static REAPER_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "vault_reaper_duration_seconds",
            "Time taken by one expiry sweep",
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build several routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_ABORTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_EXPIRED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PARTS_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PARTS_REPLAYED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_COMPLETE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PART_UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_ERRORS.clone()))
            .expect("metric registration failed");

        // Quota
        REGISTRY
            .register(Box::new(QUOTA_REJECTIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RESERVED_BYTES.clone()))
            .expect("metric registration failed");

        // Reaper
        REGISTRY
            .register(Box::new(REAPER_RUNS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REAPER_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REAPER_DURATION.clone()))
            .expect("metric registration failed");
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

/// Helper to record upload errors by type.
pub fn record_upload_error(error_type: &str) {
    UPLOAD_ERRORS.with_label_values(&[error_type]).inc();
}
