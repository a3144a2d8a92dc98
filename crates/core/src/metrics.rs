//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (jobs, conversions by identifier and outcome)
//! - Upload manager (rejections by error kind)
//! - Execution sandbox (external process runs)
//! - Retention manager (deletions and sweeps)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Orchestrator Metrics
// =============================================================================

/// Conversions total by identifier and outcome.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_conversions_total", "Total conversion jobs"),
        &["conversion", "outcome"], // outcome: "success" or an error kind
    )
    .unwrap()
});

/// Conversion duration in seconds, from converter start to packaged artifact.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "convertino_conversion_duration_seconds",
            "Duration of converter runs",
        )
        .buckets(vec![
            0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0,
        ]),
        &["conversion"],
    )
    .unwrap()
});

/// Jobs currently between validation and a terminal state.
pub static JOBS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "convertino_jobs_in_flight",
        "Conversion jobs that have not reached a terminal state",
    )
    .unwrap()
});

/// Artifacts fully handed to the response layer.
pub static DELIVERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_deliveries_total",
        "Artifacts released after delivery",
    )
    .unwrap()
});

/// Artifacts released because the client went away before the last byte.
pub static DOWNLOADS_ABANDONED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_downloads_abandoned_total",
        "Artifacts released before the download completed",
    )
    .unwrap()
});

// =============================================================================
// Upload Metrics
// =============================================================================

/// Upload rejections by error kind.
pub static UPLOAD_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "convertino_upload_rejections_total",
            "Uploads rejected before conversion",
        ),
        &["kind"],
    )
    .unwrap()
});

/// Bytes staged to disk.
pub static UPLOADED_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("convertino_uploaded_bytes_total", "Total bytes staged").unwrap()
});

// =============================================================================
// Sandbox Metrics
// =============================================================================

/// External process runs by outcome.
pub static SANDBOX_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "convertino_sandbox_runs_total",
            "External tool invocations",
        ),
        &["outcome"], // "success", "non_zero_exit", "timeout", "not_found", "spawn_error"
    )
    .unwrap()
});

// =============================================================================
// Retention Metrics
// =============================================================================

/// Job directory deletions by result.
pub static RETENTION_DELETIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "convertino_retention_deletions_total",
            "Job directory deletions",
        ),
        &["trigger", "result"], // trigger: "immediate", "delivered", "deadline", "sweep", "shutdown"
    )
    .unwrap()
});

/// Stale directories removed by the age sweep.
pub static SWEEP_REMOVALS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_sweep_removals_total",
        "Stale job directories removed by the age sweep",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Orchestrator
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(JOBS_IN_FLIGHT.clone()),
        Box::new(DELIVERIES_TOTAL.clone()),
        Box::new(DOWNLOADS_ABANDONED.clone()),
        // Uploads
        Box::new(UPLOAD_REJECTIONS.clone()),
        Box::new(UPLOADED_BYTES.clone()),
        // Sandbox
        Box::new(SANDBOX_RUNS.clone()),
        // Retention
        Box::new(RETENTION_DELETIONS.clone()),
        Box::new(SWEEP_REMOVALS.clone()),
    ]
}
