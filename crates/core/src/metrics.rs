//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Submissions by classification result
//! - Job outcomes and compression duration
//! - Engine instance loads

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Controller Metrics
// =============================================================================

/// Submitted files by how they were handled.
pub static SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("squeeze_submissions_total", "Total submitted files"),
        &["kind"], // "image", "video", "rejected", "duplicate", "busy", "not_ready"
    )
    .unwrap()
});

/// Compression jobs by terminal outcome.
pub static JOBS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("squeeze_jobs_total", "Total compression jobs by outcome"),
        &["outcome"], // "succeeded", "failed", "cancelled"
    )
    .unwrap()
});

/// Wall-clock duration of successful compressions.
pub static COMPRESSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "squeeze_compression_duration_seconds",
            "Duration of successful compressions",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics
// =============================================================================

/// Engine instance loads by result.
pub static ENGINE_LOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("squeeze_engine_loads_total", "Total engine instance loads"),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

/// All core metrics, for registration by the binary.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SUBMISSIONS.clone()),
        Box::new(JOBS.clone()),
        Box::new(COMPRESSION_DURATION.clone()),
        Box::new(ENGINE_LOADS.clone()),
    ]
}
