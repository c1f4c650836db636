//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (jobs, target outcomes, open surfaces)
//! - Publish state machine (step durations)
//! - Media pipeline (assets by result)
//! - Trust gate (decisions)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Orchestrator
// =============================================================================

/// Jobs started.
pub static JOBS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("multipost_jobs_started_total", "Total publish jobs started").unwrap()
});

/// Target outcomes by status and failure reason.
pub static TARGET_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "multipost_target_outcomes_total",
            "Terminal target outcomes",
        ),
        &["status", "reason"], // reason is "none" on success
    )
    .unwrap()
});

/// Surfaces currently open.
pub static SURFACES_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("multipost_surfaces_active", "Execution surfaces currently open").unwrap()
});

// =============================================================================
// Publish state machine
// =============================================================================

/// Duration of each state machine step in seconds.
pub static STEP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "multipost_step_duration_seconds",
            "Duration of publish state machine steps",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["step"],
    )
    .unwrap()
});

// =============================================================================
// Media pipeline
// =============================================================================

/// Media assets processed by result.
pub static MEDIA_ASSETS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("multipost_media_assets_total", "Media assets processed"),
        &["result"], // "staged", "skipped", "uploaded", "failed", "unmatched"
    )
    .unwrap()
});

// =============================================================================
// Trust gate
// =============================================================================

/// Trust gate decisions.
pub static TRUST_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("multipost_trust_decisions_total", "Trust gate decisions"),
        &["decision"], // "allowed", "bypassed", "denied"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_STARTED.clone()),
        Box::new(TARGET_OUTCOMES.clone()),
        Box::new(SURFACES_ACTIVE.clone()),
        Box::new(STEP_DURATION.clone()),
        Box::new(MEDIA_ASSETS.clone()),
        Box::new(TRUST_DECISIONS.clone()),
    ]
}
