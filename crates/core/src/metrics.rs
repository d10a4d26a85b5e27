//! Prometheus metrics for the conversion core.
//!
//! This module provides metrics for:
//! - Conversions (results, durations per intent)
//! - Engine processes (running, terminations)
//! - Concurrency gate rejections
//! - Scratch cleanup failures

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

// =============================================================================
// Conversion Metrics
// =============================================================================

/// Conversions total by intent and result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediaconv_conversions_total", "Total conversion requests"),
        &["intent", "result"], // result: "success" or an error kind
    )
    .unwrap()
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mediaconv_conversion_duration_seconds",
            "Duration of conversion requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["intent"],
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics
// =============================================================================

/// Engine processes currently running.
pub static ENGINE_PROCESSES_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediaconv_engine_processes_running",
        "Engine child processes currently running",
    )
    .unwrap()
});

/// Engine processes terminated early, by reason.
pub static ENGINE_TERMINATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaconv_engine_terminations_total",
            "Engine processes terminated before exiting on their own",
        ),
        &["reason", "signal"], // reason: "timeout", "cancelled"; signal: "term", "kill"
    )
    .unwrap()
});

// =============================================================================
// Resource Metrics
// =============================================================================

/// Requests rejected because the gate queue was full.
pub static GATE_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediaconv_gate_rejections_total",
        "Requests rejected because the conversion queue was full",
    )
    .unwrap()
});

/// Scratch files or directories that could not be removed.
pub static SCRATCH_CLEANUP_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediaconv_scratch_cleanup_failures_total",
        "Scratch files or directories that could not be removed",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(ENGINE_PROCESSES_RUNNING.clone()),
        Box::new(ENGINE_TERMINATIONS.clone()),
        Box::new(GATE_REJECTIONS.clone()),
        Box::new(SCRATCH_CLEANUP_FAILURES.clone()),
    ]
}

/// Renders every core metric in the Prometheus text exposition format.
pub fn render() -> String {
    let registry = Registry::new();
    for metric in all_metrics() {
        if let Err(e) = registry.register(metric) {
            tracing::warn!(error = %e, "Failed to register metric");
        }
    }
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }

        CONVERSIONS_TOTAL
            .with_label_values(&["flipOrRotate", "success"])
            .inc();
        CONVERSION_DURATION
            .with_label_values(&["flipOrRotate"])
            .observe(0.2);
        ENGINE_TERMINATIONS
            .with_label_values(&["timeout", "term"])
            .inc();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("mediaconv_conversions_total"));
        assert!(output.contains("mediaconv_conversion_duration_seconds"));
        assert!(output.contains("mediaconv_engine_processes_running"));
    }

    #[test]
    fn test_render_text_format() {
        GATE_REJECTIONS.inc();
        let text = render();
        assert!(text.contains("# TYPE mediaconv_gate_rejections_total counter"));
        assert!(text.contains("mediaconv_scratch_cleanup_failures_total"));
    }
}
