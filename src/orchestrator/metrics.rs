//! Batch metrics as a capability, not process-wide globals (spec §9
//! REDESIGN FLAGS). Grounded on the teacher's `identity_committer::mod`
//! and `task_monitor::mod` — `once_cell::sync::Lazy` statics registered
//! with `prometheus::register_*!` macros, read through a trait object
//! rather than touched directly by business logic.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, Histogram, IntCounterVec,
};

/// What [`Orchestrator::run_batch`](super::Orchestrator::run_batch) reports
/// after each pipeline step. Implementors own where the numbers go;
/// [`PrometheusMetrics`] is the default, process-global-free, wiring.
pub trait BatchMetrics: Send + Sync {
    fn record_requests(&self, category: &str, count: usize);
    fn record_batch_duration(&self, seconds: f64);
    fn record_error(&self, kind: &str);
}

static REQUESTS_BY_CATEGORY: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cas_requests_total",
        "Anchor requests processed, by outcome category.",
        &["category"]
    )
    .unwrap()
});

static BATCH_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "cas_batch_duration_seconds",
        "Wall-clock duration of one runBatch invocation."
    )
    .unwrap()
});

static BATCH_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cas_batch_errors_total",
        "Batch failures, by error taxonomy kind (spec §7).",
        &["kind"]
    )
    .unwrap()
});

/// The default [`BatchMetrics`] implementation: process-wide `prometheus`
/// registry counters, exposed through `&dyn BatchMetrics` so orchestrator
/// code never touches the statics directly.
pub struct PrometheusMetrics;

impl BatchMetrics for PrometheusMetrics {
    fn record_requests(&self, category: &str, count: usize) {
        REQUESTS_BY_CATEGORY
            .with_label_values(&[category])
            .inc_by(count as u64);
    }

    fn record_batch_duration(&self, seconds: f64) {
        BATCH_DURATION_SECONDS.observe(seconds);
    }

    fn record_error(&self, kind: &str) {
        BATCH_ERRORS.with_label_values(&[kind]).inc();
    }
}

/// A metrics sink that only counts, for assertions in tests.
#[cfg(test)]
pub struct NullMetrics;

#[cfg(test)]
impl BatchMetrics for NullMetrics {
    fn record_requests(&self, _category: &str, _count: usize) {}
    fn record_batch_duration(&self, _seconds: f64) {}
    fn record_error(&self, _kind: &str) {}
}
