//! # Metrics
//!
//! Prometheus metrics for monitoring the operator runtime.
//!
//! ## Metrics Exposed
//!
//! - `operator_reconciliations_total` - Total number of reconciler invocations
//! - `operator_reconciliation_errors_total` - Reconciler invocations that returned an error
//! - `operator_reconciliation_panics_total` - Reconciler invocations that panicked
//! - `operator_reconciliation_duration_seconds` - Duration of reconciler invocations
//! - `operator_retries_scheduled_total` - Retry timers started after a failure
//! - `operator_retries_skipped_total` - Retries dropped because the resource was gone
//! - `operator_watch_restarts_total` - Watch stream restarts by reason
//! - `operator_watch_events_total` - Watch events received by event type
//! - `operator_cached_resources` - Current number of resources in the store
//!
//! Recording is always safe; the values only become visible on `/metrics`
//! after [`register_metrics`] has been called.

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::{LazyLock, Once};

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "operator_reconciliations_total",
        "Total number of reconciler invocations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "operator_reconciliation_errors_total",
        "Total number of reconciler invocations that returned an error",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_PANICS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "operator_reconciliation_panics_total",
        "Total number of reconciler invocations that panicked",
    )
    .expect("Failed to create RECONCILIATION_PANICS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "operator_reconciliation_duration_seconds",
            "Duration of reconciler invocations in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static RETRIES_SCHEDULED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "operator_retries_scheduled_total",
        "Total number of retry timers started after a failed reconciliation",
    )
    .expect("Failed to create RETRIES_SCHEDULED_TOTAL metric - this should never happen")
});

static RETRIES_SKIPPED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "operator_retries_skipped_total",
        "Total number of retries dropped because the resource was no longer cached",
    )
    .expect("Failed to create RETRIES_SKIPPED_TOTAL metric - this should never happen")
});

static WATCH_RESTARTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "operator_watch_restarts_total",
            "Total number of watch stream restarts by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create WATCH_RESTARTS_TOTAL metric - this should never happen")
});

static WATCH_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "operator_watch_events_total",
            "Total number of watch events received by event type",
        ),
        &["event_type"],
    )
    .expect("Failed to create WATCH_EVENTS_TOTAL metric - this should never happen")
});

static CACHED_RESOURCES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "operator_cached_resources",
        "Current number of resources held in the store",
    )
    .expect("Failed to create CACHED_RESOURCES metric - this should never happen")
});

static REGISTER: Once = Once::new();

/// Register all runtime metrics with the registry served on `/metrics`
///
/// Calling it more than once is a no-op.
pub fn register_metrics() -> Result<()> {
    let mut result = Ok(());
    REGISTER.call_once(|| result = register_all());
    result
}

fn register_all() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_PANICS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RETRIES_SCHEDULED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RETRIES_SKIPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_RESTARTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHED_RESOURCES.clone()))?;

    Ok(())
}

/// Snapshot of every registered metric family
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn increment_reconciliation_panics() {
    RECONCILIATION_PANICS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_retries_scheduled() {
    RETRIES_SCHEDULED_TOTAL.inc();
}

pub fn increment_retries_skipped() {
    RETRIES_SKIPPED_TOTAL.inc();
}

pub fn increment_watch_restarts(reason: &str) {
    WATCH_RESTARTS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_watch_events(event_type: &str) {
    WATCH_EVENTS_TOTAL.with_label_values(&[event_type]).inc();
}

pub fn set_cached_resources(count: usize) {
    CACHED_RESOURCES.set(i64::try_from(count).unwrap_or(i64::MAX));
}
