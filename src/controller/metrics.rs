//! Prometheus metrics for the Pulp operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports the following metrics:
//! - `pulp_reconcile_duration_seconds` (histogram): reconcile duration labeled by controller.
//! - `pulp_reconcile_errors_total` (counter): reconcile errors labeled by controller and kind.
//! - `pulp_reconcile_outcomes_total` (counter): finished passes labeled by outcome.
//! - `pulp_child_writes_total` (counter): child object writes labeled by kind and operation.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for operator reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    /// Controller name, e.g. "pulp"
    pub controller: String,
}

/// Labels for operator error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    /// Error kind/category, e.g. "kube", "validation", "exec"
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    /// "converged" or "requeued"
    pub outcome: String,
}

/// Labels for child object writes
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ChildWriteLabels {
    pub kind: String,
    /// "create", "update" or "delete"
    pub operation: String,
}

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

/// Counter tracking reconcile errors
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static RECONCILE_OUTCOMES_TOTAL: Lazy<Family<OutcomeLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking writes to child objects; stays flat while converged
pub static CHILD_WRITES_TOTAL: Lazy<Family<ChildWriteLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "pulp_reconcile_duration_seconds",
        "Duration of reconcile loops in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "pulp_reconcile_errors_total",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "pulp_reconcile_outcomes_total",
        "Total number of finished reconcile passes by outcome",
        RECONCILE_OUTCOMES_TOTAL.clone(),
    );
    registry.register(
        "pulp_child_writes_total",
        "Total number of writes to objects owned by a Pulp",
        CHILD_WRITES_TOTAL.clone(),
    );

    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(controller: &str, seconds: f64) {
    let labels = ReconcileLabels {
        controller: controller.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(controller: &str, kind: &str) {
    let labels = ErrorLabels {
        controller: controller.to_string(),
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_reconcile_outcome(outcome: &str) {
    let labels = OutcomeLabels {
        outcome: outcome.to_string(),
    };
    RECONCILE_OUTCOMES_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_child_write(kind: &str, operation: &str) {
    let labels = ChildWriteLabels {
        kind: kind.to_string(),
        operation: operation.to_string(),
    };
    CHILD_WRITES_TOTAL.get_or_create(&labels).inc();
}
