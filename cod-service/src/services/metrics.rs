//! Prometheus metrics for cod-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// COD transaction counter by outcome.
pub static COD_TRANSACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cod_transactions_total",
        "Total number of COD transactions created",
        &["status"] // ok, error - not company_id to avoid cardinality explosion
    )
    .expect("Failed to register cod_transactions_total")
});

/// Custody transition counter by operation and outcome.
pub static COD_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cod_transitions_total",
        "Total number of custody transitions",
        &["operation", "status"] // collect, submit, confirm_receipt, transfer, fail
    )
    .expect("Failed to register cod_transitions_total")
});

/// Reconciliation run counter by outcome.
pub static RECONCILIATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cod_reconciliations_total",
        "Total number of driver-day reconciliations",
        &["status"] // ok, variance, error
    )
    .expect("Failed to register reconciliations_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cod_errors_total",
        "Total number of errors by type",
        &["error_type"] // invalid_state, amount_mismatch, db_error, etc.
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "cod_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&COD_TRANSACTIONS_TOTAL);
    Lazy::force(&COD_TRANSITIONS_TOTAL);
    Lazy::force(&RECONCILIATIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
