//! Metrics module for becash-service.
//! HTTP metrics come from the shared middleware via the `metrics` recorder; domain counters are
//! registered in the default Prometheus registry.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "becash_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Recorder handle for middleware-emitted HTTP metrics.
pub static METRICS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Entries created, by kind and origin (user / recurrence)
pub static CHARGES_CREATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Statement payments, by outcome (partial / settled)
pub static STATEMENT_PAYMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Scheduled job runs, by job and status
pub static JOB_RUNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Goal contributions, by direction (deposit / withdrawal)
pub static GOAL_CONTRIBUTIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Phone verification outcomes
pub static VERIFICATION_OUTCOMES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    METRICS_HANDLE.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder already installed");
            None
        }
    });

    CHARGES_CREATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("becash_charges_created_total", "Total entries created by kind and origin"),
            &["kind", "origin"]
        )
        .expect("Failed to register CHARGES_CREATED_TOTAL")
    });

    STATEMENT_PAYMENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("becash_statement_payments_total", "Total statement payments by outcome"),
            &["outcome"]
        )
        .expect("Failed to register STATEMENT_PAYMENTS_TOTAL")
    });

    JOB_RUNS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("becash_job_runs_total", "Total scheduled job runs by job and status"),
            &["job", "status"]
        )
        .expect("Failed to register JOB_RUNS_TOTAL")
    });

    GOAL_CONTRIBUTIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("becash_goal_contributions_total", "Total goal contributions by direction"),
            &["direction"]
        )
        .expect("Failed to register GOAL_CONTRIBUTIONS_TOTAL")
    });

    VERIFICATION_OUTCOMES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("becash_verification_outcomes_total", "Phone verification outcomes"),
            &["outcome"]
        )
        .expect("Failed to register VERIFICATION_OUTCOMES_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .and_then(|handle| handle.as_ref().map(|h| h.render()))
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        output.push_str(&String::from_utf8_lossy(&buffer));
    }
    output
}

/// Record an entry creation.
pub fn record_charge_created(kind: &str, origin: &str) {
    if let Some(counter) = CHARGES_CREATED_TOTAL.get() {
        counter.with_label_values(&[kind, origin]).inc();
    }
}

/// Record a statement payment.
pub fn record_statement_payment(settled: bool) {
    if let Some(counter) = STATEMENT_PAYMENTS_TOTAL.get() {
        let outcome = if settled { "settled" } else { "partial" };
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record a scheduled job run.
pub fn record_job_run(job: &str, status: &str) {
    if let Some(counter) = JOB_RUNS_TOTAL.get() {
        counter.with_label_values(&[job, status]).inc();
    }
}

/// Record a goal contribution.
pub fn record_goal_contribution(is_withdrawal: bool) {
    if let Some(counter) = GOAL_CONTRIBUTIONS_TOTAL.get() {
        let direction = if is_withdrawal { "withdrawal" } else { "deposit" };
        counter.with_label_values(&[direction]).inc();
    }
}

/// Record a phone verification outcome.
pub fn record_verification(outcome: &str) {
    if let Some(counter) = VERIFICATION_OUTCOMES_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}
