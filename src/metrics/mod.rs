//! Prometheus metrics for the worker group and the credential broker
//!
//! Call `init_metrics()` once at startup. Until then (or if registration
//! fails) every recording function is a no-op, so library code and tests
//! can call them unconditionally.

use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram_vec, Counter,
    CounterVec, Encoder, GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

use crate::models::CycleReport;

// ============================================================================
// Metrics Storage
// ============================================================================

struct WorkerMetrics {
    cycles: CounterVec,
    cycle_duration: HistogramVec,
    records: CounterVec,
    running: GaugeVec,
    gains_created: Counter,
    gains_completed: Counter,
    routes_cached: Counter,
    logins: CounterVec,
}

static WORKER_METRICS: OnceLock<WorkerMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all metrics with the default Prometheus registry
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = WorkerMetrics {
        cycles: register_counter_vec!(
            "trailgain_worker_cycles_total",
            "Worker cycles by worker and outcome",
            &["worker", "outcome"]
        )?,
        cycle_duration: register_histogram_vec!(
            "trailgain_worker_cycle_duration_seconds",
            "Time spent in one worker cycle",
            &["worker"],
            vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0]
        )?,
        records: register_counter_vec!(
            "trailgain_worker_records_total",
            "Records handled by workers, by result",
            &["worker", "result"]
        )?,
        running: register_gauge_vec!(
            "trailgain_worker_running",
            "Whether a worker is running (1 = yes, 0 = no)",
            &["worker"]
        )?,
        gains_created: register_counter!(
            "trailgain_point_gains_created_total",
            "Pending point gain records created"
        )?,
        gains_completed: register_counter!(
            "trailgain_point_gains_completed_total",
            "Point gain records completed with points after"
        )?,
        routes_cached: register_counter!(
            "trailgain_routes_cached_total",
            "Routes fetched and stored by the route cache worker"
        )?,
        logins: register_counter_vec!(
            "trailgain_platform_logins_total",
            "Platform logins by result",
            &["result"]
        )?,
    };

    WORKER_METRICS
        .set(metrics)
        .map_err(|_| "Worker metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

pub fn metrics_initialized() -> bool {
    WORKER_METRICS.get().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// ============================================================================
// Recording
// ============================================================================

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

pub fn start_cycle_timer(worker: &str) -> MetricsTimer {
    MetricsTimer {
        timer: WORKER_METRICS
            .get()
            .map(|m| m.cycle_duration.with_label_values(&[worker]).start_timer()),
    }
}

/// Record one finished cycle; `outcome` is "ok", "error" or "skipped"
pub fn record_cycle(worker: &str, outcome: &str, report: &CycleReport) {
    let Some(m) = WORKER_METRICS.get() else {
        return;
    };

    m.cycles.with_label_values(&[worker, outcome]).inc();

    for (result, count) in [
        ("processed", report.processed),
        ("skipped", report.skipped),
        ("failed", report.failed),
        ("abandoned", report.abandoned),
    ] {
        if count > 0 {
            m.records
                .with_label_values(&[worker, result])
                .inc_by(count as f64);
        }
    }
}

pub fn set_worker_running(worker: &str, running: bool) {
    if let Some(m) = WORKER_METRICS.get() {
        m.running
            .with_label_values(&[worker])
            .set(if running { 1.0 } else { 0.0 });
    }
}

pub fn record_gains_created(count: u64) {
    if let Some(m) = WORKER_METRICS.get() {
        if count > 0 {
            m.gains_created.inc_by(count as f64);
        }
    }
}

pub fn record_gains_completed(count: u64) {
    if let Some(m) = WORKER_METRICS.get() {
        if count > 0 {
            m.gains_completed.inc_by(count as f64);
        }
    }
}

pub fn record_route_cached() {
    if let Some(m) = WORKER_METRICS.get() {
        m.routes_cached.inc();
    }
}

pub fn record_login(success: bool) {
    if let Some(m) = WORKER_METRICS.get() {
        let result = if success { "success" } else { "failure" };
        m.logins.with_label_values(&[result]).inc();
    }
}
