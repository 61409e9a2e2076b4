//! Prometheus metrics for the sync pipeline
//!
//! Call [`init_metrics`] once at application startup to register all
//! metrics. If initialization fails, metric operations become no-ops; the
//! pipeline never fails because of its instrumentation.

use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Container for all pipeline metrics
struct PipelineMetrics {
    fetch_total: CounterVec,
    novels_published: CounterVec,
    chapters_synced: CounterVec,
    job_runs: CounterVec,
    job_duration: HistogramVec,
    events: CounterVec,
}

/// Global storage for pipeline metrics
static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Initialize all Prometheus metrics
///
/// # Errors
///
/// Returns an error if any registration fails; subsequent metric
/// operations then become no-ops and the application continues.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PipelineMetrics {
        fetch_total: register_counter_vec!(
            "wenku_fetch_total",
            "Outbound scrape requests by source site and outcome",
            &["source", "outcome"]
        )?,
        novels_published: register_counter_vec!(
            "wenku_novels_published_total",
            "Novels created through publish, by source site",
            &["source"]
        )?,
        chapters_synced: register_counter_vec!(
            "wenku_chapters_synced_total",
            "Chapter headers inserted by incremental sync, by source site",
            &["source"]
        )?,
        job_runs: register_counter_vec!(
            "wenku_job_runs_total",
            "Background job executions by job name and outcome",
            &["job", "outcome"]
        )?,
        job_duration: register_histogram_vec!(
            "wenku_job_duration_seconds",
            "Background job duration by job name",
            &["job"]
        )?,
        events: register_counter_vec!(
            "wenku_events_total",
            "Free-form pipeline events by measurement name",
            &["measurement"]
        )?,
    };

    PIPELINE_METRICS
        .set(metrics)
        .map_err(|_| "metrics already initialized")?;

    Ok(())
}

fn metrics() -> Option<&'static PipelineMetrics> {
    PIPELINE_METRICS.get()
}

/// Record one outbound scrape request
pub fn record_fetch(source: &str, outcome: &str) {
    if let Some(m) = metrics() {
        m.fetch_total.with_label_values(&[source, outcome]).inc();
    }
}

/// Record a novel publish
pub fn record_publish(source: &str) {
    if let Some(m) = metrics() {
        m.novels_published.with_label_values(&[source]).inc();
    }
}

/// Record chapter headers inserted by sync
pub fn record_chapters_synced(source: &str, count: usize) {
    if let Some(m) = metrics() {
        m.chapters_synced
            .with_label_values(&[source])
            .inc_by(count as f64);
    }
}

/// Record a background job run
pub fn record_job(job: &str, outcome: &str, duration_secs: f64) {
    if let Some(m) = metrics() {
        m.job_runs.with_label_values(&[job, outcome]).inc();
        m.job_duration
            .with_label_values(&[job])
            .observe(duration_secs);
    }
}

/// Record a free-form event with a measurement name and field map
///
/// Fire-and-forget: the fields land in the structured log, the measurement
/// bumps a counter. Never errors observably.
pub fn record_event(measurement: &str, fields: HashMap<&str, String>) {
    if let Some(m) = metrics() {
        m.events.with_label_values(&[measurement]).inc();
    }
    tracing::info!(measurement, ?fields, "event");
}

/// Render all registered metrics in the Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
