use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // Funnel Metrics
    pub static ref FUNNEL_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "funnel_events_total",
        "Total number of funnel events handed to tracking sinks",
        &["event", "sink", "status"]
    )
    .unwrap();

    pub static ref LEAD_SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "lead_submissions_total",
        "Total number of lead submissions",
        &["status"]
    )
    .unwrap();

    // Experiment Metrics
    pub static ref VARIANT_ASSIGNMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "variant_assignments_total",
        "Total number of variant assignment lookups",
        &["outcome"]
    )
    .unwrap();

    // Backend Metrics
    pub static ref BACKEND_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "backend_requests_total",
        "Total number of backend RPC calls",
        &["procedure", "status"]
    )
    .unwrap();

    pub static ref BACKEND_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "backend_request_duration_seconds",
        "Backend RPC call duration in seconds",
        &["procedure"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text format.
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Track a backend call with metrics
pub async fn track_backend_call<F, T, E>(procedure: &str, f: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = f.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    BACKEND_REQUESTS_TOTAL
        .with_label_values(&[procedure, status])
        .inc();
    BACKEND_REQUEST_DURATION_SECONDS
        .with_label_values(&[procedure])
        .observe(duration);

    result
}

pub fn record_sink_delivery(event: &str, sink: &str, ok: bool) {
    let status = if ok { "accepted" } else { "failed" };
    FUNNEL_EVENTS_TOTAL
        .with_label_values(&[event, sink, status])
        .inc();
}

pub fn record_lead_submission(ok: bool) {
    let status = if ok { "success" } else { "error" };
    LEAD_SUBMISSIONS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_assignment(outcome: &str) {
    VARIANT_ASSIGNMENTS_TOTAL.with_label_values(&[outcome]).inc();
}
