/// Metrics and telemetry for Tandem
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Like / pass decisions and declines
/// - Match creation
/// - Notification dispatch
/// - Realtime connections
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Interaction Metrics ==========

    /// Accepted decisions by kind (like, super_like, pass)
    pub static ref DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tandem_decisions_total",
        "Total number of accepted like and pass decisions",
        &["kind"]
    )
    .unwrap();

    /// Declined decisions by reason
    pub static ref DECISIONS_DECLINED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tandem_decisions_declined_total",
        "Total number of declined like and pass decisions",
        &["reason"]
    )
    .unwrap();

    /// Matches created, by the path that created them (request or reconcile)
    pub static ref MATCHES_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tandem_matches_created_total",
        "Total number of matches created",
        &["source"]
    )
    .unwrap();

    // ========== Notification Metrics ==========

    /// Notifications by kind and dispatch status
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tandem_notifications_total",
        "Total number of notification dispatch attempts",
        &["kind", "status"]
    )
    .unwrap();

    /// Open realtime connections
    pub static ref REALTIME_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "tandem_realtime_connections_active",
        "Number of open realtime WebSocket connections"
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record an accepted decision
pub fn record_decision(kind: &str) {
    DECISIONS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a declined decision
pub fn record_decline(reason: &str) {
    DECISIONS_DECLINED_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a newly created match
pub fn record_match_created(source: &str) {
    MATCHES_CREATED_TOTAL.with_label_values(&[source]).inc();
}

/// Record a notification dispatch attempt
pub fn record_notification(kind: &str, success: bool) {
    NOTIFICATIONS_TOTAL
        .with_label_values(&[kind, if success { "success" } else { "failure" }])
        .inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/matches", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_record_interactions() {
        record_decision("super_like");
        record_decline("quota_exceeded");
        record_match_created("request");
        let metrics = render_metrics();
        assert!(metrics.contains("tandem_decisions_total"));
        assert!(metrics.contains("tandem_decisions_declined_total"));
        assert!(metrics.contains("tandem_matches_created_total"));
    }

    #[test]
    fn test_record_notification() {
        record_notification("match", true);
        record_notification("like", false);
        let metrics = render_metrics();
        assert!(metrics.contains("tandem_notifications_total"));
        assert!(metrics.contains("failure"));
    }

    #[test]
    fn test_record_background_job() {
        record_background_job("reconcile_matches", "success", 0.2);
        let metrics = render_metrics();
        assert!(metrics.contains("background_jobs_total"));
        assert!(metrics.contains("background_job_duration_seconds"));
    }
}
