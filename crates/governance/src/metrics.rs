//! Metrics implementation using Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use playgate_core::{Error, Result, ValidationIssue};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let builder = PrometheusBuilder::new();

    let handle = builder
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Helper to track HTTP request metrics (latency, count).
pub fn track_request(method: &str, path: &str, status: u16, latency_sec: f64) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(latency_sec);
}

/// Track one validator run and the kinds of issues it found.
pub fn track_validation(issues: &[ValidationIssue]) {
    let outcome = if issues.is_empty() { "accepted" } else { "rejected" };
    metrics::counter!("playgate_validations_total", "outcome" => outcome).increment(1);
    for issue in issues {
        metrics::counter!("playgate_validation_issues_total", "kind" => issue.kind()).increment(1);
    }
}

/// Track a bridge round trip. `outcome` is `ok` or a bridge error kind.
pub fn track_bridge_call(operation: &str, outcome: &str, latency_sec: f64) {
    metrics::counter!(
        "playgate_bridge_calls_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "playgate_bridge_call_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(latency_sec);
}

/// Track a runtime fault recorded against an instance.
pub fn track_runtime_fault(operation: &str, kind: &str) {
    metrics::counter!(
        "playgate_runtime_faults_total",
        "operation" => operation.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Track a denied request.
pub fn track_rate_limited(limit: &str) {
    metrics::counter!("playgate_rate_limited_total", "limit" => limit.to_string()).increment(1);
}

/// Track a session lifecycle event (`created`, `ended`, `bootstrap_failed`, ...).
pub fn track_session(event: &str) {
    metrics::counter!("playgate_session_events_total", "event" => event.to_string()).increment(1);
}

/// Record the number of live isolated instances.
pub fn track_live_instances(count: usize) {
    metrics::gauge!("playgate_live_instances").set(count as f64);
}
