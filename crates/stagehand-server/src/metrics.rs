//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if another recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Connections accepted (counter).
pub const CONNECTIONS_OPENED_TOTAL: &str = "worker_connections_opened_total";
/// Connections fully torn down (counter).
pub const CONNECTIONS_CLOSED_TOTAL: &str = "worker_connections_closed_total";
/// Live connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "worker_connections_active";
/// Connection lifetime (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "worker_connection_duration_seconds";
/// Requests handed to the handler (counter).
pub const REQUESTS_DELEGATED_TOTAL: &str = "worker_requests_delegated_total";
/// Requests answered with Error + Finish (counter).
pub const REQUESTS_REJECTED_TOTAL: &str = "worker_requests_rejected_total";
/// Messages ignored outside a request cycle (counter).
pub const MESSAGES_DROPPED_TOTAL: &str = "worker_messages_dropped_total";
/// Outgoing events that failed to encode (counter).
pub const ENCODE_FAILURES_TOTAL: &str = "worker_encode_failures_total";
/// Transport writes that failed (counter).
pub const WRITE_FAILURES_TOTAL: &str = "worker_write_failures_total";
