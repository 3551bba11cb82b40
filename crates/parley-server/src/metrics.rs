//! Metric names and the Prometheus recorder behind `/metrics`.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before the server records anything. The returned
/// handle is passed to [`ParleyServer::with_metrics`](crate::ParleyServer::with_metrics).
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus recorder installed");
    Ok(handle)
}

/// Chat connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Chat connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Chat connections currently open (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused at `max_connections` (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Broadcast frames that could not be queued for a recipient (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Chat lines fanned out (counter).
pub const CHAT_BROADCASTS_TOTAL: &str = "chat_broadcasts_total";
/// Inbound frames by decoded kind (counter, label `kind`).
pub const REQUESTS_TOTAL: &str = "requests_total";
/// Rejected sign-ins and sign-ups (counter, label `kind`).
pub const AUTH_FAILURES_TOTAL: &str = "auth_failures_total";
/// Chat connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
