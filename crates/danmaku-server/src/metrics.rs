//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Outbound events dropped because a queue was full or closed (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Messages accepted and broadcast (counter).
pub const DANMAKU_ACCEPTED_TOTAL: &str = "danmaku_accepted_total";
/// Messages rejected by the blocklist (counter).
pub const DANMAKU_BANNED_TOTAL: &str = "danmaku_banned_total";
/// Admin login attempts (counter, labels: result).
pub const ADMIN_LOGIN_ATTEMPTS_TOTAL: &str = "admin_login_attempts_total";
/// State snapshots broadcast after a mutation (counter).
pub const STATE_BROADCASTS_TOTAL: &str = "state_broadcasts_total";
/// Stored uploads (counter, labels: kind).
pub const UPLOADS_TOTAL: &str = "uploads_total";
