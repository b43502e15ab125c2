//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define tunnel and block-list metrics
//! - Install the Prometheus recorder backing `/debug/metrics`
//!
//! # Metrics
//! - `ws_proxy_tunnels_total` (counter): finished tunnels by outcome
//! - `ws_proxy_active_tunnels` (gauge): current tunnel count
//! - `ws_proxy_tunnel_bytes_total` (counter): relayed bytes by direction
//! - `ws_proxy_blocked_total` (counter): refused destinations by reason
//! - `ws_proxy_blocklist_reloads_total` (counter): reloads by outcome
//!
//! # Design Decisions
//! - Without an installed recorder every update is a no-op
//! - Labels are static strings only

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::blocklist::BlockReason;

/// Install the global Prometheus recorder.
///
/// Returns `None` if a recorder is already installed in this process.
pub fn install_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install metrics recorder");
            None
        }
    }
}

/// Direction of relayed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToTarget,
    TargetToClient,
}

impl Direction {
    pub fn as_label(&self) -> &'static str {
        match self {
            Direction::ClientToTarget => "client_to_target",
            Direction::TargetToClient => "target_to_client",
        }
    }
}

pub fn record_tunnel(outcome: &'static str) {
    ::metrics::counter!("ws_proxy_tunnels_total", "outcome" => outcome).increment(1);
}

pub fn record_tunnel_opened() {
    ::metrics::gauge!("ws_proxy_active_tunnels").increment(1.0);
}

pub fn record_tunnel_closed() {
    ::metrics::gauge!("ws_proxy_active_tunnels").decrement(1.0);
}

pub fn record_bytes(direction: Direction, bytes: usize) {
    ::metrics::counter!("ws_proxy_tunnel_bytes_total", "direction" => direction.as_label())
        .increment(bytes as u64);
}

pub fn record_blocked(reason: BlockReason) {
    ::metrics::counter!("ws_proxy_blocked_total", "reason" => reason.as_label()).increment(1);
}

pub fn record_blocklist_reload(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    ::metrics::counter!("ws_proxy_blocklist_reloads_total", "outcome" => outcome).increment(1);
}
