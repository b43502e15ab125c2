//! Debug HTTP endpoint.
//!
//! # Routes
//! - `GET /debug/status`: version, uptime and tunnel counts as JSON
//! - `GET /debug/metrics`: Prometheus text exposition
//! - `GET /healthz`: liveness

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::lifecycle::{Service, ServiceError, StopLatch};
use crate::net::{listener, TunnelTracker};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub active_tunnels: u64,
    pub total_tunnels: u64,
}

struct ProfilingState {
    tracker: TunnelTracker,
    metrics: Option<PrometheusHandle>,
    started_at: Instant,
}

/// Serves the debug routes on its own address until stopped.
pub struct ProfilingService {
    address: String,
    state: Arc<ProfilingState>,
    latch: StopLatch,
}

impl ProfilingService {
    pub fn new(address: String, tracker: TunnelTracker, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            address,
            state: Arc::new(ProfilingState {
                tracker,
                metrics,
                started_at: Instant::now(),
            }),
            latch: StopLatch::new(),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/debug/status", get(status_handler))
            .route("/debug/metrics", get(metrics_handler))
            .route("/healthz", get(|| async { "ok" }))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http())
    }

    async fn serve(&self) -> Result<(), ServiceError> {
        let listener = listener::bind(&self.address).await?;
        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!(address = %addr, "Profiling endpoint starting");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(self.latch.wait_owned())
            .await?;

        tracing::info!("Profiling endpoint stopped");
        Ok(())
    }
}

impl Service for ProfilingService {
    fn name(&self) -> &str {
        "profiling"
    }

    fn start(&self) -> BoxFuture<'_, Result<(), ServiceError>> {
        self.serve().boxed()
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), ServiceError>> {
        self.latch.trigger();
        async { Ok(()) }.boxed()
    }
}

async fn status_handler(State(state): State<Arc<ProfilingState>>) -> Json<StatusReport> {
    Json(StatusReport {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        active_tunnels: state.tracker.active_count(),
        total_tunnels: state.tracker.total_count(),
    })
}

async fn metrics_handler(State(state): State<Arc<ProfilingState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
