//! WebSocket listener service.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;

use crate::blocklist::SharedBlockList;
use crate::config::ServerConfig;
use crate::lifecycle::{Service, ServiceError, StopLatch};
use crate::net::{listener, TunnelTracker};
use crate::observability::metrics;
use crate::tunnel::session::{self, TunnelContext};
use crate::upstream::Dialer;

/// Shared state injected into the upgrade handler.
#[derive(Clone)]
struct AppState {
    password: Arc<str>,
    permits: Arc<Semaphore>,
    max_connections: usize,
    tracker: TunnelTracker,
    context: Arc<TunnelContext>,
}

/// Accepts authenticated WebSocket upgrades on one path and turns each into
/// a tunnel.
pub struct TunnelServer {
    address: String,
    path: String,
    state: AppState,
}

impl TunnelServer {
    pub fn new(
        config: &ServerConfig,
        dialer: Dialer,
        blocklist: Option<SharedBlockList>,
        tracker: TunnelTracker,
    ) -> Self {
        let max_connections = config.listener.max_connections.min(Semaphore::MAX_PERMITS);
        Self {
            address: config.listener.bind_address.clone(),
            path: config.listener.path.clone(),
            state: AppState {
                password: Arc::from(config.auth.password.as_str()),
                permits: Arc::new(Semaphore::new(max_connections)),
                max_connections,
                tracker,
                context: Arc::new(TunnelContext {
                    dialer,
                    blocklist,
                    connect_timeout: config.timeouts.connect(),
                    idle_timeout: config.timeouts.idle(),
                    latch: StopLatch::new(),
                }),
            },
        }
    }

    /// Tunnel counters, shared with the profiling endpoint.
    pub fn tracker(&self) -> &TunnelTracker {
        &self.state.tracker
    }

    fn router(&self) -> Router {
        Router::new()
            .route(&self.path, get(upgrade_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    async fn serve(&self) -> Result<(), ServiceError> {
        let listener = listener::bind(&self.address).await?;
        tracing::info!(
            address = %listener.local_addr()?,
            path = %self.path,
            max_connections = self.state.max_connections,
            dialer = self.state.context.dialer.as_label(),
            "Tunnel server starting"
        );

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(self.state.context.latch.wait_owned())
            .await?;

        let active = self.state.tracker.active_count();
        if active > 0 {
            tracing::info!(active, "Waiting for tunnels to close");
        }
        self.state.tracker.wait_for_drain().await;
        tracing::info!("Tunnel server stopped");
        Ok(())
    }
}

impl Service for TunnelServer {
    fn name(&self) -> &str {
        "tunnel"
    }

    fn start(&self) -> BoxFuture<'_, Result<(), ServiceError>> {
        self.serve().boxed()
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), ServiceError>> {
        self.state.context.latch.trigger();
        async { Ok(()) }.boxed()
    }
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc: u8 = 0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

fn authorized(headers: &HeaderMap, password: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token.trim().as_bytes(), password.as_bytes()))
}

async fn upgrade_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !authorized(&headers, &state.password) {
        tracing::warn!(%peer, "Rejected tunnel: bad credentials");
        metrics::record_tunnel("unauthorized");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    if state.context.latch.is_triggered() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    let Ok(permit) = Arc::clone(&state.permits).try_acquire_owned() else {
        tracing::warn!(%peer, limit = state.max_connections, "Rejected tunnel: at capacity");
        metrics::record_tunnel("over_capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many tunnels").into_response();
    };

    let guard = state.tracker.track();
    let context = Arc::clone(&state.context);
    ws.on_upgrade(move |socket| async move {
        session::run(socket, peer, context, guard).await;
        drop(permit);
    })
}
