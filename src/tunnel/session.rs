//! One tunnel: target negotiation, block check, dial, relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::Instrument;

use crate::blocklist::{BlockReason, SharedBlockList};
use crate::lifecycle::StopLatch;
use crate::net::{Target, TargetError, TunnelGuard};
use crate::observability::metrics;
use crate::tunnel::relay;
use crate::upstream::{DialError, Dialer};

/// Reply sent once the target is connected.
pub const READY: &str = "ok";

/// Longest close reason a control frame can carry.
const MAX_CLOSE_REASON: usize = 123;

/// Everything a session needs besides its socket.
pub struct TunnelContext {
    pub dialer: Dialer,
    pub blocklist: Option<SharedBlockList>,
    pub connect_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub latch: StopLatch,
}

/// Reasons a tunnel never reached the relay phase.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("client left before the tunnel opened")]
    ClientGone,

    #[error("no target received within {0:?}")]
    TargetTimeout(Duration),

    #[error("expected a text frame carrying host:port")]
    UnexpectedFrame,

    #[error("invalid target: {0}")]
    BadTarget(#[from] TargetError),

    #[error("destination {target} blocked ({reason})")]
    Blocked { target: String, reason: BlockReason },

    #[error(transparent)]
    Dial(#[from] DialError),

    #[error("server shutting down")]
    ShuttingDown,

    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
}

impl SessionError {
    /// Close code sent to the client, if the socket is still usable.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            SessionError::ClientGone | SessionError::WebSocket(_) => None,
            SessionError::TargetTimeout(_)
            | SessionError::UnexpectedFrame
            | SessionError::BadTarget(_)
            | SessionError::Blocked { .. }
            | SessionError::Dial(DialError::Blocked(_)) => Some(close_code::POLICY),
            SessionError::Dial(_) => Some(close_code::ERROR),
            SessionError::ShuttingDown => Some(close_code::AWAY),
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            SessionError::ClientGone | SessionError::WebSocket(_) => "client_gone",
            SessionError::TargetTimeout(_) => "target_timeout",
            SessionError::UnexpectedFrame | SessionError::BadTarget(_) => "bad_request",
            SessionError::Blocked { .. } | SessionError::Dial(DialError::Blocked(_)) => "blocked",
            SessionError::Dial(_) => "dial_failed",
            SessionError::ShuttingDown => "shutdown",
        }
    }
}

fn close_frame(code: u16, reason: &str) -> CloseFrame {
    let mut end = reason.len().min(MAX_CLOSE_REASON);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    CloseFrame {
        code,
        reason: Utf8Bytes::from(reason[..end].to_owned()),
    }
}

async fn read_target(socket: &mut WebSocket) -> Result<String, SessionError> {
    while let Some(msg) = socket.recv().await {
        match msg? {
            Message::Text(text) => return Ok(text.as_str().to_owned()),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Binary(_) => return Err(SessionError::UnexpectedFrame),
            Message::Close(_) => return Err(SessionError::ClientGone),
        }
    }
    Err(SessionError::ClientGone)
}

async fn open(socket: &mut WebSocket, ctx: &TunnelContext) -> Result<(Target, TcpStream), SessionError> {
    let requested = tokio::select! {
        biased;
        _ = ctx.latch.wait() => return Err(SessionError::ShuttingDown),
        read = timeout(ctx.connect_timeout, read_target(socket)) => {
            read.map_err(|_| SessionError::TargetTimeout(ctx.connect_timeout))??
        }
    };
    let target = Target::parse(&requested)?;

    let list = ctx.blocklist.as_ref().map(|shared| shared.load_full());
    if let Some(reason) = list.as_deref().and_then(|l| l.check_host(&target.host)) {
        metrics::record_blocked(reason);
        return Err(SessionError::Blocked {
            target: target.to_string(),
            reason,
        });
    }

    let stream = tokio::select! {
        biased;
        _ = ctx.latch.wait() => return Err(SessionError::ShuttingDown),
        dialed = ctx.dialer.dial(&target, list.as_deref(), ctx.connect_timeout) => match dialed {
            Ok(stream) => stream,
            Err(DialError::Blocked(reason)) => {
                metrics::record_blocked(reason);
                return Err(DialError::Blocked(reason).into());
            }
            Err(e) => return Err(e.into()),
        },
    };

    socket.send(Message::Text(Utf8Bytes::from_static(READY))).await?;
    Ok((target, stream))
}

/// Drive one upgraded socket to completion.
pub async fn run(mut socket: WebSocket, peer: SocketAddr, ctx: Arc<TunnelContext>, guard: TunnelGuard) {
    let span = tracing::info_span!("tunnel", id = %guard.id(), %peer);

    async move {
        let outcome = match open(&mut socket, &ctx).await {
            Ok((target, stream)) => {
                tracing::info!(%target, dialer = ctx.dialer.as_label(), "Tunnel open");
                let summary = relay::relay(socket, stream, ctx.idle_timeout, &ctx.latch).await;
                tracing::info!(
                    %target,
                    end = summary.end.as_label(),
                    client_to_target = summary.client_to_target,
                    target_to_client = summary.target_to_client,
                    "Tunnel closed"
                );
                summary.end.as_label()
            }
            Err(e) => {
                match e.close_code() {
                    Some(code) => {
                        tracing::warn!(error = %e, "Tunnel rejected");
                        let frame = close_frame(code, &e.to_string());
                        let _ = timeout(
                            Duration::from_secs(1),
                            socket.send(Message::Close(Some(frame))),
                        )
                        .await;
                    }
                    None => tracing::debug!(error = %e, "Tunnel abandoned"),
                }
                e.as_label()
            }
        };
        metrics::record_tunnel(outcome);
        drop(guard);
    }
    .instrument(span)
    .await
}
