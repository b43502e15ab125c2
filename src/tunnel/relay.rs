//! Byte relay between an open WebSocket and its TCP target.

use std::future::Future;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{error::Elapsed, timeout};

use crate::lifecycle::StopLatch;
use crate::observability::metrics::{self, Direction};

const RELAY_BUFFER: usize = 16 * 1024;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    ClientClosed,
    TargetClosed,
    ClientError,
    TargetError,
    Idle,
    ShuttingDown,
}

impl RelayEnd {
    pub fn as_label(&self) -> &'static str {
        match self {
            RelayEnd::ClientClosed => "client_closed",
            RelayEnd::TargetClosed => "target_closed",
            RelayEnd::ClientError => "client_error",
            RelayEnd::TargetError => "target_error",
            RelayEnd::Idle => "idle_timeout",
            RelayEnd::ShuttingDown => "shutdown",
        }
    }

    fn close_frame(&self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            RelayEnd::ClientClosed | RelayEnd::ClientError => return None,
            RelayEnd::TargetClosed => (close_code::NORMAL, "target closed"),
            RelayEnd::TargetError => (close_code::ERROR, "target connection failed"),
            RelayEnd::Idle => (close_code::NORMAL, "idle timeout"),
            RelayEnd::ShuttingDown => (close_code::AWAY, "server shutting down"),
        };
        Some(CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        })
    }
}

/// Totals for one finished relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    pub end: RelayEnd,
    pub client_to_target: u64,
    pub target_to_client: u64,
}

async fn within<F: Future>(idle: Option<Duration>, fut: F) -> Result<F::Output, Elapsed> {
    match idle {
        Some(limit) => timeout(limit, fut).await,
        None => Ok(fut.await),
    }
}

/// Copy frames to the target and target bytes back as binary frames until
/// either side ends, a direction sits idle past `idle`, or `latch` fires.
pub async fn relay(
    socket: WebSocket,
    stream: TcpStream,
    idle: Option<Duration>,
    latch: &StopLatch,
) -> RelaySummary {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (mut tcp_rx, mut tcp_tx) = stream.into_split();
    let mut up = 0u64;
    let mut down = 0u64;

    let client_to_target = async {
        loop {
            let msg = match within(idle, ws_rx.next()).await {
                Err(_) => return RelayEnd::Idle,
                Ok(None) | Ok(Some(Ok(Message::Close(_)))) => return RelayEnd::ClientClosed,
                Ok(Some(Err(e))) => {
                    tracing::debug!(error = %e, "WebSocket read failed");
                    return RelayEnd::ClientError;
                }
                Ok(Some(Ok(msg))) => msg,
            };
            let payload: &[u8] = match &msg {
                Message::Binary(data) => &data[..],
                Message::Text(text) => text.as_str().as_bytes(),
                _ => continue,
            };
            if let Err(e) = tcp_tx.write_all(payload).await {
                tracing::debug!(error = %e, "Target write failed");
                return RelayEnd::TargetError;
            }
            up += payload.len() as u64;
            metrics::record_bytes(Direction::ClientToTarget, payload.len());
        }
    };

    let target_to_client = async {
        let mut buf = vec![0u8; RELAY_BUFFER];
        loop {
            let n = match within(idle, tcp_rx.read(&mut buf)).await {
                Err(_) => return RelayEnd::Idle,
                Ok(Ok(0)) => return RelayEnd::TargetClosed,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "Target read failed");
                    return RelayEnd::TargetError;
                }
            };
            let frame = Message::Binary(Bytes::copy_from_slice(&buf[..n]));
            if let Err(e) = ws_tx.send(frame).await {
                tracing::debug!(error = %e, "WebSocket write failed");
                return RelayEnd::ClientError;
            }
            down += n as u64;
            metrics::record_bytes(Direction::TargetToClient, n);
        }
    };

    let end = tokio::select! {
        end = client_to_target => end,
        end = target_to_client => end,
        _ = latch.wait() => RelayEnd::ShuttingDown,
    };

    let _ = timeout(CLOSE_TIMEOUT, async {
        if let Some(frame) = end.close_frame() {
            let _ = ws_tx.send(Message::Close(Some(frame))).await;
        }
        let _ = ws_tx.close().await;
    })
    .await;
    let _ = tcp_tx.shutdown().await;

    RelaySummary {
        end,
        client_to_target: up,
        target_to_client: down,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frames() {
        assert!(RelayEnd::ClientClosed.close_frame().is_none());
        assert_eq!(
            RelayEnd::ShuttingDown.close_frame().unwrap().code,
            close_code::AWAY
        );
        assert_eq!(RelayEnd::TargetError.close_frame().unwrap().code, close_code::ERROR);
        assert_eq!(RelayEnd::Idle.as_label(), "idle_timeout");
    }

    #[tokio::test]
    async fn within_without_limit_waits() {
        let value = within(None, async { 7 }).await.unwrap();
        assert_eq!(value, 7);
        let elapsed = within(Some(Duration::from_millis(10)), std::future::pending::<()>()).await;
        assert!(elapsed.is_err());
    }
}
