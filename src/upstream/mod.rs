//! Outbound connections for tunnels.
//!
//! # Data Flow
//! ```text
//! Target (host:port from the client)
//!     → Dialer::Direct: resolve → CIDR check per address → connect (first that works)
//!     → Dialer::Socks5: connect to upstream → socks5.rs handshake → CONNECT target
//!     → TcpStream handed to the tunnel relay
//! ```
//!
//! # Design Decisions
//! - The dialer is a value injected into the tunnel server, not a service
//! - Domain and literal-IP blocking happens before dialing, in the tunnel;
//!   resolved-address blocking happens here, for direct dials only

pub mod socks5;

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::blocklist::{BlockList, BlockReason};
use crate::config::UpstreamConfig;
use crate::net::{Target, TargetError};

pub use socks5::{Credentials, Socks5Upstream};

/// Errors raised while dialing a target.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DialError {
    #[error("failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} resolved to no addresses")]
    NoAddresses(String),

    #[error("connecting to {0} timed out")]
    Timeout(String),

    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("destination blocked ({0})")]
    Blocked(BlockReason),

    #[error("upstream SOCKS5 protocol error: {0}")]
    Protocol(&'static str),

    #[error("upstream SOCKS5 proxy requires authentication")]
    AuthRequired,

    #[error("upstream SOCKS5 authentication failed")]
    AuthFailed,

    #[error("upstream SOCKS5 proxy accepted none of the offered methods")]
    NoAcceptableMethod,

    #[error("upstream SOCKS5 proxy refused the connection: {}", socks5::reply_message(*.0))]
    Rejected(u8),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DialError {
    /// Short label for metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DialError::Resolve { .. } | DialError::NoAddresses(_) => "resolve",
            DialError::Timeout(_) => "timeout",
            DialError::Connect { .. } => "connect",
            DialError::Blocked(_) => "blocked",
            DialError::Protocol(_)
            | DialError::AuthRequired
            | DialError::AuthFailed
            | DialError::NoAcceptableMethod
            | DialError::Rejected(_) => "upstream",
            DialError::Io(_) => "io",
        }
    }
}

/// How tunnels reach their targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Dialer {
    #[default]
    Direct,
    Socks5(Socks5Upstream),
}

impl Dialer {
    /// Build from validated config.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, TargetError> {
        let Some(address) = &config.socks5 else {
            return Ok(Dialer::Direct);
        };
        let server = Target::parse(address)?;
        let credentials = config.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: config.password.clone().unwrap_or_default(),
        });
        Ok(Dialer::Socks5(Socks5Upstream::new(server, credentials)))
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Dialer::Direct => "direct",
            Dialer::Socks5(_) => "socks5",
        }
    }

    /// Open a TCP stream to `target`.
    ///
    /// `connect_timeout` bounds each connection attempt and, for SOCKS5,
    /// the handshake as a whole.
    pub async fn dial(
        &self,
        target: &Target,
        blocklist: Option<&BlockList>,
        connect_timeout: Duration,
    ) -> Result<TcpStream, DialError> {
        match self {
            Dialer::Direct => dial_direct(target, blocklist, connect_timeout).await,
            Dialer::Socks5(upstream) => {
                let mut stream = dial_direct(&upstream.server, None, connect_timeout).await?;
                timeout(connect_timeout, upstream.handshake(&mut stream, target))
                    .await
                    .map_err(|_| DialError::Timeout(upstream.server.to_string()))??;
                tracing::debug!(
                    upstream = %upstream.server,
                    target = %target,
                    "SOCKS5 upstream connected"
                );
                Ok(stream)
            }
        }
    }
}

async fn resolve(target: &Target) -> Result<Vec<SocketAddr>, DialError> {
    if let Some(ip) = target.ip() {
        return Ok(vec![SocketAddr::new(ip, target.port)]);
    }
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|source| DialError::Resolve {
            target: target.to_string(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(DialError::NoAddresses(target.to_string()));
    }
    Ok(addrs)
}

async fn dial_direct(
    target: &Target,
    blocklist: Option<&BlockList>,
    connect_timeout: Duration,
) -> Result<TcpStream, DialError> {
    let addrs = resolve(target).await?;

    if let Some(list) = blocklist {
        if let Some(reason) = addrs.iter().find_map(|addr| list.check_ip(addr.ip())) {
            return Err(DialError::Blocked(reason));
        }
    }

    let mut last_error = None;
    for addr in addrs {
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(source)) => {
                tracing::debug!(%addr, error = %source, "Connect attempt failed");
                last_error = Some(DialError::Connect {
                    target: target.to_string(),
                    source,
                });
            }
            Err(_) => {
                tracing::debug!(%addr, "Connect attempt timed out");
                last_error = Some(DialError::Timeout(target.to_string()));
            }
        }
    }
    Err(last_error.unwrap_or_else(|| DialError::NoAddresses(target.to_string())))
}
