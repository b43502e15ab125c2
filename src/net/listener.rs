//! TCP listener binding.
//!
//! # Responsibilities
//! - Resolve configured addresses (Go-style `:port` included)
//! - Bind and report bind failures as service start failures

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::validation::parse_listen_address;
use crate::lifecycle::ServiceError;

/// Bind a TCP listener on `address`.
pub async fn bind(address: &str) -> Result<TcpListener, ServiceError> {
    let addr: SocketAddr = parse_listen_address(address).ok_or_else(|| ServiceError::Bind {
        address: address.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid socket address"),
    })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServiceError::Bind {
            address: address.to_string(),
            source,
        })?;

    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listener bound");

    Ok(listener)
}
