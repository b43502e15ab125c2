//! `host:port` targets.

use std::net::IpAddr;

use thiserror::Error;

/// Longest host name a SOCKS5 domain address can carry.
pub const MAX_HOST_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("missing port in `{0}`")]
    MissingPort(String),
    #[error("invalid port in `{0}`")]
    InvalidPort(String),
    #[error("empty host in `{0}`")]
    EmptyHost(String),
    #[error("host name too long (max 255 bytes)")]
    HostTooLong,
    #[error("IPv6 address must be bracketed in `{0}`")]
    UnbracketedIpv6(String),
}

/// A destination: host name or IP literal plus a non-zero port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Parse `host:port` or `[ipv6]:port`.
    pub fn parse(s: &str) -> Result<Target, TargetError> {
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let end = rest
                .find(']')
                .ok_or_else(|| TargetError::MissingPort(s.to_string()))?;
            let port = rest[end + 1..]
                .strip_prefix(':')
                .ok_or_else(|| TargetError::MissingPort(s.to_string()))?;
            (&rest[..end], port)
        } else {
            let colon = s
                .rfind(':')
                .ok_or_else(|| TargetError::MissingPort(s.to_string()))?;
            let host = &s[..colon];
            if host.contains(':') {
                return Err(TargetError::UnbracketedIpv6(s.to_string()));
            }
            (host, &s[colon + 1..])
        };

        if host.is_empty() {
            return Err(TargetError::EmptyHost(s.to_string()));
        }
        if host.len() > MAX_HOST_LEN {
            return Err(TargetError::HostTooLong);
        }
        let port: u16 = port
            .parse()
            .map_err(|_| TargetError::InvalidPort(s.to_string()))?;
        if port == 0 {
            return Err(TargetError::InvalidPort(s.to_string()));
        }

        Ok(Target {
            host: host.to_string(),
            port,
        })
    }

    /// The host as an IP literal, if it is one.
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ip() {
            Some(IpAddr::V6(ip)) => write!(f, "[{}]:{}", ip, self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}
