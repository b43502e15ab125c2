//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the WebSocket proxy server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, WebSocket path).
    pub listener: ListenerConfig,

    /// Client authentication.
    pub auth: AuthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Domain/CIDR/GeoIP blocking.
    pub block: BlockConfig,

    /// Optional upstream SOCKS5 proxy for outgoing connections.
    pub upstream: UpstreamConfig,

    /// Logging and profiling.
    pub observability: ObservabilityConfig,

    /// Shutdown policy.
    pub shutdown: ShutdownConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080" or ":8080").
    pub bind_address: String,

    /// URL path of the WebSocket endpoint.
    pub path: String,

    /// Maximum concurrent tunnels (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: String::new(),
            path: "/ws".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Client authentication.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret presented as `Authorization: Bearer <password>`.
    pub password: String,
}

/// Timeout configuration for tunnels.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Idle timeout per tunnel direction in seconds (0 = none).
    pub tcp_idle_secs: u64,

    /// Target handshake and connect timeout in seconds.
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tcp_idle_secs: 0,
            connect_secs: 10,
        }
    }
}

impl TimeoutConfig {
    pub fn idle(&self) -> Option<Duration> {
        (self.tcp_idle_secs > 0).then(|| Duration::from_secs(self.tcp_idle_secs))
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs.max(1))
    }
}

/// Blocking configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BlockConfig {
    /// Domain list source: http(s) URL or absolute path. One domain per line, suffix match.
    pub domain_list: Option<String>,

    /// IPv4 CIDR list source.
    pub cidr4_list: Option<String>,

    /// IPv6 CIDR list source.
    pub cidr6_list: Option<String>,

    /// Country codes to block.
    pub geoip: Vec<String>,

    /// Reload interval in seconds (0 = load once at startup).
    pub update_interval_secs: u64,
}

impl BlockConfig {
    /// Whether any blocking source is configured.
    pub fn is_enabled(&self) -> bool {
        self.domain_list.is_some()
            || self.cidr4_list.is_some()
            || self.cidr6_list.is_some()
            || !self.geoip.is_empty()
    }

    pub fn update_interval(&self) -> Option<Duration> {
        (self.update_interval_secs > 0).then(|| Duration::from_secs(self.update_interval_secs))
    }
}

/// Upstream SOCKS5 configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// SOCKS5 server address ("host:port").
    pub socks5: Option<String>,

    /// RFC 1929 username.
    pub username: Option<String>,

    /// RFC 1929 password.
    pub password: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Profiling endpoint bind address; disabled when unset.
    pub profiling_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            profiling_address: None,
        }
    }
}

/// Shutdown policy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Hard deadline for all services to stop, in seconds. Unset = wait indefinitely.
    pub timeout_secs: Option<u64>,
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listener.path, "/ws");
        assert_eq!(config.timeouts.idle(), None);
        assert_eq!(config.timeouts.connect(), Duration::from_secs(10));
        assert!(!config.block.is_enabled());
        assert_eq!(config.block.update_interval(), None);
        assert_eq!(config.shutdown.timeout(), None);
    }

    #[test]
    fn partial_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [block]
            geoip = ["US"]
            update_interval_secs = 60

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.listener.path, "/ws");
        assert!(config.block.is_enabled());
        assert_eq!(config.block.update_interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.observability.log_level, "info");
    }
}
