//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::{LogFormat, ServerConfig};
use crate::config::validation::validate_config;

#[derive(Parser, Debug, Default)]
#[command(name = "ws-proxy", version)]
#[command(about = "WebSocket to TCP proxy server", long_about = None)]
pub struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Listen address, like ':80' or '127.0.0.1:8080'
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Port to listen on all interfaces when no listen address is given
    #[arg(long, env = "PORT", hide = true)]
    pub port: Option<u16>,

    /// Server password
    #[arg(short, long, env = "SECRET_WS", hide_env_values = true)]
    pub password: Option<String>,

    /// URL path of the WebSocket endpoint [default: /ws]
    #[arg(long)]
    pub path: Option<String>,

    /// Maximum concurrent tunnels
    #[arg(long, value_name = "N")]
    pub max_connections: Option<usize>,

    /// Tunnel idle timeout in seconds, 0 disables it
    #[arg(long, value_name = "SECS")]
    pub tcp_timeout: Option<u64>,

    /// Target handshake and connect timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// One domain per line, suffix match. http://, https:// or absolute file path
    #[arg(long, value_name = "SOURCE")]
    pub block_domain_list: Option<String>,

    /// One IPv4 CIDR per line. http://, https:// or absolute file path
    #[arg(long, value_name = "SOURCE")]
    pub block_cidr4_list: Option<String>,

    /// One IPv6 CIDR per line. http://, https:// or absolute file path
    #[arg(long, value_name = "SOURCE")]
    pub block_cidr6_list: Option<String>,

    /// Block by GeoIP country code, such as US (repeatable)
    #[arg(long = "block-geoip", value_name = "CODE", value_delimiter = ',')]
    pub block_geoip: Vec<String>,

    /// Reload block lists every N seconds; 0 reads them once on start
    #[arg(long, value_name = "SECS")]
    pub update_list_interval: Option<u64>,

    /// Forward to a SOCKS5 server, such as 1.2.3.4:1080
    #[arg(long = "to-socks5", value_name = "ADDR")]
    pub to_socks5: Option<String>,

    /// Username for the SOCKS5 server
    #[arg(long = "to-socks5-username", value_name = "USER")]
    pub to_socks5_username: Option<String>,

    /// Password for the SOCKS5 server
    #[arg(long = "to-socks5-password", value_name = "PASS")]
    pub to_socks5_password: Option<String>,

    /// Profiling endpoint listen address, such as :6060
    #[arg(long, value_name = "ADDR")]
    pub pprof: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Abort services still running this many seconds after shutdown began
    #[arg(long, value_name = "SECS")]
    pub shutdown_timeout: Option<u64>,
}

impl Cli {
    /// Apply command-line values on top of `config`.
    pub fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        } else if config.listener.bind_address.is_empty() {
            if let Some(port) = self.port {
                config.listener.bind_address = format!(":{port}");
            }
        }
        if let Some(password) = self.password {
            config.auth.password = password;
        }
        if let Some(path) = self.path {
            config.listener.path = path;
        }
        if let Some(max) = self.max_connections {
            config.listener.max_connections = max;
        }
        if let Some(secs) = self.tcp_timeout {
            config.timeouts.tcp_idle_secs = secs;
        }
        if let Some(secs) = self.connect_timeout {
            config.timeouts.connect_secs = secs;
        }

        if self.block_domain_list.is_some() {
            config.block.domain_list = self.block_domain_list;
        }
        if self.block_cidr4_list.is_some() {
            config.block.cidr4_list = self.block_cidr4_list;
        }
        if self.block_cidr6_list.is_some() {
            config.block.cidr6_list = self.block_cidr6_list;
        }
        if !self.block_geoip.is_empty() {
            config.block.geoip = self.block_geoip;
        }
        if let Some(secs) = self.update_list_interval {
            config.block.update_interval_secs = secs;
        }

        if self.to_socks5.is_some() {
            config.upstream.socks5 = self.to_socks5;
        }
        if self.to_socks5_username.is_some() {
            config.upstream.username = self.to_socks5_username;
        }
        if self.to_socks5_password.is_some() {
            config.upstream.password = self.to_socks5_password;
        }

        if self.pprof.is_some() {
            config.observability.profiling_address = self.pprof;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        if self.shutdown_timeout.is_some() {
            config.shutdown.timeout_secs = self.shutdown_timeout;
        }

        config
    }

    /// Build the final, validated configuration: file (if any), then flags.
    pub fn into_config(mut self) -> Result<ServerConfig, ConfigError> {
        let base = match self.config.take() {
            Some(path) => read_config(&path)?,
            None => ServerConfig::default(),
        };
        let config = self.apply(base);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}
