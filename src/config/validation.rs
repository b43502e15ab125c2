//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde and clap handle syntax)
//! - Check required values (listen address, password)
//! - Check list sources are http(s) URLs or absolute paths
//! - Check upstream and profiling addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before any service is built

use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::blocklist::source::ListSource;
use crate::blocklist::updater::MAX_UPDATE_INTERVAL;
use crate::config::schema::ServerConfig;
use crate::net::target::Target;

/// Maximum RFC 1929 username/password length.
const MAX_CREDENTIAL_LEN: usize = 255;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listen address is required (--listen or PORT)")]
    MissingListen,

    #[error("invalid listen address `{0}`")]
    InvalidListen(String),

    #[error("password is required (--password or SECRET_WS)")]
    MissingPassword,

    #[error("path `{0}` must start with '/'")]
    InvalidPath(String),

    #[error("max connections must be greater than 0")]
    ZeroMaxConnections,

    #[error("max connections {0} is above the supported maximum")]
    TooManyConnections(usize),

    #[error("{field} must be an http(s) URL or an absolute path, got `{value}`")]
    InvalidListSource { field: &'static str, value: String },

    #[error("list update interval {0}s is longer than one year")]
    UpdateIntervalTooLong(u64),

    #[error("invalid GeoIP country code `{0}`")]
    InvalidGeoIp(String),

    #[error("invalid SOCKS5 upstream `{0}`, expected host:port")]
    InvalidUpstream(String),

    #[error("{field} is longer than 255 bytes")]
    CredentialTooLong { field: &'static str },

    #[error("SOCKS5 password given without a username")]
    PasswordWithoutUsername,

    #[error("invalid profiling address `{0}`")]
    InvalidProfilingAddress(String),

    #[error("invalid log level `{0}`")]
    InvalidLogLevel(String),
}

/// Parse a listen address. Go-style `:port` means all interfaces.
pub fn parse_listen_address(address: &str) -> Option<SocketAddr> {
    let address = address.trim();
    if let Some(port) = address.strip_prefix(':') {
        return port.parse::<u16>().ok().map(|p| SocketAddr::from(([0, 0, 0, 0], p)));
    }
    address.parse().ok()
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listen = config.listener.bind_address.trim();
    if listen.is_empty() {
        errors.push(ValidationError::MissingListen);
    } else if parse_listen_address(listen).is_none() {
        errors.push(ValidationError::InvalidListen(listen.to_string()));
    }

    if config.auth.password.is_empty() {
        errors.push(ValidationError::MissingPassword);
    }

    if !config.listener.path.starts_with('/') {
        errors.push(ValidationError::InvalidPath(config.listener.path.clone()));
    }

    let max_connections = config.listener.max_connections;
    if max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    } else if max_connections > Semaphore::MAX_PERMITS {
        errors.push(ValidationError::TooManyConnections(max_connections));
    }

    let sources = [
        ("--block-domain-list", &config.block.domain_list),
        ("--block-cidr4-list", &config.block.cidr4_list),
        ("--block-cidr6-list", &config.block.cidr6_list),
    ];
    for (field, value) in sources {
        if let Some(value) = value {
            if ListSource::parse(value).is_err() {
                errors.push(ValidationError::InvalidListSource {
                    field,
                    value: value.clone(),
                });
            }
        }
    }

    if config.block.update_interval_secs > MAX_UPDATE_INTERVAL.as_secs() {
        errors.push(ValidationError::UpdateIntervalTooLong(
            config.block.update_interval_secs,
        ));
    }

    for code in &config.block.geoip {
        let code = code.trim();
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push(ValidationError::InvalidGeoIp(code.to_string()));
        }
    }

    let upstream = &config.upstream;
    if let Some(address) = &upstream.socks5 {
        if Target::parse(address).is_err() {
            errors.push(ValidationError::InvalidUpstream(address.clone()));
        }
    }
    if upstream.username.as_ref().is_some_and(|u| u.len() > MAX_CREDENTIAL_LEN) {
        errors.push(ValidationError::CredentialTooLong {
            field: "--to-socks5-username",
        });
    }
    if upstream.password.as_ref().is_some_and(|p| p.len() > MAX_CREDENTIAL_LEN) {
        errors.push(ValidationError::CredentialTooLong {
            field: "--to-socks5-password",
        });
    }
    if upstream.password.is_some() && upstream.username.is_none() {
        errors.push(ValidationError::PasswordWithoutUsername);
    }

    if let Some(address) = &config.observability.profiling_address {
        if parse_listen_address(address).is_none() {
            errors.push(ValidationError::InvalidProfilingAddress(address.clone()));
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.listener.bind_address = ":8080".into();
        config.auth.password = "secret".into();
        config
    }

    #[test]
    fn accepts_minimal_config() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn go_style_listen_address() {
        assert_eq!(
            parse_listen_address(":80"),
            Some("0.0.0.0:80".parse().unwrap())
        );
        assert_eq!(
            parse_listen_address("127.0.0.1:9000"),
            Some("127.0.0.1:9000".parse().unwrap())
        );
        assert_eq!(parse_listen_address(":"), None);
        assert_eq!(parse_listen_address("nowhere"), None);
    }

    #[test]
    fn reports_all_errors() {
        let mut config = ServerConfig::default();
        config.listener.path = "ws".into();
        config.block.domain_list = Some("relative/list.txt".into());
        config.block.geoip = vec!["USA".into()];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingListen));
        assert!(errors.contains(&ValidationError::MissingPassword));
        assert!(errors.contains(&ValidationError::InvalidPath("ws".into())));
        assert!(errors.contains(&ValidationError::InvalidGeoIp("USA".into())));
        assert!(errors.contains(&ValidationError::InvalidListSource {
            field: "--block-domain-list",
            value: "relative/list.txt".into(),
        }));
    }

    #[test]
    fn list_sources() {
        let mut config = valid();
        config.block.domain_list = Some("https://example.com/domains.txt".into());
        config.block.cidr4_list = Some("/etc/ws-proxy/cidr4.txt".into());
        config.block.cidr6_list = Some("http://example.com/cidr6.txt".into());
        assert_eq!(validate_config(&config), Ok(()));

        config.block.cidr4_list = Some("ftp://example.com/cidr4.txt".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "--block-cidr4-list must be an http(s) URL or an absolute path, got `ftp://example.com/cidr4.txt`"
        );
    }

    #[test]
    fn upstream_checks() {
        let mut config = valid();
        config.upstream.socks5 = Some("proxy.local:1080".into());
        config.upstream.username = Some("user".into());
        config.upstream.password = Some("pass".into());
        assert_eq!(validate_config(&config), Ok(()));

        config.upstream.socks5 = Some("proxy.local".into());
        config.upstream.username = None;
        config.upstream.password = Some("x".repeat(256));
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidUpstream("proxy.local".into())));
        assert!(errors.contains(&ValidationError::PasswordWithoutUsername));
        assert!(errors.contains(&ValidationError::CredentialTooLong {
            field: "--to-socks5-password"
        }));
    }

    #[test]
    fn profiling_and_log_level() {
        let mut config = valid();
        config.observability.profiling_address = Some(":6060".into());
        config.observability.log_level = "DEBUG".into();
        assert_eq!(validate_config(&config), Ok(()));

        config.observability.profiling_address = Some("localhost".into());
        config.observability.log_level = "loud".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn connection_limit_bounds() {
        let mut config = valid();
        config.listener.max_connections = Semaphore::MAX_PERMITS;
        assert_eq!(validate_config(&config), Ok(()));

        config.listener.max_connections = usize::MAX;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::TooManyConnections(usize::MAX)])
        );
    }

    #[test]
    fn update_interval_bounds() {
        let mut config = valid();
        config.block.domain_list = Some("/etc/ws-proxy/domains.txt".into());
        config.block.update_interval_secs = MAX_UPDATE_INTERVAL.as_secs();
        assert_eq!(validate_config(&config), Ok(()));

        config.block.update_interval_secs = u64::MAX;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::UpdateIntervalTooLong(u64::MAX)])
        );
    }
}
