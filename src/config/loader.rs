//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read a TOML configuration file without validating it.
///
/// Command-line overrides are applied on top before validation, so a file
/// may legitimately leave required values (such as the password) unset.
pub fn read_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ws-proxy-{}-{}", std::process::id(), name));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_valid_file() {
        let path = write_temp(
            "valid.toml",
            r#"
            [listener]
            bind_address = "127.0.0.1:8080"

            [auth]
            password = "secret"
            "#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:8080");
        assert_eq!(config.auth.password, "secret");
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn rejects_invalid_file() {
        let path = write_temp(
            "invalid.toml",
            r#"
            [listener]
            bind_address = "127.0.0.1:8080"
            "#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("password is required"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn reports_parse_errors() {
        let path = write_temp("broken.toml", "[listener\n");
        assert!(matches!(read_config(&path), Err(ConfigError::Parse(_))));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file() {
        let err = read_config(Path::new("/nonexistent/ws-proxy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
