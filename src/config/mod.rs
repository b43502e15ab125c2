//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → cli.rs (flags and env override file values)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → consumed once by lifecycle::startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde/clap) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, BlockConfig, ListenerConfig, LogFormat, ObservabilityConfig, ServerConfig,
    ShutdownConfig, TimeoutConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
