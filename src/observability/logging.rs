//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at process start
//! - Pick pretty or JSON output from config
//! - Honour `RUST_LOG` over the configured level
//!
//! # Design Decisions
//! - `SOCKS5_DEBUG` turns on trace logs for the upstream dialer only

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Environment variable enabling SOCKS5 handshake tracing.
pub const SOCKS5_DEBUG_ENV: &str = "SOCKS5_DEBUG";

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: &str, socks5_debug: bool) -> String {
    let level = level.to_ascii_lowercase();
    let mut directives = format!("ws_proxy={level},tower_http={level}");
    if socks5_debug {
        directives.push_str(",ws_proxy::upstream=trace");
    }
    directives
}

/// Install the global subscriber.
pub fn init(config: &ObservabilityConfig) {
    let socks5_debug = std::env::var_os(SOCKS5_DEBUG_ENV).is_some_and(|v| !v.is_empty());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level, socks5_debug)));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}
