//! ws-proxy
//!
//! Tunnels TCP connections over authenticated WebSockets.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                      WS-PROXY                        │
//!                    │                                                      │
//!   WebSocket client │  ┌──────────┐   ┌──────────┐   ┌──────────────────┐  │
//!   ─────────────────┼─▶│  tunnel  │──▶│ session  │──▶│    upstream      │──┼──▶ target
//!                    │  │  server  │   │ (target, │   │ direct / SOCKS5  │  │
//!                    │  └──────────┘   │  block)  │   └──────────────────┘  │
//!                    │                 └──────────┘                         │
//!                    │                                                      │
//!                    │  ┌────────────────────────────────────────────────┐  │
//!                    │  │              Cross-Cutting Concerns             │  │
//!                    │  │  ┌────────┐ ┌───────────┐ ┌─────────────────┐  │  │
//!                    │  │  │ config │ │ blocklist │ │  observability  │  │  │
//!                    │  │  └────────┘ └───────────┘ └─────────────────┘  │  │
//!                    │  │  ┌──────────────────────────────────────────┐  │  │
//!                    │  │  │ lifecycle: registry → orchestrator ← signal│ │  │
//!                    │  │  └──────────────────────────────────────────┘  │  │
//!                    │  └────────────────────────────────────────────────┘  │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;

use clap::Parser;

use ws_proxy::config::Cli;
use ws_proxy::lifecycle::{startup, Orchestrator, SignalBridge};
use ws_proxy::observability::logging;

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ws-proxy: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ws-proxy starting");
    tracing::info!(
        listen = %config.listener.bind_address,
        path = %config.listener.path,
        max_connections = config.listener.max_connections,
        blocking = config.block.is_enabled(),
        upstream = config.upstream.socks5.as_deref().unwrap_or("direct"),
        "Configuration loaded"
    );

    let registry = match startup::build_registry(&config).await {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    if registry.is_empty() {
        tracing::info!("No services configured");
        return ExitCode::SUCCESS;
    }

    let mut orchestrator = Orchestrator::new();
    if let Some(timeout) = config.shutdown.timeout() {
        orchestrator = orchestrator.with_shutdown_timeout(timeout);
    }
    let _signals = SignalBridge::spawn(orchestrator.handle());

    match orchestrator.run(registry).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, kind = e.as_label(), "Proxy stopped with error");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
