//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated config into the set of services to run
//! - Perform the initial block-list load before any listener exists
//! - Install the metrics recorder when the profiling endpoint is enabled
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Services are registered here but started together by the orchestrator

use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::blocklist::{BlockListLoader, BlockListUpdater, ListError, SharedBlockList};
use crate::config::ServerConfig;
use crate::lifecycle::Registry;
use crate::net::{TargetError, TunnelTracker};
use crate::observability::{metrics, ProfilingService};
use crate::tunnel::TunnelServer;
use crate::upstream::Dialer;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load block lists: {0}")]
    BlockList(#[from] ListError),

    #[error("invalid SOCKS5 upstream: {0}")]
    Upstream(#[from] TargetError),
}

/// Build every service the config asks for.
pub async fn build_registry(config: &ServerConfig) -> Result<Registry, StartupError> {
    let mut registry = Registry::new();
    let tracker = TunnelTracker::new();

    if let Some(address) = &config.observability.profiling_address {
        let handle = metrics::install_recorder();
        registry.add(ProfilingService::new(address.clone(), tracker.clone(), handle));
        tracing::info!(address = %address, "Profiling endpoint enabled");
    }

    let blocklist = load_blocklist(config, &mut registry).await?;

    let dialer = Dialer::from_config(&config.upstream)?;
    if let Dialer::Socks5(upstream) = &dialer {
        tracing::info!(
            upstream = %upstream.server,
            auth = upstream.credentials.is_some(),
            "Dialing through SOCKS5 upstream"
        );
    }

    registry.add(TunnelServer::new(config, dialer, blocklist, tracker));

    tracing::info!(services = ?registry.names(), "Services registered");
    Ok(registry)
}

async fn load_blocklist(
    config: &ServerConfig,
    registry: &mut Registry,
) -> Result<Option<SharedBlockList>, StartupError> {
    let block = &config.block;
    if !block.is_enabled() {
        return Ok(None);
    }

    let loader = BlockListLoader::from_config(block)?;
    let list = loader.load().await?;
    tracing::info!(
        domains = list.domains.len(),
        cidr4 = list.cidr4.len(),
        cidr6 = list.cidr6.len(),
        "Block list loaded"
    );
    if !list.geoip.is_empty() {
        tracing::warn!(
            countries = ?list.geoip,
            "GeoIP blocking requested but no GeoIP database is available; country codes are ignored"
        );
    }

    let shared: SharedBlockList = Arc::new(ArcSwap::from_pointee(list));
    if let Some(interval) = block.update_interval() {
        registry.add(BlockListUpdater::new(loader, Arc::clone(&shared), interval));
    }
    Ok(Some(shared))
}
