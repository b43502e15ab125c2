//! Loading the block list and keeping it fresh.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::blocklist::rules::{BlockList, CidrSet, DomainSet, IpFamily};
use crate::blocklist::source::{ListError, ListSource};
use crate::config::BlockConfig;
use crate::lifecycle::{Service, ServiceError, StopLatch};
use crate::observability::metrics;

/// Block list shared between the updater and every tunnel.
pub type SharedBlockList = Arc<ArcSwap<BlockList>>;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest reload interval accepted. Longer timer deadlines can overflow
/// `Instant`.
pub const MAX_UPDATE_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Reads every configured source and builds a [`BlockList`].
#[derive(Debug, Clone)]
pub struct BlockListLoader {
    domains: Option<ListSource>,
    cidr4: Option<ListSource>,
    cidr6: Option<ListSource>,
    geoip: Vec<String>,
    client: reqwest::Client,
}

impl BlockListLoader {
    pub fn from_config(config: &BlockConfig) -> Result<Self, ListError> {
        let parse = |value: &Option<String>| value.as_deref().map(ListSource::parse).transpose();
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(ListError::Client)?;

        Ok(Self {
            domains: parse(&config.domain_list)?,
            cidr4: parse(&config.cidr4_list)?,
            cidr6: parse(&config.cidr6_list)?,
            geoip: config
                .geoip
                .iter()
                .map(|code| code.trim().to_ascii_uppercase())
                .collect(),
            client,
        })
    }

    /// Fetch and parse all sources. Any failure fails the whole load.
    pub async fn load(&self) -> Result<BlockList, ListError> {
        let mut list = BlockList {
            geoip: self.geoip.clone(),
            ..BlockList::default()
        };

        if let Some(source) = &self.domains {
            let text = source.fetch(&self.client).await?;
            list.domains = DomainSet::from_text(&text);
        }
        if let Some(source) = &self.cidr4 {
            let text = source.fetch(&self.client).await?;
            list.cidr4 = CidrSet::from_text(&text, IpFamily::V4, &source.to_string())?;
        }
        if let Some(source) = &self.cidr6 {
            let text = source.fetch(&self.client).await?;
            list.cidr6 = CidrSet::from_text(&text, IpFamily::V6, &source.to_string())?;
        }

        Ok(list)
    }
}

/// Service reloading the block list on a fixed interval until stopped.
pub struct BlockListUpdater {
    loader: BlockListLoader,
    list: SharedBlockList,
    interval: Duration,
    latch: StopLatch,
}

impl BlockListUpdater {
    pub fn new(loader: BlockListLoader, list: SharedBlockList, interval: Duration) -> Self {
        Self {
            loader,
            list,
            interval: interval.min(MAX_UPDATE_INTERVAL),
            latch: StopLatch::new(),
        }
    }

    async fn reload(&self) {
        match self.loader.load().await {
            Ok(list) => {
                tracing::info!(
                    domains = list.domains.len(),
                    cidr4 = list.cidr4.len(),
                    cidr6 = list.cidr6.len(),
                    "Block list reloaded"
                );
                self.list.store(Arc::new(list));
                metrics::record_blocklist_reload(true);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Block list reload failed, keeping previous list");
                metrics::record_blocklist_reload(false);
            }
        }
    }

    async fn run(&self) {
        tracing::info!(interval = ?self.interval, "Block list updater starting");
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.reload() => {}
                        _ = self.latch.wait() => break,
                    }
                }
                _ = self.latch.wait() => break,
            }
        }
        tracing::info!("Block list updater stopped");
    }
}

impl Service for BlockListUpdater {
    fn name(&self) -> &str {
        "blocklist-updater"
    }

    fn start(&self) -> BoxFuture<'_, Result<(), ServiceError>> {
        async move {
            self.run().await;
            Ok(())
        }
        .boxed()
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), ServiceError>> {
        self.latch.trigger();
        async { Ok(()) }.boxed()
    }
}
