//! WebSocket event feed for pool updates
//!
//! One watcher task per tracked pool, subscribed to that pool's swap logs.
//! Watchers never touch the cache directly: they push `PoolEvent`s into a
//! channel and `run_invalidator` marks the matching catalog entry dirty, so
//! a burst of swaps collapses into a single refresh on the next cycle.

use crate::catalog::cache::PoolCache;
use crate::types::DexKind;
use alloy::primitives::{b256, Address, B256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::Filter;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Uniswap v3 `Swap(address,address,int256,int256,uint160,uint128,int24)`
pub const UNIV3_SWAP_TOPIC: B256 =
    b256!("c42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67");

/// Uniswap v2 style `Sync(uint112,uint112)`
pub const V2_SYNC_TOPIC: B256 =
    b256!("1c411e9a96e071241c2f21f7726b17ae89e3cab4c78be50e062b03a9fffbbad1");

/// Curve `TokenExchange(address,int128,uint256,int128,uint256)`
pub const CURVE_EXCHANGE_TOPIC: B256 =
    b256!("8b3e96f2b889fa771c53c981b40daf005f63f637f1869f707052d15a3dd97140");

/// Topics that signal a reserve change for the given venue kind.
pub fn swap_topics(dex: DexKind) -> Vec<B256> {
    match dex {
        DexKind::UniV3 => vec![UNIV3_SWAP_TOPIC, V2_SYNC_TOPIC],
        DexKind::Curve => vec![CURVE_EXCHANGE_TOPIC],
    }
}

/// A pool whose on-chain state just moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEvent {
    pub chain: String,
    pub dex: DexKind,
    pub pool: Address,
}

/// Log subscription seam, so watcher plumbing is testable without a node.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Stream of emitting pool addresses for logs matching any of `topics`.
    async fn subscribe(&self, pool: Address, topics: Vec<B256>)
        -> Result<BoxStream<'static, Address>>;
}

/// Production source backed by a WebSocket provider.
pub struct WsEventSource {
    provider: DynProvider,
}

impl WsEventSource {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl EventSource for WsEventSource {
    async fn subscribe(
        &self,
        pool: Address,
        topics: Vec<B256>,
    ) -> Result<BoxStream<'static, Address>> {
        let filter = Filter::new().address(pool).event_signature(topics);
        let sub = self.provider.subscribe_logs(&filter).await?;
        Ok(sub.into_stream().map(|log| log.address()).boxed())
    }
}

/// Watcher registry. Watching an already-watched pool is a no-op.
pub struct EventFeed {
    source: Arc<dyn EventSource>,
    tx: mpsc::Sender<PoolEvent>,
    watchers: DashMap<Address, JoinHandle<()>>,
}

impl EventFeed {
    pub fn new(source: Arc<dyn EventSource>, tx: mpsc::Sender<PoolEvent>) -> Self {
        Self {
            source,
            tx,
            watchers: DashMap::new(),
        }
    }

    pub fn watched_count(&self) -> usize {
        self.watchers.len()
    }

    /// Spawn a watcher task for `pool`. A failed subscribe is logged and the
    /// pool is left unwatched; the periodic refresh still covers it.
    pub fn watch_pool(&self, chain: String, dex: DexKind, pool: Address) {
        if self.watchers.contains_key(&pool) {
            return;
        }
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut stream = match source.subscribe(pool, swap_topics(dex)).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("subscribe failed for pool {pool}: {e}");
                    return;
                }
            };
            debug!("watching pool {pool} on {chain}/{dex}");
            while let Some(emitter) = stream.next().await {
                let event = PoolEvent {
                    chain: chain.clone(),
                    dex,
                    pool: emitter,
                };
                if tx.send(event).await.is_err() {
                    // invalidator gone, shutdown in progress
                    return;
                }
            }
            warn!("log stream ended for pool {pool} on {chain}");
        });
        self.watchers.insert(pool, handle);
    }

    pub fn unwatch(&self, pool: Address) {
        if let Some((_, handle)) = self.watchers.remove(&pool) {
            handle.abort();
        }
    }

    pub fn stop_all(&self) {
        let pools: Vec<Address> = self.watchers.iter().map(|e| *e.key()).collect();
        for pool in pools {
            self.unwatch(pool);
        }
    }
}

/// Consume pool events and mark the owning catalog entry dirty. Runs until
/// every `EventFeed` sender is dropped.
pub async fn run_invalidator(mut rx: mpsc::Receiver<PoolEvent>, cache: Arc<PoolCache>) {
    while let Some(event) = rx.recv().await {
        debug!(
            "pool {} moved on {}/{}, invalidating catalog entry",
            event.pool, event.chain, event.dex
        );
        cache.invalidate(&event.chain, event.dex);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct MockSource {
        rx: Mutex<Option<mpsc::Receiver<Address>>>,
    }

    impl MockSource {
        fn new() -> (Self, mpsc::Sender<Address>) {
            let (tx, rx) = mpsc::channel(16);
            (
                Self {
                    rx: Mutex::new(Some(rx)),
                },
                tx,
            )
        }
    }

    #[async_trait]
    impl EventSource for MockSource {
        async fn subscribe(
            &self,
            _pool: Address,
            _topics: Vec<B256>,
        ) -> Result<BoxStream<'static, Address>> {
            let rx = self
                .rx
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow::anyhow!("already subscribed"))?;
            let stream = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|addr| (addr, rx))
            });
            Ok(stream.boxed())
        }
    }

    #[tokio::test]
    async fn swap_event_marks_catalog_dirty() {
        let cache = Arc::new(PoolCache::new(Duration::from_secs(300)));
        cache.put("base".into(), DexKind::UniV3, vec![]);

        let (source, log_tx) = MockSource::new();
        let (tx, rx) = mpsc::channel(16);
        let feed = EventFeed::new(Arc::new(source), tx);
        tokio::spawn(run_invalidator(rx, Arc::clone(&cache)));

        let pool = Address::repeat_byte(0xab);
        feed.watch_pool("base".into(), DexKind::UniV3, pool);
        assert_eq!(feed.watched_count(), 1);

        log_tx.send(pool).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            cache.dirty_keys(),
            vec![("base".to_string(), DexKind::UniV3)]
        );
        // snapshot still served while dirty
        assert!(cache.get("base", DexKind::UniV3).is_some());
        feed.stop_all();
        assert_eq!(feed.watched_count(), 0);
    }

    #[tokio::test]
    async fn rewatching_same_pool_is_a_noop() {
        let (source, _log_tx) = MockSource::new();
        let (tx, _rx) = mpsc::channel(16);
        let feed = EventFeed::new(Arc::new(source), tx);

        let pool = Address::repeat_byte(0xcd);
        feed.watch_pool("base".into(), DexKind::UniV3, pool);
        feed.watch_pool("base".into(), DexKind::UniV3, pool);
        assert_eq!(feed.watched_count(), 1);
    }

    #[test]
    fn topics_cover_both_venue_kinds() {
        assert!(swap_topics(DexKind::UniV3).contains(&UNIV3_SWAP_TOPIC));
        assert_eq!(swap_topics(DexKind::Curve), vec![CURVE_EXCHANGE_TOPIC]);
    }
}
