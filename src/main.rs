//! Arbitrage route engine entry point
//!
//! One scan-cycle task per configured chain: refresh the leg catalog when
//! stale or invalidated, enumerate and score candidate routes against the
//! current gas price, and hand at most one actionable route per cycle to the
//! execution coordinator. WebSocket listeners only invalidate the catalog;
//! they never quote or submit.

use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use arbroute_bot::catalog::{events, EventFeed, PoolCache, WsEventSource};
use arbroute_bot::config::{BotConfig, ChainConfig, StrategyConfig, TokenRegistry};
use arbroute_bot::contracts::verify_selectors;
use arbroute_bot::discovery::{self, PoolDiscovery};
use arbroute_bot::execution::coordinator::{AlloyChainView, ChainView};
use arbroute_bot::execution::{ExecutionCoordinator, RelayBroadcaster};
use arbroute_bot::quotes::{CurveQuoter, QuoteResolver, UniV3Quoter};
use arbroute_bot::routing::{scorer, RouteGenerator};
use clap::Parser;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Multi-hop DEX arbitrage route engine
#[derive(Parser)]
#[command(name = "arbroute-bot")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "ARBROUTE_CONFIG", default_value = "config.toml")]
    config: String,

    /// Run only this chain (default: all configured chains)
    #[arg(long, env = "CHAIN")]
    chain: Option<String>,
}

struct ChainRunner {
    name: String,
    strategy: StrategyConfig,
    native_price_usd: f64,
    registry: TokenRegistry,
    cache: Arc<PoolCache>,
    discoveries: Vec<Box<dyn PoolDiscovery>>,
    resolver: QuoteResolver,
    chain_view: Arc<dyn ChainView>,
    coordinator: Arc<ExecutionCoordinator>,
    feed: Option<Arc<EventFeed>>,
}

impl ChainRunner {
    async fn build(
        name: String,
        chain: &ChainConfig,
        strategy: StrategyConfig,
        signer: PrivateKeySigner,
    ) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .connect_http(chain.rpc_url.parse().context("bad rpc_url")?)
            .erased();
        let chain_view: Arc<dyn ChainView> = Arc::new(AlloyChainView::new(provider.clone()));

        let registry = TokenRegistry::from_chain(chain)?;
        let cache = Arc::new(PoolCache::new(Duration::from_secs(
            strategy.refresh_interval_secs,
        )));
        let discoveries = discovery::discoveries_for(chain);

        let mut quoters: Vec<Box<dyn arbroute_bot::quotes::LegQuoter>> = Vec::new();
        if let Some(univ3) = &chain.univ3 {
            let quoter_v2 = univ3.quoter_v2.parse().context("bad quoter_v2 address")?;
            quoters.push(Box::new(UniV3Quoter::new(quoter_v2, provider.clone())));
        }
        if chain.curve.is_some() {
            quoters.push(Box::new(CurveQuoter::new(provider.clone())));
        }
        let resolver = QuoteResolver::new(quoters, registry.clone());

        let executor = chain.executor.parse().context("bad executor address")?;
        let broadcaster = Arc::new(RelayBroadcaster::new(
            reqwest::Client::new(),
            chain.private_tx_rpc.clone(),
            provider.clone(),
        ));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            chain.chain_id,
            executor,
            signer,
            Arc::clone(&chain_view),
            broadcaster,
            strategy.execution,
            strategy.profit.slippage_bps_per_leg,
            strategy.flashloan,
        ));

        // listeners need a WS endpoint; without one the periodic refresh
        // alone keeps the catalog current
        let feed = match &chain.ws_url {
            Some(ws_url) => {
                let ws = ProviderBuilder::new()
                    .connect_ws(WsConnect::new(ws_url.clone()))
                    .await
                    .context("ws connect failed")?
                    .erased();
                let (tx, rx) = mpsc::channel(1024);
                let feed = Arc::new(EventFeed::new(Arc::new(WsEventSource::new(ws)), tx));
                tokio::spawn(events::run_invalidator(rx, Arc::clone(&cache)));
                Some(feed)
            }
            None => {
                warn!("chain {name}: no ws_url, running without event invalidation");
                None
            }
        };

        Ok(Self {
            name,
            strategy,
            native_price_usd: chain.native_price_usd,
            registry,
            cache,
            discoveries,
            resolver,
            chain_view,
            coordinator,
            feed,
        })
    }

    async fn run(self) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.strategy.scan_interval_ms));
        loop {
            ticker.tick().await;
            let started = chrono::Utc::now();
            if let Err(e) = self.scan_cycle().await {
                error!("chain {}: scan cycle failed: {e:#}", self.name);
            }
            debug!(
                "chain {}: cycle finished in {}ms",
                self.name,
                (chrono::Utc::now() - started).num_milliseconds()
            );
        }
    }

    async fn scan_cycle(&self) -> Result<()> {
        if self.cache.is_stale() || !self.cache.dirty_keys().is_empty() {
            discovery::refresh_catalog(
                &self.name,
                &self.discoveries,
                &self.registry,
                &self.strategy.limits,
                &self.cache,
                self.feed.as_deref(),
            )
            .await;
        }
        if let Err(e) = self.cache.check_freshness() {
            warn!("chain {}: running degraded: {e}", self.name);
        }

        let snapshot = self.cache.snapshot();
        if snapshot.is_empty() {
            debug!("chain {}: empty catalog, skipping cycle", self.name);
            return Ok(());
        }

        let gas_price = self.chain_view.gas_price().await?;
        let gas_usd = scorer::gas_cost_usd(
            self.strategy.execution.gas_limit,
            gas_price,
            self.native_price_usd,
        );

        let generator = RouteGenerator::new(snapshot.legs());
        let mut candidates = 0usize;
        for route in generator.routes(self.strategy.limits.max_hops) {
            if candidates >= self.strategy.max_candidates_per_cycle {
                break;
            }
            if !scorer::allowed(&route, &self.strategy.limits) {
                continue;
            }
            candidates += 1;

            for &size_usd in &self.strategy.sizes_usd {
                let Some(amount_in) = self
                    .registry
                    .amount_from_usd(&route.input_token(), size_usd)
                else {
                    continue;
                };
                let quote = match self.resolver.resolve(&route, amount_in).await {
                    Ok(quote) => quote,
                    Err(e) => {
                        debug!("chain {}: {e}", self.name);
                        break; // other sizes will fail the same way
                    }
                };
                let flash_usd = scorer::flash_fee_usd(quote.amount_in_usd, &self.strategy.flashloan);
                let scored = scorer::score(quote, gas_usd, flash_usd, &self.strategy.profit);
                if !scored.actionable() {
                    continue;
                }

                info!(
                    "💰 chain {}: actionable [{}] size=${size_usd} profit=${:.2} required=${:.2}",
                    self.name,
                    scored.quote.route.describe(),
                    scored.profit_usd,
                    scored.required_profit_usd,
                );
                match self.coordinator.execute(&scored).await {
                    Ok(attempt) => info!(
                        "chain {}: attempt ended {} ({} transitions)",
                        self.name,
                        attempt.state,
                        attempt.transitions.len()
                    ),
                    Err(e) => warn!("chain {}: attempt failed: {e}", self.name),
                }
                // one submission per cycle, then re-evaluate on fresh state
                return Ok(());
            }
        }
        debug!("chain {}: {candidates} candidates, none actionable", self.name);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = BotConfig::load(&args.config)?;
    verify_selectors()?;
    info!("Arbitrage route engine starting ({} chains configured)", config.chains.len());

    let key = std::env::var("PRIVATE_KEY").context("PRIVATE_KEY not set")?;
    let signer: PrivateKeySigner = key.parse().context("invalid PRIVATE_KEY")?;
    info!("Signer address: {}", signer.address());

    let mut coordinators = Vec::new();
    let mut feeds = Vec::new();
    let mut tasks = Vec::new();
    for (name, chain) in &config.chains {
        if let Some(only) = &args.chain {
            if only != name {
                continue;
            }
        }
        info!("Starting chain {name} (chain_id {})", chain.chain_id);
        let runner = ChainRunner::build(
            name.clone(),
            chain,
            config.strategy.clone(),
            signer.clone(),
        )
        .await
        .with_context(|| format!("failed to start chain {name}"))?;
        coordinators.push((name.clone(), Arc::clone(&runner.coordinator)));
        if let Some(feed) = &runner.feed {
            feeds.push(Arc::clone(feed));
        }
        tasks.push(tokio::spawn(runner.run()));
    }
    if tasks.is_empty() {
        anyhow::bail!("no chains matched --chain filter");
    }

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("signal handler setup failed")?;
    let signals_handle = signals.handle();
    signals.next().await;
    info!("Shutdown signal received, stopping scan cycles");

    for task in &tasks {
        task.abort();
    }
    for feed in &feeds {
        feed.stop_all();
    }
    for (name, coordinator) in &coordinators {
        match coordinator.last_submission() {
            Some((nonce, hash)) => {
                info!("chain {name}: last submission nonce={nonce} tx={hash:#x}");
                if config.strategy.execution.clear_nonce_on_shutdown {
                    match coordinator.clear_nonce().await {
                        Ok(hash) => info!("chain {name}: nonce cleared with {hash:#x}"),
                        Err(e) => warn!("chain {name}: nonce clear failed: {e:#}"),
                    }
                }
            }
            None => info!("chain {name}: no submissions this run"),
        }
    }
    signals_handle.close();
    info!("Shutdown complete");
    Ok(())
}
