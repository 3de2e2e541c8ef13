//! Venue discovery via subgraphs
//!
//! Pulls the top pools per venue ordered by TVL, re-validates the TVL
//! threshold locally (subgraph ordering is not a guarantee), and flattens
//! each pool into directed legs. Discovery failures are never fatal: the
//! caller keeps serving the previous catalog snapshot.

use crate::catalog::{EventFeed, PoolCache};
use crate::config::{ChainConfig, LimitsConfig, TokenRegistry};
use crate::errors::EngineError;
use crate::types::{DexKind, Leg, LegPricing};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const POOLS_PER_VENUE: u32 = 200;
const SUBGRAPH_TIMEOUT: Duration = Duration::from_secs(20);

/// One venue's discovery collaborator. Returns directed legs already
/// filtered by the configured limits.
#[async_trait]
pub trait PoolDiscovery: Send + Sync {
    fn dex(&self) -> DexKind;
    async fn fetch_legs(
        &self,
        chain: &str,
        registry: &TokenRegistry,
        limits: &LimitsConfig,
    ) -> Result<Vec<Leg>, EngineError>;
}

// ── Subgraph response shapes ─────────────────────────────────────────
// The Graph returns numeric fields as decimal strings.

#[derive(Debug, Deserialize)]
struct GraphResponse<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct UniV3Pools {
    pools: Vec<UniV3Pool>,
}

#[derive(Debug, Deserialize)]
pub struct UniV3Pool {
    id: String,
    #[serde(rename = "feeTier")]
    fee_tier: String,
    #[serde(rename = "totalValueLockedUSD")]
    tvl_usd: String,
    token0: SubgraphToken,
    token1: SubgraphToken,
}

#[derive(Debug, Deserialize)]
struct SubgraphToken {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CurvePools {
    pools: Vec<CurvePool>,
}

#[derive(Debug, Deserialize)]
pub struct CurvePool {
    id: String,
    #[serde(rename = "totalValueLockedUSD")]
    tvl_usd: String,
    coins: Vec<CurveCoin>,
}

#[derive(Debug, Deserialize)]
struct CurveCoin {
    address: String,
    index: String,
}

async fn post_query<T: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    url: &str,
    query: &str,
) -> Result<T> {
    let response = client
        .post(url)
        .json(&json!({ "query": query }))
        .timeout(SUBGRAPH_TIMEOUT)
        .send()
        .await
        .context("subgraph request failed")?
        .error_for_status()
        .context("subgraph returned error status")?;
    let body: GraphResponse<T> = response.json().await.context("malformed subgraph body")?;
    body.data.context("subgraph response missing data")
}

// ── Uniswap v3 ───────────────────────────────────────────────────────

pub struct UniV3Discovery {
    client: reqwest::Client,
    subgraph: String,
    router: Address,
}

impl UniV3Discovery {
    pub fn new(client: reqwest::Client, subgraph: String, router: Address) -> Self {
        Self {
            client,
            subgraph,
            router,
        }
    }
}

#[async_trait]
impl PoolDiscovery for UniV3Discovery {
    fn dex(&self) -> DexKind {
        DexKind::UniV3
    }

    async fn fetch_legs(
        &self,
        chain: &str,
        registry: &TokenRegistry,
        limits: &LimitsConfig,
    ) -> Result<Vec<Leg>, EngineError> {
        let query = format!(
            "{{ pools(first: {POOLS_PER_VENUE}, orderBy: totalValueLockedUSD, orderDirection: desc) \
             {{ id feeTier totalValueLockedUSD token0 {{ id }} token1 {{ id }} }} }}"
        );
        let pools: UniV3Pools = post_query(&self.client, &self.subgraph, &query)
            .await
            .map_err(|e| EngineError::DiscoveryUnavailable {
                chain: chain.to_string(),
                dex: DexKind::UniV3.to_string(),
                reason: format!("{e:#}"),
            })?;
        Ok(build_univ3_legs(
            &pools.pools,
            chain,
            self.router,
            registry,
            limits,
        ))
    }
}

/// Flatten v3 pools into directed legs, one per trade direction. Pools that
/// fail address or fee parsing are skipped, not fatal.
pub fn build_univ3_legs(
    pools: &[UniV3Pool],
    chain: &str,
    router: Address,
    registry: &TokenRegistry,
    limits: &LimitsConfig,
) -> Vec<Leg> {
    let mut legs = Vec::new();
    for pool in pools {
        let tvl_usd: f64 = match pool.tvl_usd.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        if tvl_usd < limits.min_tvl_usd {
            continue;
        }
        let (Ok(pool_addr), Ok(token0), Ok(token1), Ok(fee_tier)) = (
            pool.id.parse::<Address>(),
            pool.token0.id.parse::<Address>(),
            pool.token1.id.parse::<Address>(),
            pool.fee_tier.parse::<u32>(),
        ) else {
            warn!("skipping malformed v3 pool record {}", pool.id);
            continue;
        };
        let exotic = registry.is_exotic(&token0) || registry.is_exotic(&token1);
        if exotic && limits.deny_exotic {
            continue;
        }
        for (token_in, token_out) in [(token0, token1), (token1, token0)] {
            legs.push(Leg {
                chain: chain.to_string(),
                dex: DexKind::UniV3,
                pool: pool_addr,
                target: router,
                token_in,
                token_out,
                pricing: LegPricing::UniV3 { fee_tier },
                tvl_usd,
                exotic,
            });
        }
    }
    legs
}

// ── Curve ────────────────────────────────────────────────────────────

pub struct CurveDiscovery {
    client: reqwest::Client,
    subgraph: String,
}

impl CurveDiscovery {
    pub fn new(client: reqwest::Client, subgraph: String) -> Self {
        Self { client, subgraph }
    }
}

#[async_trait]
impl PoolDiscovery for CurveDiscovery {
    fn dex(&self) -> DexKind {
        DexKind::Curve
    }

    async fn fetch_legs(
        &self,
        chain: &str,
        registry: &TokenRegistry,
        limits: &LimitsConfig,
    ) -> Result<Vec<Leg>, EngineError> {
        let query = format!(
            "{{ pools(first: {POOLS_PER_VENUE}, orderBy: totalValueLockedUSD, orderDirection: desc) \
             {{ id totalValueLockedUSD coins {{ address index }} }} }}"
        );
        let pools: CurvePools = post_query(&self.client, &self.subgraph, &query)
            .await
            .map_err(|e| EngineError::DiscoveryUnavailable {
                chain: chain.to_string(),
                dex: DexKind::Curve.to_string(),
                reason: format!("{e:#}"),
            })?;
        Ok(build_curve_legs(&pools.pools, chain, registry, limits))
    }
}

/// Flatten Curve pools into directed legs, one per ordered coin pair. The
/// pool itself is the call target; the hop data carries the coin indices.
pub fn build_curve_legs(
    pools: &[CurvePool],
    chain: &str,
    registry: &TokenRegistry,
    limits: &LimitsConfig,
) -> Vec<Leg> {
    let mut legs = Vec::new();
    for pool in pools {
        let tvl_usd: f64 = match pool.tvl_usd.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        if tvl_usd < limits.min_tvl_usd {
            continue;
        }
        let Ok(pool_addr) = pool.id.parse::<Address>() else {
            warn!("skipping malformed curve pool record {}", pool.id);
            continue;
        };
        let mut coins = Vec::with_capacity(pool.coins.len());
        for coin in &pool.coins {
            let (Ok(addr), Ok(index)) = (coin.address.parse::<Address>(), coin.index.parse::<i128>())
            else {
                continue;
            };
            coins.push((addr, index));
        }
        for &(token_in, i) in &coins {
            for &(token_out, j) in &coins {
                if token_in == token_out {
                    continue;
                }
                let exotic = registry.is_exotic(&token_in) || registry.is_exotic(&token_out);
                if exotic && limits.deny_exotic {
                    continue;
                }
                legs.push(Leg {
                    chain: chain.to_string(),
                    dex: DexKind::Curve,
                    pool: pool_addr,
                    target: pool_addr,
                    token_in,
                    token_out,
                    // the pools query does not expose metapool membership, so
                    // every leg quotes through get_dy; set `underlying` from
                    // pool metadata if metapools are ever admitted here
                    pricing: LegPricing::Curve {
                        i,
                        j,
                        underlying: false,
                    },
                    tvl_usd,
                    exotic,
                });
            }
        }
    }
    legs
}

// ── Refresh driver ───────────────────────────────────────────────────

/// Build the discovery set a chain's config enables.
pub fn discoveries_for(chain_cfg: &ChainConfig) -> Vec<Box<dyn PoolDiscovery>> {
    let client = reqwest::Client::new();
    let mut out: Vec<Box<dyn PoolDiscovery>> = Vec::new();
    if let Some(univ3) = &chain_cfg.univ3 {
        match univ3.router.parse() {
            Ok(router) => out.push(Box::new(UniV3Discovery::new(
                client.clone(),
                univ3.subgraph.clone(),
                router,
            ))),
            // unreachable after BotConfig::validate
            Err(e) => warn!("univ3 disabled, bad router address: {e}"),
        }
    }
    if let Some(curve) = &chain_cfg.curve {
        out.push(Box::new(CurveDiscovery::new(
            client.clone(),
            curve.subgraph.clone(),
        )));
    }
    out
}

/// Refresh every venue's catalog entry for one chain. A venue that fails
/// keeps its previous snapshot; newly seen pools get a watcher.
pub async fn refresh_catalog(
    chain: &str,
    discoveries: &[Box<dyn PoolDiscovery>],
    registry: &TokenRegistry,
    limits: &LimitsConfig,
    cache: &Arc<PoolCache>,
    feed: Option<&EventFeed>,
) {
    for discovery in discoveries {
        match discovery.fetch_legs(chain, registry, limits).await {
            Ok(legs) => {
                info!(
                    "🔎 discovered {} legs for {}/{}",
                    legs.len(),
                    chain,
                    discovery.dex()
                );
                if let Some(feed) = feed {
                    for leg in &legs {
                        feed.watch_pool(chain.to_string(), leg.dex, leg.pool);
                    }
                }
                cache.put(chain.to_string(), discovery.dex(), legs);
            }
            Err(e) => {
                warn!("discovery failed, serving stale catalog: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TokenMeta, TokenRegistry};
    use std::collections::HashMap;

    const UNIV3_BODY: &str = r#"{
        "data": { "pools": [
            {
                "id": "0x1111111111111111111111111111111111111111",
                "feeTier": "500",
                "totalValueLockedUSD": "2500000.5",
                "token0": { "id": "0x000000000000000000000000000000000000000a" },
                "token1": { "id": "0x000000000000000000000000000000000000000b" }
            },
            {
                "id": "0x2222222222222222222222222222222222222222",
                "feeTier": "3000",
                "totalValueLockedUSD": "50000",
                "token0": { "id": "0x000000000000000000000000000000000000000a" },
                "token1": { "id": "0x000000000000000000000000000000000000000b" }
            }
        ]}
    }"#;

    const CURVE_BODY: &str = r#"{
        "data": { "pools": [
            {
                "id": "0x3333333333333333333333333333333333333333",
                "totalValueLockedUSD": "9000000",
                "coins": [
                    { "address": "0x000000000000000000000000000000000000000a", "index": "0" },
                    { "address": "0x000000000000000000000000000000000000000b", "index": "1" },
                    { "address": "0x000000000000000000000000000000000000000c", "index": "2" }
                ]
            }
        ]}
    }"#;

    fn registry_with(tokens: &[&str]) -> TokenRegistry {
        let mut by_address = HashMap::new();
        for (n, t) in tokens.iter().enumerate() {
            let address: Address = t.parse().unwrap();
            by_address.insert(
                address,
                TokenMeta {
                    symbol: format!("T{n}"),
                    address,
                    decimals: 18,
                    price_usd: 1.0,
                    exotic: false,
                },
            );
        }
        TokenRegistry::from_tokens(by_address)
    }

    fn limits() -> LimitsConfig {
        LimitsConfig {
            min_tvl_usd: 100_000.0,
            max_hops: 3,
            deny_exotic: true,
        }
    }

    #[test]
    fn univ3_pools_flatten_into_both_directions() {
        let parsed: GraphResponse<UniV3Pools> = serde_json::from_str(UNIV3_BODY).unwrap();
        let pools = parsed.data.unwrap().pools;
        let registry = registry_with(&[
            "0x000000000000000000000000000000000000000a",
            "0x000000000000000000000000000000000000000b",
        ]);
        let router: Address = "0x00000000000000000000000000000000000000ff".parse().unwrap();
        let legs = build_univ3_legs(&pools, "base", router, &registry, &limits());

        // second pool is below the TVL floor; the first yields two directions
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].token_in, legs[1].token_out);
        assert_eq!(legs[0].target, router);
        assert!(matches!(legs[0].pricing, LegPricing::UniV3 { fee_tier: 500 }));
        assert_eq!(legs[0].tvl_usd, 2_500_000.5);
    }

    #[test]
    fn unknown_tokens_are_exotic_and_denied() {
        let parsed: GraphResponse<UniV3Pools> = serde_json::from_str(UNIV3_BODY).unwrap();
        let pools = parsed.data.unwrap().pools;
        // registry only knows token A, so token B makes the pool exotic
        let registry = registry_with(&["0x000000000000000000000000000000000000000a"]);
        let router = Address::ZERO;

        let denied = build_univ3_legs(&pools, "base", router, &registry, &limits());
        assert!(denied.is_empty());

        let mut permissive = limits();
        permissive.deny_exotic = false;
        let allowed = build_univ3_legs(&pools, "base", router, &registry, &permissive);
        assert_eq!(allowed.len(), 2);
        assert!(allowed.iter().all(|l| l.exotic));
    }

    #[test]
    fn curve_pools_flatten_into_ordered_coin_pairs() {
        let parsed: GraphResponse<CurvePools> = serde_json::from_str(CURVE_BODY).unwrap();
        let pools = parsed.data.unwrap().pools;
        let registry = registry_with(&[
            "0x000000000000000000000000000000000000000a",
            "0x000000000000000000000000000000000000000b",
            "0x000000000000000000000000000000000000000c",
        ]);
        let legs = build_curve_legs(&pools, "base", &registry, &limits());

        // 3 coins -> 6 ordered pairs
        assert_eq!(legs.len(), 6);
        let ab = legs
            .iter()
            .find(|l| {
                l.token_in
                    == "0x000000000000000000000000000000000000000a"
                        .parse::<Address>()
                        .unwrap()
                    && l.token_out
                        == "0x000000000000000000000000000000000000000b"
                            .parse::<Address>()
                            .unwrap()
            })
            .unwrap();
        assert!(matches!(
            ab.pricing,
            LegPricing::Curve {
                i: 0,
                j: 1,
                underlying: false
            }
        ));
        // curve legs call the pool directly
        assert_eq!(ab.target, ab.pool);
    }
}
