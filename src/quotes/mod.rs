//! Route quoting
//!
//! A route's expected output is resolved leg by leg through on-chain quote
//! contracts, feeding each leg's integer output into the next. Any leg
//! failing, reverting, or returning zero drops the whole route; partial
//! quotes never reach the scorer.

pub mod curve;
pub mod univ3;

pub use curve::CurveQuoter;
pub use univ3::{encode_path, UniV3Quoter};

use crate::config::TokenRegistry;
use crate::errors::EngineError;
use crate::types::{DexKind, Leg, Route, RouteQuote};
use alloy::primitives::U256;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Per-venue pricing seam.
#[async_trait]
pub trait LegQuoter: Send + Sync {
    fn dex(&self) -> DexKind;
    /// Expected output of one leg for `amount_in` of its input token, in the
    /// output token's smallest units.
    async fn quote(&self, leg: &Leg, amount_in: U256) -> Result<U256>;
}

/// Chains per-leg quotes into a route-level quote.
pub struct QuoteResolver {
    quoters: HashMap<DexKind, Box<dyn LegQuoter>>,
    registry: TokenRegistry,
}

impl QuoteResolver {
    pub fn new(quoters: Vec<Box<dyn LegQuoter>>, registry: TokenRegistry) -> Self {
        Self {
            quoters: quoters.into_iter().map(|q| (q.dex(), q)).collect(),
            registry,
        }
    }

    /// Quote the whole route at `amount_in` of the input token.
    pub async fn resolve(&self, route: &Route, amount_in: U256) -> Result<RouteQuote, EngineError> {
        let unavailable = |reason: String| EngineError::QuoteUnavailable {
            route: route.describe(),
            reason,
        };

        let mut amount = amount_in;
        for leg in route.legs() {
            let quoter = self
                .quoters
                .get(&leg.dex)
                .ok_or_else(|| unavailable(format!("no quoter for {}", leg.dex)))?;
            amount = quoter
                .quote(leg, amount)
                .await
                .map_err(|e| unavailable(format!("leg {}:{:#x}: {e:#}", leg.dex, leg.pool)))?;
            if amount.is_zero() {
                return Err(unavailable(format!(
                    "leg {}:{:#x} returned zero output",
                    leg.dex, leg.pool
                )));
            }
        }

        let amount_in_usd = self
            .registry
            .usd_value(&route.input_token(), amount_in)
            .ok_or_else(|| unavailable("unpriced input token".to_string()))?;
        let amount_out_usd = self
            .registry
            .usd_value(&route.output_token(), amount)
            .ok_or_else(|| unavailable("unpriced output token".to_string()))?;

        Ok(RouteQuote {
            route: route.clone(),
            amount_in,
            amount_out: amount,
            amount_in_usd,
            amount_out_usd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenMeta;
    use crate::types::tests::{test_leg, A, B, C};
    use alloy::primitives::Address;

    /// Pays out `num/den` of the input amount regardless of the leg.
    struct RatioQuoter {
        dex: DexKind,
        num: u64,
        den: u64,
    }

    #[async_trait]
    impl LegQuoter for RatioQuoter {
        fn dex(&self) -> DexKind {
            self.dex
        }
        async fn quote(&self, _leg: &Leg, amount_in: U256) -> Result<U256> {
            Ok(amount_in * U256::from(self.num) / U256::from(self.den))
        }
    }

    struct FailingQuoter;

    #[async_trait]
    impl LegQuoter for FailingQuoter {
        fn dex(&self) -> DexKind {
            DexKind::UniV3
        }
        async fn quote(&self, _leg: &Leg, _amount_in: U256) -> Result<U256> {
            anyhow::bail!("execution reverted")
        }
    }

    fn registry() -> TokenRegistry {
        let mut by_address = HashMap::new();
        for (addr, symbol) in [(A, "USDC"), (B, "DAI"), (C, "USDT")] {
            by_address.insert(
                addr,
                TokenMeta {
                    symbol: symbol.to_string(),
                    address: addr,
                    decimals: 6,
                    price_usd: 1.0,
                    exotic: false,
                },
            );
        }
        TokenRegistry::from_tokens(by_address)
    }

    #[tokio::test]
    async fn quotes_chain_leg_outputs() {
        // each leg pays 101%, two legs compound to 102.01%
        let resolver = QuoteResolver::new(
            vec![Box::new(RatioQuoter {
                dex: DexKind::UniV3,
                num: 101,
                den: 100,
            })],
            registry(),
        );
        let route = Route::new(vec![test_leg(A, B), test_leg(B, C)]).unwrap();
        let quote = resolver
            .resolve(&route, U256::from(1_000_000u64))
            .await
            .unwrap();

        assert_eq!(quote.amount_out, U256::from(1_020_100u64));
        assert!((quote.amount_in_usd - 1.0).abs() < 1e-9);
        assert!((quote.amount_out_usd - 1.0201).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failing_leg_drops_whole_route() {
        let resolver = QuoteResolver::new(vec![Box::new(FailingQuoter)], registry());
        let route = Route::new(vec![test_leg(A, B), test_leg(B, C)]).unwrap();
        let err = resolver
            .resolve(&route, U256::from(1_000_000u64))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::QuoteUnavailable { .. }));
        assert!(err.to_string().contains("execution reverted"));
    }

    #[tokio::test]
    async fn zero_output_is_unavailable_not_zero_profit() {
        let resolver = QuoteResolver::new(
            vec![Box::new(RatioQuoter {
                dex: DexKind::UniV3,
                num: 0,
                den: 1,
            })],
            registry(),
        );
        let route = Route::new(vec![test_leg(A, B), test_leg(B, C)]).unwrap();
        let err = resolver
            .resolve(&route, U256::from(1_000_000u64))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("zero output"));
    }

    #[tokio::test]
    async fn unpriced_token_is_unavailable() {
        let resolver = QuoteResolver::new(
            vec![Box::new(RatioQuoter {
                dex: DexKind::UniV3,
                num: 1,
                den: 1,
            })],
            registry(),
        );
        let unknown = Address::repeat_byte(0x99);
        let route = Route::new(vec![test_leg(A, B), test_leg(B, unknown)]).unwrap();
        let err = resolver
            .resolve(&route, U256::from(1_000_000u64))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unpriced output token"));
    }
}
