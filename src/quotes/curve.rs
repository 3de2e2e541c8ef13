//! Curve quoting via get_dy / get_dy_underlying

use crate::contracts::ICurvePool;
use crate::quotes::LegQuoter;
use crate::types::{DexKind, Leg, LegPricing};
use alloy::primitives::U256;
use alloy::providers::DynProvider;
use anyhow::{bail, Result};
use async_trait::async_trait;

pub struct CurveQuoter {
    provider: DynProvider,
}

impl CurveQuoter {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl LegQuoter for CurveQuoter {
    fn dex(&self) -> DexKind {
        DexKind::Curve
    }

    async fn quote(&self, leg: &Leg, amount_in: U256) -> Result<U256> {
        let LegPricing::Curve { i, j, underlying } = leg.pricing else {
            bail!("leg {:#x} has non-curve pricing", leg.pool);
        };
        let pool = ICurvePool::new(leg.pool, self.provider.clone());
        // meta pools quote through the underlying coins
        let dy = if underlying {
            pool.get_dy_underlying(i, j, amount_in).call().await?
        } else {
            pool.get_dy(i, j, amount_in).call().await?
        };
        Ok(dy)
    }
}
