//! Uniswap v3 quoting via QuoterV2

use crate::contracts::IQuoterV2;
use crate::quotes::LegQuoter;
use crate::types::{DexKind, Leg, LegPricing};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::DynProvider;
use anyhow::{bail, Result};
use async_trait::async_trait;

/// Encode a v3 swap path: token (20 bytes), then fee (3 bytes, big endian,
/// in pips) and next token per hop. Fee tiers come straight from the
/// subgraph already denominated in pips (500, 3000, 10000).
pub fn encode_path(tokens: &[Address], fee_tiers: &[u32]) -> Result<Bytes> {
    if tokens.len() != fee_tiers.len() + 1 {
        bail!(
            "path needs {} tokens for {} fees, got {}",
            fee_tiers.len() + 1,
            fee_tiers.len(),
            tokens.len()
        );
    }
    let mut path = Vec::with_capacity(tokens.len() * 20 + fee_tiers.len() * 3);
    path.extend_from_slice(tokens[0].as_slice());
    for (fee, token) in fee_tiers.iter().zip(&tokens[1..]) {
        path.extend_from_slice(&fee.to_be_bytes()[1..]);
        path.extend_from_slice(token.as_slice());
    }
    Ok(Bytes::from(path))
}

pub struct UniV3Quoter {
    quoter: Address,
    provider: DynProvider,
}

impl UniV3Quoter {
    pub fn new(quoter: Address, provider: DynProvider) -> Self {
        Self { quoter, provider }
    }
}

#[async_trait]
impl LegQuoter for UniV3Quoter {
    fn dex(&self) -> DexKind {
        DexKind::UniV3
    }

    async fn quote(&self, leg: &Leg, amount_in: U256) -> Result<U256> {
        let LegPricing::UniV3 { fee_tier } = leg.pricing else {
            bail!("leg {:#x} has non-v3 pricing", leg.pool);
        };
        let path = encode_path(&[leg.token_in, leg.token_out], &[fee_tier])?;
        let quoter = IQuoterV2::new(self.quoter, self.provider.clone());
        let out = quoter.quoteExactInput(path, amount_in).call().await?;
        Ok(out.amountOut)
    }
}
