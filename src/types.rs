//! Core data structures for the route engine
//!
//! Legs are directed swap edges produced by discovery; routes chain 2 or 3
//! legs; quotes and scored routes are the per-cycle value objects flowing
//! from the resolver to the execution coordinator.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// DEX kinds we route through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DexKind {
    UniV3,
    Curve,
}

impl DexKind {
    /// Settlement-contract hop discriminant (1=UniV3, 2=Curve)
    pub fn dex_id(&self) -> u8 {
        match self {
            DexKind::UniV3 => 1,
            DexKind::Curve => 2,
        }
    }
}

impl fmt::Display for DexKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DexKind::UniV3 => write!(f, "uni_v3"),
            DexKind::Curve => write!(f, "curve"),
        }
    }
}

/// How a leg is priced on its DEX
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegPricing {
    /// Uniswap V3: fee tier in pips (500, 3000, 10000)
    UniV3 { fee_tier: u32 },
    /// Curve: coin indices into the pool, `underlying` for meta pools
    Curve { i: i128, j: i128, underlying: bool },
}

/// One directed swap edge through a specific pool.
///
/// Immutable once produced by discovery. Identity is
/// `(chain, dex, pool, token_in, token_out)`; `target` is the router or pool
/// address the settlement contract calls for this hop (router for UniV3,
/// the pool itself for Curve).
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub chain: String,
    pub dex: DexKind,
    pub pool: Address,
    pub target: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub pricing: LegPricing,
    pub tvl_usd: f64,
    pub exotic: bool,
}

/// An ordered chain of 2 or 3 legs representing one atomic arbitrage attempt.
///
/// Construction enforces the chaining invariant
/// (`leg[i].token_out == leg[i+1].token_in`, all legs on one chain).
/// 3-leg routes additionally close the cycle back to the input token;
/// 2-leg routes do not have to (see `routing::generator`).
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    legs: Vec<Leg>,
}

impl Route {
    pub fn new(legs: Vec<Leg>) -> Option<Self> {
        if legs.len() < 2 || legs.len() > 3 {
            return None;
        }
        // no-op self-loop legs never belong in a route
        if legs.iter().any(|l| l.token_in == l.token_out) {
            return None;
        }
        for pair in legs.windows(2) {
            if pair[0].token_out != pair[1].token_in || pair[0].chain != pair[1].chain {
                return None;
            }
        }
        if legs.len() == 3 && legs[2].token_out != legs[0].token_in {
            return None;
        }
        Some(Self { legs })
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn hops(&self) -> usize {
        self.legs.len()
    }

    pub fn chain(&self) -> &str {
        &self.legs[0].chain
    }

    pub fn input_token(&self) -> Address {
        self.legs[0].token_in
    }

    pub fn output_token(&self) -> Address {
        self.legs[self.legs.len() - 1].token_out
    }

    /// Compact description for logs: "uni_v3:0x1234... -> curve:0x5678..."
    pub fn describe(&self) -> String {
        self.legs
            .iter()
            .map(|l| format!("{}:{:#x}", l.dex, l.pool))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Realized output of a route at a given input size.
///
/// Amounts are in each token's native smallest units; USD values come from
/// the stable-reference token registry and are computed before any
/// calldata-scale conversion.
#[derive(Debug, Clone)]
pub struct RouteQuote {
    pub route: Route,
    pub amount_in: U256,
    pub amount_out: U256,
    pub amount_in_usd: f64,
    pub amount_out_usd: f64,
}

/// A quoted route with costs applied
#[derive(Debug, Clone)]
pub struct ScoredRoute {
    pub quote: RouteQuote,
    pub gas_cost_usd: f64,
    pub flash_fee_usd: f64,
    pub profit_usd: f64,
    pub required_profit_usd: f64,
}

impl ScoredRoute {
    /// Strict inequality: a break-even route is not worth racing for under
    /// measurement noise.
    pub fn actionable(&self) -> bool {
        self.profit_usd > self.required_profit_usd
    }
}
