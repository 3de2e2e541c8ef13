//! Settlement-contract calldata
//!
//! Maps an in-memory route onto the ArbExecutor's Hop/Route tuples and
//! encodes the `execute` / `executeWithFlashloan` call. Per-hop `data` is
//! venue-specific: the packed v3 path for Uniswap hops, abi-encoded coin
//! indices for Curve hops.

use crate::contracts::IArbExecutor;
use crate::quotes::encode_path;
use crate::types::{LegPricing, Route};
use alloy::primitives::{Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};
use anyhow::Result;

const BPS_DENOMINATOR: u64 = 10_000;

/// Map a route onto the executor's tuple layout.
pub fn encode_route(route: &Route) -> Result<IArbExecutor::Route> {
    let mut hops = Vec::with_capacity(route.hops());
    for leg in route.legs() {
        let data = match leg.pricing {
            LegPricing::UniV3 { fee_tier } => {
                encode_path(&[leg.token_in, leg.token_out], &[fee_tier])?
            }
            LegPricing::Curve { i, j, underlying } => {
                Bytes::from((i, j, underlying).abi_encode())
            }
        };
        hops.push(IArbExecutor::Hop {
            dexId: leg.dex.dex_id(),
            target: leg.target,
            data,
            tokenIn: leg.token_in,
            tokenOut: leg.token_out,
        });
    }
    Ok(IArbExecutor::Route {
        hops,
        inputToken: route.input_token(),
        outputToken: route.output_token(),
    })
}

/// Worst acceptable output: the quoted amount with the per-leg slippage
/// allowance compounded once per hop, rounding down at every step so the
/// bound is never optimistic.
pub fn min_return(quoted_out: U256, slippage_bps_per_leg: u32, hops: usize) -> U256 {
    let keep = U256::from(BPS_DENOMINATOR - u64::from(slippage_bps_per_leg).min(BPS_DENOMINATOR));
    let den = U256::from(BPS_DENOMINATOR);
    let mut out = quoted_out;
    for _ in 0..hops {
        out = out * keep / den;
    }
    out
}

/// Full calldata for one attempt. `flashloan_amount` switches to the
/// flashloan entrypoint.
pub fn build_calldata(
    route: &Route,
    amount_in: U256,
    min_return: U256,
    deadline: U256,
    flashloan_amount: Option<U256>,
) -> Result<Bytes> {
    let encoded_route = encode_route(route)?;
    let calldata = match flashloan_amount {
        Some(flashloan_amount) => IArbExecutor::executeWithFlashloanCall {
            route: encoded_route,
            amountIn: amount_in,
            minReturn: min_return,
            deadline,
            flashloanAmount: flashloan_amount,
        }
        .abi_encode(),
        None => IArbExecutor::executeCall {
            route: encoded_route,
            amountIn: amount_in,
            minReturn: min_return,
            deadline,
        }
        .abi_encode(),
    };
    Ok(Bytes::from(calldata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::{test_leg, A, B, C};
    use crate::types::DexKind;
    use alloy::primitives::Address;

    #[test]
    fn calldata_round_trips_through_the_abi() {
        let mut second = test_leg(B, C);
        second.dex = DexKind::Curve;
        second.pricing = LegPricing::Curve {
            i: 1,
            j: 0,
            underlying: false,
        };
        second.target = Address::repeat_byte(0x42);
        let route = Route::new(vec![test_leg(A, B), second]).unwrap();

        let calldata = build_calldata(
            &route,
            U256::from(1_000_000u64),
            U256::from(994_009u64),
            U256::from(1_700_000_000u64),
            None,
        )
        .unwrap();

        assert_eq!(&calldata[..4], IArbExecutor::executeCall::SELECTOR);
        let decoded = IArbExecutor::executeCall::abi_decode(&calldata).unwrap();
        assert_eq!(decoded.amountIn, U256::from(1_000_000u64));
        assert_eq!(decoded.minReturn, U256::from(994_009u64));
        assert_eq!(decoded.route.hops.len(), 2);
        assert_eq!(decoded.route.hops[0].dexId, 1);
        assert_eq!(decoded.route.hops[1].dexId, 2);
        assert_eq!(decoded.route.inputToken, A);
        assert_eq!(decoded.route.outputToken, C);
        // v3 hop data is the 43-byte packed path
        assert_eq!(decoded.route.hops[0].data.len(), 43);
    }

    #[test]
    fn flashloan_amount_switches_entrypoint() {
        let route = Route::new(vec![test_leg(A, B), test_leg(B, C)]).unwrap();
        let calldata = build_calldata(
            &route,
            U256::from(1_000_000u64),
            U256::ZERO,
            U256::ZERO,
            Some(U256::from(1_000_000u64)),
        )
        .unwrap();

        assert_eq!(
            &calldata[..4],
            IArbExecutor::executeWithFlashloanCall::SELECTOR
        );
        let decoded = IArbExecutor::executeWithFlashloanCall::abi_decode(&calldata).unwrap();
        assert_eq!(decoded.flashloanAmount, U256::from(1_000_000u64));
    }

    #[test]
    fn curve_hop_data_carries_the_underlying_flag() {
        let mut meta = test_leg(A, B);
        meta.dex = DexKind::Curve;
        meta.pricing = LegPricing::Curve {
            i: 2,
            j: 0,
            underlying: true,
        };
        meta.target = Address::repeat_byte(0x42);
        let route = Route::new(vec![meta, test_leg(B, C)]).unwrap();

        let encoded = encode_route(&route).unwrap();
        let (i, j, underlying) =
            <(i128, i128, bool)>::abi_decode(&encoded.hops[0].data).unwrap();
        assert_eq!(i, 2);
        assert_eq!(j, 0);
        assert!(underlying);
    }

    #[test]
    fn min_return_compounds_and_rounds_down() {
        // 30 bps per hop over 2 hops: 1_000_000 -> 997_000 -> 994_009 (floor)
        let out = min_return(U256::from(1_000_000u64), 30, 2);
        assert_eq!(out, U256::from(994_009u64));

        // zero slippage passes the quote through
        assert_eq!(
            min_return(U256::from(123_456u64), 0, 3),
            U256::from(123_456u64)
        );
    }
}
