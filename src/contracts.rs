//! Centralized contract definitions
//!
//! All Solidity interfaces used by the engine, defined with alloy's `sol!`
//! macro. The settlement contract ABI must stay bit-exact with the deployed
//! ArbExecutor: `verify_selectors()` re-derives every selector from the
//! canonical signature at startup so a drifted definition can never reach
//! broadcast.

use crate::errors::EngineError;
use alloy::primitives::keccak256;
use alloy::sol;
use alloy::sol_types::SolCall;
use once_cell::sync::Lazy;

// ── ArbExecutor (atomic settlement contract) ─────────────────────────

sol! {
    #[sol(rpc)]
    interface IArbExecutor {
        /// One swap hop: dexId 1=UniV3, 2=Curve; `data` is per-hop opaque
        /// call data (UniV3 packed path, Curve coin indices).
        struct Hop {
            uint8 dexId;
            address target;
            bytes data;
            address tokenIn;
            address tokenOut;
        }

        struct Route {
            Hop[] hops;
            address inputToken;
            address outputToken;
        }

        function execute(Route calldata route, uint256 amountIn, uint256 minReturn, uint256 deadline) external returns (uint256 amountOut);
        function executeWithFlashloan(Route calldata route, uint256 amountIn, uint256 minReturn, uint256 deadline, uint256 flashloanAmount) external;
    }
}

// ── Uniswap V3 QuoterV2 ──────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IQuoterV2 {
        function quoteExactInput(bytes memory path, uint256 amountIn) external returns (uint256 amountOut, uint160[] memory sqrtPriceX96AfterList, uint32[] memory initializedTicksCrossedList, uint256 gasEstimate);
    }
}

// ── Curve pools ──────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface ICurvePool {
        function get_dy(int128 i, int128 j, uint256 dx) external view returns (uint256 dy);
        function get_dy_underlying(int128 i, int128 j, uint256 dx) external view returns (uint256 dy);
    }
}

/// Canonical signatures the deployed contracts answer to, paired with the
/// macro-derived selector they must hash to.
static KNOWN_SELECTORS: Lazy<Vec<(&'static str, [u8; 4])>> = Lazy::new(|| {
    vec![
        (
            "execute(((uint8,address,bytes,address,address)[],address,address),uint256,uint256,uint256)",
            IArbExecutor::executeCall::SELECTOR,
        ),
        (
            "executeWithFlashloan(((uint8,address,bytes,address,address)[],address,address),uint256,uint256,uint256,uint256)",
            IArbExecutor::executeWithFlashloanCall::SELECTOR,
        ),
        (
            "quoteExactInput(bytes,uint256)",
            IQuoterV2::quoteExactInputCall::SELECTOR,
        ),
        ("get_dy(int128,int128,uint256)", ICurvePool::get_dyCall::SELECTOR),
        (
            "get_dy_underlying(int128,int128,uint256)",
            ICurvePool::get_dy_underlyingCall::SELECTOR,
        ),
    ]
});

/// Startup check: every selector we will put on the wire must equal
/// `keccak256(canonical_signature)[..4]`. A mismatch means the `sol!`
/// definitions no longer match the deployed ABI and is fatal.
pub fn verify_selectors() -> Result<(), EngineError> {
    for (signature, selector) in KNOWN_SELECTORS.iter() {
        let expected = &keccak256(signature.as_bytes())[..4];
        if expected != selector {
            return Err(EngineError::Config(format!(
                "selector mismatch for {signature}: derived {selector:02x?}, keccak gives {expected:02x?}"
            )));
        }
    }
    Ok(())
}
