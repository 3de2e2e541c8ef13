//! Failure taxonomy for the route engine
//!
//! Per-route and per-leg failures are isolated: the scan cycle drops the
//! affected route and continues. Only configuration errors are fatal at
//! process start.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Discovery collaborator failed; the cycle proceeds with the stale cache.
    #[error("discovery unavailable for {chain}/{dex}: {reason}")]
    DiscoveryUnavailable {
        chain: String,
        dex: String,
        reason: String,
    },

    /// A leg's pricing call errored, reverted, or returned zero liquidity.
    /// Routes quote atomically, so the whole route is dropped.
    #[error("quote unavailable for route [{route}]: {reason}")]
    QuoteUnavailable { route: String, reason: String },

    /// Read-only simulation of the encoded transaction reverted; the attempt
    /// is aborted before any broadcast.
    #[error("simulation reverted for route [{route}]: {reason}")]
    SimulationReverted { route: String, reason: String },

    /// Both the private and the public submission path failed.
    #[error("submission failed for route [{route}]: {reason}")]
    SubmissionFailed { route: String, reason: String },

    /// Replace-by-fee bump count or gas ceiling exhausted.
    #[error("replacement exhausted for route [{route}] after {bumps} bumps")]
    ReplacementExhausted { route: String, bumps: u32 },

    /// Catalog refresh is overdue; stale data is still served but the caller
    /// is flagged as degraded.
    #[error("catalog stale for {overdue_secs}s past refresh interval")]
    StaleCacheExpired { overdue_secs: u64 },

    /// Invalid configuration (no chains, bad addresses, selector mismatch).
    /// Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_surface_the_route_concerned() {
        let err = EngineError::SimulationReverted {
            route: "uni_v3:0xabc -> curve:0xdef".to_string(),
            reason: "execution reverted".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("uni_v3:0xabc -> curve:0xdef"));
        assert!(msg.contains("execution reverted"));
    }
}
