//! Multi-hop DEX arbitrage route engine
//!
//! Discovers swap legs across UniswapV3 and Curve, enumerates 2/3-leg
//! routes, quotes and scores them in USD, and drives profitable attempts
//! through simulation, private-relay-first submission, and replace-by-fee
//! tracking.

pub mod catalog;
pub mod config;
pub mod contracts;
pub mod discovery;
pub mod errors;
pub mod execution;
pub mod quotes;
pub mod routing;
pub mod types;

// Re-export commonly used types
pub use catalog::{CatalogSnapshot, PoolCache};
pub use config::{BotConfig, TokenRegistry};
pub use errors::EngineError;
pub use execution::{ExecutionAttempt, ExecutionCoordinator};
pub use quotes::QuoteResolver;
pub use routing::RouteGenerator;
pub use types::{DexKind, Leg, Route, RouteQuote, ScoredRoute};
