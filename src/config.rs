//! Configuration management
//!
//! Loads chain endpoints, strategy limits, and the token registry from a
//! TOML file. String values of the form `${VAR}` are resolved from the
//! environment (after `.env` is loaded), so RPC URLs and keys stay out of
//! the config file.

use crate::errors::EngineError;
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub chains: BTreeMap<String, ChainConfig>,
    pub strategy: StrategyConfig,
}

/// Per-chain endpoints and token registry
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    pub ws_url: Option<String>,
    /// Private relay endpoint (eth_sendPrivateTransaction). Public-only when unset.
    pub private_tx_rpc: Option<String>,
    /// Deployed settlement contract
    pub executor: String,
    /// USD price of the chain's native asset, for gas-cost conversion
    pub native_price_usd: f64,
    pub univ3: Option<UniV3Config>,
    pub curve: Option<CurveConfig>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UniV3Config {
    pub subgraph: String,
    pub router: String,
    pub quoter_v2: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurveConfig {
    pub subgraph: String,
}

/// One entry of the stable-reference token table
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
    /// Stablecoins default to $1; others (WETH etc.) need an explicit price.
    #[serde(default = "default_price_usd")]
    pub price_usd: f64,
    /// Fee-on-transfer / rebasing tokens the strategy may deny
    #[serde(default)]
    pub exotic: bool,
}

fn default_price_usd() -> f64 {
    1.0
}

/// Strategy parameters
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub limits: LimitsConfig,
    /// Trade-size sweep per candidate route, in USD
    pub sizes_usd: Vec<f64>,
    pub profit: ProfitConfig,
    pub flashloan: FlashloanConfig,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates_per_cycle: usize,
}

fn default_refresh_interval() -> u64 {
    300
}
fn default_scan_interval() -> u64 {
    3_000
}
fn default_max_candidates() -> usize {
    200
}

/// Pre-quote route filters
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_min_tvl")]
    pub min_tvl_usd: f64,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_true")]
    pub deny_exotic: bool,
}

fn default_min_tvl() -> f64 {
    100_000.0
}
fn default_max_hops() -> usize {
    3
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ProfitConfig {
    #[serde(default = "default_profit_floor")]
    pub profit_floor_usd: f64,
    /// Per-leg slippage allowance in basis points, compounded across hops
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps_per_leg: u32,
}

fn default_profit_floor() -> f64 {
    0.01
}
fn default_slippage_bps() -> u32 {
    30
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FlashloanConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Proportional borrow fee, e.g. 0.0009 for Aave V3
    #[serde(default)]
    pub fee_pct: f64,
}

/// Submission / replacement tuning
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// How long a submission may sit unconfirmed before a fee bump
    #[serde(default = "default_replace_after")]
    pub replace_after_ms: u64,
    #[serde(default = "default_max_bumps")]
    pub max_bumps: u32,
    /// Gas price bump per replacement, in basis points
    #[serde(default = "default_bump_bps")]
    pub bump_bps: u32,
    #[serde(default = "default_gas_ceiling")]
    pub gas_ceiling_gwei: u64,
    #[serde(default = "default_private_timeout")]
    pub private_timeout_ms: u64,
    /// Submit a zero-value self-transfer to clear the nonce when an in-flight
    /// attempt is cancelled on shutdown
    #[serde(default)]
    pub clear_nonce_on_shutdown: bool,
}

fn default_gas_limit() -> u64 {
    600_000
}
fn default_deadline_secs() -> u64 {
    300
}
fn default_poll_interval() -> u64 {
    2_000
}
fn default_replace_after() -> u64 {
    30_000
}
fn default_max_bumps() -> u32 {
    3
}
fn default_bump_bps() -> u32 {
    1_250
}
fn default_gas_ceiling() -> u64 {
    500
}
fn default_private_timeout() -> u64 {
    10_000
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            deadline_secs: default_deadline_secs(),
            poll_interval_ms: default_poll_interval(),
            replace_after_ms: default_replace_after(),
            max_bumps: default_max_bumps(),
            bump_bps: default_bump_bps(),
            gas_ceiling_gwei: default_gas_ceiling(),
            private_timeout_ms: default_private_timeout(),
            clear_nonce_on_shutdown: false,
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file, resolving `${ENV}` references.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        dotenv::dotenv().ok();

        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut value: toml::Value =
            toml::from_str(content).context("Failed to parse TOML configuration")?;
        resolve_env(&mut value);

        let config: Self = value
            .try_into()
            .context("Invalid configuration structure")?;
        config.validate()?;
        Ok(config)
    }

    /// Startup validation. Misconfiguration is fatal; per-route failures are not.
    fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(EngineError::Config("no chains configured".to_string()).into());
        }
        for (name, chain) in &self.chains {
            Address::from_str(&chain.executor).map_err(|e| {
                EngineError::Config(format!("chain {name}: bad executor address: {e}"))
            })?;
            if let Some(univ3) = &chain.univ3 {
                Address::from_str(&univ3.router).map_err(|e| {
                    EngineError::Config(format!("chain {name}: bad univ3 router address: {e}"))
                })?;
                Address::from_str(&univ3.quoter_v2).map_err(|e| {
                    EngineError::Config(format!("chain {name}: bad univ3 quoter address: {e}"))
                })?;
            }
            if chain.univ3.is_none() && chain.curve.is_none() {
                return Err(EngineError::Config(format!(
                    "chain {name}: no dex endpoints configured"
                ))
                .into());
            }
            for token in &chain.tokens {
                Address::from_str(&token.address).map_err(|e| {
                    EngineError::Config(format!(
                        "chain {name}: token {}: bad address: {e}",
                        token.symbol
                    ))
                })?;
            }
        }
        if self.strategy.sizes_usd.is_empty() {
            return Err(EngineError::Config("strategy.sizes_usd is empty".to_string()).into());
        }
        Ok(())
    }
}

/// Recursively substitute `${VAR}` strings from the environment.
/// Unset variables resolve to the empty string.
fn resolve_env(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => {
            if let Some(name) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
                *s = std::env::var(name).unwrap_or_default();
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                resolve_env(v);
            }
        }
        toml::Value::Array(items) => {
            for v in items.iter_mut() {
                resolve_env(v);
            }
        }
        _ => {}
    }
}

/// Metadata for one registered token
#[derive(Debug, Clone)]
pub struct TokenMeta {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    pub price_usd: f64,
    pub exotic: bool,
}

/// Stable-reference pricing table for one chain.
///
/// All USD-denominated quantities in the engine go through this registry;
/// tokens absent from it cannot be priced and are treated as exotic.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    by_address: HashMap<Address, TokenMeta>,
}

impl TokenRegistry {
    pub fn from_chain(chain: &ChainConfig) -> Result<Self> {
        let mut by_address = HashMap::new();
        for token in &chain.tokens {
            let address = Address::from_str(&token.address)
                .with_context(|| format!("token {}: bad address", token.symbol))?;
            by_address.insert(
                address,
                TokenMeta {
                    symbol: token.symbol.clone(),
                    address,
                    decimals: token.decimals,
                    price_usd: token.price_usd,
                    exotic: token.exotic,
                },
            );
        }
        Ok(Self { by_address })
    }

    pub fn from_tokens(by_address: HashMap<Address, TokenMeta>) -> Self {
        Self { by_address }
    }

    pub fn get(&self, address: &Address) -> Option<&TokenMeta> {
        self.by_address.get(address)
    }

    /// Unknown tokens are exotic: we cannot price them or vouch for their
    /// transfer semantics.
    pub fn is_exotic(&self, address: &Address) -> bool {
        self.by_address.get(address).map(|m| m.exotic).unwrap_or(true)
    }

    /// USD value of `amount` smallest units of `token`, or None if unpriced.
    pub fn usd_value(&self, token: &Address, amount: U256) -> Option<f64> {
        let meta = self.by_address.get(token)?;
        let units = u128::try_from(amount).unwrap_or(u128::MAX) as f64;
        Some(units / 10f64.powi(meta.decimals as i32) * meta.price_usd)
    }

    /// Smallest-unit amount worth `usd` of `token`, rounded down.
    pub fn amount_from_usd(&self, token: &Address, usd: f64) -> Option<U256> {
        let meta = self.by_address.get(token)?;
        if meta.price_usd <= 0.0 || usd < 0.0 {
            return None;
        }
        let units = usd / meta.price_usd * 10f64.powi(meta.decimals as i32);
        Some(U256::from(units as u128))
    }

    pub fn address_of(&self, symbol: &str) -> Option<Address> {
        self.by_address
            .values()
            .find(|m| m.symbol == symbol)
            .map(|m| m.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[chains.base]
chain_id = 8453
rpc_url = "https://mainnet.base.org"
executor = "0x1111111111111111111111111111111111111111"
native_price_usd = 3300.0

[chains.base.univ3]
subgraph = "https://example.com/subgraph"
router = "0x2222222222222222222222222222222222222222"
quoter_v2 = "0x3333333333333333333333333333333333333333"

[[chains.base.tokens]]
symbol = "USDC"
address = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
decimals = 6

[[chains.base.tokens]]
symbol = "WETH"
address = "0x4200000000000000000000000000000000000006"
decimals = 18
price_usd = 3300.0

[strategy]
sizes_usd = [1000.0, 5000.0]

[strategy.limits]
min_tvl_usd = 100000.0
max_hops = 3
deny_exotic = true

[strategy.profit]
profit_floor_usd = 0.01
slippage_bps_per_leg = 30

[strategy.flashloan]
enabled = true
fee_pct = 0.0009
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = BotConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.chains.len(), 1);
        let base = &config.chains["base"];
        assert_eq!(base.chain_id, 8453);
        assert!(base.univ3.is_some());
        assert_eq!(config.strategy.limits.max_hops, 3);
        assert_eq!(config.strategy.execution.max_bumps, 3);
        assert!(config.strategy.flashloan.enabled);
    }

    #[test]
    fn test_no_chains_is_fatal() {
        let result = BotConfig::from_toml("[chains]\n[strategy]\nsizes_usd = [1000.0]\n[strategy.limits]\n[strategy.profit]\n[strategy.flashloan]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_resolution() {
        std::env::set_var("ARBROUTE_TEST_RPC", "wss://resolved.example");
        let toml = SAMPLE.replace("https://mainnet.base.org", "${ARBROUTE_TEST_RPC}");
        let config = BotConfig::from_toml(&toml).unwrap();
        assert_eq!(config.chains["base"].rpc_url, "wss://resolved.example");
    }

    #[test]
    fn test_registry_usd_conversions() {
        let config = BotConfig::from_toml(SAMPLE).unwrap();
        let registry = TokenRegistry::from_chain(&config.chains["base"]).unwrap();
        let usdc = registry.address_of("USDC").unwrap();

        // $1000 of USDC (6 decimals)
        let amount = registry.amount_from_usd(&usdc, 1000.0).unwrap();
        assert_eq!(amount, U256::from(1_000_000_000u64));
        let usd = registry.usd_value(&usdc, amount).unwrap();
        assert!((usd - 1000.0).abs() < 1e-9);

        // WETH at a configured non-stable price
        let weth = registry.address_of("WETH").unwrap();
        let one_eth = U256::from(10u128.pow(18));
        assert!((registry.usd_value(&weth, one_eth).unwrap() - 3300.0).abs() < 1e-6);

        // unknown tokens are unpriced and exotic
        let unknown = Address::repeat_byte(0x77);
        assert!(registry.usd_value(&unknown, one_eth).is_none());
        assert!(registry.is_exotic(&unknown));
    }
}
