//! Execution coordinator
//!
//! Drives one attempt through build -> simulate -> submit -> track. The
//! simulation gate runs the exact calldata as a read-only call against the
//! settlement contract; nothing is broadcast if it reverts. Tracking polls
//! for the receipt and replaces the transaction at the same nonce with a
//! strictly higher gas price until confirmation, the deadline, the bump
//! budget, or the gas ceiling ends the attempt. An async mutex keeps at most
//! one submission in flight per chain.

use crate::config::{ExecutionSettings, FlashloanConfig};
use crate::errors::EngineError;
use crate::execution::broadcast::{submit_with_fallback, Broadcaster};
use crate::execution::calldata;
use crate::types::ScoredRoute;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

const GWEI: u128 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Built,
    Simulated,
    Submitted,
    Replaced,
    Confirmed,
    Expired,
    Abandoned,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AttemptState::Built => "built",
            AttemptState::Simulated => "simulated",
            AttemptState::Submitted => "submitted",
            AttemptState::Replaced => "replaced",
            AttemptState::Confirmed => "confirmed",
            AttemptState::Expired => "expired",
            AttemptState::Abandoned => "abandoned",
        };
        write!(f, "{s}")
    }
}

/// One attempt's lifecycle record.
#[derive(Debug, Clone)]
pub struct ExecutionAttempt {
    pub route: String,
    pub calldata: Bytes,
    pub tx_hash: Option<B256>,
    pub gas_price: u128,
    pub nonce: u64,
    pub bumps: u32,
    pub state: AttemptState,
    pub transitions: Vec<AttemptState>,
}

impl ExecutionAttempt {
    fn new(route: String, calldata: Bytes) -> Self {
        Self {
            route,
            calldata,
            tx_hash: None,
            gas_price: 0,
            nonce: 0,
            bumps: 0,
            state: AttemptState::Built,
            transitions: vec![AttemptState::Built],
        }
    }

    fn advance(&mut self, state: AttemptState) {
        self.state = state;
        self.transitions.push(state);
    }
}

/// Read access to the chain, mockable for tests.
#[async_trait]
pub trait ChainView: Send + Sync {
    /// Read-only execution of `data` against `to`. Err means revert.
    async fn simulate(&self, from: Address, to: Address, data: &Bytes) -> Result<Bytes>;
    async fn gas_price(&self) -> Result<u128>;
    async fn next_nonce(&self, address: Address) -> Result<u64>;
    /// Some(true) = confirmed, Some(false) = reverted on-chain, None = pending.
    async fn receipt_status(&self, hash: B256) -> Result<Option<bool>>;
}

pub struct AlloyChainView {
    provider: DynProvider,
}

impl AlloyChainView {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChainView for AlloyChainView {
    async fn simulate(&self, from: Address, to: Address, data: &Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(data.clone());
        Ok(self.provider.call(tx).await?)
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn next_nonce(&self, address: Address) -> Result<u64> {
        Ok(self.provider.get_transaction_count(address).await?)
    }

    async fn receipt_status(&self, hash: B256) -> Result<Option<bool>> {
        Ok(self
            .provider
            .get_transaction_receipt(hash)
            .await?
            .map(|r| r.status()))
    }
}

/// Replacement price: configured bps on top of the current price, and at
/// least one wei higher so nodes accept it as a replacement.
pub fn bumped_gas_price(current: u128, bump_bps: u32) -> u128 {
    let bumped = current.saturating_mul(10_000 + bump_bps as u128) / 10_000;
    bumped.max(current.saturating_add(1))
}

pub struct ExecutionCoordinator {
    chain_id: u64,
    executor: Address,
    signer: PrivateKeySigner,
    chain_view: Arc<dyn ChainView>,
    broadcaster: Arc<dyn Broadcaster>,
    settings: ExecutionSettings,
    slippage_bps_per_leg: u32,
    flashloan: FlashloanConfig,
    in_flight: Mutex<()>,
    last_submission: std::sync::Mutex<Option<(u64, B256)>>,
}

impl ExecutionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_id: u64,
        executor: Address,
        signer: PrivateKeySigner,
        chain_view: Arc<dyn ChainView>,
        broadcaster: Arc<dyn Broadcaster>,
        settings: ExecutionSettings,
        slippage_bps_per_leg: u32,
        flashloan: FlashloanConfig,
    ) -> Self {
        Self {
            chain_id,
            executor,
            signer,
            chain_view,
            broadcaster,
            settings,
            slippage_bps_per_leg,
            flashloan,
            in_flight: Mutex::new(()),
            last_submission: std::sync::Mutex::new(None),
        }
    }

    /// Nonce and hash of the most recent submission, for shutdown reporting.
    pub fn last_submission(&self) -> Option<(u64, B256)> {
        *self.last_submission.lock().expect("submission lock poisoned")
    }

    /// Run one attempt to a terminal state. Holds the in-flight lock for the
    /// whole lifecycle, so concurrent callers serialize.
    pub async fn execute(&self, scored: &ScoredRoute) -> Result<ExecutionAttempt, EngineError> {
        let _guard = self.in_flight.lock().await;

        let route = &scored.quote.route;
        let describe = route.describe();
        let failed = |reason: String| EngineError::SubmissionFailed {
            route: describe.clone(),
            reason,
        };

        let min_return = calldata::min_return(
            scored.quote.amount_out,
            self.slippage_bps_per_leg,
            route.hops(),
        );
        let deadline_ts = chrono::Utc::now().timestamp() as u64 + self.settings.deadline_secs;
        let flashloan_amount = self.flashloan.enabled.then_some(scored.quote.amount_in);
        let data = calldata::build_calldata(
            route,
            scored.quote.amount_in,
            min_return,
            U256::from(deadline_ts),
            flashloan_amount,
        )
        .map_err(|e| failed(format!("encoding failed: {e:#}")))?;

        let mut attempt = ExecutionAttempt::new(describe.clone(), data.clone());
        info!(
            "🧮 built attempt for [{describe}]: in={} min_return={} deadline={deadline_ts}",
            scored.quote.amount_in, min_return
        );

        // simulation gate: nothing reaches a mempool if this reverts
        if let Err(e) = self
            .chain_view
            .simulate(self.signer.address(), self.executor, &data)
            .await
        {
            warn!("🚫 simulation reverted for [{describe}]: {e:#}");
            return Err(EngineError::SimulationReverted {
                route: describe.clone(),
                reason: format!("{e:#}"),
            });
        }
        attempt.advance(AttemptState::Simulated);

        let mut gas_price = self
            .chain_view
            .gas_price()
            .await
            .map_err(|e| failed(format!("gas price lookup failed: {e:#}")))?;
        let nonce = self
            .chain_view
            .next_nonce(self.signer.address())
            .await
            .map_err(|e| failed(format!("nonce lookup failed: {e:#}")))?;
        attempt.nonce = nonce;
        attempt.gas_price = gas_price;

        let raw = self
            .sign(nonce, gas_price, &data)
            .await
            .map_err(|e| failed(format!("signing failed: {e:#}")))?;
        let mut current_hash =
            submit_with_fallback(self.broadcaster.as_ref(), &raw, self.private_timeout())
                .await
                .map_err(|e| failed(format!("{e:#}")))?;
        attempt.tx_hash = Some(current_hash);
        attempt.advance(AttemptState::Submitted);
        self.record_submission(nonce, current_hash);

        // track to a terminal state
        let ceiling_wei = self.settings.gas_ceiling_gwei as u128 * GWEI;
        let mut bumps = 0u32;
        let mut last_action = Instant::now();
        loop {
            tokio::time::sleep(Duration::from_millis(self.settings.poll_interval_ms)).await;

            match self.chain_view.receipt_status(current_hash).await {
                Ok(Some(true)) => {
                    info!("✅ attempt confirmed for [{describe}]: {current_hash:#x}");
                    attempt.advance(AttemptState::Confirmed);
                    return Ok(attempt);
                }
                Ok(Some(false)) => {
                    warn!("❌ attempt reverted on-chain for [{describe}]: {current_hash:#x}");
                    attempt.advance(AttemptState::Abandoned);
                    return Ok(attempt);
                }
                Ok(None) => {}
                // transient lookup failure, keep polling
                Err(e) => warn!("receipt lookup failed for {current_hash:#x}: {e:#}"),
            }

            if chrono::Utc::now().timestamp() as u64 >= deadline_ts {
                warn!("⌛ attempt expired past deadline for [{describe}]");
                attempt.advance(AttemptState::Expired);
                return Ok(attempt);
            }

            if last_action.elapsed() >= Duration::from_millis(self.settings.replace_after_ms) {
                let next = bumped_gas_price(gas_price, self.settings.bump_bps);
                if bumps >= self.settings.max_bumps || next > ceiling_wei {
                    warn!(
                        "🛑 replacement budget exhausted for [{describe}] after {bumps} bumps \
                         (next price {next} wei, ceiling {ceiling_wei})"
                    );
                    return Err(EngineError::ReplacementExhausted {
                        route: describe.clone(),
                        bumps,
                    });
                }
                bumps += 1;
                gas_price = next;
                let raw = self
                    .sign(nonce, gas_price, &data)
                    .await
                    .map_err(|e| failed(format!("re-signing failed: {e:#}")))?;
                current_hash =
                    submit_with_fallback(self.broadcaster.as_ref(), &raw, self.private_timeout())
                        .await
                        .map_err(|e| failed(format!("replacement failed: {e:#}")))?;
                info!(
                    "🔁 replaced attempt for [{describe}]: bump {bumps}, gas {gas_price} wei, \
                     {current_hash:#x}"
                );
                attempt.tx_hash = Some(current_hash);
                attempt.gas_price = gas_price;
                attempt.bumps = bumps;
                // replacement lands the attempt back in the submitted state
                attempt.advance(AttemptState::Replaced);
                attempt.advance(AttemptState::Submitted);
                self.record_submission(nonce, current_hash);
                last_action = Instant::now();
            }
        }
    }

    /// Zero-value self-transfer at a bumped price to occupy the last-used
    /// nonce on shutdown.
    pub async fn clear_nonce(&self) -> Result<B256> {
        let Some((nonce, _)) = self.last_submission() else {
            anyhow::bail!("no submission to clear");
        };
        let gas_price = bumped_gas_price(self.chain_view.gas_price().await?, self.settings.bump_bps);
        let tx = TransactionRequest::default()
            .with_to(self.signer.address())
            .with_value(U256::ZERO)
            .with_chain_id(self.chain_id)
            .with_nonce(nonce)
            .with_gas_limit(21_000)
            .with_gas_price(gas_price);
        let wallet = EthereumWallet::from(self.signer.clone());
        let envelope = tx.build(&wallet).await?;
        let raw = Bytes::from(envelope.encoded_2718());
        let hash = self.broadcaster.submit_public(&raw).await?;
        info!("🧹 nonce {nonce} cleared with self-transfer {hash:#x}");
        Ok(hash)
    }

    fn private_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.private_timeout_ms)
    }

    fn record_submission(&self, nonce: u64, hash: B256) {
        *self
            .last_submission
            .lock()
            .expect("submission lock poisoned") = Some((nonce, hash));
    }

    async fn sign(&self, nonce: u64, gas_price: u128, data: &Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::default()
            .with_to(self.executor)
            .with_input(data.clone())
            .with_value(U256::ZERO)
            .with_chain_id(self.chain_id)
            .with_nonce(nonce)
            .with_gas_limit(self.settings.gas_limit)
            .with_gas_price(gas_price);
        let wallet = EthereumWallet::from(self.signer.clone());
        let envelope = tx.build(&wallet).await?;
        Ok(Bytes::from(envelope.encoded_2718()))
    }
}
