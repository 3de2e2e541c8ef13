//! Transaction submission
//!
//! Private-relay-first: a configured relay gets the raw transaction via
//! `eth_sendPrivateTransaction` under a bounded timeout. Any relay error,
//! timeout, or malformed response falls back to the public mempool. Exactly
//! one path's hash is tracked for an attempt.

use alloy::primitives::{Bytes, B256};
use alloy::providers::{DynProvider, Provider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Relay endpoint configured for this chain.
    fn has_private(&self) -> bool;
    async fn submit_private(&self, raw: &Bytes) -> Result<B256>;
    async fn submit_public(&self, raw: &Bytes) -> Result<B256>;
}

/// Submit with the private-first policy. Returns the hash of whichever path
/// accepted the transaction.
pub async fn submit_with_fallback(
    broadcaster: &dyn Broadcaster,
    raw: &Bytes,
    private_timeout: Duration,
) -> Result<B256> {
    if broadcaster.has_private() {
        match tokio::time::timeout(private_timeout, broadcaster.submit_private(raw)).await {
            Ok(Ok(hash)) => {
                info!("🔒 submitted via private relay: {hash:#x}");
                return Ok(hash);
            }
            Ok(Err(e)) => warn!("private relay rejected, falling back to public: {e:#}"),
            Err(_) => warn!(
                "private relay timed out after {}ms, falling back to public",
                private_timeout.as_millis()
            ),
        }
    }
    let hash = broadcaster
        .submit_public(raw)
        .await
        .context("public submission failed")?;
    info!("📤 submitted via public mempool: {hash:#x}");
    Ok(hash)
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
}

/// Production broadcaster: reqwest against the relay, the chain provider for
/// the public path.
pub struct RelayBroadcaster {
    client: reqwest::Client,
    private_rpc: Option<String>,
    provider: DynProvider,
}

impl RelayBroadcaster {
    pub fn new(client: reqwest::Client, private_rpc: Option<String>, provider: DynProvider) -> Self {
        Self {
            client,
            private_rpc,
            provider,
        }
    }
}

#[async_trait]
impl Broadcaster for RelayBroadcaster {
    fn has_private(&self) -> bool {
        self.private_rpc.is_some()
    }

    async fn submit_private(&self, raw: &Bytes) -> Result<B256> {
        let url = self
            .private_rpc
            .as_ref()
            .context("no private relay configured")?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendPrivateTransaction",
            "params": [{ "tx": format!("{raw}") }],
        });
        let response: JsonRpcResponse = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("relay request failed")?
            .json()
            .await
            .context("relay returned non-JSON body")?;
        if let Some(error) = response.error {
            anyhow::bail!("relay error: {error}");
        }
        // a response without a string tx hash counts as malformed
        response
            .result
            .as_ref()
            .and_then(|r| r.as_str())
            .context("relay response missing tx hash")?
            .parse::<B256>()
            .context("relay returned malformed tx hash")
    }

    async fn submit_public(&self, raw: &Bytes) -> Result<B256> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(*pending.tx_hash())
    }
}
