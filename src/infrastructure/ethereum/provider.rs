//! Ethereum provider abstraction and the Alloy implementation
//!
//! Block lookups use raw JSON requests and only read the transaction hash
//! list, so chains with non-standard transaction types work too.

use std::sync::Arc;
use std::time::Duration;

use alloy::network::Ethereum;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{
    fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
    Identity, Provider, ProviderBuilder, RootProvider,
};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportError;
use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::infrastructure::ethereum::BlockSubscription;

/// Default JSON-RPC endpoint of a local development node
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    /// HTTP JSON-RPC endpoint
    Http(String),
    /// WebSocket endpoint
    WebSocket(String),
}

impl ProviderConfig {
    /// Get display name for this endpoint
    pub fn display(&self) -> String {
        match self {
            ProviderConfig::Http(url) => url.clone(),
            ProviderConfig::WebSocket(url) => url.clone(),
        }
    }

    /// Check if this is a WebSocket endpoint
    pub fn is_websocket(&self) -> bool {
        matches!(self, ProviderConfig::WebSocket(_))
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Http(DEFAULT_RPC_URL.to_string())
    }
}

/// Error response produced by the node itself, as opposed to a transport
/// failure. Carried inside `anyhow::Error` so callers can downcast.
#[derive(Debug, Clone, thiserror::Error)]
#[error("node error {code}: {message}")]
pub struct NodeRejection {
    pub code: i64,
    pub message: String,
}

/// Abstract Ethereum provider trait
///
/// Everything the gateway and the confirmation poller need from a node.
#[async_trait::async_trait]
pub trait EthereumProvider: Send + Sync + 'static {
    /// Get the current block number
    async fn block_number(&self) -> Result<u64>;

    /// Get client version (used as the connectivity probe)
    async fn client_version(&self) -> Result<String>;

    /// Get the node's unlocked accounts
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Execute a read-only call (eth_call)
    async fn call(&self, request: TransactionRequest) -> Result<Bytes>;

    /// Submit a transaction signed by the node (eth_sendTransaction) and
    /// return its hash without waiting for inclusion
    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256>;

    /// Transaction hashes of a block, `None` if the node does not know it
    async fn block_transactions(&self, hash: B256) -> Result<Option<Vec<B256>>>;

    /// Watch for new blocks
    async fn watch_blocks(&self) -> Result<BlockSubscription>;

    /// Get endpoint display name
    fn endpoint_name(&self) -> String;
}

type FilledProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider,
    Ethereum,
>;

/// Alloy-backed provider; HTTP and WebSocket transports share one type
pub struct AlloyProvider {
    provider: Arc<FilledProvider>,
    endpoint: String,
    poll_interval: Duration,
}

/// Create a provider from configuration
pub async fn create_provider(
    config: ProviderConfig,
    poll_interval: Duration,
) -> Result<Arc<dyn EthereumProvider>> {
    let endpoint = config.display();
    let provider = match config {
        ProviderConfig::Http(url) => {
            let rpc_url = url.parse().context("Invalid HTTP URL")?;
            ProviderBuilder::new().connect_http(rpc_url)
        }
        ProviderConfig::WebSocket(url) => ProviderBuilder::new()
            .connect(&url)
            .await
            .context("Failed to create WebSocket provider")?,
    };
    debug!(%endpoint, "provider created");

    Ok(Arc::new(AlloyProvider {
        provider: Arc::new(provider),
        endpoint,
        poll_interval,
    }))
}

/// Tag node error responses so they survive as `NodeRejection`
fn tag_rejection(err: TransportError) -> anyhow::Error {
    if let Some(payload) = err.as_error_resp() {
        return anyhow::Error::new(NodeRejection {
            code: payload.code,
            message: payload.message.to_string(),
        });
    }
    anyhow::Error::new(err)
}

#[async_trait::async_trait]
impl EthereumProvider for AlloyProvider {
    async fn block_number(&self) -> Result<u64> {
        self.provider.get_block_number().await.map_err(tag_rejection)
    }

    async fn client_version(&self) -> Result<String> {
        self.provider
            .get_client_version()
            .await
            .map_err(tag_rejection)
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.provider.get_accounts().await.map_err(tag_rejection)
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes> {
        self.provider.call(request).await.map_err(tag_rejection)
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256> {
        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(tag_rejection)?;
        Ok(*pending.tx_hash())
    }

    async fn block_transactions(&self, hash: B256) -> Result<Option<Vec<B256>>> {
        let json: serde_json::Value = self
            .provider
            .raw_request("eth_getBlockByHash".into(), (hash, false))
            .await
            .map_err(tag_rejection)?;

        if json.is_null() {
            return Ok(None);
        }

        Ok(Some(parse_transaction_hashes(&json)?))
    }

    async fn watch_blocks(&self) -> Result<BlockSubscription> {
        watch_block_filter(self.provider.clone(), self.poll_interval, self.endpoint.clone()).await
    }

    fn endpoint_name(&self) -> String {
        self.endpoint.clone()
    }
}

/// Node side new-block filter: install, poll, uninstall
#[async_trait::async_trait]
trait BlockFilterApi: Send + Sync + 'static {
    async fn install(&self) -> Result<U256>;
    async fn changes(&self, id: U256) -> Result<Vec<B256>>;
    async fn uninstall(&self, id: U256) -> Result<bool>;
}

#[async_trait::async_trait]
impl BlockFilterApi for FilledProvider {
    async fn install(&self) -> Result<U256> {
        self.new_block_filter().await.map_err(tag_rejection)
    }

    async fn changes(&self, id: U256) -> Result<Vec<B256>> {
        self.get_filter_changes::<B256>(id)
            .await
            .map_err(tag_rejection)
    }

    async fn uninstall(&self, id: U256) -> Result<bool> {
        self.uninstall_filter(id).await.map_err(tag_rejection)
    }
}

/// Poll an `eth_newBlockFilter` and forward new block hashes. Teardown
/// stops polling and removes the filter from the node.
async fn watch_block_filter<F: BlockFilterApi>(
    api: Arc<F>,
    poll_interval: Duration,
    endpoint: String,
) -> Result<BlockSubscription> {
    let id = api.install().await.context("Failed to install block filter")?;
    debug!(%endpoint, filter = %id, "block filter installed");

    let (tx, rx) = mpsc::channel(64);
    let poll_api = api.clone();
    let poll_endpoint = endpoint.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            let hashes = match poll_api.changes(id).await {
                Ok(hashes) => hashes,
                Err(err) => {
                    // The stream ends; the poller reports it
                    warn!(endpoint = %poll_endpoint, error = %format!("{:#}", err), "block filter poll failed");
                    break;
                }
            };
            for hash in hashes {
                if tx.send(hash).await.is_err() {
                    return;
                }
            }
        }
    });

    let runtime = tokio::runtime::Handle::try_current().ok();
    Ok(BlockSubscription::new(rx, move || {
        task.abort();
        let Some(runtime) = runtime else {
            warn!(%endpoint, filter = %id, "no runtime left to uninstall block filter");
            return;
        };
        runtime.spawn(async move {
            match api.uninstall(id).await {
                Ok(_) => debug!(%endpoint, filter = %id, "block filter uninstalled"),
                Err(err) => {
                    warn!(%endpoint, filter = %id, error = %format!("{:#}", err), "block filter uninstall failed")
                }
            }
        });
    }))
}

/// Read the `transactions` hash list of a block fetched without bodies
fn parse_transaction_hashes(json: &serde_json::Value) -> Result<Vec<B256>> {
    let Some(txs) = json.get("transactions").and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };

    txs.iter()
        .map(|tx| {
            // Some nodes return full objects even when asked for hashes
            let hash = tx
                .as_str()
                .or_else(|| tx.get("hash").and_then(|h| h.as_str()))
                .context("transaction entry without hash")?;
            hash.parse::<B256>()
                .with_context(|| format!("invalid transaction hash {}", hash))
        })
        .collect()
}
