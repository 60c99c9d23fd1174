//! Confirmation poller
//!
//! Waits for a submitted transaction to appear in a block. Progress is
//! measured in blocks delivered by the node's new-block stream, not in wall
//! clock time.

mod state;

use std::sync::Arc;

use alloy::primitives::B256;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::gateway::GatewayError;
use crate::infrastructure::ethereum::{BlockSubscription, EthereumProvider};

pub use state::{PollState, PollStatus, DEFAULT_CONFIRMATION_BUDGET};

/// Terminal outcome of a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Included in `block_hash`, the `blocks_observed`-th block seen
    Confirmed { block_hash: B256, blocks_observed: u32 },
    /// Not seen in any of the `blocks_observed` blocks of the budget
    Expired { blocks_observed: u32 },
}

impl Confirmation {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Confirmation::Confirmed { .. })
    }
}

#[derive(Clone)]
pub struct ConfirmationPoller {
    provider: Arc<dyn EthereumProvider>,
    budget: u32,
}

impl ConfirmationPoller {
    pub fn new(provider: Arc<dyn EthereumProvider>, budget: u32) -> Self {
        Self { provider, budget }
    }

    /// Start watching blocks now, before the transaction exists.
    ///
    /// Nodes that mine on submission include the transaction in the very
    /// next block, so the watch has to be open before `eth_sendTransaction`.
    pub async fn arm(&self) -> Result<ArmedPoll, GatewayError> {
        let subscription = self
            .provider
            .watch_blocks()
            .await
            .map_err(GatewayError::communication)?;
        Ok(ArmedPoll {
            provider: self.provider.clone(),
            subscription,
            budget: self.budget,
        })
    }

    /// Watch new blocks until `tx_hash` is included or the budget is spent
    pub async fn wait(&self, tx_hash: B256) -> Result<Confirmation, GatewayError> {
        self.arm().await?.wait(tx_hash).await
    }

    /// Run [`ConfirmationPoller::wait`] as a background task
    pub fn spawn(&self, tx_hash: B256) -> PendingConfirmation {
        let poller = self.clone();
        PendingConfirmation {
            tx_hash,
            task: tokio::spawn(async move { poller.wait(tx_hash).await }),
        }
    }
}

/// A block watch opened ahead of a submission
pub struct ArmedPoll {
    provider: Arc<dyn EthereumProvider>,
    subscription: BlockSubscription,
    budget: u32,
}

impl ArmedPoll {
    /// Drive the poll for `tx_hash` from the already open watch.
    ///
    /// The subscription is torn down exactly once, on whichever outcome
    /// comes first (including the stream ending early, or this future being
    /// dropped).
    pub async fn wait(mut self, tx_hash: B256) -> Result<Confirmation, GatewayError> {
        let mut state = PollState::new(tx_hash, self.budget);
        debug!(%tx_hash, budget = self.budget, "waiting for confirmation");

        while let Some(block_hash) = self.subscription.next_block().await {
            let txs = match self.provider.block_transactions(block_hash).await {
                Ok(Some(txs)) => txs,
                Ok(None) => {
                    warn!(%block_hash, "node does not know announced block");
                    Vec::new()
                }
                Err(err) => {
                    warn!(%block_hash, error = %format!("{:#}", err), "block lookup failed");
                    Vec::new()
                }
            };

            match state.observe(&txs) {
                PollStatus::Pending => {
                    debug!(%tx_hash, %block_hash, remaining = state.remaining_attempts(), "not yet included");
                }
                PollStatus::Confirmed => {
                    self.subscription.cancel();
                    info!(%tx_hash, %block_hash, "transaction confirmed");
                    return Ok(Confirmation::Confirmed {
                        block_hash,
                        blocks_observed: state.blocks_observed(),
                    });
                }
                PollStatus::Expired => {
                    self.subscription.cancel();
                    warn!(%tx_hash, blocks = state.blocks_observed(), "transaction expired");
                    return Ok(Confirmation::Expired {
                        blocks_observed: state.blocks_observed(),
                    });
                }
            }
        }

        self.subscription.cancel();
        Err(GatewayError::Communication(format!(
            "block stream ended after {} block(s) while waiting for {}",
            state.blocks_observed(),
            tx_hash
        )))
    }
}

/// A poll running in the background. Cancelling it tears the block
/// subscription down.
#[derive(Debug)]
pub struct PendingConfirmation {
    tx_hash: B256,
    task: JoinHandle<Result<Confirmation, GatewayError>>,
}

impl PendingConfirmation {
    pub fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Wait for the outcome
    pub async fn outcome(self) -> Result<Confirmation, GatewayError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(GatewayError::Cancelled),
            Err(err) => Err(GatewayError::Communication(format!(
                "confirmation task failed: {}",
                err
            ))),
        }
    }
}
