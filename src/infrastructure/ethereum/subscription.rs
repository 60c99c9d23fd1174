//! New-block subscription handle

use alloy::primitives::B256;
use tokio::sync::mpsc;

type Teardown = Box<dyn FnOnce() + Send + 'static>;

/// Stream of new block hashes, in the order the node reported them.
///
/// The teardown hook runs at most once: on the first `cancel()`, or on drop
/// if the subscription was never cancelled.
pub struct BlockSubscription {
    blocks: mpsc::Receiver<B256>,
    teardown: Option<Teardown>,
}

impl BlockSubscription {
    pub fn new(blocks: mpsc::Receiver<B256>, teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            blocks,
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Wait for the next block hash. Returns `None` once cancelled or when
    /// the upstream stream ends.
    pub async fn next_block(&mut self) -> Option<B256> {
        if self.teardown.is_none() {
            return None;
        }
        self.blocks.recv().await
    }

    /// Stop watching. Returns `true` if this call performed the teardown.
    pub fn cancel(&mut self) -> bool {
        match self.teardown.take() {
            Some(teardown) => {
                self.blocks.close();
                teardown();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.teardown.is_some()
    }
}

impl Drop for BlockSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for BlockSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSubscription")
            .field("active", &self.is_active())
            .finish()
    }
}
