//! Per-transaction poll state

use alloy::primitives::B256;

/// Blocks a submission is given to show up in before it counts as expired
pub const DEFAULT_CONFIRMATION_BUDGET: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Confirmed,
    Expired,
}

impl PollStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollStatus::Pending)
    }
}

/// Attempt counter for one submitted transaction.
///
/// Each observed block consumes one attempt. Once terminal, further
/// observations leave the state untouched.
#[derive(Debug, Clone)]
pub struct PollState {
    tx_id: B256,
    budget: u32,
    remaining_attempts: u32,
    status: PollStatus,
}

impl PollState {
    /// A budget of zero still lets the first block be inspected
    pub fn new(tx_id: B256, budget: u32) -> Self {
        let budget = budget.max(1);
        Self {
            tx_id,
            budget,
            remaining_attempts: budget,
            status: PollStatus::Pending,
        }
    }

    /// Account for one observed block given its transaction ids
    pub fn observe(&mut self, block_txs: &[B256]) -> PollStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        self.remaining_attempts = self.remaining_attempts.saturating_sub(1);
        if block_txs.contains(&self.tx_id) {
            self.status = PollStatus::Confirmed;
        } else if self.remaining_attempts == 0 {
            self.status = PollStatus::Expired;
        }
        self.status
    }

    pub fn tx_id(&self) -> B256 {
        self.tx_id
    }

    pub fn status(&self) -> PollStatus {
        self.status
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.remaining_attempts
    }

    /// Number of blocks observed so far
    pub fn blocks_observed(&self) -> u32 {
        self.budget - self.remaining_attempts
    }
}
