//! Contract-invocation gateway
//!
//! A [`Session`] owns the node connection, the loaded interface
//! descriptors and the single active contract. All contract interaction goes
//! through it.

mod error;
mod handle;
mod session;

pub use error::GatewayError;
pub use handle::{
    ActiveContract, ContractHandle, SendOptions, TransactionSubmission, DEFAULT_GAS_LIMIT,
};
pub use session::{NodeStatus, Session};
