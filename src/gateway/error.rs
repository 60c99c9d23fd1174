//! Gateway error taxonomy

use alloy::primitives::Address;
use thiserror::Error;

use crate::domain::abi::CodecError;
use crate::infrastructure::ethereum::NodeRejection;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("ABI data not loaded")]
    NotReady,

    #[error("failed to load interface descriptors: {0}")]
    DescriptorLoad(String),

    #[error("unknown contract descriptor '{0}'")]
    UnknownDescriptor(String),

    #[error("no verified contract is active, set up a contract address first")]
    NoActiveContract,

    #[error("error communicating with the node: {0}")]
    Communication(String),

    #[error("contract at {address} seems to be invalid")]
    InvalidContract { address: Address },

    #[error("method '{0}' not found in the contract interface")]
    MethodNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] CodecError),

    #[error("contract rejected the call: {0}")]
    CallRejected(String),

    #[error("node rejected the transaction: {0}")]
    SubmissionRejected(String),

    #[error("confirmation polling was cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Classify a provider failure from a read-only call
    pub(crate) fn from_call(err: anyhow::Error) -> Self {
        match err.downcast_ref::<NodeRejection>() {
            Some(rejection) => GatewayError::CallRejected(rejection.message.clone()),
            None => GatewayError::Communication(format!("{:#}", err)),
        }
    }

    /// Classify a provider failure from a transaction submission
    pub(crate) fn from_submission(err: anyhow::Error) -> Self {
        match err.downcast_ref::<NodeRejection>() {
            Some(rejection) => GatewayError::SubmissionRejected(rejection.message.clone()),
            None => GatewayError::Communication(format!("{:#}", err)),
        }
    }

    pub(crate) fn communication(err: anyhow::Error) -> Self {
        GatewayError::Communication(format!("{:#}", err))
    }
}
