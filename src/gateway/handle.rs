//! Contract handles and transaction submissions

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use alloy_json_abi::Function;

use crate::domain::abi::ContractDescriptor;
use crate::gateway::GatewayError;

/// Default execution budget for state-mutating calls
pub const DEFAULT_GAS_LIMIT: u64 = 3_000_000;

/// A descriptor bound to a deployed address
#[derive(Debug, Clone)]
pub struct ContractHandle {
    address: Address,
    descriptor: Arc<ContractDescriptor>,
}

impl ContractHandle {
    pub(crate) fn new(address: Address, descriptor: Arc<ContractDescriptor>) -> Self {
        Self {
            address,
            descriptor,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Name of the descriptor this handle was built from
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ContractDescriptor {
        &self.descriptor
    }

    /// Resolve a method by name, picking the overload matching `arity`
    pub fn method(&self, name: &str, arity: usize) -> Result<&Function, GatewayError> {
        let overloads = self.descriptor.methods(name);
        if overloads.is_empty() {
            return Err(GatewayError::MethodNotFound(name.to_string()));
        }
        overloads
            .iter()
            .find(|function| function.inputs.len() == arity)
            .ok_or_else(|| {
                GatewayError::MethodNotFound(format!(
                    "{} taking {} argument(s)",
                    name, arity
                ))
            })
    }
}

/// A verified handle, published as the session's active contract
#[derive(Debug, Clone)]
pub struct ActiveContract {
    pub handle: ContractHandle,
    pub version: String,
}

/// Options for state-mutating calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Amount of wei to transfer with the call
    pub value: Option<U256>,
    /// Execution budget
    pub gas_limit: u64,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            value: None,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

/// A submitted, not yet confirmed, transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSubmission {
    pub tx_hash: B256,
    pub contract: Address,
    pub method: String,
}
