//! Ethereum infrastructure - Alloy provider implementation

mod provider;
mod subscription;

#[cfg(test)]
pub(crate) mod mock;

pub use provider::{
    create_provider, AlloyProvider, EthereumProvider, NodeRejection, ProviderConfig,
    DEFAULT_RPC_URL,
};
pub use subscription::BlockSubscription;
