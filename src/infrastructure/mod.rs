//! Infrastructure layer - External service integrations
//!
//! This layer contains:
//! - Alloy-based Ethereum provider and new-block watching
//! - Interface descriptor loading from disk or HTTP

pub mod abi;
pub mod ethereum;

pub use abi::{load_descriptors, DescriptorSource};
pub use ethereum::{create_provider, BlockSubscription, EthereumProvider, ProviderConfig};
