//! Client for the EInvoicingRegistry contract
//!
//! * [`gateway`] binds contract descriptors to a deployed address and routes
//!   calls and transactions to the node.
//! * [`poller`] waits for submitted transactions block by block.
//! * [`registry`] is the company / invoicing address layer on top.

pub mod config;
pub mod domain;
pub mod gateway;
pub mod infrastructure;
pub mod poller;
pub mod registry;
pub mod store;
