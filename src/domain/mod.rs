//! Domain layer - contract interface models

pub mod abi;
