pub mod state;

pub use state::{StateStore, CONTRACT_ADDRESS_KEY};
