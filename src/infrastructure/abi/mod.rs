//! ABI infrastructure - fetching interface descriptors from disk or HTTP

mod loader;

pub use loader::{load_descriptors, DescriptorSource, DEFAULT_DESCRIPTOR_SOURCE};
