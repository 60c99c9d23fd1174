//! ABI domain models
//!
//! Interface descriptors as loaded from the descriptor source, and the
//! argument/result conventions used when talking to contracts through
//! alloy-dyn-abi.

mod codec;
mod registry;

pub use codec::{
    coerce_arg, coerce_args, format_value, identifier_text, is_falsy, pad_identifier, value_text,
    CodecError, IDENTIFIER_WIDTH,
};
pub use registry::{is_read_only, ContractDescriptor, InterfaceDescriptors};
