//! Interface descriptor registry - contract ABIs indexed by contract name

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_json_abi::{Function, JsonAbi, StateMutability};
use anyhow::{bail, Context, Result};

/// ABI of a single named contract
#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    /// Contract name as it appears in the descriptor source
    pub name: String,
    /// Parsed interface
    pub abi: JsonAbi,
}

impl ContractDescriptor {
    pub fn new(name: impl Into<String>, abi: JsonAbi) -> Self {
        Self {
            name: name.into(),
            abi,
        }
    }

    /// All overloads of a method
    pub fn methods(&self, name: &str) -> &[Function] {
        self.abi
            .function(name)
            .map(|overloads| overloads.as_slice())
            .unwrap_or(&[])
    }

    /// Look up a method by name and argument count
    pub fn method(&self, name: &str, arity: usize) -> Option<&Function> {
        self.methods(name)
            .iter()
            .find(|function| function.inputs.len() == arity)
    }

    pub fn has_method(&self, name: &str) -> bool {
        !self.methods(name).is_empty()
    }
}

/// Whether calling the function can change contract state
pub fn is_read_only(function: &Function) -> bool {
    matches!(
        function.state_mutability,
        StateMutability::Pure | StateMutability::View
    )
}

/// Loaded interface descriptors, immutable once handed to a session
#[derive(Debug, Default, Clone)]
pub struct InterfaceDescriptors {
    contracts: BTreeMap<String, Arc<ContractDescriptor>>,
}

impl InterfaceDescriptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a descriptor document of the form
    /// `{"<Contract>": {"abi": [...]}, ...}`.
    ///
    /// Entries may also be a bare ABI array, or carry the ABI as a JSON
    /// encoded string. One malformed entry fails the whole document.
    pub fn from_json(content: &str) -> Result<Self> {
        let document: serde_json::Value =
            serde_json::from_str(content).context("descriptor source is not valid JSON")?;
        let Some(entries) = document.as_object() else {
            bail!("descriptor source must be a JSON object keyed by contract name");
        };

        let mut descriptors = Self::new();
        for (name, entry) in entries {
            let abi = parse_entry(entry).with_context(|| format!("contract '{}'", name))?;
            descriptors.insert(ContractDescriptor::new(name.clone(), abi));
        }
        Ok(descriptors)
    }

    pub fn insert(&mut self, descriptor: ContractDescriptor) {
        self.contracts
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ContractDescriptor>> {
        self.contracts.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

fn parse_entry(entry: &serde_json::Value) -> Result<JsonAbi> {
    let abi = match entry {
        serde_json::Value::Array(_) => entry.clone(),
        serde_json::Value::Object(fields) => match fields.get("abi") {
            Some(serde_json::Value::String(encoded)) => {
                serde_json::from_str(encoded).context("embedded ABI string is not valid JSON")?
            }
            Some(abi) => abi.clone(),
            None => bail!("missing 'abi' field"),
        },
        _ => bail!("expected an object with an 'abi' field"),
    };
    serde_json::from_value(abi).context("invalid ABI")
}
