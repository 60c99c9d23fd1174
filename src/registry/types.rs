//! Registry contract enums and report types

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Kinds of data records the registry stores per company or address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContentType {
    Undefined = 0,
    InvoiceContactInformation = 1,
    NationalBusinessRegistryData = 2,
    OperatorPublicData = 3,
    TiekeCompanyData = 4,
    TiekeAddressData = 5,
}

impl ContentType {
    /// Value as passed to the contract
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AddressFormat {
    Undefined = 0,
    Ovt = 1,
    Iban = 2,
    Other = 3,
}

impl AddressFormat {
    /// Guess the format from a normalised address prefix
    pub fn of(address: &str) -> Self {
        match address.split_once(':').map(|(prefix, _)| prefix) {
            Some("OVT") => AddressFormat::Ovt,
            Some("IBAN") => AddressFormat::Iban,
            Some(_) => AddressFormat::Other,
            None => AddressFormat::Undefined,
        }
    }
}

/// Everything the registry knows about one company
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyReport {
    pub vat_id: String,
    pub business_information: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<BTreeMap<String, serde_json::Value>>,
}

/// Parse a stored record as JSON, falling back to the raw text
pub(crate) fn record_value(record: &str) -> serde_json::Value {
    serde_json::from_str(record).unwrap_or_else(|_| serde_json::Value::String(record.to_string()))
}
