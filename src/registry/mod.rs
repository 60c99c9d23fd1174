//! EInvoicingRegistry business layer
//!
//! Company and invoicing address records on top of the gateway session,
//! plus the Tieke CSV importer.

pub mod client;
pub mod identifiers;
pub mod importer;
pub mod types;

pub use client::{RegistryClient, RegistryError, NO_DATA, NO_INFORMATION};
pub use identifiers::{normalize_invoicing_address, ytunnus_to_vat_id, IdentifierError};
pub use importer::{
    read_csv, read_records, ImportError, ImportOutcome, ImportSummary, Importer, TiekeRecord,
};
pub use types::{AddressFormat, CompanyReport, ContentType};
