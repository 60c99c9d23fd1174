//! Tieke CSV importer
//!
//! Rows are written one at a time and every state change waits for its
//! confirmation before the next one is submitted.

use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::registry::client::{RegistryClient, RegistryError};
use crate::registry::identifiers::{normalize_invoicing_address, ytunnus_to_vat_id, IdentifierError};
use crate::registry::types::ContentType;

/// Contract major version the importer writes to
pub const SUPPORTED_VERSION_PREFIX: &str = "0.";

const YES: &str = "Kyllä";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error("row {y_tunnus} has neither a receiving address nor an OVT code")]
    MissingAddress { y_tunnus: String },

    #[error("contract version {0} is not supported by the importer")]
    UnsupportedVersion(String),

    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// One row of a Tieke e-invoicing address export
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TiekeRecord {
    #[serde(rename = "Y-tunnus")]
    pub y_tunnus: String,
    #[serde(rename = "Yrityksen nimi", default)]
    pub company_name: String,
    #[serde(rename = "Vastaanotto-osoite", default)]
    pub receiving_address: String,
    #[serde(rename = "OVT-tunnus", default)]
    pub ovt_code: String,
    #[serde(rename = "Operaattori", default)]
    pub operator_name: String,
    #[serde(rename = "Välittäjän tunnus", default)]
    pub operator_id: String,
    #[serde(rename = "Lähetyslupa", default)]
    pub permission_to_send: String,
    #[serde(rename = "Lähettää", default)]
    pub sends: String,
    #[serde(rename = "Vastaanottaa", default)]
    pub receives: String,
}

impl TiekeRecord {
    pub fn vat_id(&self) -> Result<String, IdentifierError> {
        ytunnus_to_vat_id(&self.y_tunnus)
    }

    /// Registry form of the row's invoicing address
    pub fn invoicing_address(&self) -> Result<String, ImportError> {
        let receiving = self.receiving_address.trim();
        if !receiving.is_empty() {
            return Ok(normalize_invoicing_address(receiving)?);
        }
        // Older rows only carry the OVT code
        let ovt = self.ovt_code.trim();
        if ovt.is_empty() {
            return Err(ImportError::MissingAddress {
                y_tunnus: self.y_tunnus.clone(),
            });
        }
        Ok(format!("OVT:{}", ovt))
    }

    fn company_data(&self) -> String {
        serde_json::json!({ "name": self.company_name }).to_string()
    }

    fn address_data(&self) -> String {
        serde_json::json!({
            "operatorName": self.operator_name,
            "operatorId": self.operator_id,
            "permissionToSend": self.permission_to_send.trim() == YES,
            "sends": self.sends.trim() == YES,
            "receives": self.receives.trim() == YES,
        })
        .to_string()
    }
}

/// Read export rows, keeping only the listed Y-tunnus values if any are given
pub fn read_records<R: io::Read>(
    reader: R,
    limit_to: &[String],
) -> Result<Vec<TiekeRecord>, ImportError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: TiekeRecord = row?;
        let y_tunnus = record.y_tunnus.trim();
        if !limit_to.is_empty() && !limit_to.iter().any(|wanted| wanted == y_tunnus) {
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

pub fn read_csv(path: &Path, limit_to: &[String]) -> Result<Vec<TiekeRecord>, ImportError> {
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    read_records(file, limit_to)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { vat_id: String, address: String },
    /// The address already belongs to some company
    AlreadyMapped { vat_id: String, address: String },
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: Vec<(String, ImportError)>,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.imported + self.skipped + self.failed.len()
    }
}

pub struct Importer<'a> {
    client: RegistryClient<'a>,
}

impl<'a> Importer<'a> {
    pub fn new(client: RegistryClient<'a>) -> Self {
        Self { client }
    }

    /// Refuse contracts from a different major version
    pub async fn check_version(&self) -> Result<String, ImportError> {
        let version = self.client.version().await?;
        if !version.starts_with(SUPPORTED_VERSION_PREFIX) {
            return Err(ImportError::UnsupportedVersion(version));
        }
        Ok(version)
    }

    pub async fn import_record(&self, record: &TiekeRecord) -> Result<ImportOutcome, ImportError> {
        let client = &self.client;
        let vat_id = record.vat_id()?;
        let address = record.invoicing_address()?;
        info!(%vat_id, %address, "importing");

        if !client.has_company(&vat_id).await? {
            client
                .submit_and_confirm(client.create_company(&vat_id))
                .await?;
            client
                .submit_and_confirm(client.set_company_data(
                    &vat_id,
                    ContentType::TiekeCompanyData,
                    &record.company_data(),
                ))
                .await?;
        }

        if let Some(owner) = client.vat_id_by_address(&address).await? {
            info!(%vat_id, %address, %owner, "address already mapped");
            return Ok(ImportOutcome::AlreadyMapped { vat_id, address });
        }

        client
            .submit_and_confirm(client.create_invoicing_address(&vat_id, &address))
            .await?;
        client
            .submit_and_confirm(client.set_invoicing_address_data(
                &vat_id,
                &address,
                ContentType::TiekeAddressData,
                &record.address_data(),
            ))
            .await?;

        info!(%vat_id, %address, "imported");
        Ok(ImportOutcome::Imported { vat_id, address })
    }

    /// Import every record. A failing row is recorded and the import goes on.
    pub async fn import_all(&self, records: &[TiekeRecord]) -> Result<ImportSummary, ImportError> {
        let version = self.check_version().await?;
        info!(%version, rows = records.len(), "starting import");

        let mut summary = ImportSummary::default();
        for record in records {
            match self.import_record(record).await {
                Ok(ImportOutcome::Imported { .. }) => summary.imported += 1,
                Ok(ImportOutcome::AlreadyMapped { .. }) => summary.skipped += 1,
                Err(err) => {
                    warn!(y_tunnus = %record.y_tunnus, error = %err, "row failed");
                    summary.failed.push((record.y_tunnus.clone(), err));
                }
            }
        }
        Ok(summary)
    }
}
