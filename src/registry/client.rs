//! Typed access to the EInvoicingRegistry contract

use std::collections::BTreeMap;
use std::future::Future;

use alloy::primitives::{Address, B256};
use alloy_dyn_abi::DynSolValue;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::abi::value_text;
use crate::gateway::{GatewayError, SendOptions, Session, TransactionSubmission};
use crate::poller::Confirmation;
use crate::registry::types::{record_value, CompanyReport, ContentType};

pub const NO_INFORMATION: &str = "No information available";
pub const NO_DATA: &str = "No data available";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("transaction {tx_hash} was not included within {blocks_observed} blocks")]
    NotConfirmed { tx_hash: B256, blocks_observed: u32 },

    #[error("{method} returned an unexpected value: {value}")]
    UnexpectedOutput { method: String, value: String },
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Registry operations on the session's active contract
pub struct RegistryClient<'a> {
    session: &'a Session,
    options: SendOptions,
}

impl<'a> RegistryClient<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            options: SendOptions::default(),
        }
    }

    pub fn with_send_options(mut self, options: SendOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub async fn version(&self) -> Result<String> {
        let value = self.read("version", &[]).await?;
        Ok(value_text(&value))
    }

    pub async fn has_company(&self, vat_id: &str) -> Result<bool> {
        match self.read("hasCompany", &[vat_id]).await? {
            DynSolValue::Bool(exists) => Ok(exists),
            other => Err(unexpected("hasCompany", &other)),
        }
    }

    /// Owner of an invoicing address, `None` when the address is unmapped
    pub async fn vat_id_by_address(&self, address: &str) -> Result<Option<String>> {
        match self.read("getVatIdByAddress", &[address]).await? {
            DynSolValue::FixedBytes(word, _) if word.is_zero() => Ok(None),
            value @ DynSolValue::FixedBytes(..) => Ok(Some(value_text(&value))),
            other => Err(unexpected("getVatIdByAddress", &other)),
        }
    }

    pub async fn invoicing_address_count(&self, vat_id: &str) -> Result<u64> {
        match self.read("getInvoicingAddressCount", &[vat_id]).await? {
            DynSolValue::Uint(count, _) => u64::try_from(count).map_err(|_| {
                RegistryError::UnexpectedOutput {
                    method: "getInvoicingAddressCount".into(),
                    value: count.to_string(),
                }
            }),
            other => Err(unexpected("getInvoicingAddressCount", &other)),
        }
    }

    pub async fn invoicing_address_by_index(&self, vat_id: &str, index: u64) -> Result<String> {
        let index = index.to_string();
        let value = self
            .read("getInvoicingAddressByIndex", &[vat_id, &index])
            .await?;
        Ok(value_text(&value))
    }

    /// All invoicing addresses of a company, in registration order
    pub async fn invoicing_addresses(&self, vat_id: &str) -> Result<Vec<String>> {
        let count = self.invoicing_address_count(vat_id).await?;
        debug!(vat_id, count, "listing invoicing addresses");
        let mut addresses = Vec::new();
        for index in 0..count {
            addresses.push(self.invoicing_address_by_index(vat_id, index).await?);
        }
        Ok(addresses)
    }

    /// Company record of the given kind, `None` when empty
    pub async fn business_information(
        &self,
        vat_id: &str,
        content_type: ContentType,
    ) -> Result<Option<String>> {
        let kind = content_type.to_string();
        let value = self.read("getBusinessInformation", &[vat_id, &kind]).await?;
        Ok(non_empty(value_text(&value)))
    }

    /// Address record of the given kind, `None` when empty
    pub async fn address_information(
        &self,
        address: &str,
        content_type: ContentType,
    ) -> Result<Option<String>> {
        let kind = content_type.to_string();
        let value = self.read("getAddressInformation", &[address, &kind]).await?;
        Ok(non_empty(value_text(&value)))
    }

    /// Tieke company data plus the Tieke data of every invoicing address
    pub async fn company_report(&self, vat_id: &str) -> Result<CompanyReport> {
        let Some(info) = self
            .business_information(vat_id, ContentType::TiekeCompanyData)
            .await?
        else {
            return Ok(CompanyReport {
                vat_id: vat_id.to_string(),
                business_information: serde_json::Value::String(NO_INFORMATION.into()),
                addresses: None,
            });
        };

        let mut addresses = BTreeMap::new();
        for address in self.invoicing_addresses(vat_id).await? {
            let data = self
                .address_information(&address, ContentType::TiekeAddressData)
                .await?;
            let data = match data {
                Some(record) => record_value(&record),
                None => serde_json::Value::String(NO_DATA.into()),
            };
            addresses.insert(address, data);
        }

        Ok(CompanyReport {
            vat_id: vat_id.to_string(),
            business_information: record_value(&info),
            addresses: Some(addresses),
        })
    }

    pub async fn get_data(&self, key: &str) -> Result<Vec<u8>> {
        match self.read("getData", &[key]).await? {
            DynSolValue::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected("getData", &other)),
        }
    }

    pub async fn owners(&self, key: &str) -> Result<Vec<Address>> {
        match self.read("getOwners", &[key]).await? {
            DynSolValue::Array(items) => items
                .iter()
                .map(|item| match item {
                    DynSolValue::Address(owner) => Ok(*owner),
                    other => Err(unexpected("getOwners", other)),
                })
                .collect(),
            other => Err(unexpected("getOwners", &other)),
        }
    }

    pub async fn update_data(&self, key: &str, data: &str) -> Result<TransactionSubmission> {
        self.write("updateData", &[key, data]).await
    }

    pub async fn create_company(&self, vat_id: &str) -> Result<TransactionSubmission> {
        self.write("createCompany", &[vat_id]).await
    }

    pub async fn set_company_data(
        &self,
        vat_id: &str,
        content_type: ContentType,
        data: &str,
    ) -> Result<TransactionSubmission> {
        let kind = content_type.to_string();
        self.write("setCompanyData", &[vat_id, &kind, data]).await
    }

    pub async fn create_invoicing_address(
        &self,
        vat_id: &str,
        address: &str,
    ) -> Result<TransactionSubmission> {
        self.write("createInvoicingAddress", &[vat_id, address])
            .await
    }

    pub async fn set_invoicing_address_data(
        &self,
        vat_id: &str,
        address: &str,
        content_type: ContentType,
        data: &str,
    ) -> Result<TransactionSubmission> {
        let kind = content_type.to_string();
        self.write("setInvoicingAddressData", &[vat_id, address, &kind, data])
            .await
    }

    /// Run a submission and wait for its inclusion. Expiry is an error.
    ///
    /// The block watch is opened before `submit` is polled, so a node that
    /// mines on submission cannot slip the including block past the poller.
    pub async fn submit_and_confirm<F>(&self, submit: F) -> Result<TransactionSubmission>
    where
        F: Future<Output = Result<TransactionSubmission>>,
    {
        let armed = self.session.poller().arm().await?;
        let submission = submit.await?;
        match armed.wait(submission.tx_hash).await? {
            Confirmation::Confirmed { block_hash, .. } => {
                info!(tx_hash = %submission.tx_hash, %block_hash, method = %submission.method, "included");
                Ok(submission)
            }
            Confirmation::Expired { blocks_observed } => Err(RegistryError::NotConfirmed {
                tx_hash: submission.tx_hash,
                blocks_observed,
            }),
        }
    }

    async fn read(&self, method: &str, args: &[&str]) -> Result<DynSolValue> {
        let mut values = self.session.call(method, args).await?;
        if values.is_empty() {
            return Err(RegistryError::UnexpectedOutput {
                method: method.to_string(),
                value: "nothing".into(),
            });
        }
        Ok(values.swap_remove(0))
    }

    async fn write(&self, method: &str, args: &[&str]) -> Result<TransactionSubmission> {
        Ok(self.session.send(method, args, self.options).await?)
    }
}

fn unexpected(method: &str, value: &DynSolValue) -> RegistryError {
    RegistryError::UnexpectedOutput {
        method: method.to_string(),
        value: format!("{:?}", value),
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}
