//! Interface descriptor loading

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::abi::InterfaceDescriptors;

/// Descriptor document looked up when nothing else is configured
pub const DEFAULT_DESCRIPTOR_SOURCE: &str = "contracts.json";

/// Where the interface descriptor document lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorSource {
    /// Local JSON file
    Path(PathBuf),
    /// Remote JSON document fetched over HTTP(S)
    Url(String),
}

impl DescriptorSource {
    /// `http://` and `https://` locations are URLs, anything else is a path
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            DescriptorSource::Url(location.to_string())
        } else {
            DescriptorSource::Path(PathBuf::from(location))
        }
    }
}

impl Default for DescriptorSource {
    fn default() -> Self {
        DescriptorSource::Path(PathBuf::from(DEFAULT_DESCRIPTOR_SOURCE))
    }
}

impl fmt::Display for DescriptorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorSource::Path(path) => write!(f, "{}", path.display()),
            DescriptorSource::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Fetch and parse the descriptor document
pub async fn load_descriptors(source: &DescriptorSource) -> Result<InterfaceDescriptors> {
    let started = Instant::now();
    let content = match source {
        DescriptorSource::Path(path) => fs::read_to_string(path)
            .with_context(|| format!("read descriptors {}", path.display()))?,
        DescriptorSource::Url(url) => fetch(url).await?,
    };

    let descriptors = InterfaceDescriptors::from_json(&content)
        .with_context(|| format!("parse descriptors from {}", source))?;

    info!(
        %source,
        contracts = descriptors.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "ABI descriptions loaded"
    );
    Ok(descriptors)
}

async fn fetch(url: &str) -> Result<String> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create HTTP client")?;

    let response = http
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?
        .error_for_status()
        .with_context(|| format!("Descriptor source {} returned an error", url))?;

    response
        .text()
        .await
        .with_context(|| format!("Failed to read body of {}", url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("eireg_{}_{}.json", name, std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_source() {
        assert_eq!(
            DescriptorSource::parse("https://example.org/contracts.json"),
            DescriptorSource::Url("https://example.org/contracts.json".into())
        );
        assert_eq!(
            DescriptorSource::parse("build/contracts.json"),
            DescriptorSource::Path(PathBuf::from("build/contracts.json"))
        );
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let path = temp_file("ok", include_str!("../../../tests/fixtures/contracts.json"));
        let descriptors = load_descriptors(&DescriptorSource::Path(path.clone()))
            .await
            .unwrap();
        assert!(descriptors.get("EInvoicingRegistry").is_some());
        fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_missing_and_malformed_files() {
        let missing = DescriptorSource::Path(PathBuf::from("/nonexistent/eireg/contracts.json"));
        assert!(load_descriptors(&missing).await.is_err());

        let path = temp_file("bad", "{\"EInvoicingRegistry\": ");
        assert!(load_descriptors(&DescriptorSource::Path(path.clone()))
            .await
            .is_err());
        fs::remove_file(path).ok();
    }
}
