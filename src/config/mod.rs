use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::gateway::DEFAULT_GAS_LIMIT;
use crate::infrastructure::abi::DescriptorSource;
use crate::infrastructure::ethereum::ProviderConfig;
use crate::poller::DEFAULT_CONFIRMATION_BUDGET;

/// Descriptor name the client binds by default
pub const DEFAULT_CONTRACT_NAME: &str = "EInvoicingRegistry";

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub name: Option<String>,
    pub rpc: Option<String>,
    pub ws: Option<String>,
}

impl EndpointConfig {
    /// WebSocket wins when both are set, it gives push block notifications
    pub fn provider_config(&self) -> Option<ProviderConfig> {
        if let Some(ws) = self.ws.as_deref().filter(|s| !s.trim().is_empty()) {
            return Some(ProviderConfig::WebSocket(ws.trim().to_string()));
        }
        self.rpc
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|rpc| ProviderConfig::Http(rpc.trim().to_string()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,

    pub descriptors: Option<String>,
    pub contract_name: Option<String>,
    pub confirmation_budget: Option<u32>,
    pub gas_limit: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub sender: Option<String>,
}

impl Config {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid config")
    }

    /// First usable endpoint, or the local development node
    pub fn endpoint(&self) -> ProviderConfig {
        self.endpoints
            .iter()
            .find_map(EndpointConfig::provider_config)
            .unwrap_or_default()
    }

    pub fn descriptor_source(&self) -> DescriptorSource {
        self.descriptors
            .as_deref()
            .map(DescriptorSource::parse)
            .unwrap_or_default()
    }

    pub fn contract_name(&self) -> &str {
        self.contract_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_CONTRACT_NAME)
    }

    pub fn confirmation_budget(&self) -> u32 {
        self.confirmation_budget
            .unwrap_or(DEFAULT_CONFIRMATION_BUDGET)
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    pub fn sender(&self) -> Result<Option<Address>> {
        self.sender
            .as_deref()
            .map(|raw| {
                raw.trim()
                    .parse::<Address>()
                    .with_context(|| format!("invalid sender address {}", raw))
            })
            .transpose()
    }
}

pub fn load() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(_) => return Config::default(),
    };
    match Config::parse(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %format!("{:#}", err), "ignoring config");
            Config::default()
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("EIREG_CONFIG").map(PathBuf::from) {
        return Some(path);
    }
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return Some(xdg.join("eireg").join("config.toml"));
    }
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        return Some(home.join(".config").join("eireg").join("config.toml"));
    }

    directories::ProjectDirs::from("fi", "eireg", "eireg")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn data_dir() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME").map(PathBuf::from) {
        return Some(xdg.join("eireg"));
    }
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        return Some(home.join(".local").join("share").join("eireg"));
    }
    directories::ProjectDirs::from("fi", "eireg", "eireg")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

pub fn state_db_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("state.sqlite3"))
}
