use std::path::Path;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

/// Key under which the last verified contract address is kept
pub const CONTRACT_ADDRESS_KEY: &str = "contractAddress";

/// Small persistent key/value store for client state
#[derive(Debug)]
pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let conn = Connection::open(path).with_context(|| format!("open db {}", path.display()))?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init()?;
        Ok(store)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO state(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM state WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Last contract the user successfully switched to. An unparsable
    /// stored value is ignored.
    pub fn last_contract(&self) -> Result<Option<Address>> {
        let Some(raw) = self.get(CONTRACT_ADDRESS_KEY)? else {
            return Ok(None);
        };
        match raw.parse::<Address>() {
            Ok(address) => Ok(Some(address)),
            Err(err) => {
                warn!(value = %raw, error = %err, "ignoring stored contract address");
                Ok(None)
            }
        }
    }

    pub fn remember_contract(&self, address: Address) -> Result<()> {
        self.set(CONTRACT_ADDRESS_KEY, &address.to_checksum(None))
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}
