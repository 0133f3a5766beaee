//! JSON document store on disk.

use super::PersistenceGateway;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
enum StoredValue {
    Number(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Key-value entries kept in a single pretty-printed JSON file.
///
/// Writes are buffered in memory and hit the disk on [`flush`](PersistenceGateway::flush).
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, StoredValue>,
}

impl JsonFileStore {
    /// Open the store at the default path.
    pub fn new() -> Self {
        Self::open(Self::default_path())
    }

    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable state file {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    /// Get the default state file path.
    ///
    /// Default path: `~/.papertrade/portfolio.json`
    /// Can be overridden with `PAPERTRADE_STATE_FILE` environment variable.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var("PAPERTRADE_STATE_FILE") {
            return PathBuf::from(path);
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".papertrade/portfolio.json"))
            .unwrap_or_else(|| PathBuf::from("portfolio.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(path: &Path) -> Result<BTreeMap<String, StoredValue>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceGateway for JsonFileStore {
    fn load_number(&self, key: &str) -> f64 {
        match self.entries.get(key) {
            Some(StoredValue::Number(value)) => *value,
            _ => 0.0,
        }
    }

    fn load_bytes(&self, key: &str) -> Option<Vec<u8>> {
        match self.entries.get(key)? {
            StoredValue::Text(text) => Some(text.clone().into_bytes()),
            StoredValue::Bytes(bytes) => Some(bytes.clone()),
            StoredValue::Number(_) => None,
        }
    }

    fn store_number(&mut self, key: &str, value: f64) -> Result<()> {
        self.entries
            .insert(key.to_string(), StoredValue::Number(value));
        Ok(())
    }

    fn store_bytes(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        // UTF-8 payloads stay human-readable in the file
        let value = match String::from_utf8(bytes.to_vec()) {
            Ok(text) => StoredValue::Text(text),
            Err(e) => StoredValue::Bytes(e.into_bytes()),
        };
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, content)?;
        debug!("Portfolio state written to {}", self.path.display());
        Ok(())
    }
}
