//! In-process key-value store.

use super::PersistenceGateway;
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Entries {
    numbers: HashMap<String, f64>,
    bytes: HashMap<String, Vec<u8>>,
}

/// Map-backed store. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<Entries>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything has been written under `key`.
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.lock();
        entries.numbers.contains_key(key) || entries.bytes.contains_key(key)
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PersistenceGateway for MemoryStore {
    fn load_number(&self, key: &str) -> f64 {
        self.lock().numbers.get(key).copied().unwrap_or(0.0)
    }

    fn load_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().bytes.get(key).cloned()
    }

    fn store_number(&mut self, key: &str, value: f64) -> Result<()> {
        self.lock().numbers.insert(key.to_string(), value);
        Ok(())
    }

    fn store_bytes(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.lock().bytes.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
