//! Key-value persistence for portfolio state.
//!
//! The engine only ever hands the gateway serialized snapshots. Three
//! logical entries are written: the cash balance, the initial capital and a
//! JSON blob of position records. A fourth `initialized` marker tells a
//! genuinely empty cash balance apart from a store that was never written.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::types::{Category, Position, PositionId};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

pub const KEY_BALANCE: &str = "paper_balance";
pub const KEY_INITIAL_CAPITAL: &str = "paper_initial_capital";
pub const KEY_POSITIONS: &str = "paper_positions";
pub const KEY_INITIALIZED: &str = "paper_initialized";

/// Abstract key-value store backing the portfolio.
pub trait PersistenceGateway: Send {
    /// Stored number for `key`, 0 if absent.
    fn load_number(&self, key: &str) -> f64;

    /// Stored bytes for `key`.
    fn load_bytes(&self, key: &str) -> Option<Vec<u8>>;

    fn store_number(&mut self, key: &str, value: f64) -> Result<()>;

    fn store_bytes(&mut self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Make previous writes durable. Stores that write through need not override this.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Write a full portfolio snapshot.
    fn save(&mut self, balance: f64, initial_capital: f64, positions: &[Position]) -> Result<()> {
        let records: Vec<PositionRecord> = positions.iter().map(PositionRecord::from).collect();
        let blob = serde_json::to_vec(&records)?;

        self.store_number(KEY_BALANCE, balance)?;
        self.store_number(KEY_INITIAL_CAPITAL, initial_capital)?;
        self.store_bytes(KEY_POSITIONS, &blob)?;
        self.store_number(KEY_INITIALIZED, 1.0)?;
        self.flush()
    }
}

/// Serialized form of a position. Ids are not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub symbol_id: String,
    pub display_name: String,
    pub category: Category,
    pub amount: f64,
    pub avg_price: f64,
}

impl From<&Position> for PositionRecord {
    fn from(position: &Position) -> Self {
        Self {
            symbol_id: position.symbol_id.clone(),
            display_name: position.display_name.clone(),
            category: position.category,
            amount: position.amount,
            avg_price: position.avg_price,
        }
    }
}

impl PositionRecord {
    /// Rebuild a live position under a freshly minted id.
    pub fn into_position(self) -> Position {
        Position {
            id: PositionId::new(),
            symbol_id: self.symbol_id,
            display_name: self.display_name,
            category: self.category,
            amount: self.amount,
            avg_price: self.avg_price,
        }
    }

    fn is_valid(&self) -> bool {
        self.amount.is_finite()
            && self.amount > 0.0
            && self.avg_price.is_finite()
            && self.avg_price > 0.0
    }
}

/// Portfolio state as read back from a gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPortfolio {
    pub cash_balance: f64,
    pub initial_capital: f64,
    pub positions: Vec<Position>,
}

impl StoredPortfolio {
    /// Fresh portfolio holding only `capital` in cash.
    pub fn fresh(capital: f64) -> Self {
        Self {
            cash_balance: capital,
            initial_capital: capital,
            positions: Vec::new(),
        }
    }
}

/// Read portfolio state, falling back to a fresh portfolio of `default_capital`.
///
/// Never fails: anything missing or malformed is treated as absent.
pub fn load_portfolio(gateway: &dyn PersistenceGateway, default_capital: f64) -> StoredPortfolio {
    let initialized = gateway.load_number(KEY_INITIALIZED) > 0.0;
    let balance = gateway.load_number(KEY_BALANCE);
    let capital = gateway.load_number(KEY_INITIAL_CAPITAL);

    let (cash_balance, initial_capital) = if initialized {
        if !balance.is_finite() || balance < 0.0 || !capital.is_finite() || capital <= 0.0 {
            warn!(balance, capital, "Persisted balances are invalid, starting fresh");
            return StoredPortfolio::fresh(default_capital);
        }
        (balance, capital)
    } else {
        // Stores written without the marker cannot tell zero from absent.
        let or_default = |v: f64| {
            if v <= 0.0 || !v.is_finite() {
                default_capital
            } else {
                v
            }
        };
        if balance < 0.0 || capital < 0.0 {
            warn!(balance, capital, "Negative persisted balances, using defaults");
        }
        (or_default(balance), or_default(capital))
    };

    StoredPortfolio {
        cash_balance,
        initial_capital,
        positions: decode_positions(gateway.load_bytes(KEY_POSITIONS)),
    }
}

fn decode_positions(blob: Option<Vec<u8>>) -> Vec<Position> {
    let Some(blob) = blob else {
        return Vec::new();
    };

    let records: Vec<PositionRecord> = match serde_json::from_slice(&blob) {
        Ok(records) => records,
        Err(e) => {
            warn!("Malformed persisted positions, ignoring them: {}", e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            if !record.is_valid() {
                warn!(symbol = %record.symbol_id, "Dropping invalid persisted position");
                return false;
            }
            if !seen.insert(record.symbol_id.clone()) {
                warn!(symbol = %record.symbol_id, "Dropping duplicate persisted position");
                return false;
            }
            true
        })
        .map(PositionRecord::into_position)
        .collect()
}
