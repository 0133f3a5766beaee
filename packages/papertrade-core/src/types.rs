//! Core data types for the paper-trading engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Asset class of a tradable instrument.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Crypto,
    Forex,
    Stock,
    Index,
}

impl Category {
    /// Per-tick volatility used by the price simulator.
    pub fn volatility(self) -> f64 {
        match self {
            Category::Crypto => 0.003,
            Category::Forex => 0.0008,
            Category::Stock => 0.0015,
            Category::Index => 0.0012,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Crypto => "crypto",
            Category::Forex => "forex",
            Category::Stock => "stock",
            Category::Index => "index",
        };
        f.write_str(name)
    }
}

/// A tradable symbol with its reference price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    /// Unique symbol, e.g. `BTC/USD`
    pub symbol_id: String,
    /// Human-readable name
    pub display_name: String,
    /// Asset class
    pub category: Category,
    /// Starting price for the simulation
    pub base_price: f64,
}

impl Instrument {
    /// Create a new instrument.
    pub fn new(symbol_id: &str, display_name: &str, category: Category, base_price: f64) -> Self {
        Self {
            symbol_id: symbol_id.to_string(),
            display_name: display_name.to_string(),
            category,
            base_price,
        }
    }
}

/// Identifier of an open position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PositionId(Uuid);

impl PositionId {
    /// Mint a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The user's holding in one instrument, tracked at weighted-average cost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub symbol_id: String,
    pub display_name: String,
    pub category: Category,
    /// Units held
    pub amount: f64,
    /// Weighted-average entry price
    pub avg_price: f64,
}

impl Position {
    /// Open a new position for `instrument`.
    pub fn open(instrument: &Instrument, amount: f64, price: f64) -> Self {
        Self {
            id: PositionId::new(),
            symbol_id: instrument.symbol_id.clone(),
            display_name: instrument.display_name.clone(),
            category: instrument.category,
            amount,
            avg_price: price,
        }
    }

    /// Total cost basis of the position.
    pub fn total_cost(&self) -> f64 {
        self.amount * self.avg_price
    }

    /// Value the position at `current_price`.
    pub fn with_price(&self, current_price: f64) -> PositionView {
        let market_value = self.amount * current_price;
        let total_cost = self.total_cost();
        let unrealized_pnl = market_value - total_cost;
        let pnl_percent = if total_cost > 0.0 {
            (unrealized_pnl / total_cost) * 100.0
        } else {
            0.0
        };

        PositionView {
            position: self.clone(),
            current_price,
            market_value,
            unrealized_pnl,
            pnl_percent,
        }
    }
}

/// A position valued against a live price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionView {
    #[serde(flatten)]
    pub position: Position,
    pub current_price: f64,
    /// amount * current_price
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub pnl_percent: f64,
}

/// Trade direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Result of a successfully executed market order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fill {
    pub symbol_id: String,
    pub side: TradeSide,
    pub amount: f64,
    /// Execution price
    pub price: f64,
    /// amount * price
    pub value: f64,
    /// Cash balance after the fill
    pub cash_balance: f64,
    /// Position after the fill, `None` if it was closed out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// One point of a price chart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}
