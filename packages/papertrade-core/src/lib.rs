//! Papertrade Core - Simulated market and paper-trading portfolio engine.
//!
//! This crate provides:
//!
//! - **Market simulation**: Biased random-walk prices with bounded history
//! - **Portfolio ledger**: Cash and positions with weighted-average cost
//! - **Persistence**: Key-value snapshots of the portfolio (memory or JSON file)
//! - **Trading engine**: Composition root with a cancellable tick scheduler
//!
//! # Example
//!
//! ```rust
//! use papertrade_core::{EngineConfig, MemoryStore, TradingEngine};
//!
//! let engine = TradingEngine::new(EngineConfig::default(), MemoryStore::new());
//!
//! let fill = engine.buy("BTC/USD", 0.1).unwrap();
//! println!("Bought {} at ${:.2}", fill.amount, fill.price);
//!
//! engine.tick();
//! println!("P&L: ${:.2}", engine.pnl());
//! ```

pub mod config;
pub mod engine;
pub mod market;
pub mod persistence;
pub mod portfolio;
pub mod types;

pub use config::EngineConfig;
pub use engine::{EngineSnapshot, TickerHandle, TradingEngine};
pub use market::{PriceLookup, PriceSimulator};
pub use persistence::{JsonFileStore, MemoryStore, PersistenceGateway};
pub use portfolio::{PortfolioLedger, PortfolioSummary};
pub use types::{Category, ChartPoint, Fill, Instrument, Position, PositionId, PositionView, TradeSide};

/// Recoverable outcomes of a rejected trade command.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TradeError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Insufficient balance. Need ${needed:.2}, have ${available:.2}")]
    InsufficientBalance { needed: f64, available: f64 },

    #[error("No position in {0}")]
    NoPosition(String),

    #[error("Cannot sell {requested}, only have {held}")]
    InsufficientAmount { requested: f64, held: f64 },

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("No valid price for {0}")]
    Unpriced(String),
}

/// Error types for papertrade-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for papertrade-core operations.
pub type Result<T> = std::result::Result<T, Error>;
