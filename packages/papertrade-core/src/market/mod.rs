//! Market data module.
//!
//! Provides the instrument catalog and the simulated price feed.

mod catalog;
mod simulator;

pub use catalog::{get_instrument, instruments_in, list_instruments, BUILTIN_INSTRUMENTS};
pub use simulator::{PriceHistory, PriceSimulator, DEFAULT_HISTORY_CAPACITY};

/// Source of execution and valuation prices.
pub trait PriceLookup {
    /// Current price of `symbol_id`, 0 if unknown.
    fn price_of(&self, symbol_id: &str) -> f64;
}

impl<F> PriceLookup for F
where
    F: Fn(&str) -> f64,
{
    fn price_of(&self, symbol_id: &str) -> f64 {
        self(symbol_id)
    }
}
