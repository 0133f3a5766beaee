//! Built-in instrument catalog.

use crate::types::{Category, Instrument};
use std::sync::LazyLock;

/// Reference catalog: two instruments per category, in display order.
pub static BUILTIN_INSTRUMENTS: LazyLock<Vec<Instrument>> = LazyLock::new(|| {
    vec![
        Instrument::new("BTC/USD", "Bitcoin", Category::Crypto, 45000.0),
        Instrument::new("ETH/USD", "Ethereum", Category::Crypto, 2500.0),
        Instrument::new("EUR/USD", "Euro / US Dollar", Category::Forex, 1.085),
        Instrument::new("GBP/USD", "British Pound / US Dollar", Category::Forex, 1.265),
        Instrument::new("AAPL", "Apple Inc.", Category::Stock, 185.0),
        Instrument::new("TSLA", "Tesla Inc.", Category::Stock, 245.0),
        Instrument::new("SPX", "S&P 500", Category::Index, 4750.0),
        Instrument::new("NDX", "Nasdaq 100", Category::Index, 16800.0),
    ]
});

/// List all built-in instruments.
pub fn list_instruments() -> Vec<Instrument> {
    BUILTIN_INSTRUMENTS.clone()
}

/// Get a built-in instrument by symbol.
pub fn get_instrument(symbol_id: &str) -> Option<Instrument> {
    BUILTIN_INSTRUMENTS
        .iter()
        .find(|i| i.symbol_id == symbol_id)
        .cloned()
}

/// Built-in instruments of one category.
pub fn instruments_in(category: Category) -> Vec<Instrument> {
    BUILTIN_INSTRUMENTS
        .iter()
        .filter(|i| i.category == category)
        .cloned()
        .collect()
}
