//! Biased random-walk price simulation with bounded history.

use super::PriceLookup;
use crate::types::{ChartPoint, Instrument};
use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tracing::warn;

/// Default number of prices kept per instrument.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Weight of the upward-biased trend component; the walk gets the rest.
const TREND_WEIGHT: f64 = 0.3;
const WALK_WEIGHT: f64 = 0.7;

/// Advances instrument prices one tick at a time.
#[derive(Debug)]
pub struct PriceSimulator {
    instruments: Vec<Instrument>,
    prices: HashMap<String, f64>,
    history: HashMap<String, VecDeque<f64>>,
    history_capacity: usize,
    tick_interval: Duration,
    ticks: u64,
    rng: StdRng,
}

impl PriceSimulator {
    /// Create an empty simulator. Call [`initialize`](Self::initialize) before ticking.
    ///
    /// With a `seed` the price path is reproducible; without one the RNG is
    /// seeded from OS entropy.
    pub fn new(history_capacity: usize, tick_interval: Duration, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            instruments: Vec::new(),
            prices: HashMap::new(),
            history: HashMap::new(),
            history_capacity: history_capacity.max(1),
            tick_interval,
            ticks: 0,
            rng,
        }
    }

    /// Load a catalog, resetting every price to its base price.
    ///
    /// Only the first entry for a repeated symbol is kept.
    pub fn initialize(&mut self, instruments: &[Instrument]) {
        let mut seen = HashSet::new();
        self.instruments = instruments
            .iter()
            .filter(|instrument| {
                let first = seen.insert(instrument.symbol_id.as_str());
                if !first {
                    warn!(symbol = %instrument.symbol_id, "Ignoring duplicate instrument");
                }
                first
            })
            .cloned()
            .collect();
        self.prices.clear();
        self.history.clear();
        self.ticks = 0;

        for instrument in &self.instruments {
            self.prices
                .insert(instrument.symbol_id.clone(), instrument.base_price);
            let mut series = VecDeque::with_capacity(self.history_capacity);
            series.push_back(instrument.base_price);
            self.history.insert(instrument.symbol_id.clone(), series);
        }
    }

    /// Advance every instrument by one step.
    pub fn tick(&mut self) {
        for instrument in &self.instruments {
            let trend: f64 = self.rng.gen_range(-0.3..0.7);
            let walk: f64 = self.rng.gen_range(-1.0..1.0);
            let change =
                (TREND_WEIGHT * trend + WALK_WEIGHT * walk) * instrument.category.volatility();

            let price = self
                .prices
                .entry(instrument.symbol_id.clone())
                .or_insert(instrument.base_price);
            *price *= 1.0 + change;
            let new_price = *price;

            let series = self
                .history
                .entry(instrument.symbol_id.clone())
                .or_default();
            series.push_back(new_price);
            while series.len() > self.history_capacity {
                series.pop_front();
            }
        }
        self.ticks += 1;
    }

    /// Current price of a symbol.
    ///
    /// Falls back to the catalog base price for a symbol that was never
    /// priced, and to 0 for a symbol not in the catalog.
    pub fn current_price(&self, symbol_id: &str) -> f64 {
        if let Some(price) = self.prices.get(symbol_id) {
            return *price;
        }
        self.instrument(symbol_id)
            .map(|i| i.base_price)
            .unwrap_or(0.0)
    }

    /// Price history of a symbol, stamped on an even time axis starting at `now`.
    pub fn history(&self, symbol_id: &str, now: DateTime<Utc>) -> PriceHistory<'_> {
        PriceHistory {
            prices: self.history.get(symbol_id),
            origin: now,
            step: TimeDelta::from_std(self.tick_interval).unwrap_or(TimeDelta::zero()),
        }
    }

    /// Look up a loaded instrument.
    pub fn instrument(&self, symbol_id: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.symbol_id == symbol_id)
    }

    /// Loaded instruments in catalog order.
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Current price of every instrument, in catalog order.
    pub fn price_table(&self) -> Vec<(String, f64)> {
        self.instruments
            .iter()
            .map(|i| (i.symbol_id.clone(), self.current_price(&i.symbol_id)))
            .collect()
    }

    /// Number of ticks since the last `initialize`.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }
}

impl PriceLookup for PriceSimulator {
    fn price_of(&self, symbol_id: &str) -> f64 {
        self.current_price(symbol_id)
    }
}

/// Borrowed view of one instrument's price history.
///
/// Iterating is lazy and can be restarted by calling [`iter`](Self::iter) again.
#[derive(Debug, Clone, Copy)]
pub struct PriceHistory<'a> {
    prices: Option<&'a VecDeque<f64>>,
    origin: DateTime<Utc>,
    step: TimeDelta,
}

impl<'a> PriceHistory<'a> {
    pub fn iter(&self) -> impl Iterator<Item = ChartPoint> + 'a {
        let origin = self.origin;
        let step = self.step;
        self.prices
            .into_iter()
            .flatten()
            .enumerate()
            .map_while(move |(index, &price)| {
                // Stops at the first timestamp chrono cannot represent
                let offset = step.checked_mul(i32::try_from(index).ok()?)?;
                let timestamp = origin.checked_add_signed(offset)?;
                Some(ChartPoint { timestamp, price })
            })
    }

    pub fn len(&self) -> usize {
        self.prices.map(VecDeque::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw prices, oldest first.
    pub fn prices(&self) -> Vec<f64> {
        self.prices
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }
}
