//! Engine configuration.

use crate::market::DEFAULT_HISTORY_CAPACITY;
use crate::portfolio::DEFAULT_DUST_EPSILON;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Longest accepted tick interval, one day.
pub const MAX_TICK_INTERVAL_MS: u64 = 86_400_000;

/// Tunables for a [`TradingEngine`](crate::TradingEngine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Milliseconds between simulation ticks
    pub tick_interval_ms: u64,
    /// Prices kept per instrument for charting
    pub history_capacity: usize,
    /// Starting cash when nothing is persisted
    pub initial_capital: f64,
    /// Remaining amounts below this close the position
    pub dust_epsilon: f64,
    /// Fixed RNG seed for reproducible price paths
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            initial_capital: 10000.0,
            dust_epsilon: DEFAULT_DUST_EPSILON,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Load config from a TOML file, then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };

        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PAPERTRADE_TICK_MS`, `PAPERTRADE_INITIAL_CAPITAL` and `PAPERTRADE_SEED`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(ms) = env_var("PAPERTRADE_TICK_MS")? {
            self.tick_interval_ms = ms;
        }
        if let Some(capital) = env_var("PAPERTRADE_INITIAL_CAPITAL")? {
            self.initial_capital = capital;
        }
        if let Some(seed) = env_var("PAPERTRADE_SEED")? {
            self.seed = Some(seed);
        }
        Ok(self)
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.tick_interval_ms > MAX_TICK_INTERVAL_MS {
            return Err(Error::InvalidConfig(format!(
                "tick_interval_ms must be at most {MAX_TICK_INTERVAL_MS}, got {}",
                self.tick_interval_ms
            )));
        }
        if self.history_capacity == 0 {
            return Err(Error::InvalidConfig(
                "history_capacity must be positive".to_string(),
            ));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !self.dust_epsilon.is_finite() || self.dust_epsilon < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "dust_epsilon must be non-negative, got {}",
                self.dust_epsilon
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn env_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("{name} has invalid value {raw:?}"))),
        Err(_) => Ok(None),
    }
}
