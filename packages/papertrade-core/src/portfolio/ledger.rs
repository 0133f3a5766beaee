//! Cash and position ledger.

use super::PortfolioSummary;
use crate::market::PriceLookup;
use crate::persistence::{load_portfolio, MemoryStore, PersistenceGateway, StoredPortfolio};
use crate::types::{Fill, Instrument, Position, PositionId, PositionView, TradeSide};
use crate::TradeError;
use std::fmt;
use tracing::{debug, info, warn};

/// Positions smaller than this are closed out instead of left as residue.
pub const DEFAULT_DUST_EPSILON: f64 = 1e-5;

/// Portfolio state machine.
///
/// Every command is all-or-nothing: a rejected command leaves the ledger
/// untouched, an accepted one is persisted before returning.
pub struct PortfolioLedger {
    cash_balance: f64,
    initial_capital: f64,
    positions: Vec<Position>,
    dust_epsilon: f64,
    store: Box<dyn PersistenceGateway>,
}

impl fmt::Debug for PortfolioLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortfolioLedger")
            .field("cash_balance", &self.cash_balance)
            .field("initial_capital", &self.initial_capital)
            .field("positions", &self.positions)
            .field("dust_epsilon", &self.dust_epsilon)
            .finish_non_exhaustive()
    }
}

impl PortfolioLedger {
    /// Restore a ledger from `store`, or start fresh with `default_capital`.
    pub fn open<S>(store: S, default_capital: f64, dust_epsilon: f64) -> Self
    where
        S: PersistenceGateway + 'static,
    {
        let stored = load_portfolio(&store, default_capital);
        info!(
            cash = stored.cash_balance,
            capital = stored.initial_capital,
            positions = stored.positions.len(),
            "Portfolio loaded"
        );
        Self::from_stored(stored, dust_epsilon, Box::new(store))
    }

    /// Create a ledger that persists to a private in-memory store.
    pub fn in_memory(capital: f64) -> Self {
        Self::from_stored(
            StoredPortfolio::fresh(capital),
            DEFAULT_DUST_EPSILON,
            Box::new(MemoryStore::new()),
        )
    }

    fn from_stored(
        stored: StoredPortfolio,
        dust_epsilon: f64,
        store: Box<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            cash_balance: stored.cash_balance,
            initial_capital: stored.initial_capital,
            positions: stored.positions,
            dust_epsilon,
            store,
        }
    }

    /// Buy `amount` units of `instrument` at the current price.
    ///
    /// Adding to an existing position re-averages its cost:
    /// - New amount = old amount + bought amount
    /// - New avg price = (old amount * old avg + bought amount * price) / new amount
    pub fn buy(
        &mut self,
        instrument: &Instrument,
        amount: f64,
        prices: &dyn PriceLookup,
    ) -> Result<Fill, TradeError> {
        validate_amount(amount)?;
        let price = execution_price(&instrument.symbol_id, prices)?;

        let cost = amount * price;
        if cost > self.cash_balance {
            return Err(TradeError::InsufficientBalance {
                needed: cost,
                available: self.cash_balance,
            });
        }

        self.cash_balance -= cost;

        let position = match self.find_mut(&instrument.symbol_id) {
            Some(pos) => {
                let total_amount = pos.amount + amount;
                pos.avg_price = (pos.avg_price * pos.amount + price * amount) / total_amount;
                pos.amount = total_amount;
                pos.clone()
            }
            None => {
                let pos = Position::open(instrument, amount, price);
                self.positions.push(pos.clone());
                pos
            }
        };

        debug!(symbol = %instrument.symbol_id, amount, price, "Buy filled");
        self.persist();

        Ok(Fill {
            symbol_id: instrument.symbol_id.clone(),
            side: TradeSide::Buy,
            amount,
            price,
            value: cost,
            cash_balance: self.cash_balance,
            position: Some(position),
        })
    }

    /// Sell `amount` units of an open position at the current price.
    pub fn sell(
        &mut self,
        symbol_id: &str,
        amount: f64,
        prices: &dyn PriceLookup,
    ) -> Result<Fill, TradeError> {
        validate_amount(amount)?;

        let idx = self
            .index_of(symbol_id)
            .ok_or_else(|| TradeError::NoPosition(symbol_id.to_string()))?;

        let held = self.positions[idx].amount;
        if held < amount {
            return Err(TradeError::InsufficientAmount {
                requested: amount,
                held,
            });
        }

        let price = execution_price(symbol_id, prices)?;
        let proceeds = amount * price;
        self.cash_balance += proceeds;

        let remaining = held - amount;
        let position = if remaining < self.dust_epsilon {
            self.positions.remove(idx);
            None
        } else {
            self.positions[idx].amount = remaining;
            Some(self.positions[idx].clone())
        };

        debug!(symbol = %symbol_id, amount, price, closed = position.is_none(), "Sell filled");
        self.persist();

        Ok(Fill {
            symbol_id: symbol_id.to_string(),
            side: TradeSide::Sell,
            amount,
            price,
            value: proceeds,
            cash_balance: self.cash_balance,
            position,
        })
    }

    /// Liquidate a whole position at the current price.
    ///
    /// Returns `None` without touching anything if no position has `id`.
    pub fn close(&mut self, id: PositionId, prices: &dyn PriceLookup) -> Option<Fill> {
        let idx = self.positions.iter().position(|p| p.id == id)?;
        let position = self.positions.remove(idx);

        let price = prices.price_of(&position.symbol_id);
        let proceeds = position.amount * price;
        self.cash_balance += proceeds;

        debug!(symbol = %position.symbol_id, amount = position.amount, price, "Position closed");
        self.persist();

        Some(Fill {
            symbol_id: position.symbol_id,
            side: TradeSide::Sell,
            amount: position.amount,
            price,
            value: proceeds,
            cash_balance: self.cash_balance,
            position: None,
        })
    }

    /// Start over with `capital` in cash and no positions.
    pub fn reset(&mut self, capital: f64) -> Result<(), TradeError> {
        validate_amount(capital)?;

        self.cash_balance = capital;
        self.initial_capital = capital;
        self.positions.clear();

        info!(capital, "Portfolio reset");
        self.persist();
        Ok(())
    }

    /// Cash plus the market value of every open position.
    pub fn portfolio_value(&self, prices: &dyn PriceLookup) -> f64 {
        self.cash_balance
            + self
                .positions
                .iter()
                .map(|p| p.amount * prices.price_of(&p.symbol_id))
                .sum::<f64>()
    }

    /// Portfolio value relative to the initial capital.
    pub fn unrealized_pnl(&self, prices: &dyn PriceLookup) -> f64 {
        self.portfolio_value(prices) - self.initial_capital
    }

    /// Unrealized P&L as a percentage of initial capital, 0 without capital.
    pub fn pnl_percent(&self, prices: &dyn PriceLookup) -> f64 {
        if self.initial_capital > 0.0 {
            (self.unrealized_pnl(prices) / self.initial_capital) * 100.0
        } else {
            0.0
        }
    }

    /// Every open position valued at current prices.
    pub fn valued_positions(&self, prices: &dyn PriceLookup) -> Vec<PositionView> {
        self.positions
            .iter()
            .map(|p| p.with_price(prices.price_of(&p.symbol_id)))
            .collect()
    }

    pub fn summary(&self, prices: &dyn PriceLookup) -> PortfolioSummary {
        PortfolioSummary::from_ledger(self, prices)
    }

    pub fn cash_balance(&self) -> f64 {
        self.cash_balance
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Find the open position for a symbol.
    pub fn position(&self, symbol_id: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol_id == symbol_id)
    }

    pub fn position_by_id(&self, id: PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    fn index_of(&self, symbol_id: &str) -> Option<usize> {
        self.positions.iter().position(|p| p.symbol_id == symbol_id)
    }

    fn find_mut(&mut self, symbol_id: &str) -> Option<&mut Position> {
        self.positions.iter_mut().find(|p| p.symbol_id == symbol_id)
    }

    /// Write the current state out. Failures are logged and left for the next save to repair.
    fn persist(&mut self) {
        if let Err(e) = self
            .store
            .save(self.cash_balance, self.initial_capital, &self.positions)
        {
            warn!("Failed to persist portfolio: {}", e);
        }
    }
}

fn validate_amount(amount: f64) -> Result<(), TradeError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(TradeError::InvalidAmount(amount))
    }
}

fn execution_price(symbol_id: &str, prices: &dyn PriceLookup) -> Result<f64, TradeError> {
    let price = prices.price_of(symbol_id);
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(TradeError::Unpriced(symbol_id.to_string()))
    }
}
