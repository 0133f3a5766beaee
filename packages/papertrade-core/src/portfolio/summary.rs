//! Portfolio performance summary.

use super::PortfolioLedger;
use crate::market::PriceLookup;
use serde::{Deserialize, Serialize};

/// Aggregate view of the portfolio at current prices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSummary {
    /// Total cost basis of all positions
    pub total_cost: f64,
    /// Market value of all positions
    pub total_market_value: f64,
    /// Unrealized gain/loss of the open positions
    pub positions_pnl: f64,
    /// Unrealized gain/loss of the open positions as a percentage of their cost
    pub positions_pnl_percent: f64,
    /// Cash balance
    pub cash: f64,
    /// Number of positions
    pub position_count: usize,
    /// Number of positions with gains
    pub positions_in_profit: usize,
    /// Number of positions with losses
    pub positions_in_loss: usize,
}

impl PortfolioSummary {
    /// Summarize a ledger against `prices`.
    pub fn from_ledger(ledger: &PortfolioLedger, prices: &dyn PriceLookup) -> Self {
        let views = ledger.valued_positions(prices);

        let total_cost: f64 = views.iter().map(|v| v.position.total_cost()).sum();
        let total_market_value: f64 = views.iter().map(|v| v.market_value).sum();
        let positions_pnl = total_market_value - total_cost;
        let positions_pnl_percent = if total_cost > 0.0 {
            (positions_pnl / total_cost) * 100.0
        } else {
            0.0
        };

        Self {
            total_cost,
            total_market_value,
            positions_pnl,
            positions_pnl_percent,
            cash: ledger.cash_balance(),
            position_count: views.len(),
            positions_in_profit: views.iter().filter(|v| v.unrealized_pnl > 0.0).count(),
            positions_in_loss: views.iter().filter(|v| v.unrealized_pnl < 0.0).count(),
        }
    }
}
