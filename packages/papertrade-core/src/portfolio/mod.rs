//! Portfolio module.
//!
//! Provides the cash/position ledger and its performance summary.

mod ledger;
mod summary;

pub use ledger::{PortfolioLedger, DEFAULT_DUST_EPSILON};
pub use summary::PortfolioSummary;
