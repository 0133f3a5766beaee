//! Trading engine: owns the simulated market and the portfolio ledger.
//!
//! Price state and portfolio state sit behind one mutex, so a tick can never
//! interleave with a command. The engine is cheap to clone; clones share
//! the same state.

use crate::config::EngineConfig;
use crate::market::{list_instruments, PriceSimulator};
use crate::persistence::PersistenceGateway;
use crate::portfolio::{PortfolioLedger, PortfolioSummary};
use crate::types::{ChartPoint, Fill, Instrument, Position, PositionId, PositionView};
use crate::TradeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};

#[derive(Debug)]
struct Core {
    simulator: PriceSimulator,
    ledger: PortfolioLedger,
}

/// Composition root for the simulated market and the portfolio.
#[derive(Debug, Clone)]
pub struct TradingEngine {
    core: Arc<Mutex<Core>>,
    revision: Arc<watch::Sender<u64>>,
    config: EngineConfig,
}

/// Consistent read of the whole portfolio at one instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSnapshot {
    pub cash_balance: f64,
    pub initial_capital: f64,
    pub positions: Vec<PositionView>,
    pub portfolio_value: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    /// Simulation ticks so far
    pub ticks: u64,
    /// Change counter, see [`TradingEngine::subscribe`]
    pub revision: u64,
}

impl TradingEngine {
    /// Create an engine over the built-in instrument catalog.
    pub fn new<S>(config: EngineConfig, store: S) -> Self
    where
        S: PersistenceGateway + 'static,
    {
        Self::with_instruments(config, store, &list_instruments())
    }

    /// Create an engine over a caller-supplied catalog.
    ///
    /// Portfolio state is restored from `store`; anything missing or
    /// malformed falls back to a fresh portfolio of `config.initial_capital`.
    pub fn with_instruments<S>(config: EngineConfig, store: S, instruments: &[Instrument]) -> Self
    where
        S: PersistenceGateway + 'static,
    {
        let mut simulator =
            PriceSimulator::new(config.history_capacity, config.tick_interval(), config.seed);
        simulator.initialize(instruments);

        let ledger = PortfolioLedger::open(store, config.initial_capital, config.dust_epsilon);
        let (revision, _) = watch::channel(0);

        info!(
            instruments = instruments.len(),
            tick_ms = config.tick_interval_ms,
            "Trading engine initialized"
        );

        Self {
            core: Arc::new(Mutex::new(Core { simulator, ledger })),
            revision: Arc::new(revision),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Advance every price by one simulation step.
    pub fn tick(&self) {
        let ticks = {
            let mut core = self.lock();
            core.simulator.tick();
            core.simulator.tick_count()
        };
        trace!(tick = ticks, "Prices advanced");
        self.bump();
    }

    /// Current price of a symbol, 0 if unknown.
    pub fn price(&self, symbol_id: &str) -> f64 {
        self.lock().simulator.current_price(symbol_id)
    }

    /// Price history of a symbol for charting, stamped from now.
    pub fn chart_data(&self, symbol_id: &str) -> Vec<ChartPoint> {
        self.chart_data_at(symbol_id, Utc::now())
    }

    /// Price history of a symbol with the time axis starting at `origin`.
    pub fn chart_data_at(&self, symbol_id: &str, origin: DateTime<Utc>) -> Vec<ChartPoint> {
        self.lock().simulator.history(symbol_id, origin).iter().collect()
    }

    pub fn portfolio_value(&self) -> f64 {
        let core = self.lock();
        core.ledger.portfolio_value(&core.simulator)
    }

    /// Unrealized P&L against the initial capital.
    pub fn pnl(&self) -> f64 {
        let core = self.lock();
        core.ledger.unrealized_pnl(&core.simulator)
    }

    pub fn pnl_percent(&self) -> f64 {
        let core = self.lock();
        core.ledger.pnl_percent(&core.simulator)
    }

    /// Buy `amount` units of `symbol_id` at the current price.
    pub fn buy(&self, symbol_id: &str, amount: f64) -> Result<Fill, TradeError> {
        let fill = {
            let mut guard = self.lock();
            let core = &mut *guard;
            let instrument = core
                .simulator
                .instrument(symbol_id)
                .cloned()
                .ok_or_else(|| TradeError::UnknownInstrument(symbol_id.to_string()))?;
            core.ledger.buy(&instrument, amount, &core.simulator)?
        };
        self.bump();
        Ok(fill)
    }

    /// Sell `amount` units of the open position in `symbol_id`.
    pub fn sell(&self, symbol_id: &str, amount: f64) -> Result<Fill, TradeError> {
        let fill = {
            let mut guard = self.lock();
            let core = &mut *guard;
            core.ledger.sell(symbol_id, amount, &core.simulator)?
        };
        self.bump();
        Ok(fill)
    }

    /// Liquidate one position. Returns `None` if it was already gone.
    pub fn close(&self, id: PositionId) -> Option<Fill> {
        let fill = {
            let mut guard = self.lock();
            let core = &mut *guard;
            core.ledger.close(id, &core.simulator)?
        };
        self.bump();
        Some(fill)
    }

    /// Drop every position and start again with `capital` in cash.
    pub fn reset(&self, capital: f64) -> Result<(), TradeError> {
        self.lock().ledger.reset(capital)?;
        self.bump();
        Ok(())
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let core = self.lock();
        let prices = &core.simulator;
        EngineSnapshot {
            cash_balance: core.ledger.cash_balance(),
            initial_capital: core.ledger.initial_capital(),
            positions: core.ledger.valued_positions(prices),
            portfolio_value: core.ledger.portfolio_value(prices),
            pnl: core.ledger.unrealized_pnl(prices),
            pnl_percent: core.ledger.pnl_percent(prices),
            ticks: core.simulator.tick_count(),
            revision: *self.revision.borrow(),
        }
    }

    pub fn summary(&self) -> PortfolioSummary {
        let core = self.lock();
        core.ledger.summary(&core.simulator)
    }

    pub fn cash_balance(&self) -> f64 {
        self.lock().ledger.cash_balance()
    }

    pub fn initial_capital(&self) -> f64 {
        self.lock().ledger.initial_capital()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.lock().ledger.positions().to_vec()
    }

    pub fn position(&self, symbol_id: &str) -> Option<Position> {
        self.lock().ledger.position(symbol_id).cloned()
    }

    pub fn instruments(&self) -> Vec<Instrument> {
        self.lock().simulator.instruments().to_vec()
    }

    pub fn instrument(&self, symbol_id: &str) -> Option<Instrument> {
        self.lock().simulator.instrument(symbol_id).cloned()
    }

    pub fn tick_count(&self) -> u64 {
        self.lock().simulator.tick_count()
    }

    /// Watch the change counter.
    ///
    /// The counter goes up after every tick and every accepted command, so a
    /// display layer can redraw on change instead of polling.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Drive [`tick`](Self::tick) on the configured interval.
    ///
    /// Must be called from within a Tokio runtime. The first tick fires one
    /// interval after the call.
    pub fn spawn_ticker(&self) -> TickerHandle {
        let period = self.config.tick_interval().max(Duration::from_millis(1));
        let engine = self.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => engine.tick(),
                }
            }
            debug!("Ticker loop exited");
        });

        info!(?period, "Ticker started");
        TickerHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

/// Handle to a running ticker.
///
/// Dropping the handle aborts the ticker; [`shutdown`](Self::shutdown) stops
/// it and waits for the task to finish.
#[derive(Debug)]
pub struct TickerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TickerHandle {
    /// Stop ticking and wait until the loop has exited.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("Ticker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::types::Category;
    use approx::assert_relative_eq;

    fn engine() -> TradingEngine {
        let config = EngineConfig {
            seed: Some(17),
            ..Default::default()
        };
        TradingEngine::new(config, MemoryStore::new())
    }

    #[test]
    fn test_fresh_engine_defaults() {
        let engine = engine();
        assert_eq!(engine.cash_balance(), 10000.0);
        assert_eq!(engine.initial_capital(), 10000.0);
        assert!(engine.positions().is_empty());
        assert_eq!(engine.instruments().len(), 8);
        assert_eq!(engine.price("BTC/USD"), 45000.0);
        assert_eq!(engine.pnl(), 0.0);
    }

    #[test]
    fn test_buy_unknown_instrument() {
        let engine = engine();
        assert_eq!(
            engine.buy("DOGE/USD", 1.0),
            Err(TradeError::UnknownInstrument("DOGE/USD".to_string()))
        );
        assert_eq!(engine.price("DOGE/USD"), 0.0);
    }

    #[test]
    fn test_trade_at_current_price() {
        let engine = engine();
        for _ in 0..10 {
            engine.tick();
        }
        let price = engine.price("ETH/USD");

        let fill = engine.buy("ETH/USD", 1.5).unwrap();

        assert_eq!(fill.price, price);
        assert_relative_eq!(engine.cash_balance(), 10000.0 - 1.5 * price);
        assert_relative_eq!(engine.portfolio_value(), 10000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pnl_follows_price() {
        let engine = engine();
        engine.buy("BTC/USD", 0.1).unwrap();
        for _ in 0..20 {
            engine.tick();
        }

        let price = engine.price("BTC/USD");
        let expected = 0.1 * (price - 45000.0);
        assert_relative_eq!(engine.pnl(), expected, epsilon = 1e-6);
        assert_relative_eq!(engine.pnl_percent(), expected / 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_close_through_engine() {
        let engine = engine();
        engine.buy("AAPL", 10.0).unwrap();
        let id = engine.position("AAPL").unwrap().id;

        let fill = engine.close(id).unwrap();
        assert_eq!(fill.amount, 10.0);
        assert!(engine.close(id).is_none());
        assert!(engine.positions().is_empty());
    }

    #[test]
    fn test_chart_data() {
        let engine = engine();
        for _ in 0..60 {
            engine.tick();
        }
        let origin = Utc::now();
        let chart = engine.chart_data_at("SPX", origin);

        assert_eq!(chart.len(), 50);
        assert_eq!(chart[0].timestamp, origin);
        assert_eq!(chart.last().unwrap().price, engine.price("SPX"));
        assert!(engine.chart_data("NOPE").is_empty());
    }

    #[test]
    fn test_chart_data_with_huge_interval_does_not_panic() {
        let config = EngineConfig {
            tick_interval_ms: 1_000_000_000_000_000,
            seed: Some(3),
            ..Default::default()
        };
        let engine = TradingEngine::new(config, MemoryStore::new());
        for _ in 0..49 {
            engine.tick();
        }

        let chart = engine.chart_data("BTC/USD");
        assert!(!chart.is_empty());
        assert!(chart.len() < 50);
        engine.tick();
        assert_eq!(engine.tick_count(), 50);
    }

    #[test]
    fn test_snapshot() {
        let engine = engine();
        engine.buy("BTC/USD", 0.1).unwrap();
        engine.tick();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.positions.len(), 1);
        assert_eq!(snapshot.ticks, 1);
        assert_relative_eq!(
            snapshot.portfolio_value,
            snapshot.cash_balance + snapshot.positions[0].market_value
        );
        assert_relative_eq!(snapshot.pnl, snapshot.portfolio_value - 10000.0);
    }

    #[test]
    fn test_revision_bumps_on_change_only() {
        let engine = engine();
        let rx = engine.subscribe();
        assert_eq!(*rx.borrow(), 0);

        engine.tick();
        engine.buy("AAPL", 1.0).unwrap();
        assert_eq!(*rx.borrow(), 2);

        let _ = engine.buy("AAPL", 1e9);
        let _ = engine.sell("TSLA", 1.0);
        assert!(engine.close(PositionId::new()).is_none());
        assert_eq!(*rx.borrow(), 2);

        engine.reset(5000.0).unwrap();
        assert_eq!(*rx.borrow(), 3);
        assert_eq!(engine.snapshot().revision, 3);
    }

    #[test]
    fn test_engine_restores_persisted_state() {
        let store = MemoryStore::new();
        {
            let engine = TradingEngine::new(EngineConfig::default(), store.clone());
            engine.buy("BTC/USD", 0.1).unwrap();
        }

        let engine = TradingEngine::new(EngineConfig::default(), store);
        assert_relative_eq!(engine.cash_balance(), 5500.0);
        let position = engine.position("BTC/USD").unwrap();
        assert_relative_eq!(position.amount, 0.1);
        assert_relative_eq!(position.avg_price, 45000.0);
    }

    #[test]
    fn test_custom_catalog() {
        let catalog = [Instrument::new("XYZ", "Xyz Corp", Category::Stock, 10.0)];
        let engine =
            TradingEngine::with_instruments(EngineConfig::default(), MemoryStore::new(), &catalog);

        assert_eq!(engine.instruments(), catalog.to_vec());
        engine.buy("XYZ", 100.0).unwrap();
        assert!(engine.buy("BTC/USD", 0.1).is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let engine = engine();
        let other = engine.clone();
        other.buy("TSLA", 2.0).unwrap();
        assert!(engine.position("TSLA").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_drives_ticks() {
        let engine = engine();
        let ticker = engine.spawn_ticker();
        assert!(ticker.is_running());

        tokio::time::sleep(Duration::from_millis(6100)).await;
        assert_eq!(engine.tick_count(), 3);

        ticker.shutdown().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(engine.tick_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_ticker_stops_it() {
        let engine = engine();
        let ticker = engine.spawn_ticker();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        drop(ticker);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(engine.tick_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_wakes_on_tick() {
        let engine = engine();
        let mut rx = engine.subscribe();
        let ticker = engine.spawn_ticker();

        rx.changed().await.unwrap();
        assert_eq!(engine.tick_count(), 1);

        ticker.shutdown().await;
    }
}
