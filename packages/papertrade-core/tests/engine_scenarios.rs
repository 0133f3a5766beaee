//! End-to-end trading scenarios against a seeded engine.

use approx::assert_relative_eq;
use papertrade_core::{
    Category, EngineConfig, Instrument, JsonFileStore, MemoryStore, PersistenceGateway, Position,
    TradeError, TradingEngine,
};
use tempfile::tempdir;

fn seeded(seed: u64) -> EngineConfig {
    EngineConfig {
        seed: Some(seed),
        ..Default::default()
    }
}

#[test]
fn test_buy_then_sell_btc_at_base_price() {
    let engine = TradingEngine::new(seeded(1), MemoryStore::new());
    assert_eq!(engine.price("BTC/USD"), 45000.0);

    let fill = engine.buy("BTC/USD", 0.1).unwrap();
    assert_relative_eq!(fill.value, 4500.0);
    assert_relative_eq!(engine.cash_balance(), 5500.0);

    let positions = engine.positions();
    assert_eq!(positions.len(), 1);
    assert_relative_eq!(positions[0].amount, 0.1);
    assert_relative_eq!(positions[0].avg_price, 45000.0);

    engine.sell("BTC/USD", 0.1).unwrap();
    assert_relative_eq!(engine.cash_balance(), 10000.0);
    assert!(engine.positions().is_empty());
    assert_eq!(
        engine.sell("BTC/USD", 0.1),
        Err(TradeError::NoPosition("BTC/USD".to_string()))
    );
}

#[test]
fn test_oversized_buy_rejected() {
    let engine = TradingEngine::new(seeded(1), MemoryStore::new());

    let result = engine.buy("BTC/USD", 10000.0);

    assert!(matches!(
        result,
        Err(TradeError::InsufficientBalance { needed, .. }) if needed == 450_000_000.0
    ));
    assert_eq!(engine.cash_balance(), 10000.0);
    assert!(engine.positions().is_empty());
}

#[test]
fn test_weighted_average_across_ticks() {
    let engine = TradingEngine::new(seeded(9), MemoryStore::new());

    let p1 = engine.price("AAPL");
    engine.buy("AAPL", 4.0).unwrap();
    for _ in 0..15 {
        engine.tick();
    }
    let p2 = engine.price("AAPL");
    engine.buy("AAPL", 6.0).unwrap();

    let position = engine.position("AAPL").unwrap();
    assert_relative_eq!(position.amount, 10.0);
    assert_relative_eq!(position.avg_price, (4.0 * p1 + 6.0 * p2) / 10.0, epsilon = 1e-9);
}

#[test]
fn test_random_trading_never_overdraws() {
    let engine = TradingEngine::new(seeded(1234), MemoryStore::new());
    let symbols: Vec<String> = engine
        .instruments()
        .into_iter()
        .map(|i| i.symbol_id)
        .collect();

    for step in 0..400usize {
        engine.tick();
        let symbol = &symbols[step % symbols.len()];
        let before = engine.portfolio_value();

        let amount = match step % 3 {
            0 => 2000.0 / engine.price(symbol),
            1 => 50000.0 / engine.price(symbol),
            _ => engine.position(symbol).map(|p| p.amount / 2.0).unwrap_or(1.0),
        };
        let result = if step % 3 == 2 {
            engine.sell(symbol, amount)
        } else {
            engine.buy(symbol, amount)
        };

        assert!(engine.cash_balance() >= 0.0, "step {step}: {result:?}");
        assert_relative_eq!(engine.portfolio_value(), before, epsilon = 1e-6);
    }
}

#[test]
fn test_reset_clears_everything() {
    let engine = TradingEngine::new(seeded(3), MemoryStore::new());
    engine.buy("ETH/USD", 1.0).unwrap();
    engine.buy("EUR/USD", 1000.0).unwrap();
    for _ in 0..5 {
        engine.tick();
    }

    engine.reset(50000.0).unwrap();

    assert!(engine.positions().is_empty());
    assert_eq!(engine.cash_balance(), 50000.0);
    assert_eq!(engine.initial_capital(), 50000.0);
    assert_eq!(engine.pnl(), 0.0);
    assert_eq!(engine.reset(-1.0), Err(TradeError::InvalidAmount(-1.0)));
}

#[test]
fn test_history_bounded_after_many_ticks() {
    let engine = TradingEngine::new(seeded(5), MemoryStore::new());
    for _ in 0..500 {
        engine.tick();
    }
    for instrument in engine.instruments() {
        assert!(engine.chart_data(&instrument.symbol_id).len() <= 50);
    }
}

#[test]
fn test_file_store_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("portfolio.json");

    let (cash, amount) = {
        let engine = TradingEngine::new(seeded(8), JsonFileStore::open(&path));
        for _ in 0..3 {
            engine.tick();
        }
        engine.buy("TSLA", 7.5).unwrap();
        engine.buy("NDX", 0.2).unwrap();
        engine.sell("TSLA", 2.5).unwrap();
        (engine.cash_balance(), engine.position("TSLA").unwrap().amount)
    };

    let engine = TradingEngine::new(seeded(8), JsonFileStore::open(&path));
    assert_relative_eq!(engine.cash_balance(), cash);
    assert_relative_eq!(engine.position("TSLA").unwrap().amount, amount);
    assert!(engine.position("NDX").is_some());
    assert_eq!(engine.initial_capital(), 10000.0);
}

#[test]
fn test_zero_cash_portfolio_reloads_as_zero() {
    let mut store = MemoryStore::new();
    let spx = Instrument::new("SPX", "S&P 500", Category::Index, 4750.0);
    store
        .save(0.0, 10000.0, &[Position::open(&spx, 2.0, 5000.0)])
        .unwrap();

    let engine = TradingEngine::new(seeded(2), store);

    assert_eq!(engine.cash_balance(), 0.0);
    assert_eq!(engine.positions().len(), 1);
    assert!(matches!(
        engine.buy("SPX", 0.001),
        Err(TradeError::InsufficientBalance { .. })
    ));
}

#[test]
fn test_negative_legacy_balance_never_reaches_engine() {
    let mut store = MemoryStore::new();
    store
        .store_number(papertrade_core::persistence::KEY_BALANCE, -500.0)
        .unwrap();

    let engine = TradingEngine::new(seeded(12), store);
    assert_eq!(engine.cash_balance(), 10000.0);
    assert_eq!(engine.initial_capital(), 10000.0);
}
