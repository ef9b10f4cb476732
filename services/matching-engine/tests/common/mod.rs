#![allow(dead_code)]

use matching_engine::{EngineConfig, MatchingEngine, OrderRequest, PlacedOrder};
use rust_decimal::Decimal;
use tempfile::TempDir;
use types::prelude::*;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn open_engine(dir: &TempDir) -> MatchingEngine {
    init_tracing();
    MatchingEngine::open(EngineConfig::new(dir.path())).unwrap()
}

pub fn funded_account(engine: &MatchingEngine, cash: u64) -> AccountId {
    let id = engine.open_account().unwrap();
    if cash > 0 {
        engine.deposit(id, Decimal::from(cash)).unwrap();
    }
    id
}

pub fn tradable_holding(engine: &MatchingEngine, owner: AccountId, symbol: &str) -> HoldingId {
    let holding = engine
        .register_holding(owner, symbol, HoldingStatus::Authenticating)
        .unwrap();
    engine
        .set_custody_status(holding.holding_id, HoldingStatus::Tradable)
        .unwrap()
        .holding_id
}

pub fn buy(engine: &MatchingEngine, account: AccountId, symbol: &str, price: u64, qty: u64) -> PlacedOrder {
    engine
        .place_order(OrderRequest::buy(account, symbol, Decimal::from(price), qty))
        .unwrap()
}

pub fn sell(engine: &MatchingEngine, account: AccountId, symbol: &str, price: u64, holding: HoldingId) -> PlacedOrder {
    engine
        .place_order(OrderRequest::sell(account, symbol, Decimal::from(price), holding))
        .unwrap()
}

pub fn cash(engine: &MatchingEngine, account: AccountId) -> (Decimal, Decimal) {
    let a = engine.account(account).unwrap();
    (a.available_cash, a.locked_cash)
}

pub fn dollars(amount: u64) -> Decimal {
    Decimal::from(amount)
}
