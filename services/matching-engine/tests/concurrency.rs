//! Many callers at once, and ledger-wide conservation properties.

mod common;

use common::*;
use matching_engine::{EngineConfig, MatchingEngine, OrderRequest};
use persistence::FsyncPolicy;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use types::prelude::*;

fn fast_engine(dir: &TempDir) -> MatchingEngine {
    init_tracing();
    MatchingEngine::open(EngineConfig {
        fsync: FsyncPolicy::EveryN(10_000),
        snapshot_interval: 0,
        ..EngineConfig::new(dir.path())
    })
    .unwrap()
}

/// Everything that must hold between any two commits.
fn assert_ledger_consistent(engine: &MatchingEngine, accounts: &[AccountId], deposited: Decimal) {
    let mut total = Decimal::ZERO;
    for id in accounts {
        let account = engine.account(*id).unwrap();
        assert!(account.check_invariant());
        let escrow: Decimal = engine.open_orders(*id).iter().map(|o| o.locked_value()).sum();
        assert_eq!(account.locked_cash, escrow, "escrow mismatch for {id}");
        total += account.total_cash();
    }
    assert_eq!(total, deposited, "cash created or destroyed");

    let mut listings: HashMap<HoldingId, usize> = HashMap::new();
    for id in accounts {
        for order in engine.open_orders(*id) {
            assert!(order.check_invariant());
            if let Some(holding) = order.holding_id {
                *listings.entry(holding).or_default() += 1;
            }
        }
        for holding in engine.holdings_of(*id) {
            let open = listings.get(&holding.holding_id).copied().unwrap_or(0);
            if holding.status == HoldingStatus::Listed {
                assert_eq!(open, 1, "listed holding without exactly one open sell");
            }
        }
    }
    assert!(listings.values().all(|count| *count == 1));

    let trades = engine.trades_since(0);
    for (i, trade) in trades.iter().enumerate() {
        assert_eq!(trade.sequence, i as u64 + 1);
        assert_ne!(trade.buyer, trade.seller);
    }
}

#[test]
fn concurrent_buyers_never_share_a_unit() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(fast_engine(&dir));

    let mut sellers = Vec::new();
    for _ in 0..16 {
        let seller = funded_account(&engine, 0);
        let holding = tradable_holding(&engine, seller, "X");
        sell(&engine, seller, "X", 100, holding);
        sellers.push(seller);
    }
    let buyers: Vec<AccountId> = (0..8).map(|_| funded_account(&engine, 1_000)).collect();

    let handles: Vec<_> = buyers
        .iter()
        .map(|buyer| {
            let engine = Arc::clone(&engine);
            let buyer = *buyer;
            thread::spawn(move || {
                let mut bought = 0;
                for _ in 0..4 {
                    let placed = engine
                        .place_order(OrderRequest::buy(buyer, "X", Decimal::from(100), 1))
                        .unwrap();
                    bought += placed.trades.len();
                }
                bought
            })
        })
        .collect();
    let bought: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let trades = engine.trades_since(0);
    assert_eq!(trades.len(), bought);
    let mut units: Vec<HoldingId> = trades.iter().map(|t| t.holding_id).collect();
    units.sort();
    units.dedup();
    assert_eq!(units.len(), trades.len(), "a unit was sold twice");

    for trade in &trades {
        assert_eq!(engine.holding(trade.holding_id).unwrap().owner, trade.buyer);
    }

    let accounts: Vec<AccountId> = sellers.iter().chain(buyers.iter()).copied().collect();
    assert_ledger_consistent(&engine, &accounts, Decimal::from(8_000));
}

#[test]
fn concurrent_cancel_and_match_settle_once() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(fast_engine(&dir));
    let seller = funded_account(&engine, 0);
    let buyer = funded_account(&engine, 10_000);

    let mut asks = Vec::new();
    for _ in 0..20 {
        let holding = tradable_holding(&engine, seller, "X");
        asks.push(sell(&engine, seller, "X", 50, holding).order_id());
    }

    let canceller = {
        let engine = Arc::clone(&engine);
        let asks = asks.clone();
        thread::spawn(move || {
            let mut cancelled = 0;
            for order_id in asks.iter().rev() {
                match engine.cancel_order(*order_id, seller) {
                    Ok(_) => cancelled += 1,
                    Err(EngineError::NotOpen { .. }) => {}
                    Err(other) => panic!("unexpected cancel failure: {other}"),
                }
            }
            cancelled
        })
    };
    let taker = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            (0..20)
                .map(|_| {
                    engine
                        .place_order(OrderRequest::buy(buyer, "X", Decimal::from(50), 1))
                        .unwrap()
                        .trades
                        .len()
                })
                .sum::<usize>()
        })
    };
    let cancelled = canceller.join().unwrap();
    let filled = taker.join().unwrap();

    let open = asks
        .iter()
        .filter(|id| engine.order(**id).unwrap().is_open())
        .count();
    assert_eq!(open + cancelled + filled, asks.len());
    assert_eq!(engine.account(seller).unwrap().available_cash, Decimal::from(50 * filled as u64));
    assert_ledger_consistent(&engine, &[seller, buyer], Decimal::from(10_000));
}

#[test]
fn independent_symbols_trade_in_parallel() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(fast_engine(&dir));

    let handles: Vec<_> = ["A", "B", "C", "D"]
        .into_iter()
        .map(|symbol| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let seller = funded_account(&engine, 0);
                let buyer = funded_account(&engine, 1_000);
                for price in 1..=5u64 {
                    let holding = tradable_holding(&engine, seller, symbol);
                    sell(&engine, seller, symbol, price * 10, holding);
                    assert_eq!(buy(&engine, buyer, symbol, price * 10, 1).trades.len(), 1);
                }
                (seller, buyer)
            })
        })
        .collect();

    let mut accounts = Vec::new();
    for handle in handles {
        let (seller, buyer) = handle.join().unwrap();
        assert_eq!(engine.account(seller).unwrap().available_cash, Decimal::from(150));
        accounts.extend([seller, buyer]);
    }
    for symbol in ["A", "B", "C", "D"] {
        assert_eq!(engine.market(&Symbol::new(symbol)).unwrap().volume, 5);
    }
    assert_ledger_consistent(&engine, &accounts, Decimal::from(4_000));
}

#[derive(Debug, Clone)]
enum Op {
    Buy { trader: usize, price: u64, qty: u64 },
    Sell { trader: usize, price: u64 },
    Cancel { trader: usize, nth: usize },
    Recall { nth: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..4usize, 1..20u64, 1..4u64).prop_map(|(trader, price, qty)| Op::Buy { trader, price, qty }),
        (0..4usize, 1..20u64).prop_map(|(trader, price)| Op::Sell { trader, price }),
        (0..4usize, 0..4usize).prop_map(|(trader, nth)| Op::Cancel { trader, nth }),
        (0..8usize).prop_map(|nth| Op::Recall { nth }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_operation_sequence_conserves_cash_and_units(ops in prop::collection::vec(op(), 1..40)) {
        let dir = TempDir::new().unwrap();
        let engine = fast_engine(&dir);
        let traders: Vec<AccountId> = (0..4).map(|_| funded_account(&engine, 200)).collect();
        let mut units = Vec::new();
        for trader in &traders {
            for _ in 0..2 {
                units.push(tradable_holding(&engine, *trader, "X"));
            }
        }

        for op in ops {
            match op {
                Op::Buy { trader, price, qty } => {
                    let _ = engine.place_order(OrderRequest::buy(traders[trader], "X", Decimal::from(price), qty));
                }
                Op::Sell { trader, price } => {
                    let owned = engine
                        .holdings_of(traders[trader])
                        .into_iter()
                        .find(|h| h.status == HoldingStatus::Tradable);
                    if let Some(holding) = owned {
                        engine
                            .place_order(OrderRequest::sell(traders[trader], "X", Decimal::from(price), holding.holding_id))
                            .unwrap();
                    }
                }
                Op::Cancel { trader, nth } => {
                    if let Some(order) = engine.open_orders(traders[trader]).get(nth) {
                        engine.cancel_order(order.order_id, traders[trader]).unwrap();
                    }
                }
                Op::Recall { nth } => {
                    let _ = engine.set_custody_status(units[nth], HoldingStatus::Withdrawn);
                }
            }
            assert_ledger_consistent(&engine, &traders, Decimal::from(800));
        }

        let owned: usize = traders.iter().map(|t| engine.holdings_of(*t).len()).sum();
        prop_assert_eq!(owned, units.len());
    }
}
