//! Ledger State: the committed store and its redo records
//!
//! `LedgerState` is everything the engine has ever committed: balances,
//! holdings, orders, trades and derived market data. It only changes by
//! applying `Mutation` batches, which is also exactly what the journal
//! stores, so replaying the journal over a snapshot reproduces the state
//! that existed before a crash.
//!
//! All maps are `BTreeMap` so serialization (and therefore the snapshot
//! hash) is deterministic.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;
use types::prelude::*;

/// Default cap on retained price ticks per symbol.
pub const DEFAULT_PRICE_HISTORY_LIMIT: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Trade sequence gap: expected {expected}, got {actual}")]
    TradeSequence { expected: u64, actual: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// One record of a committed transaction. A batch of these is the journal
/// payload of one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    PutAccount(Account),
    PutHolding(Holding),
    PutOrder(Order),
    AppendTrade(Trade),
    PutMarket(MarketState),
    AppendTick(PriceTick),
}

impl Mutation {
    pub fn encode_batch(batch: &[Mutation]) -> Result<Vec<u8>, StateError> {
        bincode::serialize(batch).map_err(|e| StateError::Serialization(e.to_string()))
    }

    pub fn decode_batch(bytes: &[u8]) -> Result<Vec<Mutation>, StateError> {
        bincode::deserialize(bytes).map_err(|e| StateError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub accounts: BTreeMap<AccountId, Account>,
    pub holdings: BTreeMap<HoldingId, Holding>,
    /// Orders in every status; terminal orders are kept as history
    pub orders: BTreeMap<OrderId, Order>,
    /// Trade ledger in sequence order; `trades[i].sequence == i + 1`
    pub trades: Vec<Trade>,
    pub markets: BTreeMap<Symbol, MarketState>,
    pub price_history: BTreeMap<Symbol, VecDeque<PriceTick>>,
    pub price_history_limit: usize,
    /// Highest commit timestamp applied so far (Unix nanos)
    pub last_timestamp: i64,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self::empty()
    }
}

impl LedgerState {
    pub fn empty() -> Self {
        Self {
            accounts: BTreeMap::new(),
            holdings: BTreeMap::new(),
            orders: BTreeMap::new(),
            trades: Vec::new(),
            markets: BTreeMap::new(),
            price_history: BTreeMap::new(),
            price_history_limit: DEFAULT_PRICE_HISTORY_LIMIT,
            last_timestamp: 0,
        }
    }

    /// Sequence the next recorded trade will carry.
    pub fn next_trade_sequence(&self) -> u64 {
        self.trades.len() as u64 + 1
    }

    /// Apply one committed batch.
    ///
    /// Batches are validated before they are journaled, so the only check
    /// here is that the trade ledger stays gapless.
    pub fn apply_batch(&mut self, timestamp: i64, batch: &[Mutation]) -> Result<(), StateError> {
        for mutation in batch {
            self.apply(mutation)?;
        }
        self.last_timestamp = self.last_timestamp.max(timestamp);
        Ok(())
    }

    pub fn apply(&mut self, mutation: &Mutation) -> Result<(), StateError> {
        match mutation {
            Mutation::PutAccount(account) => {
                self.accounts.insert(account.account_id, account.clone());
            }
            Mutation::PutHolding(holding) => {
                self.holdings.insert(holding.holding_id, holding.clone());
            }
            Mutation::PutOrder(order) => {
                self.orders.insert(order.order_id, order.clone());
            }
            Mutation::AppendTrade(trade) => {
                let expected = self.next_trade_sequence();
                if trade.sequence != expected {
                    return Err(StateError::TradeSequence {
                        expected,
                        actual: trade.sequence,
                    });
                }
                self.trades.push(trade.clone());
            }
            Mutation::PutMarket(market) => {
                self.markets.insert(market.symbol.clone(), market.clone());
            }
            Mutation::AppendTick(tick) => {
                let history = self.price_history.entry(tick.symbol.clone()).or_default();
                history.push_back(tick.clone());
                while history.len() > self.price_history_limit.max(1) {
                    history.pop_front();
                }
            }
        }
        Ok(())
    }

    /// Compute a deterministic SHA-256 hash of the state.
    pub fn compute_hash(&self) -> Result<String, StateError> {
        let bytes =
            bincode::serialize(self).map_err(|e| StateError::Serialization(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn trade(sequence: u64) -> Trade {
        Trade {
            trade_id: TradeId::new(),
            sequence,
            symbol: Symbol::new("PSA10-CHARIZARD"),
            holding_id: HoldingId::new(),
            buyer: AccountId::new(),
            seller: AccountId::new(),
            buy_order_id: OrderId::new(),
            sell_order_id: OrderId::new(),
            taker_side: Side::BUY,
            price: Price::from_u64(8500),
            executed_at: sequence as i64,
        }
    }

    fn tick(sequence: u64) -> PriceTick {
        PriceTick {
            symbol: Symbol::new("PSA10-CHARIZARD"),
            price: Price::from_u64(100 + sequence),
            volume: sequence,
            trade_sequence: sequence,
            timestamp: sequence as i64,
        }
    }

    #[test]
    fn test_put_replaces_row() {
        let mut state = LedgerState::empty();
        let mut account = Account::new(AccountId::new(), 1);
        state.apply(&Mutation::PutAccount(account.clone())).unwrap();

        account.credit(Decimal::from(500), 2).unwrap();
        state.apply(&Mutation::PutAccount(account.clone())).unwrap();

        assert_eq!(state.accounts.len(), 1);
        assert_eq!(state.accounts[&account.account_id].available_cash, Decimal::from(500));
    }

    #[test]
    fn test_trade_sequence_must_be_gapless() {
        let mut state = LedgerState::empty();
        state.apply(&Mutation::AppendTrade(trade(1))).unwrap();
        assert_eq!(
            state.apply(&Mutation::AppendTrade(trade(3))),
            Err(StateError::TradeSequence {
                expected: 2,
                actual: 3
            })
        );
        assert_eq!(state.next_trade_sequence(), 2);
    }

    #[test]
    fn test_price_history_is_capped() {
        let mut state = LedgerState {
            price_history_limit: 3,
            ..LedgerState::empty()
        };
        for seq in 1..=5 {
            state.apply(&Mutation::AppendTick(tick(seq))).unwrap();
        }
        let history = &state.price_history[&Symbol::new("PSA10-CHARIZARD")];
        let seqs: Vec<u64> = history.iter().map(|t| t.trade_sequence).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn test_batch_encoding_and_timestamp() {
        let batch = vec![
            Mutation::PutAccount(Account::new(AccountId::new(), 10)),
            Mutation::AppendTrade(trade(1)),
        ];
        let bytes = Mutation::encode_batch(&batch).unwrap();
        assert_eq!(Mutation::decode_batch(&bytes).unwrap(), batch);

        let mut state = LedgerState::empty();
        state.apply_batch(42, &batch).unwrap();
        assert_eq!(state.last_timestamp, 42);
        state.apply_batch(7, &[]).unwrap();
        assert_eq!(state.last_timestamp, 42);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let mut a = LedgerState::empty();
        let mut b = LedgerState::empty();
        let accounts: Vec<Account> = (0..5).map(|i| Account::new(AccountId::new(), i)).collect();

        for account in &accounts {
            a.apply(&Mutation::PutAccount(account.clone())).unwrap();
        }
        for account in accounts.iter().rev() {
            b.apply(&Mutation::PutAccount(account.clone())).unwrap();
        }
        assert_eq!(a.compute_hash().unwrap(), b.compute_hash().unwrap());

        b.apply(&Mutation::AppendTrade(trade(1))).unwrap();
        assert_ne!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
    }
}
