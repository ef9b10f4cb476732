//! Trade ledger and price publisher
//!
//! Trades flow one way: a committed trade updates its symbol's market state
//! and appends one price tick. Matching never reads anything produced here.

use persistence::{LedgerState, Mutation};
use std::collections::BTreeMap;
use types::prelude::*;

/// Market rows derived from a batch of new trades.
#[derive(Debug, Default)]
pub(crate) struct Publication {
    pub(crate) markets: Vec<MarketState>,
    pub(crate) ticks: Vec<PriceTick>,
}

impl Publication {
    pub(crate) fn into_mutations(self) -> impl Iterator<Item = Mutation> {
        self.markets
            .into_iter()
            .map(Mutation::PutMarket)
            .chain(self.ticks.into_iter().map(Mutation::AppendTick))
    }
}

/// Number `trades` after the committed ledger and fold them into market state.
///
/// Must run while commits are serialised, so the sequences stay gapless.
pub(crate) fn publish(state: &LedgerState, trades: &mut [Trade]) -> Publication {
    let mut markets: BTreeMap<Symbol, MarketState> = BTreeMap::new();
    let mut ticks = Vec::with_capacity(trades.len());
    let first = state.next_trade_sequence();

    for (offset, trade) in trades.iter_mut().enumerate() {
        trade.sequence = first + offset as u64;
        let market = markets.entry(trade.symbol.clone()).or_insert_with(|| {
            state
                .markets
                .get(&trade.symbol)
                .cloned()
                .unwrap_or_else(|| MarketState::new(trade.symbol.clone()))
        });
        ticks.push(market.apply_trade(trade));
    }

    Publication {
        markets: markets.into_values().collect(),
        ticks,
    }
}

/// Newest first.
pub fn recent_trades(state: &LedgerState, symbol: &Symbol, limit: usize) -> Vec<Trade> {
    state
        .trades
        .iter()
        .rev()
        .filter(|t| &t.symbol == symbol)
        .take(limit)
        .cloned()
        .collect()
}

/// Trades with a sequence greater than `sequence`, oldest first.
pub fn trades_since(state: &LedgerState, sequence: u64) -> Vec<Trade> {
    let start = usize::try_from(sequence)
        .unwrap_or(usize::MAX)
        .min(state.trades.len());
    state.trades[start..].to_vec()
}

/// Units of `symbol` traded at or after `since` (Unix nanos).
pub fn volume_since(state: &LedgerState, symbol: &Symbol, since: i64) -> u64 {
    state
        .trades
        .iter()
        .filter(|t| &t.symbol == symbol && t.executed_at >= since)
        .count() as u64
}
