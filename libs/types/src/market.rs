//! Per-symbol market state derived from the trade ledger
//!
//! Data flows one way: trade -> market state -> price tick. Matching never
//! reads any of this.

use crate::ids::Symbol;
use crate::numeric::Price;
use crate::trade::Trade;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    pub symbol: Symbol,
    pub last_price: Option<Price>,
    /// Units traded since the symbol's first trade
    pub volume: u64,
    pub last_trade_sequence: u64,
    pub updated_at: i64,
}

impl MarketState {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            last_price: None,
            volume: 0,
            last_trade_sequence: 0,
            updated_at: 0,
        }
    }

    /// Fold one trade in and return the tick it produces.
    ///
    /// # Panics
    /// Panics if the trade is for another symbol
    pub fn apply_trade(&mut self, trade: &Trade) -> PriceTick {
        assert_eq!(trade.symbol, self.symbol, "Trade applied to wrong market");

        self.last_price = Some(trade.price);
        self.volume += 1;
        self.last_trade_sequence = trade.sequence;
        self.updated_at = trade.executed_at;

        PriceTick {
            symbol: self.symbol.clone(),
            price: trade.price,
            volume: self.volume,
            trade_sequence: trade.sequence,
            timestamp: trade.executed_at,
        }
    }
}

/// Append-only price history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: Symbol,
    pub price: Price,
    /// Cumulative volume after this trade
    pub volume: u64,
    pub trade_sequence: u64,
    pub timestamp: i64,
}
