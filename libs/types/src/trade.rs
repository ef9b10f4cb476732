//! Executed trades
//!
//! One `Trade` per unit transferred. Trades are append-only: never mutated
//! or deleted once recorded.

use crate::ids::{AccountId, HoldingId, OrderId, Symbol, TradeId};
use crate::numeric::Price;
use crate::order::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    /// Gapless ledger sequence, assigned at commit
    pub sequence: u64,
    pub symbol: Symbol,
    pub holding_id: HoldingId,

    pub buyer: AccountId,
    pub seller: AccountId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,

    /// Side of the incoming (taker) order
    pub taker_side: Side,
    /// Maker's resting price
    pub price: Price,

    pub executed_at: i64, // Unix nanos
}

impl Trade {
    pub fn maker_order_id(&self) -> OrderId {
        match self.taker_side {
            Side::BUY => self.sell_order_id,
            Side::SELL => self.buy_order_id,
        }
    }

    pub fn taker_order_id(&self) -> OrderId {
        match self.taker_side {
            Side::BUY => self.buy_order_id,
            Side::SELL => self.sell_order_id,
        }
    }

    pub fn executed_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.executed_at)
    }

    pub fn validate_no_self_trade(&self) -> bool {
        self.buyer != self.seller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(taker_side: Side) -> Trade {
        Trade {
            trade_id: TradeId::new(),
            sequence: 1,
            symbol: Symbol::new("PSA10-CHARIZARD"),
            holding_id: HoldingId::new(),
            buyer: AccountId::new(),
            seller: AccountId::new(),
            buy_order_id: OrderId::new(),
            sell_order_id: OrderId::new(),
            taker_side,
            price: Price::from_u64(8500),
            executed_at: 1708123456789000000,
        }
    }

    #[test]
    fn test_maker_and_taker_orders() {
        let trade = sample(Side::BUY);
        assert_eq!(trade.maker_order_id(), trade.sell_order_id);
        assert_eq!(trade.taker_order_id(), trade.buy_order_id);

        let trade = sample(Side::SELL);
        assert_eq!(trade.maker_order_id(), trade.buy_order_id);
    }

    #[test]
    fn test_no_self_trade() {
        let mut trade = sample(Side::BUY);
        assert!(trade.validate_no_self_trade());
        trade.seller = trade.buyer;
        assert!(!trade.validate_no_self_trade());
    }

    #[test]
    fn test_executed_at_utc() {
        let trade = sample(Side::BUY);
        assert_eq!(trade.executed_at_utc().timestamp(), 1708123456);
    }
}
