//! Resting limit orders
//!
//! Sell orders always carry exactly one unit bound to one holding. Buy
//! orders carry no holding and any positive unit count.

use crate::ids::{AccountId, HoldingId, OrderId, Symbol};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

/// `Open` is the only non-terminal state; an order never re-opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled(CancelReason),
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Open)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Open => f.write_str("open"),
            OrderStatus::Filled => f.write_str("filled"),
            OrderStatus::Cancelled(reason) => write!(f, "cancelled ({:?})", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    /// Cancelled by its owner
    UserRequested,
    /// Swept by the matching loop: the backing holding is no longer listed
    /// for this order
    StaleListing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Price,
    /// Units requested at placement
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub remaining_quantity: Quantity,
    /// Bound holding; `Some` exactly for sell orders
    pub holding_id: Option<HoldingId>,
    pub status: OrderStatus,
    pub created_at: i64, // Unix nanos
    pub updated_at: i64, // Unix nanos
    pub version: u64,
}

impl Order {
    pub fn new_buy(
        account_id: AccountId,
        symbol: Symbol,
        price: Price,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self::new(account_id, symbol, Side::BUY, price, quantity, None, timestamp)
    }

    pub fn new_sell(
        account_id: AccountId,
        symbol: Symbol,
        price: Price,
        holding_id: HoldingId,
        timestamp: i64,
    ) -> Self {
        Self::new(
            account_id,
            symbol,
            Side::SELL,
            price,
            Quantity::ONE,
            Some(holding_id),
            timestamp,
        )
    }

    fn new(
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        price: Price,
        quantity: Quantity,
        holding_id: Option<HoldingId>,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            account_id,
            symbol,
            side,
            price,
            quantity,
            filled_quantity: Quantity::zero(),
            remaining_quantity: quantity,
            holding_id,
            status: OrderStatus::Open,
            created_at: timestamp,
            updated_at: timestamp,
            version: 0,
        }
    }

    /// Check quantity invariant: filled + remaining = total
    pub fn check_invariant(&self) -> bool {
        self.filled_quantity.get() + self.remaining_quantity.get() == self.quantity.get()
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    /// Cash still escrowed against this order (`price × remaining`).
    ///
    /// Zero for sell orders and for anything no longer open.
    pub fn locked_value(&self) -> Decimal {
        if self.side == Side::SELL || !self.is_open() {
            return Decimal::ZERO;
        }
        self.price
            .notional(self.remaining_quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Record one matched unit; the order becomes `Filled` at zero remaining.
    ///
    /// # Panics
    /// Panics if the order is not open or has nothing left
    pub fn fill_one(&mut self, timestamp: i64) {
        assert!(self.is_open(), "Cannot fill a non-open order");

        self.remaining_quantity.decrement();
        self.filled_quantity.increment();
        if self.remaining_quantity.is_zero() {
            self.status = OrderStatus::Filled;
        }
        self.updated_at = timestamp;
        self.version += 1;

        assert!(self.check_invariant(), "Invariant violated after fill");
    }

    /// # Panics
    /// Panics if order is already in terminal state
    pub fn cancel(&mut self, reason: CancelReason, timestamp: i64) {
        assert!(!self.status.is_terminal(), "Cannot cancel terminal order");

        self.status = OrderStatus::Cancelled(reason);
        self.updated_at = timestamp;
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(qty: u64) -> Order {
        Order::new_buy(
            AccountId::new(),
            Symbol::new("PSA10-CHARIZARD"),
            Price::from_u64(100),
            Quantity::new(qty),
            1708123456789000000,
        )
    }

    #[test]
    fn test_sell_order_is_single_unit() {
        let holding = HoldingId::new();
        let order = Order::new_sell(
            AccountId::new(),
            Symbol::new("PSA10-CHARIZARD"),
            Price::from_u64(8500),
            holding,
            1,
        );
        assert_eq!(order.quantity, Quantity::ONE);
        assert_eq!(order.holding_id, Some(holding));
        assert_eq!(order.locked_value(), Decimal::ZERO);
    }

    #[test]
    fn test_partial_then_full_fill() {
        let mut order = buy(2);
        assert_eq!(order.locked_value(), Decimal::from(200));

        order.fill_one(2);
        assert!(order.is_open());
        assert_eq!(order.remaining_quantity, Quantity::new(1));
        assert_eq!(order.locked_value(), Decimal::from(100));

        order.fill_one(3);
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.check_invariant());
        assert_eq!(order.locked_value(), Decimal::ZERO);
    }

    #[test]
    fn test_order_cancel() {
        let mut order = buy(1);
        order.cancel(CancelReason::UserRequested, 2);
        assert_eq!(order.status, OrderStatus::Cancelled(CancelReason::UserRequested));
        assert!(order.status.is_terminal());
    }

    #[test]
    #[should_panic(expected = "Cannot cancel terminal order")]
    fn test_cancel_terminal_panics() {
        let mut order = buy(1);
        order.fill_one(2);
        order.cancel(CancelReason::UserRequested, 3);
    }

    #[test]
    #[should_panic(expected = "Cannot fill a non-open order")]
    fn test_fill_cancelled_panics() {
        let mut order = buy(3);
        order.cancel(CancelReason::UserRequested, 2);
        order.fill_one(3);
    }

    #[test]
    fn test_order_serialization() {
        let order = buy(4);
        let json = serde_json::to_string(&order).unwrap();
        let deserialized: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, deserialized);
    }
}
