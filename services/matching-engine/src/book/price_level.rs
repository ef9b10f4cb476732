//! Price level implementation with a time-ordered queue
//!
//! A price level contains all open orders at one price. Entries are kept
//! in ascending creation time so iteration order is time priority.

use std::collections::VecDeque;
use types::ids::{AccountId, HoldingId, OrderId};
use types::numeric::Quantity;
use types::order::Order;

/// A price level containing orders at a specific price
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// Queue of orders at this price level (earliest first)
    orders: VecDeque<LevelEntry>,
    /// Units available at this level
    total_quantity: Quantity,
}

/// Entry in the price level queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelEntry {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub holding_id: Option<HoldingId>,
    pub created_at: i64,
    pub remaining_quantity: Quantity,
}

impl LevelEntry {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.order_id,
            account_id: order.account_id,
            holding_id: order.holding_id,
            created_at: order.created_at,
            remaining_quantity: order.remaining_quantity,
        }
    }
}

impl PriceLevel {
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
            total_quantity: Quantity::zero(),
        }
    }

    /// Insert or refresh an order, keeping creation-time order.
    ///
    /// New orders almost always carry the latest timestamp, so the scan
    /// starts from the back.
    pub fn upsert(&mut self, entry: LevelEntry) {
        if let Some(existing) = self.orders.iter_mut().find(|e| e.order_id == entry.order_id) {
            self.total_quantity = Quantity::new(
                self.total_quantity.get() - existing.remaining_quantity.get()
                    + entry.remaining_quantity.get(),
            );
            existing.remaining_quantity = entry.remaining_quantity;
            return;
        }

        let position = self
            .orders
            .iter()
            .rposition(|e| e.created_at <= entry.created_at)
            .map(|p| p + 1)
            .unwrap_or(0);
        self.total_quantity = Quantity::new(self.total_quantity.get() + entry.remaining_quantity.get());
        self.orders.insert(position, entry);
    }

    /// Remove an order from the queue by OrderId
    ///
    /// Returns the remaining quantity of the removed order, or None if not found
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Quantity> {
        let position = self.orders.iter().position(|entry| &entry.order_id == order_id)?;
        let entry = self.orders.remove(position)?;
        self.total_quantity = Quantity::new(self.total_quantity.get() - entry.remaining_quantity.get());
        Some(entry.remaining_quantity)
    }

    /// Peek at the front order without removing it
    pub fn peek_front(&self) -> Option<&LevelEntry> {
        self.orders.front()
    }

    /// Entries in time priority.
    pub fn iter(&self) -> impl Iterator<Item = &LevelEntry> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(created_at: i64, qty: u64) -> LevelEntry {
        LevelEntry {
            order_id: OrderId::new(),
            account_id: AccountId::new(),
            holding_id: None,
            created_at,
            remaining_quantity: Quantity::new(qty),
        }
    }

    #[test]
    fn test_price_level_insert() {
        let mut level = PriceLevel::new();
        level.upsert(entry(1, 3));

        assert_eq!(level.order_count(), 1);
        assert_eq!(level.total_quantity(), Quantity::new(3));
        assert!(!level.is_empty());
    }

    #[test]
    fn test_out_of_order_insert_keeps_time_priority() {
        let mut level = PriceLevel::new();
        let late = entry(30, 1);
        let early = entry(10, 1);
        let middle = entry(20, 1);

        level.upsert(late.clone());
        level.upsert(early.clone());
        level.upsert(middle.clone());

        let ids: Vec<OrderId> = level.iter().map(|e| e.order_id).collect();
        assert_eq!(ids, vec![early.order_id, middle.order_id, late.order_id]);
        assert_eq!(level.peek_front().unwrap().order_id, early.order_id);
    }

    #[test]
    fn test_upsert_refreshes_quantity_in_place() {
        let mut level = PriceLevel::new();
        let mut first = entry(1, 5);
        let second = entry(2, 2);
        level.upsert(first.clone());
        level.upsert(second);

        first.remaining_quantity = Quantity::new(3);
        level.upsert(first.clone());

        assert_eq!(level.order_count(), 2);
        assert_eq!(level.total_quantity(), Quantity::new(5));
        assert_eq!(level.peek_front().unwrap().remaining_quantity, Quantity::new(3));
    }

    #[test]
    fn test_price_level_remove() {
        let mut level = PriceLevel::new();
        let first = entry(1, 1);
        level.upsert(first.clone());
        level.upsert(entry(2, 2));

        assert_eq!(level.remove(&first.order_id), Some(Quantity::new(1)));
        assert_eq!(level.order_count(), 1);
        assert_eq!(level.total_quantity(), Quantity::new(2));
        assert_eq!(level.remove(&first.order_id), None);
    }
}
