//! Ask (sell-side) order book
//!
//! Maintains sell orders sorted by price ascending (best ask first).
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use types::ids::{AccountId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::Order;

use super::price_level::{LevelEntry, PriceLevel};
use super::Candidate;

/// Ask (sell) side order book
///
/// Orders are sorted by price ascending, so the lowest ask is first.
/// At each price level, orders are kept in creation-time order.
#[derive(Debug, Clone, Default)]
pub struct AskBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Insert or refresh an open order
    pub fn upsert(&mut self, order: &Order) {
        self.levels
            .entry(order.price)
            .or_default()
            .upsert(LevelEntry::from_order(order));
    }

    /// Remove an order from the ask book
    ///
    /// Returns true if the order was found and removed
    pub fn remove(&mut self, order_id: &OrderId, price: Price) -> bool {
        if let Some(level) = self.levels.get_mut(&price) {
            if level.remove(order_id).is_some() {
                if level.is_empty() {
                    self.levels.remove(&price);
                }
                return true;
            }
        }
        false
    }

    /// Asks an incoming buy at `limit` may take, best first, excluding
    /// `taker`'s own orders.
    pub fn candidates(&self, limit: Price, taker: AccountId) -> Vec<Candidate> {
        self.levels
            .range(..=limit)
            .flat_map(|(price, level)| {
                level
                    .iter()
                    .filter(move |e| e.account_id != taker)
                    .map(move |e| Candidate::new(*price, e))
            })
            .collect()
    }

    /// Get depth snapshot (top N price levels)
    pub fn depth_snapshot(&self, depth: usize) -> Vec<(Price, Quantity)> {
        self.levels
            .iter()
            .take(depth)
            .map(|(price, level)| (*price, level.total_quantity()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
