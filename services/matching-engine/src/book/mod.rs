//! Order book index
//!
//! An in-memory index over the open orders in the committed ledger, per
//! symbol and side. It is a derived view: it is rebuilt from the ledger on
//! open and updated only when a transaction commits, so it never holds an
//! order the ledger does not.

pub mod ask_book;
pub mod bid_book;
pub mod price_level;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use price_level::{LevelEntry, PriceLevel};

use serde::Serialize;
use std::collections::BTreeMap;
use types::ids::{AccountId, HoldingId, OrderId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, Side};

/// A resting order eligible for an incoming order, as seen when the
/// matching pass began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub holding_id: Option<HoldingId>,
    pub price: Price,
    pub created_at: i64,
}

impl Candidate {
    fn new(price: Price, entry: &LevelEntry) -> Self {
        Self {
            order_id: entry.order_id,
            account_id: entry.account_id,
            holding_id: entry.holding_id,
            price,
            created_at: entry.created_at,
        }
    }
}

/// Both sides of one symbol
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: BidBook,
    pub asks: AskBook,
}

/// Aggregated levels, best first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookDepth {
    pub symbol: Symbol,
    pub bids: Vec<(Price, Quantity)>,
    pub asks: Vec<(Price, Quantity)>,
}

#[derive(Debug, Default)]
pub struct BookIndex {
    books: BTreeMap<Symbol, OrderBook>,
}

impl BookIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from every open order in `orders`.
    pub fn rebuild<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        let mut index = Self::new();
        for order in orders {
            index.apply(order);
        }
        index
    }

    /// Reflect a committed order row: open orders are indexed, anything
    /// else is dropped.
    pub fn apply(&mut self, order: &Order) {
        if order.is_open() {
            let book = self.books.entry(order.symbol.clone()).or_default();
            match order.side {
                Side::BUY => book.bids.upsert(order),
                Side::SELL => book.asks.upsert(order),
            }
            return;
        }

        if let Some(book) = self.books.get_mut(&order.symbol) {
            match order.side {
                Side::BUY => book.bids.remove(&order.order_id, order.price),
                Side::SELL => book.asks.remove(&order.order_id, order.price),
            };
            if book.bids.is_empty() && book.asks.is_empty() {
                self.books.remove(&order.symbol);
            }
        }
    }

    /// Counter-orders an incoming order may match, in price-time priority.
    pub fn candidates(
        &self,
        symbol: &Symbol,
        side: Side,
        limit: Price,
        taker: AccountId,
    ) -> Vec<Candidate> {
        let Some(book) = self.books.get(symbol) else {
            return Vec::new();
        };
        match side {
            Side::BUY => book.asks.candidates(limit, taker),
            Side::SELL => book.bids.candidates(limit, taker),
        }
    }

    pub fn depth(&self, symbol: &Symbol, levels: usize) -> BookDepth {
        let (bids, asks) = self
            .books
            .get(symbol)
            .map(|book| {
                (
                    book.bids.depth_snapshot(levels),
                    book.asks.depth_snapshot(levels),
                )
            })
            .unwrap_or_default();
        BookDepth {
            symbol: symbol.clone(),
            bids,
            asks,
        }
    }

    pub fn book(&self, symbol: &Symbol) -> Option<&OrderBook> {
        self.books.get(symbol)
    }
}
