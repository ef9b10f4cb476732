//! Physical asset units ("holdings") and their custody lifecycle
//!
//! ```text
//! pending_authentication -> shipped -> received -> authenticating -> tradable
//!                                                         tradable <-> listed
//!                                     tradable | listed -> withdrawn
//! ```
//!
//! Everything up to `tradable`, plus `withdrawn`, is written by the vault.
//! `tradable <-> listed` and ownership transfer are written by the engine.

use crate::ids::{AccountId, HoldingId, OrderId, Symbol};
use crate::numeric::Price;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingStatus {
    PendingAuthentication,
    Shipped,
    Received,
    Authenticating,
    Tradable,
    Listed,
    Withdrawn,
}

impl HoldingStatus {
    pub fn can_transition_to(self, to: HoldingStatus) -> bool {
        use HoldingStatus::*;
        matches!(
            (self, to),
            (PendingAuthentication, Shipped)
                | (Shipped, Received)
                | (Received, Authenticating)
                | (Authenticating, Tradable)
                | (Tradable, Listed)
                | (Listed, Tradable)
                | (Tradable, Withdrawn)
                | (Listed, Withdrawn)
        )
    }

    /// Transitions the vault subsystem is allowed to request.
    pub fn is_custody_transition(self, to: HoldingStatus) -> bool {
        let engine_move = matches!(
            (self, to),
            (HoldingStatus::Tradable, HoldingStatus::Listed)
                | (HoldingStatus::Listed, HoldingStatus::Tradable)
        );
        self.can_transition_to(to) && !engine_move
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HoldingStatus::PendingAuthentication => "pending_authentication",
            HoldingStatus::Shipped => "shipped",
            HoldingStatus::Received => "received",
            HoldingStatus::Authenticating => "authenticating",
            HoldingStatus::Tradable => "tradable",
            HoldingStatus::Listed => "listed",
            HoldingStatus::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for HoldingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical unit with exactly one owner at any instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub holding_id: HoldingId,
    pub owner: AccountId,
    pub symbol: Symbol,
    pub status: HoldingStatus,
    /// Ask price while listed
    pub ask_price: Option<Price>,
    /// The open sell order this unit is bound to while listed
    pub listed_order: Option<OrderId>,
    pub updated_at: i64,
    pub version: u64,
}

impl Holding {
    pub fn new(
        holding_id: HoldingId,
        owner: AccountId,
        symbol: Symbol,
        status: HoldingStatus,
        timestamp: i64,
    ) -> Self {
        Self {
            holding_id,
            owner,
            symbol,
            status,
            ask_price: None,
            listed_order: None,
            updated_at: timestamp,
            version: 0,
        }
    }

    /// Apply a lifecycle transition.
    ///
    /// # Panics
    /// Panics on a transition outside the lifecycle graph
    pub fn transition(&mut self, to: HoldingStatus, timestamp: i64) {
        assert!(
            self.status.can_transition_to(to),
            "Illegal holding transition {} -> {}",
            self.status,
            to
        );
        self.status = to;
        if to != HoldingStatus::Listed {
            self.ask_price = None;
            self.listed_order = None;
        }
        self.updated_at = timestamp;
        self.version += 1;
    }

    /// Bind this unit to a sell order.
    pub fn list(&mut self, order_id: OrderId, ask_price: Price, timestamp: i64) {
        self.transition(HoldingStatus::Listed, timestamp);
        self.ask_price = Some(ask_price);
        self.listed_order = Some(order_id);
    }

    /// Release the listing after the bound order is cancelled.
    pub fn unlist(&mut self, timestamp: i64) {
        self.transition(HoldingStatus::Tradable, timestamp);
    }

    /// Hand the unit to a buyer; it comes back `tradable` under the new owner.
    pub fn transfer_to(&mut self, buyer: AccountId, timestamp: i64) {
        self.transition(HoldingStatus::Tradable, timestamp);
        self.owner = buyer;
    }

    /// True while this unit still backs `order_id` for `maker`.
    pub fn is_listed_for(&self, order_id: OrderId, maker: AccountId) -> bool {
        self.status == HoldingStatus::Listed
            && self.owner == maker
            && self.listed_order == Some(order_id)
    }
}
