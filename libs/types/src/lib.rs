//! Types library for the collectibles exchange
//!
//! Core type definitions shared by the persistence layer and the matching
//! engine.
//!
//! # Modules
//! - `ids`: Unique identifiers (OrderId, TradeId, AccountId, HoldingId, Symbol)
//! - `numeric`: Price (positive decimal) and Quantity (whole units)
//! - `account`: Available / locked cash balances
//! - `holding`: Physical asset units and their custody lifecycle
//! - `order`: Resting limit orders
//! - `trade`: Executed trades
//! - `market`: Last price, volume and price history
//! - `errors`: Error taxonomy

pub mod ids;
pub mod numeric;
pub mod account;
pub mod holding;
pub mod order;
pub mod trade;
pub mod market;
pub mod errors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::account::*;
    pub use crate::errors::*;
    pub use crate::holding::*;
    pub use crate::ids::*;
    pub use crate::market::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::trade::*;
}
