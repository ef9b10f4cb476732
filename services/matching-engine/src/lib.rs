//! Matching Engine Service
//!
//! Price-time priority matching and settlement for physically-backed
//! collectibles. Every owned unit is a distinct holding, so a trade always
//! moves exactly one unit and cash settles in the same transaction.
//!
//! **Key Invariants:**
//! - Best price first, oldest order first within a price
//! - Cash is conserved: available + locked only moves between accounts
//! - A holding has one owner and backs at most one open sell order
//! - No self-trades
//! - Every committed transaction is one journal frame; replay is exact

pub mod book;
pub mod clock;
pub mod config;
pub mod engine;
mod intake;
mod ledger;
pub mod locks;
pub mod matching;
mod store;
pub mod trade_ledger;
mod txn;

pub use book::BookDepth;
pub use config::EngineConfig;
pub use engine::{MatchingEngine, OrderRequest, PlacedOrder};
