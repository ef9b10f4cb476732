//! Matching logic module
//!
//! Implements the single forward pass of price-time priority matching

pub mod crossing;
pub(crate) mod executor;

pub use crossing::{can_match, incoming_can_match};
pub(crate) use executor::{match_candidate, CandidateOutcome};
