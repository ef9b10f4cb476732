//! Error types for the matching and settlement engine
//!
//! Every error returned to a caller means nothing was persisted.

use crate::holding::HoldingStatus;
use crate::ids::{AccountId, HoldingId, OrderId};
use crate::order::OrderStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Insufficient inventory: holding {holding_id} is {status}")]
    InsufficientInventory {
        holding_id: HoldingId,
        status: HoldingStatus,
    },

    #[error("Order not found: {order_id}")]
    NotFound { order_id: OrderId },

    #[error("Order {order_id} is not owned by the requesting account")]
    NotOwned { order_id: OrderId },

    #[error("Order {order_id} is not open: {status}")]
    NotOpen { order_id: OrderId, status: OrderStatus },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl EngineError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        EngineError::Storage {
            message: err.to_string(),
        }
    }
}

/// Rejections of malformed or unauthorised requests
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Sell orders must reference a holding")]
    MissingHolding,

    #[error("Buy orders must not reference a holding")]
    UnexpectedHolding,

    #[error("Holding not found: {holding_id}")]
    UnknownHolding { holding_id: HoldingId },

    #[error("Holding {holding_id} is not owned by the requesting account")]
    HoldingNotOwned { holding_id: HoldingId },

    #[error("Holding {holding_id} belongs to symbol {actual}, not {requested}")]
    SymbolMismatch {
        holding_id: HoldingId,
        requested: String,
        actual: String,
    },

    #[error("Account not found: {account_id}")]
    UnknownAccount { account_id: AccountId },

    #[error("Order notional overflows: {price} x {quantity}")]
    NotionalOverflow { price: Decimal, quantity: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Crediting {amount} would overflow the account balance")]
    BalanceOverflow { amount: Decimal },

    #[error("Custody transition {from} -> {to} is not permitted")]
    InvalidCustodyTransition { from: HoldingStatus, to: HoldingStatus },

    #[error("A holding cannot enter custody as {0}")]
    InvalidInitialStatus(HoldingStatus),
}

/// Balance ledger failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccountError {
    #[error("Insufficient available cash: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Amount must be non-negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Balance cannot absorb {amount} exactly")]
    Overflow { amount: Decimal },
}

impl From<AccountError> for EngineError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InsufficientFunds {
                required,
                available,
            } => EngineError::InsufficientFunds {
                required,
                available,
            },
            AccountError::NegativeAmount(amount) => {
                EngineError::Validation(ValidationError::InvalidAmount(amount))
            }
            AccountError::Overflow { amount } => {
                EngineError::Validation(ValidationError::BalanceOverflow { amount })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidPrice("negative".to_string());
        assert_eq!(err.to_string(), "Invalid price: negative");
    }

    #[test]
    fn test_engine_error_from_validation_error() {
        let engine_err: EngineError = ValidationError::MissingHolding.into();
        assert!(matches!(engine_err, EngineError::Validation(_)));
    }

    #[test]
    fn test_account_error_maps_to_insufficient_funds() {
        let err: EngineError = AccountError::InsufficientFunds {
            required: Decimal::from(200),
            available: Decimal::from(150),
        }
        .into();
        assert_eq!(
            err,
            EngineError::InsufficientFunds {
                required: Decimal::from(200),
                available: Decimal::from(150),
            }
        );
        assert!(err.to_string().contains("200"));
    }

    #[test]
    fn test_account_overflow_is_a_validation_error() {
        let err: EngineError = AccountError::Overflow { amount: Decimal::ONE }.into();
        assert_eq!(
            err,
            EngineError::Validation(ValidationError::BalanceOverflow { amount: Decimal::ONE })
        );
    }

    #[test]
    fn test_insufficient_inventory_display() {
        let err = EngineError::InsufficientInventory {
            holding_id: HoldingId::new(),
            status: HoldingStatus::Authenticating,
        };
        assert!(err.to_string().contains("authenticating"));
    }
}
