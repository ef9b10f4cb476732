//! Account cash balances
//!
//! Each account carries two cash buckets: `available_cash`, spendable on new
//! orders or withdrawable, and `locked_cash`, escrowed against open buy
//! orders. Neither may ever go negative.

use crate::errors::AccountError;
use crate::ids::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub available_cash: Decimal,
    pub locked_cash: Decimal,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: u64,
}

impl Account {
    /// Create an empty account
    pub fn new(account_id: AccountId, timestamp: i64) -> Self {
        Self {
            account_id,
            available_cash: Decimal::ZERO,
            locked_cash: Decimal::ZERO,
            created_at: timestamp,
            updated_at: timestamp,
            version: 0,
        }
    }

    /// available + locked
    pub fn total_cash(&self) -> Decimal {
        self.available_cash + self.locked_cash
    }

    /// Both buckets non-negative
    pub fn check_invariant(&self) -> bool {
        self.available_cash >= Decimal::ZERO && self.locked_cash >= Decimal::ZERO
    }

    /// Move `amount` from available to locked (order escrow).
    pub fn lock(&mut self, amount: Decimal, timestamp: i64) -> Result<(), AccountError> {
        self.ensure_available(amount)?;
        let locked = exact_sum(self.locked_cash, amount).ok_or(AccountError::Overflow { amount })?;
        self.available_cash -= amount;
        self.locked_cash = locked;
        self.touch(timestamp);
        Ok(())
    }

    /// Move `amount` from locked back to available (cancellation, price improvement).
    ///
    /// # Panics
    /// Panics if amount exceeds the locked balance
    pub fn release_locked(&mut self, amount: Decimal, timestamp: i64) {
        assert!(amount >= Decimal::ZERO, "Release amount must be non-negative");
        assert!(amount <= self.locked_cash, "Insufficient locked balance");

        self.locked_cash -= amount;
        self.available_cash += amount;
        self.touch(timestamp);
    }

    /// Remove `amount` from locked cash entirely (paid out to a counterparty).
    ///
    /// # Panics
    /// Panics if amount exceeds the locked balance
    pub fn settle_locked(&mut self, amount: Decimal, timestamp: i64) {
        assert!(amount >= Decimal::ZERO, "Settle amount must be non-negative");
        assert!(amount <= self.locked_cash, "Insufficient locked balance");

        self.locked_cash -= amount;
        self.touch(timestamp);
    }

    /// Add to available cash (trade proceeds, deposits).
    ///
    /// Fails without touching the account unless both the new available
    /// balance and the new total are exact.
    pub fn credit(&mut self, amount: Decimal, timestamp: i64) -> Result<(), AccountError> {
        if amount < Decimal::ZERO {
            return Err(AccountError::NegativeAmount(amount));
        }
        let available = exact_sum(self.available_cash, amount)
            .filter(|available| exact_sum(*available, self.locked_cash).is_some())
            .ok_or(AccountError::Overflow { amount })?;
        self.available_cash = available;
        self.touch(timestamp);
        Ok(())
    }

    /// Remove from available cash (withdrawals).
    pub fn debit(&mut self, amount: Decimal, timestamp: i64) -> Result<(), AccountError> {
        self.ensure_available(amount)?;
        self.available_cash -= amount;
        self.touch(timestamp);
        Ok(())
    }

    fn ensure_available(&self, amount: Decimal) -> Result<(), AccountError> {
        if amount < Decimal::ZERO {
            return Err(AccountError::NegativeAmount(amount));
        }
        if amount > self.available_cash {
            return Err(AccountError::InsufficientFunds {
                required: amount,
                available: self.available_cash,
            });
        }
        Ok(())
    }

    fn touch(&mut self, timestamp: i64) {
        self.updated_at = timestamp;
        self.version += 1;
        debug_assert!(self.check_invariant(), "Account invariant violated");
    }
}

/// `a + b` when the sum keeps the finer of the two scales. rust_decimal
/// rounds rather than failing once the mantissa is full.
fn exact_sum(a: Decimal, b: Decimal) -> Option<Decimal> {
    let sum = a.checked_add(b)?;
    (sum.scale() >= a.scale().max(b.scale())).then_some(sum)
}
