//! Balance and inventory ledger operations
//!
//! Bookkeeping primitives used by placement, matching and cancellation.
//! They act on a transaction's staged rows, so a failure leaves nothing
//! behind once the transaction is dropped. Every check happens before the
//! row is mutated.

use crate::txn::Transaction;
use rust_decimal::Decimal;
use types::prelude::*;

impl Transaction<'_> {
    pub(crate) fn existing_account(&mut self, id: AccountId) -> Result<&mut Account, EngineError> {
        self.account(id)
            .ok_or(ValidationError::UnknownAccount { account_id: id }.into())
    }

    /// Move `amount` of `id`'s available cash into escrow.
    pub(crate) fn escrow_cash(&mut self, id: AccountId, amount: Decimal) -> Result<(), EngineError> {
        let ts = self.timestamp;
        self.existing_account(id)?.lock(amount, ts)?;
        Ok(())
    }

    /// Return escrowed cash to the available bucket.
    pub(crate) fn release_cash(&mut self, id: AccountId, amount: Decimal) -> Result<(), EngineError> {
        let ts = self.timestamp;
        self.existing_account(id)?.release_locked(amount, ts);
        Ok(())
    }

    /// Pay `amount` out of `id`'s escrow; the counterparty is credited separately.
    pub(crate) fn pay_from_escrow(&mut self, id: AccountId, amount: Decimal) -> Result<(), EngineError> {
        let ts = self.timestamp;
        self.existing_account(id)?.settle_locked(amount, ts);
        Ok(())
    }

    pub(crate) fn credit_cash(&mut self, id: AccountId, amount: Decimal) -> Result<(), EngineError> {
        let ts = self.timestamp;
        self.existing_account(id)?.credit(amount, ts)?;
        Ok(())
    }

    pub(crate) fn debit_cash(&mut self, id: AccountId, amount: Decimal) -> Result<(), EngineError> {
        let ts = self.timestamp;
        self.existing_account(id)?.debit(amount, ts)?;
        Ok(())
    }

    /// Bind a caller's tradable holding to a new sell order.
    pub(crate) fn list_holding(
        &mut self,
        holding_id: HoldingId,
        owner: AccountId,
        symbol: &Symbol,
        order_id: OrderId,
        ask_price: Price,
    ) -> Result<(), EngineError> {
        let ts = self.timestamp;
        let holding = self
            .holding(holding_id)
            .ok_or(ValidationError::UnknownHolding { holding_id })?;

        if holding.owner != owner {
            return Err(ValidationError::HoldingNotOwned { holding_id }.into());
        }
        if &holding.symbol != symbol {
            return Err(ValidationError::SymbolMismatch {
                holding_id,
                requested: symbol.to_string(),
                actual: holding.symbol.to_string(),
            }
            .into());
        }
        if holding.status != HoldingStatus::Tradable {
            return Err(EngineError::InsufficientInventory {
                holding_id,
                status: holding.status,
            });
        }

        holding.list(order_id, ask_price, ts);
        Ok(())
    }

    /// Undo a listing if the holding still backs `order_id`.
    ///
    /// Returns false when the holding has moved on (recalled by the vault),
    /// in which case it is left untouched.
    pub(crate) fn unlist_holding(
        &mut self,
        holding_id: HoldingId,
        order_id: OrderId,
        owner: AccountId,
    ) -> bool {
        let ts = self.timestamp;
        match self.holding(holding_id) {
            Some(holding) if holding.is_listed_for(order_id, owner) => {
                holding.unlist(ts);
                true
            }
            _ => false,
        }
    }

    /// Hand a listed holding to its buyer.
    ///
    /// # Panics
    /// Panics if the holding row is missing; callers have validated it.
    pub(crate) fn transfer_holding(&mut self, holding_id: HoldingId, buyer: AccountId) {
        let ts = self.timestamp;
        let holding = self
            .holding(holding_id)
            .unwrap_or_else(|| panic!("holding {holding_id} vanished mid-transaction"));
        holding.transfer_to(buyer, ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::{LockTable, RowKey};
    use parking_lot::RwLock;
    use persistence::{LedgerState, Mutation, TxKind};

    struct Fixture {
        locks: LockTable,
        state: RwLock<LedgerState>,
        owner: AccountId,
        holding: HoldingId,
    }

    fn fixture(status: HoldingStatus) -> Fixture {
        let mut account = Account::new(AccountId::new(), 1);
        account.credit(Decimal::from(1_000), 1).unwrap();
        let holding = Holding::new(HoldingId::new(), account.account_id, Symbol::new("X"), status, 1);
        let f = Fixture {
            locks: LockTable::new(),
            state: RwLock::new(LedgerState::empty()),
            owner: account.account_id,
            holding: holding.holding_id,
        };
        f.state
            .write()
            .apply_batch(1, &[Mutation::PutAccount(account), Mutation::PutHolding(holding)])
            .unwrap();
        f
    }

    fn begin(f: &Fixture) -> Transaction<'_> {
        let mut txn = Transaction::begin(&f.locks, &f.state, TxKind::PlaceOrder, 10);
        txn.lock(RowKey::Account(f.owner));
        txn.lock(RowKey::Holding(f.holding));
        txn
    }

    #[test]
    fn test_escrow_and_release() {
        let f = fixture(HoldingStatus::Tradable);
        let mut txn = begin(&f);

        txn.escrow_cash(f.owner, Decimal::from(400)).unwrap();
        txn.release_cash(f.owner, Decimal::from(150)).unwrap();

        let account = txn.account(f.owner).unwrap();
        assert_eq!(account.available_cash, Decimal::from(750));
        assert_eq!(account.locked_cash, Decimal::from(250));
    }

    #[test]
    fn test_escrow_beyond_available_fails() {
        let f = fixture(HoldingStatus::Tradable);
        let mut txn = begin(&f);
        assert_eq!(
            txn.escrow_cash(f.owner, Decimal::from(1_001)),
            Err(EngineError::InsufficientFunds {
                required: Decimal::from(1_001),
                available: Decimal::from(1_000),
            })
        );
    }

    #[test]
    fn test_unknown_account_is_validation_error() {
        let f = fixture(HoldingStatus::Tradable);
        let mut txn = begin(&f);
        let ghost = AccountId::new();
        txn.lock(RowKey::Account(ghost));
        assert!(matches!(
            txn.escrow_cash(ghost, Decimal::ONE),
            Err(EngineError::Validation(ValidationError::UnknownAccount { .. }))
        ));
    }

    #[test]
    fn test_list_requires_tradable() {
        let f = fixture(HoldingStatus::Authenticating);
        let mut txn = begin(&f);
        let err = txn
            .list_holding(f.holding, f.owner, &Symbol::new("X"), OrderId::new(), Price::from_u64(5))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientInventory {
                holding_id: f.holding,
                status: HoldingStatus::Authenticating,
            }
        );
    }

    #[test]
    fn test_list_rejects_foreign_or_mismatched_holding() {
        let f = fixture(HoldingStatus::Tradable);
        let mut txn = begin(&f);
        let stranger = AccountId::new();

        assert!(matches!(
            txn.list_holding(f.holding, stranger, &Symbol::new("X"), OrderId::new(), Price::from_u64(5)),
            Err(EngineError::Validation(ValidationError::HoldingNotOwned { .. }))
        ));
        assert!(matches!(
            txn.list_holding(f.holding, f.owner, &Symbol::new("Y"), OrderId::new(), Price::from_u64(5)),
            Err(EngineError::Validation(ValidationError::SymbolMismatch { .. }))
        ));
    }

    #[test]
    fn test_list_then_unlist() {
        let f = fixture(HoldingStatus::Tradable);
        let mut txn = begin(&f);
        let order_id = OrderId::new();

        txn.list_holding(f.holding, f.owner, &Symbol::new("X"), order_id, Price::from_u64(5))
            .unwrap();
        assert!(txn.holding(f.holding).unwrap().is_listed_for(order_id, f.owner));

        assert!(!txn.unlist_holding(f.holding, OrderId::new(), f.owner));
        assert!(txn.unlist_holding(f.holding, order_id, f.owner));
        assert_eq!(txn.holding(f.holding).unwrap().status, HoldingStatus::Tradable);
    }

    #[test]
    fn test_transfer_moves_owner() {
        let f = fixture(HoldingStatus::Tradable);
        let mut txn = begin(&f);
        let order_id = OrderId::new();
        txn.list_holding(f.holding, f.owner, &Symbol::new("X"), order_id, Price::from_u64(5))
            .unwrap();

        let buyer = AccountId::new();
        txn.transfer_holding(f.holding, buyer);
        let holding = txn.holding(f.holding).unwrap();
        assert_eq!(holding.owner, buyer);
        assert_eq!(holding.status, HoldingStatus::Tradable);
        assert_eq!(holding.ask_price, None);
    }
}
