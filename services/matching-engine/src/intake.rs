//! Account funding and vault intake
//!
//! The collaborator-facing operations that feed the ledger: opening
//! accounts, moving cash in and out, and recording custody events for
//! physical units. Each one is a transaction of its own.

use persistence::TxKind;
use rust_decimal::Decimal;
use tracing::{debug, info};
use types::prelude::*;

use crate::engine::MatchingEngine;
use crate::locks::RowKey;

fn positive(amount: Decimal) -> Result<Decimal, ValidationError> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(ValidationError::InvalidAmount(amount))
    }
}

impl MatchingEngine {
    pub fn open_account(&self) -> Result<AccountId, EngineError> {
        let mut txn = self.begin(TxKind::OpenAccount);
        let account = Account::new(AccountId::new(), txn.timestamp);
        let account_id = account.account_id;
        txn.insert_account(account);
        self.commit(txn)?;
        debug!(%account_id, "account opened");
        Ok(account_id)
    }

    pub fn deposit(&self, account_id: AccountId, amount: Decimal) -> Result<Account, EngineError> {
        let amount = positive(amount)?;
        let mut txn = self.begin(TxKind::Deposit);
        txn.lock(RowKey::Account(account_id));
        txn.credit_cash(account_id, amount)?;
        let account = txn.existing_account(account_id)?.clone();
        self.commit(txn)?;
        Ok(account)
    }

    /// Withdraw available cash. Escrowed cash cannot be withdrawn.
    pub fn withdraw(&self, account_id: AccountId, amount: Decimal) -> Result<Account, EngineError> {
        let amount = positive(amount)?;
        let mut txn = self.begin(TxKind::Withdraw);
        txn.lock(RowKey::Account(account_id));
        txn.debit_cash(account_id, amount)?;
        let account = txn.existing_account(account_id)?.clone();
        self.commit(txn)?;
        Ok(account)
    }

    /// Record a physical unit arriving at the vault.
    ///
    /// New holdings enter as `Authenticating` or `Tradable`; listing only
    /// happens through a sell order.
    pub fn register_holding(
        &self,
        owner: AccountId,
        symbol: &str,
        status: HoldingStatus,
    ) -> Result<Holding, EngineError> {
        if status == HoldingStatus::Listed {
            return Err(ValidationError::InvalidInitialStatus(status).into());
        }
        let symbol =
            Symbol::try_new(symbol).ok_or_else(|| ValidationError::InvalidSymbol(symbol.to_string()))?;
        // Accounts are never removed, so a committed row stays valid.
        if !self.state.read().accounts.contains_key(&owner) {
            return Err(ValidationError::UnknownAccount { account_id: owner }.into());
        }

        let mut txn = self.begin(TxKind::RegisterHolding);
        let holding = Holding::new(HoldingId::new(), owner, symbol, status, txn.timestamp);
        txn.insert_holding(holding.clone());
        self.commit(txn)?;
        info!(holding_id = %holding.holding_id, %owner, symbol = %holding.symbol, status = %holding.status, "holding registered");
        Ok(holding)
    }

    /// Apply a vault custody event to a holding.
    ///
    /// Recalling a listed unit does not touch its sell order; the order is
    /// cancelled the next time a buyer reaches it.
    pub fn set_custody_status(
        &self,
        holding_id: HoldingId,
        status: HoldingStatus,
    ) -> Result<Holding, EngineError> {
        let mut txn = self.begin(TxKind::CustodyUpdate);
        let ts = txn.timestamp;
        txn.lock(RowKey::Holding(holding_id));

        let holding = txn
            .holding(holding_id)
            .ok_or(ValidationError::UnknownHolding { holding_id })?;
        let from = holding.status;
        if !from.is_custody_transition(status) {
            return Err(ValidationError::InvalidCustodyTransition { from, to: status }.into());
        }
        holding.transition(status, ts);
        let updated = holding.clone();
        self.commit(txn)?;

        info!(%holding_id, %from, to = %status, "custody status changed");
        Ok(updated)
    }
}
