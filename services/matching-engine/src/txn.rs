//! Transactions
//!
//! A transaction owns row locks and a private copy of every row it has
//! touched. Nothing it does is visible to anyone else until the engine
//! commits it; dropping it discards everything and releases its rows.
//!
//! Rows are read from the committed ledger only after their lock is held,
//! so a staged copy can never be based on a value another transaction is
//! about to overwrite.

use crate::locks::{LockTable, RowGuard, RowKey};
use parking_lot::RwLock;
use persistence::{LedgerState, TxKind};
use std::collections::{BTreeMap, HashMap};
use types::prelude::*;

pub(crate) struct Transaction<'e> {
    owner: u64,
    locks: &'e LockTable,
    state: &'e RwLock<LedgerState>,
    held: HashMap<RowKey, RowGuard<'e>>,
    pub(crate) kind: TxKind,
    pub(crate) timestamp: i64,
    accounts: BTreeMap<AccountId, Account>,
    holdings: BTreeMap<HoldingId, Holding>,
    orders: BTreeMap<OrderId, Order>,
    /// Trades in execution order; sequences are assigned at commit
    trades: Vec<Trade>,
}

/// Everything a transaction wants to write.
pub(crate) struct StagedWrites<'e> {
    pub(crate) kind: TxKind,
    pub(crate) timestamp: i64,
    pub(crate) accounts: Vec<Account>,
    pub(crate) holdings: Vec<Holding>,
    pub(crate) orders: Vec<Order>,
    pub(crate) trades: Vec<Trade>,
    /// Released once the writes are applied
    pub(crate) guards: Vec<RowGuard<'e>>,
}

impl<'e> Transaction<'e> {
    pub(crate) fn begin(
        locks: &'e LockTable,
        state: &'e RwLock<LedgerState>,
        kind: TxKind,
        timestamp: i64,
    ) -> Self {
        Self {
            owner: locks.next_owner_id(),
            locks,
            state,
            held: HashMap::new(),
            kind,
            timestamp,
            accounts: BTreeMap::new(),
            holdings: BTreeMap::new(),
            orders: BTreeMap::new(),
            trades: Vec::new(),
        }
    }

    // ── Row locks ───────────────────────────────────────────────────

    pub(crate) fn holds(&self, key: &RowKey) -> bool {
        self.held.contains_key(key)
    }

    /// Block until `key` is ours.
    pub(crate) fn lock(&mut self, key: RowKey) {
        if !self.holds(&key) {
            let guard = self.locks.lock(key, self.owner);
            self.held.insert(key, guard);
        }
    }

    /// Take every row in `keys` without waiting, or none of them.
    ///
    /// Rows this transaction already owned stay owned either way.
    pub(crate) fn try_lock_all(&mut self, keys: &[RowKey]) -> bool {
        let mut acquired = Vec::with_capacity(keys.len());
        for key in keys {
            if self.holds(key) || acquired.iter().any(|g: &RowGuard<'e>| g.key() == *key) {
                continue;
            }
            match self.locks.try_lock(*key, self.owner) {
                Some(guard) => acquired.push(guard),
                None => return false,
            }
        }
        for guard in acquired {
            self.held.insert(guard.key(), guard);
        }
        true
    }

    // ── Rows ────────────────────────────────────────────────────────

    /// Staged copy of an account row, loading the committed value on first use.
    pub(crate) fn account(&mut self, id: AccountId) -> Option<&mut Account> {
        debug_assert!(self.holds(&RowKey::Account(id)), "account row not locked");
        if !self.accounts.contains_key(&id) {
            let committed = self.state.read().accounts.get(&id).cloned()?;
            self.accounts.insert(id, committed);
        }
        self.accounts.get_mut(&id)
    }

    pub(crate) fn holding(&mut self, id: HoldingId) -> Option<&mut Holding> {
        debug_assert!(self.holds(&RowKey::Holding(id)), "holding row not locked");
        if !self.holdings.contains_key(&id) {
            let committed = self.state.read().holdings.get(&id).cloned()?;
            self.holdings.insert(id, committed);
        }
        self.holdings.get_mut(&id)
    }

    pub(crate) fn order(&mut self, id: OrderId) -> Option<&mut Order> {
        debug_assert!(self.holds(&RowKey::Order(id)), "order row not locked");
        if !self.orders.contains_key(&id) {
            let committed = self.state.read().orders.get(&id).cloned()?;
            self.orders.insert(id, committed);
        }
        self.orders.get_mut(&id)
    }

    /// Stage a row that does not exist in the ledger yet.
    pub(crate) fn insert_account(&mut self, account: Account) {
        self.accounts.insert(account.account_id, account);
    }

    pub(crate) fn insert_holding(&mut self, holding: Holding) {
        self.holdings.insert(holding.holding_id, holding);
    }

    pub(crate) fn insert_order(&mut self, order: Order) {
        self.orders.insert(order.order_id, order);
    }

    pub(crate) fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub(crate) fn into_writes(self) -> StagedWrites<'e> {
        StagedWrites {
            kind: self.kind,
            timestamp: self.timestamp,
            accounts: self.accounts.into_values().collect(),
            holdings: self.holdings.into_values().collect(),
            orders: self.orders.into_values().collect(),
            trades: self.trades,
            guards: self.held.into_values().collect(),
        }
    }
}
