//! Per-row exclusive locks
//!
//! Every write to an account, holding or order row happens while the writing
//! transaction owns that row here. Ownership lasts until the transaction
//! commits or is dropped.
//!
//! Two acquisition modes:
//! - [`LockTable::lock`] blocks. Used only for the caller's own rows.
//! - [`LockTable::try_lock`] never blocks. Used for resting counter-orders;
//!   a contended candidate is skipped.
//!
//! Blocking waits always follow order → holding → account, and a
//! transaction that owns an account row never blocks again, so waits
//! cannot form a cycle.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use types::ids::{AccountId, HoldingId, OrderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    Account(AccountId),
    Holding(HoldingId),
    Order(OrderId),
}

/// Held lock on one row; released on drop.
#[derive(Debug)]
pub struct RowGuard<'a> {
    table: &'a LockTable,
    key: RowKey,
}

impl RowGuard<'_> {
    pub fn key(&self) -> RowKey {
        self.key
    }
}

impl Drop for RowGuard<'_> {
    fn drop(&mut self) {
        self.table.release(self.key);
    }
}

#[derive(Debug, Default)]
pub struct LockTable {
    /// Row → owning transaction id
    owners: DashMap<RowKey, u64>,
    next_owner: AtomicU64,
    wait_lock: Mutex<()>,
    released: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh owner id for a new transaction.
    pub fn next_owner_id(&self) -> u64 {
        self.next_owner.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Acquire `key`, waiting while another transaction owns it.
    pub fn lock(&self, key: RowKey, owner: u64) -> RowGuard<'_> {
        if let Some(guard) = self.try_lock(key, owner) {
            return guard;
        }
        let mut waiting = self.wait_lock.lock();
        loop {
            // Re-check under the wait lock so a release cannot slip in
            // between the failed attempt and the wait.
            if let Some(guard) = self.try_lock(key, owner) {
                return guard;
            }
            self.released.wait(&mut waiting);
        }
    }

    /// Acquire `key` only if nobody owns it right now.
    pub fn try_lock(&self, key: RowKey, owner: u64) -> Option<RowGuard<'_>> {
        match self.owners.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(owner);
                Some(RowGuard { table: self, key })
            }
            Entry::Occupied(_) => None,
        }
    }

    pub fn is_locked(&self, key: &RowKey) -> bool {
        self.owners.contains_key(key)
    }

    /// Number of rows currently owned by some transaction.
    pub fn held_count(&self) -> usize {
        self.owners.len()
    }

    fn release(&self, key: RowKey) {
        self.owners.remove(&key);
        let _waiting = self.wait_lock.lock();
        self.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_try_lock_is_exclusive() {
        let table = LockTable::new();
        let key = RowKey::Order(OrderId::new());

        let guard = table.try_lock(key, 1).unwrap();
        assert!(table.try_lock(key, 2).is_none());
        assert!(table.is_locked(&key));

        drop(guard);
        assert!(!table.is_locked(&key));
        assert!(table.try_lock(key, 2).is_some());
    }

    #[test]
    fn test_distinct_rows_do_not_contend() {
        let table = LockTable::new();
        let _a = table.try_lock(RowKey::Account(AccountId::new()), 1).unwrap();
        let _b = table.try_lock(RowKey::Account(AccountId::new()), 2).unwrap();
        assert_eq!(table.held_count(), 2);
    }

    #[test]
    fn test_blocking_lock_waits_for_release() {
        let table = Arc::new(LockTable::new());
        let key = RowKey::Holding(HoldingId::new());
        let guard = table.try_lock(key, 1).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                let _guard = table.lock(key, 2);
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        assert!(!table.is_locked(&key));
    }

    #[test]
    fn test_owner_ids_are_unique() {
        let table = LockTable::new();
        let a = table.next_owner_id();
        let b = table.next_owner_id();
        assert_ne!(a, b);
    }
}
