//! Durable order book store
//!
//! Owns the journal writer and the snapshot schedule. One journal frame is
//! written per committed transaction; snapshots are taken after the frame is
//! applied and never replace the journal.

use crate::config::EngineConfig;
use persistence::{
    JournalEntry, JournalWriter, LedgerState, Mutation, MutationApplier, RecoveryEngine,
    RecoveryMetrics, SnapshotCleanupPolicy, SnapshotIntervalPolicy, TxKind,
};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use types::errors::EngineError;

pub(crate) struct DurableStore {
    journal: JournalWriter,
    recovery: RecoveryEngine,
    interval: SnapshotIntervalPolicy,
    cleanup: SnapshotCleanupPolicy,
    snapshot_dir: PathBuf,
    compress: bool,
}

impl DurableStore {
    /// Open the journal and rebuild the ledger from the newest usable
    /// snapshot plus every later frame.
    pub(crate) fn open(
        config: &EngineConfig,
    ) -> Result<(Self, LedgerState, RecoveryMetrics), EngineError> {
        // The writer truncates a torn tail before the reader sees it.
        let mut journal = JournalWriter::open(config.journal_config()).map_err(EngineError::storage)?;
        let recovery = RecoveryEngine::new(config.snapshot_dir(), config.journal_dir());
        let (state, metrics) = recovery
            .recover(&MutationApplier, None)
            .map_err(EngineError::storage)?;
        journal.set_next_sequence(metrics.final_sequence + 1);

        let mut interval = SnapshotIntervalPolicy::with_interval(config.snapshot_interval);
        interval.record_snapshot(metrics.snapshot_sequence);

        let store = Self {
            journal,
            recovery,
            interval,
            cleanup: SnapshotCleanupPolicy::new(config.snapshot_retain.max(1)),
            snapshot_dir: config.snapshot_dir(),
            compress: config.compress_snapshots,
        };
        Ok((store, state, metrics))
    }

    /// Journal one transaction. Nothing is written if this fails.
    pub(crate) fn append(
        &mut self,
        kind: TxKind,
        timestamp: i64,
        batch: &[Mutation],
    ) -> Result<JournalEntry, EngineError> {
        let payload = Mutation::encode_batch(batch).map_err(EngineError::storage)?;
        self.journal
            .append(kind, timestamp, payload)
            .map_err(EngineError::storage)
    }

    /// Last journal sequence reflected in the ledger.
    pub(crate) fn last_sequence(&self) -> u64 {
        self.journal.next_sequence() - 1
    }

    /// Snapshot if one is due. Failures are logged; the journal still holds
    /// every committed transaction.
    pub(crate) fn maybe_snapshot(&mut self, state: &LedgerState) {
        let sequence = self.last_sequence();
        if !self.interval.should_snapshot(sequence) {
            return;
        }
        if let Err(err) = self.snapshot(state) {
            warn!(sequence, error = %err, "scheduled snapshot failed");
        }
    }

    /// Snapshot now, returning the journal sequence it covers.
    pub(crate) fn snapshot(&mut self, state: &LedgerState) -> Result<u64, EngineError> {
        let sequence = self.last_sequence();
        self.journal.sync().map_err(EngineError::storage)?;
        let path = self
            .recovery
            .take_snapshot(state, sequence, state.last_timestamp, self.compress)
            .map_err(EngineError::storage)?;
        self.interval.record_snapshot(sequence);
        info!(sequence, path = %path.display(), "snapshot written");

        match self.cleanup.cleanup(&self.snapshot_dir) {
            Ok(removed) if !removed.is_empty() => {
                debug!(removed = removed.len(), "old snapshots removed")
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "snapshot cleanup failed"),
        }
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use types::prelude::*;

    fn config(dir: &TempDir) -> EngineConfig {
        EngineConfig {
            snapshot_interval: 2,
            snapshot_retain: 1,
            ..EngineConfig::new(dir.path())
        }
    }

    fn account_batch() -> Vec<Mutation> {
        vec![Mutation::PutAccount(Account::new(AccountId::new(), 1))]
    }

    #[test]
    fn test_fresh_store_starts_empty() {
        let dir = TempDir::new().unwrap();
        let (store, state, metrics) = DurableStore::open(&config(&dir)).unwrap();
        assert_eq!(store.last_sequence(), 0);
        assert!(state.accounts.is_empty());
        assert_eq!(metrics.replay_count, 0);
    }

    #[test]
    fn test_reopen_replays_journal() {
        let dir = TempDir::new().unwrap();
        {
            let (mut store, mut state, _) = DurableStore::open(&config(&dir)).unwrap();
            for ts in 1..=3 {
                let batch = account_batch();
                store.append(TxKind::OpenAccount, ts, &batch).unwrap();
                state.apply_batch(ts, &batch).unwrap();
            }
        }

        let (store, state, metrics) = DurableStore::open(&config(&dir)).unwrap();
        assert_eq!(store.last_sequence(), 3);
        assert_eq!(state.accounts.len(), 3);
        assert_eq!(state.last_timestamp, 3);
        assert_eq!(metrics.replay_count, 3);
    }

    #[test]
    fn test_scheduled_snapshot_shortens_replay() {
        let dir = TempDir::new().unwrap();
        {
            let (mut store, mut state, _) = DurableStore::open(&config(&dir)).unwrap();
            for ts in 1..=3 {
                let batch = account_batch();
                store.append(TxKind::OpenAccount, ts, &batch).unwrap();
                state.apply_batch(ts, &batch).unwrap();
                store.maybe_snapshot(&state);
            }
        }

        let (_, state, metrics) = DurableStore::open(&config(&dir)).unwrap();
        assert_eq!(metrics.snapshot_sequence, 2);
        assert_eq!(metrics.replay_count, 1);
        assert_eq!(state.accounts.len(), 3);
    }
}
