//! Recovery Flow: Boot from snapshot + journal replay
//!
//! Recovery process:
//! 1. Load the newest valid snapshot (if any)
//! 2. Open the journal reader and seek to `snapshot.sequence + 1`
//! 3. Replay every later frame through an `EventApplier`
//! 4. Optionally validate the final state hash
//!
//! Replay is deterministic: frames are applied in sequence order and each
//! frame is a self-contained batch of row images.

use crate::journal::JournalEntry;
use crate::reader::{JournalReader, ReaderError};
use crate::snapshot::{Snapshot, SnapshotError, SnapshotLoader, SnapshotWriter};
use crate::state::{LedgerState, Mutation, StateError};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("State hash divergence: expected {expected}, got {actual} at sequence {sequence}")]
    HashDivergence {
        expected: String,
        actual: String,
        sequence: u64,
    },

    #[error("Replay of sequence {sequence} failed: {detail}")]
    Apply { sequence: u64, detail: String },
}

// ── Recovery Metrics ────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RecoveryMetrics {
    pub snapshot_load_time_ms: u64,
    /// Sequence of the loaded snapshot (0 if none).
    pub snapshot_sequence: u64,
    /// Journal frames replayed on top of the snapshot.
    pub replay_count: u64,
    pub replay_time_ms: u64,
    pub total_recovery_time_ms: u64,
    pub final_state_hash: String,
    /// Last journal sequence reflected in the recovered state.
    pub final_sequence: u64,
}

// ── Event Applier ───────────────────────────────────────────────────

/// Applies one journal frame to the ledger.
pub trait EventApplier {
    fn apply(&self, state: &mut LedgerState, entry: &JournalEntry) -> Result<(), String>;
}

/// Decodes the frame's mutation batch and applies it.
pub struct MutationApplier;

impl EventApplier for MutationApplier {
    fn apply(&self, state: &mut LedgerState, entry: &JournalEntry) -> Result<(), String> {
        let batch = Mutation::decode_batch(&entry.payload).map_err(|e| e.to_string())?;
        state
            .apply_batch(entry.timestamp, &batch)
            .map_err(|e| e.to_string())
    }
}

// ── Recovery Engine ─────────────────────────────────────────────────

pub struct RecoveryEngine {
    snapshot_dir: PathBuf,
    journal_dir: PathBuf,
}

impl RecoveryEngine {
    pub fn new(snapshot_dir: impl Into<PathBuf>, journal_dir: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_dir: snapshot_dir.into(),
            journal_dir: journal_dir.into(),
        }
    }

    /// Full recovery: snapshot load + journal replay + optional hash check.
    pub fn recover(
        &self,
        applier: &dyn EventApplier,
        expected_hash: Option<&str>,
    ) -> Result<(LedgerState, RecoveryMetrics), RecoveryError> {
        let total_start = Instant::now();
        let mut metrics = RecoveryMetrics::default();

        let (mut state, snapshot_seq) = self.load_snapshot(&mut metrics)?;

        let mut reader = JournalReader::open(&self.journal_dir)?;
        if snapshot_seq > 0 {
            let skipped = reader.seek_to_sequence(snapshot_seq + 1)?;
            debug!(skipped, from = snapshot_seq + 1, "journal seek");
        }

        let replay_start = Instant::now();
        let mut last_seq = snapshot_seq;
        while let Some(entry) = reader.next_entry()? {
            applier
                .apply(&mut state, &entry)
                .map_err(|detail| RecoveryError::Apply {
                    sequence: entry.sequence,
                    detail,
                })?;
            last_seq = entry.sequence;
            metrics.replay_count += 1;
        }
        metrics.replay_time_ms = replay_start.elapsed().as_millis() as u64;
        metrics.final_sequence = last_seq;

        let final_hash = state.compute_hash()?;
        if let Some(expected) = expected_hash {
            if final_hash != expected {
                return Err(RecoveryError::HashDivergence {
                    expected: expected.to_string(),
                    actual: final_hash,
                    sequence: last_seq,
                });
            }
        }
        metrics.final_state_hash = final_hash;
        metrics.total_recovery_time_ms = total_start.elapsed().as_millis() as u64;

        info!(
            snapshot_sequence = metrics.snapshot_sequence,
            replayed = metrics.replay_count,
            final_sequence = last_seq,
            elapsed_ms = metrics.total_recovery_time_ms,
            "recovery complete"
        );

        Ok((state, metrics))
    }

    /// Write a snapshot of `state` as of journal `sequence`.
    pub fn take_snapshot(
        &self,
        state: &LedgerState,
        sequence: u64,
        timestamp: i64,
        compress: bool,
    ) -> Result<PathBuf, RecoveryError> {
        let writer = SnapshotWriter::new(&self.snapshot_dir, compress);
        let snapshot = Snapshot::new(sequence, timestamp, state.clone())?;
        Ok(writer.write(&snapshot)?)
    }

    // ── Internal ────────────────────────────────────────────────────

    fn load_snapshot(
        &self,
        metrics: &mut RecoveryMetrics,
    ) -> Result<(LedgerState, u64), RecoveryError> {
        let start = Instant::now();
        match SnapshotLoader::new(&self.snapshot_dir).load_latest() {
            Ok(snapshot) => {
                metrics.snapshot_load_time_ms = start.elapsed().as_millis() as u64;
                metrics.snapshot_sequence = snapshot.sequence;
                info!(
                    sequence = snapshot.sequence,
                    hash = %&snapshot.checksum[..16],
                    "snapshot loaded"
                );
                Ok((snapshot.state, snapshot.sequence))
            }
            Err(SnapshotError::NoSnapshots) => {
                debug!("no snapshots found, starting from empty state");
                Ok((LedgerState::empty(), 0))
            }
            Err(e) => Err(RecoveryError::Snapshot(e)),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
