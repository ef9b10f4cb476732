//! Snapshot System: Ledger snapshots with integrity and compression
//!
//! Features:
//! - Full ledger serialization with bincode (`BTreeMap` keeps it deterministic)
//! - SHA-256 integrity hash over serialized state
//! - Optional zstd compression
//! - Snapshot versioning for forward compatibility
//! - Atomic write (tmp file + fsync + rename)
//! - Interval policy (every N commits) and cleanup policy (keep last N)

use crate::state::{LedgerState, StateError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("No snapshots found")]
    NoSnapshots,
}

impl From<StateError> for SnapshotError {
    fn from(err: StateError) -> Self {
        SnapshotError::Serialization(err.to_string())
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// The ledger as of a journal sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// Last journal sequence folded into `state`.
    pub sequence: u64,
    /// Unix nanosecond timestamp when snapshot was taken.
    pub timestamp: i64,
    pub state: LedgerState,
    /// SHA-256 hash of the serialized state.
    pub checksum: String,
}

impl Snapshot {
    pub fn new(sequence: u64, timestamp: i64, state: LedgerState) -> Result<Self, SnapshotError> {
        let checksum = state.compute_hash()?;
        Ok(Self {
            version: SNAPSHOT_VERSION,
            sequence,
            timestamp,
            state,
            checksum,
        })
    }

    pub fn verify_integrity(&self) -> bool {
        self.state
            .compute_hash()
            .map(|computed| computed == self.checksum)
            .unwrap_or(false)
    }
}

// ── Snapshot Writer ─────────────────────────────────────────────────

/// Writes snapshots to disk with optional zstd compression.
pub struct SnapshotWriter {
    dir: PathBuf,
    compress: bool,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            dir: dir.into(),
            compress,
        }
    }

    /// Write a snapshot atomically: serialize → compress → tmp → fsync → rename.
    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(&self.dir)?;

        let data = bincode::serialize(snapshot)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        let (final_data, ext) = if self.compress {
            let compressed = zstd::encode_all(data.as_slice(), 3)
                .map_err(|e| SnapshotError::Compression(e.to_string()))?;
            (compressed, "snap.zst")
        } else {
            (data, "snap")
        };

        let filename = format!("snapshot-{:012}.{}", snapshot.sequence, ext);
        let path = self.dir.join(&filename);
        let tmp_path = self.dir.join(format!("{}.tmp", filename));

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&final_data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        debug!(sequence = snapshot.sequence, path = %path.display(), "snapshot written");
        Ok(path)
    }
}

// ── Snapshot Loader ─────────────────────────────────────────────────

/// Loads snapshots from disk, verifying integrity.
pub struct SnapshotLoader {
    dir: PathBuf,
}

impl SnapshotLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn load(&self, path: &Path) -> Result<Snapshot, SnapshotError> {
        let data = fs::read(path)?;

        let is_compressed = path.extension().map(|e| e == "zst").unwrap_or(false);
        let decompressed = if is_compressed {
            zstd::decode_all(data.as_slice())
                .map_err(|e| SnapshotError::Compression(e.to_string()))?
        } else {
            data
        };

        let snapshot: Snapshot = bincode::deserialize(&decompressed)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }

        let actual = snapshot.state.compute_hash()?;
        if actual != snapshot.checksum {
            return Err(SnapshotError::IntegrityFailure {
                expected: snapshot.checksum.clone(),
                actual,
            });
        }

        Ok(snapshot)
    }

    /// Load the newest snapshot that passes verification.
    ///
    /// Damaged snapshots are skipped with a warning; the journal still holds
    /// everything after the older snapshot.
    pub fn load_latest(&self) -> Result<Snapshot, SnapshotError> {
        let mut snapshots = self.list_snapshots()?;
        snapshots.reverse();
        for (seq, path) in snapshots {
            match self.load(&path) {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) => {
                    warn!(sequence = seq, path = %path.display(), error = %err, "skipping unreadable snapshot")
                }
            }
        }
        Err(SnapshotError::NoSnapshots)
    }

    /// List all snapshots as (sequence, path) pairs, ascending.
    pub fn list_snapshots(&self) -> Result<Vec<(u64, PathBuf)>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(seq) = Self::parse_sequence(&name) {
                results.push((seq, entry.path()));
            }
        }
        results.sort_by_key(|(seq, _)| *seq);
        Ok(results)
    }

    fn parse_sequence(filename: &str) -> Option<u64> {
        let stem = filename.strip_prefix("snapshot-")?;
        let digits = stem
            .strip_suffix(".snap.zst")
            .or_else(|| stem.strip_suffix(".snap"))?;
        digits.parse::<u64>().ok()
    }
}

// ── Snapshot Interval Policy ────────────────────────────────────────

/// Decides when the next snapshot is due.
#[derive(Debug, Clone)]
pub struct SnapshotIntervalPolicy {
    /// Snapshot every N commits; 0 disables snapshots.
    pub interval: u64,
    /// Last sequence at which a snapshot was taken.
    pub last_snapshot_seq: u64,
}

impl SnapshotIntervalPolicy {
    pub fn with_interval(interval: u64) -> Self {
        Self {
            interval,
            last_snapshot_seq: 0,
        }
    }

    pub fn should_snapshot(&self, current_seq: u64) -> bool {
        self.interval > 0 && current_seq >= self.last_snapshot_seq + self.interval
    }

    pub fn record_snapshot(&mut self, seq: u64) {
        self.last_snapshot_seq = seq;
    }
}

// ── Snapshot Cleanup Policy ─────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SnapshotCleanupPolicy {
    /// Maximum number of snapshots to retain.
    pub max_snapshots: usize,
}

impl SnapshotCleanupPolicy {
    pub fn new(max_snapshots: usize) -> Self {
        Self { max_snapshots }
    }

    /// Remove old snapshots, keeping only the most recent `max_snapshots`.
    pub fn cleanup(&self, dir: &Path) -> Result<Vec<PathBuf>, SnapshotError> {
        let snapshots = SnapshotLoader::new(dir).list_snapshots()?;

        let mut removed = Vec::new();
        if snapshots.len() > self.max_snapshots {
            let to_remove = snapshots.len() - self.max_snapshots;
            for (_, path) in snapshots.iter().take(to_remove) {
                fs::remove_file(path)?;
                removed.push(path.clone());
            }
        }
        Ok(removed)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
