//! Engine configuration
//!
//! Defaults come from [`EngineConfig::new`]; a JSON document can override
//! any subset of fields.

use persistence::{FsyncPolicy, JournalConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use types::errors::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory. Journal files live in `journal/`, snapshots in `snapshots/`.
    pub data_dir: PathBuf,
    /// Journal file rotation threshold in bytes.
    pub max_journal_file_size: u64,
    pub fsync: FsyncPolicy,
    /// Commits between automatic snapshots (0 = never).
    pub snapshot_interval: u64,
    /// Snapshots kept on disk.
    pub snapshot_retain: usize,
    pub compress_snapshots: bool,
    /// Ticks retained per symbol in memory and in snapshots.
    pub price_history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_journal_file_size: 64 * 1024 * 1024, // 64 MiB
            fsync: FsyncPolicy::EveryCommit,
            snapshot_interval: 10_000,
            snapshot_retain: 3,
            compress_snapshots: true,
            price_history_limit: 10_000,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::storage(format!("invalid engine config: {e}")))
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.data_dir.join("journal")
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    pub(crate) fn journal_config(&self) -> JournalConfig {
        JournalConfig {
            max_file_size: self.max_journal_file_size,
            fsync_policy: self.fsync,
            ..JournalConfig::new(self.journal_dir())
        }
    }
}
