//! Persistence for the collectibles exchange ledger
//!
//! Provides the append-only transaction journal, sequential reading with
//! corruption detection, ledger snapshots, and crash recovery.
//!
//! A committed engine transaction is exactly one journal frame carrying a
//! batch of [`state::Mutation`]s. State is rebuilt by loading the newest
//! snapshot and replaying the frames after it.

pub mod journal;
pub mod reader;
pub mod recovery;
pub mod snapshot;
pub mod state;

pub use journal::{FsyncPolicy, JournalConfig, JournalEntry, JournalError, JournalWriter, TxKind};
pub use reader::{JournalReader, ReaderError};
pub use recovery::{EventApplier, MutationApplier, RecoveryEngine, RecoveryError, RecoveryMetrics};
pub use snapshot::{
    Snapshot, SnapshotCleanupPolicy, SnapshotError, SnapshotIntervalPolicy, SnapshotLoader,
    SnapshotWriter,
};
pub use state::{LedgerState, Mutation, StateError};
