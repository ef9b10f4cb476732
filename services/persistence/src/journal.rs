//! Journal Writer: Append-only transaction journal with checksums
//!
//! Every engine transaction is committed as exactly one frame, so a frame
//! is the unit of atomicity: it is either fully on disk with a valid
//! checksum, or it is discarded on the next open.
//!
//! # Binary Format (per frame)
//! ```text
//! [body_len:    u32]
//! [sequence:    u64]
//! [timestamp:   i64]
//! [kind:        u8 ]
//! [payload_len: u32][payload: bytes]
//! [checksum:    u32]  // CRC32C over sequence+timestamp+kind+payload
//! ```

use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Frame too short: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("Unknown transaction kind: {0}")]
    UnknownKind(u8),

    #[error("Corruption in {file} at byte offset {offset}: {detail}")]
    Corrupted {
        file: PathBuf,
        offset: u64,
        detail: String,
    },

    #[error("Journal size limit exceeded: {current} >= {limit}")]
    SizeLimitExceeded { current: u64, limit: u64 },

    #[error("Journal is unusable after a failed rollback; reopen required")]
    Poisoned,
}

// ── Transaction kind ────────────────────────────────────────────────

/// What produced a frame. Informational: replay applies the payload the
/// same way regardless of kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxKind {
    PlaceOrder = 1,
    CancelOrder = 2,
    OpenAccount = 3,
    Deposit = 4,
    Withdraw = 5,
    RegisterHolding = 6,
    CustodyUpdate = 7,
}

impl TryFrom<u8> for TxKind {
    type Error = JournalError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => TxKind::PlaceOrder,
            2 => TxKind::CancelOrder,
            3 => TxKind::OpenAccount,
            4 => TxKind::Deposit,
            5 => TxKind::Withdraw,
            6 => TxKind::RegisterHolding,
            7 => TxKind::CustodyUpdate,
            other => return Err(JournalError::UnknownKind(other)),
        })
    }
}

// ── Journal Entry ───────────────────────────────────────────────────

/// Fixed part of a body: seq + ts + kind + payload_len + crc
const MIN_BODY_LEN: usize = 8 + 8 + 1 + 4 + 4;

/// Anything larger is treated as a corrupt length prefix.
const MAX_BODY_LEN: usize = 256 * 1024 * 1024;

/// One committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Gapless commit sequence, starting at 1
    pub sequence: u64,
    /// Unix nanosecond commit timestamp
    pub timestamp: i64,
    pub kind: TxKind,
    /// Bincode-encoded mutation batch
    pub payload: Vec<u8>,
    pub checksum: u32,
}

impl JournalEntry {
    /// Create a new entry, computing the CRC32C checksum automatically.
    pub fn new(sequence: u64, timestamp: i64, kind: TxKind, payload: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(sequence, timestamp, kind as u8, &payload);
        Self {
            sequence,
            timestamp,
            kind,
            payload,
            checksum,
        }
    }

    pub fn compute_checksum(sequence: u64, timestamp: i64, kind: u8, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(8 + 8 + 1 + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.push(kind);
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum
            == Self::compute_checksum(self.sequence, self.timestamp, self.kind as u8, &self.payload)
    }

    /// Serialize entry to the binary frame format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body_len = (MIN_BODY_LEN + self.payload.len()) as u32;

        let mut buf = Vec::with_capacity(4 + body_len as usize);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Decode one frame from the front of `data`.
    ///
    /// Returns `(entry, bytes_consumed)`. The checksum is NOT verified here;
    /// callers decide how to treat a mismatch.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), JournalError> {
        let body_len = read_u32(data, 0)? as usize;
        if body_len > MAX_BODY_LEN {
            return Err(JournalError::Serialization(format!(
                "Implausible body length: {} (likely corruption)",
                body_len
            )));
        }
        if body_len < MIN_BODY_LEN {
            return Err(JournalError::Serialization(format!(
                "Body too small: {} bytes, minimum is {}",
                body_len, MIN_BODY_LEN
            )));
        }

        let total = 4 + body_len;
        if data.len() < total {
            return Err(JournalError::Incomplete {
                needed: total,
                available: data.len(),
            });
        }

        let body = &data[4..total];
        let sequence = read_u64(body, 0)?;
        let timestamp = read_u64(body, 8)? as i64;
        let kind = TxKind::try_from(body[16])?;
        let payload_len = read_u32(body, 17)? as usize;

        if 21 + payload_len + 4 != body.len() {
            return Err(JournalError::Serialization(format!(
                "payload_len {} disagrees with body length {}",
                payload_len,
                body.len()
            )));
        }
        let payload = body[21..21 + payload_len].to_vec();
        let checksum = read_u32(body, 21 + payload_len)?;

        Ok((
            Self {
                sequence,
                timestamp,
                kind,
                payload,
                checksum,
            },
            total,
        ))
    }
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, JournalError> {
    let bytes: [u8; 4] = data
        .get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(JournalError::Incomplete {
            needed: at + 4,
            available: data.len(),
        })?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(data: &[u8], at: usize) -> Result<u64, JournalError> {
    let bytes: [u8; 8] = data
        .get(at..at + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or(JournalError::Incomplete {
            needed: at + 8,
            available: data.len(),
        })?;
    Ok(u64::from_le_bytes(bytes))
}

// ── Fsync Policy ────────────────────────────────────────────────────

/// Controls when `fsync` is called. Frames always reach the OS before
/// `append` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsyncPolicy {
    /// Fsync after every commit.
    EveryCommit,
    /// Fsync every N commits (and on rotation).
    EveryN(usize),
}

// ── Journal Writer Configuration ────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory for journal files.
    pub dir: PathBuf,
    /// Maximum file size in bytes before rotation (default 64 MiB).
    pub max_file_size: u64,
    /// Maximum total journal size in bytes (0 = unlimited).
    pub max_total_size: u64,
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: 64 * 1024 * 1024, // 64 MiB
            max_total_size: 0,                // unlimited
            fsync_policy: FsyncPolicy::EveryCommit,
        }
    }
}

// ── Journal Writer ──────────────────────────────────────────────────

/// Append-only journal writer with checksums, rotation and rollback of
/// failed appends.
pub struct JournalWriter {
    config: JournalConfig,
    file: File,
    current_file: PathBuf,
    /// Length of the current file up to the last fully written frame
    committed_len: u64,
    next_sequence: u64,
    writes_since_fsync: usize,
    file_index: u64,
    total_size: u64,
    poisoned: bool,
}

impl JournalWriter {
    /// Open the latest journal file for appending, creating the directory
    /// if needed. A torn frame at the end of the latest file is truncated.
    pub fn open(config: JournalConfig) -> Result<Self, JournalError> {
        fs::create_dir_all(&config.dir)?;

        let file_index = latest_index(&config.dir)?.unwrap_or(0);
        let current_file = journal_path(&config.dir, file_index);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&current_file)?;

        let committed_len = truncate_torn_tail(&file, &current_file)?;
        let total_size = compute_total_size(&config.dir)?;

        Ok(Self {
            config,
            file,
            current_file,
            committed_len,
            next_sequence: 1,
            writes_since_fsync: 0,
            file_index,
            total_size,
            poisoned: false,
        })
    }

    /// Set the next sequence number (after recovery).
    pub fn set_next_sequence(&mut self, seq: u64) {
        self.next_sequence = seq;
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn current_file_path(&self) -> &Path {
        &self.current_file
    }

    /// Append one transaction frame and return it.
    ///
    /// On error nothing of the frame remains in the file and the sequence
    /// is not consumed.
    pub fn append(
        &mut self,
        kind: TxKind,
        timestamp: i64,
        payload: Vec<u8>,
    ) -> Result<JournalEntry, JournalError> {
        if self.poisoned {
            return Err(JournalError::Poisoned);
        }

        if self.config.max_total_size > 0 && self.total_size >= self.config.max_total_size {
            return Err(JournalError::SizeLimitExceeded {
                current: self.total_size,
                limit: self.config.max_total_size,
            });
        }

        if self.committed_len >= self.config.max_file_size {
            self.rotate()?;
        }

        let entry = JournalEntry::new(self.next_sequence, timestamp, kind, payload);
        let bytes = entry.to_bytes();

        if let Err(err) = self.write_frame(&bytes) {
            self.rollback();
            return Err(err);
        }

        let written = bytes.len() as u64;
        self.committed_len += written;
        self.total_size += written;
        self.next_sequence += 1;
        debug!(sequence = entry.sequence, kind = ?kind, bytes = written, "journal frame committed");

        Ok(entry)
    }

    /// Force fsync (used before shutdown / snapshots).
    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.file.sync_all()?;
        self.writes_since_fsync = 0;
        Ok(())
    }

    // ── Internal Helpers ────────────────────────────────────────────

    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), JournalError> {
        self.file.write_all(bytes)?;
        self.file.flush()?;
        self.writes_since_fsync += 1;

        let should_fsync = match self.config.fsync_policy {
            FsyncPolicy::EveryCommit => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
        };
        if should_fsync {
            self.file.sync_data()?;
            self.writes_since_fsync = 0;
        }
        Ok(())
    }

    /// Cut the file back to the last good frame after a failed write.
    fn rollback(&mut self) {
        if let Err(err) = self.file.set_len(self.committed_len) {
            warn!(error = %err, file = %self.current_file.display(), "journal rollback failed");
            self.poisoned = true;
        }
    }

    fn rotate(&mut self) -> Result<(), JournalError> {
        self.sync()?;

        self.file_index += 1;
        self.current_file = journal_path(&self.config.dir, self.file_index);
        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.current_file)?;
        self.committed_len = 0;
        debug!(file = %self.current_file.display(), "journal rotated");
        Ok(())
    }
}

// ── File helpers (shared with the reader) ───────────────────────────

pub(crate) fn journal_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("journal-{:06}.bin", index))
}

pub(crate) fn parse_index(name: &str) -> Option<u64> {
    name.strip_prefix("journal-")?
        .strip_suffix(".bin")?
        .parse::<u64>()
        .ok()
}

/// All journal files in `dir`, sorted by index.
pub(crate) fn list_journal_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>, io::Error> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<(u64, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            parse_index(&name).map(|idx| (idx, e.path()))
        })
        .collect();
    files.sort_by_key(|(idx, _)| *idx);
    Ok(files)
}

fn latest_index(dir: &Path) -> Result<Option<u64>, io::Error> {
    Ok(list_journal_files(dir)?.last().map(|(idx, _)| *idx))
}

fn compute_total_size(dir: &Path) -> Result<u64, io::Error> {
    let mut total = 0u64;
    for (_, path) in list_journal_files(dir)? {
        total += fs::metadata(path)?.len();
    }
    Ok(total)
}

/// Scan `file` frame by frame and truncate a torn final frame.
///
/// A frame that fails to decode or verify is torn only if nothing follows
/// it; anything else is corruption of a committed transaction.
fn truncate_torn_tail(mut file: &File, path: &Path) -> Result<u64, JournalError> {
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    let valid = scan_valid_prefix(&data, path)?;
    if valid < data.len() {
        warn!(
            file = %path.display(),
            kept = valid,
            dropped = data.len() - valid,
            "truncating torn journal tail"
        );
        file.set_len(valid as u64)?;
        file.sync_all()?;
    }
    Ok(valid as u64)
}

/// Length of the prefix of `data` made of valid frames.
pub(crate) fn scan_valid_prefix(data: &[u8], path: &Path) -> Result<usize, JournalError> {
    let mut pos = 0usize;
    while pos < data.len() {
        match JournalEntry::from_bytes(&data[pos..]) {
            Ok((entry, consumed)) => {
                if !entry.verify_checksum() {
                    if pos + consumed == data.len() {
                        return Ok(pos);
                    }
                    return Err(JournalError::Corrupted {
                        file: path.to_path_buf(),
                        offset: pos as u64,
                        detail: format!("CRC32C mismatch for seq={}", entry.sequence),
                    });
                }
                pos += consumed;
            }
            Err(JournalError::Incomplete { .. }) => return Ok(pos),
            Err(err) => {
                return Err(JournalError::Corrupted {
                    file: path.to_path_buf(),
                    offset: pos as u64,
                    detail: err.to_string(),
                })
            }
        }
    }
    Ok(pos)
}

// ── Tests ───────────────────────────────────────────────────────────
