//! Journal Reader: Sequential reader with corruption detection
//!
//! Reads every journal file in index order and validates each frame's
//! CRC32C checksum as well as gapless sequence numbering.
//!
//! Only the tail of the newest file may be damaged (a commit that was torn
//! by a crash); such a tail is skipped. Damage anywhere else belongs to a
//! transaction that was acknowledged, and is reported as corruption.

use crate::journal::{list_journal_files, scan_valid_prefix, JournalEntry, JournalError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },
}

// ── Journal Reader ──────────────────────────────────────────────────

pub struct JournalReader {
    /// All journal file paths, sorted by index.
    files: Vec<PathBuf>,
    /// Index of the next file to load.
    next_file_idx: usize,
    /// Valid bytes of the current file.
    data: Vec<u8>,
    pos: usize,
    last_sequence: Option<u64>,
    /// Bytes skipped as a torn tail, if any.
    torn_tail_bytes: usize,
}

impl JournalReader {
    /// Open a reader over all journal files in the given directory.
    pub fn open(dir: &Path) -> Result<Self, ReaderError> {
        let files = list_journal_files(dir)?
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        Ok(Self {
            files,
            next_file_idx: 0,
            data: Vec::new(),
            pos: 0,
            last_sequence: None,
            torn_tail_bytes: 0,
        })
    }

    /// Read the next valid entry.
    ///
    /// Returns `None` when all entries have been read.
    pub fn next_entry(&mut self) -> Result<Option<JournalEntry>, ReaderError> {
        while self.pos >= self.data.len() {
            if !self.load_next_file()? {
                return Ok(None);
            }
        }

        let (entry, consumed) = JournalEntry::from_bytes(&self.data[self.pos..])?;
        self.pos += consumed;

        if let Some(prev) = self.last_sequence {
            if entry.sequence != prev + 1 {
                return Err(ReaderError::SequenceGap {
                    expected: prev + 1,
                    got: entry.sequence,
                });
            }
        }
        self.last_sequence = Some(entry.sequence);
        Ok(Some(entry))
    }

    pub fn read_all(&mut self) -> Result<Vec<JournalEntry>, ReaderError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Skip entries with `sequence < target_seq`. Returns how many were skipped.
    pub fn seek_to_sequence(&mut self, target_seq: u64) -> Result<u64, ReaderError> {
        let mut skipped = 0u64;
        loop {
            while self.pos >= self.data.len() {
                if !self.load_next_file()? {
                    return Ok(skipped);
                }
            }
            let (entry, consumed) = JournalEntry::from_bytes(&self.data[self.pos..])?;
            if entry.sequence >= target_seq {
                return Ok(skipped);
            }
            self.pos += consumed;
            self.last_sequence = Some(entry.sequence);
            skipped += 1;
        }
    }

    /// Last successfully read sequence number.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn torn_tail_bytes(&self) -> usize {
        self.torn_tail_bytes
    }

    // ── Internal Helpers ────────────────────────────────────────────

    /// Load the valid prefix of the next file. Returns false when exhausted.
    fn load_next_file(&mut self) -> Result<bool, ReaderError> {
        let Some(path) = self.files.get(self.next_file_idx).cloned() else {
            return Ok(false);
        };
        let is_last = self.next_file_idx + 1 == self.files.len();
        self.next_file_idx += 1;

        let mut data = fs::read(&path)?;
        let valid = scan_valid_prefix(&data, &path)?;
        if valid < data.len() {
            if !is_last {
                return Err(JournalError::Corrupted {
                    file: path,
                    offset: valid as u64,
                    detail: "truncated frame in a sealed journal file".to_string(),
                }
                .into());
            }
            warn!(file = %path.display(), dropped = data.len() - valid, "skipping torn journal tail");
            self.torn_tail_bytes = data.len() - valid;
            data.truncate(valid);
        }

        self.data = data;
        self.pos = 0;
        Ok(true)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
