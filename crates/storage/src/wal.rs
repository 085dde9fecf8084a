// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log: the Update Journal's durability primitive (L2, §6).
//!
//! Every phase transition the Update Engine makes, and every router
//! command the PBR Engine/Chain Router issue, is appended here before
//! it takes effect. On restart the daemon calls [`Wal::entries_after`]
//! from the last snapshot's sequence number to rebuild
//! [`crate::state::MaterializedState`] and discover in-flight updates
//! that never reached `Commit` (§4.3 crash safety, §8 scenario 3).
//!
//! A line is one JSON-encoded [`WalEntry<T>`] per append. A crash mid-write
//! can leave a truncated or binary-garbage tail; [`Wal::open`] detects
//! that tail, rotates the whole file (pre-truncation) to `.bak`, shifting
//! older backups down to `.bak.2`/`.bak.3` and dropping anything older,
//! then continues with only the well-formed prefix.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

const FLUSH_THRESHOLD: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BACKUPS: u8 = 3;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wal entry serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry<T> {
    pub seq: u64,
    pub event: T,
}

/// An append-only, crash-recoverable JSON-lines log of `T`. Used
/// directly for the Update Journal's [`crate::journal`] (T =
/// `JournalEntry` transition) and for the router-command log the PBR
/// Engine and Chain Router replay on restart (T = `nnc_core::Event`).
pub struct Wal<T> {
    path: PathBuf,
    file: File,
    write_seq: u64,
    processed_seq: u64,
    read_pos: u64,
    unflushed: usize,
    last_flush: Instant,
    _entry: PhantomData<T>,
}

impl<T> Wal<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let (write_seq, valid_end) = if path.exists() {
            Self::recover(&path)?
        } else {
            File::create(&path)?;
            (0, 0)
        };

        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        Ok(Self {
            path,
            file,
            write_seq,
            processed_seq,
            read_pos: valid_end,
            unflushed: 0,
            last_flush: Instant::now(),
            _entry: PhantomData,
        })
    }

    /// Scans the file for the longest well-formed JSON-lines prefix.
    /// Anything after the first malformed or non-UTF-8 line (or an
    /// unterminated trailing line) is treated as crash garbage: the
    /// whole pre-recovery file is rotated to `.bak` and the file on
    /// disk is truncated to the valid prefix. Returns `(max seq seen,
    /// byte length of the valid prefix)`.
    fn recover(path: &Path) -> Result<(u64, u64), WalError> {
        let raw = std::fs::read(path)?;
        let mut offset = 0usize;
        let mut valid_end = 0usize;
        let mut write_seq = 0u64;
        let mut corrupt = false;

        while offset < raw.len() {
            let newline = raw[offset..].iter().position(|&b| b == b'\n');
            let Some(rel_newline) = newline else {
                corrupt = true;
                break;
            };
            let line_bytes = &raw[offset..offset + rel_newline];
            let consumed = rel_newline + 1;

            match std::str::from_utf8(line_bytes) {
                Ok(line) if line.trim().is_empty() => {
                    offset += consumed;
                    valid_end = offset;
                }
                Ok(line) => match serde_json::from_str::<WalEntry<T>>(line.trim_end()) {
                    Ok(entry) => {
                        write_seq = write_seq.max(entry.seq);
                        offset += consumed;
                        valid_end = offset;
                    }
                    Err(_) => {
                        corrupt = true;
                        break;
                    }
                },
                Err(_) => {
                    corrupt = true;
                    break;
                }
            }
        }

        if corrupt {
            Self::rotate_backups(path)?;
            std::fs::write(path, &raw[..valid_end])?;
            tracing::warn!(
                path = %path.display(),
                recovered_bytes = valid_end,
                "wal corruption detected on open, rotated to backup and truncated to last valid entry"
            );
        }

        Ok((write_seq, valid_end as u64))
    }

    fn rotate_backups(path: &Path) -> Result<(), WalError> {
        let bak1 = path.with_extension("bak");
        let bak2 = path.with_extension("bak.2");
        let bak3 = path.with_extension("bak.3");
        debug_assert_eq!(MAX_BACKUPS, 3, "backup rotation depth is hard-coded to bak/bak.2/bak.3");

        if bak3.exists() {
            std::fs::remove_file(&bak3)?;
        }
        if bak2.exists() {
            std::fs::rename(&bak2, &bak3)?;
        }
        if bak1.exists() {
            std::fs::rename(&bak1, &bak2)?;
        }
        std::fs::copy(path, &bak1)?;
        Ok(())
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    pub fn append(&mut self, event: &T) -> Result<u64, WalError> {
        let seq = self.write_seq + 1;
        let entry = WalEntry { seq, event: event.clone() };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.write_seq = seq;
        self.unflushed += 1;
        Ok(seq)
    }

    pub fn flush(&mut self) -> Result<(), WalError> {
        self.file.sync_data()?;
        self.unflushed = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    pub fn needs_flush(&self) -> bool {
        self.unflushed >= FLUSH_THRESHOLD
            || (self.unflushed > 0 && self.last_flush.elapsed() >= FLUSH_INTERVAL)
    }

    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    /// Returns the next entry with `seq > processed_seq`, advancing an
    /// internal read cursor. A malformed line stops this call (returns
    /// `Ok(None)`) but still advances past it, so a subsequent call
    /// picks back up at the next line written after the corruption —
    /// this is how a daemon that appends through a crash keeps making
    /// progress instead of wedging on one bad line forever.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry<T>>, WalError> {
        let mut reader = {
            let mut f = File::open(&self.path)?;
            f.seek(SeekFrom::Start(self.read_pos))?;
            BufReader::new(f)
        };

        loop {
            let mut raw = Vec::new();
            let read = reader.read_until(b'\n', &mut raw)?;
            if read == 0 {
                return Ok(None);
            }
            self.read_pos += read as u64;

            let line = match std::str::from_utf8(&raw) {
                Ok(s) => s.trim_end_matches(['\n', '\r']),
                Err(_) => return Ok(None),
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WalEntry<T>>(line) {
                Ok(entry) if entry.seq <= self.processed_seq => continue,
                Ok(entry) => return Ok(Some(entry)),
                Err(_) => return Ok(None),
            }
        }
    }

    /// Every well-formed entry with `seq > after`, read fresh from disk
    /// from the start of the file. Stops at the first malformed or
    /// non-UTF-8 line rather than erroring, on the assumption that line
    /// marks the live tail of an in-progress write.
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry<T>>, WalError> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();

        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WalEntry<T>>(&line) {
                Ok(entry) => {
                    if entry.seq > after {
                        out.push(entry);
                    }
                }
                Err(_) => break,
            }
        }
        Ok(out)
    }

    /// Rewrites the file keeping only entries with `seq >= keep_from`,
    /// used after a snapshot to bound WAL growth (§6).
    pub fn truncate_before(&mut self, keep_from: u64) -> Result<(), WalError> {
        let kept = self.entries_after(keep_from.saturating_sub(1))?;
        let mut buf = Vec::new();
        for entry in &kept {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }
        std::fs::write(&self.path, &buf)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.read_pos = 0;
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
