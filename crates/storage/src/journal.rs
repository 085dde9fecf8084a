// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Update Journal (L2, §4.3/§6): the crash-safe record of every phase
//! transition the Update Engine makes. Backed by a [`Wal<JournalEntry>`]
//! so a restart can tell, without re-contacting the router, which
//! updates never reached `Commit` and need rollback recovery (§8
//! scenario 3).
//!
//! `(instance_id, to_version, phase)` is unique: the Update Engine must
//! not be able to re-enter a phase for the same target version twice
//! concurrently (§3 Update Journal invariants).

use crate::wal::{Wal, WalError};
use nnc_core::{FeatureId, InstanceId, JournalEntry, JournalEntryId, JournalPhase, JournalStatus};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error("journal entry already open for instance {instance_id} version {to_version} phase {phase}")]
    AlreadyOpen { instance_id: InstanceId, to_version: String, phase: JournalPhase },
}

type Key = (InstanceId, String, JournalPhase);

/// Materialized journal state rebuilt from WAL replay, plus the open
/// handle used to append new transitions.
pub struct UpdateJournal {
    wal: Wal<JournalEntry>,
    entries: HashMap<JournalEntryId, JournalEntry>,
    by_key: HashMap<Key, JournalEntryId>,
}

impl UpdateJournal {
    /// Opens (or creates) the journal file and replays every entry
    /// written since `processed_seq` into in-memory state.
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self, JournalError> {
        let wal: Wal<JournalEntry> = Wal::open(path, processed_seq)?;
        let mut journal = Self { wal, entries: HashMap::new(), by_key: HashMap::new() };
        for wal_entry in journal.wal.entries_after(0)? {
            journal.apply(wal_entry.event);
        }
        Ok(journal)
    }

    fn apply(&mut self, entry: JournalEntry) {
        self.by_key.insert(entry.key(), entry.id.clone());
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Begins a new phase for an instance update, enforcing the
    /// `(instance_id, to_version, phase)` uniqueness invariant. If a
    /// terminal entry already occupies that key, it is reopened in
    /// place (same id, status reset to `Pending`) rather than appended
    /// as a new row — a retried phase must not fork its own history.
    pub fn begin(
        &mut self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        from_version: String,
        to_version: String,
        phase: JournalPhase,
        started_at_ms: u64,
    ) -> Result<JournalEntry, JournalError> {
        let key: Key = (instance_id, to_version.clone(), phase);
        if let Some(existing_id) = self.by_key.get(&key).cloned() {
            if let Some(existing) = self.entries.get(&existing_id).cloned() {
                if existing.status == JournalStatus::Pending {
                    return Err(JournalError::AlreadyOpen { instance_id, to_version, phase });
                }
                let mut entry = existing;
                entry.reopen(feature_id, from_version, started_at_ms);
                self.wal.append(&entry)?;
                self.apply(entry.clone());
                return Ok(entry);
            }
        }
        let entry = JournalEntry::begin(instance_id, feature_id, from_version, to_version, phase, started_at_ms);
        self.wal.append(&entry)?;
        self.apply(entry.clone());
        Ok(entry)
    }

    pub fn succeed(&mut self, id: &JournalEntryId, completed_at_ms: u64) -> Result<(), JournalError> {
        if let Some(entry) = self.entries.get(id).cloned() {
            let mut entry = entry;
            entry.succeed(completed_at_ms);
            self.wal.append(&entry)?;
            self.apply(entry);
        }
        Ok(())
    }

    pub fn fail(&mut self, id: &JournalEntryId, completed_at_ms: u64, error: String) -> Result<(), JournalError> {
        if let Some(entry) = self.entries.get(id).cloned() {
            let mut entry = entry;
            entry.fail(completed_at_ms, error);
            self.wal.append(&entry)?;
            self.apply(entry);
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), JournalError> {
        Ok(self.wal.flush()?)
    }

    /// Every entry that began but never reached a terminal status —
    /// the set the daemon must reconcile (resume or roll back) on
    /// startup (§4.3 crash recovery, §8 scenario 3).
    pub fn incomplete(&self) -> Vec<&JournalEntry> {
        let mut out: Vec<&JournalEntry> =
            self.entries.values().filter(|e| !e.status.is_terminal()).collect();
        out.sort_by_key(|e| e.started_at_ms);
        out
    }

    /// Full history for one instance, oldest first — backs the
    /// `GetUpdateHistory` query.
    pub fn history(&self, instance_id: &InstanceId) -> Vec<&JournalEntry> {
        let mut out: Vec<&JournalEntry> =
            self.entries.values().filter(|e| &e.instance_id == instance_id).collect();
        out.sort_by_key(|e| e.started_at_ms);
        out
    }

    pub fn get(&self, id: &JournalEntryId) -> Option<&JournalEntry> {
        self.entries.get(id)
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
