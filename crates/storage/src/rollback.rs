// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rollback Store (L3, §3/§6): a short-lived, TTL-bounded record of the
//! router state that existed immediately before a Chain Router or PBR
//! Engine template was applied, so a failed apply (or an operator
//! `Undo`) can restore it. Persisted as a flat JSON snapshot rather than
//! a WAL — entries expire in minutes (`ROLLBACK_TTL_MS`), so there is
//! no replay/crash-recovery concern worth a log for.
//!
//! Sweeping expired entries is this store's job; *scheduling* the sweep
//! (a periodic tick) belongs to the engine crate that owns the clock
//! and the cancellation token.

use nnc_core::{RollbackState, RollbackStateId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RollbackStoreError {
    #[error("rollback store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("rollback store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    states: HashMap<RollbackStateId, RollbackState>,
}

/// `&self`-based so it can be shared as `Arc<RollbackStore>` across the
/// Chain Router, PBR Engine, and the periodic sweep task without an
/// outer lock.
pub struct RollbackStore {
    path: PathBuf,
    states: RwLock<HashMap<RollbackStateId, RollbackState>>,
}

impl RollbackStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RollbackStoreError> {
        let path = path.as_ref().to_path_buf();
        let states = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str::<Snapshot>(&raw)?.states
            }
        } else {
            HashMap::new()
        };
        Ok(Self { path, states: RwLock::new(states) })
    }

    fn persist(&self, states: &HashMap<RollbackStateId, RollbackState>) -> Result<(), RollbackStoreError> {
        let snapshot = Snapshot { states: states.clone() };
        let raw = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    pub fn put(&self, state: RollbackState) -> Result<(), RollbackStoreError> {
        let mut states = self.states.write();
        states.insert(state.id, state);
        self.persist(&states)
    }

    pub fn get(&self, id: &RollbackStateId) -> Option<RollbackState> {
        self.states.read().get(id).cloned()
    }

    /// Every entry recorded for `(router_id, template_id)`, expired or
    /// not — used to evict a slot's stale snapshot before recording a
    /// fresh one, so at most one pre-image survives per slot.
    pub fn ids_for(&self, router_id: &str, template_id: &str) -> Vec<RollbackStateId> {
        self.states.read().values().filter(|s| s.router_id == router_id && s.template_id == template_id).map(|s| s.id).collect()
    }

    /// Most recent unexpired snapshot recorded for `(router_id,
    /// template_id)` — the one an operator `Undo` would restore.
    pub fn latest_for(&self, router_id: &str, template_id: &str, now_ms: u64) -> Option<RollbackState> {
        self.states
            .read()
            .values()
            .filter(|s| s.router_id == router_id && s.template_id == template_id && !s.is_expired(now_ms))
            .max_by_key(|s| s.applied_at_ms)
            .cloned()
    }

    /// Removes and returns the entry, consuming it (a rollback is
    /// applied at most once).
    pub fn take(&self, id: &RollbackStateId) -> Result<Option<RollbackState>, RollbackStoreError> {
        let mut states = self.states.write();
        let taken = states.remove(id);
        if taken.is_some() {
            self.persist(&states)?;
        }
        Ok(taken)
    }

    /// Removes every entry with `expires_at_ms <= now_ms`. Returns the
    /// IDs dropped so the caller can log what was discarded.
    pub fn sweep_expired(&self, now_ms: u64) -> Result<Vec<RollbackStateId>, RollbackStoreError> {
        let mut states = self.states.write();
        let expired: Vec<RollbackStateId> = states.values().filter(|s| s.is_expired(now_ms)).map(|s| s.id).collect();
        if expired.is_empty() {
            return Ok(expired);
        }
        for id in &expired {
            states.remove(id);
        }
        self.persist(&states)?;
        Ok(expired)
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}

#[cfg(test)]
#[path = "rollback_tests.rs"]
mod tests;
