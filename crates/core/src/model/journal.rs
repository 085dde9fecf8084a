// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `JournalEntry` — the durable record of one update phase transition (§3,
//! §4.1, §6). Uniqueness is `(instance_id, to_version, phase)`; re-beginning
//! a phase resets `status` to `Pending` and clears the terminal fields.

use crate::define_id;
use crate::model::instance::{FeatureId, InstanceId};
use serde::{Deserialize, Serialize};

define_id! {
    /// Identifies one journal entry (one phase attempt for one transition).
    pub struct JournalEntryId("jrn-");
}

/// The six ordered update phases (§4.1), plus `Rollback` for the recovery
/// path triggered by phase failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JournalPhase {
    Staging,
    Backup,
    Swap,
    Migration,
    Validation,
    Commit,
    Rollback,
}

impl JournalPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalPhase::Staging => "STAGING",
            JournalPhase::Backup => "BACKUP",
            JournalPhase::Swap => "SWAP",
            JournalPhase::Migration => "MIGRATION",
            JournalPhase::Validation => "VALIDATION",
            JournalPhase::Commit => "COMMIT",
            JournalPhase::Rollback => "ROLLBACK",
        }
    }

    /// Phases whose failure triggers automatic rollback (§4.1 Rollback policy).
    pub fn triggers_rollback(&self) -> bool {
        matches!(self, JournalPhase::Swap | JournalPhase::Migration | JournalPhase::Validation)
    }
}

impl std::fmt::Display for JournalPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalStatus {
    Pending,
    Success,
    Failed,
}

impl JournalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JournalStatus::Success | JournalStatus::Failed)
    }
}

/// One `(instance, to_version, phase)` transition record.
///
/// A phase entry is created with status `Pending` before any side effect
/// runs (intent) and updated to `Success`/`Failed` after it completes
/// (outcome) — this is what lets crash recovery (§4.1 `RecoverFromCrash`)
/// find work left mid-flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub instance_id: InstanceId,
    pub feature_id: FeatureId,
    pub from_version: String,
    pub to_version: String,
    pub phase: JournalPhase,
    pub status: JournalStatus,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub error: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl JournalEntry {
    /// Begin (or re-begin) a phase: status resets to `Pending`, terminal
    /// fields clear, per the "re-begin of a phase" invariant.
    pub fn begin(
        instance_id: InstanceId,
        feature_id: FeatureId,
        from_version: impl Into<String>,
        to_version: impl Into<String>,
        phase: JournalPhase,
        started_at_ms: u64,
    ) -> Self {
        Self {
            id: JournalEntryId::new(),
            instance_id,
            feature_id,
            from_version: from_version.into(),
            to_version: to_version.into(),
            phase,
            status: JournalStatus::Pending,
            started_at_ms,
            completed_at_ms: None,
            error: None,
            metadata: None,
        }
    }

    pub fn key(&self) -> (InstanceId, String, JournalPhase) {
        (self.instance_id, self.to_version.clone(), self.phase)
    }

    pub fn succeed(&mut self, completed_at_ms: u64) {
        self.status = JournalStatus::Success;
        self.completed_at_ms = Some(completed_at_ms);
        self.error = None;
    }

    pub fn fail(&mut self, completed_at_ms: u64, error: impl Into<String>) {
        self.status = JournalStatus::Failed;
        self.completed_at_ms = Some(completed_at_ms);
        self.error = Some(error.into());
    }

    /// Re-begins a terminal entry in place: same id, status back to
    /// `Pending`, terminal fields cleared (§3 uniqueness/reopen contract).
    pub fn reopen(&mut self, feature_id: FeatureId, from_version: impl Into<String>, started_at_ms: u64) {
        self.feature_id = feature_id;
        self.from_version = from_version.into();
        self.status = JournalStatus::Pending;
        self.started_at_ms = started_at_ms;
        self.completed_at_ms = None;
        self.error = None;
        self.metadata = None;
    }
}
