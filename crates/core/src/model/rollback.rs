// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `RollbackState` — in-memory, TTL-bounded snapshot of a template apply,
//! enabling a 5-minute manual undo window (§3, L3).

use crate::define_id;
use serde::{Deserialize, Serialize};

define_id! {
    pub struct RollbackStateId("rbk-");
}

/// Manual-undo window for template applies (distinct from the Update
/// Engine's journal-backed rollback, which restores update backups).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackState {
    pub id: RollbackStateId,
    pub router_id: String,
    pub template_id: String,
    pub applied_at_ms: u64,
    pub expires_at_ms: u64,
    pub created_rule_ids: Vec<String>,
    pub previous_state: serde_json::Value,
}

/// 5-minute manual-undo window (§3).
pub const ROLLBACK_TTL_MS: u64 = 5 * 60 * 1000;

impl RollbackState {
    pub fn new(
        router_id: impl Into<String>,
        template_id: impl Into<String>,
        applied_at_ms: u64,
        created_rule_ids: Vec<String>,
        previous_state: serde_json::Value,
    ) -> Self {
        Self {
            id: RollbackStateId::new(),
            router_id: router_id.into(),
            template_id: template_id.into(),
            applied_at_ms,
            expires_at_ms: applied_at_ms + ROLLBACK_TTL_MS,
            created_rule_ids,
            previous_state,
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}
