// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Migrator Registry (C2, §4.3 MIGRATION phase): transforms a feature's
//! persisted config `Value` across config-schema versions during an
//! update. Distinct from the instance's semantic version string — this
//! is the shape of the config blob itself (e.g. a renamed key), tracked
//! by a small integer schema version carried in the blob as `"v"`.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("snapshot schema version {0} is newer than the highest known version {1}")]
    TooNew(u32, u32),
    #[error("no migration path from schema version {0} to {1}")]
    NoPath(u32, u32),
    #[error("migration step failed: {0}")]
    StepFailed(String),
}

/// One schema-version transform. Implementations mutate the config
/// `Value` in place; `migrate_to` is responsible for stamping the new
/// version onto it afterwards.
pub trait Migration: Send + Sync {
    fn source_version(&self) -> u32;
    fn target_version(&self) -> u32;
    fn migrate(&self, snapshot: &mut Value) -> Result<(), MigrationError>;
}

#[derive(Default)]
pub struct MigrationRegistry {
    pub(crate) migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self { migrations: Vec::new() }
    }

    pub fn register(&mut self, migration: Box<dyn Migration>) {
        self.migrations.push(migration);
    }

    fn current_version(snapshot: &Value) -> u32 {
        snapshot.get("v").and_then(Value::as_u64).unwrap_or(0) as u32
    }

    /// Chains registered migrations to carry `snapshot` from whatever
    /// version it currently declares up to `target`. A no-op if already
    /// at `target`. Errors if `snapshot` is already newer than `target`,
    /// or if no registered chain of migrations bridges the gap.
    pub fn migrate_to(&self, mut snapshot: Value, target: u32) -> Result<Value, MigrationError> {
        let mut current = Self::current_version(&snapshot);
        if current == target {
            return Ok(snapshot);
        }
        if current > target {
            return Err(MigrationError::TooNew(current, target));
        }

        while current < target {
            let step = self
                .migrations
                .iter()
                .find(|m| m.source_version() == current)
                .ok_or(MigrationError::NoPath(current, target))?;
            step.migrate(&mut snapshot)?;
            current = step.target_version();
            if let Some(obj) = snapshot.as_object_mut() {
                obj.insert("v".to_string(), Value::from(current));
            }
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
