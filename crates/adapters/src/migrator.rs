// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Migrator Registry (C2, §4.1 MIGRATION): per-feature configuration
//! schema migrators, keyed by `FeatureId`. A feature with no registered
//! migrator gets [`NoOpMigrator`], so MIGRATION is always safe to run
//! even for features that have never needed a config change.

use nnc_core::FeatureId;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigratorError {
    #[error("no migration path from {from} to {to}")]
    NoPath { from: String, to: String },
    #[error("migration failed: {0}")]
    Failed(String),
}

/// One feature's config-schema migrator (§4.1 step 4: `CanMigrate` gates
/// `Migrate`). Config is a free-form key/value map, matching the "parse
/// as a free-form key/value map" contract.
pub trait Migrator: Send + Sync + 'static {
    fn can_migrate(&self, from_version: &str, to_version: &str) -> bool;
    fn migrate(
        &self,
        config: &mut serde_json::Map<String, serde_json::Value>,
        from_version: &str,
        to_version: &str,
    ) -> Result<(), MigratorError>;
}

/// The default for any feature without a registered migrator: every
/// transition is migratable and leaves the config untouched.
#[derive(Debug, Default)]
pub struct NoOpMigrator;

impl Migrator for NoOpMigrator {
    fn can_migrate(&self, _from_version: &str, _to_version: &str) -> bool {
        true
    }

    fn migrate(
        &self,
        _config: &mut serde_json::Map<String, serde_json::Value>,
        _from_version: &str,
        _to_version: &str,
    ) -> Result<(), MigratorError> {
        Ok(())
    }
}

/// Looks up the migrator for a feature, falling back to [`NoOpMigrator`].
#[derive(Default)]
pub struct MigratorRegistry {
    migrators: HashMap<FeatureId, Box<dyn Migrator>>,
    default: NoOpMigrator,
}

impl MigratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, feature_id: FeatureId, migrator: Box<dyn Migrator>) {
        self.migrators.insert(feature_id, migrator);
    }

    pub fn for_feature(&self, feature_id: &FeatureId) -> &dyn Migrator {
        self.migrators.get(feature_id).map(Box::as_ref).unwrap_or(&self.default)
    }
}

#[cfg(test)]
#[path = "migrator_tests.rs"]
mod tests;
