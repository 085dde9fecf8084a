// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn migrate_same_version_is_noop() {
    let v1 = json!({"v": 1, "seq": 1, "config": {}});
    let registry = MigrationRegistry::new();
    let result = registry.migrate_to(v1.clone(), 1).unwrap();
    assert_eq!(result, v1);
}

#[test]
fn too_new_is_an_error() {
    let v99 = json!({"v": 99, "seq": 1, "config": {}});
    let registry = MigrationRegistry::new();
    assert_eq!(registry.migrate_to(v99, 1), Err(MigrationError::TooNew(99, 1)));
}

#[test]
fn missing_path_is_an_error() {
    let v1 = json!({"v": 1, "seq": 1, "config": {}});
    let registry = MigrationRegistry::new();
    assert_eq!(registry.migrate_to(v1, 2), Err(MigrationError::NoPath(1, 2)));
}

struct MockV1ToV2;

impl Migration for MockV1ToV2 {
    fn source_version(&self) -> u32 {
        1
    }
    fn target_version(&self) -> u32 {
        2
    }
    fn migrate(&self, snapshot: &mut Value) -> Result<(), MigrationError> {
        if let Some(obj) = snapshot.as_object_mut() {
            obj.insert("migrated".into(), true.into());
        }
        Ok(())
    }
}

#[test]
fn migration_chain_stamps_new_version() {
    let mut registry = MigrationRegistry::new();
    registry.register(Box::new(MockV1ToV2));

    let v1 = json!({"v": 1, "seq": 42, "config": {}});
    let result = registry.migrate_to(v1, 2).unwrap();

    assert_eq!(result["v"], 2);
    assert_eq!(result["seq"], 42);
    assert_eq!(result["migrated"], true);
}

struct MockV2ToV3;

impl Migration for MockV2ToV3 {
    fn source_version(&self) -> u32 {
        2
    }
    fn target_version(&self) -> u32 {
        3
    }
    fn migrate(&self, snapshot: &mut Value) -> Result<(), MigrationError> {
        if let Some(obj) = snapshot.as_object_mut() {
            obj.insert("migrated_again".into(), true.into());
        }
        Ok(())
    }
}

#[test]
fn multi_step_chain_applies_each_migration_in_order() {
    let mut registry = MigrationRegistry::new();
    registry.register(Box::new(MockV1ToV2));
    registry.register(Box::new(MockV2ToV3));

    let v1 = json!({"v": 1, "seq": 7, "config": {}});
    let result = registry.migrate_to(v1, 3).unwrap();

    assert_eq!(result["v"], 3);
    assert_eq!(result["migrated"], true);
    assert_eq!(result["migrated_again"], true);
}
