// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nnc_adapters::{FakeInstanceDirectory, FakeRouterPort};
use nnc_wire::CommandResult;
use std::collections::HashMap;
use tempfile::tempdir;

fn make_engine(dir: &std::path::Path) -> (PbrEngine<FakeRouterPort, FakeInstanceDirectory>, FakeRouterPort, FakeInstanceDirectory) {
    let router = FakeRouterPort::new();
    let instances = FakeInstanceDirectory::new();
    let store = Arc::new(Mutex::new(RoutingStateStore::open(dir.join("routing.json")).unwrap()));
    let bus = EventBus::new();
    let rollback = Arc::new(RollbackStore::open(dir.join("rollback.json")).unwrap());
    (PbrEngine::new(router.clone(), store, instances.clone(), bus, rollback), router, instances)
}

#[tokio::test]
async fn assign_creates_mangle_rule_and_persists_record() {
    let dir = tempdir().unwrap();
    let (engine, router, _instances) = make_engine(dir.path());
    router.push_execute_result(Ok(CommandResult::ok(Some("*1".to_string()), vec![])));

    let outcome = engine
        .assign_device_routing(AssignDeviceRoutingInput {
            device_id: "dev1".to_string(),
            mac: "aa:bb:cc:dd:ee:01".to_string(),
            routing_mark: "mark1".to_string(),
            instance_id: InstanceId::new(),
        })
        .await
        .unwrap();

    assert!(!outcome.conflict_resolved);
    assert_eq!(router.calls().len(), 1);
}

#[tokio::test]
async fn assign_over_existing_record_resolves_conflict_first() {
    let dir = tempdir().unwrap();
    let (engine, router, _instances) = make_engine(dir.path());
    router.push_execute_result(Ok(CommandResult::ok(Some("*1".to_string()), vec![])));

    let instance_id = InstanceId::new();
    engine
        .assign_device_routing(AssignDeviceRoutingInput {
            device_id: "dev1".to_string(),
            mac: "aa:bb:cc:dd:ee:01".to_string(),
            routing_mark: "mark1".to_string(),
            instance_id,
        })
        .await
        .unwrap();

    router.push_execute_result(Ok(CommandResult::ok(Some("*2".to_string()), vec![])));
    let outcome = engine
        .assign_device_routing(AssignDeviceRoutingInput {
            device_id: "dev1".to_string(),
            mac: "aa:bb:cc:dd:ee:02".to_string(),
            routing_mark: "mark2".to_string(),
            instance_id,
        })
        .await
        .unwrap();

    assert!(outcome.conflict_resolved);
    // remove(old) + add(new) on the second assign, plus the first add.
    assert_eq!(router.calls().len(), 3);
}

#[tokio::test]
async fn remove_is_idempotent_for_unknown_device() {
    let dir = tempdir().unwrap();
    let (engine, router, _instances) = make_engine(dir.path());
    engine.remove_device_routing("nonexistent").await.unwrap();
    assert!(router.calls().is_empty());
}

#[tokio::test]
async fn bulk_assign_keeps_going_after_one_item_fails() {
    let dir = tempdir().unwrap();
    let (engine, router, _instances) = make_engine(dir.path());
    router.push_execute_result(Err(nnc_adapters::RouterPortError::Transport("down".to_string())));
    router.push_execute_result(Ok(CommandResult::ok(Some("*9".to_string()), vec![])));

    let results = engine
        .bulk_assign_routing(vec![
            AssignDeviceRoutingInput { device_id: "dev1".to_string(), mac: "aa:bb:cc:dd:ee:01".to_string(), routing_mark: "m1".to_string(), instance_id: InstanceId::new() },
            AssignDeviceRoutingInput { device_id: "dev2".to_string(), mac: "aa:bb:cc:dd:ee:02".to_string(), routing_mark: "m2".to_string(), instance_id: InstanceId::new() },
        ])
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].1.is_err());
    assert!(results[1].1.is_ok());
}

#[tokio::test]
async fn reconcile_recreates_missing_rule() {
    let dir = tempdir().unwrap();
    let (engine, router, _instances) = make_engine(dir.path());
    let instance_id = InstanceId::new();

    engine
        .state
        .lock()
        .put_device_routing(DeviceRouting {
            id: DeviceRoutingId::new(),
            router_id: String::new(),
            device_id: "dev1".to_string(),
            mac: "aa:bb:cc:dd:ee:01".to_string(),
            routing_mark: "m1".to_string(),
            instance_id,
            mangle_rule_id: "*1".to_string(),
            kill_switch_enabled: false,
            kill_switch_rule_id: None,
        })
        .unwrap();

    router.push_query_result(Ok(nnc_wire::Resources::empty()));
    router.push_execute_result(Ok(CommandResult::ok(Some("*2".to_string()), vec![])));

    let counters = engine.reconcile_on_startup().await;
    assert_eq!(counters.missing_rules, 1);
    assert_eq!(counters.recreated, 1);
    assert_eq!(counters.orphaned_rules, 0);
}

#[tokio::test]
async fn reconcile_removes_orphan_rule_with_no_db_record() {
    let dir = tempdir().unwrap();
    let (engine, router, _instances) = make_engine(dir.path());

    let mut row = HashMap::new();
    row.insert(".id".to_string(), "*5".to_string());
    row.insert("comment".to_string(), "nnc-routing-ghost".to_string());
    router.push_query_result(Ok(nnc_wire::Resources { resources: vec![row] }));
    router.push_execute_result(Ok(CommandResult::ok(None, vec![])));

    let counters = engine.reconcile_on_startup().await;
    assert_eq!(counters.orphaned_rules, 1);
    assert_eq!(counters.removed, 1);
}

#[tokio::test]
async fn reconcile_cascades_when_instance_no_longer_exists() {
    let dir = tempdir().unwrap();
    let (engine, router, instances) = make_engine(dir.path());
    let instance_id = InstanceId::new();
    instances.remove(instance_id);

    engine
        .state
        .lock()
        .put_device_routing(DeviceRouting {
            id: DeviceRoutingId::new(),
            router_id: String::new(),
            device_id: "dev1".to_string(),
            mac: "aa:bb:cc:dd:ee:01".to_string(),
            routing_mark: "m1".to_string(),
            instance_id,
            mangle_rule_id: "*1".to_string(),
            kill_switch_enabled: false,
            kill_switch_rule_id: None,
        })
        .unwrap();

    let mut row = HashMap::new();
    row.insert(".id".to_string(), "*1".to_string());
    row.insert("comment".to_string(), "nnc-routing-dev1".to_string());
    router.push_query_result(Ok(nnc_wire::Resources { resources: vec![row] }));
    router.push_execute_result(Ok(CommandResult::ok(None, vec![])));

    let counters = engine.reconcile_on_startup().await;
    assert_eq!(counters.deleted_vif_cascade, 1);
    assert_eq!(counters.removed, 1);
    assert!(engine.state.lock().state().device_routing("dev1").is_none());
}
