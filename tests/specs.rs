// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios exercising the control plane's components
//! together rather than in isolation: the Update Engine's six-phase
//! apply with crash recovery, and the Chain Router/PBR Engine/Chain
//! Kill-Switch sharing one `RoutingStateStore` the way `nnc-daemon`
//! wires them in production.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use nnc_adapters::{
    FakeDownloadVerifier, FakeInstanceDirectory, FakeLifecycle, FakeRouterPort, FakeVifDirectory, HealthState,
};
use nnc_core::{
    FakeClock, FeatureId, GatewayStatus, InstanceId, JournalPhase, JournalStatus, RoutingMode, VifId, VifStatus,
    VirtualInterface,
};
use nnc_engine::{
    AssignDeviceRoutingInput, ChainKillSwitch, ChainRouter, CreateChainInput, EventBus, LatencyMeasurer, PbrEngine,
    UpdateEngine,
};
use nnc_storage::{RollbackStore, RoutingStateStore, UpdateJournal};
use nnc_wire::Resources;

fn vif(instance_id: InstanceId, name: &str, gateway_cidr: &str) -> VirtualInterface {
    VirtualInterface {
        id: VifId::new(),
        instance_id,
        interface_name: name.to_string(),
        vlan_id: 100,
        ip_address: gateway_cidr.to_string(),
        routing_mark: String::new(),
        status: VifStatus::Active,
        gateway_status: GatewayStatus::Running,
    }
}

type TestEngine = UpdateEngine<FakeLifecycle, FakeLifecycle, FakeLifecycle, FakeDownloadVerifier, FakeClock>;

fn make_update_engine(base_dir: &std::path::Path) -> (TestEngine, FakeLifecycle, FakeDownloadVerifier) {
    let journal = Arc::new(Mutex::new(UpdateJournal::open(base_dir.join("journal.wal"), 0).unwrap()));
    let lifecycle = FakeLifecycle::new();
    let downloader = FakeDownloadVerifier::new();
    let migrators = Arc::new(nnc_adapters::MigratorRegistry::new());
    let engine = UpdateEngine::new(
        base_dir.to_path_buf(),
        journal,
        lifecycle.clone(),
        lifecycle.clone(),
        lifecycle.clone(),
        downloader.clone(),
        migrators,
        EventBus::new(),
        FakeClock::new(),
    )
    .with_settle_window(Duration::from_millis(0));
    (engine, lifecycle, downloader)
}

/// §6 filesystem layout: `<base>/features/<feature>/bin/<feature>`.
fn live_binary_path(base_dir: &std::path::Path, feature: &str) -> std::path::PathBuf {
    base_dir.join("features").join(feature).join("bin").join(feature)
}

fn seed_live_binary(base_dir: &std::path::Path, feature: &str, contents: &[u8]) {
    let live = live_binary_path(base_dir, feature);
    std::fs::create_dir_all(live.parent().unwrap()).unwrap();
    std::fs::write(&live, contents).unwrap();
}

#[tokio::test]
async fn happy_path_update_applies_and_commits() {
    let dir = tempdir().unwrap();
    let (engine, _lifecycle, downloader) = make_update_engine(dir.path());
    let feature = "vpn-gateway";
    seed_live_binary(dir.path(), feature, b"old binary");
    downloader.set_bytes(b"new binary".to_vec());

    let instance_id = InstanceId::new();
    let feature_id = FeatureId::new();
    let cancel = CancellationToken::new();

    engine
        .apply_update(instance_id, feature_id, feature, "1.0.0", "2.0.0", "http://x/vpn-gateway", "http://x/checksums.txt", &cancel)
        .await
        .expect("happy-path update should succeed");

    let live = live_binary_path(dir.path(), feature);
    assert_eq!(std::fs::read(&live).unwrap(), b"new binary");
    assert!(engine.incomplete_updates().is_empty());
}

#[tokio::test]
async fn auto_rollback_on_unhealthy_restores_the_prior_binary() {
    let dir = tempdir().unwrap();
    let (engine, lifecycle, downloader) = make_update_engine(dir.path());
    let feature = "vpn-gateway";
    seed_live_binary(dir.path(), feature, b"old");
    downloader.set_bytes(b"new".to_vec());
    lifecycle.push_status(HealthState::Unhealthy);

    let instance_id = InstanceId::new();
    let feature_id = FeatureId::new();
    let cancel = CancellationToken::new();

    let result = engine
        .apply_update(instance_id, feature_id, feature, "1.0.0", "2.0.0", "http://x/vpn-gateway", "http://x/checksums.txt", &cancel)
        .await;

    let err = result.expect_err("an unhealthy instance must fail the update");
    assert!(err.to_string().contains("VALIDATION"));

    let live = live_binary_path(dir.path(), feature);
    assert_eq!(std::fs::read(&live).unwrap(), b"old", "rollback must restore the pre-update bytes");

    let history = engine.update_history(&instance_id);
    assert!(history.iter().any(|e| e.phase == JournalPhase::Rollback && e.status == JournalStatus::Success));
}

#[tokio::test]
async fn crash_recovery_rolls_back_a_pending_swap() {
    let dir = tempdir().unwrap();
    let instance_id = InstanceId::new();
    let feature_id = FeatureId::new();
    let feature_name = feature_id.as_str();

    // SWAP already copied the new bytes into place before the process
    // died — recovery must restore the pre-update backup.
    seed_live_binary(dir.path(), feature_name, b"new (crashed mid-swap)");
    let backup_dir =
        dir.path().join("updates").join(feature_name).join(instance_id.as_str()).join("backup").join("1.0.0");
    std::fs::create_dir_all(&backup_dir).unwrap();
    std::fs::write(backup_dir.join(feature_name), b"old").unwrap();

    // Simulate a daemon that died mid-SWAP: a journal with a dangling
    // `pending` SWAP entry and no matching outcome.
    {
        let mut journal = UpdateJournal::open(dir.path().join("journal.wal"), 0).unwrap();
        journal.begin(instance_id, feature_id, "1.0.0".to_string(), "2.0.0".to_string(), JournalPhase::Swap, 0).unwrap();
    }

    let (engine, _lifecycle, _downloader) = make_update_engine(dir.path());
    engine.recover_from_crash().await;

    assert!(engine.incomplete_updates().is_empty(), "recovery must clear every pending/failed entry");
    let history = engine.update_history(&instance_id);
    assert!(history.iter().any(|e| e.phase == JournalPhase::Rollback && e.status == JournalStatus::Success));

    let live = live_binary_path(dir.path(), feature_name);
    assert_eq!(std::fs::read(&live).unwrap(), b"old", "crash recovery must restore the backup binary");
}

fn confirm_row(id: &str) -> std::collections::HashMap<String, String> {
    let mut row = std::collections::HashMap::new();
    row.insert(".id".to_string(), id.to_string());
    row
}

/// Queues the mangle-rule and route confirm rows `create_hop` looks up
/// after issuing each `add`, one pair per hop.
fn push_hop_confirms(router: &FakeRouterPort, n: usize) {
    for i in 0..n {
        router.push_query_result(Ok(Resources { resources: vec![confirm_row(&format!("*m{i}"))] }));
        router.push_query_result(Ok(Resources { resources: vec![confirm_row(&format!("*r{i}"))] }));
    }
}

struct ChainHarness {
    router: FakeRouterPort,
    vifs: FakeVifDirectory,
    instances: FakeInstanceDirectory,
    state: Arc<Mutex<RoutingStateStore>>,
    bus: EventBus,
    rollback: Arc<RollbackStore>,
}

impl ChainHarness {
    fn new(dir: &std::path::Path) -> Self {
        Self {
            router: FakeRouterPort::new(),
            vifs: FakeVifDirectory::new(),
            instances: FakeInstanceDirectory::new(),
            state: Arc::new(Mutex::new(RoutingStateStore::open(dir.join("routing_state.json")).unwrap())),
            bus: EventBus::new(),
            rollback: Arc::new(RollbackStore::open(dir.join("rollback.json")).unwrap()),
        }
    }

    fn chain_router(&self) -> ChainRouter<FakeRouterPort, FakeVifDirectory> {
        ChainRouter::new(self.router.clone(), self.vifs.clone(), self.state.clone(), self.bus.clone(), self.rollback.clone())
    }

    fn pbr_engine(&self) -> PbrEngine<FakeRouterPort, FakeInstanceDirectory> {
        PbrEngine::new(self.router.clone(), self.state.clone(), self.instances.clone(), self.bus.clone(), self.rollback.clone())
    }

    fn kill_switch(&self) -> ChainKillSwitch<FakeRouterPort, FakeVifDirectory, FakeClock> {
        ChainKillSwitch::new(self.router.clone(), self.vifs.clone(), self.state.clone(), self.bus.clone(), FakeClock::new())
    }
}

#[tokio::test]
async fn three_hop_chain_create_produces_one_hop_per_interface() {
    let dir = tempdir().unwrap();
    let harness = ChainHarness::new(dir.path());
    let chain = harness.chain_router();

    let instance_id = InstanceId::new();
    let vif_a = vif(instance_id, "vif-a", "10.1.0.1/24");
    let vif_b = vif(instance_id, "vif-b", "10.1.1.1/24");
    let vif_c = vif(instance_id, "vif-c", "10.1.2.1/24");
    for v in [&vif_a, &vif_b, &vif_c] {
        harness.vifs.put(v.clone());
    }

    let input = CreateChainInput {
        device_id: "device-1".to_string(),
        device_mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
        device_ip: None,
        routing_mode: RoutingMode::Mac,
        kill_switch_enabled: true,
        interface_ids: vec![vif_a.id, vif_b.id, vif_c.id],
    };

    push_hop_confirms(&harness.router, 3);
    let chain_id = chain.create_routing_chain("router-1", input).await.expect("3-hop chain creation should succeed");

    let hops = harness.state.lock().state().hops(&chain_id).to_vec();
    assert_eq!(hops.len(), 3);
    assert_eq!(hops.iter().map(|h| h.hop_order).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(hops.iter().all(|h| h.kill_switch_rule_id.is_some()));
}

#[tokio::test]
async fn reconcile_cascades_a_chain_whose_interface_was_deleted() {
    let dir = tempdir().unwrap();
    let harness = ChainHarness::new(dir.path());
    let chain = harness.chain_router();

    let instance_id = InstanceId::new();
    let vif_a = vif(instance_id, "vif-a", "10.1.0.1/24");
    let vif_b = vif(instance_id, "vif-b", "10.1.1.1/24");
    harness.vifs.put(vif_a.clone());
    harness.vifs.put(vif_b.clone());

    let input = CreateChainInput {
        device_id: "device-2".to_string(),
        device_mac: Some("11:22:33:44:55:66".to_string()),
        device_ip: None,
        routing_mode: RoutingMode::Mac,
        kill_switch_enabled: false,
        interface_ids: vec![vif_a.id, vif_b.id],
    };
    push_hop_confirms(&harness.router, 2);
    let chain_id = chain.create_routing_chain("router-1", input).await.unwrap();

    // The VIF subsystem deletes one of the backing interfaces out from
    // under the chain (§4.5 disposition (a)).
    harness.vifs.remove(vif_b.id);

    let counters = chain.reconcile().await;
    assert_eq!(counters.cascade_cleaned, 1);
    assert!(harness.state.lock().state().hops(&chain_id).is_empty());
}

#[tokio::test]
async fn single_hop_routing_is_replaced_by_a_chain_for_the_same_device() {
    let dir = tempdir().unwrap();
    let harness = ChainHarness::new(dir.path());
    let pbr = harness.pbr_engine();
    let chain = harness.chain_router();

    let device_id = "device-3".to_string();
    let instance_id = InstanceId::new();
    pbr.assign_device_routing(AssignDeviceRoutingInput {
        device_id: device_id.clone(),
        mac: "aa:aa:aa:aa:aa:aa".to_string(),
        routing_mark: "mark-1".to_string(),
        instance_id,
    })
    .await
    .expect("single-hop assignment should succeed");
    assert!(harness.state.lock().state().device_routing(&device_id).is_some());

    let vif_a = vif(instance_id, "vif-a", "10.1.0.1/24");
    let vif_b = vif(instance_id, "vif-b", "10.1.1.1/24");
    harness.vifs.put(vif_a.clone());
    harness.vifs.put(vif_b.clone());

    let input = CreateChainInput {
        device_id: device_id.clone(),
        device_mac: Some("aa:aa:aa:aa:aa:aa".to_string()),
        device_ip: None,
        routing_mode: RoutingMode::Mac,
        kill_switch_enabled: false,
        interface_ids: vec![vif_a.id, vif_b.id],
    };
    push_hop_confirms(&harness.router, 2);
    chain.create_routing_chain("router-1", input).await.expect("chain creation should replace the single-hop route");

    assert!(harness.state.lock().state().device_routing(&device_id).is_none(), "single-hop record must be torn down");
    assert!(harness.state.lock().state().chain_for_device(&device_id).is_some());
}

#[tokio::test]
async fn chain_undo_recreates_a_removed_chain() {
    let dir = tempdir().unwrap();
    let harness = ChainHarness::new(dir.path());
    let chain = harness.chain_router();

    let instance_id = InstanceId::new();
    let vif_a = vif(instance_id, "vif-a", "10.1.0.1/24");
    let vif_b = vif(instance_id, "vif-b", "10.1.1.1/24");
    harness.vifs.put(vif_a.clone());
    harness.vifs.put(vif_b.clone());

    let input = CreateChainInput {
        device_id: "device-7".to_string(),
        device_mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
        device_ip: None,
        routing_mode: RoutingMode::Mac,
        kill_switch_enabled: false,
        interface_ids: vec![vif_a.id, vif_b.id],
    };
    push_hop_confirms(&harness.router, 2);
    let chain_id = chain.create_routing_chain("router-7", input).await.unwrap();

    chain.remove_routing_chain(chain_id).await.unwrap();
    assert!(harness.state.lock().state().chain(&chain_id).is_none());

    push_hop_confirms(&harness.router, 2);
    chain.undo_last_change("router-7", "device-7", 0).await.expect("undo should recreate the removed chain");

    let restored = harness.state.lock().state().chain_for_device("device-7").cloned().expect("chain should be back");
    assert_eq!(restored.id, chain_id, "undo must restore the same chain id, not mint a new one");
    assert_eq!(harness.state.lock().state().hops(&restored.id).len(), 2);

    let err = chain.undo_last_change("router-7", "device-7", 0).await.unwrap_err();
    assert!(matches!(err, nnc_engine::ChainError::NoRollbackAvailable), "a snapshot is consumed by its first undo");
}

#[tokio::test]
async fn kill_switch_fails_closed_on_unhealthy_and_lifts_only_once_every_hop_recovers() {
    let dir = tempdir().unwrap();
    let harness = ChainHarness::new(dir.path());
    let chain = harness.chain_router();
    let killswitch = harness.kill_switch();

    let instance_id = InstanceId::new();
    let vif_a = vif(instance_id, "vif-a", "10.1.0.1/24");
    let vif_b = vif(instance_id, "vif-b", "10.1.1.1/24");
    harness.vifs.put(vif_a.clone());
    harness.vifs.put(vif_b.clone());

    let input = CreateChainInput {
        device_id: "device-4".to_string(),
        device_mac: Some("22:22:22:22:22:22".to_string()),
        device_ip: None,
        routing_mode: RoutingMode::Mac,
        kill_switch_enabled: true,
        interface_ids: vec![vif_a.id, vif_b.id],
    };
    push_hop_confirms(&harness.router, 2);
    let chain_id = chain.create_routing_chain("router-1", input).await.unwrap();

    killswitch.activate_chain_kill_switch(chain_id, None).await.unwrap();
    assert!(harness.state.lock().state().chain(&chain_id).unwrap().kill_switch_active);

    // vif_b is still unhealthy — lift must be refused until every hop
    // backing the chain reports healthy.
    let mut degraded = vif_b.clone();
    degraded.gateway_status = GatewayStatus::Failed;
    harness.vifs.put(degraded);

    let result = killswitch.deactivate_chain_kill_switch(chain_id).await;
    assert!(result.is_err(), "lift must be refused while any hop's interface is unhealthy");
    assert!(harness.state.lock().state().chain(&chain_id).unwrap().kill_switch_active);

    // Once every hop is healthy again, the lift succeeds.
    harness.vifs.put(vif_b.clone());
    killswitch.deactivate_chain_kill_switch(chain_id).await.expect("lift should succeed once every hop is healthy");
    assert!(!harness.state.lock().state().chain(&chain_id).unwrap().kill_switch_active);
}

#[tokio::test]
async fn pbr_undo_restores_the_previous_device_routing_assignment() {
    let dir = tempdir().unwrap();
    let harness = ChainHarness::new(dir.path());
    let pbr = harness.pbr_engine();

    let device_id = "device-9".to_string();
    let instance_a = InstanceId::new();
    let instance_b = InstanceId::new();

    pbr.assign_device_routing(AssignDeviceRoutingInput {
        device_id: device_id.clone(),
        mac: "aa:aa:aa:aa:aa:aa".to_string(),
        routing_mark: "mark-a".to_string(),
        instance_id: instance_a,
    })
    .await
    .unwrap();

    pbr.assign_device_routing(AssignDeviceRoutingInput {
        device_id: device_id.clone(),
        mac: "bb:bb:bb:bb:bb:bb".to_string(),
        routing_mark: "mark-b".to_string(),
        instance_id: instance_b,
    })
    .await
    .unwrap();
    assert_eq!(harness.state.lock().state().device_routing(&device_id).unwrap().instance_id, instance_b);

    pbr.undo_last_change(&device_id, 0).await.expect("undo should restore the prior assignment");

    let restored = harness.state.lock().state().device_routing(&device_id).cloned().expect("assignment should be back");
    assert_eq!(restored.instance_id, instance_a);
    assert_eq!(restored.mac, "aa:aa:aa:aa:aa:aa");
}

#[tokio::test]
async fn pbr_reconcile_is_idempotent() {
    let dir = tempdir().unwrap();
    let harness = ChainHarness::new(dir.path());
    let pbr = harness.pbr_engine();

    let instance_id = InstanceId::new();
    pbr.assign_device_routing(AssignDeviceRoutingInput {
        device_id: "device-5".to_string(),
        mac: "bb:bb:bb:bb:bb:bb".to_string(),
        routing_mark: "mark-5".to_string(),
        instance_id,
    })
    .await
    .unwrap();

    let first = pbr.reconcile_on_startup().await;
    let second = pbr.reconcile_on_startup().await;
    assert_eq!(first, second, "reconciling twice against unchanged state must produce identical counters");
}

#[tokio::test]
async fn latency_measurer_skips_hops_once_cancelled() {
    let dir = tempdir().unwrap();
    let harness = ChainHarness::new(dir.path());
    let chain = harness.chain_router();

    let instance_id = InstanceId::new();
    let vif_a = vif(instance_id, "vif-a", "127.0.0.1/32");
    harness.vifs.put(vif_a.clone());

    let input = CreateChainInput {
        device_id: "device-6".to_string(),
        device_mac: Some("33:33:33:33:33:33".to_string()),
        device_ip: None,
        routing_mode: RoutingMode::Mac,
        kill_switch_enabled: false,
        interface_ids: vec![vif_a.id],
    };
    push_hop_confirms(&harness.router, 1);
    chain.create_routing_chain("router-1", input).await.unwrap();

    let measurer = LatencyMeasurer::new(harness.vifs.clone(), harness.state.clone(), harness.bus.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut rx = harness.bus.subscribe();
    measurer.measure_all(&cancel).await;
    assert!(rx.try_recv().is_err(), "an already-cancelled sweep must publish nothing");
}
