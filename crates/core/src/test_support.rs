// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers and builders for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::model::chain::{ChainHop, ChainHopId, KillSwitchMode, RoutingChain, RoutingChainId, RoutingMode};
use crate::model::instance::{FeatureId, InstanceId};
use crate::model::vif::{GatewayStatus, VifId, VifStatus, VirtualInterface};

/// Proptest strategies for journal/chain state machines.
#[cfg(feature = "proptest")]
pub mod strategies {
    use crate::model::journal::{JournalPhase, JournalStatus};
    use proptest::prelude::*;

    pub fn arb_phase() -> impl Strategy<Value = JournalPhase> {
        prop_oneof![
            Just(JournalPhase::Staging),
            Just(JournalPhase::Backup),
            Just(JournalPhase::Swap),
            Just(JournalPhase::Migration),
            Just(JournalPhase::Validation),
            Just(JournalPhase::Commit),
            Just(JournalPhase::Rollback),
        ]
    }

    pub fn arb_status() -> impl Strategy<Value = JournalStatus> {
        prop_oneof![Just(JournalStatus::Pending), Just(JournalStatus::Success), Just(JournalStatus::Failed)]
    }
}

/// A healthy, active virtual interface with the given name/CIDR.
pub fn healthy_vif(instance_id: InstanceId, interface_name: &str, cidr: &str) -> VirtualInterface {
    VirtualInterface {
        id: VifId::new(),
        instance_id,
        interface_name: interface_name.to_string(),
        vlan_id: 100,
        ip_address: cidr.to_string(),
        routing_mark: format!("vif-{interface_name}"),
        status: VifStatus::Active,
        gateway_status: GatewayStatus::Running,
    }
}

/// A degraded interface, used to exercise kill-switch activation paths.
pub fn degraded_vif(instance_id: InstanceId, interface_name: &str, cidr: &str) -> VirtualInterface {
    let mut vif = healthy_vif(instance_id, interface_name, cidr);
    vif.status = VifStatus::Degraded;
    vif.gateway_status = GatewayStatus::Failed;
    vif
}

/// A 2-hop MAC-routed chain with kill-switch enabled but inactive.
pub fn sample_chain(router_id: &str, device_id: &str) -> RoutingChain {
    RoutingChain {
        id: RoutingChainId::new(),
        router_id: router_id.to_string(),
        device_id: device_id.to_string(),
        device_mac: Some("aa:bb:cc:dd:ee:01".to_string()),
        device_ip: None,
        routing_mode: RoutingMode::Mac,
        kill_switch_enabled: true,
        kill_switch_mode: KillSwitchMode::Mac,
        kill_switch_active: false,
        kill_switch_activated_at_ms: None,
        active: true,
    }
}

/// Build a hop record consistent with the naming invariant (§8).
pub fn sample_hop(chain_id: RoutingChainId, hop_order: u8, interface_id: VifId) -> ChainHop {
    let mark = RoutingChain::routing_mark(chain_id, hop_order);
    ChainHop {
        id: ChainHopId::new(),
        chain_id,
        hop_order,
        interface_id,
        routing_mark: mark.clone(),
        route_table_name: mark,
        mangle_rule_id: format!("*{hop_order}"),
        route_id: format!("*r{hop_order}"),
        kill_switch_rule_id: Some(format!("*ks{hop_order}")),
        kill_switch_active: false,
    }
}

pub fn sample_feature_id() -> FeatureId {
    FeatureId::from_string("ftr-vpngatewayfeature00")
}
