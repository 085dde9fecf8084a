// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `DeviceRouting` — single-hop device->service routing record (§3, §4.3).
//! Invariant: exactly one record per `(router_id, device_id)`.

use crate::define_id;
use crate::model::instance::InstanceId;
use serde::{Deserialize, Serialize};

define_id! {
    pub struct DeviceRoutingId("drt-");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRouting {
    pub id: DeviceRoutingId,
    pub router_id: String,
    pub device_id: String,
    pub mac: String,
    pub routing_mark: String,
    pub instance_id: InstanceId,
    /// Router-assigned `.id` for the mangle rule, enabling O(1) removal.
    pub mangle_rule_id: String,
    pub kill_switch_enabled: bool,
    pub kill_switch_rule_id: Option<String>,
}

impl DeviceRouting {
    /// The mangle rule comment namespacing this control plane's ownership
    /// of the rule (§6 comment namespace).
    pub fn mangle_comment(device_id: &str) -> String {
        format!("nnc-routing-{device_id}")
    }
}
