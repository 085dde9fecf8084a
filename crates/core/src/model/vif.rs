// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `VirtualInterface` — owned by the VIF subsystem (§3); the core only
//! reads it. Its `status`/`gateway_status` pair gates kill-switch lift
//! safety (§4.6, §8).

use crate::define_id;
use crate::model::instance::InstanceId;
use serde::{Deserialize, Serialize};

define_id! {
    /// Identifies a virtual interface.
    pub struct VifId("vif-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VifStatus {
    Provisioning,
    Active,
    Degraded,
    Deleted,
}

impl VifStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, VifStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayStatus {
    Starting,
    Running,
    Stopped,
    Failed,
}

impl GatewayStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, GatewayStatus::Running)
    }
}

/// A virtual interface backing one hop of a routing chain (or a single-hop
/// device routing's egress).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualInterface {
    pub id: VifId,
    pub instance_id: InstanceId,
    pub interface_name: String,
    pub vlan_id: u16,
    /// CIDR, e.g. "10.1.0.1/24".
    pub ip_address: String,
    pub routing_mark: String,
    pub status: VifStatus,
    pub gateway_status: GatewayStatus,
}

impl VirtualInterface {
    /// Healthy per the kill-switch lift-safety invariant (§4.6, §8):
    /// `status=active AND gateway_status=running`.
    pub fn is_healthy(&self) -> bool {
        self.status.is_active() && self.gateway_status.is_running()
    }

    /// The interface's gateway address without the CIDR mask, used as the
    /// default-route gateway when creating a chain hop (§4.4 step 3).
    pub fn gateway_ip(&self) -> &str {
        self.ip_address.split('/').next().unwrap_or(&self.ip_address)
    }
}
