// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event vocabulary (§6) delivered via the Event Bus / Publisher (L4).
//!
//! Serializes as `{"type": "update.available", ...fields}` using serde's
//! internally-tagged representation.

use crate::model::chain::RoutingChainId;
use crate::model::instance::{FeatureId, InstanceId};
use crate::model::journal::JournalPhase;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};

/// Delivery priority hint (§4.6: kill-switch activation is `chain.hop.failed`
/// at immediate priority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPriority {
    Normal,
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "update.available")]
    UpdateAvailable {
        instance_id: InstanceId,
        feature_id: FeatureId,
        current_version: String,
        available_version: String,
        severity: Severity,
    },

    #[serde(rename = "update.started")]
    UpdateStarted { instance_id: InstanceId, feature_id: FeatureId, target_version: String },

    #[serde(rename = "update.completed")]
    UpdateCompleted { instance_id: InstanceId, feature_id: FeatureId, target_version: String },

    #[serde(rename = "update.failed")]
    UpdateFailed {
        instance_id: InstanceId,
        feature_id: FeatureId,
        target_version: String,
        error: String,
    },

    #[serde(rename = "service.update.phase")]
    ServiceUpdatePhase { instance_id: InstanceId, phase: JournalPhase, status: String },

    /// Emitted during STAGING/BACKUP/SWAP so operator tooling can show
    /// progress before the phase completes (§8 scenario 1).
    #[serde(rename = "service.install.progress")]
    ServiceInstallProgress { instance_id: InstanceId, phase: JournalPhase, message: String },

    #[serde(rename = "service.update.rolled_back")]
    ServiceUpdateRolledBack { instance_id: InstanceId, from_version: String, to_version: String },

    #[serde(rename = "routing.chain.created")]
    RoutingChainCreated { chain_id: RoutingChainId, router_id: String, device_id: String },

    #[serde(rename = "routing.chain.updated")]
    RoutingChainUpdated { chain_id: RoutingChainId },

    #[serde(rename = "routing.chain.removed")]
    RoutingChainRemoved { chain_id: RoutingChainId },

    #[serde(rename = "routing.device.assigned")]
    RoutingDeviceAssigned { device_id: String, instance_id: InstanceId },

    #[serde(rename = "routing.device.removed")]
    RoutingDeviceRemoved { device_id: String },

    #[serde(rename = "chain.hop.failed")]
    ChainHopFailed { chain_id: RoutingChainId, hop_order: u8 },

    #[serde(rename = "chain.latency.updated")]
    ChainLatencyUpdated { chain_id: RoutingChainId, hop_order: u8, latency_ms: Option<u64> },

    /// Consumed, not published by this crate: carries a health-state
    /// transition for an instance's virtual interface (§4.6).
    #[serde(rename = "health.changed")]
    HealthChanged { instance_id: InstanceId, current_state: String },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::UpdateAvailable { .. } => "update.available",
            Event::UpdateStarted { .. } => "update.started",
            Event::UpdateCompleted { .. } => "update.completed",
            Event::UpdateFailed { .. } => "update.failed",
            Event::ServiceUpdatePhase { .. } => "service.update.phase",
            Event::ServiceInstallProgress { .. } => "service.install.progress",
            Event::ServiceUpdateRolledBack { .. } => "service.update.rolled_back",
            Event::RoutingChainCreated { .. } => "routing.chain.created",
            Event::RoutingChainUpdated { .. } => "routing.chain.updated",
            Event::RoutingChainRemoved { .. } => "routing.chain.removed",
            Event::RoutingDeviceAssigned { .. } => "routing.device.assigned",
            Event::RoutingDeviceRemoved { .. } => "routing.device.removed",
            Event::ChainHopFailed { .. } => "chain.hop.failed",
            Event::ChainLatencyUpdated { .. } => "chain.latency.updated",
            Event::HealthChanged { .. } => "health.changed",
        }
    }

    /// Delivery priority hint (§4.6). Only kill-switch activation on hop
    /// failure is immediate; everything else is normal.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::ChainHopFailed { .. } => EventPriority::Immediate,
            _ => EventPriority::Normal,
        }
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::UpdateAvailable { instance_id, available_version, severity, .. } => {
                format!("{t} instance={instance_id} version={available_version} severity={severity}")
            }
            Event::UpdateStarted { instance_id, target_version, .. }
            | Event::UpdateCompleted { instance_id, target_version, .. } => {
                format!("{t} instance={instance_id} target={target_version}")
            }
            Event::UpdateFailed { instance_id, target_version, error, .. } => {
                format!("{t} instance={instance_id} target={target_version} error={error}")
            }
            Event::ServiceUpdatePhase { instance_id, phase, status } => {
                format!("{t} instance={instance_id} phase={phase} status={status}")
            }
            Event::ServiceInstallProgress { instance_id, phase, message } => {
                format!("{t} instance={instance_id} phase={phase} msg={message}")
            }
            Event::ServiceUpdateRolledBack { instance_id, from_version, to_version } => {
                format!("{t} instance={instance_id} from={from_version} to={to_version}")
            }
            Event::RoutingChainCreated { chain_id, device_id, .. } => {
                format!("{t} chain={chain_id} device={device_id}")
            }
            Event::RoutingChainUpdated { chain_id } | Event::RoutingChainRemoved { chain_id } => {
                format!("{t} chain={chain_id}")
            }
            Event::RoutingDeviceAssigned { device_id, instance_id } => {
                format!("{t} device={device_id} instance={instance_id}")
            }
            Event::RoutingDeviceRemoved { device_id } => format!("{t} device={device_id}"),
            Event::ChainHopFailed { chain_id, hop_order } => {
                format!("{t} chain={chain_id} hop={hop_order}")
            }
            Event::ChainLatencyUpdated { chain_id, hop_order, latency_ms } => {
                format!("{t} chain={chain_id} hop={hop_order} latency_ms={latency_ms:?}")
            }
            Event::HealthChanged { instance_id, current_state } => {
                format!("{t} instance={instance_id} state={current_state}")
            }
        }
    }
}
