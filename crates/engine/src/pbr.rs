// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PBR Engine (R1, §4.3): single-hop device→service routing. Apply-
//! Confirm-Merge for assignment, idempotent removal, independent bulk
//! assignment, and startup reconciliation against router state.

use crate::bus::EventBus;
use crate::error::PbrError;
use nnc_adapters::{InstanceDirectory, RouterPort};
use nnc_core::{Clock, DeviceRouting, DeviceRoutingId, Event, InstanceId, RollbackState, SystemClock};
use nnc_storage::{RollbackStore, RoutingStateStore};
use nnc_wire::{Command, StateQuery};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const MANGLE_PATH: &str = "/ip/firewall/mangle";

#[derive(Debug, Clone)]
pub struct AssignDeviceRoutingInput {
    pub device_id: String,
    pub mac: String,
    pub routing_mark: String,
    pub instance_id: InstanceId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignOutcome {
    pub conflict_resolved: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileCounters {
    pub missing_rules: u32,
    pub orphaned_rules: u32,
    pub deleted_vif_cascade: u32,
    pub recreated: u32,
    pub removed: u32,
    pub errors: Vec<String>,
}

/// What a device's routing slot held before an assign/remove — `None`
/// means the device had no routing assignment at all.
#[derive(Debug, Serialize, Deserialize)]
struct DeviceRoutingSnapshot {
    routing: Option<DeviceRouting>,
}

pub struct PbrEngine<R, I> {
    router: R,
    state: Arc<Mutex<RoutingStateStore>>,
    instances: I,
    bus: EventBus,
    rollback: Arc<RollbackStore>,
    clock: SystemClock,
}

impl<R, I> PbrEngine<R, I>
where
    R: RouterPort,
    I: InstanceDirectory,
{
    pub fn new(router: R, state: Arc<Mutex<RoutingStateStore>>, instances: I, bus: EventBus, rollback: Arc<RollbackStore>) -> Self {
        Self { router, state, instances, bus, rollback, clock: SystemClock }
    }

    fn record_rollback(&self, device_id: &str, routing: Option<DeviceRouting>) {
        let snapshot = DeviceRoutingSnapshot { routing };
        let previous_state = match serde_json::to_value(&snapshot) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize device-routing rollback snapshot");
                return;
            }
        };
        for stale in self.rollback.ids_for("", device_id) {
            let _ = self.rollback.take(&stale);
        }
        let state = RollbackState::new("", device_id, self.clock.now_ms(), Vec::new(), previous_state);
        if let Err(err) = self.rollback.put(state) {
            tracing::warn!(error = %err, device_id, "failed to record device-routing rollback snapshot");
        }
    }

    /// `Undo` (§3, L3): restores `device_id`'s routing assignment to
    /// what it held before its most recent assign/remove, provided the
    /// 5-minute undo window hasn't expired.
    pub async fn undo_last_change(&self, device_id: &str, now_ms: u64) -> Result<(), PbrError> {
        let Some(rollback) = self.rollback.latest_for("", device_id, now_ms) else {
            return Err(PbrError::NoRollbackAvailable);
        };
        let snapshot: DeviceRoutingSnapshot =
            serde_json::from_value(rollback.previous_state.clone()).map_err(|_| PbrError::NoRollbackAvailable)?;

        self.remove_device_routing(device_id).await?;

        if let Some(prev) = snapshot.routing {
            let input = AssignDeviceRoutingInput {
                device_id: prev.device_id,
                mac: prev.mac,
                routing_mark: prev.routing_mark,
                instance_id: prev.instance_id,
            };
            self.assign_device_routing(input).await?;
        }

        let _ = self.rollback.take(&rollback.id);
        Ok(())
    }

    fn mangle_args(mac: &str, routing_mark: &str, device_id: &str) -> HashMap<String, String> {
        let mut args = HashMap::new();
        args.insert("chain".to_string(), "prerouting".to_string());
        args.insert("action".to_string(), "mark-routing".to_string());
        args.insert("new-routing-mark".to_string(), routing_mark.to_string());
        args.insert("passthrough".to_string(), "yes".to_string());
        args.insert("src-mac-address".to_string(), mac.to_string());
        args.insert("comment".to_string(), DeviceRouting::mangle_comment(device_id));
        args
    }

    /// `AssignDeviceRouting` (§4.3): conflict resolution, create,
    /// persist, compensate on persistence failure.
    pub async fn assign_device_routing(&self, input: AssignDeviceRoutingInput) -> Result<AssignOutcome, PbrError> {
        let existing = self.state.lock().state().device_routing(&input.device_id).cloned();
        let conflict_resolved = existing.is_some();
        let rollback_snapshot = existing.clone();

        if let Some(existing) = &existing {
            if let Err(err) = self.router.execute(Command::remove(MANGLE_PATH, existing.mangle_rule_id.clone())).await {
                tracing::warn!(error = %err, device_id = %input.device_id, "failed to remove conflicting mangle rule");
            }
            self.state.lock().remove_device_routing(&input.device_id)?;
        }

        let args = Self::mangle_args(&input.mac, &input.routing_mark, &input.device_id);
        let result = self.router.execute(Command::add(MANGLE_PATH, args)).await?;
        let mangle_rule_id = result.id.unwrap_or_default();

        let record = DeviceRouting {
            id: DeviceRoutingId::new(),
            router_id: String::new(),
            device_id: input.device_id.clone(),
            mac: input.mac,
            routing_mark: input.routing_mark,
            instance_id: input.instance_id,
            mangle_rule_id: mangle_rule_id.clone(),
            kill_switch_enabled: false,
            kill_switch_rule_id: None,
        };

        if let Err(err) = self.state.lock().put_device_routing(record) {
            if let Err(cleanup_err) = self.router.execute(Command::remove(MANGLE_PATH, mangle_rule_id)).await {
                tracing::warn!(error = %cleanup_err, "compensating delete of mangle rule failed after persistence error");
            }
            return Err(err.into());
        }

        self.record_rollback(&input.device_id, rollback_snapshot);
        self.bus.publish(Event::RoutingDeviceAssigned { device_id: input.device_id, instance_id: input.instance_id });
        Ok(AssignOutcome { conflict_resolved })
    }

    /// `RemoveDeviceRouting` (§4.3): idempotent, O(1) by stored id.
    pub async fn remove_device_routing(&self, device_id: &str) -> Result<(), PbrError> {
        let existing = self.state.lock().state().device_routing(device_id).cloned();
        let Some(record) = existing else { return Ok(()) };

        if let Some(ks_rule_id) = &record.kill_switch_rule_id {
            if let Err(err) = self.router.execute(Command::remove("/ip/firewall/filter", ks_rule_id.clone())).await {
                tracing::warn!(error = %err, device_id, "failed to remove kill-switch rule during device routing removal");
            }
        }
        if let Err(err) = self.router.execute(Command::remove(MANGLE_PATH, record.mangle_rule_id.clone())).await {
            tracing::warn!(error = %err, device_id, "failed to remove mangle rule during device routing removal");
        }

        self.state.lock().remove_device_routing(device_id)?;
        self.record_rollback(device_id, Some(record));
        self.bus.publish(Event::RoutingDeviceRemoved { device_id: device_id.to_string() });
        Ok(())
    }

    /// `BulkAssignRouting` (§4.3): independent per item; one failure
    /// never aborts the batch.
    pub async fn bulk_assign_routing(&self, inputs: Vec<AssignDeviceRoutingInput>) -> Vec<(String, Result<AssignOutcome, PbrError>)> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let device_id = input.device_id.clone();
            let result = self.assign_device_routing(input).await;
            results.push((device_id, result));
        }
        results
    }

    /// `ReconcileOnStartup` (§4.3): missing/orphan/cascade dispositions
    /// against router mangle rules with the `nnc-routing-` comment
    /// prefix.
    pub async fn reconcile_on_startup(&self) -> ReconcileCounters {
        let mut counters = ReconcileCounters::default();

        let rows = match self.router.query(StateQuery::new(MANGLE_PATH)).await {
            Ok(resources) => resources.resources,
            Err(err) => {
                counters.errors.push(err.to_string());
                return counters;
            }
        };

        let mut router_by_device: HashMap<String, String> = HashMap::new();
        for row in rows {
            let Some(comment) = row.get("comment") else { continue };
            let Some(device_id) = comment.strip_prefix("nnc-routing-") else { continue };
            let Some(id) = row.get(".id") else { continue };
            router_by_device.insert(device_id.to_string(), id.clone());
        }

        let records: Vec<DeviceRouting> = self.state.lock().state().all_device_routings().cloned().collect();
        for record in records {
            let exists = match self.instances.exists(record.instance_id).await {
                Ok(exists) => exists,
                Err(err) => {
                    counters.errors.push(err.to_string());
                    true
                }
            };

            if !exists {
                if let Some(rule_id) = router_by_device.remove(&record.device_id) {
                    if let Err(err) = self.router.execute(Command::remove(MANGLE_PATH, rule_id)).await {
                        counters.errors.push(err.to_string());
                    }
                }
                if let Err(err) = self.state.lock().remove_device_routing(&record.device_id) {
                    counters.errors.push(err.to_string());
                    continue;
                }
                counters.deleted_vif_cascade += 1;
                counters.removed += 1;
                continue;
            }

            if router_by_device.remove(&record.device_id).is_some() {
                continue; // verified: present on both sides.
            }

            // Missing: router lost the rule, recreate it from the DB record.
            let args = Self::mangle_args(&record.mac, &record.routing_mark, &record.device_id);
            match self.router.execute(Command::add(MANGLE_PATH, args)).await {
                Ok(result) => {
                    let mut updated = record.clone();
                    updated.mangle_rule_id = result.id.unwrap_or_default();
                    if let Err(err) = self.state.lock().put_device_routing(updated) {
                        counters.errors.push(err.to_string());
                        continue;
                    }
                    counters.missing_rules += 1;
                    counters.recreated += 1;
                }
                Err(err) => counters.errors.push(err.to_string()),
            }
        }

        // Whatever's left in router_by_device has no surviving DB record.
        for (_device_id, rule_id) in router_by_device {
            match self.router.execute(Command::remove(MANGLE_PATH, rule_id)).await {
                Ok(_) => {
                    counters.orphaned_rules += 1;
                    counters.removed += 1;
                }
                Err(err) => counters.errors.push(err.to_string()),
            }
        }

        counters
    }
}

#[cfg(test)]
#[path = "pbr_tests.rs"]
mod tests;
