// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chain Router (R2, §4.4/§4.5): multi-hop chain creation, update,
//! removal, and reconciliation against observed router state. Write
//! operations take an exclusive lock over the whole critical section;
//! reconciliation reads take a shared lock (§5).

use crate::bus::EventBus;
use crate::error::ChainError;
use nnc_adapters::{RouterPort, VifDirectory};
use nnc_core::{
    parse_chain_comment, ChainHop, ChainHopId, Event, RoutingChain, RoutingChainId, RoutingMode, SystemClock,
    ValidationError, VifId, VirtualInterface,
};
use nnc_core::Clock;
use nnc_storage::{RollbackStore, RoutingStateStore};
use nnc_wire::{Command, StateQuery};
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

const MANGLE_PATH: &str = "/ip/firewall/mangle";
const FILTER_PATH: &str = "/ip/firewall/filter";
const ROUTE_PATH: &str = "/ip/route";
const TABLE_PATH: &str = "/routing/table";

const MIN_HOPS: usize = 2;
const MAX_HOPS: usize = 5;
const WARN_HOPS: usize = 4;

#[derive(Debug, Clone)]
pub struct CreateChainInput {
    pub device_id: String,
    pub device_mac: Option<String>,
    pub device_ip: Option<String>,
    pub routing_mode: RoutingMode,
    pub kill_switch_enabled: bool,
    pub interface_ids: Vec<VifId>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileChainCounters {
    pub recreated: u32,
    pub removed: u32,
    pub verified: u32,
    pub cascade_cleaned: u32,
}

/// Alias kept for callers that think of reconciliation as a verb — the
/// counters it returns are the same type.
pub type Reconciliation = ReconcileChainCounters;

enum Compensation {
    RemoveMangle(String),
    RemoveRoutingTable(String),
    RemoveRoute(String),
    RemoveKillSwitch(String),
    DeleteChainRecord(RoutingChainId),
}

/// What a chain's `(router_id, device_id)` slot held immediately
/// before a create/update/remove — `chain` is `None` when the device
/// had no chain at all, making the default undo a plain teardown.
#[derive(Debug, Serialize, Deserialize)]
struct ChainSnapshot {
    chain: Option<RoutingChain>,
    interface_ids: Vec<VifId>,
}

pub struct ChainRouter<R, V> {
    router: R,
    vifs: V,
    state: Arc<SyncMutex<RoutingStateStore>>,
    bus: EventBus,
    lock: Arc<RwLock<()>>,
    rollback: Arc<RollbackStore>,
    clock: SystemClock,
}

fn validate_input(input: &CreateChainInput) -> Result<(), ValidationError> {
    let n = input.interface_ids.len();
    if !(MIN_HOPS..=MAX_HOPS).contains(&n) {
        return Err(ValidationError::HopCountOutOfRange(n));
    }
    if n >= WARN_HOPS {
        tracing::warn!(hop_count = n, "chain has a high hop count");
    }
    let mut seen = HashSet::new();
    for id in &input.interface_ids {
        if !seen.insert(*id) {
            return Err(ValidationError::DuplicateInterface(id.to_string()));
        }
    }
    match input.routing_mode {
        RoutingMode::Mac if input.device_mac.is_none() => return Err(ValidationError::MissingField("device_mac")),
        RoutingMode::Ip if input.device_ip.is_none() => return Err(ValidationError::MissingField("device_ip")),
        _ => {}
    }
    Ok(())
}

impl<R, V> ChainRouter<R, V>
where
    R: RouterPort,
    V: VifDirectory,
{
    pub fn new(router: R, vifs: V, state: Arc<SyncMutex<RoutingStateStore>>, bus: EventBus, rollback: Arc<RollbackStore>) -> Self {
        Self { router, vifs, state, bus, lock: Arc::new(RwLock::new(())), rollback, clock: SystemClock }
    }

    /// Captures what `device_id` had before a create/update/remove, for
    /// the Rollback Store (§3 manual `Undo`, L3).
    fn snapshot(&self, existing: Option<&RoutingChain>) -> ChainSnapshot {
        let interface_ids = match existing {
            Some(chain) => self.state.lock().state().hops(&chain.id).iter().map(|h| h.interface_id).collect(),
            None => Vec::new(),
        };
        ChainSnapshot { chain: existing.cloned(), interface_ids }
    }

    fn record_rollback(&self, router_id: &str, device_id: &str, snapshot: ChainSnapshot) {
        let previous_state = match serde_json::to_value(&snapshot) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize chain rollback snapshot");
                return;
            }
        };
        // Only the most recent pre-image per (router_id, device_id) is
        // restorable — drop any stale one before recording the new one.
        for stale in self.rollback.ids_for(router_id, device_id) {
            let _ = self.rollback.take(&stale);
        }
        let state = nnc_core::RollbackState::new(router_id, device_id, self.clock.now_ms(), Vec::new(), previous_state);
        if let Err(err) = self.rollback.put(state) {
            tracing::warn!(error = %err, device_id, "failed to record chain rollback snapshot");
        }
    }

    /// `Undo` (§3, L3): restores whatever `(router_id, device_id)` had
    /// before its most recent create/update/remove, provided the
    /// 5-minute undo window hasn't expired. Consumes the snapshot —
    /// undoing twice in a row without an intervening change fails with
    /// [`ChainError::NoRollbackAvailable`].
    pub async fn undo_last_change(&self, router_id: &str, device_id: &str, now_ms: u64) -> Result<(), ChainError> {
        let _guard = self.lock.write().await;
        let Some(rollback) = self.rollback.latest_for(router_id, device_id, now_ms) else {
            return Err(ChainError::NoRollbackAvailable);
        };
        let snapshot: ChainSnapshot =
            serde_json::from_value(rollback.previous_state.clone()).map_err(|_| ChainError::NoRollbackAvailable)?;

        if let Some(current) = self.state.lock().state().chain_for_device(device_id).cloned() {
            self.teardown_chain(current.id).await?;
        }

        if let Some(prev_chain) = snapshot.chain {
            let interfaces = self.resolve_interfaces(&snapshot.interface_ids).await?;
            let input = CreateChainInput {
                device_id: prev_chain.device_id.clone(),
                device_mac: prev_chain.device_mac.clone(),
                device_ip: prev_chain.device_ip.clone(),
                routing_mode: prev_chain.routing_mode,
                kill_switch_enabled: prev_chain.kill_switch_enabled,
                interface_ids: snapshot.interface_ids,
            };
            self.build_chain(prev_chain.id, &prev_chain.router_id, &input, &interfaces).await?;
            self.bus.publish(Event::RoutingChainUpdated { chain_id: prev_chain.id });
        }

        let _ = self.rollback.take(&rollback.id);
        Ok(())
    }

    async fn resolve_interfaces(&self, ids: &[VifId]) -> Result<Vec<VirtualInterface>, ChainError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let vif = self.vifs.get(*id).await?.ok_or_else(|| ValidationError::UnknownInterface(id.to_string()))?;
            out.push(vif);
        }
        Ok(out)
    }

    async fn remove_single_hop_routing(&self, device_id: &str) {
        let existing = self.state.lock().state().device_routing(device_id).cloned();
        let Some(record) = existing else { return };
        if let Some(ks_id) = &record.kill_switch_rule_id {
            if let Err(err) = self.router.execute(Command::remove(FILTER_PATH, ks_id.clone())).await {
                tracing::warn!(error = %err, device_id, "failed to remove single-hop kill-switch rule before chain creation");
            }
        }
        if let Err(err) = self.router.execute(Command::remove(MANGLE_PATH, record.mangle_rule_id.clone())).await {
            tracing::warn!(error = %err, device_id, "failed to remove single-hop mangle rule before chain creation");
        }
        if let Err(err) = self.state.lock().remove_device_routing(device_id) {
            tracing::warn!(error = %err, device_id, "failed to delete single-hop routing record before chain creation");
        }
    }

    /// `CreateRoutingChain` (§4.4).
    pub async fn create_routing_chain(&self, router_id: &str, input: CreateChainInput) -> Result<RoutingChainId, ChainError> {
        let _guard = self.lock.write().await;
        validate_input(&input)?;
        let interfaces = self.resolve_interfaces(&input.interface_ids).await?;

        let existing = self.state.lock().state().chain_for_device(&input.device_id).cloned();
        let snapshot = self.snapshot(existing.as_ref());
        if let Some(existing) = existing {
            self.teardown_chain(existing.id).await?;
        }
        self.remove_single_hop_routing(&input.device_id).await;

        let chain_id = RoutingChainId::new();
        self.build_chain(chain_id, router_id, &input, &interfaces).await?;
        self.record_rollback(router_id, &input.device_id, snapshot);
        self.bus.publish(Event::RoutingChainCreated { chain_id, router_id: router_id.to_string(), device_id: input.device_id });
        Ok(chain_id)
    }

    /// `UpdateRoutingChain` (§4.4): remove-then-create under the same
    /// chain id, emitting `updated` instead of `created`.
    pub async fn update_routing_chain(&self, chain_id: RoutingChainId, input: CreateChainInput) -> Result<(), ChainError> {
        let _guard = self.lock.write().await;
        validate_input(&input)?;
        let interfaces = self.resolve_interfaces(&input.interface_ids).await?;

        let existing = self.state.lock().state().chain(&chain_id).cloned().ok_or(ChainError::ChainNotFound(chain_id))?;
        let snapshot = self.snapshot(Some(&existing));
        self.teardown_chain(chain_id).await?;

        self.build_chain(chain_id, &existing.router_id, &input, &interfaces).await?;
        self.record_rollback(&existing.router_id, &existing.device_id, snapshot);
        self.bus.publish(Event::RoutingChainUpdated { chain_id });
        Ok(())
    }

    /// `RemoveRoutingChain` (§4.4).
    pub async fn remove_routing_chain(&self, chain_id: RoutingChainId) -> Result<(), ChainError> {
        let _guard = self.lock.write().await;
        let existing = self.state.lock().state().chain(&chain_id).cloned();
        let snapshot = self.snapshot(existing.as_ref());
        self.teardown_chain(chain_id).await?;
        if let Some(existing) = existing {
            self.record_rollback(&existing.router_id, &existing.device_id, snapshot);
        }
        Ok(())
    }

    async fn teardown_chain(&self, chain_id: RoutingChainId) -> Result<(), ChainError> {
        let hops = self.state.lock().state().hops(&chain_id).to_vec();
        for hop in hops.iter().rev() {
            if let Some(ks_id) = &hop.kill_switch_rule_id {
                if let Err(err) = self.router.execute(Command::remove(FILTER_PATH, ks_id.clone())).await {
                    tracing::warn!(error = %err, %chain_id, "failed to remove kill-switch rule during chain teardown");
                }
            }
            if let Err(err) = self.router.execute(Command::remove(ROUTE_PATH, hop.route_id.clone())).await {
                tracing::warn!(error = %err, %chain_id, "failed to remove route during chain teardown");
            }
            if let Err(err) = self.router.execute(Command::remove(TABLE_PATH, hop.route_table_name.clone())).await {
                tracing::warn!(error = %err, %chain_id, "failed to remove routing table during chain teardown");
            }
            if let Err(err) = self.router.execute(Command::remove(MANGLE_PATH, hop.mangle_rule_id.clone())).await {
                tracing::warn!(error = %err, %chain_id, "failed to remove mangle rule during chain teardown");
            }
        }
        self.state.lock().remove_chain(&chain_id)?;
        self.bus.publish(Event::RoutingChainRemoved { chain_id });
        Ok(())
    }

    async fn build_chain(
        &self,
        chain_id: RoutingChainId,
        router_id: &str,
        input: &CreateChainInput,
        interfaces: &[VirtualInterface],
    ) -> Result<(), ChainError> {
        let chain = RoutingChain {
            id: chain_id,
            router_id: router_id.to_string(),
            device_id: input.device_id.clone(),
            device_mac: input.device_mac.clone(),
            device_ip: input.device_ip.clone(),
            routing_mode: input.routing_mode,
            kill_switch_enabled: input.kill_switch_enabled,
            kill_switch_mode: input.routing_mode.into(),
            kill_switch_active: false,
            kill_switch_activated_at_ms: None,
            active: true,
        };

        let mut stack: Vec<Compensation> = Vec::new();
        if let Err(err) = self.state.lock().put_chain(chain) {
            return Err(err.into());
        }
        stack.push(Compensation::DeleteChainRecord(chain_id));

        let mut hops = Vec::with_capacity(interfaces.len());
        let mut prev_interface_name: Option<String> = None;
        for (idx, vif) in interfaces.iter().enumerate() {
            let hop_order = (idx + 1) as u8;
            match self.create_hop(chain_id, hop_order, input, vif, prev_interface_name.as_deref(), &mut stack).await {
                Ok(hop) => {
                    prev_interface_name = Some(vif.interface_name.clone());
                    hops.push(hop);
                }
                Err(err) => {
                    self.compensate(stack).await;
                    return Err(err);
                }
            }
        }

        if let Err(err) = self.state.lock().put_hops(chain_id, hops) {
            self.compensate(stack).await;
            return Err(err.into());
        }

        Ok(())
    }

    async fn create_hop(
        &self,
        chain_id: RoutingChainId,
        hop_order: u8,
        input: &CreateChainInput,
        vif: &VirtualInterface,
        prev_interface_name: Option<&str>,
        stack: &mut Vec<Compensation>,
    ) -> Result<ChainHop, ChainError> {
        let mark = RoutingChain::routing_mark(chain_id, hop_order);
        let mangle_comment = RoutingChain::mangle_comment(chain_id, hop_order);

        let mut mangle_args = HashMap::new();
        mangle_args.insert("chain".to_string(), "prerouting".to_string());
        mangle_args.insert("place-before".to_string(), "0".to_string());
        mangle_args.insert("action".to_string(), "mark-routing".to_string());
        mangle_args.insert("new-routing-mark".to_string(), mark.clone());
        mangle_args.insert("passthrough".to_string(), "yes".to_string());
        mangle_args.insert("comment".to_string(), mangle_comment.clone());
        if hop_order == 1 {
            Self::add_device_match(&mut mangle_args, input);
        } else {
            mangle_args.insert("in-interface".to_string(), prev_interface_name.unwrap_or_default().to_string());
            mangle_args.insert("connection-state".to_string(), "new".to_string());
        }
        self.router.execute(Command::add(MANGLE_PATH, mangle_args)).await?;
        let confirm = self.router.query(StateQuery::by_comment(MANGLE_PATH, mangle_comment)).await?;
        let mangle_rule_id = confirm.resources.first().and_then(|r| r.get(".id")).cloned().ok_or(ChainError::Confirmation("mangle rule create"))?;
        stack.push(Compensation::RemoveMangle(mangle_rule_id.clone()));

        let mut table_args = HashMap::new();
        table_args.insert("name".to_string(), mark.clone());
        self.router.execute(Command::add(TABLE_PATH, table_args)).await?;
        stack.push(Compensation::RemoveRoutingTable(mark.clone()));

        let mut route_args = HashMap::new();
        route_args.insert("dst-address".to_string(), "0.0.0.0/0".to_string());
        route_args.insert("gateway".to_string(), vif.gateway_ip().to_string());
        route_args.insert("routing-table".to_string(), mark.clone());
        self.router.execute(Command::add(ROUTE_PATH, route_args)).await?;
        let mut route_filter = HashMap::new();
        route_filter.insert("routing-table".to_string(), mark.clone());
        let route_confirm = self.router.query(StateQuery::new(ROUTE_PATH).with_filter(route_filter)).await?;
        let route_id = route_confirm.resources.first().and_then(|r| r.get(".id")).cloned().ok_or(ChainError::Confirmation("route create"))?;
        stack.push(Compensation::RemoveRoute(route_id.clone()));

        let kill_switch_rule_id = if input.kill_switch_enabled {
            let ks_comment = RoutingChain::kill_switch_comment(chain_id, hop_order);
            let mut ks_args = HashMap::new();
            ks_args.insert("chain".to_string(), "forward".to_string());
            ks_args.insert("action".to_string(), "drop".to_string());
            ks_args.insert("disabled".to_string(), "yes".to_string());
            ks_args.insert("comment".to_string(), ks_comment);
            Self::add_device_match(&mut ks_args, input);
            let result = self.router.execute(Command::add(FILTER_PATH, ks_args)).await?;
            let id = result.id.ok_or(ChainError::Confirmation("kill-switch rule create"))?;
            stack.push(Compensation::RemoveKillSwitch(id.clone()));
            Some(id)
        } else {
            None
        };

        Ok(ChainHop {
            id: ChainHopId::new(),
            chain_id,
            hop_order,
            interface_id: vif.id,
            routing_mark: mark.clone(),
            route_table_name: mark,
            mangle_rule_id,
            route_id,
            kill_switch_rule_id,
            kill_switch_active: false,
        })
    }

    fn add_device_match(args: &mut HashMap<String, String>, input: &CreateChainInput) {
        match input.routing_mode {
            RoutingMode::Mac => {
                args.insert("src-mac-address".to_string(), input.device_mac.clone().unwrap_or_default());
            }
            RoutingMode::Ip => {
                args.insert("src-address".to_string(), input.device_ip.clone().unwrap_or_default());
            }
        }
    }

    async fn compensate(&self, stack: Vec<Compensation>) {
        for action in stack.into_iter().rev() {
            match action {
                Compensation::RemoveMangle(id) => {
                    if let Err(err) = self.router.execute(Command::remove(MANGLE_PATH, id)).await {
                        tracing::warn!(error = %err, "compensating mangle-rule removal failed during chain-creation unwind");
                    }
                }
                Compensation::RemoveRoutingTable(name) => {
                    if let Err(err) = self.router.execute(Command::remove(TABLE_PATH, name)).await {
                        tracing::warn!(error = %err, "compensating routing-table removal failed during chain-creation unwind");
                    }
                }
                Compensation::RemoveRoute(id) => {
                    if let Err(err) = self.router.execute(Command::remove(ROUTE_PATH, id)).await {
                        tracing::warn!(error = %err, "compensating route removal failed during chain-creation unwind");
                    }
                }
                Compensation::RemoveKillSwitch(id) => {
                    if let Err(err) = self.router.execute(Command::remove(FILTER_PATH, id)).await {
                        tracing::warn!(error = %err, "compensating kill-switch rule removal failed during chain-creation unwind");
                    }
                }
                Compensation::DeleteChainRecord(chain_id) => {
                    if let Err(err) = self.state.lock().remove_chain(&chain_id) {
                        tracing::warn!(error = %err, %chain_id, "compensating chain-record delete failed during chain-creation unwind");
                    }
                }
            }
        }
    }

    /// `Reconcile` (§4.5): cascade-deleted interfaces, missing mangle
    /// rules, kill-switch drift, and orphan rules owned by the
    /// `nnc-chain`/`nnc-chainks` comment namespace.
    pub async fn reconcile(&self) -> ReconcileChainCounters {
        let _guard = self.lock.read().await;
        let mut counters = ReconcileChainCounters::default();

        let mangle_rows = match self.router.query(StateQuery::new(MANGLE_PATH)).await {
            Ok(r) => r.resources,
            Err(err) => {
                tracing::error!(error = %err, "reconcile: failed to list mangle rules");
                return counters;
            }
        };
        let filter_rows = match self.router.query(StateQuery::new(FILTER_PATH)).await {
            Ok(r) => r.resources,
            Err(err) => {
                tracing::error!(error = %err, "reconcile: failed to list filter rules");
                return counters;
            }
        };

        let chains: Vec<RoutingChain> = self.state.lock().state().all_chains().cloned().collect();
        for chain in &chains {
            let hops = self.state.lock().state().hops(&chain.id).to_vec();

            let mut cascade = false;
            for hop in &hops {
                match self.vifs.get(hop.interface_id).await {
                    Ok(None) => {
                        cascade = true;
                        break;
                    }
                    Ok(Some(_)) => {}
                    Err(err) => tracing::warn!(error = %err, "reconcile: vif lookup failed"),
                }
            }
            if cascade {
                if let Err(err) = self.teardown_chain(chain.id).await {
                    tracing::error!(error = %err, chain_id = %chain.id, "reconcile: cascade teardown failed");
                }
                counters.cascade_cleaned += 1;
                continue;
            }

            let missing = hops.iter().any(|hop| {
                let expected = RoutingChain::mangle_comment(chain.id, hop.hop_order);
                !mangle_rows.iter().any(|row| row.get("comment") == Some(&expected))
            });
            if missing {
                if let Err(err) = self.teardown_chain(chain.id).await {
                    tracing::warn!(error = %err, chain_id = %chain.id, "reconcile: teardown before recreate hit an error, continuing");
                }
                let input = CreateChainInput {
                    device_id: chain.device_id.clone(),
                    device_mac: chain.device_mac.clone(),
                    device_ip: chain.device_ip.clone(),
                    routing_mode: chain.routing_mode,
                    kill_switch_enabled: chain.kill_switch_enabled,
                    interface_ids: hops.iter().map(|h| h.interface_id).collect(),
                };
                match self.resolve_interfaces(&input.interface_ids).await {
                    Ok(interfaces) => match self.build_chain(chain.id, &chain.router_id, &input, &interfaces).await {
                        Ok(()) => counters.recreated += 1,
                        Err(err) => tracing::error!(error = %err, chain_id = %chain.id, "reconcile: recreate failed"),
                    },
                    Err(err) => tracing::error!(error = %err, chain_id = %chain.id, "reconcile: could not resolve interfaces for recreate"),
                }
                continue;
            }

            for hop in &hops {
                if let Some(ks_id) = &hop.kill_switch_rule_id {
                    if let Some(row) = filter_rows.iter().find(|r| r.get(".id") == Some(ks_id)) {
                        let disabled = row.get("disabled").map(|v| v == "yes").unwrap_or(false);
                        let want_disabled = !chain.kill_switch_active;
                        if disabled != want_disabled {
                            let mut args = HashMap::new();
                            args.insert("disabled".to_string(), if want_disabled { "yes" } else { "no" }.to_string());
                            if let Err(err) = self.router.execute(Command::set(FILTER_PATH, ks_id.clone(), args)).await {
                                tracing::warn!(error = %err, chain_id = %chain.id, "reconcile: kill-switch drift fix failed");
                            }
                        }
                    }
                }
            }
            counters.verified += 1;
        }

        let known_ids: HashSet<String> = chains.iter().map(|c| c.id.as_str().to_string()).collect();
        for row in &mangle_rows {
            if let Some(comment) = row.get("comment") {
                if let Some((id, _hop)) = parse_chain_comment(comment, "nnc-chain") {
                    if !known_ids.contains(&id) {
                        if let Some(rule_id) = row.get(".id") {
                            if self.router.execute(Command::remove(MANGLE_PATH, rule_id.clone())).await.is_ok() {
                                counters.removed += 1;
                            }
                        }
                    }
                }
            }
        }
        for row in &filter_rows {
            if let Some(comment) = row.get("comment") {
                if let Some((id, _hop)) = parse_chain_comment(comment, "nnc-chainks") {
                    if !known_ids.contains(&id) {
                        if let Some(rule_id) = row.get(".id") {
                            if self.router.execute(Command::remove(FILTER_PATH, rule_id.clone())).await.is_ok() {
                                counters.removed += 1;
                            }
                        }
                    }
                }
            }
        }

        counters
    }
}

#[cfg(test)]
#[path = "chain_tests.rs"]
mod tests;
