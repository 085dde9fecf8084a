// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized routing state (R1/R2/R3): the local database the PBR
//! Engine and Chain Router reconcile against (§4.5) and the Chain
//! Kill-Switch mutates in place. Persisted as a flat JSON snapshot on
//! every mutation, the same pattern as the Rollback Store — chain/hop/
//! device-routing records change at human-intent speed (seconds), not
//! WAL-log volume, so a rewrite-on-write snapshot is simpler than a
//! replayed log and still survives a restart.
//!
//! # Idempotency
//!
//! `apply_event` may be called twice for the same event (once for
//! immediate visibility when it's published, once more if the caller
//! replays a missed event after reconnecting to the bus). Handlers
//! assign rather than increment so a repeat is a no-op.

use nnc_core::{ChainHop, ChainHopId, DeviceRouting, Event, RoutingChain, RoutingChainId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingStateError {
    #[error("routing state io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("routing state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RoutingState {
    pub chains: HashMap<RoutingChainId, RoutingChain>,
    pub hops: HashMap<RoutingChainId, Vec<ChainHop>>,
    pub device_routing: HashMap<String, DeviceRouting>,
}

impl RoutingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::RoutingChainRemoved { chain_id } => {
                self.chains.remove(chain_id);
                self.hops.remove(chain_id);
            }
            Event::ChainHopFailed { chain_id, hop_order } => {
                if let Some(chain) = self.chains.get_mut(chain_id) {
                    chain.kill_switch_active = true;
                }
                if let Some(hops) = self.hops.get_mut(chain_id) {
                    if let Some(hop) = hops.iter_mut().find(|h| h.hop_order == *hop_order) {
                        hop.kill_switch_active = true;
                    }
                }
            }
            Event::RoutingDeviceRemoved { device_id } => {
                self.device_routing.remove(device_id);
            }
            // Creation/update/assignment events carry only identifiers, not
            // the full record — the engine writes the materialized record
            // directly via `put_chain`/`put_hops`/`put_device_routing` at
            // the point it persists the change, then publishes the event
            // for observers. Nothing further to derive here.
            Event::RoutingChainCreated { .. }
            | Event::RoutingChainUpdated { .. }
            | Event::RoutingDeviceAssigned { .. }
            | Event::ChainLatencyUpdated { .. } => {}
            _ => {}
        }
    }

    pub fn put_chain(&mut self, chain: RoutingChain) {
        self.chains.insert(chain.id, chain);
    }

    pub fn remove_chain(&mut self, chain_id: &RoutingChainId) {
        self.chains.remove(chain_id);
        self.hops.remove(chain_id);
    }

    pub fn put_hops(&mut self, chain_id: RoutingChainId, hops: Vec<ChainHop>) {
        self.hops.insert(chain_id, hops);
    }

    pub fn put_device_routing(&mut self, routing: DeviceRouting) {
        self.device_routing.insert(routing.device_id.clone(), routing);
    }

    pub fn remove_device_routing(&mut self, device_id: &str) {
        self.device_routing.remove(device_id);
    }

    pub fn chain(&self, id: &RoutingChainId) -> Option<&RoutingChain> {
        self.chains.get(id)
    }

    pub fn hops(&self, chain_id: &RoutingChainId) -> &[ChainHop] {
        self.hops.get(chain_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn chain_for_device(&self, device_id: &str) -> Option<&RoutingChain> {
        self.chains.values().find(|c| c.device_id == device_id && c.active)
    }

    pub fn device_routing(&self, device_id: &str) -> Option<&DeviceRouting> {
        self.device_routing.get(device_id)
    }

    pub fn all_chains(&self) -> impl Iterator<Item = &RoutingChain> {
        self.chains.values()
    }

    pub fn active_chains(&self) -> impl Iterator<Item = &RoutingChain> {
        self.chains.values().filter(|c| c.active)
    }

    pub fn all_device_routings(&self) -> impl Iterator<Item = &DeviceRouting> {
        self.device_routing.values()
    }

    pub fn hop_by_id(&self, hop_id: &ChainHopId) -> Option<&ChainHop> {
        self.hops.values().flatten().find(|h| &h.id == hop_id)
    }
}

/// Durable wrapper around [`RoutingState`]: every mutating call
/// rewrites the whole snapshot file, the same contract as
/// [`crate::rollback::RollbackStore`].
pub struct RoutingStateStore {
    path: PathBuf,
    state: RoutingState,
}

impl RoutingStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RoutingStateError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                RoutingState::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            RoutingState::new()
        };
        Ok(Self { path, state })
    }

    fn persist(&self) -> Result<(), RoutingStateError> {
        let raw = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    pub fn state(&self) -> &RoutingState {
        &self.state
    }

    pub fn apply_event(&mut self, event: &Event) -> Result<(), RoutingStateError> {
        self.state.apply_event(event);
        self.persist()
    }

    pub fn put_chain(&mut self, chain: RoutingChain) -> Result<(), RoutingStateError> {
        self.state.put_chain(chain);
        self.persist()
    }

    pub fn remove_chain(&mut self, chain_id: &RoutingChainId) -> Result<(), RoutingStateError> {
        self.state.remove_chain(chain_id);
        self.persist()
    }

    pub fn put_hops(&mut self, chain_id: RoutingChainId, hops: Vec<ChainHop>) -> Result<(), RoutingStateError> {
        self.state.put_hops(chain_id, hops);
        self.persist()
    }

    pub fn put_device_routing(&mut self, routing: DeviceRouting) -> Result<(), RoutingStateError> {
        self.state.put_device_routing(routing);
        self.persist()
    }

    pub fn remove_device_routing(&mut self, device_id: &str) -> Result<(), RoutingStateError> {
        self.state.remove_device_routing(device_id);
        self.persist()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
