// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chain Kill-Switch (R3, §4.6): a health-event-driven fail-closed
//! mechanism. Subscribes to `health.changed`; an unhealthy transition on
//! any interface backing a chain hop disables that chain's traffic by
//! un-disabling its kill-switch filter rules, and a healthy transition
//! only lifts the block once every hop on the chain is healthy again.

use crate::bus::EventBus;
use crate::error::ChainError;
use nnc_adapters::{RouterPort, VifDirectory};
use nnc_core::{Clock, Event, RoutingChainId};
use nnc_storage::RoutingStateStore;
use nnc_wire::Command;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const FILTER_PATH: &str = "/ip/firewall/filter";

pub struct ChainKillSwitch<R, V, C> {
    router: R,
    vifs: V,
    state: Arc<Mutex<RoutingStateStore>>,
    bus: EventBus,
    clock: C,
}

impl<R, V, C> ChainKillSwitch<R, V, C>
where
    R: RouterPort,
    V: VifDirectory,
    C: Clock,
{
    pub fn new(router: R, vifs: V, state: Arc<Mutex<RoutingStateStore>>, bus: EventBus, clock: C) -> Self {
        Self { router, vifs, state, bus, clock }
    }

    /// Consumes `health.changed` events until the channel closes.
    /// Handlers run one at a time — each `handle_health_event` call
    /// completes all router writes for one event before the loop
    /// receives the next, so two rapid flaps on the same chain can
    /// never interleave their writes (§4.6/§5).
    pub async fn run(&self) {
        let mut rx = self.bus.subscribe();
        loop {
            match rx.recv().await {
                Ok(Event::HealthChanged { instance_id, current_state }) => {
                    self.handle_health_event(instance_id, &current_state).await;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "chain kill-switch lagged behind the event bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn handle_health_event(&self, instance_id: nnc_core::InstanceId, current_state: &str) {
        let healthy = current_state == "healthy";
        let affected_chains = self.chains_for_instance(instance_id).await;
        for (chain_id, hop_order) in affected_chains {
            let result = if healthy {
                self.deactivate_chain_kill_switch(chain_id).await
            } else {
                self.activate_chain_kill_switch(chain_id, Some(hop_order)).await
            };
            if let Err(err) = result {
                tracing::warn!(error = %err, %chain_id, "chain kill-switch handler failed for this chain");
            }
        }
    }

    /// Every chain with a hop whose interface belongs to `instance_id`,
    /// paired with the `hop_order` of the first such hop found, deduped
    /// by chain id — the hop order is what `ActivateChainKillSwitch`
    /// reports as the one that failed (§4.6).
    async fn chains_for_instance(&self, instance_id: nnc_core::InstanceId) -> Vec<(RoutingChainId, u8)> {
        let chains: Vec<RoutingChainId> = self.state.lock().state().active_chains().map(|c| c.id).collect();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for chain_id in chains {
            let hops = self.state.lock().state().hops(&chain_id).to_vec();
            for hop in hops {
                match self.vifs.get(hop.interface_id).await {
                    Ok(Some(vif)) if vif.instance_id == instance_id => {
                        if seen.insert(chain_id) {
                            out.push((chain_id, hop.hop_order));
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "kill-switch: vif lookup failed"),
                }
            }
        }
        out
    }

    /// `ActivateChainKillSwitch` (§4.6): enable every hop's kill-switch
    /// filter rule and mark the chain active-blocking, emitting
    /// `chain.hop.failed` with `failed_hop_order` — the hop whose health
    /// event triggered this activation, or `None` for a manual/CLI-driven
    /// activation with no specific failed hop.
    pub async fn activate_chain_kill_switch(&self, chain_id: RoutingChainId, failed_hop_order: Option<u8>) -> Result<(), ChainError> {
        let chain = self.state.lock().state().chain(&chain_id).cloned();
        let Some(chain) = chain else { return Err(ChainError::ChainNotFound(chain_id)) };
        if !chain.kill_switch_enabled {
            return Ok(());
        }

        let hops = self.state.lock().state().hops(&chain_id).to_vec();
        for hop in &hops {
            if let Some(rule_id) = &hop.kill_switch_rule_id {
                let mut args = HashMap::new();
                args.insert("disabled".to_string(), "no".to_string());
                self.router.execute(Command::set(FILTER_PATH, rule_id.clone(), args)).await?;
            }
        }

        let mut store = self.state.lock();
        let mut updated = chain.clone();
        updated.kill_switch_active = true;
        updated.kill_switch_activated_at_ms = Some(self.clock.now_ms());
        store.put_chain(updated)?;
        drop(store);

        let hop_order = failed_hop_order.unwrap_or_else(|| hops.first().map(|h| h.hop_order).unwrap_or(1));
        self.bus.publish(Event::ChainHopFailed { chain_id, hop_order });
        Ok(())
    }

    /// `DeactivateChainKillSwitch` (§4.6): only lifts the block once
    /// every hop's interface is healthy; otherwise errors and leaves the
    /// kill-switch engaged (the fail-closed default must never be lifted
    /// speculatively).
    pub async fn deactivate_chain_kill_switch(&self, chain_id: RoutingChainId) -> Result<(), ChainError> {
        let chain = self.state.lock().state().chain(&chain_id).cloned();
        let Some(chain) = chain else { return Err(ChainError::ChainNotFound(chain_id)) };
        if !chain.kill_switch_active {
            return Ok(());
        }

        let hops = self.state.lock().state().hops(&chain_id).to_vec();
        for hop in &hops {
            let healthy = match self.vifs.get(hop.interface_id).await? {
                Some(vif) => vif.is_healthy(),
                None => false,
            };
            if !healthy {
                return Err(ChainError::NotHealthy { hop_order: hop.hop_order });
            }
        }

        for hop in &hops {
            if let Some(rule_id) = &hop.kill_switch_rule_id {
                let mut args = HashMap::new();
                args.insert("disabled".to_string(), "yes".to_string());
                self.router.execute(Command::set(FILTER_PATH, rule_id.clone(), args)).await?;
            }
        }

        let mut store = self.state.lock();
        let mut updated = chain.clone();
        updated.kill_switch_active = false;
        updated.kill_switch_activated_at_ms = None;
        store.put_chain(updated)?;
        drop(store);

        self.bus.publish(Event::RoutingChainUpdated { chain_id });
        Ok(())
    }
}

#[cfg(test)]
#[path = "killswitch_tests.rs"]
mod tests;
