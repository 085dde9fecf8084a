// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chain Latency Measurer (R4, §5): TCP-connect probes across hops for
//! observability. Each hop is probed on a short list of candidate ports
//! with a 3-second per-connect timeout; the measurer stops early if
//! cancelled and never fails the sweep on one hop's unreachable gateway.

use crate::bus::EventBus;
use nnc_adapters::VifDirectory;
use nnc_core::Event;
use nnc_storage::RoutingStateStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const CANDIDATE_PORTS: [u16; 3] = [80, 443, 53];

pub struct LatencyMeasurer<V> {
    vifs: V,
    state: Arc<Mutex<RoutingStateStore>>,
    bus: EventBus,
    candidate_ports: Vec<u16>,
}

impl<V> LatencyMeasurer<V>
where
    V: VifDirectory,
{
    pub fn new(vifs: V, state: Arc<Mutex<RoutingStateStore>>, bus: EventBus) -> Self {
        Self { vifs, state, bus, candidate_ports: CANDIDATE_PORTS.to_vec() }
    }

    /// Overrides the probed port list — used by tests to dial a local
    /// listener instead of the real `{80,443,53}` trio.
    pub fn with_candidate_ports(mut self, ports: Vec<u16>) -> Self {
        self.candidate_ports = ports;
        self
    }

    /// One sweep across every active chain's hops, publishing
    /// `chain.latency.updated` per hop. Stops without finishing the
    /// sweep if `cancel` fires between hops.
    pub async fn measure_all(&self, cancel: &CancellationToken) {
        let chains: Vec<_> = self.state.lock().state().active_chains().map(|c| c.id).collect();
        for chain_id in chains {
            if cancel.is_cancelled() {
                return;
            }
            let hops = self.state.lock().state().hops(&chain_id).to_vec();
            for hop in hops {
                if cancel.is_cancelled() {
                    return;
                }
                let latency_ms = self.measure_hop(hop.interface_id, cancel).await;
                self.bus.publish(Event::ChainLatencyUpdated { chain_id, hop_order: hop.hop_order, latency_ms });
            }
        }
    }

    /// `None` means every candidate port failed to connect (or the
    /// interface no longer resolves) — observability data, not an error.
    async fn measure_hop(&self, interface_id: nnc_core::VifId, cancel: &CancellationToken) -> Option<u64> {
        let vif = match self.vifs.get(interface_id).await {
            Ok(Some(vif)) => vif,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(error = %err, "latency measurer: vif lookup failed");
                return None;
            }
        };
        let gateway = vif.gateway_ip();

        for port in &self.candidate_ports {
            let port = *port;
            if cancel.is_cancelled() {
                return None;
            }
            let addr = format!("{gateway}:{port}");
            let started = std::time::Instant::now();
            let attempt = tokio::select! {
                result = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)) => result,
                _ = cancel.cancelled() => return None,
            };
            if let Ok(Ok(_stream)) = attempt {
                return Some(started.elapsed().as_millis() as u64);
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "latency_tests.rs"]
mod tests;
