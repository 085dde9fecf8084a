// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `RoutingChain` / `ChainHop` — multi-hop chain routing (§3, §4.4-§4.6).
//! Invariants: at most one chain per `(router_id, device_id)`; 2 <= hops
//! <= 5; hop_orders dense and unique; each interface used at most once.

use crate::define_id;
use crate::model::vif::VifId;
use serde::{Deserialize, Serialize};

define_id! {
    pub struct RoutingChainId("rtc-");
}

define_id! {
    pub struct ChainHopId("hop-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingMode {
    Mac,
    Ip,
}

/// How a kill-switch rule matches the device (mirrors `RoutingMode`, kept
/// distinct because a chain's kill-switch mode is allowed to diverge from
/// its hop-1 match mode in principle, even though both are populated from
/// the same `RoutingMode` today).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillSwitchMode {
    Mac,
    Ip,
}

impl From<RoutingMode> for KillSwitchMode {
    fn from(m: RoutingMode) -> Self {
        match m {
            RoutingMode::Mac => KillSwitchMode::Mac,
            RoutingMode::Ip => KillSwitchMode::Ip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingChain {
    pub id: RoutingChainId,
    pub router_id: String,
    pub device_id: String,
    pub device_mac: Option<String>,
    pub device_ip: Option<String>,
    pub routing_mode: RoutingMode,
    pub kill_switch_enabled: bool,
    pub kill_switch_mode: KillSwitchMode,
    pub kill_switch_active: bool,
    pub kill_switch_activated_at_ms: Option<u64>,
    pub active: bool,
}

impl RoutingChain {
    pub fn mangle_comment(chain_id: RoutingChainId, hop_order: u8) -> String {
        format!("nnc-chain-{chain_id}-hop{hop_order}")
    }

    pub fn kill_switch_comment(chain_id: RoutingChainId, hop_order: u8) -> String {
        format!("nnc-chainks-{chain_id}-hop{hop_order}")
    }

    pub fn routing_mark(chain_id: RoutingChainId, hop_order: u8) -> String {
        format!("chain-{chain_id}-hop{hop_order}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainHop {
    pub id: ChainHopId,
    pub chain_id: RoutingChainId,
    pub hop_order: u8,
    pub interface_id: VifId,
    pub routing_mark: String,
    pub route_table_name: String,
    pub mangle_rule_id: String,
    pub route_id: String,
    pub kill_switch_rule_id: Option<String>,
    pub kill_switch_active: bool,
}

impl ChainHop {
    /// §8 hop-naming invariant: `routing_mark == route_table_name ==
    /// "chain-<chain_id>-hop<hop_order>"`.
    pub fn names_consistent(&self) -> bool {
        let expected = RoutingChain::routing_mark(self.chain_id, self.hop_order);
        self.routing_mark == expected && self.route_table_name == expected
    }
}

/// Parse the `<id>` out of a `nnc-chain-<id>-hop<n>` or
/// `nnc-chainks-<id>-hop<n>` comment. Returns `None` if the comment doesn't
/// match the namespace.
pub fn parse_chain_comment(comment: &str, prefix: &str) -> Option<(String, u8)> {
    let rest = comment.strip_prefix(prefix)?.strip_prefix('-')?;
    let hop_idx = rest.rfind("-hop")?;
    let (id, hop_part) = rest.split_at(hop_idx);
    let hop_order: u8 = hop_part.strip_prefix("-hop")?.parse().ok()?;
    Some((id.to_string(), hop_order))
}
