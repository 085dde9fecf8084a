// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Subcommand;
use nnc_core::{Clock, RoutingChainId, RoutingMode, VifId};
use nnc_daemon::Daemon;
use nnc_engine::CreateChainInput;

#[derive(Subcommand)]
pub enum ChainCommand {
    /// Create a multi-hop routing chain for one device (§4.4).
    Create {
        router_id: String,
        device_id: String,
        /// Comma-separated virtual-interface ids, in hop order.
        interface_ids: String,
        #[arg(long, value_enum, default_value = "mac")]
        routing_mode: RoutingModeArg,
        #[arg(long)]
        device_mac: Option<String>,
        #[arg(long)]
        device_ip: Option<String>,
        #[arg(long)]
        kill_switch: bool,
    },
    /// Replace an existing chain's hop list (§4.4).
    Update {
        chain_id: String,
        device_id: String,
        interface_ids: String,
        #[arg(long, value_enum, default_value = "mac")]
        routing_mode: RoutingModeArg,
        #[arg(long)]
        device_mac: Option<String>,
        #[arg(long)]
        device_ip: Option<String>,
        #[arg(long)]
        kill_switch: bool,
    },
    /// Remove a chain and every hop's router state.
    Remove {
        chain_id: String,
    },
    /// Reconcile chain state against observed router/interface reality (§4.5).
    Reconcile,
    /// Undo the most recent create/update/remove for a device's chain,
    /// within the 5-minute manual-undo window (§3, L3).
    Undo {
        router_id: String,
        device_id: String,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum RoutingModeArg {
    Mac,
    Ip,
}

impl From<RoutingModeArg> for RoutingMode {
    fn from(arg: RoutingModeArg) -> Self {
        match arg {
            RoutingModeArg::Mac => RoutingMode::Mac,
            RoutingModeArg::Ip => RoutingMode::Ip,
        }
    }
}

fn parse_interface_ids(raw: &str) -> Vec<VifId> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(VifId::from_string).collect()
}

pub async fn run(daemon: &Daemon, cmd: ChainCommand) -> anyhow::Result<()> {
    match cmd {
        ChainCommand::Create { router_id, device_id, interface_ids, routing_mode, device_mac, device_ip, kill_switch } => {
            let input = CreateChainInput {
                device_id,
                device_mac,
                device_ip,
                routing_mode: routing_mode.into(),
                kill_switch_enabled: kill_switch,
                interface_ids: parse_interface_ids(&interface_ids),
            };
            let chain_id = daemon.chain.create_routing_chain(&router_id, input).await?;
            println!("created chain {chain_id}");
        }
        ChainCommand::Update { chain_id, device_id, interface_ids, routing_mode, device_mac, device_ip, kill_switch } => {
            let chain_id = RoutingChainId::from_string(chain_id);
            let input = CreateChainInput {
                device_id,
                device_mac,
                device_ip,
                routing_mode: routing_mode.into(),
                kill_switch_enabled: kill_switch,
                interface_ids: parse_interface_ids(&interface_ids),
            };
            daemon.chain.update_routing_chain(chain_id, input).await?;
            println!("updated chain {chain_id}");
        }
        ChainCommand::Remove { chain_id } => {
            let chain_id = RoutingChainId::from_string(chain_id);
            daemon.chain.remove_routing_chain(chain_id).await?;
            println!("removed chain {chain_id}");
        }
        ChainCommand::Reconcile => {
            let counters = daemon.chain.reconcile().await;
            println!("{}", serde_json::to_string_pretty(&counters_json(&counters))?);
        }
        ChainCommand::Undo { router_id, device_id } => {
            daemon.chain.undo_last_change(&router_id, &device_id, nnc_core::SystemClock.now_ms()).await?;
            println!("undid the last chain change for device {device_id}");
        }
    }
    Ok(())
}

fn counters_json(counters: &nnc_engine::Reconciliation) -> serde_json::Value {
    serde_json::json!({
        "recreated": counters.recreated,
        "removed": counters.removed,
        "verified": counters.verified,
        "cascade_cleaned": counters.cascade_cleaned,
    })
}
