// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Subcommand;
use nnc_core::{Clock, InstanceId};
use nnc_daemon::Daemon;
use nnc_engine::AssignDeviceRoutingInput;

#[derive(Subcommand)]
pub enum RoutingCommand {
    /// Assign single-hop device->service routing (§4.3).
    Assign {
        device_id: String,
        mac: String,
        routing_mark: String,
        instance_id: String,
    },
    /// Remove a device's routing assignment (idempotent — §4.3).
    Remove {
        device_id: String,
    },
    /// Reconcile PBR state against observed router state (§4.3).
    Reconcile,
    /// Undo the most recent assign/remove for a device, within the
    /// 5-minute manual-undo window (§3, L3).
    Undo {
        device_id: String,
    },
}

pub async fn run(daemon: &Daemon, cmd: RoutingCommand) -> anyhow::Result<()> {
    match cmd {
        RoutingCommand::Assign { device_id, mac, routing_mark, instance_id } => {
            let input = AssignDeviceRoutingInput { device_id: device_id.clone(), mac, routing_mark, instance_id: InstanceId::from_string(instance_id) };
            let outcome = daemon.pbr.assign_device_routing(input).await?;
            println!(
                "assigned routing for device {device_id}{}",
                if outcome.conflict_resolved { " (replaced a conflicting prior assignment)" } else { "" }
            );
        }
        RoutingCommand::Remove { device_id } => {
            daemon.pbr.remove_device_routing(&device_id).await?;
            println!("removed routing for device {device_id}");
        }
        RoutingCommand::Reconcile => {
            let counters = daemon.pbr.reconcile_on_startup().await;
            let json = serde_json::json!({
                "missing_rules": counters.missing_rules,
                "orphaned_rules": counters.orphaned_rules,
                "deleted_vif_cascade": counters.deleted_vif_cascade,
                "recreated": counters.recreated,
                "removed": counters.removed,
                "errors": counters.errors,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        RoutingCommand::Undo { device_id } => {
            daemon.pbr.undo_last_change(&device_id, nnc_core::SystemClock.now_ms()).await?;
            println!("undid the last routing change for device {device_id}");
        }
    }
    Ok(())
}
