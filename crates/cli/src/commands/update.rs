// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Subcommand;
use nnc_adapters::UpdateCheckService;
use nnc_core::{FeatureId, InstanceId};
use nnc_daemon::Daemon;
use tokio_util::sync::CancellationToken;

#[derive(Subcommand)]
pub enum UpdateCommand {
    /// Check whether a newer version is available for one instance (§4.2).
    Check {
        feature_id: String,
        current_version: String,
    },
    /// Apply an update to one instance (§4.1's six phases).
    Apply {
        instance_id: String,
        feature_id: String,
        current_version: String,
        target_version: String,
        download_url: String,
        checksum_url: String,
    },
    /// Show journal history for one instance, oldest first.
    History {
        instance_id: String,
    },
}

pub async fn run(daemon: &Daemon, cmd: UpdateCommand) -> anyhow::Result<()> {
    match cmd {
        UpdateCommand::Check { feature_id, current_version } => {
            let update_service = nnc_adapters::HttpUpdateCheckService::new(daemon.config.control_api_base_url.clone());
            match update_service.check_for_update(&feature_id, &current_version).await? {
                None => println!("no update available for {feature_id} {current_version}"),
                Some(available) if available.is_draft_or_prerelease => {
                    println!("update {} available but is a draft/prerelease — not offered", available.version);
                }
                Some(available) => {
                    let severity = nnc_core::severity::classify(&current_version, &available.version, &available.release_notes);
                    println!(
                        "{} -> {} [{severity}]{}",
                        current_version,
                        available.version,
                        if severity.auto_applies() { " (auto-applies)" } else { "" }
                    );
                }
            }
        }
        UpdateCommand::Apply { instance_id, feature_id, current_version, target_version, download_url, checksum_url } => {
            let instance_id = InstanceId::from_string(instance_id);
            let feature_id = FeatureId::from_string(&feature_id);
            let cancel = CancellationToken::new();
            daemon
                .engine
                .apply_update(instance_id, feature_id, feature_id.as_str(), &current_version, &target_version, &download_url, &checksum_url, &cancel)
                .await?;
            println!("applied {target_version} to instance {instance_id}");
        }
        UpdateCommand::History { instance_id } => {
            let instance_id = InstanceId::from_string(instance_id);
            let history = daemon.engine.update_history(&instance_id);
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
    }
    Ok(())
}
