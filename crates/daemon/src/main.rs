// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `nncd`: the long-running network-orchestration control-plane
//! process. Loads config, acquires the daemon lock, recovers from any
//! prior crash, reconciles routing state, then runs the Update
//! Scheduler, Chain Kill-Switch, and Chain Latency Measurer until a
//! shutdown signal arrives.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use nnc_daemon::{startup, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let _log_guard = init_logging(&config);
    tracing::info!(base_dir = %config.base_dir.display(), "starting nncd");

    let result = startup(config).await?;
    let daemon = Arc::new(result.daemon);
    let rollback_sweeper = result.rollback_sweeper;

    daemon.recover_and_reconcile().await;

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let daemon_clone = daemon.clone();
    let run_task = tokio::spawn(async move { daemon_clone.run(run_cancel).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    cancel.cancel();
    let _ = run_task.await;
    rollback_sweeper.stop().await;

    tracing::info!("nncd shut down");
    Ok(())
}

/// Logs to stdout and, best-effort, to a non-rolling file under the
/// state directory — the returned guard must stay alive for the
/// process lifetime or the file writer's background thread stops
/// flushing.
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_name = config.log_path.file_name().unwrap_or_default();
    let dir = config.log_path.parent().unwrap_or(&config.state_dir);
    match std::fs::create_dir_all(dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter()).with_writer(non_blocking).init();
            Some(guard)
        }
        Err(error) => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();
            tracing::warn!(%error, dir = %dir.display(), "could not create log directory, logging to stdout only");
            None
        }
    }
}
