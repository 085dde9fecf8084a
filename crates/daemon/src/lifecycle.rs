// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: lock acquisition, crash recovery, startup
//! reconciliation, and the long-running control-plane loops. Mirrors
//! the shape of a typical daemon startup sequence — acquire the lock
//! first to avoid races, then load durable state, then reconcile
//! against observed reality before serving anything.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use parking_lot::Mutex as SyncMutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use nnc_adapters::{
    HttpDownloadVerifier, HttpInstanceDirectory, HttpLifecycle, HttpMeteredNetwork, HttpRouterPort,
    HttpUpdateCheckService, HttpVifDirectory, MigratorRegistry,
};
use nnc_core::SystemClock;
use nnc_engine::{
    spawn_rollback_sweeper, ChainKillSwitch, ChainRouter, EventBus, LatencyMeasurer, PbrEngine, RollbackSweeperHandle,
    Scheduler, SchedulerConfig, UpdateEngine,
};
use nnc_storage::{RollbackStore, RoutingStateStore, UpdateJournal};

use crate::config::Config;
use crate::instance_list::HttpInstanceList;

pub type Engine = UpdateEngine<HttpLifecycle, HttpLifecycle, HttpLifecycle, HttpDownloadVerifier, SystemClock>;
pub type DaemonScheduler =
    Scheduler<HttpLifecycle, HttpLifecycle, HttpLifecycle, HttpDownloadVerifier, SystemClock, HttpUpdateCheckService, HttpMeteredNetwork, HttpInstanceList>;
pub type Pbr = PbrEngine<HttpRouterPort, HttpInstanceDirectory>;
pub type Chain = ChainRouter<HttpRouterPort, HttpVifDirectory>;
pub type KillSwitch = ChainKillSwitch<HttpRouterPort, HttpVifDirectory, SystemClock>;
pub type Latency = LatencyMeasurer<HttpVifDirectory>;

/// How often the Rollback Store sweeper (§3/§5) checks for expired
/// manual-undo snapshots — frequent enough that an expired 5-minute
/// window is cleaned up promptly without being a busy loop.
const ROLLBACK_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),
    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal error: {0}")]
    Journal(#[from] nnc_storage::JournalError),
    #[error("routing state error: {0}")]
    RoutingState(#[from] nnc_storage::RoutingStateError),
    #[error("rollback store error: {0}")]
    Rollback(#[from] nnc_storage::RollbackStoreError),
}

/// A running daemon: every long-lived component plus the lock file,
/// held for as long as the process runs (released on drop).
pub struct Daemon {
    pub config: Config,
    lock_file: std::fs::File,
    pub engine: Arc<Engine>,
    pub scheduler: Arc<DaemonScheduler>,
    pub pbr: Arc<Pbr>,
    pub chain: Arc<Chain>,
    pub killswitch: Arc<KillSwitch>,
    pub latency: Arc<Latency>,
    pub bus: EventBus,
}

pub struct StartupResult {
    pub daemon: Daemon,
    /// Keeps the Rollback Store sweeper alive; call `.stop().await` on
    /// shutdown before the process exits.
    pub rollback_sweeper: RollbackSweeperHandle,
}

/// Acquires the lock, opens durable state, and wires every engine
/// component against the configured adapters. Does not yet recover
/// from a crash or reconcile — call [`Daemon::run`] for that.
pub async fn startup(config: Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.base_dir)?;

    // Acquire the lock before touching any other file — avoids a race
    // with a second daemon process starting concurrently.
    let lock_file = OpenOptions::new().write(true).create(true).truncate(false).open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let bus = EventBus::new();
    let clock = SystemClock;

    let journal = Arc::new(SyncMutex::new(UpdateJournal::open(&config.journal_path, 0)?));
    let routing_state = Arc::new(SyncMutex::new(RoutingStateStore::open(&config.routing_state_path)?));
    let migrators = Arc::new(MigratorRegistry::new());
    let rollback = Arc::new(RollbackStore::open(&config.rollback_path)?);
    let rollback_sweeper = spawn_rollback_sweeper(rollback.clone(), clock, ROLLBACK_SWEEP_INTERVAL);

    let lifecycle = HttpLifecycle::new(config.control_api_base_url.clone());
    let downloader = HttpDownloadVerifier::new();
    let engine = Arc::new(UpdateEngine::new(
        config.base_dir.clone(),
        journal,
        HttpLifecycle::new(config.control_api_base_url.clone()),
        HttpLifecycle::new(config.control_api_base_url.clone()),
        lifecycle,
        downloader,
        migrators,
        bus.clone(),
        clock,
    ));

    let scheduler_config = SchedulerConfig { check_interval: config.check_interval, quiet_hours: config.quiet_hours };
    let scheduler = Arc::new(Scheduler::new(
        scheduler_config,
        engine.clone(),
        HttpUpdateCheckService::new(config.control_api_base_url.clone()),
        HttpMeteredNetwork::new(config.control_api_base_url.clone()),
        HttpInstanceList::new(config.control_api_base_url.clone()),
        bus.clone(),
        clock,
    ));

    let router = HttpRouterPort::new(config.router.base_url.clone(), config.router.username.clone(), config.router.password.clone());
    let pbr = Arc::new(PbrEngine::new(
        HttpRouterPort::new(config.router.base_url.clone(), config.router.username.clone(), config.router.password.clone()),
        routing_state.clone(),
        HttpInstanceDirectory::new(config.control_api_base_url.clone()),
        bus.clone(),
        rollback.clone(),
    ));
    let chain = Arc::new(ChainRouter::new(
        HttpRouterPort::new(config.router.base_url.clone(), config.router.username.clone(), config.router.password.clone()),
        HttpVifDirectory::new(config.control_api_base_url.clone()),
        routing_state.clone(),
        bus.clone(),
        rollback.clone(),
    ));
    let killswitch = Arc::new(ChainKillSwitch::new(
        router,
        HttpVifDirectory::new(config.control_api_base_url.clone()),
        routing_state.clone(),
        bus.clone(),
        clock,
    ));
    let latency = Arc::new(LatencyMeasurer::new(HttpVifDirectory::new(config.control_api_base_url.clone()), routing_state, bus.clone()));

    Ok(StartupResult {
        daemon: Daemon { config, lock_file, engine, scheduler, pbr, chain, killswitch, latency, bus },
        rollback_sweeper,
    })
}

impl Daemon {
    /// Crash recovery (§4.1 `RecoverFromCrash`) followed by routing
    /// reconciliation (§4.3/§4.5) — run once, before serving anything,
    /// so a restart after a crash never leaves a half-applied update or
    /// a stale routing rule behind.
    pub async fn recover_and_reconcile(&self) {
        tracing::info!("recovering incomplete updates from a prior crash");
        self.engine.recover_from_crash().await;

        let pbr_counters = self.pbr.reconcile_on_startup().await;
        tracing::info!(?pbr_counters, "pbr reconciliation complete");

        let chain_counters = self.chain.reconcile().await;
        tracing::info!(?chain_counters, "chain reconciliation complete");
    }

    /// Runs the Update Scheduler, Chain Kill-Switch listener, and a
    /// periodic latency sweep until `cancel` fires. Each loop is
    /// independent — one panicking task (there shouldn't be any; every
    /// loop only logs and continues) never takes the others down since
    /// they're separate `tokio::spawn`s.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let scheduler = self.scheduler.clone();
        let scheduler_cancel = cancel.clone();
        let scheduler_task = tokio::spawn(async move { scheduler.run(&scheduler_cancel).await });

        // ChainKillSwitch::run() only returns once the event bus closes
        // (§4.6 — it serializes handlers per subscription, with no
        // cancellation token of its own), so on shutdown we abort it
        // rather than join it.
        let killswitch = self.killswitch.clone();
        let killswitch_task = tokio::spawn(async move { killswitch.run().await });

        let latency = self.latency.clone();
        let latency_cancel = cancel.clone();
        let latency_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(300)) => {}
                    _ = latency_cancel.cancelled() => return,
                }
                latency.measure_all(&latency_cancel).await;
            }
        });

        cancel.cancelled().await;
        killswitch_task.abort();
        let _ = tokio::join!(scheduler_task, latency_task);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
