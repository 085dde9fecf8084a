// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rollback Store sweeper (§5): a background task that periodically
//! drops expired manual-undo snapshots. Stoppable exactly once via a
//! `tokio::sync::Notify`, the same signal shape the daemon's listener
//! uses to tell an accept loop to stop.

use nnc_core::Clock;
use nnc_storage::RollbackStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Handle to a running sweeper task. Dropping it without calling
/// [`stop`](Self::stop) leaves the task running — `stop` is the only
/// way to join it.
pub struct RollbackSweeperHandle {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl RollbackSweeperHandle {
    /// Signals the sweeper to stop and waits for its current tick (if
    /// any) to finish. Safe to call only once — calling it again just
    /// re-notifies an already-exited task.
    pub async fn stop(self) {
        self.stop.notify_one();
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "rollback sweeper task panicked");
        }
    }
}

/// Spawns a task that calls [`RollbackStore::sweep_expired`] every
/// `interval`, until [`RollbackSweeperHandle::stop`] is called.
pub fn spawn_rollback_sweeper<C>(store: Arc<RollbackStore>, clock: C, interval: Duration) -> RollbackSweeperHandle
where
    C: Clock,
{
    let stop = Arc::new(Notify::new());
    let stop_signal = stop.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it.
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.sweep_expired(clock.now_ms()) {
                        Ok(expired) if !expired.is_empty() => {
                            tracing::info!(count = expired.len(), "swept expired rollback snapshots");
                        }
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "rollback sweep failed"),
                    }
                }
                _ = stop_signal.notified() => break,
            }
        }
    });
    RollbackSweeperHandle { stop, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnc_core::FakeClock;
    use tempfile::tempdir;

    #[tokio::test]
    async fn stop_joins_the_task_without_hanging() {
        let dir = tempdir().unwrap();
        let store = Arc::new(RollbackStore::open(dir.path().join("rollback.json")).unwrap());
        let handle = spawn_rollback_sweeper(store, FakeClock::new(), Duration::from_millis(10));
        handle.stop().await;
    }
}
