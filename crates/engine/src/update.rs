// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Update Engine (C3, §4.1): the six-phase atomic update with automatic
//! rollback and crash recovery. Every phase begins with a `Pending`
//! journal entry (intent) before any side effect runs, and ends with
//! `Success`/`Failed` (outcome) — that pairing is what lets
//! [`UpdateEngine::recover_from_crash`] find work a prior process died
//! in the middle of.

use crate::error::UpdateError;
use crate::paths;
use crate::bus::EventBus;
use nnc_adapters::{DownloadVerifier, HealthChecker, HealthState, MigratorRegistry, Starter, Stopper};
use nnc_core::{Clock, Event, FeatureId, InstanceId, JournalEntry, JournalEntryId, JournalPhase};
use nnc_storage::UpdateJournal;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Settle window VALIDATION waits after `Starter::start` before polling
/// health (§4.1 step 5).
const SETTLE_WINDOW: Duration = Duration::from_secs(3);

pub struct UpdateEngine<S, T, H, D, C: Clock> {
    base_dir: PathBuf,
    journal: Arc<Mutex<UpdateJournal>>,
    stopper: S,
    starter: T,
    health: H,
    downloader: D,
    migrators: Arc<MigratorRegistry>,
    bus: EventBus,
    clock: C,
    settle_window: Duration,
}

impl<S, T, H, D, C> UpdateEngine<S, T, H, D, C>
where
    S: Stopper,
    T: Starter,
    H: HealthChecker,
    D: DownloadVerifier,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_dir: PathBuf,
        journal: Arc<Mutex<UpdateJournal>>,
        stopper: S,
        starter: T,
        health: H,
        downloader: D,
        migrators: Arc<MigratorRegistry>,
        bus: EventBus,
        clock: C,
    ) -> Self {
        Self { base_dir, journal, stopper, starter, health, downloader, migrators, bus, clock, settle_window: SETTLE_WINDOW }
    }

    /// Overrides the VALIDATION settle window — tests don't want to
    /// actually sleep 3 seconds.
    pub fn with_settle_window(mut self, window: Duration) -> Self {
        self.settle_window = window;
        self
    }

    fn begin_phase(
        &self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        from_version: &str,
        to_version: &str,
        phase: JournalPhase,
    ) -> Result<JournalEntry, UpdateError> {
        let now = self.clock.now_ms();
        let mut journal = self.journal.lock();
        let entry = journal.begin(
            instance_id,
            feature_id,
            from_version.to_string(),
            to_version.to_string(),
            phase,
            now,
        )?;
        journal.flush()?;
        drop(journal);
        self.bus.publish(Event::ServiceUpdatePhase { instance_id, phase, status: "pending".to_string() });
        Ok(entry)
    }

    fn succeed_phase(&self, id: &JournalEntryId, phase: JournalPhase, instance_id: InstanceId) -> Result<(), UpdateError> {
        let now = self.clock.now_ms();
        let mut journal = self.journal.lock();
        journal.succeed(id, now)?;
        journal.flush()?;
        drop(journal);
        self.bus.publish(Event::ServiceUpdatePhase { instance_id, phase, status: "success".to_string() });
        Ok(())
    }

    fn fail_phase(&self, id: &JournalEntryId, phase: JournalPhase, instance_id: InstanceId, error: &str) -> Result<(), UpdateError> {
        let now = self.clock.now_ms();
        let mut journal = self.journal.lock();
        journal.fail(id, now, error.to_string())?;
        journal.flush()?;
        drop(journal);
        self.bus.publish(Event::ServiceUpdatePhase { instance_id, phase, status: "failed".to_string() });
        Ok(())
    }

    fn check_cancelled(cancel: &CancellationToken) -> Result<(), UpdateError> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }
        Ok(())
    }

    /// `ApplyUpdate` (§4.1). `feature_name` is the filesystem/checksum
    /// directory name (e.g. `"vpn-gateway"`); `feature_id` is the typed
    /// id the journal keys on — they're kept distinct because a
    /// `FeatureId`'s opaque nanoid can't double as a path component.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_update(
        &self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        feature_name: &str,
        current_version: &str,
        target_version: &str,
        download_url: &str,
        checksum_url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), UpdateError> {
        tracing::info!(%instance_id, feature_name, current_version, target_version, "applying update");
        self.bus.publish(Event::UpdateStarted { instance_id, feature_id, target_version: target_version.to_string() });

        let result = self
            .apply_update_inner(instance_id, feature_id, feature_name, current_version, target_version, download_url, checksum_url, cancel)
            .await;

        match &result {
            Ok(()) => {
                self.bus.publish(Event::UpdateCompleted { instance_id, feature_id, target_version: target_version.to_string() });
            }
            Err(err) => {
                self.bus.publish(Event::UpdateFailed {
                    instance_id,
                    feature_id,
                    target_version: target_version.to_string(),
                    error: err.to_string(),
                });
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_update_inner(
        &self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        feature_name: &str,
        current_version: &str,
        target_version: &str,
        download_url: &str,
        checksum_url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), UpdateError> {
        self.staging(instance_id, feature_id, feature_name, current_version, target_version, download_url, checksum_url).await?;
        Self::check_cancelled(cancel)?;

        self.backup(instance_id, feature_id, feature_name, current_version, target_version).await?;
        Self::check_cancelled(cancel)?;

        if let Err(err) = self.swap(instance_id, feature_id, feature_name, current_version, target_version).await {
            return Err(self.rollback_after_failure(instance_id, feature_id, feature_name, current_version, target_version, err).await);
        }
        Self::check_cancelled(cancel)?;

        if let Err(err) = self.migration(instance_id, feature_id, feature_name, current_version, target_version).await {
            return Err(self.rollback_after_failure(instance_id, feature_id, feature_name, current_version, target_version, err).await);
        }
        Self::check_cancelled(cancel)?;

        if let Err(err) = self.validation(instance_id, feature_id, feature_name, current_version, target_version).await {
            return Err(self.rollback_after_failure(instance_id, feature_id, feature_name, current_version, target_version, err).await);
        }

        self.commit(instance_id, feature_id, feature_name, current_version, target_version).await?;
        Ok(())
    }

    async fn staging(
        &self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        feature_name: &str,
        current_version: &str,
        target_version: &str,
        download_url: &str,
        checksum_url: &str,
    ) -> Result<(), UpdateError> {
        let entry = self.begin_phase(instance_id, feature_id, current_version, target_version, JournalPhase::Staging)?;
        self.bus.publish(Event::ServiceInstallProgress {
            instance_id,
            phase: JournalPhase::Staging,
            message: format!("downloading {feature_name} {target_version}"),
        });

        let result = self.staging_inner(feature_name, target_version, download_url, checksum_url).await;
        match result {
            Ok(()) => {
                self.succeed_phase(&entry.id, JournalPhase::Staging, instance_id)?;
                Ok(())
            }
            Err(msg) => {
                self.fail_phase(&entry.id, JournalPhase::Staging, instance_id, &msg)?;
                Err(UpdateError::Staging(msg))
            }
        }
    }

    async fn staging_inner(
        &self,
        feature_name: &str,
        target_version: &str,
        download_url: &str,
        checksum_url: &str,
    ) -> Result<(), String> {
        let dir = paths::staging_dir(&self.base_dir, feature_name, target_version);
        std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;

        let bytes = self
            .downloader
            .fetch_verified(download_url, checksum_url, feature_name)
            .await
            .map_err(|e| e.to_string())?;

        let staged = paths::staging_binary(&self.base_dir, feature_name, target_version);
        std::fs::write(&staged, &bytes).map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn backup(
        &self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        feature_name: &str,
        current_version: &str,
        target_version: &str,
    ) -> Result<(), UpdateError> {
        let entry = self.begin_phase(instance_id, feature_id, current_version, target_version, JournalPhase::Backup)?;
        let result = self.backup_inner(instance_id, feature_name, current_version);
        match result {
            Ok(()) => {
                self.succeed_phase(&entry.id, JournalPhase::Backup, instance_id)?;
                Ok(())
            }
            Err(msg) => {
                self.fail_phase(&entry.id, JournalPhase::Backup, instance_id, &msg)?;
                Err(UpdateError::Backup(msg))
            }
        }
    }

    fn backup_inner(&self, instance_id: InstanceId, feature_name: &str, current_version: &str) -> Result<(), String> {
        let backup_dir = paths::backup_dir(&self.base_dir, feature_name, instance_id, current_version);
        std::fs::create_dir_all(&backup_dir).map_err(|e| e.to_string())?;

        let live_bin = paths::live_binary(&self.base_dir, feature_name);
        let backup_bin = paths::backup_binary(&self.base_dir, feature_name, instance_id, current_version);
        std::fs::copy(&live_bin, &backup_bin).map_err(|e| e.to_string())?;

        // Missing config directory is non-fatal — not every feature has one.
        let live_config_dir = self.base_dir.join("features").join(feature_name).join("config");
        if live_config_dir.exists() {
            let backup_config_dir = paths::backup_config_dir(&self.base_dir, feature_name, instance_id, current_version);
            std::fs::create_dir_all(&backup_config_dir).map_err(|e| e.to_string())?;
            copy_dir_contents(&live_config_dir, &backup_config_dir).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    async fn swap(
        &self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        feature_name: &str,
        current_version: &str,
        target_version: &str,
    ) -> Result<(), UpdateError> {
        let entry = self.begin_phase(instance_id, feature_id, current_version, target_version, JournalPhase::Swap)?;
        let result = self.swap_inner(instance_id, feature_name, target_version).await;
        match result {
            Ok(()) => {
                self.succeed_phase(&entry.id, JournalPhase::Swap, instance_id)?;
                Ok(())
            }
            Err(msg) => {
                self.fail_phase(&entry.id, JournalPhase::Swap, instance_id, &msg)?;
                Err(UpdateError::Swap(msg))
            }
        }
    }

    async fn swap_inner(&self, instance_id: InstanceId, feature_name: &str, target_version: &str) -> Result<(), String> {
        self.stopper.stop(instance_id).await.map_err(|e| e.to_string())?;

        let live_bin = paths::live_binary(&self.base_dir, feature_name);
        let old_bin = live_bin.with_extension("old");
        std::fs::rename(&live_bin, &old_bin).map_err(|e| e.to_string())?;

        let staged = paths::staging_binary(&self.base_dir, feature_name, target_version);
        let swap_result = std::fs::copy(&staged, &live_bin)
            .and_then(|_| set_executable(&live_bin))
            .map_err(|e| e.to_string());

        if let Err(copy_err) = swap_result {
            // Best-effort: put the old binary back before surfacing the failure.
            if let Err(rename_err) = std::fs::rename(&old_bin, &live_bin) {
                tracing::warn!(error = %rename_err, "failed to rename .old binary back after failed swap");
            }
            return Err(copy_err);
        }

        if let Err(err) = std::fs::remove_file(&old_bin) {
            tracing::warn!(error = %err, "failed to delete .old binary after successful swap");
        }
        Ok(())
    }

    async fn migration(
        &self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        feature_name: &str,
        current_version: &str,
        target_version: &str,
    ) -> Result<(), UpdateError> {
        let entry = self.begin_phase(instance_id, feature_id, current_version, target_version, JournalPhase::Migration)?;
        let result = self.migration_inner(feature_id, feature_name, current_version, target_version);
        match result {
            Ok(()) => {
                self.succeed_phase(&entry.id, JournalPhase::Migration, instance_id)?;
                Ok(())
            }
            Err(msg) => {
                self.fail_phase(&entry.id, JournalPhase::Migration, instance_id, &msg)?;
                Err(UpdateError::Migration(msg))
            }
        }
    }

    fn migration_inner(&self, feature_id: FeatureId, feature_name: &str, current_version: &str, target_version: &str) -> Result<(), String> {
        let config_path = paths::live_config(&self.base_dir, feature_name);
        if !config_path.exists() {
            return Ok(());
        }

        let raw = std::fs::read_to_string(&config_path).map_err(|e| e.to_string())?;
        let mut config: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&raw).map_err(|e| e.to_string())?;

        let migrator = self.migrators.for_feature(&feature_id);
        if !migrator.can_migrate(current_version, target_version) {
            return Err(format!("no migration path from {current_version} to {target_version}"));
        }
        migrator.migrate(&mut config, current_version, target_version).map_err(|e| e.to_string())?;

        let pretty = serde_json::to_string_pretty(&config).map_err(|e| e.to_string())?;
        std::fs::write(&config_path, pretty).map_err(|e| e.to_string())?;
        set_permissions(&config_path, 0o644).map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn validation(
        &self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        feature_name: &str,
        current_version: &str,
        target_version: &str,
    ) -> Result<(), UpdateError> {
        let entry = self.begin_phase(instance_id, feature_id, current_version, target_version, JournalPhase::Validation)?;
        let result = self.validation_inner(instance_id).await;
        let _ = feature_name;
        match result {
            Ok(()) => {
                self.succeed_phase(&entry.id, JournalPhase::Validation, instance_id)?;
                Ok(())
            }
            Err(msg) => {
                self.fail_phase(&entry.id, JournalPhase::Validation, instance_id, &msg)?;
                Err(UpdateError::Validation(msg))
            }
        }
    }

    async fn validation_inner(&self, instance_id: InstanceId) -> Result<(), String> {
        self.starter.start(instance_id).await.map_err(|e| e.to_string())?;
        tokio::time::sleep(self.settle_window).await;
        match self.health.status(instance_id).await {
            Ok(HealthState::Healthy) => Ok(()),
            Ok(HealthState::Unhealthy) => Err("instance reported unhealthy after settle window".to_string()),
            Err(err) => Err(err.to_string()),
        }
    }

    async fn commit(
        &self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        feature_name: &str,
        current_version: &str,
        target_version: &str,
    ) -> Result<(), UpdateError> {
        let entry = self.begin_phase(instance_id, feature_id, current_version, target_version, JournalPhase::Commit)?;
        let staging_dir = paths::staging_dir(&self.base_dir, feature_name, target_version);
        let result = std::fs::remove_dir_all(&staging_dir).or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(e.to_string())
            }
        });
        match result {
            Ok(()) => self.succeed_phase(&entry.id, JournalPhase::Commit, instance_id),
            Err(msg) => {
                self.fail_phase(&entry.id, JournalPhase::Commit, instance_id, &msg)?;
                Err(UpdateError::Commit(msg))
            }
        }
    }

    /// Rollback policy (§4.1): restore the backup binary/config,
    /// best-effort stop/restart, and join the rollback error with the
    /// original phase failure if rollback itself fails.
    async fn rollback_after_failure(
        &self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        feature_name: &str,
        current_version: &str,
        target_version: &str,
        original: UpdateError,
    ) -> UpdateError {
        match self.rollback(instance_id, feature_id, feature_name, current_version, target_version).await {
            Ok(()) => original,
            Err(rollback_err) => UpdateError::RollbackFailure {
                rollback: Box::new(rollback_err),
                original: Box::new(original),
            },
        }
    }

    async fn rollback(
        &self,
        instance_id: InstanceId,
        feature_id: FeatureId,
        feature_name: &str,
        current_version: &str,
        target_version: &str,
    ) -> Result<(), UpdateError> {
        let entry = self.begin_phase(instance_id, feature_id, current_version, target_version, JournalPhase::Rollback)?;
        tracing::info!(%instance_id, feature_name, current_version, target_version, "rolling back");

        if let Err(err) = self.stopper.stop(instance_id).await {
            tracing::warn!(error = %err, "rollback: best-effort stop failed");
        }

        let backup_bin = paths::backup_binary(&self.base_dir, feature_name, instance_id, current_version);
        let live_bin = paths::live_binary(&self.base_dir, feature_name);
        let restore_result = std::fs::copy(&backup_bin, &live_bin).map_err(|e| e.to_string());

        let backup_config_dir = paths::backup_config_dir(&self.base_dir, feature_name, instance_id, current_version);
        if backup_config_dir.exists() {
            let live_config_dir = self.base_dir.join("features").join(feature_name).join("config");
            if let Err(err) = std::fs::create_dir_all(&live_config_dir).and_then(|_| copy_dir_contents(&backup_config_dir, &live_config_dir)) {
                tracing::warn!(error = %err, "rollback: best-effort config restore failed");
            }
        }

        if let Err(err) = self.starter.start(instance_id).await {
            tracing::warn!(error = %err, "rollback: best-effort restart failed");
        }

        match restore_result {
            Ok(_) => {
                self.succeed_phase(&entry.id, JournalPhase::Rollback, instance_id)?;
                self.bus.publish(Event::ServiceUpdateRolledBack {
                    instance_id,
                    from_version: target_version.to_string(),
                    to_version: current_version.to_string(),
                });
                Ok(())
            }
            Err(msg) => {
                self.fail_phase(&entry.id, JournalPhase::Rollback, instance_id, &msg)?;
                Err(UpdateError::Backup(msg))
            }
        }
    }

    /// `RecoverFromCrash` (§4.1): every journal entry left `Pending` by a
    /// process that died mid-phase. Phases that trigger rollback get a
    /// rollback attempt; others are simply marked failed since no
    /// in-process caller is left to observe the original failure.
    /// Errors are logged per-entry and never abort the sweep.
    pub async fn recover_from_crash(&self) {
        let pending: Vec<JournalEntry> = self.journal.lock().incomplete().into_iter().cloned().collect();
        for entry in pending {
            tracing::warn!(
                instance_id = %entry.instance_id,
                phase = %entry.phase,
                to_version = %entry.to_version,
                "recovering incomplete update entry"
            );
            if entry.phase.triggers_rollback() {
                if let Err(err) = self
                    .rollback(entry.instance_id, entry.feature_id, entry.feature_id.as_str(), &entry.from_version, &entry.to_version)
                    .await
                {
                    tracing::error!(error = %err, instance_id = %entry.instance_id, "crash recovery rollback failed");
                }
            } else if let Err(err) = self.fail_phase(&entry.id, entry.phase, entry.instance_id, "process crashed mid-phase") {
                tracing::error!(error = %err, instance_id = %entry.instance_id, "failed to mark crashed entry as failed");
            }
        }
    }

    /// `GetIncompleteUpdates` — exposed as a read operation for operator
    /// tooling and crash-recovery tests (§8 scenario 3).
    pub fn incomplete_updates(&self) -> Vec<JournalEntry> {
        self.journal.lock().incomplete().into_iter().cloned().collect()
    }

    /// `GetUpdateHistory(instance_id)` — journal entries for one
    /// instance, oldest first.
    pub fn update_history(&self, instance_id: &InstanceId) -> Vec<JournalEntry> {
        self.journal.lock().history(instance_id).into_iter().cloned().collect()
    }
}

fn copy_dir_contents(from: &std::path::Path, to: &std::path::Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&dest)?;
            copy_dir_contents(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_permissions(path: &std::path::Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_permissions(_path: &std::path::Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod tests;
