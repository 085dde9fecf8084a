// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Update Scheduler (C4, §4.2): a periodic check loop with quiet-hours and
//! metered-network gating that auto-applies CRITICAL updates through the
//! Update Engine. The loop itself never fails — a single instance's check
//! or apply failing is logged and the sweep continues to the next one.

use crate::bus::EventBus;
use crate::update::UpdateEngine;
use chrono::Timelike;
use nnc_adapters::{DownloadVerifier, HealthChecker, MeteredNetwork, Starter, Stopper, UpdateCheckService};
use nnc_core::{severity, Clock, Event, InstanceRef};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(6 * 3600);
const INITIAL_DELAY: Duration = Duration::from_secs(30);

/// A same-day or midnight-wrapping daily window, compared on
/// `hour*60+minute` in `timezone` (§9 Quiet-hours semantics).
#[derive(Debug, Clone, Copy)]
pub struct QuietHours {
    pub start_minute_of_day: u16,
    pub end_minute_of_day: u16,
    pub timezone: chrono_tz::Tz,
}

impl QuietHours {
    /// `start <= end` is a same-day window; `start > end` wraps past
    /// midnight, e.g. 22:00-06:00.
    pub fn contains(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        let minute_of_day = local.time().hour() as u16 * 60 + local.time().minute() as u16;
        if self.start_minute_of_day <= self.end_minute_of_day {
            (self.start_minute_of_day..self.end_minute_of_day).contains(&minute_of_day)
        } else {
            minute_of_day >= self.start_minute_of_day || minute_of_day < self.end_minute_of_day
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub check_interval: Duration,
    pub quiet_hours: Option<QuietHours>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { check_interval: DEFAULT_CHECK_INTERVAL, quiet_hours: None }
    }
}

pub struct Scheduler<S, T, H, D, C: Clock, U, N, I> {
    config: SchedulerConfig,
    engine: Arc<UpdateEngine<S, T, H, D, C>>,
    update_service: U,
    metered: N,
    instances: I,
    bus: EventBus,
    clock: C,
    initial_delay: Duration,
}

impl<S, T, H, D, C, U, N, I> Scheduler<S, T, H, D, C, U, N, I>
where
    S: Stopper,
    T: Starter,
    H: HealthChecker,
    D: DownloadVerifier,
    C: Clock,
    U: UpdateCheckService,
    N: MeteredNetwork,
    I: InstanceDirectoryList,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        engine: Arc<UpdateEngine<S, T, H, D, C>>,
        update_service: U,
        metered: N,
        instances: I,
        bus: EventBus,
        clock: C,
    ) -> Self {
        Self { config, engine, update_service, metered, instances, bus, clock, initial_delay: INITIAL_DELAY }
    }

    /// Overrides the delay before the first tick — tests don't want to
    /// actually wait 30 seconds.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Runs the periodic loop until `cancel` fires. The first tick runs
    /// after `initial_delay`; every tick after that is spaced
    /// `config.check_interval` apart.
    pub async fn run(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(self.initial_delay) => {}
            _ = cancel.cancelled() => return,
        }
        loop {
            if cancel.is_cancelled() {
                return;
            }
            self.tick().await;
            tokio::select! {
                _ = tokio::time::sleep(self.config.check_interval) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// One check sweep (§4.2): gated by quiet hours and metered-network
    /// status, then one `CheckForUpdate` per instance. Never returns an
    /// error — per-instance failures are logged and skipped.
    pub async fn tick(&self) {
        if let Some(quiet_hours) = &self.config.quiet_hours {
            if quiet_hours.contains(self.clock.now()) {
                tracing::debug!("scheduler: inside quiet hours, skipping tick");
                return;
            }
        }
        match self.metered.is_metered().await {
            Ok(true) => {
                tracing::debug!("scheduler: network flagged metered, skipping tick");
                return;
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(error = %err, "scheduler: metered-network check failed, proceeding anyway");
            }
        }

        let instances = match self.instances.list().await {
            Ok(instances) => instances,
            Err(err) => {
                tracing::warn!(error = %err, "scheduler: failed to enumerate instances");
                return;
            }
        };

        for instance in instances {
            if let Err(err) = self.check_instance(&instance).await {
                tracing::warn!(error = %err, instance_id = %instance.instance_id, "scheduler: update check failed for this instance");
            }
        }
    }

    async fn check_instance(&self, instance: &InstanceRef) -> Result<(), nnc_adapters::UpdateCheckError> {
        let feature = instance.feature_id.as_str();
        let available = self.update_service.check_for_update(feature, &instance.current_version).await?;
        let Some(available) = available else { return Ok(()) };
        if available.is_draft_or_prerelease {
            return Ok(());
        }

        let sev = severity::classify(&instance.current_version, &available.version, &available.release_notes);
        tracing::info!(
            instance_id = %instance.instance_id,
            feature,
            current_version = %instance.current_version,
            new_version = %available.version,
            severity = %sev,
            "update available"
        );
        self.bus.publish(Event::UpdateAvailable {
            instance_id: instance.instance_id,
            feature_id: instance.feature_id,
            current_version: instance.current_version.clone(),
            available_version: available.version.clone(),
            severity: sev,
        });

        if sev.auto_applies() {
            let engine = self.engine.clone();
            let instance_id = instance.instance_id;
            let feature_id = instance.feature_id;
            let feature_name = feature.to_string();
            let current_version = instance.current_version.clone();
            let target_version = available.version.clone();
            let download_url = available.download_url.clone();
            let checksum_url = available.checksum_url.clone();
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                if let Err(err) = engine
                    .apply_update(
                        instance_id,
                        feature_id,
                        &feature_name,
                        &current_version,
                        &target_version,
                        &download_url,
                        &checksum_url,
                        &cancel,
                    )
                    .await
                {
                    tracing::error!(error = %err, %instance_id, "scheduler: auto-apply of critical update failed");
                }
            });
        }
        Ok(())
    }
}

/// Narrow "list every managed instance" accessor the scheduler needs to
/// drive its check loop (§4.2 "enumerate instances"). Kept separate from
/// [`nnc_adapters::InstanceDirectory`]-style existence checks because no
/// other component needs the full list.
#[async_trait::async_trait]
pub trait InstanceDirectoryList: Send + Sync + 'static {
    async fn list(&self) -> Result<Vec<InstanceRef>, nnc_adapters::InstanceDirectoryError>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct FakeInstanceList {
        instances: Arc<Mutex<Vec<InstanceRef>>>,
    }

    impl FakeInstanceList {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, instance: InstanceRef) {
            self.instances.lock().push(instance);
        }
    }

    #[async_trait::async_trait]
    impl InstanceDirectoryList for FakeInstanceList {
        async fn list(&self) -> Result<Vec<InstanceRef>, nnc_adapters::InstanceDirectoryError> {
            Ok(self.instances.lock().clone())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeInstanceList;

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
