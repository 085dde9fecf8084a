// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stopper/Starter/HealthChecker (§4.1 SWAP/VALIDATION, §4.6): the Update
//! Engine's view of "the instance" and the Chain Kill-Switch's view of
//! "is this interface healthy." Three narrow traits instead of one fat
//! "instance manager" interface, since the engine and the kill-switch
//! each only need one side of it.

use async_trait::async_trait;
use nnc_core::InstanceId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("instance transport error: {0}")]
    Transport(String),
    #[error("instance {0} not found")]
    NotFound(InstanceId),
}

/// Halts a running instance (SWAP's first sub-step, §4.1 step 3).
#[async_trait]
pub trait Stopper: Send + Sync + 'static {
    async fn stop(&self, instance_id: InstanceId) -> Result<(), LifecycleError>;
}

/// Launches an instance (VALIDATION's first sub-step, §4.1 step 5).
#[async_trait]
pub trait Starter: Send + Sync + 'static {
    async fn start(&self, instance_id: InstanceId) -> Result<(), LifecycleError>;
}

/// An instance's health status as reported by `HealthChecker::status`
/// (§4.1 step 5) or carried on a `health.changed` event (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthState::Healthy)
    }
}

/// Polled by VALIDATION after the settle window; §4.1 step 5 requires
/// an exact `"HEALTHY"` match, not merely "didn't error."
#[async_trait]
pub trait HealthChecker: Send + Sync + 'static {
    async fn status(&self, instance_id: InstanceId) -> Result<HealthState, LifecycleError>;
}

/// Talks to the external service registry's control endpoint over
/// HTTP. One client backs all three traits since the registry exposes
/// them on the same base URL.
pub struct HttpLifecycle {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLifecycle {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn url(&self, instance_id: InstanceId, action: &str) -> String {
        format!("{}/instances/{}/{}", self.base_url.trim_end_matches('/'), instance_id, action)
    }
}

#[async_trait]
impl Stopper for HttpLifecycle {
    async fn stop(&self, instance_id: InstanceId) -> Result<(), LifecycleError> {
        tracing::info!(%instance_id, "stopping instance");
        let response = self
            .client
            .post(self.url(instance_id, "stop"))
            .send()
            .await
            .map_err(|e| LifecycleError::Transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LifecycleError::NotFound(instance_id));
        }
        response.error_for_status().map_err(|e| LifecycleError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Starter for HttpLifecycle {
    async fn start(&self, instance_id: InstanceId) -> Result<(), LifecycleError> {
        tracing::info!(%instance_id, "starting instance");
        let response = self
            .client
            .post(self.url(instance_id, "start"))
            .send()
            .await
            .map_err(|e| LifecycleError::Transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LifecycleError::NotFound(instance_id));
        }
        response.error_for_status().map_err(|e| LifecycleError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl HealthChecker for HttpLifecycle {
    async fn status(&self, instance_id: InstanceId) -> Result<HealthState, LifecycleError> {
        let response = self
            .client
            .get(self.url(instance_id, "health"))
            .send()
            .await
            .map_err(|e| LifecycleError::Transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LifecycleError::NotFound(instance_id));
        }
        let body: serde_json::Value =
            response.json().await.map_err(|e| LifecycleError::Transport(e.to_string()))?;
        let state = body.get("state").and_then(|v| v.as_str()).unwrap_or("");
        Ok(if state.eq_ignore_ascii_case("healthy") { HealthState::Healthy } else { HealthState::Unhealthy })
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum LifecycleCall {
        Stop(InstanceId),
        Start(InstanceId),
        Status(InstanceId),
    }

    struct FakeState {
        calls: Vec<LifecycleCall>,
        status_queue: VecDeque<HealthState>,
        default_status: HealthState,
        fail_stop: bool,
        fail_start: bool,
    }

    /// Scripted Stopper/Starter/HealthChecker in one fake, since every
    /// caller in the spec needs all three against the same instance.
    #[derive(Clone)]
    pub struct FakeLifecycle {
        inner: Arc<Mutex<FakeState>>,
    }

    impl Default for FakeLifecycle {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeState {
                    calls: Vec::new(),
                    status_queue: VecDeque::new(),
                    default_status: HealthState::Healthy,
                    fail_stop: false,
                    fail_start: false,
                })),
            }
        }
    }

    impl FakeLifecycle {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_default_status(&self, state: HealthState) {
            self.inner.lock().default_status = state;
        }

        pub fn push_status(&self, state: HealthState) {
            self.inner.lock().status_queue.push_back(state);
        }

        pub fn fail_next_stop(&self) {
            self.inner.lock().fail_stop = true;
        }

        pub fn fail_next_start(&self) {
            self.inner.lock().fail_start = true;
        }

        pub fn calls(&self) -> Vec<LifecycleCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl Stopper for FakeLifecycle {
        async fn stop(&self, instance_id: InstanceId) -> Result<(), LifecycleError> {
            let mut state = self.inner.lock();
            state.calls.push(LifecycleCall::Stop(instance_id));
            if state.fail_stop {
                state.fail_stop = false;
                return Err(LifecycleError::Transport("stop failed".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Starter for FakeLifecycle {
        async fn start(&self, instance_id: InstanceId) -> Result<(), LifecycleError> {
            let mut state = self.inner.lock();
            state.calls.push(LifecycleCall::Start(instance_id));
            if state.fail_start {
                state.fail_start = false;
                return Err(LifecycleError::Transport("start failed".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl HealthChecker for FakeLifecycle {
        async fn status(&self, instance_id: InstanceId) -> Result<HealthState, LifecycleError> {
            let mut state = self.inner.lock();
            state.calls.push(LifecycleCall::Status(instance_id));
            Ok(state.status_queue.pop_front().unwrap_or(state.default_status))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLifecycle, LifecycleCall};

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
