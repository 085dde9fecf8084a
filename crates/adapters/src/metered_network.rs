// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metered Network (§4.2): the Scheduler's gate on whether the WAN uplink
//! is currently flagged metered. Narrow on purpose — the Scheduler only
//! ever asks a yes/no question before deciding to skip a tick.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeteredNetworkError {
    #[error("metered network transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait MeteredNetwork: Send + Sync + 'static {
    async fn is_metered(&self) -> Result<bool, MeteredNetworkError>;
}

pub struct HttpMeteredNetwork {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMeteredNetwork {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(serde::Deserialize)]
struct MeteredResponse {
    metered: bool,
}

#[async_trait]
impl MeteredNetwork for HttpMeteredNetwork {
    async fn is_metered(&self) -> Result<bool, MeteredNetworkError> {
        let url = format!("{}/network/metered", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MeteredNetworkError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| MeteredNetworkError::Transport(e.to_string()))?;
        let body: MeteredResponse = response.json().await.map_err(|e| MeteredNetworkError::Transport(e.to_string()))?;
        Ok(body.metered)
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Scripted `MeteredNetwork`: defaults to unmetered until
    /// [`FakeMeteredNetwork::set_metered`] flips it.
    #[derive(Clone, Default)]
    pub struct FakeMeteredNetwork {
        metered: Arc<AtomicBool>,
    }

    impl FakeMeteredNetwork {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_metered(&self, metered: bool) {
            self.metered.store(metered, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl MeteredNetwork for FakeMeteredNetwork {
        async fn is_metered(&self) -> Result<bool, MeteredNetworkError> {
            Ok(self.metered.load(Ordering::SeqCst))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeMeteredNetwork;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_defaults_to_unmetered() {
        let net = FakeMeteredNetwork::new();
        assert!(!net.is_metered().await.unwrap());
    }

    #[tokio::test]
    async fn fake_reports_metered_once_set() {
        let net = FakeMeteredNetwork::new();
        net.set_metered(true);
        assert!(net.is_metered().await.unwrap());
    }
}
