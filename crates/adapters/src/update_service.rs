// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Update Check Service (§4.2): the Scheduler's external collaborator for
//! "is there a newer version of this feature." The GitHub release client
//! mentioned in §1's out-of-scope list sits behind this port in a real
//! deployment; the Scheduler itself only ever sees `CheckForUpdate`.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateCheckError {
    #[error("update service transport error: {0}")]
    Transport(String),
}

/// What the update service knows about a candidate release, before the
/// Scheduler runs its own severity classification (§4.2) against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableUpdate {
    pub version: String,
    pub release_notes: String,
    pub download_url: String,
    pub checksum_url: String,
    /// Draft/pre-release builds are never surfaced as available (§4.2).
    pub is_draft_or_prerelease: bool,
}

#[async_trait]
pub trait UpdateCheckService: Send + Sync + 'static {
    async fn check_for_update(&self, feature: &str, current_version: &str) -> Result<Option<AvailableUpdate>, UpdateCheckError>;
}

pub struct HttpUpdateCheckService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpdateCheckService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(serde::Deserialize)]
struct CheckResponse {
    available: Option<AvailableUpdateWire>,
}

#[derive(serde::Deserialize)]
struct AvailableUpdateWire {
    version: String,
    release_notes: String,
    download_url: String,
    checksum_url: String,
    #[serde(default)]
    is_draft_or_prerelease: bool,
}

#[async_trait]
impl UpdateCheckService for HttpUpdateCheckService {
    async fn check_for_update(&self, feature: &str, current_version: &str) -> Result<Option<AvailableUpdate>, UpdateCheckError> {
        let url = format!("{}/features/{}/check", self.base_url.trim_end_matches('/'), feature);
        let response = self
            .client
            .get(&url)
            .query(&[("current_version", current_version)])
            .send()
            .await
            .map_err(|e| UpdateCheckError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| UpdateCheckError::Transport(e.to_string()))?;

        let body: CheckResponse = response.json().await.map_err(|e| UpdateCheckError::Transport(e.to_string()))?;
        Ok(body.available.map(|w| AvailableUpdate {
            version: w.version,
            release_notes: w.release_notes,
            download_url: w.download_url,
            checksum_url: w.checksum_url,
            is_draft_or_prerelease: w.is_draft_or_prerelease,
        }))
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeState {
        available: HashMap<String, AvailableUpdate>,
    }

    /// Scripted `UpdateCheckService`: `set_available(feature, update)`
    /// makes the next `check_for_update` for that feature return it;
    /// features with nothing scripted return `None`.
    #[derive(Clone, Default)]
    pub struct FakeUpdateCheckService {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeUpdateCheckService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_available(&self, feature: impl Into<String>, update: AvailableUpdate) {
            self.inner.lock().available.insert(feature.into(), update);
        }

        pub fn clear(&self, feature: &str) {
            self.inner.lock().available.remove(feature);
        }
    }

    #[async_trait]
    impl UpdateCheckService for FakeUpdateCheckService {
        async fn check_for_update(&self, feature: &str, _current_version: &str) -> Result<Option<AvailableUpdate>, UpdateCheckError> {
            Ok(self.inner.lock().available.get(feature).cloned())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeUpdateCheckService;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_returns_none_when_nothing_scripted() {
        let svc = FakeUpdateCheckService::new();
        assert!(svc.check_for_update("vpn-gateway", "1.0.0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fake_returns_scripted_update() {
        let svc = FakeUpdateCheckService::new();
        svc.set_available(
            "vpn-gateway",
            AvailableUpdate {
                version: "2.0.0".into(),
                release_notes: "fixes a CVE".into(),
                download_url: "http://x/vpn-gateway".into(),
                checksum_url: "http://x/checksums.txt".into(),
                is_draft_or_prerelease: false,
            },
        );
        let update = svc.check_for_update("vpn-gateway", "1.0.0").await.unwrap().unwrap();
        assert_eq!(update.version, "2.0.0");
    }
}
