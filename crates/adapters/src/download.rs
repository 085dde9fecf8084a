// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Download Manager & Verifier (C1, §4.1 STAGING): fetch an artifact and
//! its checksum manifest over HTTP, select the matching manifest line
//! (`nnc_wire::select_checksum`), and hash the downloaded bytes to
//! confirm they match before the engine ever stages them.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("fetch of {url} failed: {cause}")]
    Fetch { url: String, cause: String },
    #[error("checksum manifest rejected: {0}")]
    Manifest(#[from] nnc_wire::ChecksumError),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },
}

/// Fetches an artifact from `artifact_url`, fetches the checksum manifest
/// from `checksum_url`, and verifies the artifact's sha256 against the
/// manifest entry selected for `target_filename` before returning the
/// bytes — callers never see unverified artifact bytes.
#[async_trait]
pub trait DownloadVerifier: Send + Sync + 'static {
    async fn fetch_verified(
        &self,
        artifact_url: &str,
        checksum_url: &str,
        target_filename: &str,
    ) -> Result<Vec<u8>, DownloadError>;
}

pub struct HttpDownloadVerifier {
    client: reqwest::Client,
}

impl Default for HttpDownloadVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDownloadVerifier {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, DownloadError> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Fetch { url: url.to_string(), cause: e.to_string() })?
            .error_for_status()
            .map_err(|e| DownloadError::Fetch { url: url.to_string(), cause: e.to_string() })?
            .text()
            .await
            .map_err(|e| DownloadError::Fetch { url: url.to_string(), cause: e.to_string() })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Fetch { url: url.to_string(), cause: e.to_string() })?
            .error_for_status()
            .map_err(|e| DownloadError::Fetch { url: url.to_string(), cause: e.to_string() })?;
        Ok(response.bytes().await.map_err(|e| DownloadError::Fetch { url: url.to_string(), cause: e.to_string() })?.to_vec())
    }
}

/// sha256 the bytes and render as lowercase hex, matching the manifest
/// convention `select_checksum` expects (§4.1/§8 checksum round-trip).
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[async_trait]
impl DownloadVerifier for HttpDownloadVerifier {
    async fn fetch_verified(
        &self,
        artifact_url: &str,
        checksum_url: &str,
        target_filename: &str,
    ) -> Result<Vec<u8>, DownloadError> {
        tracing::info!(artifact_url, checksum_url, "downloading update artifact");
        // Absence of a checksum manifest downgrades to no-verify with a
        // warning rather than aborting the download (§4.1 STAGING).
        let expected = match self.fetch_text(checksum_url).await {
            Ok(manifest) => Some(nnc_wire::select_checksum(&manifest, target_filename)?),
            Err(err) => {
                tracing::warn!(checksum_url, error = %err, "checksum manifest unavailable, proceeding unverified");
                None
            }
        };

        let bytes = self.fetch_bytes(artifact_url).await?;
        if let Some(expected) = expected {
            let actual = sha256_hex(&bytes);
            if !actual.eq_ignore_ascii_case(&expected) {
                return Err(DownloadError::Mismatch { expected, actual });
            }
        }
        Ok(bytes)
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct DownloadCall {
        pub artifact_url: String,
        pub checksum_url: String,
        pub target_filename: String,
    }

    struct FakeState {
        calls: Vec<DownloadCall>,
        result: Result<Vec<u8>, String>,
    }

    /// Scripted `DownloadVerifier`: set the bytes/error it hands back
    /// with [`FakeDownloadVerifier::set_result`] / `set_bytes`; defaults
    /// to an empty successful payload.
    #[derive(Clone)]
    pub struct FakeDownloadVerifier {
        inner: Arc<Mutex<FakeState>>,
    }

    impl Default for FakeDownloadVerifier {
        fn default() -> Self {
            Self { inner: Arc::new(Mutex::new(FakeState { calls: Vec::new(), result: Ok(Vec::new()) })) }
        }
    }

    impl FakeDownloadVerifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_bytes(&self, bytes: Vec<u8>) {
            self.inner.lock().result = Ok(bytes);
        }

        pub fn set_error(&self, message: impl Into<String>) {
            self.inner.lock().result = Err(message.into());
        }

        pub fn calls(&self) -> Vec<DownloadCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl DownloadVerifier for FakeDownloadVerifier {
        async fn fetch_verified(
            &self,
            artifact_url: &str,
            checksum_url: &str,
            target_filename: &str,
        ) -> Result<Vec<u8>, DownloadError> {
            let mut state = self.inner.lock();
            state.calls.push(DownloadCall {
                artifact_url: artifact_url.to_string(),
                checksum_url: checksum_url.to_string(),
                target_filename: target_filename.to_string(),
            });
            state.result.clone().map_err(|cause| DownloadError::Fetch { url: artifact_url.to_string(), cause })
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{DownloadCall, FakeDownloadVerifier};

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;
