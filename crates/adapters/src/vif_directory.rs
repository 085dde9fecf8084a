// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VIF Directory: the Chain Router/Reconciliation/Kill-Switch's read-only
//! view of `VirtualInterface` (§3 — "owned by the VIF subsystem; the core
//! only reads it"). A narrow port rather than a shared store, matching
//! the Router Port's "injected, never owned" posture.

use async_trait::async_trait;
use nnc_core::{VifId, VirtualInterface};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VifDirectoryError {
    #[error("vif directory transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait VifDirectory: Send + Sync + 'static {
    /// `None` means the interface no longer exists — the caller's signal
    /// for cascade cleanup (§4.5).
    async fn get(&self, vif_id: VifId) -> Result<Option<VirtualInterface>, VifDirectoryError>;
}

pub struct HttpVifDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVifDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl VifDirectory for HttpVifDirectory {
    async fn get(&self, vif_id: VifId) -> Result<Option<VirtualInterface>, VifDirectoryError> {
        let url = format!("{}/vifs/{}", self.base_url.trim_end_matches('/'), vif_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| VifDirectoryError::Transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let vif = response
            .json::<VirtualInterface>()
            .await
            .map_err(|e| VifDirectoryError::Transport(e.to_string()))?;
        Ok(Some(vif))
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
        vifs: HashMap<VifId, VirtualInterface>,
    }

    /// Scripted `VifDirectory`: seed interfaces with
    /// [`FakeVifDirectory::put`]/`remove` to simulate provisioning and
    /// cascade-deletion.
    #[derive(Clone, Default)]
    pub struct FakeVifDirectory {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeVifDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put(&self, vif: VirtualInterface) {
            self.inner.lock().vifs.insert(vif.id, vif);
        }

        pub fn remove(&self, vif_id: VifId) {
            self.inner.lock().vifs.remove(&vif_id);
        }
    }

    #[async_trait]
    impl VifDirectory for FakeVifDirectory {
        async fn get(&self, vif_id: VifId) -> Result<Option<VirtualInterface>, VifDirectoryError> {
            Ok(self.inner.lock().vifs.get(&vif_id).cloned())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeVifDirectory;
