// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance Directory: the narrow "does this service instance still
//! exist" check PBR reconciliation needs to detect a cascade-deleted
//! instance (§4.3 `ReconcileOnStartup` disposition (c)). Deliberately
//! smaller than a full service registry client — existence is the only
//! fact the core needs.

use async_trait::async_trait;
use nnc_core::InstanceId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstanceDirectoryError {
    #[error("instance directory transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait InstanceDirectory: Send + Sync + 'static {
    async fn exists(&self, instance_id: InstanceId) -> Result<bool, InstanceDirectoryError>;
}

pub struct HttpInstanceDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInstanceDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl InstanceDirectory for HttpInstanceDirectory {
    async fn exists(&self, instance_id: InstanceId) -> Result<bool, InstanceDirectoryError> {
        let url = format!("{}/instances/{}", self.base_url.trim_end_matches('/'), instance_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| InstanceDirectoryError::Transport(e.to_string()))?;
        Ok(response.status() != reqwest::StatusCode::NOT_FOUND)
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Scripted `InstanceDirectory`: every instance exists unless
    /// explicitly removed with [`FakeInstanceDirectory::remove`].
    #[derive(Clone, Default)]
    pub struct FakeInstanceDirectory {
        removed: Arc<Mutex<HashSet<InstanceId>>>,
    }

    impl FakeInstanceDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn remove(&self, instance_id: InstanceId) {
            self.removed.lock().insert(instance_id);
        }
    }

    #[async_trait]
    impl InstanceDirectory for FakeInstanceDirectory {
        async fn exists(&self, instance_id: InstanceId) -> Result<bool, InstanceDirectoryError> {
            Ok(!self.removed.lock().contains(&instance_id))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeInstanceDirectory;
