// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete `InstanceDirectoryList` the Update Scheduler enumerates
//! every tick (§4.2). Lives here rather than in `nnc-adapters` because
//! the trait itself is scoped to `nnc-engine::scheduler` — no other
//! component needs the full instance list, only this daemon's wiring
//! of the Scheduler does.

use async_trait::async_trait;
use nnc_adapters::InstanceDirectoryError;
use nnc_core::InstanceRef;
use nnc_engine::InstanceDirectoryList;

pub struct HttpInstanceList {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInstanceList {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl InstanceDirectoryList for HttpInstanceList {
    async fn list(&self) -> Result<Vec<InstanceRef>, InstanceDirectoryError> {
        let url = format!("{}/instances", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| InstanceDirectoryError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| InstanceDirectoryError::Transport(e.to_string()))?;
        response.json::<Vec<InstanceRef>>().await.map_err(|e| InstanceDirectoryError::Transport(e.to_string()))
    }
}
