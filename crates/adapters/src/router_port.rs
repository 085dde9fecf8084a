// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router Port (L1, §4.7): the only way anything upstream talks to the
//! MikroTik-class router. `Execute`/`Query` are the entire surface —
//! no caller reaches for a raw HTTP client directly.

use async_trait::async_trait;
use nnc_wire::{Command, CommandResult, Resources, StateQuery};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterPortError {
    #[error("router transport error: {0}")]
    Transport(String),
    #[error("router returned a non-success response: {0}")]
    Rejected(String),
    #[error("router response did not decode: {0}")]
    Decode(String),
}

#[async_trait]
pub trait RouterPort: Send + Sync + 'static {
    async fn execute(&self, cmd: Command) -> Result<CommandResult, RouterPortError>;
    async fn query(&self, query: StateQuery) -> Result<Resources, RouterPortError>;
}

/// Talks to RouterOS's REST API (`/rest/<path>`) over HTTPS with basic
/// auth. One `HttpRouterPort` is shared (via `Arc`) across every
/// caller; `reqwest::Client` already pools connections internally.
pub struct HttpRouterPort {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpRouterPort {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl RouterPort for HttpRouterPort {
    async fn execute(&self, cmd: Command) -> Result<CommandResult, RouterPortError> {
        let url = self.url(&cmd.path);
        tracing::debug!(path = %cmd.path, action = %cmd.action, "router execute");

        let request = match cmd.action {
            nnc_wire::Action::Add => self.client.put(&url).json(&cmd.args),
            nnc_wire::Action::Set | nnc_wire::Action::Remove => {
                let id = cmd.id.as_deref().unwrap_or_default();
                self.client.patch(format!("{url}/{id}")).json(&cmd.args)
            }
            nnc_wire::Action::Print => self.client.get(&url).query(&cmd.args),
        };

        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| RouterPortError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RouterPortError::Rejected(format!("{status}: {body}")));
        }

        let data: Vec<std::collections::HashMap<String, String>> =
            response.json().await.map_err(|e| RouterPortError::Decode(e.to_string()))?;
        let id = data.first().and_then(|row| row.get(".id")).cloned();
        Ok(CommandResult::ok(id, data))
    }

    async fn query(&self, query: StateQuery) -> Result<Resources, RouterPortError> {
        let url = self.url(&query.path);
        let mut req = self.client.get(&url).basic_auth(&self.username, Some(&self.password));
        if let Some(filter) = &query.filter {
            req = req.query(filter);
        }
        let response = req.send().await.map_err(|e| RouterPortError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RouterPortError::Rejected(format!("{status}: {body}")));
        }
        let resources = response.json().await.map_err(|e| RouterPortError::Decode(e.to_string()))?;
        Ok(Resources { resources })
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub enum RecordedCall {
        Execute(Command),
        Query(StateQuery),
    }

    struct FakeState {
        calls: Vec<RecordedCall>,
        execute_results: VecDeque<Result<CommandResult, RouterPortError>>,
        query_results: VecDeque<Result<Resources, RouterPortError>>,
        default_execute: CommandResult,
    }

    /// Scripted `RouterPort`: queue up responses with
    /// [`FakeRouterPort::push_execute_result`]/`push_query_result`; when
    /// the queue runs dry, `execute` returns `default_execute` (success,
    /// no rows) so tests that don't care about the router's answer don't
    /// need to prime one.
    #[derive(Clone)]
    pub struct FakeRouterPort {
        inner: Arc<Mutex<FakeState>>,
    }

    impl Default for FakeRouterPort {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeState {
                    calls: Vec::new(),
                    execute_results: VecDeque::new(),
                    query_results: VecDeque::new(),
                    default_execute: CommandResult::ok(Some("*1".to_string()), Vec::new()),
                })),
            }
        }
    }

    impl FakeRouterPort {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_execute_result(&self, result: Result<CommandResult, RouterPortError>) {
            self.inner.lock().execute_results.push_back(result);
        }

        pub fn push_query_result(&self, result: Result<Resources, RouterPortError>) {
            self.inner.lock().query_results.push_back(result);
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl RouterPort for FakeRouterPort {
        async fn execute(&self, cmd: Command) -> Result<CommandResult, RouterPortError> {
            let mut state = self.inner.lock();
            state.calls.push(RecordedCall::Execute(cmd));
            state.execute_results.pop_front().unwrap_or_else(|| Ok(state.default_execute.clone()))
        }

        async fn query(&self, query: StateQuery) -> Result<Resources, RouterPortError> {
            let mut state = self.inner.lock();
            state.calls.push(RecordedCall::Query(query));
            state.query_results.pop_front().unwrap_or_else(|| Ok(Resources::empty()))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRouterPort, RecordedCall};

#[cfg(test)]
#[path = "router_port_tests.rs"]
mod tests;
