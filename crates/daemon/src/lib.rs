// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network orchestration daemon: process wiring around `nnc-engine`'s
//! Update Engine, Update Scheduler, PBR Engine, Chain Router, Chain
//! Kill-Switch, and Chain Latency Measurer. Owns config loading, the
//! filesystem layout under `config.base_dir`, startup crash recovery
//! and reconciliation, and the long-running control-plane loops.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod env;
pub mod instance_list;
pub mod lifecycle;

pub use config::Config;
pub use instance_list::HttpInstanceList;
pub use lifecycle::{startup, Daemon, LifecycleError, StartupResult};
pub use nnc_engine::RollbackSweeperHandle;
