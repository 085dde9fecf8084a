// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Update Engine, Scheduler, PBR Engine, Chain Router, Chain Kill-Switch,
//! Chain Latency Measurer, and the Event Bus that ties them together —
//! the control-plane logic that runs against the ports in `nnc-adapters`
//! and the durable state in `nnc-storage`.

mod bus;
mod chain;
mod error;
mod killswitch;
mod latency;
mod paths;
mod pbr;
mod rollback_sweeper;
mod scheduler;
mod update;

pub use bus::EventBus;
pub use chain::{ChainRouter, CreateChainInput, Reconciliation};
pub use error::{ChainError, PbrError, UpdateError};
pub use killswitch::ChainKillSwitch;
pub use latency::LatencyMeasurer;
pub use pbr::{AssignDeviceRoutingInput, AssignOutcome, PbrEngine, ReconcileCounters};
pub use rollback_sweeper::{spawn_rollback_sweeper, RollbackSweeperHandle};
pub use scheduler::{InstanceDirectoryList, QuietHours, Scheduler, SchedulerConfig};
#[cfg(any(test, feature = "test-support"))]
pub use scheduler::FakeInstanceList;
pub use update::UpdateEngine;
