// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nnc-core: shared domain types for the network-orchestration control plane.
//!
//! This crate holds the data model (§3), the event vocabulary (§6), and the
//! error taxonomy (§7) that every other crate in the workspace builds on. It
//! has no knowledge of the router RPC transport, the filesystem, or the
//! process supervisor — those are adapter concerns.

pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod model;
pub mod severity;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{CoreError, ValidationError};
pub use event::{Event, EventPriority};
pub use model::chain::{parse_chain_comment, ChainHop, ChainHopId, KillSwitchMode, RoutingChain, RoutingChainId, RoutingMode};
pub use model::device_routing::{DeviceRouting, DeviceRoutingId};
pub use model::instance::{FeatureId, InstanceId, InstanceRef};
pub use model::journal::{JournalEntry, JournalEntryId, JournalPhase, JournalStatus};
pub use model::rollback::{RollbackState, RollbackStateId, ROLLBACK_TTL_MS};
pub use model::vif::{GatewayStatus, VifId, VifStatus, VirtualInterface};
pub use severity::Severity;
