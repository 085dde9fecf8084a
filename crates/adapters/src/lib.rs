// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! nnc-adapters: everything that crosses a process boundary — the
//! Router Port (L1), instance lifecycle control (Stopper/Starter/
//! HealthChecker), the Download Manager & Verifier (C1), and the
//! per-feature Migrator Registry (C2).
//!
//! Every port here is a narrow trait plus one real implementation and
//! (behind `#[cfg(test)]`/`test-support`) a scripted fake, so
//! `nnc-engine` never needs a live router or service registry to test
//! its orchestration logic.

mod download;
mod instance_directory;
mod lifecycle;
mod metered_network;
mod migrator;
mod router_port;
mod update_service;
mod vif_directory;

pub use download::{sha256_hex, DownloadError, DownloadVerifier, HttpDownloadVerifier};
pub use instance_directory::{HttpInstanceDirectory, InstanceDirectory, InstanceDirectoryError};
pub use lifecycle::{HealthChecker, HealthState, HttpLifecycle, LifecycleError, Starter, Stopper};
pub use metered_network::{HttpMeteredNetwork, MeteredNetwork, MeteredNetworkError};
pub use migrator::{Migrator, MigratorError, MigratorRegistry, NoOpMigrator};
pub use router_port::{HttpRouterPort, RouterPort, RouterPortError};
pub use update_service::{AvailableUpdate, HttpUpdateCheckService, UpdateCheckError, UpdateCheckService};
pub use vif_directory::{HttpVifDirectory, VifDirectory, VifDirectoryError};

#[cfg(any(test, feature = "test-support"))]
pub use download::{DownloadCall, FakeDownloadVerifier};
#[cfg(any(test, feature = "test-support"))]
pub use instance_directory::FakeInstanceDirectory;
#[cfg(any(test, feature = "test-support"))]
pub use lifecycle::{FakeLifecycle, LifecycleCall};
#[cfg(any(test, feature = "test-support"))]
pub use metered_network::FakeMeteredNetwork;
#[cfg(any(test, feature = "test-support"))]
pub use router_port::{FakeRouterPort, RecordedCall};
#[cfg(any(test, feature = "test-support"))]
pub use update_service::FakeUpdateCheckService;
#[cfg(any(test, feature = "test-support"))]
pub use vif_directory::FakeVifDirectory;
