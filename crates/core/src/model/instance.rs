// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `InstanceRef` — owned by the external service registry (§3); the core
//! only reads it.

use crate::define_id;
use serde::{Deserialize, Serialize};

define_id! {
    /// Identifies a running service instance.
    pub struct InstanceId("ins-");
}

define_id! {
    /// Identifies a feature (a kind of service, e.g. "vpn-gateway").
    pub struct FeatureId("ftr-");
}

/// A reference to an instance managed by the external service registry.
///
/// `InstanceRef` is owned by that registry; the Update Scheduler (§4.2)
/// enumerates these to drive its check loop without a separate lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    pub instance_id: InstanceId,
    pub feature_id: FeatureId,
    pub current_version: String,
}

impl InstanceRef {
    pub fn new(instance_id: InstanceId, feature_id: FeatureId, current_version: impl Into<String>) -> Self {
        Self { instance_id, feature_id, current_version: current_version.into() }
    }
}
