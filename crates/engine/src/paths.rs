// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem layout (§6) under a configurable base directory (default
//! `/var/lib/nasnet`). Every path the Update Engine touches is built
//! here so the six phases never hand-assemble a path inline.

use nnc_core::InstanceId;
use std::path::{Path, PathBuf};

pub fn live_binary(base: &Path, feature: &str) -> PathBuf {
    base.join("features").join(feature).join("bin").join(feature)
}

pub fn live_config(base: &Path, feature: &str) -> PathBuf {
    base.join("features").join(feature).join("config").join(format!("{feature}.json"))
}

pub fn staging_dir(base: &Path, feature: &str, target_version: &str) -> PathBuf {
    base.join("updates").join(feature).join(target_version).join("staging")
}

pub fn staging_binary(base: &Path, feature: &str, target_version: &str) -> PathBuf {
    staging_dir(base, feature, target_version).join(feature)
}

pub fn backup_dir(base: &Path, feature: &str, instance_id: InstanceId, current_version: &str) -> PathBuf {
    base.join("updates").join(feature).join(instance_id.as_str()).join("backup").join(current_version)
}

pub fn backup_binary(base: &Path, feature: &str, instance_id: InstanceId, current_version: &str) -> PathBuf {
    backup_dir(base, feature, instance_id, current_version).join(feature)
}

pub fn backup_config_dir(base: &Path, feature: &str, instance_id: InstanceId, current_version: &str) -> PathBuf {
    backup_dir(base, feature, instance_id, current_version).join("config")
}
