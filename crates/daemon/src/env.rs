// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Resolve the state/lock directory: `NNC_STATE_DIR` > `XDG_STATE_HOME/nnc` >
/// `~/.local/state/nnc`. This is distinct from `Config::base_dir`, the §6
/// filesystem layout root the Update Engine writes feature binaries under —
/// the state directory only holds the daemon's own lock/log/config files.
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("NNC_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("nnc"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/nnc"))
}

/// Path to an optional TOML config file overlay, if set.
pub fn config_file() -> Option<PathBuf> {
    std::env::var("NNC_CONFIG_FILE").ok().map(PathBuf::from)
}
