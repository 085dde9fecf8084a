// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: environment variables overlaid by an optional
//! TOML file (`NNC_CONFIG_FILE`), with defaults matching §6's
//! filesystem layout (`base_dir` defaults to `/var/lib/nasnet`).

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::env;
use crate::lifecycle::LifecycleError;

const DEFAULT_BASE_DIR: &str = "/var/lib/nasnet";
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 6 * 3600;

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    base_dir: Option<PathBuf>,
    router_base_url: Option<String>,
    router_username: Option<String>,
    router_password: Option<String>,
    control_api_base_url: Option<String>,
    check_interval_secs: Option<u64>,
    quiet_hours: Option<FileQuietHours>,
}

#[derive(Debug, Clone, Deserialize)]
struct FileQuietHours {
    start_minute_of_day: u16,
    end_minute_of_day: u16,
    timezone: String,
}

/// Router Port (L1) connection settings — MikroTik RouterOS REST API.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// §6 filesystem layout root (features/, updates/ live here).
    pub base_dir: PathBuf,
    /// Daemon's own state directory — lock file, log file, journal,
    /// rollback store, and routing-state snapshot.
    pub state_dir: PathBuf,
    pub router: RouterConfig,
    /// Base URL for the small companion HTTP API the lifecycle,
    /// instance-directory, update-check, metered-network, and
    /// vif-directory ports all talk to.
    pub control_api_base_url: String,
    pub check_interval: Duration,
    pub quiet_hours: Option<nnc_engine::QuietHours>,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    pub journal_path: PathBuf,
    pub rollback_path: PathBuf,
    pub routing_state_path: PathBuf,
}

impl Config {
    /// Loads configuration: environment variables first, then an
    /// optional TOML file at `NNC_CONFIG_FILE` fills in anything unset.
    /// Everything else falls back to the §6 defaults.
    pub fn load() -> Result<Self, LifecycleError> {
        let file = match env::config_file() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)?;
                toml::from_str::<FileConfig>(&raw).map_err(LifecycleError::ConfigParse)?
            }
            _ => FileConfig::default(),
        };

        let base_dir = std::env::var("NNC_BASE_DIR")
            .map(PathBuf::from)
            .ok()
            .or(file.base_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_DIR));

        let router = RouterConfig {
            base_url: std::env::var("NNC_ROUTER_BASE_URL").ok().or(file.router_base_url).ok_or(
                LifecycleError::MissingConfig("router_base_url (NNC_ROUTER_BASE_URL)"),
            )?,
            username: std::env::var("NNC_ROUTER_USERNAME").ok().or(file.router_username).ok_or(
                LifecycleError::MissingConfig("router_username (NNC_ROUTER_USERNAME)"),
            )?,
            password: std::env::var("NNC_ROUTER_PASSWORD").ok().or(file.router_password).ok_or(
                LifecycleError::MissingConfig("router_password (NNC_ROUTER_PASSWORD)"),
            )?,
        };

        let control_api_base_url = std::env::var("NNC_CONTROL_API_BASE_URL")
            .ok()
            .or(file.control_api_base_url)
            .unwrap_or_else(|| "http://127.0.0.1:8282".to_string());

        let check_interval_secs = std::env::var("NNC_CHECK_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .or(file.check_interval_secs)
            .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS);

        let quiet_hours = file
            .quiet_hours
            .map(|q| {
                let timezone: chrono_tz::Tz = q.timezone.parse().map_err(|_| {
                    LifecycleError::MissingConfig("quiet_hours.timezone (unrecognized IANA name)")
                })?;
                Ok::<_, LifecycleError>(nnc_engine::QuietHours {
                    start_minute_of_day: q.start_minute_of_day,
                    end_minute_of_day: q.end_minute_of_day,
                    timezone,
                })
            })
            .transpose()?;

        let state_dir = env::state_dir()?;

        Ok(Self {
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            journal_path: state_dir.join("journal.wal"),
            rollback_path: state_dir.join("rollback.json"),
            routing_state_path: state_dir.join("routing_state.json"),
            base_dir,
            state_dir,
            router,
            control_api_base_url,
            check_interval: Duration::from_secs(check_interval_secs),
            quiet_hours,
        })
    }
}
