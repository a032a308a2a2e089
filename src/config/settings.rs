//! Runtime settings

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CliArgs;

/// Errors loading a settings file
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    Invalid(&'static str),
}

/// Upper bound for `message_pool_capacity`
pub const MAX_MESSAGE_POOL_CAPACITY: usize = 256;

/// Upper bound for `scan_cache_capacity`
pub const MAX_SCAN_CACHE_CAPACITY: usize = 1024;

/// Runtime configuration of the interface controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Station connect deadline
    pub connect_timeout_ms: u64,
    /// How long the dispatcher waits for traffic before checking deadlines
    pub poll_interval_ms: u64,
    /// How long a teardown may wait for the driver's confirmation
    pub teardown_grace_ms: u64,
    pub scan_timeout_ms: u64,
    /// Requests that may be in flight at once
    pub message_pool_capacity: usize,
    /// BSSIDs remembered by a counts-only scan
    pub scan_cache_capacity: usize,
    pub ap_beacon_interval: u16,
    pub ap_max_stations: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 20_000,
            poll_interval_ms: 1_000,
            teardown_grace_ms: 5_000,
            scan_timeout_ms: 10_000,
            message_pool_capacity: 8,
            scan_cache_capacity: 32,
            ap_beacon_interval: 100,
            ap_max_stations: 8,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.connect_timeout_ms == 0 {
            return Err(SettingsError::Invalid("connect_timeout_ms must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(SettingsError::Invalid("poll_interval_ms must be positive"));
        }
        if !(1..=MAX_MESSAGE_POOL_CAPACITY).contains(&self.message_pool_capacity) {
            return Err(SettingsError::Invalid(
                "message_pool_capacity must be within 1..=256",
            ));
        }
        if self.scan_cache_capacity > MAX_SCAN_CACHE_CAPACITY {
            return Err(SettingsError::Invalid(
                "scan_cache_capacity must be at most 1024",
            ));
        }
        if !(1..=8).contains(&self.ap_max_stations) {
            return Err(SettingsError::Invalid(
                "ap_max_stations must be within 1..=8",
            ));
        }
        if !(20..=1000).contains(&self.ap_beacon_interval) {
            return Err(SettingsError::Invalid(
                "ap_beacon_interval must be within 20..=1000",
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

impl From<CliArgs> for Settings {
    fn from(args: CliArgs) -> Self {
        Settings {
            connect_timeout_ms: args.connect_timeout_ms,
            poll_interval_ms: args.poll_interval_ms,
            message_pool_capacity: args.message_pool_capacity,
            ..Settings::default()
        }
    }
}
