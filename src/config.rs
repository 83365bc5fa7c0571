/*!
 * Configuration
 * Sandbox settings from code, serde sources, or the environment
 */

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{FsError, FsResult};

pub const ENV_ROOT: &str = "SANDBOX_FS_ROOT";
pub const ENV_READONLY: &str = "SANDBOX_FS_READONLY";
pub const ENV_EVENT_CAPACITY: &str = "SANDBOX_FS_EVENT_CAPACITY";
pub const ENV_WATCH_DEBOUNCE_MS: &str = "SANDBOX_FS_WATCH_DEBOUNCE_MS";
pub const ENV_WATCH_CREATED_GRACE_MS: &str = "SANDBOX_FS_WATCH_CREATED_GRACE_MS";

/// Settings for a [`crate::SandboxFs`] instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsConfig {
    /// Absolute directory every operation is confined to
    pub root: PathBuf,
    /// Reject every mutating operation
    #[serde(default)]
    pub readonly: bool,
    /// Buffer size of the broadcast event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Settings for the filesystem watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Quiet period before a modification is reported
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Upper bound on the window in which a creation's own writes fold into it
    #[serde(default = "default_created_grace_ms")]
    pub created_grace_ms: u64,
}

fn default_event_capacity() -> usize {
    1024
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_created_grace_ms() -> u64 {
    250
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            created_grace_ms: default_created_grace_ms(),
        }
    }
}

impl FsConfig {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            readonly: false,
            event_capacity: default_event_capacity(),
            watch: WatchConfig::default(),
        }
    }

    /// Load configuration from `SANDBOX_FS_*` environment variables
    ///
    /// Environment variables:
    /// - SANDBOX_FS_ROOT: sandbox root (required)
    /// - SANDBOX_FS_READONLY: `1`/`true` for a read-only sandbox (default: false)
    /// - SANDBOX_FS_EVENT_CAPACITY: broadcast buffer (default: 1024)
    /// - SANDBOX_FS_WATCH_DEBOUNCE_MS: modification quiet period (default: 100)
    /// - SANDBOX_FS_WATCH_CREATED_GRACE_MS: creation grace window (default: 250)
    pub fn from_env() -> FsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> FsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = lookup(ENV_ROOT).filter(|v| !v.is_empty()).ok_or_else(|| {
            FsError::invalid_option("root", "required", format!("{ENV_ROOT} is not set"))
        })?;

        let mut config = Self::new(root);
        if let Some(value) = lookup(ENV_READONLY) {
            config.readonly = value == "1" || value.eq_ignore_ascii_case("true");
        }
        if let Some(value) = lookup(ENV_EVENT_CAPACITY) {
            config.event_capacity = parse_number(ENV_EVENT_CAPACITY, &value)?;
        }
        if let Some(value) = lookup(ENV_WATCH_DEBOUNCE_MS) {
            config.watch.debounce_ms = parse_number(ENV_WATCH_DEBOUNCE_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_WATCH_CREATED_GRACE_MS) {
            config.watch.created_grace_ms = parse_number(ENV_WATCH_CREATED_GRACE_MS, &value)?;
        }
        Ok(config)
    }
}

fn parse_number<T: FromStr>(option: &str, value: &str) -> FsResult<T> {
    value.trim().parse().map_err(|_| {
        FsError::invalid_option(option, "number", format!("'{value}' is not a valid number"))
    })
}
