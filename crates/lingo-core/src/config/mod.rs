//! Sync engine configuration.
//!
//! `SyncConfig` carries the tuning knobs of the orchestrator and the store.
//! Values start from built-in defaults and may be overridden by a JSON file
//! (`SyncConfigFile`) and then by `LINGO_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of items fetched per full-sync page.
pub const DEFAULT_CHUNK_SIZE: usize = 200;
/// Default pause between full-sync pages.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(100);
/// Default cadence of the background delta sync.
pub const DEFAULT_BACKGROUND_INTERVAL: Duration = Duration::from_secs(30 * 60);
/// Default age after which the cache is reported stale.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(30 * 60);

const ENV_CHUNK_SIZE: &str = "LINGO_CHUNK_SIZE";
const ENV_CHUNK_DELAY_MS: &str = "LINGO_CHUNK_DELAY_MS";
const ENV_SYNC_INTERVAL_SECS: &str = "LINGO_SYNC_INTERVAL_SECS";
const ENV_FRESHNESS_WINDOW_SECS: &str = "LINGO_FRESHNESS_WINDOW_SECS";

/// Configuration for the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Items per full-sync page
    pub chunk_size: usize,
    /// Pause between full-sync pages
    pub chunk_delay: Duration,
    /// Background delta-sync cadence, `None` disables the timer
    pub background_interval: Option<Duration>,
    /// Age after which the cache is reported stale
    pub freshness_window: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            background_interval: Some(DEFAULT_BACKGROUND_INTERVAL),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
        }
    }
}

impl SyncConfig {
    /// Set the full-sync page size (at least 1)
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the pause between full-sync pages
    #[must_use]
    pub const fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Set the background sync interval
    #[must_use]
    pub const fn with_background_interval(mut self, interval: Duration) -> Self {
        self.background_interval = Some(interval);
        self
    }

    /// Disable the background timer (explicit triggers only)
    #[must_use]
    pub const fn without_background_sync(mut self) -> Self {
        self.background_interval = None;
        self
    }

    /// Set the staleness window
    #[must_use]
    pub const fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Apply overrides from a parsed config file
    #[must_use]
    pub fn merge_file(mut self, file: &SyncConfigFile) -> Self {
        if let Some(chunk_size) = file.chunk_size {
            self = self.with_chunk_size(chunk_size);
        }
        if let Some(delay_ms) = file.chunk_delay_ms {
            self.chunk_delay = Duration::from_millis(delay_ms);
        }
        if let Some(secs) = file.background_interval_secs {
            self.background_interval = interval_from_secs(secs);
        }
        if let Some(secs) = file.freshness_window_secs {
            self.freshness_window = Duration::from_secs(secs);
        }
        self
    }

    /// Apply overrides from `LINGO_*` environment variables
    pub fn merge_env(self) -> Result<Self> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    fn merge_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(chunk_size) = parse_var::<usize>(&lookup, ENV_CHUNK_SIZE)? {
            self = self.with_chunk_size(chunk_size);
        }
        if let Some(delay_ms) = parse_var::<u64>(&lookup, ENV_CHUNK_DELAY_MS)? {
            self.chunk_delay = Duration::from_millis(delay_ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_SYNC_INTERVAL_SECS)? {
            self.background_interval = interval_from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_FRESHNESS_WINDOW_SECS)? {
            self.freshness_window = Duration::from_secs(secs);
        }
        Ok(self)
    }

    /// Defaults, then the optional config file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            let file = SyncConfigFile::read(path)?;
            config = config.merge_file(&file);
        }
        config.merge_env()
    }
}

/// On-disk JSON representation of config overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncConfigFile {
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub chunk_delay_ms: Option<u64>,
    /// `0` disables the background timer
    #[serde(default)]
    pub background_interval_secs: Option<u64>,
    #[serde(default)]
    pub freshness_window_secs: Option<u64>,
}

impl SyncConfigFile {
    /// Parse overrides from a raw JSON payload.
    pub fn parse(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))
    }

    /// Read and parse overrides from a file.
    pub fn read(path: &Path) -> Result<Self> {
        let payload = std::fs::read_to_string(path).map_err(|error| {
            Error::Config(format!("failed to read {}: {error}", path.display()))
        })?;
        Self::parse(&payload)
    }
}

const fn interval_from_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got '{raw}'")))
}
